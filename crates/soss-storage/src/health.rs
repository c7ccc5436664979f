//! Storage health check

use opendal::Operator;
use soss_core::{SossError, SossResult};

/// Verify the bucket is reachable and the credentials are accepted by
/// listing the root
pub async fn check_health(op: &Operator) -> SossResult<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| SossError::Storage(format!("storage health check failed: {e}")))
}
