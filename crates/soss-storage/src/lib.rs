//! soss-storage: OpenDAL-backed access to one S3-compatible bucket

pub mod health;
pub mod operator;
pub mod remote;

pub use health::check_health;
pub use operator::{build_operator, Credentials};
pub use remote::RemoteStore;
