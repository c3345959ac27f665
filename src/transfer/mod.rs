pub mod client;
pub mod error;
#[cfg(test)]
pub mod fake;
pub mod s3;
pub mod store;

pub use client::{TransferClient, TransferOutcome};
pub use error::StoreError;
#[cfg(test)]
pub use fake::FakeObjectStore;
pub use s3::S3ObjectStore;
pub use store::ObjectStore;
