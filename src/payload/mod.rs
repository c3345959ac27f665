pub mod error;
#[cfg(test)]
pub mod fake;
pub mod http;
pub mod local;
pub mod source;
pub mod staging;

pub use error::PayloadError;
#[cfg(test)]
pub use fake::FakePayloadSource;
pub use http::HttpPayloadSource;
pub use local::LocalDumpSource;
pub use source::{PayloadEntry, PayloadSource};
pub use staging::StagingArea;
