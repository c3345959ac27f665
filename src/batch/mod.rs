pub mod job;
pub mod submitter;

pub use job::{build_bag, JobOutcome, SubmissionJob};
pub use submitter::BatchSubmitter;
