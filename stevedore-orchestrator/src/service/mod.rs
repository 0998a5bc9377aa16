pub mod job;

pub use job::{JobError, JobManager};
