pub mod app;
pub mod job;
pub mod system;
