//! Persistence layer
//!
//! Repositories own all SQL; nothing above this layer sees rows.

pub mod job;
