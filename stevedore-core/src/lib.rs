//! Stevedore Core
//!
//! Core types for the Stevedore job submission system.
//!
//! This crate contains:
//! - Domain types: Core business entities (Job, App, ExecutionSystem)
//! - DTOs: Data transfer objects for the submission surface

pub mod domain;
pub mod dto;
