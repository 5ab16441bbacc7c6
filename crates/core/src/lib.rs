//! Domain types shared by every scail crate.
//!
//! Holds the workflow graph model and its mutation/lookup operations,
//! the job request/result shapes exchanged with the intake platform,
//! and the output descriptors reported by the execution engine.

pub mod error;
pub mod graph;
pub mod job;
