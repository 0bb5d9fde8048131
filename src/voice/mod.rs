//! Voice domain model
//!
//! A "voice" is an employee proposal moving through the escalation hierarchy.

pub mod models;

pub use models::*;
