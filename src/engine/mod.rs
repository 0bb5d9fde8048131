//! Escalation engine
//!
//! The five cooperating parts of the platform's core: score aggregation,
//! level classification, visibility, the tiered decision state machine, and
//! deadline-expiration resolution, orchestrated by [`service::EscalationService`].

pub mod config;
pub mod decision;
pub mod expiration;
pub mod levels;
pub mod scoring;
pub mod service;
pub mod visibility;
