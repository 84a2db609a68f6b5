//! Pure domain layer for the voice-cloning orchestration platform.
//!
//! Closed enumerations for job/stage/status values, the weighted pipeline
//! definitions, retry and backoff policy, and submission validation rules.
//! This crate has no internal dependencies so it can be used by the
//! registry, the stage executor, and client-side tooling alike.

pub mod error;
pub mod job;
pub mod pipeline;
pub mod retry;
pub mod types;
pub mod validation;
