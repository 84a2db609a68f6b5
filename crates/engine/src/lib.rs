//! Job orchestration: validation, the versioned registry facade, and the
//! stage executor that drives pipelines against a processing engine.
//!
//! The split mirrors the data flow: [`registry::JobRegistry`] owns every
//! job-record transition, [`executor::StageExecutor`] owns the worker loop
//! and retry policy, and [`collaborators`] defines the traits the executor
//! calls out through (processing engine, blob store, audio inspector).

pub mod blob;
pub mod collaborators;
pub mod error;
pub mod executor;
pub mod inspect;
pub mod registry;
pub mod remote;
pub mod stages;
