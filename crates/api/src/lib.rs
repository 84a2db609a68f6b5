//! HTTP surface of the voice platform.
//!
//! Thin handlers over [`parrot_engine::registry::JobRegistry`] and the
//! repositories: ingest uploads, submit jobs, expose pollable snapshots
//! and finished artifacts.

pub mod config;
pub mod error;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
