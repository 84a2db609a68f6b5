//! Data access layer.
//!
//! Repositories are stateless structs whose methods take the pool
//! explicitly. Job mutations are versioned compare-and-swap updates.

mod job_repo;
mod profile_repo;
mod sample_repo;

pub use job_repo::JobRepo;
pub use profile_repo::ProfileRepo;
pub use sample_repo::SampleRepo;
