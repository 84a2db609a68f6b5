//! Row models.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct
//! matching the database row, plus any insert DTOs.

pub mod job;
pub mod profile;
pub mod sample;
