/// Entity identifiers are UUIDv4.
pub type JobId = uuid::Uuid;
pub type ProfileId = uuid::Uuid;
pub type SampleId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
