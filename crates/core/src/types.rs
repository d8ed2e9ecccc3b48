/// Build job identifiers are opaque strings of the form `<exercise>-<uuid v7>`.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh job identifier for `exercise`.
///
/// UUIDv7 is time ordered and carries random bits, so concurrent callers
/// never collide.
pub fn new_job_id(exercise: &str) -> JobId {
    format!("{exercise}-{}", uuid::Uuid::now_v7())
}
