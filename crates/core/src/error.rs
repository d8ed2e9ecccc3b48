#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },
}

impl CoreError {
    /// Shorthand for a missing build job.
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "build job",
            id: id.into(),
        }
    }
}
