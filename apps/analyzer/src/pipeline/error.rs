use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Stage failures of the resume pipeline. The orchestrator turns every one of
/// these into a job status of `error` with `to_string()` as the stored message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ExtractionFailure: {0}")]
    ExtractionFailure(String),

    #[error("EntityRecognitionFailure: {0}")]
    EntityRecognitionFailure(String),

    #[error("SchemaParseFailure: {0}")]
    SchemaParse(String),

    #[error("GenerationFailure: {0}")]
    GenerationFailure(String),

    #[error("TimeoutExceeded: job did not finish within {}s", .0.as_secs())]
    TimeoutExceeded(Duration),

    #[error("NotFound: job {0}")]
    NotFound(Uuid),

    #[error("Storage: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_budget() {
        let err = PipelineError::TimeoutExceeded(Duration::from_secs(300));
        assert_eq!(
            err.to_string(),
            "TimeoutExceeded: job did not finish within 300s"
        );
    }
}
