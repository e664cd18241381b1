use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubgenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No usable {tool} executable found (tried: {})", candidates.join(", "))]
    ToolNotFound { tool: String, candidates: Vec<String> },

    #[error("Required {resource} not found: {path}")]
    ResourceNotFound { resource: String, path: String },

    #[error("Audio extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Expected tool output missing: {0}")]
    OutputMissing(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SubgenError {
    /// True when the run was aborted by request rather than by a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SubgenError::Cancelled)
    }

    pub(crate) fn resource_not_found(resource: &str, path: impl AsRef<std::path::Path>) -> Self {
        SubgenError::ResourceNotFound {
            resource: resource.to_string(),
            path: path.as_ref().display().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SubgenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_lists_candidates() {
        let err = SubgenError::ToolNotFound {
            tool: "ffmpeg".to_string(),
            candidates: vec!["ffmpeg".to_string(), "/usr/bin/ffmpeg".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No usable ffmpeg executable found (tried: ffmpeg, /usr/bin/ffmpeg)"
        );
    }

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(SubgenError::Cancelled.is_cancelled());
        assert!(!SubgenError::TranscriptionFailed("boom".to_string()).is_cancelled());
    }
}
