use thiserror::Error;

#[derive(Error, Debug)]
pub enum CutterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{tool} stalled: no progress for {idle_secs}s, process killed")]
    Stall { tool: String, idle_secs: u64 },

    #[error("Required tool not available: {0}")]
    ToolMissing(String),

    #[error("{tool} exited with status {code:?}: {tail}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        tail: String,
    },

    #[error("Download too small: {path} is {bytes} bytes (minimum {min_bytes})")]
    DownloadTooSmall {
        path: String,
        bytes: u64,
        min_bytes: u64,
    },

    #[error("Seek past end of stream at {start:.3}s: {detail}")]
    UnsupportedSeek { start: f64, detail: String },

    #[error("Probe failed: {0}")]
    ProbeFailure(String),

    #[error("{stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("{source}. {hint}")]
    WithHint {
        #[source]
        source: Box<CutterError>,
        hint: String,
    },

    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

impl CutterError {
    pub fn stage<S1: Into<String>, S2: Into<String>>(stage: S1, message: S2) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Attach an actionable hint to the rendered message.
    pub fn with_hint<S: Into<String>>(self, hint: S) -> Self {
        Self::WithHint {
            source: Box::new(self),
            hint: hint.into(),
        }
    }

    /// The innermost error, looking through hints.
    pub fn root(&self) -> &CutterError {
        match self {
            Self::WithHint { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_stall(&self) -> bool {
        matches!(self.root(), Self::Stall { .. })
    }
}

impl From<redis::RedisError> for CutterError {
    fn from(err: redis::RedisError) -> Self {
        Self::Queue(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CutterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_is_appended_to_message() {
        let err = CutterError::ToolMissing("yt-dlp".to_string())
            .with_hint("Install yt-dlp and make sure it is on PATH");
        assert_eq!(
            err.to_string(),
            "Required tool not available: yt-dlp. Install yt-dlp and make sure it is on PATH"
        );
        assert!(matches!(err.root(), CutterError::ToolMissing(_)));
    }

    #[test]
    fn stall_is_detected_through_hint() {
        let err = CutterError::Stall {
            tool: "yt-dlp".to_string(),
            idle_secs: 900,
        }
        .with_hint("retry later");
        assert!(err.is_stall());
    }
}
