use std::fmt;

/// Failure taxonomy for a single chat call.
///
/// `Timeout` is kept distinct so the UI layer can show "try again" instead
/// of a generic failure. Extraction fallbacks never surface here; parsing
/// degradation is not an error.
#[derive(Debug, Clone)]
pub enum LlmError {
    /// The abort timer fired before the provider responded.
    Timeout { after_secs: u64 },
    /// Provider returned a non-2xx response.
    Http { status: u16, body: String },
    /// Connection-level failure, or a response body we could not decode.
    Transport { detail: String },
}

impl LlmError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout { .. })
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Timeout { after_secs } => {
                write!(f, "LLM request timed out after {after_secs}s")
            }
            LlmError::Http { status, body } => {
                write!(f, "LLM provider returned HTTP {status}: {body}")
            }
            LlmError::Transport { detail } => write!(f, "LLM transport error: {detail}"),
        }
    }
}

impl std::error::Error for LlmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_distinguishable_from_other_failures() {
        assert!(LlmError::Timeout { after_secs: 45 }.is_timeout());
        assert!(!LlmError::Http {
            status: 502,
            body: "bad gateway".to_string()
        }
        .is_timeout());
        assert!(!LlmError::Transport {
            detail: "connection reset".to_string()
        }
        .is_timeout());
    }
}
