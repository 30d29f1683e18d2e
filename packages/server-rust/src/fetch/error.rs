use sensorlink_core::DecodeError;

/// Failure of a single attempt against the producer.
///
/// Both variants count against the retry budget and are never surfaced
/// directly; they only appear as the `last` cause of
/// [`FetchError::RemoteUnavailable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("attempt timed out after {timeout_ms}ms")]
    RemoteTimeout { timeout_ms: u64 },
    #[error("{0}")]
    RemoteFailure(String),
}

/// Errors surfaced by [`ResilientFetchClient`](super::ResilientFetchClient).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The producer answered with a payload that is not a measurement.
    /// Never retried.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Every attempt failed and no fallback is configured.
    #[error("remote producer unavailable after {attempts} attempts: {last}")]
    RemoteUnavailable { attempts: u32, last: AttemptError },
}

impl FetchError {
    /// Short, stable name used in logs and error bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::RemoteUnavailable { .. } => "remote_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensorlink_core::Measurement;

    #[test]
    fn remote_unavailable_message_names_attempts_and_cause() {
        let err = FetchError::RemoteUnavailable {
            attempts: 11,
            last: AttemptError::RemoteTimeout { timeout_ms: 500 },
        };
        assert_eq!(
            err.to_string(),
            "remote producer unavailable after 11 attempts: attempt timed out after 500ms"
        );
        assert_eq!(err.kind(), "remote_unavailable");
    }

    #[test]
    fn decode_error_converts_transparently() {
        let decode = Measurement::decode(b"").unwrap_err();
        let err: FetchError = decode.into();
        assert_eq!(err.to_string(), "empty measurement payload");
        assert_eq!(err.kind(), "decode_error");
    }
}
