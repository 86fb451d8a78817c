use thiserror::Error;

/// Failure modes of a remote store call.
///
/// `keydeck-core` maps these into node-level `Error` states and
/// user-facing diagnostics; consumers never see raw socket errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// TCP-level connect failure (refused, DNS, unreachable).
    #[error("cannot connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    /// The store rejected the configured credentials.
    #[error("authentication rejected: {message}")]
    Authentication { message: String },

    /// The call did not complete within the client's deadline.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The store answered with something the client could not interpret.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// A database index outside the instance's configured range.
    #[error("database {index} does not exist")]
    NoSuchDatabase { index: u16 },

    /// The underlying connection is gone.
    #[error("store is disconnected")]
    Disconnected,
}

impl ApiError {
    /// `true` if retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Timeout { .. } | Self::Disconnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_failures_are_transient() {
        assert!(ApiError::Disconnected.is_transient());
        assert!(ApiError::Timeout { timeout_secs: 30 }.is_transient());
        assert!(
            ApiError::Connect {
                host: "127.0.0.1".into(),
                port: 6379,
                reason: "refused".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn rejections_are_not_transient() {
        assert!(
            !ApiError::Authentication {
                message: "bad password".into(),
            }
            .is_transient()
        );
        assert!(!ApiError::NoSuchDatabase { index: 99 }.is_transient());
        assert!(
            !ApiError::Protocol {
                message: "unexpected frame".into(),
            }
            .is_transient()
        );
    }
}
