use std::io;

use crate::instance::InstanceId;

/// Errors reported by a terminal process backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no backend available for authority '{}'", .authority.as_deref().unwrap_or("local"))]
    Unavailable { authority: Option<String> },

    #[error("backend request failed: {0}")]
    RequestFailed(String),

    #[error("process not found: {0}")]
    ProcessNotFound(u32),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl BackendError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BackendError::Unavailable { .. } => "backend_unavailable",
            BackendError::RequestFailed(_) => "backend_request_failed",
            BackendError::ProcessNotFound(_) => "process_not_found",
            BackendError::Io(_) => "io_error",
            BackendError::Serde(_) => "serialization_error",
        }
    }
}

/// Errors surfaced by [`TerminalService`](crate::service::TerminalService) operations.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("process support has not been registered; register a backend first")]
    ProcessSupportNotRegistered,

    #[error("no active terminal instance")]
    NoActiveInstance,

    #[error("terminal instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("terminal service is shutting down")]
    ShuttingDown,

    #[error("no provider registered for profile '{extension_identifier}/{profile_id}'")]
    ProfileProviderNotFound {
        extension_identifier: String,
        profile_id: String,
    },

    #[error("contributed profile '{extension_identifier}/{profile_id}' failed: {message}")]
    ContributedProfileFailed {
        extension_identifier: String,
        profile_id: String,
        message: String,
    },

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl TerminalError {
    /// Stable error code string, suitable for logs and embedder replies.
    pub fn error_code(&self) -> &'static str {
        match self {
            TerminalError::ProcessSupportNotRegistered => "process_support_not_registered",
            TerminalError::NoActiveInstance => "no_active_instance",
            TerminalError::InstanceNotFound(_) => "instance_not_found",
            TerminalError::ShuttingDown => "shutting_down",
            TerminalError::ProfileProviderNotFound { .. } => "profile_provider_not_found",
            TerminalError::ContributedProfileFailed { .. } => "contributed_profile_failed",
            TerminalError::Backend(e) => e.error_code(),
        }
    }

    /// Whether this error is caused by caller input rather than the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TerminalError::NoActiveInstance
                | TerminalError::InstanceNotFound(_)
                | TerminalError::ProfileProviderNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TerminalError::InstanceNotFound(InstanceId(4));
        assert_eq!(err.to_string(), "terminal instance not found: 4");
        assert_eq!(err.error_code(), "instance_not_found");
        assert!(err.is_user_error());
    }

    #[test]
    fn test_error_codes() {
        let cases: Vec<(TerminalError, &str)> = vec![
            (
                TerminalError::ProcessSupportNotRegistered,
                "process_support_not_registered",
            ),
            (TerminalError::NoActiveInstance, "no_active_instance"),
            (TerminalError::ShuttingDown, "shutting_down"),
            (
                TerminalError::ProfileProviderNotFound {
                    extension_identifier: "ext".to_string(),
                    profile_id: "p".to_string(),
                },
                "profile_provider_not_found",
            ),
            (
                TerminalError::ContributedProfileFailed {
                    extension_identifier: "ext".to_string(),
                    profile_id: "p".to_string(),
                    message: "boom".to_string(),
                },
                "contributed_profile_failed",
            ),
            (
                TerminalError::Backend(BackendError::ProcessNotFound(9)),
                "process_not_found",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.error_code(), code, "wrong code for {err}");
        }
    }

    #[test]
    fn test_configuration_errors_are_not_user_errors() {
        assert!(!TerminalError::ProcessSupportNotRegistered.is_user_error());
        assert!(!TerminalError::ShuttingDown.is_user_error());
        assert!(!TerminalError::Backend(BackendError::RequestFailed("x".into())).is_user_error());
    }

    #[test]
    fn test_unavailable_display_names_local() {
        let err = BackendError::Unavailable { authority: None };
        assert_eq!(err.to_string(), "no backend available for authority 'local'");
        let err = BackendError::Unavailable {
            authority: Some("ssh-remote+box".to_string()),
        };
        assert!(err.to_string().contains("ssh-remote+box"));
    }

    #[test]
    fn test_io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: TerminalError = BackendError::from(io_err).into();
        assert_eq!(err.error_code(), "io_error");
    }
}
