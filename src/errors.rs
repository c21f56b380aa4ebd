use thiserror::Error;

/// Failures reported by a camera back-end while acquiring or reading a stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("camera API is not available")]
    NotSupported,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The constraint could not be met exactly; callers may retry relaxed.
    #[error("no camera satisfies {0}")]
    Overconstrained(String),
    #[error("requested device not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Aborted(String),
}

/// Every failure the controller can surface to the user.
///
/// Each variant maps to one class of the error taxonomy; [`TransformError::user_message`]
/// renders the text written into the error region.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Camera access is not supported on this system")]
    Unsupported,

    #[error("{context}: {source}")]
    Camera {
        context: &'static str,
        #[source]
        source: MediaError,
    },

    #[error("Camera is not active")]
    CameraInactive,

    #[error("Failed to capture photo: {0}")]
    Capture(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Transport(String),

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("{0}")]
    Application(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl TransformError {
    /// Whether the error came out of the upload pipeline.
    pub fn is_upload_failure(&self) -> bool {
        matches!(
            self,
            TransformError::Transport(_)
                | TransformError::Server { .. }
                | TransformError::Application(_)
                | TransformError::MalformedResponse(_)
        )
    }

    pub fn user_message(&self) -> String {
        if self.is_upload_failure() {
            format!("Error: {}", self)
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_failures_are_prefixed() {
        let err = TransformError::Server {
            status: 500,
            message: "model unavailable".to_string(),
        };
        assert_eq!(err.user_message(), "Error: model unavailable");

        let err = TransformError::Application("no object detected".to_string());
        assert_eq!(err.user_message(), "Error: no object detected");
    }

    #[test]
    fn test_camera_messages_carry_context() {
        let err = TransformError::Camera {
            context: "Camera not available",
            source: MediaError::NotFound("camera 1".to_string()),
        };
        assert_eq!(
            err.user_message(),
            "Camera not available: requested device not found: camera 1"
        );
        assert!(!err.is_upload_failure());
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = TransformError::Validation("Please select an image file".to_string());
        assert_eq!(err.user_message(), "Please select an image file");
    }
}
