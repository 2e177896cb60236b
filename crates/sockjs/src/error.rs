/// Unified error type for everything the protocol surface can reject.
///
/// The `Display` text of each variant is wire-visible: transports send it
/// verbatim as the plain-text body of the HTTP error response, so the exact
/// wording is part of the protocol and matched by the test suite.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SockJsError {
    /// A send request arrived with an empty body.
    #[error("Payload expected.")]
    PayloadExpected,
    /// A send request body was not a valid JSON array of strings.
    #[error("Broken JSON encoding.")]
    BrokenJson,
    /// The target session does not exist, or is past the point of accepting
    /// traffic. The client is expected to start a fresh session.
    #[error("Session is not open!")]
    SessionNotOpen,
    /// A script-injection transport was called without its callback name.
    #[error("\"callback\" parameter required")]
    CallbackRequired,
    /// The supplied callback name contains characters that cannot be safely
    /// emitted into a script body.
    #[error("invalid \"callback\" parameter")]
    InvalidCallback,
}

impl SockJsError {
    /// HTTP status the error surfaces with.
    pub fn status_code(&self) -> u16 {
        match self {
            SockJsError::SessionNotOpen => 404,
            SockJsError::PayloadExpected
            | SockJsError::BrokenJson
            | SockJsError::CallbackRequired
            | SockJsError::InvalidCallback => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_match_protocol_wording() {
        assert_eq!(SockJsError::PayloadExpected.to_string(), "Payload expected.");
        assert_eq!(
            SockJsError::BrokenJson.to_string(),
            "Broken JSON encoding."
        );
        assert_eq!(
            SockJsError::SessionNotOpen.to_string(),
            "Session is not open!"
        );
        assert_eq!(
            SockJsError::CallbackRequired.to_string(),
            "\"callback\" parameter required"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(SockJsError::SessionNotOpen.status_code(), 404);
        assert_eq!(SockJsError::PayloadExpected.status_code(), 500);
        assert_eq!(SockJsError::BrokenJson.status_code(), 500);
        assert_eq!(SockJsError::CallbackRequired.status_code(), 500);
    }
}
