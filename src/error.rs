//! Error types for the linearizer.
//!
//! Parsing, layout and output failures all surface through [`Error`].

/// Result type alias for linearizer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing or linearizing a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: u64,
        /// Reason for parse failure
        reason: String,
    },

    /// Padding was requested for a position that has already been passed.
    ///
    /// Raised by `fill_until` when the first pass under-estimated the size
    /// of a region. Fatal for the current document.
    #[error(
        "Failed to add padding characters because the current position is already beyond \
         the requested one. Current pos: {current} Requested pos: {requested}"
    )]
    LayoutUnderEstimate {
        /// Writer position when padding was requested
        current: u64,
        /// Position padding should have reached
        requested: u64,
    },

    /// Operation that the linearizing writer never permits (e.g. assigning object numbers).
    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    /// Operation that a component deliberately does not provide.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A real xref range did not have the number of entries reserved for it.
    #[error("Xref entry count mismatch: expected {expected}, found {found}")]
    XrefEntryCountMismatch {
        /// Entries reserved during layout
        expected: usize,
        /// Entries actually supplied
        found: usize,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error() {
        let err = Error::ParseError {
            offset: 1234,
            reason: "invalid token".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn test_layout_under_estimate_error() {
        let err = Error::LayoutUnderEstimate {
            current: 2048,
            requested: 2000,
        };
        let msg = err.to_string();
        assert!(msg.contains("Current pos: 2048"));
        assert!(msg.contains("Requested pos: 2000"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        assert!(err.to_string().contains("10 0 R"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.pdf");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("missing.pdf"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
