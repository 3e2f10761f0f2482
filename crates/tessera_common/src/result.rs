//! Common result and error types for the Tessera placement engine.

/// The standard result type for fallible placement operations.
///
/// `Ok` contains the result value. `Err` indicates an unrecoverable internal
/// error (a bug in Tessera or a batch with no usable outcome), not a
/// quality problem with a particular floorplan. Quality problems are
/// represented as cost penalties and reported through
/// [`DiagnosticSink`](../tessera_diagnostics) by the callers.
pub type TesseraResult<T> = Result<T, InternalError>;

/// An internal placement error indicating a bug or an unusable run.
///
/// These errors should never occur during normal operation on a well-formed
/// placement problem. If one does occur, the run that produced it must be
/// discarded.
#[derive(Debug, thiserror::Error)]
#[error("internal placement error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("packer lost an index");
        assert_eq!(
            format!("{err}"),
            "internal placement error: packer lost an index"
        );
    }

    #[test]
    fn ok_path() {
        let r: TesseraResult<i32> = Ok(42);
        assert!(r.is_ok());
        assert_eq!(r.ok(), Some(42));
    }

    #[test]
    fn err_path() {
        let r: TesseraResult<i32> = Err(InternalError::new("test error"));
        assert!(r.is_err());
        assert_eq!(r.err().unwrap().message, "test error");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
