//! Result type definition and extension traits.

use crate::error::Error;

/// The standard Result type for Eirenyx operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logging combinators for Results.
///
/// Used where a failure is deliberately non-fatal (status writes after a
/// successful sync, illustrative report evidence) and must not abort the
/// surrounding reconcile.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self, context: &str) -> Option<T>;

    /// Inspect the error without consuming the Result.
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "{context}");
                None
            }
        }
    }

    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_option_logged_swallows_error() {
        let result: Result<u32> = Err(Error::transient("status update", "conflict"));
        assert_eq!(result.into_option_logged("status update failed"), None);
    }

    #[test]
    fn test_inspect_error_sees_error() {
        let mut seen = false;
        let result: Result<u32> = Err(Error::validation("bad"));
        let _ = result.inspect_error(|_| seen = true);
        assert!(seen);
    }
}
