//! Customized unified error type.

use std::error;
use std::fmt;
use std::io;
use std::num;

/// Customized error type for p4perf.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct P4PerfError(pub(crate) String);

impl P4PerfError {
    pub fn msg(msg: impl ToString) -> Self {
        P4PerfError(msg.to_string())
    }
}

impl fmt::Display for P4PerfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for P4PerfError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `P4PerfError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for P4PerfError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                P4PerfError(e.to_string())
            }
        }
    };
}

// Helper macro for saving boiler-plate `impl From<X<T>>`s for transparent
// conversion from various common generic error types to `P4PerfError`.
macro_rules! impl_from_error_generic {
    ($error:ty) => {
        impl<T> From<$error> for P4PerfError {
            fn from(e: $error) -> P4PerfError {
                P4PerfError::msg(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(num::TryFromIntError);
impl_from_error!(toml::ser::Error);
impl_from_error!(toml::de::Error);
impl_from_error!(rmp_serde::encode::Error);
impl_from_error!(rmp_serde::decode::Error);
impl_from_error!(tokio::sync::oneshot::error::RecvError);
impl_from_error!(tokio::time::error::Elapsed);

impl_from_error_generic!(tokio::sync::mpsc::error::SendError<T>);

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = P4PerfError("what the heck?".into());
        assert_eq!(format!("{}", e), String::from("what the heck?"));
    }

    #[test]
    fn from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "oh no!");
        let e = P4PerfError::from(io_error);
        assert!(e.0.contains("oh no!"));
    }

    #[test]
    fn from_int_error() {
        let int_error = u32::try_from(u64::MAX).unwrap_err();
        let e = P4PerfError::from(int_error);
        assert!(!e.0.is_empty());
    }
}
