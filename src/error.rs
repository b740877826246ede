// src/error.rs

use std::fmt;
use std::io;

/// Custom `Error` type for ring buffer and journal operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A buffer was requested with zero capacity.
    InvalidCapacity(usize),
    /// The cursor was moved outside `[0, size)`.
    OutOfRange { value: usize, size: usize },
    /// An index, offset or count fell outside the addressed storage.
    IndexOutOfRange { index: usize, len: usize },
    /// A journal record frame does not fit in the buffer.
    RecordTooLarge { len: usize, capacity: usize },
    /// A snapshot file is shorter than its fixed header.
    TruncatedSnapshot { len: usize, expected: usize },
    /// Captures OS-specific error codes.
    OsError(u32),
    /// Represents any unexpected error.
    Unexpected,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCapacity(c) => write!(f, "Invalid buffer capacity: {}", c),
            Error::OutOfRange { value, size } => {
                write!(f, "Position {} out of range for buffer of size {}", value, size)
            }
            Error::IndexOutOfRange { index, len } => {
                write!(f, "Index {} out of range for length {}", index, len)
            }
            Error::RecordTooLarge { len, capacity } => write!(
                f,
                "Record of {} bytes does not fit in buffer of {} bytes",
                len, capacity
            ),
            Error::TruncatedSnapshot { len, expected } => write!(
                f,
                "Snapshot of {} bytes is shorter than its {} byte header",
                len, expected
            ),
            Error::OsError(code) => write!(f, "OS error with code: {}", code),
            Error::Unexpected => write!(f, "Unexpected error occurred"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(code) => Error::OsError(code as u32),
            None => Error::Unexpected,
        }
    }
}

impl Error {
    /// Maps the custom `Error` type to process exit codes.
    pub fn to_status_code(&self) -> u32 {
        match self {
            Error::OsError(_) => 1,
            Error::Unexpected => 3,
            Error::InvalidCapacity(_) => 4,
            Error::OutOfRange { .. } | Error::IndexOutOfRange { .. } => 5,
            Error::RecordTooLarge { .. } => 6,
            Error::TruncatedSnapshot { .. } => 7,
        }
    }
}
