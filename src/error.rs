use thiserror::Error;

/// All possible error states a crate operation can fail with.
///
/// Mirrors the `SPLVerror` taxonomy of the reference format: every
/// fallible operation returns one of these instead of aborting or
/// panicking. `Display` (via `#[error(...)]`) doubles as the
/// `error_to_string` conversion callers need for logging.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller passed arguments that are structurally invalid
    /// (non-positive dimensions, zero gop size, ...).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The bitstream or file being read is malformed or corrupt.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An allocation failed, or a requested size exceeds a hard limit.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// The output or input file could not be opened.
    #[error("file open: {0}")]
    FileOpen(String),
    /// A read against a file or buffer reader failed or ran past EOF.
    #[error("file read: {0}")]
    FileRead(String),
    /// A write against a file or buffer writer failed.
    #[error("file write: {0}")]
    FileWrite(String),
    /// A precondition holding across calls (e.g. decode dependencies)
    /// was violated.
    #[error("runtime: {0}")]
    Runtime(String),
    /// An invariant that should be impossible to violate was violated.
    #[error("internal error: {0}")]
    Internal(String),
    /// A worker-pool or threading operation failed.
    #[error("threading: {0}")]
    Threading(String),
}

/// A specialized `Result` type for fallible crate operations.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Maps an I/O failure encountered while reading to [`Error::FileRead`].
pub fn io_read(e: ::std::io::Error) -> Error {
    Error::FileRead(e.to_string())
}

/// Maps an I/O failure encountered while writing to [`Error::FileWrite`].
pub fn io_write(e: ::std::io::Error) -> Error {
    Error::FileWrite(e.to_string())
}
