//! Error taxonomy shared by every fallible operation in the crate.

use std::fmt;

/// Convenient result alias used throughout the crate.
///
/// The void-success case is simply `Result<()>`; Rust's unit type already is
/// the "succeeded with no value" the source's explicit void variant emulated.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Taxonomy of failures that can cross a public API boundary.
///
/// No stack traces or causal chains cross the boundary: every internal error
/// (I/O, AEAD tag mismatch, KEM failure, malformed on-disk bytes) is mapped
/// onto one of these kinds at the point it would otherwise leave the crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested path does not resolve to any entry.
    FileNotFound,
    /// The caller is not permitted to perform the requested operation.
    PermissionDenied,
    /// An entry with that name already exists where one was expected not to.
    AlreadyExists,
    /// The resolved entry is a file where a directory was required.
    NotADirectory,
    /// The resolved entry is a directory where a file was required.
    NotAFile,
    /// The host file system reported a hard I/O failure.
    IoError,
    /// A call argument was malformed (bad seek target, empty KEM mode, ...).
    InvalidArgument,
    /// The requested capability has no implementation yet.
    NotImplemented,
    /// The requested capability is never supported by this engine (e.g. mount).
    NotSupported,
    /// No hardware security module is available and none was expected to be required.
    HsmUnavailable,
    /// Initialisation of a component (container, provider, HSM) failed.
    InitializationFailed,
    /// On-disk bytes did not match the expected container/entry/metadata format.
    InvalidFormat,
    /// A resource-monitor limit would be exceeded by the requested operation.
    ResourceExhausted,
    /// A failure that does not map to any of the above.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorKind::FileNotFound => "file not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NotADirectory => "not a directory",
            ErrorKind::NotAFile => "not a file",
            ErrorKind::IoError => "I/O error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::HsmUnavailable => "hardware security module unavailable",
            ErrorKind::InitializationFailed => "initialization failed",
            ErrorKind::InvalidFormat => "invalid format",
            ErrorKind::ResourceExhausted => "resource limit exceeded",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(message)
    }
}

impl std::error::Error for ErrorKind {}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorKind::InvalidArgument
            }
            _ => ErrorKind::IoError,
        }
    }
}
