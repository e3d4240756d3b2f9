use std::{fmt::Display, io, num::NonZeroU32};

/// Error returned from driver construction, reads, and [`Transport`][crate::Transport]
/// implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub(crate) kind: ErrorKind,
    pub(crate) code: Option<NonZeroU32>,
    pub(crate) message: &'static str,
}

impl Error {
    /// Create an error with the given kind and message.
    ///
    /// This is public so that out-of-crate [`Transport`][crate::Transport]
    /// implementations can report failures.
    pub fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            code: None,
            message,
        }
    }

    /// Create an error carrying an OS error code.
    pub fn new_os(kind: ErrorKind, message: &'static str, code: u32) -> Self {
        Self {
            kind,
            code: NonZeroU32::new(code),
            message,
        }
    }

    #[track_caller]
    pub(crate) fn log_error(self) -> Self {
        log::error!("{}", self);
        self
    }

    #[track_caller]
    pub(crate) fn log_debug(self) -> Self {
        log::debug!("{}", self);
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error code from the OS, if applicable.
    ///
    /// On Linux this is the `errno` value.
    pub fn os_error(&self) -> Option<u32> {
        self.code.map(|c| c.get())
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
use crate::platform::format_os_error_code;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn format_os_error_code(f: &mut std::fmt::Formatter<'_>, code: u32) -> std::fmt::Result {
    write!(f, "error {}", code)
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = self.code {
            write!(f, " (")?;
            format_os_error_code(f, code.get())?;
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind {
            ErrorKind::NoMidiInterface => io::ErrorKind::InvalidInput,
            ErrorKind::Disconnected => io::ErrorKind::NotConnected,
            ErrorKind::Busy => io::ErrorKind::Other, // TODO: ResourceBusy once MSRV reaches 1.83
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            ErrorKind::Other => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// General category of error as part of an [`Error`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The configuration descriptor has no MIDI streaming interface with a
    /// usable IN endpoint. Try the next device.
    NoMidiInterface,

    /// Device is disconnected.
    Disconnected,

    /// Device or interface is in use by another application, kernel driver, or handle.
    Busy,

    /// This user or application does not have permission to perform the requested operation.
    PermissionDenied,

    /// Requested device or configuration not found.
    NotFound,

    /// The requested operation is not supported by the platform or its currently-configured driver.
    Unsupported,

    /// Uncategorized error.
    Other,
}

#[test]
fn test_display_with_code() {
    let e = Error::new(ErrorKind::Other, "bulk transfer failed");
    assert_eq!(e.to_string(), "bulk transfer failed");
    assert_eq!(e.os_error(), None);

    let e = Error::new_os(ErrorKind::Busy, "failed to claim interface", 16);
    assert!(e.to_string().starts_with("failed to claim interface ("));
    assert_eq!(e.os_error(), Some(16));
    assert_eq!(e.kind(), ErrorKind::Busy);
}

#[test]
fn test_into_io_error() {
    let e: io::Error = Error::new(ErrorKind::Disconnected, "device disconnected").into();
    assert_eq!(e.kind(), io::ErrorKind::NotConnected);

    let e: io::Error = Error::new(ErrorKind::NoMidiInterface, "no MIDI interface").into();
    assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
}
