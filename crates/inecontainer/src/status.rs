//! Rich result/error value shared by every fallible operation in the crate.
//!
//! `Status` plays the role the C++ original gives a polymorphic
//! `Container::Status` with a pointer-to-implementation payload: a class, a
//! numeric code, and a human description. Rust has no use for the pointer
//! indirection (see `DESIGN.md`), so this is a plain value type that still
//! carries the same three observable properties.

use std::fmt;

/// Coarse category of a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// No information is carried; the default value.
    NoStatus,
    /// The backing store failed a read, write, extend, or flush.
    FilesystemError,
    /// On-disk data violates the chunk format (bad magic, unknown type,
    /// out-of-range size class, identifier too long, ...).
    FormatError,
    /// A chunk's CRC did not match its contents.
    CrcError,
    /// The container's major version does not match what this crate writes.
    VersionError,
    /// An operation was attempted from an invalid state (e.g. `save()`
    /// before a type was set).
    StateError,
    /// The free-space manager could not satisfy a reservation.
    AllocationError,
}

/// A result value carrying `(class, error_code, description)`.
///
/// `Status::default()` is the `NO_STATUS` value: class `NoStatus`, code 0,
/// empty description. It is simultaneously a "success" and "recoverable"
/// and carries no information (`information_available()` is false).
///
/// A non-default status may still not be a failure — `failure()` is an
/// explicit bit set by the constructor that built the status, not derived
/// from `class` alone, mirroring the source library where a caller can
/// build a `FILESYSTEM_ERROR`-classed status that is merely a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    class: StatusClass,
    error_code: i32,
    description: String,
    is_failure: bool,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            class: StatusClass::NoStatus,
            error_code: 0,
            description: String::new(),
            is_failure: false,
        }
    }
}

impl Status {
    /// The `NO_STATUS` value. Equivalent to [`Status::default`].
    pub fn ok() -> Self {
        Self::default()
    }

    /// Build a non-failing, informative status (a warning).
    pub fn warning(class: StatusClass, error_code: i32, description: impl Into<String>) -> Self {
        Self {
            class,
            error_code,
            description: description.into(),
            is_failure: false,
        }
    }

    /// Build a failing status.
    pub fn failure(class: StatusClass, error_code: i32, description: impl Into<String>) -> Self {
        Self {
            class,
            error_code,
            description: description.into(),
            is_failure: true,
        }
    }

    /// The status's class.
    pub fn status_class(&self) -> StatusClass {
        self.class
    }

    /// The status's numeric error code. Zero for [`Status::default`].
    pub fn error_code(&self) -> i32 {
        self.error_code
    }

    /// The status's human-readable description. Empty for [`Status::default`].
    pub fn description(&self) -> &str {
        &self.description
    }

    /// True unless this is the default `NO_STATUS` value.
    pub fn information_available(&self) -> bool {
        *self != Status::default()
    }

    /// True unless [`Status::failure`] built this value.
    pub fn success(&self) -> bool {
        !self.is_failure
    }

    /// True iff this status represents a failure.
    pub fn failure_bit(&self) -> bool {
        self.is_failure
    }

    /// True unless this status is an unrecoverable failure.
    pub fn recoverable(&self) -> bool {
        !self.is_failure
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.information_available() {
            return write!(f, "no status");
        }
        write!(
            f,
            "{:?} (code {}): {}",
            self.class, self.error_code, self.description
        )
    }
}

impl std::error::Error for Status {}

/// Result alias used throughout the crate; the error type is [`Status`]
/// itself rather than a `thiserror` enum, since `Status` already carries
/// class/code/description and the `?` operator composes with it directly.
pub type Result<T> = std::result::Result<T, Status>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_no_status() {
        let status = Status::default();
        assert!(!status.information_available());
        assert!(status.recoverable());
        assert!(status.success());
        assert!(!status.failure_bit());
        assert_eq!(status.error_code(), 0);
        assert_eq!(status.status_class(), StatusClass::NoStatus);
        assert!(status.description().is_empty());
    }

    #[test]
    fn non_default_warning_is_still_success() {
        let status = Status::warning(StatusClass::FilesystemError, 1, "Error description");
        assert!(status.information_available());
        assert!(status.recoverable());
        assert!(status.success());
        assert!(!status.failure_bit());
        assert_eq!(status.error_code(), 1);
        assert_eq!(status.status_class(), StatusClass::FilesystemError);
        assert_eq!(status.description(), "Error description");
    }

    #[test]
    fn explicit_failure_reports_failure() {
        let status = Status::failure(StatusClass::CrcError, 7, "bad crc");
        assert!(status.information_available());
        assert!(!status.recoverable());
        assert!(!status.success());
        assert!(status.failure_bit());
    }

    #[test]
    fn clone_preserves_fields() {
        let status = Status::warning(StatusClass::FilesystemError, 1, "Error description");
        let cloned = status.clone();
        assert_eq!(cloned.error_code(), 1);
        assert_eq!(cloned.status_class(), StatusClass::FilesystemError);
        assert_eq!(cloned.description(), "Error description");
    }

    #[test]
    fn assignment_replaces_value() {
        let mut status = Status::default();
        assert!(!status.information_available());

        let other = Status::warning(StatusClass::FilesystemError, 1, "Error description");
        status = other;

        assert!(status.information_available());
        assert_eq!(status.error_code(), 1);
        assert_eq!(status.status_class(), StatusClass::FilesystemError);
        assert_eq!(status.description(), "Error description");
    }
}
