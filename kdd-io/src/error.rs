//! Error types for kdd-io

use crate::options::IteratorType;
use crate::status::Status;

/// Result type for kdd-io operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kdd-io operations
///
/// Everything here is raised before a command reaches the device, or by
/// the device layer outside of a command completion. The result of a
/// completed data command is a [`Status`], not an `Error`; a failed
/// iterator open is the exception, since no handle can be returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller option does not map to a device option
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Invalid argument provided
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An open iterator already uses this bitmask/pattern pair
    #[error("Iterator with bitmask {bitmask:#x} and pattern {pattern:#x} is already open")]
    IteratorAlreadyOpen { bitmask: u32, pattern: u32 },

    /// The device has no free iterator slot
    #[error("Iterator limit exceeded: {0} iterators open")]
    IteratorLimitExceeded(usize),

    /// Existence check on more than one key
    #[error("Exist supports a single key per command, got {0}")]
    MultiKeyExist(usize),

    /// Iterator type not supported by this adapter
    #[error("Iterator type {0:?} is not supported")]
    UnsupportedIterator(IteratorType),

    /// Device refused a call, or an iterator open completed with a failure
    #[error("Device error: {0}")]
    Device(Status),

    /// Submission queue stayed full for the whole retry budget
    #[error("Submission queue is full after {0} retries")]
    QueueFull(usize),

    /// Completion was dropped without a result
    #[error("Operation cancelled")]
    Cancelled,

    /// Queue or device teardown failed
    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

impl Error {
    /// Fatal configuration errors leave the adapter unusable for the request.
    ///
    /// Callers should stop issuing commands of this kind rather than retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MultiKeyExist(_) | Error::UnsupportedIterator(_) | Error::Shutdown(_)
        )
    }

    /// Create from a device status.
    pub fn from_status(status: Status) -> Self {
        Error::Device(status)
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Device(status)
    }
}
