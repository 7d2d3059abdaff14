//! Raw device result codes.
//!
//! The device command layer reports every outcome as a `u32` code. The
//! adapter passes these codes upward unchanged, so [`Status`] is a thin
//! newtype rather than a closed enum: codes this crate has no name for
//! still round-trip.

use std::fmt;

/// Result code returned by the device command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status(u32);

impl Status {
    pub const SUCCESS: Status = Status(0x000);
    pub const DEV_CAPACITY: Status = Status(0x001);
    pub const DEV_INIT: Status = Status(0x002);
    pub const DEV_INITIALIZED: Status = Status(0x003);
    pub const DEV_NOT_EXIST: Status = Status(0x004);
    pub const ITERATOR_COND_INVALID: Status = Status(0x007);
    pub const ITERATOR_MAX: Status = Status(0x008);
    pub const ITERATOR_NOT_EXIST: Status = Status(0x009);
    pub const ITERATOR_OPEN: Status = Status(0x00A);
    pub const KEY_EXIST: Status = Status(0x00B);
    pub const KEY_INVALID: Status = Status(0x00C);
    pub const KEY_LENGTH_INVALID: Status = Status(0x00D);
    pub const KEY_NOT_EXIST: Status = Status(0x00E);
    pub const NS_DEFAULT: Status = Status(0x00F);
    pub const NS_INVALID: Status = Status(0x010);
    pub const OPTION_INVALID: Status = Status(0x011);
    pub const PARAM_INVALID: Status = Status(0x012);
    pub const QUEUE_CQID_INVALID: Status = Status(0x017);
    pub const QUEUE_DELETION_INVALID: Status = Status(0x018);
    pub const QUEUE_IS_FULL: Status = Status(0x01A);
    pub const QUEUE_QID_INVALID: Status = Status(0x01B);
    pub const SYS_IO: Status = Status(0x01E);
    pub const VALUE_LENGTH_INVALID: Status = Status(0x021);
    pub const VALUE_OFFSET_INVALID: Status = Status(0x023);
    pub const ITERATOR_END: Status = Status(0x093);
    pub const WRN_MORE: Status = Status(0x300);

    /// Wrap a raw device code.
    pub const fn from_raw(code: u32) -> Self {
        Status(code)
    }

    /// The raw device code.
    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    /// True for results that count as a failed command.
    ///
    /// A missing key is a normal answer to retrieve/exist, not a failure.
    pub const fn is_error(self) -> bool {
        self.0 != Self::SUCCESS.0 && self.0 != Self::KEY_NOT_EXIST.0
    }

    /// Human-readable description of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SUCCESS => "success",
            Self::DEV_CAPACITY => "device capacity exceeded",
            Self::DEV_INIT => "device initialization failed",
            Self::DEV_INITIALIZED => "device already initialized",
            Self::DEV_NOT_EXIST => "device does not exist",
            Self::ITERATOR_COND_INVALID => "invalid iterator condition",
            Self::ITERATOR_MAX => "maximum number of iterators open",
            Self::ITERATOR_NOT_EXIST => "iterator does not exist",
            Self::ITERATOR_OPEN => "iterator is already open",
            Self::KEY_EXIST => "key already exists",
            Self::KEY_INVALID => "invalid key",
            Self::KEY_LENGTH_INVALID => "invalid key length",
            Self::KEY_NOT_EXIST => "key does not exist",
            Self::NS_DEFAULT => "default namespace cannot be modified",
            Self::NS_INVALID => "invalid namespace",
            Self::OPTION_INVALID => "invalid option",
            Self::PARAM_INVALID => "invalid parameter",
            Self::QUEUE_CQID_INVALID => "invalid completion queue id",
            Self::QUEUE_DELETION_INVALID => "queue cannot be deleted",
            Self::QUEUE_IS_FULL => "queue is full",
            Self::QUEUE_QID_INVALID => "invalid queue id",
            Self::SYS_IO => "host failed to communicate with the device",
            Self::VALUE_LENGTH_INVALID => "invalid value length",
            Self::VALUE_OFFSET_INVALID => "invalid value offset",
            Self::ITERATOR_END => "iterator reached the end",
            Self::WRN_MORE => "more completions pending",
            _ => "unknown device status",
        }
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x} {}", self.0, self.as_str())
    }
}
