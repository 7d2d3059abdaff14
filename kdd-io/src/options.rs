//! Caller-level command options and their device-level codes.
//!
//! Callers describe a command with the API enumerations below. Before a
//! command is submitted they are translated into the option codes the
//! device understands. Raw caller values that name no known mode are
//! rejected here, so nothing reaches the device.

use crate::error::{Error, Result};

/// Store semantics requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    /// Insert or overwrite
    #[default]
    Post,
    /// Fail if the key does not exist
    UpdateOnly,
    /// Fail if the key already exists
    NoOverwrite,
    /// Append to the existing value
    Append,
}

impl StoreType {
    /// Parse a raw caller value.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(StoreType::Post),
            1 => Ok(StoreType::UpdateOnly),
            2 => Ok(StoreType::NoOverwrite),
            3 => Ok(StoreType::Append),
            other => Err(Error::InvalidOption(format!("store type {}", other))),
        }
    }
}

/// Store option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreOption {
    pub st_type: StoreType,
    /// Ask the device to compress the value
    pub compress: bool,
}

impl StoreOption {
    pub fn new(st_type: StoreType, compress: bool) -> Self {
        Self { st_type, compress }
    }

    /// Build from raw caller values.
    pub fn from_raw(st_type: u32, compress: bool) -> Result<Self> {
        Ok(Self::new(StoreType::from_raw(st_type)?, compress))
    }

    /// Device option code for this store.
    pub fn to_device(self) -> DeviceStoreOption {
        match (self.st_type, self.compress) {
            (StoreType::Post, false) => DeviceStoreOption::Default,
            (StoreType::UpdateOnly, false) => DeviceStoreOption::UpdateOnly,
            (StoreType::NoOverwrite, false) => DeviceStoreOption::Idempotent,
            (StoreType::Append, false) => DeviceStoreOption::Append,
            (StoreType::Post, true) => DeviceStoreOption::PostWithCompress,
            (StoreType::UpdateOnly, true) => DeviceStoreOption::UpdateOnlyCompress,
            (StoreType::NoOverwrite, true) => DeviceStoreOption::NoOverwriteCompress,
            (StoreType::Append, true) => DeviceStoreOption::AppendCompress,
        }
    }
}

/// Retrieve option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetrieveOption {
    pub decompress: bool,
    /// Delete the pair after reading it
    pub delete: bool,
}

impl RetrieveOption {
    pub fn to_device(self) -> DeviceRetrieveOption {
        match (self.delete, self.decompress) {
            (false, false) => DeviceRetrieveOption::Default,
            (false, true) => DeviceRetrieveOption::Decompress,
            (true, false) => DeviceRetrieveOption::Delete,
            (true, true) => DeviceRetrieveOption::DecompressDelete,
        }
    }
}

/// Delete option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOption {
    /// Fail with key-not-exist instead of succeeding silently
    pub error_on_missing: bool,
}

impl DeleteOption {
    pub fn to_device(self) -> DeviceDeleteOption {
        if self.error_on_missing {
            DeviceDeleteOption::Error
        } else {
            DeviceDeleteOption::Default
        }
    }
}

/// What an iterator returns per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IteratorType {
    /// Keys only
    #[default]
    Key,
    /// Keys and values
    KeyValue,
    /// Keys and values, deleting each pair as it is returned
    WithDelete,
}

impl IteratorType {
    /// Parse a raw caller value.
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(IteratorType::Key),
            1 => Ok(IteratorType::KeyValue),
            2 => Ok(IteratorType::WithDelete),
            other => Err(Error::InvalidOption(format!("iterator type {}", other))),
        }
    }

    pub fn to_device(self) -> DeviceIteratorOption {
        match self {
            IteratorType::Key => DeviceIteratorOption::Key,
            IteratorType::KeyValue => DeviceIteratorOption::KeyValue,
            IteratorType::WithDelete => DeviceIteratorOption::KeyValueWithDelete,
        }
    }
}

/// Iterator option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IteratorOption {
    pub iter_type: IteratorType,
}

/// Device store option codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceStoreOption {
    Default = 0,
    UpdateOnly = 1,
    Idempotent = 2,
    Append = 3,
    PostWithCompress = 4,
    UpdateOnlyCompress = 5,
    NoOverwriteCompress = 6,
    AppendCompress = 7,
}

/// Device retrieve option codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceRetrieveOption {
    Default = 0,
    Decompress = 1,
    Delete = 2,
    DecompressDelete = 3,
}

/// Device delete option codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceDeleteOption {
    Default = 0,
    Error = 1,
}

/// Device iterator option codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceIteratorOption {
    Key = 0,
    KeyValue = 1,
    KeyValueWithDelete = 2,
}
