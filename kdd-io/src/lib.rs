//! Command adapter for queue-based key-value storage devices
//!
//! This crate sits between callers issuing key-value commands and a
//! device that executes them through a submission/completion queue pair.
//! Each command runs synchronously (the call returns the result) or
//! asynchronously (a callback receives it), and the device may reap
//! completions by polling or from its own interrupt context.
//!
//! # Quick Start
//!
//! ```ignore
//! use kdd_io::{AdapterOpts, IoMode, KvAdapter, KvValue, RetrieveOption, Result, Tags};
//!
//! fn read_back<D: kdd_io::KvDevice>(device: D) -> Result<()> {
//!     let opts = AdapterOpts::builder()
//!         .devpath("/dev/nvme0n1")
//!         .polling(true)
//!         .build()?;
//!     let adapter = KvAdapter::init(device, opts)?;
//!
//!     let outcome = adapter.retrieve(
//!         b"key".to_vec(),
//!         KvValue::with_capacity(4096),
//!         RetrieveOption::default(),
//!         Tags::default(),
//!         IoMode::Sync,
//!     )?;
//!     println!("{}", outcome.status());
//!
//!     adapter.shutdown()
//! }
//! ```
//!
//! # Modules
//!
//! - [`adapter`] - Adapter lifecycle, submission and waiting
//! - [`complete`] - Completion channel and `block_on`
//! - [`context`] - Per-command completion context
//! - [`device`] - Device command layer trait and handles
//! - [`iterator`] - Iterator sessions
//! - [`options`] - Command options and device option codes
//! - [`opts`] - Adapter configuration
//! - [`queue`] - Queue pair lifecycle
//! - [`status`] - Device result codes
//! - [`error`] - Error types

pub mod adapter;
pub mod complete;
pub mod context;
pub mod device;
mod dispatch;
pub mod error;
mod io;
pub mod iterator;
pub mod options;
pub mod opts;
pub mod queue;
pub mod status;

// Re-exports
pub use adapter::{KvAdapter, Outcome};
pub use complete::{CompletionReceiver, CompletionSender, block_on, completion, park};
pub use context::{
    CompletionContext, IoCallback, IoCompletion, IoMode, IteratorList, KvValue, Opcode, Tags,
};
pub use device::{
    Command, DeviceCompletion, DeviceHandle, DeviceInfo, DeviceInit, DeviceOp, DeviceStat,
    GroupCondition, InterruptHandler, IteratorHandle, IteratorInfo, KvDevice, NamespaceHandle,
    QueueHandle, QueueInfo, QueueType, Rejected,
};
pub use error::{Error, Result};
pub use iterator::{IteratorSession, SessionState};
pub use options::{
    DeleteOption, DeviceDeleteOption, DeviceIteratorOption, DeviceRetrieveOption,
    DeviceStoreOption, IteratorOption, IteratorType, RetrieveOption, StoreOption, StoreType,
};
pub use opts::{AdapterOpts, AdapterOptsBuilder, CompletionMode, RetryPolicy};
pub use queue::Queues;
pub use status::Status;
