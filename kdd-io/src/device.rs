//! Device command layer.
//!
//! The adapter does not speak to hardware itself. It drives a [`KvDevice`],
//! the capability that owns submission and completion queues and executes
//! commands. Implementations complete each accepted [`Command`] exactly
//! once by calling [`Command::complete()`], from any thread: from inside
//! [`KvDevice::poll_completion()`] in polling mode, or from their own
//! interrupt context otherwise.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐  submit(Command)  ┌──────────────┐
//! │ KvAdapter │ ────────────────▶ │   KvDevice   │
//! └─────▲─────┘                   └──────┬───────┘
//!       │ wake / callback                │ Command::complete()
//!       │                         ┌──────▼───────┐
//!       └──────────────────────── │  dispatcher  │
//!                                 └──────────────┘
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::{CompletionContext, IteratorList, KvValue, Opcode};
use crate::dispatch;
use crate::options::{
    DeviceDeleteOption, DeviceIteratorOption, DeviceRetrieveOption, DeviceStoreOption,
};
use crate::status::Status;

/// Handle to an initialized device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Handle to a namespace on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceHandle(pub u32);

/// Handle to a submission or completion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle(pub u32);

/// Handle to a device-side iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IteratorHandle(pub u32);

/// Parameters for device initialization.
#[derive(Debug, Clone)]
pub struct DeviceInit {
    pub devpath: String,
    pub config_file: Option<PathBuf>,
    pub need_persistency: bool,
    pub is_polling: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    Submission,
    Completion,
}

/// Parameters for queue creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueInfo {
    pub queue_id: u16,
    pub queue_size: u32,
    /// Completion queue a submission queue reports to
    pub completion_queue_id: u16,
    pub queue_type: QueueType,
}

/// Key selection for an iterator: keys whose bits under `bitmask` equal
/// `bit_pattern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupCondition {
    pub bitmask: u32,
    pub bit_pattern: u32,
}

/// Entry of the device iterator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IteratorInfo {
    pub handle: IteratorHandle,
    pub open: bool,
    pub bitmask: u32,
    pub prefix: u32,
    pub is_eof: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStat {
    /// Used space in hundredths of a percent
    pub utilization: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Capacity in bytes
    pub capacity: i64,
}

/// Installed on an interrupt-mode completion queue.
///
/// The device calls [`fire()`](Self::fire) when it raises an interrupt.
/// Completions themselves are delivered through [`Command::complete()`].
#[derive(Debug, Default)]
pub struct InterruptHandler {
    number: u32,
    fired: AtomicU64,
}

impl InterruptHandler {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            fired: AtomicU64::new(0),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn fire(&self) {
        let count = self.fired.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(number = self.number, count, "Completion interrupt");
    }

    /// Interrupts seen so far.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

/// Device-level operation of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    Store(DeviceStoreOption),
    Retrieve(DeviceRetrieveOption),
    Delete(DeviceDeleteOption),
    Exist,
    OpenIterator {
        option: DeviceIteratorOption,
        cond: GroupCondition,
    },
    CloseIterator(IteratorHandle),
    IteratorNext(IteratorHandle),
}

/// A command on its way to, or inside, the device.
///
/// Owns the completion context. Dropping a command without completing it
/// releases the context and cancels a waiting synchronous caller.
pub struct Command {
    op: DeviceOp,
    ctx: Box<CompletionContext>,
}

impl Command {
    pub(crate) fn new(op: DeviceOp, ctx: Box<CompletionContext>) -> Self {
        Self { op, ctx }
    }

    pub fn op(&self) -> &DeviceOp {
        &self.op
    }

    pub fn opcode(&self) -> Opcode {
        self.ctx.opcode()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.ctx.io.key.as_deref()
    }

    pub fn value(&self) -> Option<&KvValue> {
        self.ctx.io.value.as_ref()
    }

    /// Destination buffer of a retrieve.
    pub fn value_mut(&mut self) -> Option<&mut KvValue> {
        self.ctx.io.value.as_mut()
    }

    pub fn key_cnt(&self) -> u32 {
        self.ctx.io.key_cnt
    }

    /// Exist result bitmap.
    pub fn result_buffer_mut(&mut self) -> Option<&mut Vec<u8>> {
        self.ctx.io.result_buffer.as_mut()
    }

    /// Destination of an iterator-next.
    pub fn iter_list_mut(&mut self) -> Option<&mut IteratorList> {
        self.ctx.io.iter_list.as_mut()
    }

    /// Report the command as finished.
    ///
    /// Consumes the command, so a command completes at most once.
    pub fn complete(self, completion: DeviceCompletion) {
        dispatch::dispatch(self.ctx, completion);
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("op", &self.op)
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Result the device reports for a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCompletion {
    pub status: Status,
    /// Full size of the stored value, for retrieve
    pub actual_value_size: u32,
    /// Allocated handle, for iterator open
    pub iterator: Option<IteratorHandle>,
}

impl DeviceCompletion {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            actual_value_size: 0,
            iterator: None,
        }
    }

    pub fn with_value_size(mut self, size: u32) -> Self {
        self.actual_value_size = size;
        self
    }

    pub fn with_iterator(mut self, handle: IteratorHandle) -> Self {
        self.iterator = Some(handle);
        self
    }
}

/// Submission refused by the device.
///
/// The command is handed back untouched so it can be resubmitted.
#[derive(Debug)]
pub struct Rejected {
    pub status: Status,
    pub command: Command,
}

/// Key-value device command layer.
///
/// Fallible calls return the raw device [`Status`] on failure.
pub trait KvDevice: Send + Sync {
    fn initialize(&self, init: &DeviceInit) -> Result<DeviceHandle, Status>;

    fn default_namespace(&self, dev: DeviceHandle) -> Result<NamespaceHandle, Status>;

    fn create_queue(&self, dev: DeviceHandle, info: &QueueInfo) -> Result<QueueHandle, Status>;

    /// Install the interrupt handler of an interrupt-mode completion queue.
    fn set_interrupt_handler(
        &self,
        cq: QueueHandle,
        handler: std::sync::Arc<InterruptHandler>,
    ) -> Result<(), Status>;

    /// Queue a command. [`Status::QUEUE_IS_FULL`] means "try again".
    fn submit(
        &self,
        sq: QueueHandle,
        ns: NamespaceHandle,
        command: Command,
    ) -> Result<(), Rejected>;

    /// Reap finished commands. Returns how many were completed.
    fn poll_completion(&self, cq: QueueHandle) -> Result<u32, Status>;

    fn list_iterators(
        &self,
        sq: QueueHandle,
        ns: NamespaceHandle,
    ) -> Result<Vec<IteratorInfo>, Status>;

    /// Commands submitted to, or awaiting reaping on, this queue.
    fn queued_commands(&self, queue: QueueHandle) -> u32;

    fn delete_queue(&self, dev: DeviceHandle, queue: QueueHandle) -> Result<(), Status>;

    fn delete_namespace(&self, dev: DeviceHandle, ns: NamespaceHandle) -> Result<(), Status>;

    fn cleanup_device(&self, dev: DeviceHandle) -> Result<(), Status>;

    fn device_stat(&self, dev: DeviceHandle) -> Result<DeviceStat, Status>;

    fn device_info(&self, dev: DeviceHandle) -> Result<DeviceInfo, Status>;
}
