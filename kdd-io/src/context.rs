//! Per-command completion context.
//!
//! A [`CompletionContext`] is created right before a command is submitted
//! and travels with the command through the device. It is owned by
//! exactly one party at any time:
//!
//! ```text
//! submitter ──submit──▶ device ──complete──▶ dispatcher
//!                                              │
//!                     sync: sent to waiter ◀───┤
//!                async: callback, then drop ◀──┘
//! ```
//!
//! Because the context is a `Box` that moves along this path, it is
//! dropped exactly once and cannot be touched after it is dropped.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::complete::{CompletionReceiver, CompletionSender, completion};
use crate::device::IteratorHandle;
use crate::status::Status;

/// Command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Store,
    Retrieve,
    Delete,
    Exist,
    OpenIterator,
    CloseIterator,
    IteratorNext,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Store => "PUT",
            Opcode::Retrieve => "GET",
            Opcode::Delete => "DEL",
            Opcode::Exist => "EXIST",
            Opcode::OpenIterator => "ITER_OPEN",
            Opcode::CloseIterator => "ITER_CLOSE",
            Opcode::IteratorNext => "ITER_NEXT",
        }
    }

    /// Iterator open/close always complete synchronously.
    pub fn is_iterator_control(self) -> bool {
        matches!(self, Opcode::OpenIterator | Opcode::CloseIterator)
    }
}

/// Value buffer.
///
/// For store, `data` holds the bytes to write. For retrieve, `data` is the
/// destination buffer and `actual_value_size` is set by the device to the
/// full size of the stored value, which may exceed the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvValue {
    pub data: Vec<u8>,
    /// Offset into the stored value
    pub offset: u32,
    pub actual_value_size: u32,
}

impl KvValue {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
            actual_value_size: 0,
        }
    }

    /// Zeroed destination buffer for retrieve.
    pub fn with_capacity(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Bytes returned by the device, clamped to the buffer length.
    pub fn as_bytes(&self) -> &[u8] {
        let len = (self.actual_value_size as usize).min(self.data.len());
        &self.data[..len]
    }
}

/// Buffer filled by an iterator-next command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IteratorList {
    pub num_entries: u32,
    /// Set when the iterator has no more entries
    pub end: bool,
    pub buf: Vec<u8>,
}

impl IteratorList {
    pub fn with_capacity(len: usize) -> Self {
        Self {
            num_entries: 0,
            end: false,
            buf: vec![0; len],
        }
    }
}

/// Opaque values carried from submission to completion untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tags {
    pub private1: u64,
    pub private2: u64,
}

impl Tags {
    pub fn new(private1: u64, private2: u64) -> Self {
        Self { private1, private2 }
    }
}

/// Everything the caller gets back about a finished command.
///
/// Passed to async callbacks, and returned from sync calls.
#[derive(Debug, Clone)]
pub struct IoCompletion {
    pub opcode: Opcode,
    pub key: Option<Vec<u8>>,
    pub value: Option<KvValue>,
    pub tags: Tags,
    pub result: Status,
    /// Exist bitmap
    pub result_buffer: Option<Vec<u8>>,
    pub key_cnt: u32,
    pub iter_list: Option<IteratorList>,
    /// Handle allocated by an iterator open
    pub iterator: Option<IteratorHandle>,
}

impl IoCompletion {
    fn new(opcode: Opcode, key: Option<Vec<u8>>, value: Option<KvValue>, tags: Tags) -> Self {
        Self {
            opcode,
            key,
            value,
            tags,
            result: Status::SUCCESS,
            result_buffer: None,
            key_cnt: 0,
            iter_list: None,
            iterator: None,
        }
    }
}

/// Async completion callback.
pub type IoCallback = Box<dyn FnOnce(IoCompletion) + Send + 'static>;

/// How the caller wants to learn about completion.
pub enum IoMode {
    /// Block until the command completes and return its result
    Sync,
    /// Return after submission; run the callback (if any) on completion
    Async(Option<IoCallback>),
}

impl IoMode {
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(IoCompletion) + Send + 'static,
    {
        IoMode::Async(Some(Box::new(f)))
    }

    pub fn is_sync(&self) -> bool {
        matches!(self, IoMode::Sync)
    }
}

impl fmt::Debug for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoMode::Sync => f.write_str("Sync"),
            IoMode::Async(cb) => f
                .debug_tuple("Async")
                .field(&cb.as_ref().map(|_| "callback"))
                .finish(),
        }
    }
}

/// Adapter-wide state referenced by every context the adapter creates.
///
/// The device path is fixed at init; only the live counter moves.
pub(crate) struct Shared {
    pub(crate) devpath: String,
    live: AtomicUsize,
}

impl Shared {
    pub(crate) fn new(devpath: impl Into<String>) -> Self {
        Self {
            devpath: devpath.into(),
            live: AtomicUsize::new(0),
        }
    }

    /// Number of contexts created and not yet dropped.
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// Counts the context as live until dropped.
struct LiveGuard {
    owner: Weak<Shared>,
}

impl LiveGuard {
    fn new(owner: &Arc<Shared>) -> Self {
        owner.live.fetch_add(1, Ordering::AcqRel);
        Self {
            owner: Arc::downgrade(owner),
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            let prev = owner.live.fetch_sub(1, Ordering::AcqRel);
            debug_assert!(prev > 0, "completion context released twice");
        }
    }
}

pub(crate) enum Waiter {
    Sync(CompletionSender<Box<CompletionContext>>),
    Async(Option<IoCallback>),
}

/// In-flight state of one command.
pub struct CompletionContext {
    pub(crate) io: IoCompletion,
    pub(crate) waiter: Option<Waiter>,
    owner: Weak<Shared>,
    _live: LiveGuard,
}

/// Receiver a sync submitter blocks on.
pub(crate) type ContextReceiver = CompletionReceiver<Box<CompletionContext>>;

impl CompletionContext {
    /// Allocate a context for a command about to be submitted.
    ///
    /// Returns the receiver to block on when `mode` is [`IoMode::Sync`].
    pub(crate) fn create(
        opcode: Opcode,
        key: Option<Vec<u8>>,
        value: Option<KvValue>,
        tags: Tags,
        mode: IoMode,
        owner: &Arc<Shared>,
    ) -> (Box<Self>, Option<ContextReceiver>) {
        let (waiter, rx) = match mode {
            IoMode::Sync => {
                let (tx, rx) = completion();
                (Waiter::Sync(tx), Some(rx))
            }
            IoMode::Async(cb) => (Waiter::Async(cb), None),
        };

        let ctx = Box::new(Self {
            io: IoCompletion::new(opcode, key, value, tags),
            waiter: Some(waiter),
            owner: Arc::downgrade(owner),
            _live: LiveGuard::new(owner),
        });
        (ctx, rx)
    }

    pub fn opcode(&self) -> Opcode {
        self.io.opcode
    }

    pub fn is_sync(&self) -> bool {
        matches!(self.waiter, Some(Waiter::Sync(_)))
    }

    pub(crate) fn owner(&self) -> Option<Arc<Shared>> {
        self.owner.upgrade()
    }

    /// Release the context and hand its record to the caller.
    pub(crate) fn into_completion(self: Box<Self>) -> IoCompletion {
        let ctx = *self;
        ctx.io
    }
}

impl fmt::Debug for CompletionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionContext")
            .field("opcode", &self.io.opcode)
            .field("result", &self.io.result)
            .field("sync", &self.is_sync())
            .finish_non_exhaustive()
    }
}
