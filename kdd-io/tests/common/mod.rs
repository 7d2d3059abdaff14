//! In-memory key-value device for integration tests.
//!
//! Polling mode queues accepted commands until `poll_completion`.
//! Interrupt mode completes them on a worker thread and fires the
//! installed interrupt handler after each one. Iterator opens take
//! effect at submission, so the device lists an iterator before the open
//! completes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use kdd_io::{
    Command, DeviceCompletion, DeviceDeleteOption, DeviceHandle, DeviceInfo, DeviceInit,
    DeviceOp, DeviceRetrieveOption, DeviceStat, DeviceStoreOption, InterruptHandler,
    IteratorHandle, IteratorInfo, KvDevice, NamespaceHandle, QueueHandle, QueueInfo, Rejected,
    Status,
};
use parking_lot::Mutex;

/// Iterators the mock device holds at most.
pub const DEVICE_MAX_ITERATORS: usize = 16;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Accepted command, with its result when already decided at submission.
type Queued = (Command, Option<DeviceCompletion>);

#[derive(Clone, Default)]
pub struct MockDevice {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    store: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    pending: Mutex<VecDeque<Queued>>,
    worker: Mutex<Option<mpsc::Sender<Queued>>>,
    /// Polling reaps nothing while set
    hold: AtomicBool,
    interrupt: Mutex<Option<Arc<InterruptHandler>>>,
    iterators: Mutex<Vec<IteratorInfo>>,
    next_iterator: AtomicU32,
    queues: Mutex<Vec<QueueInfo>>,
    events: Mutex<Vec<String>>,
    ops: Mutex<Vec<DeviceOp>>,
    /// Submitted and not yet completed
    outstanding: AtomicU32,
    submit_attempts: AtomicUsize,
    /// Remaining submissions to refuse with queue-full
    queue_full: AtomicUsize,
    reject_next: Mutex<Option<Status>>,
    fail_open: Mutex<Option<Status>>,
    /// Remaining drain checks that report phantom outstanding commands
    stall: AtomicU32,
    drain_checks: AtomicU32,
    fail_delete_queue: AtomicBool,
    fail_init: AtomicBool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` submissions with queue-full.
    pub fn queue_full_for(&self, n: usize) {
        self.inner.queue_full.store(n, Ordering::SeqCst);
    }

    /// Refuse the next submission with `status`.
    pub fn reject_next(&self, status: Status) {
        *self.inner.reject_next.lock() = Some(status);
    }

    /// Complete the next iterator open with `status`.
    pub fn fail_next_open(&self, status: Status) {
        *self.inner.fail_open.lock() = Some(status);
    }

    /// Report outstanding commands on the next `n` drain checks.
    pub fn stall_drain(&self, n: u32) {
        self.inner.stall.store(n, Ordering::SeqCst);
    }

    /// Keep polled completions queued until released.
    pub fn hold_completions(&self, hold: bool) {
        self.inner.hold.store(hold, Ordering::SeqCst);
    }

    pub fn listed_iterators(&self) -> usize {
        self.inner.iterators.lock().len()
    }

    pub fn fail_delete_queue(&self) {
        self.inner.fail_delete_queue.store(true, Ordering::SeqCst);
    }

    pub fn fail_init(&self) {
        self.inner.fail_init.store(true, Ordering::SeqCst);
    }

    pub fn submit_attempts(&self) -> usize {
        self.inner.submit_attempts.load(Ordering::SeqCst)
    }

    /// Operations the device accepted, in order.
    pub fn ops(&self) -> Vec<DeviceOp> {
        self.inner.ops.lock().clone()
    }

    pub fn accepted(&self) -> usize {
        self.inner.ops.lock().len()
    }

    pub fn drain_checks(&self) -> u32 {
        self.inner.drain_checks.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.events.lock().clone()
    }

    pub fn queues(&self) -> Vec<QueueInfo> {
        self.inner.queues.lock().clone()
    }

    pub fn interrupts(&self) -> u64 {
        self.inner
            .interrupt
            .lock()
            .as_ref()
            .map(|handler| handler.fired())
            .unwrap_or(0)
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.store.lock().get(key).cloned()
    }

    pub fn put(&self, key: &[u8], value: &[u8]) {
        self.inner.store.lock().insert(key.to_vec(), value.to_vec());
    }

    /// Open an iterator behind the adapter's back.
    pub fn open_external_iterator(&self, bitmask: u32, prefix: u32) -> IteratorHandle {
        let handle = IteratorHandle(self.inner.next_iterator.fetch_add(1, Ordering::SeqCst) + 1);
        self.inner.iterators.lock().push(IteratorInfo {
            handle,
            open: true,
            bitmask,
            prefix,
            is_eof: false,
        });
        handle
    }

    fn record(&self, event: impl Into<String>) {
        self.inner.events.lock().push(event.into());
    }
}

impl Inner {
    /// Run `command` against the in-memory store and complete it.
    fn finish(&self, (mut command, decided): Queued) {
        let completion = match decided {
            Some(completion) => completion,
            None => self.execute(&mut command),
        };
        command.complete(completion);
        if let Some(handler) = self.interrupt.lock().clone() {
            handler.fire();
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    fn execute(&self, command: &mut Command) -> DeviceCompletion {
        match *command.op() {
            DeviceOp::Store(option) => {
                let key = command.key().unwrap_or_default().to_vec();
                let data = command.value().map(|v| v.data.clone()).unwrap_or_default();
                let mut store = self.store.lock();
                let exists = store.contains_key(&key);
                let status = match option {
                    DeviceStoreOption::UpdateOnly | DeviceStoreOption::UpdateOnlyCompress
                        if !exists =>
                    {
                        Status::KEY_NOT_EXIST
                    }
                    DeviceStoreOption::Idempotent | DeviceStoreOption::NoOverwriteCompress
                        if exists =>
                    {
                        Status::KEY_EXIST
                    }
                    DeviceStoreOption::Append | DeviceStoreOption::AppendCompress => {
                        store.entry(key).or_default().extend_from_slice(&data);
                        Status::SUCCESS
                    }
                    _ => {
                        store.insert(key, data);
                        Status::SUCCESS
                    }
                };
                DeviceCompletion::new(status)
            }
            DeviceOp::Retrieve(option) => {
                let key = command.key().unwrap_or_default().to_vec();
                let mut store = self.store.lock();
                let Some(stored) = store.get(&key).cloned() else {
                    return DeviceCompletion::new(Status::KEY_NOT_EXIST);
                };
                if let Some(value) = command.value_mut() {
                    let start = (value.offset as usize).min(stored.len());
                    let src = &stored[start..];
                    let len = src.len().min(value.data.len());
                    value.data[..len].copy_from_slice(&src[..len]);
                }
                if matches!(
                    option,
                    DeviceRetrieveOption::Delete | DeviceRetrieveOption::DecompressDelete
                ) {
                    store.remove(&key);
                }
                DeviceCompletion::new(Status::SUCCESS).with_value_size(stored.len() as u32)
            }
            DeviceOp::Delete(option) => {
                let key = command.key().unwrap_or_default().to_vec();
                let removed = self.store.lock().remove(&key).is_some();
                if !removed && option == DeviceDeleteOption::Error {
                    DeviceCompletion::new(Status::KEY_NOT_EXIST)
                } else {
                    DeviceCompletion::new(Status::SUCCESS)
                }
            }
            DeviceOp::Exist => {
                let key = command.key().unwrap_or_default().to_vec();
                let exists = self.store.lock().contains_key(&key);
                if let Some(buf) = command.result_buffer_mut() {
                    if let Some(first) = buf.first_mut() {
                        *first = exists as u8;
                    }
                }
                if exists {
                    DeviceCompletion::new(Status::SUCCESS)
                } else {
                    DeviceCompletion::new(Status::KEY_NOT_EXIST)
                }
            }
            DeviceOp::OpenIterator { cond, .. } => {
                if let Some(status) = self.fail_open.lock().take() {
                    return DeviceCompletion::new(status);
                }
                let mut iterators = self.iterators.lock();
                if iterators
                    .iter()
                    .any(|it| it.bitmask == cond.bitmask && it.prefix == cond.bit_pattern)
                {
                    return DeviceCompletion::new(Status::ITERATOR_OPEN);
                }
                if iterators.len() >= DEVICE_MAX_ITERATORS {
                    return DeviceCompletion::new(Status::ITERATOR_MAX);
                }
                let handle =
                    IteratorHandle(self.next_iterator.fetch_add(1, Ordering::SeqCst) + 1);
                iterators.push(IteratorInfo {
                    handle,
                    open: true,
                    bitmask: cond.bitmask,
                    prefix: cond.bit_pattern,
                    is_eof: false,
                });
                DeviceCompletion::new(Status::SUCCESS).with_iterator(handle)
            }
            DeviceOp::CloseIterator(handle) => {
                let mut iterators = self.iterators.lock();
                let before = iterators.len();
                iterators.retain(|it| it.handle != handle);
                if iterators.len() < before {
                    DeviceCompletion::new(Status::SUCCESS)
                } else {
                    DeviceCompletion::new(Status::ITERATOR_NOT_EXIST)
                }
            }
            DeviceOp::IteratorNext(handle) => {
                let Some(info) = self
                    .iterators
                    .lock()
                    .iter()
                    .find(|it| it.handle == handle)
                    .copied()
                else {
                    return DeviceCompletion::new(Status::ITERATOR_NOT_EXIST);
                };
                let mut keys: Vec<Vec<u8>> = self
                    .store
                    .lock()
                    .keys()
                    .filter(|key| key_prefix(key) & info.bitmask == info.prefix & info.bitmask)
                    .cloned()
                    .collect();
                keys.sort();

                if let Some(list) = command.iter_list_mut() {
                    // Entries: u32 LE key length, then the key.
                    let mut out = Vec::new();
                    for key in &keys {
                        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
                        out.extend_from_slice(key);
                    }
                    let len = out.len().min(list.buf.len());
                    list.buf[..len].copy_from_slice(&out[..len]);
                    list.num_entries = keys.len() as u32;
                    list.end = true;
                }
                DeviceCompletion::new(Status::ITERATOR_END)
            }
        }
    }
}

/// First four key bytes as a little-endian u32, zero padded.
fn key_prefix(key: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    let len = key.len().min(4);
    bytes[..len].copy_from_slice(&key[..len]);
    u32::from_le_bytes(bytes)
}

impl KvDevice for MockDevice {
    fn initialize(&self, init: &DeviceInit) -> Result<DeviceHandle, Status> {
        if self.inner.fail_init.load(Ordering::SeqCst) {
            return Err(Status::DEV_INIT);
        }
        self.record(format!("initialize {}", init.devpath));

        if !init.is_polling {
            let (tx, rx) = mpsc::channel::<Queued>();
            let inner = self.inner.clone();
            thread::spawn(move || {
                while let Ok(queued) = rx.recv() {
                    inner.finish(queued);
                }
            });
            *self.inner.worker.lock() = Some(tx);
        }
        Ok(DeviceHandle(1))
    }

    fn default_namespace(&self, _dev: DeviceHandle) -> Result<NamespaceHandle, Status> {
        Ok(NamespaceHandle(1))
    }

    fn create_queue(&self, _dev: DeviceHandle, info: &QueueInfo) -> Result<QueueHandle, Status> {
        self.inner.queues.lock().push(*info);
        self.record(format!("create_queue {}", info.queue_id));
        Ok(QueueHandle(info.queue_id as u32))
    }

    fn set_interrupt_handler(
        &self,
        _cq: QueueHandle,
        handler: Arc<InterruptHandler>,
    ) -> Result<(), Status> {
        *self.inner.interrupt.lock() = Some(handler);
        Ok(())
    }

    fn submit(
        &self,
        _sq: QueueHandle,
        _ns: NamespaceHandle,
        mut command: Command,
    ) -> Result<(), Rejected> {
        self.inner.submit_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(status) = self.inner.reject_next.lock().take() {
            return Err(Rejected { status, command });
        }
        let full = self
            .inner
            .queue_full
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if full {
            return Err(Rejected {
                status: Status::QUEUE_IS_FULL,
                command,
            });
        }

        let opens_iterator = matches!(command.op(), DeviceOp::OpenIterator { .. });
        let decided = opens_iterator.then(|| self.inner.execute(&mut command));
        self.inner.ops.lock().push(*command.op());
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);

        let worker = self.inner.worker.lock().clone();
        match worker {
            Some(tx) => {
                if let Err(mpsc::SendError((command, _))) = tx.send((command, decided)) {
                    self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);
                    return Err(Rejected {
                        status: Status::SYS_IO,
                        command,
                    });
                }
            }
            None => self.inner.pending.lock().push_back((command, decided)),
        }
        Ok(())
    }

    fn poll_completion(&self, _cq: QueueHandle) -> Result<u32, Status> {
        if self.inner.hold.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let ready: Vec<Queued> = self.inner.pending.lock().drain(..).collect();
        let processed = ready.len() as u32;
        for queued in ready {
            self.inner.finish(queued);
        }
        Ok(processed)
    }

    fn list_iterators(
        &self,
        _sq: QueueHandle,
        _ns: NamespaceHandle,
    ) -> Result<Vec<IteratorInfo>, Status> {
        Ok(self.inner.iterators.lock().clone())
    }

    fn queued_commands(&self, _queue: QueueHandle) -> u32 {
        self.inner.drain_checks.fetch_add(1, Ordering::SeqCst);
        let stalled = self
            .inner
            .stall
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        self.inner.outstanding.load(Ordering::SeqCst) + stalled as u32
    }

    fn delete_queue(&self, _dev: DeviceHandle, queue: QueueHandle) -> Result<(), Status> {
        if self.inner.fail_delete_queue.load(Ordering::SeqCst) {
            self.record(format!("delete_queue {} failed", queue.0));
            return Err(Status::QUEUE_DELETION_INVALID);
        }
        self.record(format!("delete_queue {}", queue.0));
        Ok(())
    }

    fn delete_namespace(&self, _dev: DeviceHandle, _ns: NamespaceHandle) -> Result<(), Status> {
        self.record("delete_namespace");
        Ok(())
    }

    fn cleanup_device(&self, _dev: DeviceHandle) -> Result<(), Status> {
        // Dropping the sender stops the worker once it has drained.
        self.inner.worker.lock().take();
        self.record("cleanup_device");
        Ok(())
    }

    fn device_stat(&self, _dev: DeviceHandle) -> Result<DeviceStat, Status> {
        Ok(DeviceStat { utilization: 1234 })
    }

    fn device_info(&self, _dev: DeviceHandle) -> Result<DeviceInfo, Status> {
        Ok(DeviceInfo {
            capacity: 1 << 30,
        })
    }
}
