//! The key-value adapter.
//!
//! [`KvAdapter`] owns a device, its default namespace and one queue pair,
//! and turns caller requests into device commands. Every data command
//! can run in two modes:
//!
//! - [`IoMode::Sync`](crate::IoMode::Sync): the call blocks until the
//!   device completes the command and returns its [`IoCompletion`].
//! - [`IoMode::Async`](crate::IoMode::Async): the call returns once the
//!   command is queued; the callback receives the [`IoCompletion`] later,
//!   on the thread that completes it.
//!
//! # Example
//!
//! ```ignore
//! use kdd_io::{AdapterOpts, IoMode, KvAdapter, KvValue, StoreOption, Tags};
//!
//! let opts = AdapterOpts::builder().devpath("/dev/nvme0n1").build()?;
//! let adapter = KvAdapter::init(device, opts)?;
//!
//! let outcome = adapter.store(
//!     b"key".to_vec(),
//!     KvValue::new(b"value".to_vec()),
//!     StoreOption::default(),
//!     Tags::default(),
//!     IoMode::Sync,
//! )?;
//! assert!(outcome.status().is_success());
//!
//! adapter.shutdown()?;
//! ```

use std::sync::Arc;

use crate::complete::{block_on, park};
use crate::context::{CompletionContext, ContextReceiver, IoCompletion, Shared};
use crate::device::{Command, DeviceHandle, DeviceInit, KvDevice, NamespaceHandle, Rejected};
use crate::error::{Error, Result};
use crate::iterator::Sessions;
use crate::opts::{AdapterOpts, CompletionMode};
use crate::queue::Queues;
use crate::status::Status;

/// What a submitted command produced.
#[derive(Debug)]
pub enum Outcome {
    /// Sync command finished
    Completed(IoCompletion),
    /// Async command queued; the callback reports the result
    Submitted,
}

impl Outcome {
    /// Device result of a completed command, or success for a queued one.
    pub fn status(&self) -> Status {
        match self {
            Outcome::Completed(io) => io.result,
            Outcome::Submitted => Status::SUCCESS,
        }
    }

    pub fn into_completion(self) -> Option<IoCompletion> {
        match self {
            Outcome::Completed(io) => Some(io),
            Outcome::Submitted => None,
        }
    }
}

/// Adapter between callers and a queue-based key-value device.
///
/// `Sync` when the device is: commands may be issued from many threads.
pub struct KvAdapter<D: KvDevice> {
    pub(crate) device: D,
    pub(crate) opts: AdapterOpts,
    pub(crate) dev: DeviceHandle,
    pub(crate) ns: NamespaceHandle,
    pub(crate) queues: Queues,
    pub(crate) shared: Arc<Shared>,
    pub(crate) sessions: Sessions,
    closed: bool,
}

impl<D: KvDevice> KvAdapter<D> {
    /// Initialize the device, open its default namespace and create the
    /// queue pair.
    ///
    /// Anything acquired before a failing step is released again.
    pub fn init(device: D, opts: AdapterOpts) -> Result<Self> {
        let init = DeviceInit {
            devpath: opts.devpath.clone(),
            config_file: opts.config_file.clone(),
            need_persistency: false,
            is_polling: opts.is_polling(),
        };

        let dev = device.initialize(&init).map_err(|status| {
            tracing::error!(devpath = %opts.devpath, %status, "Device initialization failed");
            Error::Device(status)
        })?;

        let ns = match device.default_namespace(dev) {
            Ok(ns) => ns,
            Err(status) => {
                tracing::error!(%status, "Get default namespace failed");
                cleanup_device(&device, dev);
                return Err(Error::Device(status));
            }
        };

        let queues = match Queues::create(&device, dev, opts.queue_depth, opts.completion_mode) {
            Ok(queues) => queues,
            Err(e) => {
                tracing::error!(error = %e, "Queue creation failed");
                if let Err(status) = device.delete_namespace(dev, ns) {
                    tracing::warn!(%status, "Failed to release namespace");
                }
                cleanup_device(&device, dev);
                return Err(e);
            }
        };

        tracing::info!(
            devpath = %opts.devpath,
            depth = opts.queue_depth,
            mode = ?opts.completion_mode,
            "Adapter initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared::new(opts.devpath.clone())),
            sessions: Sessions::new(opts.max_iterators),
            device,
            opts,
            dev,
            ns,
            queues,
            closed: false,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn opts(&self) -> &AdapterOpts {
        &self.opts
    }

    pub fn device_handle(&self) -> DeviceHandle {
        self.dev
    }

    pub fn namespace(&self) -> NamespaceHandle {
        self.ns
    }

    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    /// Completion contexts created and not yet released.
    ///
    /// Zero once every submitted command has completed and been consumed.
    pub fn in_flight(&self) -> usize {
        self.shared.live()
    }

    /// Poll the completion queue once; returns completions processed.
    pub fn process_completions(&self) -> u32 {
        self.queues.poll(&self.device)
    }

    /// Device space utilization.
    pub fn utilization(&self) -> Result<i32> {
        self.device
            .device_stat(self.dev)
            .map(|stat| stat.utilization)
            .map_err(|status| {
                tracing::error!(%status, "The host failed to communicate with the device");
                Error::Device(status)
            })
    }

    /// Device capacity in bytes.
    pub fn capacity(&self) -> Result<i64> {
        self.device
            .device_info(self.dev)
            .map(|info| info.capacity)
            .map_err(|status| {
                tracing::error!(%status, "The host failed to communicate with the device");
                Error::Device(status)
            })
    }

    /// Write amplification factor. Not reported by this device; always 0.
    pub fn waf(&self) -> f32 {
        tracing::warn!("Write amplification factor is not supported by this device");
        0.0
    }

    /// Submit `command`, absorbing queue-full backpressure.
    ///
    /// A full queue resubmits the same command in a tight loop, bounded
    /// only by the configured [`RetryPolicy`](crate::RetryPolicy). Any
    /// other refusal drops the command (and its context) and is returned.
    pub(crate) fn submit(&self, mut command: Command) -> Result<()> {
        let mut retries = 0usize;
        loop {
            match self.device.submit(self.queues.sq(), self.ns, command) {
                Ok(()) => return Ok(()),
                Err(Rejected {
                    status,
                    command: returned,
                }) if status == Status::QUEUE_IS_FULL => {
                    if !self.opts.retry.allows(retries) {
                        tracing::warn!(
                            cmd = returned.opcode().name(),
                            retries,
                            "Submission queue still full, giving up"
                        );
                        return Err(Error::QueueFull(retries));
                    }
                    retries += 1;
                    command = returned;
                    std::hint::spin_loop();
                }
                Err(Rejected { status, command }) => {
                    tracing::error!(cmd = command.opcode().name(), %status, "Submission failed");
                    return Err(Error::Device(status));
                }
            }
        }
    }

    /// Block until the dispatcher hands back the context behind `rx`.
    pub(crate) fn wait(&self, rx: ContextReceiver) -> Result<Box<CompletionContext>> {
        match self.opts.completion_mode {
            CompletionMode::Polling => block_on(rx, || {
                if self.queues.poll(&self.device) == 0 {
                    std::hint::spin_loop();
                }
            }),
            CompletionMode::Interrupt => block_on(rx, park),
        }
    }

    /// Submit, then wait if the command is synchronous.
    pub(crate) fn execute(&self, command: Command, rx: Option<ContextReceiver>) -> Result<Outcome> {
        self.submit(command)?;
        match rx {
            Some(rx) => Ok(Outcome::Completed(self.wait(rx)?.into_completion())),
            None => Ok(Outcome::Submitted),
        }
    }

    /// Drain and delete the queues, then release namespace and device.
    ///
    /// Blocks until the device reports no outstanding commands on either
    /// queue. Every release step is attempted even if an earlier one
    /// fails; a failed queue deletion is reported as [`Error::Shutdown`].
    pub fn shutdown(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.queues.drain(&self.device, self.opts.drain_interval);
        let failures = self.queues.delete(&self.device, self.dev);

        if let Err(status) = self.device.delete_namespace(self.dev, self.ns) {
            tracing::warn!(%status, "Delete namespace failed");
        }
        cleanup_device(&self.device, self.dev);

        match failures.first() {
            None => {
                tracing::info!(devpath = %self.opts.devpath, "Adapter shut down");
                Ok(())
            }
            Some((what, status)) => Err(Error::Shutdown(format!(
                "delete {} failed: {}",
                what, status
            ))),
        }
    }
}

impl<D: KvDevice> Drop for KvAdapter<D> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!(error = %e, "Adapter teardown failed");
        }
    }
}

fn cleanup_device<D>(device: &D, dev: DeviceHandle)
where
    D: KvDevice + ?Sized,
{
    if let Err(status) = device.cleanup_device(dev) {
        tracing::warn!(%status, "Device cleanup failed");
    }
}
