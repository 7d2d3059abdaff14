//! Submission/completion queue lifecycle.
//!
//! The adapter uses one completion queue and one submission queue bound to
//! it. Queue ids come from a counter owned by each [`Queues`] instance, so
//! several adapters in one process never share id state.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::device::{DeviceHandle, InterruptHandler, KvDevice, QueueHandle, QueueInfo, QueueType};
use crate::error::Result;
use crate::opts::CompletionMode;
use crate::status::Status;

/// Monotonic queue id source.
#[derive(Debug, Default)]
struct QueueIds {
    next: u16,
}

impl QueueIds {
    fn next(&mut self) -> u16 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// The adapter's queue pair.
#[derive(Debug)]
pub struct Queues {
    ids: QueueIds,
    mode: CompletionMode,
    depth: u32,
    cq: QueueHandle,
    cq_id: u16,
    sq: QueueHandle,
    sq_id: u16,
    /// Kept for the lifetime of the completion queue
    interrupt: Option<Arc<InterruptHandler>>,
}

impl Queues {
    /// Create the completion queue, then a submission queue bound to it.
    pub(crate) fn create<D>(
        device: &D,
        dev: DeviceHandle,
        depth: u32,
        mode: CompletionMode,
    ) -> Result<Self>
    where
        D: KvDevice + ?Sized,
    {
        let mut ids = QueueIds::default();

        let cq_id = ids.next();
        let cq = device.create_queue(
            dev,
            &QueueInfo {
                queue_id: cq_id,
                queue_size: depth,
                completion_queue_id: cq_id,
                queue_type: QueueType::Completion,
            },
        )?;

        let interrupt = match mode {
            CompletionMode::Polling => None,
            CompletionMode::Interrupt => {
                let handler = Arc::new(InterruptHandler::new(0));
                if let Err(status) = device.set_interrupt_handler(cq, handler.clone()) {
                    release_queue(device, dev, cq, "completion");
                    return Err(status.into());
                }
                Some(handler)
            }
        };

        let sq_id = ids.next();
        let sq = match device.create_queue(
            dev,
            &QueueInfo {
                queue_id: sq_id,
                queue_size: depth,
                completion_queue_id: cq_id,
                queue_type: QueueType::Submission,
            },
        ) {
            Ok(sq) => sq,
            Err(status) => {
                release_queue(device, dev, cq, "completion");
                return Err(status.into());
            }
        };

        tracing::debug!(cq_id, sq_id, depth, ?mode, "Created queue pair");

        Ok(Self {
            ids,
            mode,
            depth,
            cq,
            cq_id,
            sq,
            sq_id,
            interrupt,
        })
    }

    pub fn cq(&self) -> QueueHandle {
        self.cq
    }

    pub fn sq(&self) -> QueueHandle {
        self.sq
    }

    /// Ids assigned to the completion and submission queue.
    pub fn ids(&self) -> (u16, u16) {
        (self.cq_id, self.sq_id)
    }

    /// Id the next queue created by this instance would get.
    pub fn next_id(&self) -> u16 {
        self.ids.next
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    pub fn interrupt_handler(&self) -> Option<&Arc<InterruptHandler>> {
        self.interrupt.as_ref()
    }

    /// Poll the completion queue once.
    ///
    /// Polling failures are logged and count as zero completions.
    pub(crate) fn poll<D>(&self, device: &D) -> u32
    where
        D: KvDevice + ?Sized,
    {
        match device.poll_completion(self.cq) {
            Ok(processed) => processed,
            Err(status) => {
                tracing::warn!(%status, "Polling failed");
                0
            }
        }
    }

    /// Block until neither queue holds outstanding commands.
    ///
    /// In polling mode nobody else reaps completions, so the queue is
    /// polled here between checks.
    pub(crate) fn drain<D>(&self, device: &D, interval: Duration)
    where
        D: KvDevice + ?Sized,
    {
        loop {
            let cq = device.queued_commands(self.cq);
            let sq = device.queued_commands(self.sq);
            if cq == 0 && sq == 0 {
                return;
            }
            tracing::trace!(cq, sq, "Waiting for queues to drain");
            if self.mode == CompletionMode::Polling {
                self.poll(device);
            }
            thread::sleep(interval);
        }
    }

    /// Delete both queues. Call only after [`drain()`](Self::drain).
    ///
    /// Both deletions are attempted; failures are returned in order.
    pub(crate) fn delete<D>(&self, device: &D, dev: DeviceHandle) -> Vec<(&'static str, Status)>
    where
        D: KvDevice + ?Sized,
    {
        let mut failures = Vec::new();
        if let Err(status) = device.delete_queue(dev, self.sq) {
            tracing::error!(%status, "Delete submission queue failed");
            failures.push(("submission queue", status));
        }
        if let Err(status) = device.delete_queue(dev, self.cq) {
            tracing::error!(%status, "Delete completion queue failed");
            failures.push(("completion queue", status));
        }
        failures
    }
}

/// Best-effort cleanup of a queue created during a failed setup.
fn release_queue<D>(device: &D, dev: DeviceHandle, queue: QueueHandle, kind: &str)
where
    D: KvDevice + ?Sized,
{
    if let Err(status) = device.delete_queue(dev, queue) {
        tracing::warn!(kind, %status, "Failed to release queue after setup error");
    }
}
