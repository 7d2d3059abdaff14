//! Single-slot completion channel.
//!
//! The device finishes commands from whatever thread drives its
//! completion queue. A synchronous caller needs to sleep until its own
//! command is done, so each synchronous command carries one end of a
//! one-shot channel:
//!
//! 1. The submitter creates a pair with [`completion()`]
//! 2. The sender rides inside the command's completion context
//! 3. The dispatcher fulfills the sender exactly once
//! 4. The submitter drives the receiver with [`block_on()`]
//!
//! [`CompletionReceiver`] is a plain `Future`, so it can also be awaited
//! from an async executor.

use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

use futures_channel::oneshot;

use crate::error::{Error, Result};

/// Sender half of a completion pair.
pub struct CompletionSender<T> {
    tx: oneshot::Sender<T>,
}

impl<T> CompletionSender<T> {
    /// Deliver the value to the receiver.
    ///
    /// Consumes the sender, so a slot can only be filled once. If the
    /// receiver is gone the value is handed back.
    pub fn complete(self, value: T) -> std::result::Result<(), T> {
        self.tx.send(value)
    }
}

/// Receiver half of a completion pair.
///
/// Resolves to [`Error::Cancelled`] if the sender is dropped unfilled.
pub struct CompletionReceiver<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for CompletionReceiver<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Ok(value)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a completion sender/receiver pair.
pub fn completion<T>() -> (CompletionSender<T>, CompletionReceiver<T>) {
    let (tx, rx) = oneshot::channel();
    (CompletionSender { tx }, CompletionReceiver { rx })
}

/// Waker that unparks the thread blocked in [`block_on`].
struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

/// Block the current thread on a future.
///
/// Polls the future; while it is pending, calls `idle` and polls again.
/// Two kinds of `idle` are used by the adapter:
///
/// - [`park`] when completions arrive from another thread (interrupt
///   mode). The waker unparks this thread once the slot is filled.
/// - A closure that polls the completion queue when this thread is the
///   one that has to reap completions (polling mode).
///
/// Spurious wakeups are harmless: the future is polled again and only a
/// filled slot ends the loop.
pub fn block_on<F, I>(future: F, mut idle: I) -> F::Output
where
    F: Future,
    I: FnMut(),
{
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => return output,
            Poll::Pending => idle(),
        }
    }
}

/// Idle strategy that sleeps until woken.
pub fn park() {
    thread::park();
}
