//! Completion dispatcher.
//!
//! Entry point for every finished command. Runs on whichever thread the
//! device completes on, and routes the result either to the synchronous
//! caller blocked on the context, or to the caller's async callback.

use crate::context::{CompletionContext, Opcode, Waiter};
use crate::device::DeviceCompletion;

/// Record `completion` in `ctx` and hand the context on.
///
/// Sync: the context itself is sent to the waiter, who releases it.
/// Async: the callback runs, then the context is released here.
pub(crate) fn dispatch(mut ctx: Box<CompletionContext>, completion: DeviceCompletion) {
    let opcode = ctx.opcode();
    let status = completion.status;

    if status.is_error() {
        let devpath = ctx.owner().map(|owner| owner.devpath.clone());
        tracing::error!(
            cmd = opcode.name(),
            code = status.code(),
            devpath = devpath.as_deref().unwrap_or("<detached>"),
            "{} failed: {}",
            opcode.name(),
            status.as_str()
        );
    }

    ctx.io.result = status;
    match opcode {
        Opcode::Retrieve => {
            if let Some(value) = ctx.io.value.as_mut() {
                value.actual_value_size = completion.actual_value_size;
            }
        }
        Opcode::OpenIterator => ctx.io.iterator = completion.iterator,
        _ => {}
    }

    let Some(waiter) = ctx.waiter.take() else {
        // A context is built with a waiter and only this function takes it.
        debug_assert!(false, "{} context dispatched twice", opcode.name());
        return;
    };

    match waiter {
        Waiter::Sync(tx) => {
            if let Err(ctx) = tx.complete(ctx) {
                tracing::warn!(cmd = opcode.name(), "Synchronous waiter gone, dropping result");
                drop(ctx);
            }
        }
        Waiter::Async(callback) => {
            let io = ctx.into_completion();
            if opcode.is_iterator_control() {
                return;
            }
            if let Some(callback) = callback {
                callback(io);
            }
        }
    }
}
