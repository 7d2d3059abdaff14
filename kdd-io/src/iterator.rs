//! Iterator sessions.
//!
//! The device holds a small, fixed number of iterators, and two open
//! iterators may not share a selection (bitmask and pattern). Before an
//! open is submitted the adapter checks the device's iterator table
//! together with its own sessions, which also covers opens that are still
//! in flight on other threads.
//!
//! Session states:
//!
//! ```text
//! closed ──open──▶ opening ──ok──▶ open ──close──▶ closing ──ok──▶ closed
//!                     │ failed                        │ failed
//!                     ▼                               ▼
//!                  closed                           open
//! ```
//!
//! Open and close always wait for completion, whatever mode the caller
//! uses for data commands: a handle must exist before it can be returned.

use parking_lot::Mutex;

use crate::adapter::{KvAdapter, Outcome};
use crate::context::{CompletionContext, IoCompletion, IoMode, IteratorList, Opcode, Tags};
use crate::device::{Command, DeviceOp, GroupCondition, IteratorHandle, IteratorInfo, KvDevice};
use crate::error::{Error, Result};
use crate::options::{IteratorOption, IteratorType};
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Open,
    Closing,
}

/// An iterator this adapter opened or is opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IteratorSession {
    pub cond: GroupCondition,
    pub state: SessionState,
    /// Set once the open completes
    pub handle: Option<IteratorHandle>,
}

impl IteratorSession {
    /// Whether a device table entry is this session.
    ///
    /// Before the open completes there is no handle yet, so the selection
    /// identifies it; two sessions never share one.
    fn tracks(&self, info: &IteratorInfo) -> bool {
        match self.handle {
            Some(handle) => handle == info.handle,
            None => self.cond.bitmask == info.bitmask && self.cond.bit_pattern == info.prefix,
        }
    }
}

/// Session table with a concurrency limit.
#[derive(Debug)]
pub(crate) struct Sessions {
    max: usize,
    table: Mutex<Vec<IteratorSession>>,
}

impl Sessions {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            max,
            table: Mutex::new(Vec::new()),
        }
    }

    /// Claim a slot for `cond`, marking it as opening.
    ///
    /// `device_table` is the device's view; open entries there that this
    /// adapter does not track (opened elsewhere) still count. An entry for
    /// one of our own opens still in flight is counted once, as a session.
    pub(crate) fn reserve(
        &self,
        device_table: &[IteratorInfo],
        cond: GroupCondition,
    ) -> Result<Reservation<'_>> {
        let mut table = self.table.lock();

        let mut opened = 0;
        for info in device_table.iter().filter(|info| info.open) {
            if table.iter().any(|s| s.tracks(info)) {
                continue;
            }
            opened += 1;
            if info.bitmask == cond.bitmask && info.prefix == cond.bit_pattern {
                return Err(already_open(cond));
            }
        }
        for session in table.iter() {
            opened += 1;
            if session.cond == cond {
                return Err(already_open(cond));
            }
        }
        if opened >= self.max {
            return Err(Error::IteratorLimitExceeded(opened));
        }

        table.push(IteratorSession {
            cond,
            state: SessionState::Opening,
            handle: None,
        });
        Ok(Reservation {
            sessions: self,
            cond,
            committed: false,
        })
    }

    /// Mark an open session as closing. Untracked handles are ignored.
    pub(crate) fn begin_close(&self, handle: IteratorHandle) {
        let mut table = self.table.lock();
        if let Some(session) = table.iter_mut().find(|s| s.handle == Some(handle)) {
            session.state = SessionState::Closing;
        }
    }

    /// Remove the session on a successful close, reopen it otherwise.
    pub(crate) fn finish_close(&self, handle: IteratorHandle, closed: bool) {
        let mut table = self.table.lock();
        if closed {
            table.retain(|s| s.handle != Some(handle));
        } else if let Some(session) = table.iter_mut().find(|s| s.handle == Some(handle)) {
            session.state = SessionState::Open;
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<IteratorSession> {
        self.table.lock().clone()
    }
}

fn already_open(cond: GroupCondition) -> Error {
    tracing::warn!(
        bitmask = cond.bitmask,
        pattern = cond.bit_pattern,
        "Iterator with same prefix/bitmask is already open"
    );
    Error::IteratorAlreadyOpen {
        bitmask: cond.bitmask,
        pattern: cond.bit_pattern,
    }
}

/// A slot in the opening state. Released on drop unless committed.
pub(crate) struct Reservation<'a> {
    sessions: &'a Sessions,
    cond: GroupCondition,
    committed: bool,
}

impl Reservation<'_> {
    pub(crate) fn commit(mut self, handle: IteratorHandle) {
        let mut table = self.sessions.table.lock();
        if let Some(session) = table
            .iter_mut()
            .find(|s| s.cond == self.cond && s.state == SessionState::Opening)
        {
            session.state = SessionState::Open;
            session.handle = Some(handle);
        }
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let cond = self.cond;
            self.sessions
                .table
                .lock()
                .retain(|s| !(s.cond == cond && s.state == SessionState::Opening));
        }
    }
}

impl<D: KvDevice> KvAdapter<D> {
    /// Open an iterator over keys matching `bitmask`/`bit_pattern`.
    ///
    /// Fails without submitting anything when the selection is already
    /// open ([`Error::IteratorAlreadyOpen`]) or no slot is free
    /// ([`Error::IteratorLimitExceeded`]). Only key iterators are
    /// supported; other types are a fatal [`Error::UnsupportedIterator`].
    pub fn open_iterator(
        &self,
        option: IteratorOption,
        bitmask: u32,
        bit_pattern: u32,
    ) -> Result<IteratorHandle> {
        if option.iter_type != IteratorType::Key {
            tracing::error!(
                iter_type = ?option.iter_type,
                "Iterator for key-value retrieve is not supported"
            );
            return Err(Error::UnsupportedIterator(option.iter_type));
        }

        let device_table = match self.device.list_iterators(self.queues.sq(), self.ns) {
            Ok(table) => table,
            Err(status) => {
                tracing::warn!(%status, "List iterators failed");
                Vec::new()
            }
        };

        let cond = GroupCondition {
            bitmask,
            bit_pattern,
        };
        let reservation = self.sessions.reserve(&device_table, cond)?;

        let io = self.control(
            Opcode::OpenIterator,
            DeviceOp::OpenIterator {
                option: option.iter_type.to_device(),
                cond,
            },
        )?;
        if !io.result.is_success() {
            return Err(Error::Device(io.result));
        }
        let handle = io
            .iterator
            .ok_or(Error::Device(Status::ITERATOR_NOT_EXIST))?;

        reservation.commit(handle);
        tracing::debug!(handle = handle.0, bitmask, bit_pattern, "Iterator opened");
        Ok(handle)
    }

    /// Close an iterator. Returns the device result of the close.
    pub fn close_iterator(&self, handle: IteratorHandle) -> Result<Status> {
        self.sessions.begin_close(handle);

        match self.control(Opcode::CloseIterator, DeviceOp::CloseIterator(handle)) {
            Ok(io) => {
                self.sessions.finish_close(handle, io.result.is_success());
                Ok(io.result)
            }
            Err(e) => {
                self.sessions.finish_close(handle, false);
                Err(e)
            }
        }
    }

    /// Not supported by this device.
    pub fn close_iterator_all(&self) -> Result<()> {
        tracing::warn!("Closing all iterators is not supported by this device");
        Err(Error::InvalidOption("close all iterators".to_string()))
    }

    /// The device's iterator table.
    pub fn list_iterators(&self) -> Result<Vec<IteratorInfo>> {
        self.device
            .list_iterators(self.queues.sq(), self.ns)
            .map_err(Error::Device)
    }

    /// Iterators this adapter has open, opening or closing.
    pub fn iterator_sessions(&self) -> Vec<IteratorSession> {
        self.sessions.snapshot()
    }

    /// Fetch the next batch of entries into `list`.
    ///
    /// [`Status::ITERATOR_END`] in the result marks the last batch.
    pub fn iterator_next(
        &self,
        handle: IteratorHandle,
        list: IteratorList,
        tags: Tags,
        mode: IoMode,
    ) -> Result<Outcome> {
        let (mut ctx, rx) =
            CompletionContext::create(Opcode::IteratorNext, None, None, tags, mode, &self.shared);
        ctx.io.iter_list = Some(list);
        self.execute(Command::new(DeviceOp::IteratorNext(handle), ctx), rx)
    }

    /// Run an iterator open/close to completion.
    fn control(&self, opcode: Opcode, op: DeviceOp) -> Result<IoCompletion> {
        let (ctx, rx) =
            CompletionContext::create(opcode, None, None, Tags::default(), IoMode::Sync, &self.shared);
        match self.execute(Command::new(op, ctx), rx)? {
            Outcome::Completed(io) => Ok(io),
            Outcome::Submitted => Err(Error::Cancelled),
        }
    }
}
