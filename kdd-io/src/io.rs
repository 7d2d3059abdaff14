//! Data commands: store, retrieve, delete, exist.
//!
//! Options are translated to device codes before a completion context
//! exists, so an invalid request never allocates or submits anything.

use crate::adapter::{KvAdapter, Outcome};
use crate::context::{CompletionContext, IoMode, KvValue, Opcode, Tags};
use crate::device::{Command, DeviceOp, KvDevice};
use crate::error::{Error, Result};
use crate::options::{DeleteOption, RetrieveOption, StoreOption};

impl<D: KvDevice> KvAdapter<D> {
    /// Store `value` under `key`.
    pub fn store(
        &self,
        key: impl Into<Vec<u8>>,
        value: KvValue,
        option: StoreOption,
        tags: Tags,
        mode: IoMode,
    ) -> Result<Outcome> {
        let op = DeviceOp::Store(option.to_device());
        let (ctx, rx) = CompletionContext::create(
            Opcode::Store,
            Some(key.into()),
            Some(value),
            tags,
            mode,
            &self.shared,
        );
        self.execute(Command::new(op, ctx), rx)
    }

    /// Read the value of `key` into `value`.
    ///
    /// On completion `value.actual_value_size` holds the stored size. A
    /// missing key completes with [`Status::KEY_NOT_EXIST`](crate::Status::KEY_NOT_EXIST).
    pub fn retrieve(
        &self,
        key: impl Into<Vec<u8>>,
        value: KvValue,
        option: RetrieveOption,
        tags: Tags,
        mode: IoMode,
    ) -> Result<Outcome> {
        let op = DeviceOp::Retrieve(option.to_device());
        let (ctx, rx) = CompletionContext::create(
            Opcode::Retrieve,
            Some(key.into()),
            Some(value),
            tags,
            mode,
            &self.shared,
        );
        self.execute(Command::new(op, ctx), rx)
    }

    pub fn delete(
        &self,
        key: impl Into<Vec<u8>>,
        option: DeleteOption,
        tags: Tags,
        mode: IoMode,
    ) -> Result<Outcome> {
        let op = DeviceOp::Delete(option.to_device());
        let (ctx, rx) = CompletionContext::create(
            Opcode::Delete,
            Some(key.into()),
            None,
            tags,
            mode,
            &self.shared,
        );
        self.execute(Command::new(op, ctx), rx)
    }

    /// Check whether keys exist; the device writes a bitmap into
    /// `result_buffer`.
    ///
    /// This device checks one key per command. More than one key is a
    /// fatal [`Error::MultiKeyExist`], raised before anything is submitted.
    pub fn exist(
        &self,
        keys: Vec<Vec<u8>>,
        result_buffer: Vec<u8>,
        tags: Tags,
        mode: IoMode,
    ) -> Result<Outcome> {
        if keys.len() > 1 {
            tracing::error!(key_cnt = keys.len(), "Device only supports one key check");
            return Err(Error::MultiKeyExist(keys.len()));
        }
        let Some(key) = keys.into_iter().next() else {
            return Err(Error::InvalidArgument("exist needs a key".to_string()));
        };

        let (mut ctx, rx) =
            CompletionContext::create(Opcode::Exist, Some(key), None, tags, mode, &self.shared);
        ctx.io.key_cnt = 1;
        ctx.io.result_buffer = Some(result_buffer);
        self.execute(Command::new(DeviceOp::Exist, ctx), rx)
    }
}
