//! Adapter configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default submission/completion queue depth.
pub const DEFAULT_QUEUE_DEPTH: u32 = 256;

/// Iterators a device can hold open at once.
pub const DEFAULT_MAX_ITERATORS: usize = 16;

/// How finished commands are reaped from the completion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// The caller polls the completion queue
    Polling,
    /// The device completes commands from its own interrupt context
    #[default]
    Interrupt,
}

/// What to do when the submission queue is full.
///
/// A full queue is transient backpressure; the same command is resubmitted
/// in a tight loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry until the device accepts or rejects the command
    #[default]
    Unbounded,
    /// Give up with [`Error::QueueFull`] after this many retries
    Bounded(usize),
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `retries` retries.
    pub fn allows(self, retries: usize) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Bounded(max) => retries < max,
        }
    }
}

/// Validated adapter options. Obtained via [`AdapterOpts::builder()`].
#[derive(Debug, Clone)]
pub struct AdapterOpts {
    pub devpath: String,
    pub config_file: Option<PathBuf>,
    pub queue_depth: u32,
    pub completion_mode: CompletionMode,
    pub max_iterators: usize,
    pub retry: RetryPolicy,
    /// Sleep between drain checks during shutdown
    pub drain_interval: Duration,
}

impl AdapterOpts {
    pub fn builder() -> AdapterOptsBuilder {
        AdapterOptsBuilder::new()
    }

    pub fn is_polling(&self) -> bool {
        self.completion_mode == CompletionMode::Polling
    }
}

/// Builder for [`AdapterOpts`].
#[derive(Debug, Clone)]
pub struct AdapterOptsBuilder {
    devpath: Option<String>,
    config_file: Option<PathBuf>,
    queue_depth: u32,
    completion_mode: CompletionMode,
    max_iterators: usize,
    retry: RetryPolicy,
    drain_interval: Duration,
}

impl AdapterOptsBuilder {
    pub fn new() -> Self {
        Self {
            devpath: None,
            config_file: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            completion_mode: CompletionMode::default(),
            max_iterators: DEFAULT_MAX_ITERATORS,
            retry: RetryPolicy::default(),
            drain_interval: Duration::from_micros(10),
        }
    }

    /// Set the device path, e.g. `/dev/nvme0n1`.
    pub fn devpath(mut self, path: &str) -> Self {
        self.devpath = Some(path.to_string());
        self
    }

    /// Set a device configuration file, passed through to the device.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the depth of both queues.
    pub fn queue_depth(mut self, depth: u32) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn completion_mode(mut self, mode: CompletionMode) -> Self {
        self.completion_mode = mode;
        self
    }

    /// Shorthand for polling vs interrupt completion.
    pub fn polling(self, polling: bool) -> Self {
        self.completion_mode(if polling {
            CompletionMode::Polling
        } else {
            CompletionMode::Interrupt
        })
    }

    pub fn max_iterators(mut self, max: usize) -> Self {
        self.max_iterators = max;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn build(self) -> Result<AdapterOpts> {
        let devpath = self
            .devpath
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidArgument("devpath is required".to_string()))?;
        if self.queue_depth == 0 {
            return Err(Error::InvalidArgument("queue depth must be > 0".to_string()));
        }
        if self.max_iterators == 0 {
            return Err(Error::InvalidArgument(
                "max iterators must be > 0".to_string(),
            ));
        }

        Ok(AdapterOpts {
            devpath,
            config_file: self.config_file,
            queue_depth: self.queue_depth,
            completion_mode: self.completion_mode,
            max_iterators: self.max_iterators,
            retry: self.retry,
            drain_interval: self.drain_interval,
        })
    }
}

impl Default for AdapterOptsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
