//! Capture configuration.

use crate::format::FormatPolicy;
use crate::traits::{FourCC, Format};

/// Buffers requested when the caller does not say otherwise.
pub const DEFAULT_BUFFER_COUNT: u32 = 4;

/// How frame bytes get from the driver to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureMode {
    /// Memory-mapped streaming I/O.
    #[default]
    Mmap,
    /// A single blocking `read()`.
    ReadWrite,
}

/// Everything one capture needs besides the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Format to request. The driver may adjust it.
    pub format: Format,
    /// Buffers to request for streaming.
    pub buffer_count: u32,
    /// Transfer method.
    pub mode: CaptureMode,
    /// Fail up front if the device lacks `V4L2_CAP_READWRITE`.
    pub require_read_write: bool,
    /// What to do when the driver adjusts the format.
    pub policy: FormatPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: Format::new(640, 480, FourCC::YUYV),
            buffer_count: DEFAULT_BUFFER_COUNT,
            mode: CaptureMode::default(),
            require_read_write: false,
            policy: FormatPolicy::default(),
        }
    }
}

impl CaptureConfig {
    /// Request a different format.
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Request a different number of streaming buffers.
    #[must_use]
    pub const fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    /// Select the transfer method.
    #[must_use]
    pub const fn with_mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Require `V4L2_CAP_READWRITE` even for streaming capture.
    #[must_use]
    pub const fn with_require_read_write(mut self, require: bool) -> Self {
        self.require_read_write = require;
        self
    }

    /// Set the format policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FormatPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether the capability check has to include read-write support.
    pub fn needs_read_write(&self) -> bool {
        self.require_read_write || self.mode == CaptureMode::ReadWrite
    }
}
