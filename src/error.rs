//! Error types for the capture pipeline.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::ioctl::Request;

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The device lacks a capability this capture requires.
    #[error("device is missing mandatory capability {missing} ({bit:#010x})")]
    DeviceCapability {
        /// Kernel name of the missing bit.
        missing: &'static str,
        /// The missing bit itself.
        bit: u32,
    },

    /// The device rejected or altered the requested format.
    #[error("format negotiation failed: {reason}")]
    FormatNegotiation {
        /// What the device reported.
        reason: String,
    },

    /// The device granted fewer buffers than streaming needs.
    #[error("insufficient buffer memory: requested {requested}, got {granted}")]
    InsufficientBuffers {
        /// Count asked for.
        requested: u32,
        /// Count the device granted.
        granted: u32,
    },

    /// Mapping a device buffer into the process failed.
    #[error("mmap of buffer {index} failed: {source}")]
    Mapping {
        /// Buffer index.
        index: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Unmapping a device buffer failed.
    #[error("munmap of buffer {index} failed: {source}")]
    Unmapping {
        /// Buffer index.
        index: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A queue, dequeue or stream on/off request failed.
    #[error("{request}{} failed: {source}", index_suffix(Option::as_ref(.index)))]
    Queue {
        /// The failing request.
        request: Request,
        /// Buffer index, for per-buffer requests.
        index: Option<u32>,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The driver handed back a descriptor that cannot be trusted.
    #[error("corrupted buffer {index}: {reason}")]
    CorruptedBuffer {
        /// Index reported by the driver.
        index: u32,
        /// What was wrong with it.
        reason: String,
    },

    /// Any other request failed.
    #[error("{request}{} failed: {source}", index_suffix(Option::as_ref(.index)))]
    Request {
        /// The failing request.
        request: Request,
        /// Buffer index, for per-buffer requests.
        index: Option<u32>,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A kernel record does not have the size the request codes assume.
    #[error("ABI layout mismatch for {record}: expected {expected} bytes, got {actual}")]
    Layout {
        /// Record name.
        record: &'static str,
        /// Size in the reference ABI.
        expected: usize,
        /// Size in this build.
        actual: usize,
    },

    /// `read()` on the device failed.
    #[error("read frame failed: {0}")]
    Read(#[source] io::Error),
}

fn index_suffix(index: Option<&u32>) -> String {
    index.map_or_else(String::new, |index| format!(" index={index}"))
}

/// Discriminant of [`Error`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::DeviceCapability`].
    DeviceCapability,
    /// See [`Error::FormatNegotiation`].
    FormatNegotiation,
    /// See [`Error::InsufficientBuffers`].
    InsufficientBuffers,
    /// See [`Error::Mapping`] and [`Error::Unmapping`].
    Mapping,
    /// See [`Error::Queue`].
    Queue,
    /// See [`Error::CorruptedBuffer`].
    CorruptedBuffer,
    /// See [`Error::Request`].
    Request,
    /// See [`Error::Layout`].
    Layout,
    /// See [`Error::Read`].
    Read,
}

impl Error {
    /// Kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceCapability { .. } => ErrorKind::DeviceCapability,
            Self::FormatNegotiation { .. } => ErrorKind::FormatNegotiation,
            Self::InsufficientBuffers { .. } => ErrorKind::InsufficientBuffers,
            Self::Mapping { .. } | Self::Unmapping { .. } => ErrorKind::Mapping,
            Self::Queue { .. } => ErrorKind::Queue,
            Self::CorruptedBuffer { .. } => ErrorKind::CorruptedBuffer,
            Self::Request { .. } => ErrorKind::Request,
            Self::Layout { .. } => ErrorKind::Layout,
            Self::Read(_) => ErrorKind::Read,
        }
    }

    pub(crate) const fn queue(request: Request, index: Option<u32>, source: io::Error) -> Self {
        Self::Queue {
            request,
            index,
            source,
        }
    }

    pub(crate) const fn request(request: Request, source: io::Error) -> Self {
        Self::Request {
            request,
            index: None,
            source,
        }
    }
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Where the capture state machine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Nothing has been issued yet.
    Created,
    /// The buffer pool is mapped.
    BuffersAllocated,
    /// Every buffer is owned by the device.
    Queued,
    /// The device is filling buffers.
    Streaming,
    /// One filled buffer is back in user space.
    Dequeued,
    /// Streaming was turned off.
    Stopped,
    /// A step failed.
    Failed,
}

/// A failed capture: the first error plus everything cleanup reported.
#[derive(Debug)]
pub struct CaptureFailure {
    /// The first failure; never replaced by a later one.
    pub error: Error,
    /// Last state reached before `error` happened.
    pub state: CaptureState,
    /// Errors from stream-off and unmap that ran after `error`.
    pub cleanup: Vec<Error>,
}

impl CaptureFailure {
    /// Kind of the primary error.
    pub const fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture failed in state {:?}: {}", self.state, self.error)?;
        for err in &self.cleanup {
            write!(f, "; cleanup: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CaptureFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<Error> for CaptureFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            state: CaptureState::Created,
            cleanup: Vec::new(),
        }
    }
}
