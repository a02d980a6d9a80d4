//! v4l2-oneshot: grab a single frame from a V4L2 capture device.
//!
//! The library speaks the kernel's V4L2 request interface directly: it
//! validates capabilities, negotiates a format, maps a small pool of driver
//! buffers, streams just long enough to dequeue one filled buffer, copies it
//! out and tears everything down again. Every request goes through the
//! [`DeviceControl`] trait, so the whole sequence runs against real hardware
//! ([`V4L2Device`]) or a simulated device in tests.

pub mod abi;
pub mod capability;
pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod frame;
pub mod ioctl;
pub mod pool;
pub mod stream;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use capture::capture_frame;
pub use config::{CaptureConfig, CaptureMode};
pub use device::{MmapRegion, V4L2Device};
pub use error::{CaptureFailure, CaptureState, Error, ErrorKind, Result};
pub use format::FormatPolicy;
pub use pool::{BufferPool, MappedBuffer};
pub use traits::{
    DeviceCapabilities, DeviceControl, FieldOrder, Format, FormatDescription, FourCC, Frame,
    FrameMetadata, MappedRegion,
};
