//! Core traits and types for V4L2 single-frame capture.

use std::io;
use std::time::Duration;

use crate::abi::{RawBuffer, RawCapability, RawFmtDesc, RawFormat, RawRequestBuffers};

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");

    /// Kernel `pixelformat` code (first character in the low byte).
    pub const fn code(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Inverse of [`FourCC::code`].
    pub const fn from_code(code: u32) -> Self {
        Self(code.to_le_bytes())
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in &self.0 {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("fourcc must be exactly 4 bytes, got {s:?}"))?;
        Ok(Self(bytes))
    }
}

/// Field order of the captured image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrder {
    /// Let the driver choose.
    Any,
    /// Progressive frames.
    Progressive,
    /// Any other kernel `v4l2_field` value.
    Other(u32),
}

impl FieldOrder {
    /// Kernel `v4l2_field` value.
    pub const fn code(self) -> u32 {
        match self {
            Self::Any => crate::abi::FIELD_ANY,
            Self::Progressive => crate::abi::FIELD_NONE,
            Self::Other(code) => code,
        }
    }

    /// Inverse of [`FieldOrder::code`].
    pub const fn from_code(code: u32) -> Self {
        match code {
            crate::abi::FIELD_ANY => Self::Any,
            crate::abi::FIELD_NONE => Self::Progressive,
            other => Self::Other(other),
        }
    }
}

/// Video format: requested or as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Field order.
    pub field: FieldOrder,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
    /// Colorspace, `v4l2_colorspace`.
    pub colorspace: u32,
    /// `Y'CbCr` encoding, `v4l2_ycbcr_encoding`.
    pub ycbcr_enc: u32,
    /// Quantization range, `v4l2_quantization`.
    pub quantization: u32,
    /// Transfer function, `v4l2_xfer_func`.
    pub xfer_func: u32,
    /// Format flags.
    pub flags: u32,
}

impl Format {
    /// Create a new progressive format request.
    ///
    /// Stride and size are left at zero; the driver fills them in.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            width,
            height,
            fourcc,
            field: FieldOrder::Progressive,
            stride: 0,
            size: 0,
            colorspace: 0,
            ycbcr_enc: 0,
            quantization: 0,
            xfer_func: 0,
            flags: 0,
        }
    }
}

/// One entry of the driver's format list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    /// Position in the driver's list.
    pub index: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Human-readable name from the driver.
    pub description: String,
    /// Whether the format is compressed.
    pub compressed: bool,
    /// Whether the format is converted in software by libv4l.
    pub emulated: bool,
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Kernel version, `KERNEL_VERSION` encoded.
    pub version: u32,
    /// Aggregate capability mask of the physical device.
    pub capabilities: u32,
    /// Mask of this device node, when the driver reports one.
    pub device_caps: u32,
    /// The mask that applies to this node.
    pub effective: u32,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
    /// Whether the device supports `read()`.
    pub can_read_write: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Buffer the frame came from. Zero for `read()` capture.
    pub index: u32,
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
    /// Buffer flags reported by the driver.
    pub flags: u32,
}

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data, owned by the caller.
    pub data: Vec<u8>,
    /// Frame metadata.
    pub metadata: FrameMetadata,
    /// Format negotiated for the capture.
    pub format: Format,
}

/// A device buffer mapped into the process.
///
/// The region stays valid until [`MappedRegion::unmap`] consumes it.
pub trait MappedRegion {
    /// Length of the region in bytes.
    fn len(&self) -> usize;

    /// Whether the region is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start address, for diagnostics and overlap checks.
    fn as_ptr(&self) -> *const u8;

    /// Run `f` over the mapped bytes.
    fn with_bytes<R, F: FnOnce(&[u8]) -> R>(&self, f: F) -> R;

    /// Release the mapping.
    fn unmap(self) -> io::Result<()>;
}

/// The V4L2 requests a capture needs, one typed method per request.
///
/// Each method issues exactly one request; the record is both input and
/// output, as with the raw ioctl.
pub trait DeviceControl {
    /// Mapping type produced by [`DeviceControl::map`].
    type Region: MappedRegion;

    /// `VIDIOC_QUERYCAP`
    fn query_capabilities(&mut self, cap: &mut RawCapability) -> io::Result<()>;

    /// `VIDIOC_ENUM_FMT`
    fn enum_format(&mut self, desc: &mut RawFmtDesc) -> io::Result<()>;

    /// `VIDIOC_S_FMT`
    fn set_format(&mut self, format: &mut RawFormat) -> io::Result<()>;

    /// `VIDIOC_G_FMT`
    fn get_format(&mut self, format: &mut RawFormat) -> io::Result<()>;

    /// `VIDIOC_REQBUFS`
    fn request_buffers(&mut self, req: &mut RawRequestBuffers) -> io::Result<()>;

    /// `VIDIOC_QUERYBUF`
    fn query_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()>;

    /// `VIDIOC_QBUF`
    fn queue_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()>;

    /// `VIDIOC_DQBUF`. Blocks until a filled buffer is available.
    fn dequeue_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()>;

    /// `VIDIOC_STREAMON`
    fn stream_on(&mut self, buf_type: u32) -> io::Result<()>;

    /// `VIDIOC_STREAMOFF`
    fn stream_off(&mut self, buf_type: u32) -> io::Result<()>;

    /// Map `length` bytes of device memory at `offset`, read-write and shared.
    fn map(&mut self, offset: u32, length: u32) -> io::Result<Self::Region>;

    /// Blocking `read()` of one frame.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}
