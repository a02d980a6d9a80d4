//! Kernel-facing V4L2 records.
//!
//! Every struct here mirrors a `videodev2.h` record field for field. Field
//! order and padding must not change: the request codes in [`crate::ioctl`]
//! embed these sizes and the kernel copies the bytes verbatim.

#![allow(unsafe_code, missing_docs)]

use std::mem::{align_of, size_of};
use std::time::Duration;

use crate::error::{Error, Result};

/// `V4L2_BUF_TYPE_VIDEO_CAPTURE`
pub const BUF_TYPE_VIDEO_CAPTURE: u32 = 1;

/// `V4L2_MEMORY_MMAP`
pub const MEMORY_MMAP: u32 = 1;
/// `V4L2_MEMORY_USERPTR`
pub const MEMORY_USERPTR: u32 = 2;
/// `V4L2_MEMORY_DMABUF`
pub const MEMORY_DMABUF: u32 = 4;

/// `V4L2_FIELD_ANY`
pub const FIELD_ANY: u32 = 0;
/// `V4L2_FIELD_NONE` (progressive)
pub const FIELD_NONE: u32 = 1;

/// `V4L2_CAP_VIDEO_CAPTURE`
pub const CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
/// `V4L2_CAP_READWRITE`
pub const CAP_READWRITE: u32 = 0x0100_0000;
/// `V4L2_CAP_STREAMING`
pub const CAP_STREAMING: u32 = 0x0400_0000;
/// `V4L2_CAP_DEVICE_CAPS`
pub const CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// `V4L2_FMT_FLAG_COMPRESSED`
pub const FMT_FLAG_COMPRESSED: u32 = 0x0001;
/// `V4L2_FMT_FLAG_EMULATED`
pub const FMT_FLAG_EMULATED: u32 = 0x0002;

/// `V4L2_BUF_FLAG_MAPPED`
pub const BUF_FLAG_MAPPED: u32 = 0x0001;
/// `V4L2_BUF_FLAG_QUEUED`
pub const BUF_FLAG_QUEUED: u32 = 0x0002;
/// `V4L2_BUF_FLAG_DONE`
pub const BUF_FLAG_DONE: u32 = 0x0004;
/// `V4L2_BUF_FLAG_ERROR`
pub const BUF_FLAG_ERROR: u32 = 0x0040;

/// Size of the opaque payload region in `struct v4l2_format`.
pub const FORMAT_PAYLOAD_SIZE: usize = 200;

/// `struct v4l2_capability`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawCapability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

/// `struct v4l2_pix_format`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RawPixFormat {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

/// Payload region of `struct v4l2_format`.
///
/// The kernel union contains pointer-bearing members, so the region is
/// pointer aligned; `_align` reproduces that without adding bytes.
#[derive(Clone, Copy)]
#[repr(C)]
pub union FormatPayload {
    pix: RawPixFormat,
    raw: [u8; FORMAT_PAYLOAD_SIZE],
    _align: [usize; 0],
}

/// `struct v4l2_format`
#[derive(Clone, Copy)]
#[repr(C)]
pub struct RawFormat {
    pub type_: u32,
    fmt: FormatPayload,
}

impl RawFormat {
    /// Empty record for the given buffer type; the payload is all zeroes.
    pub const fn new(type_: u32) -> Self {
        Self {
            type_,
            fmt: FormatPayload {
                raw: [0; FORMAT_PAYLOAD_SIZE],
            },
        }
    }

    /// Capture-type record carrying `pix`.
    pub const fn capture(pix: RawPixFormat) -> Self {
        let mut format = Self::new(BUF_TYPE_VIDEO_CAPTURE);
        format.fmt.pix = pix;
        format
    }

    /// The pixel-format view, only valid for the capture type.
    pub const fn pix(&self) -> Option<RawPixFormat> {
        if self.type_ != BUF_TYPE_VIDEO_CAPTURE {
            return None;
        }
        // SAFETY: the payload is fully initialised by `new` and every bit
        // pattern is a valid `RawPixFormat` (plain u32 fields).
        Some(unsafe { self.fmt.pix })
    }

    /// Replace the pixel-format view. Ignored unless the type is capture.
    pub const fn set_pix(&mut self, pix: RawPixFormat) {
        if self.type_ == BUF_TYPE_VIDEO_CAPTURE {
            self.fmt.pix = pix;
        }
    }
}

/// `struct v4l2_fmtdesc`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawFmtDesc {
    pub index: u32,
    pub type_: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixelformat: u32,
    pub mbus_code: u32,
    pub reserved: [u32; 3],
}

/// `struct v4l2_requestbuffers`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct RawRequestBuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

impl RawRequestBuffers {
    /// Request for `count` mapped-memory capture buffers.
    pub const fn mmap_capture(count: u32) -> Self {
        Self {
            count,
            type_: BUF_TYPE_VIDEO_CAPTURE,
            memory: MEMORY_MMAP,
            capabilities: 0,
            flags: 0,
            reserved: [0; 3],
        }
    }
}

/// `struct v4l2_timecode`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RawTimecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

/// The `m` union of `struct v4l2_buffer`.
#[derive(Clone, Copy)]
#[repr(C)]
pub union BufferLocator {
    offset: u32,
    userptr: libc::c_ulong,
    fd: i32,
}

/// Active interpretation of [`BufferLocator`], keyed by the memory kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator {
    /// Offset to pass to `mmap` for mapped-memory buffers.
    Offset(u32),
    /// User-space address for user-pointer buffers.
    UserPtr(libc::c_ulong),
    /// DMA-buf file descriptor.
    DmaBuf(i32),
    /// Memory kind this crate does not interpret.
    Unknown(u32),
}

/// `struct v4l2_buffer`
#[derive(Clone, Copy)]
#[repr(C)]
pub struct RawBuffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: RawTimecode,
    pub sequence: u32,
    pub memory: u32,
    m: BufferLocator,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

impl RawBuffer {
    /// Descriptor for capture buffer `index` backed by mapped memory.
    pub const fn mmap_capture(index: u32) -> Self {
        // SAFETY: every field is an integer or an integer union, all of which
        // accept the all-zero bit pattern.
        let mut buf: Self = unsafe { std::mem::zeroed() };
        buf.index = index;
        buf.type_ = BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = MEMORY_MMAP;
        buf
    }

    /// Locator interpreted according to `memory`.
    pub const fn locator(&self) -> Locator {
        // SAFETY: the union is zero-initialised in `mmap_capture` and the
        // kernel only writes plain integers into it.
        unsafe {
            match self.memory {
                MEMORY_MMAP => Locator::Offset(self.m.offset),
                MEMORY_USERPTR => Locator::UserPtr(self.m.userptr),
                MEMORY_DMABUF => Locator::DmaBuf(self.m.fd),
                other => Locator::Unknown(other),
            }
        }
    }

    /// Set the mapped-memory offset. Only meaningful when `memory` is MMAP.
    pub const fn set_offset(&mut self, offset: u32) {
        self.m = BufferLocator { userptr: 0 };
        self.m.offset = offset;
    }

    /// Mapped-memory offset, if this is a mapped-memory descriptor.
    pub fn offset(&self) -> Option<u32> {
        match self.locator() {
            Locator::Offset(offset) => Some(offset),
            _ => None,
        }
    }

    /// Capture timestamp. Negative kernel values clamp to zero.
    pub fn timestamp(&self) -> Duration {
        #[allow(clippy::cast_sign_loss)]
        let secs = self.timestamp.tv_sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let micros = self.timestamp.tv_usec.clamp(0, 999_999) as u32;
        Duration::new(secs, micros * 1000)
    }
}

/// Decode a fixed-width, NUL-terminated kernel string.
pub fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(bytes.get(..end).unwrap_or(bytes)).into_owned()
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(size_of::<RawBuffer>() == 88);

const POINTER_64: bool = cfg!(target_pointer_width = "64");

/// Record sizes of the reference ABI, as the kernel headers define them.
const EXPECTED_LAYOUT: [(&str, usize, usize); 6] = [
    ("v4l2_capability", 104, size_of::<RawCapability>()),
    ("v4l2_pix_format", 48, size_of::<RawPixFormat>()),
    (
        "v4l2_format",
        if POINTER_64 { 208 } else { 204 },
        size_of::<RawFormat>(),
    ),
    ("v4l2_fmtdesc", 64, size_of::<RawFmtDesc>()),
    ("v4l2_requestbuffers", 20, size_of::<RawRequestBuffers>()),
    (
        "v4l2_buffer",
        if POINTER_64 { 88 } else { 68 },
        size_of::<RawBuffer>(),
    ),
];

/// Check every record against the reference ABI sizes.
///
/// A mismatch means the request codes point at the wrong kernel handler, so
/// nothing may be issued when this fails.
pub fn verify_layout() -> Result<()> {
    for (record, expected, actual) in EXPECTED_LAYOUT {
        if expected != actual {
            return Err(Error::Layout {
                record,
                expected,
                actual,
            });
        }
    }
    if align_of::<RawFormat>() != align_of::<usize>() {
        return Err(Error::Layout {
            record: "v4l2_format alignment",
            expected: align_of::<usize>(),
            actual: align_of::<RawFormat>(),
        });
    }
    Ok(())
}
