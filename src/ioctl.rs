//! Request-code encoding and the V4L2 request catalogue.
//!
//! Codes follow the asm-generic Linux layout used on x86, x86-64, arm,
//! aarch64 and riscv:
//!
//! ```text
//! [ dir (2) ][ size (14) ][ type (8) ][ nr (8) ]
//!   bit 31                               bit 0
//! ```

use std::mem::size_of;

use crate::abi::{RawBuffer, RawCapability, RawFmtDesc, RawFormat, RawRequestBuffers};

const NR_BITS: u32 = 8;
const TYPE_BITS: u32 = 8;
const SIZE_BITS: u32 = 14;

const NR_SHIFT: u32 = 0;
const TYPE_SHIFT: u32 = NR_SHIFT + NR_BITS;
const SIZE_SHIFT: u32 = TYPE_SHIFT + TYPE_BITS;
const DIR_SHIFT: u32 = SIZE_SHIFT + SIZE_BITS;

const SIZE_MASK: u32 = (1 << SIZE_BITS) - 1;

/// Type byte shared by every V4L2 request.
pub const V4L2_TYPE: u8 = b'V';

/// Data transfer direction of a request, seen from user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Direction {
    /// No payload.
    None = 0,
    /// User space writes, kernel reads.
    Write = 1,
    /// Kernel writes, user space reads.
    Read = 2,
    /// Both ways.
    ReadWrite = 3,
}

impl Direction {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            1 => Self::Write,
            2 => Self::Read,
            3 => Self::ReadWrite,
            _ => Self::None,
        }
    }
}

/// Pack the four request fields into one code.
///
/// Sizes wider than 14 bits are truncated to keep the direction bits intact.
pub const fn ioc(dir: Direction, kind: u8, nr: u8, size: usize) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let size = (size as u32) & SIZE_MASK;
    ((dir as u32) << DIR_SHIFT)
        | (size << SIZE_SHIFT)
        | ((kind as u32) << TYPE_SHIFT)
        | ((nr as u32) << NR_SHIFT)
}

/// Request without payload (`_IO`).
pub const fn io(kind: u8, nr: u8) -> u32 {
    ioc(Direction::None, kind, nr, 0)
}

/// Kernel-to-user request (`_IOR`).
pub const fn ior(kind: u8, nr: u8, size: usize) -> u32 {
    ioc(Direction::Read, kind, nr, size)
}

/// User-to-kernel request (`_IOW`).
pub const fn iow(kind: u8, nr: u8, size: usize) -> u32 {
    ioc(Direction::Write, kind, nr, size)
}

/// Bidirectional request (`_IOWR`).
pub const fn iowr(kind: u8, nr: u8, size: usize) -> u32 {
    ioc(Direction::ReadWrite, kind, nr, size)
}

/// Direction field of an encoded code.
pub const fn direction(code: u32) -> Direction {
    Direction::from_bits(code >> DIR_SHIFT)
}

/// Payload size field of an encoded code.
pub const fn size(code: u32) -> usize {
    ((code >> SIZE_SHIFT) & SIZE_MASK) as usize
}

/// Type byte of an encoded code.
pub const fn kind(code: u32) -> u8 {
    ((code >> TYPE_SHIFT) & 0xff) as u8
}

/// Request number of an encoded code.
pub const fn number(code: u32) -> u8 {
    ((code >> NR_SHIFT) & 0xff) as u8
}

/// The V4L2 requests this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    /// `VIDIOC_QUERYCAP`
    QueryCap,
    /// `VIDIOC_ENUM_FMT`
    EnumFormat,
    /// `VIDIOC_G_FMT`
    GetFormat,
    /// `VIDIOC_S_FMT`
    SetFormat,
    /// `VIDIOC_REQBUFS`
    RequestBuffers,
    /// `VIDIOC_QUERYBUF`
    QueryBuffer,
    /// `VIDIOC_QBUF`
    QueueBuffer,
    /// `VIDIOC_DQBUF`
    DequeueBuffer,
    /// `VIDIOC_STREAMON`
    StreamOn,
    /// `VIDIOC_STREAMOFF`
    StreamOff,
}

/// Query device capabilities.
pub const VIDIOC_QUERYCAP: u32 = ior(V4L2_TYPE, 0, size_of::<RawCapability>());
/// Enumerate pixel formats.
pub const VIDIOC_ENUM_FMT: u32 = iowr(V4L2_TYPE, 2, size_of::<RawFmtDesc>());
/// Get the current format.
///
/// Only reads device state, but the kernel declares it read-write.
pub const VIDIOC_G_FMT: u32 = iowr(V4L2_TYPE, 4, size_of::<RawFormat>());
/// Set the format.
pub const VIDIOC_S_FMT: u32 = iowr(V4L2_TYPE, 5, size_of::<RawFormat>());
/// Allocate driver buffers.
pub const VIDIOC_REQBUFS: u32 = iowr(V4L2_TYPE, 8, size_of::<RawRequestBuffers>());
/// Query a buffer's length and offset.
pub const VIDIOC_QUERYBUF: u32 = iowr(V4L2_TYPE, 9, size_of::<RawBuffer>());
/// Hand a buffer to the driver.
pub const VIDIOC_QBUF: u32 = iowr(V4L2_TYPE, 15, size_of::<RawBuffer>());
/// Take a filled buffer back.
pub const VIDIOC_DQBUF: u32 = iowr(V4L2_TYPE, 17, size_of::<RawBuffer>());
/// Start streaming.
pub const VIDIOC_STREAMON: u32 = iow(V4L2_TYPE, 18, size_of::<libc::c_int>());
/// Stop streaming and return all buffers.
pub const VIDIOC_STREAMOFF: u32 = iow(V4L2_TYPE, 19, size_of::<libc::c_int>());

impl Request {
    /// Every request, in catalogue order.
    pub const ALL: [Self; 10] = [
        Self::QueryCap,
        Self::EnumFormat,
        Self::GetFormat,
        Self::SetFormat,
        Self::RequestBuffers,
        Self::QueryBuffer,
        Self::QueueBuffer,
        Self::DequeueBuffer,
        Self::StreamOn,
        Self::StreamOff,
    ];

    /// Encoded request code.
    pub const fn code(self) -> u32 {
        match self {
            Self::QueryCap => VIDIOC_QUERYCAP,
            Self::EnumFormat => VIDIOC_ENUM_FMT,
            Self::GetFormat => VIDIOC_G_FMT,
            Self::SetFormat => VIDIOC_S_FMT,
            Self::RequestBuffers => VIDIOC_REQBUFS,
            Self::QueryBuffer => VIDIOC_QUERYBUF,
            Self::QueueBuffer => VIDIOC_QBUF,
            Self::DequeueBuffer => VIDIOC_DQBUF,
            Self::StreamOn => VIDIOC_STREAMON,
            Self::StreamOff => VIDIOC_STREAMOFF,
        }
    }

    /// Kernel name of the request, used in errors and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::QueryCap => "VIDIOC_QUERYCAP",
            Self::EnumFormat => "VIDIOC_ENUM_FMT",
            Self::GetFormat => "VIDIOC_G_FMT",
            Self::SetFormat => "VIDIOC_S_FMT",
            Self::RequestBuffers => "VIDIOC_REQBUFS",
            Self::QueryBuffer => "VIDIOC_QUERYBUF",
            Self::QueueBuffer => "VIDIOC_QBUF",
            Self::DequeueBuffer => "VIDIOC_DQBUF",
            Self::StreamOn => "VIDIOC_STREAMON",
            Self::StreamOff => "VIDIOC_STREAMOFF",
        }
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
