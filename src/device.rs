//! V4L2 device implementation over raw `ioctl` and `mmap`.

#![allow(unsafe_code)]

use std::io;
use std::marker::PhantomData;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr::NonNull;

use log::{debug, trace, warn};

use crate::abi::{RawBuffer, RawCapability, RawFmtDesc, RawFormat, RawRequestBuffers};
use crate::ioctl::Request;
use crate::traits::{DeviceControl, MappedRegion};

/// V4L2 device driven through a caller-owned file descriptor.
///
/// The descriptor must be open read-write. It is borrowed, never closed here,
/// and every mapping created through it is tied to the same lifetime.
pub struct V4L2Device<'fd> {
    fd: BorrowedFd<'fd>,
}

impl<'fd> V4L2Device<'fd> {
    /// Wrap an open device descriptor.
    pub const fn new(fd: BorrowedFd<'fd>) -> Self {
        Self { fd }
    }

    /// Issue `request` with `arg` as its record, retrying on `EINTR`.
    fn ioctl<T>(&self, request: Request, arg: &mut T) -> io::Result<()> {
        loop {
            trace!("{request} ({:#010x})", request.code());
            // SAFETY: `arg` is a live, exclusively borrowed record whose size
            // is encoded in the request code, and the fd outlives the call.
            let ret = unsafe {
                libc::ioctl(
                    self.fd.as_raw_fd(),
                    request.code() as _,
                    std::ptr::from_mut(arg).cast::<libc::c_void>(),
                )
            };
            if ret != -1 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl<'fd> DeviceControl for V4L2Device<'fd> {
    type Region = MmapRegion<'fd>;

    fn query_capabilities(&mut self, cap: &mut RawCapability) -> io::Result<()> {
        self.ioctl(Request::QueryCap, cap)
    }

    fn enum_format(&mut self, desc: &mut RawFmtDesc) -> io::Result<()> {
        self.ioctl(Request::EnumFormat, desc)
    }

    fn set_format(&mut self, format: &mut RawFormat) -> io::Result<()> {
        self.ioctl(Request::SetFormat, format)
    }

    fn get_format(&mut self, format: &mut RawFormat) -> io::Result<()> {
        self.ioctl(Request::GetFormat, format)
    }

    fn request_buffers(&mut self, req: &mut RawRequestBuffers) -> io::Result<()> {
        self.ioctl(Request::RequestBuffers, req)
    }

    fn query_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()> {
        self.ioctl(Request::QueryBuffer, buf)
    }

    fn queue_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()> {
        self.ioctl(Request::QueueBuffer, buf)
    }

    fn dequeue_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()> {
        self.ioctl(Request::DequeueBuffer, buf)
    }

    fn stream_on(&mut self, buf_type: u32) -> io::Result<()> {
        let mut buf_type = buf_type;
        self.ioctl(Request::StreamOn, &mut buf_type)
    }

    fn stream_off(&mut self, buf_type: u32) -> io::Result<()> {
        let mut buf_type = buf_type;
        self.ioctl(Request::StreamOff, &mut buf_type)
    }

    fn map(&mut self, offset: u32, length: u32) -> io::Result<Self::Region> {
        let len = length as usize;
        let file_offset = file_offset(offset)?;
        if len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        // SAFETY: a fresh shared mapping of device memory; the kernel picks
        // the address and validates `offset` against the fd.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd.as_raw_fd(),
                file_offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))?;
        debug!("mapped {len} bytes at offset {offset:#x} to {ptr:p}");
        Ok(MmapRegion {
            ptr,
            len,
            _fd: PhantomData,
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is a valid writable slice of `buf.len()` bytes.
            let ret = unsafe {
                libc::read(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                )
            };
            if let Ok(n) = usize::try_from(ret) {
                return Ok(n);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

#[cfg(target_pointer_width = "64")]
#[allow(clippy::unnecessary_wraps)]
fn file_offset(offset: u32) -> io::Result<libc::off_t> {
    Ok(libc::off_t::from(offset))
}

#[cfg(not(target_pointer_width = "64"))]
fn file_offset(offset: u32) -> io::Result<libc::off_t> {
    libc::off_t::try_from(offset).map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))
}

/// A device buffer mapped with `mmap`, unmapped exactly once.
///
/// Normal teardown goes through [`MappedRegion::unmap`] so failures are
/// reported; `Drop` only covers unwinding.
pub struct MmapRegion<'fd> {
    ptr: NonNull<u8>,
    len: usize,
    _fd: PhantomData<BorrowedFd<'fd>>,
}

impl MappedRegion for MmapRegion<'_> {
    fn len(&self) -> usize {
        self.len
    }

    fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn with_bytes<R, F: FnOnce(&[u8]) -> R>(&self, f: F) -> R {
        // SAFETY: the mapping is `len` bytes long and stays mapped while
        // `self` is alive.
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) };
        f(bytes)
    }

    fn unmap(self) -> io::Result<()> {
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: `ptr`/`len` come from a successful mmap and `this` is never
        // dropped, so the range is released only here.
        let ret = unsafe { libc::munmap(this.ptr.as_ptr().cast(), this.len) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for MmapRegion<'_> {
    fn drop(&mut self) {
        // SAFETY: see `unmap`; reaching here means `unmap` was not called.
        let ret = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if ret == -1 {
            warn!(
                "munmap of {:p} failed during drop: {}",
                self.ptr,
                io::Error::last_os_error()
            );
        }
    }
}
