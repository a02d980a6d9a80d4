//! Mapped-memory buffer pool.

use log::{debug, warn};

use crate::abi::{Locator, RawBuffer, RawRequestBuffers};
use crate::error::{CaptureFailure, CaptureState, Error, Result};
use crate::ioctl::Request;
use crate::traits::{DeviceControl, MappedRegion};

/// Fewest buffers that still let the device fill one while another is held.
pub const MIN_BUFFERS: u32 = 2;

/// One kernel buffer mapped into the process.
pub struct MappedBuffer<M> {
    index: u32,
    length: u32,
    offset: u32,
    region: M,
}

impl<M: MappedRegion> MappedBuffer<M> {
    /// Index of the buffer in the driver's queue.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Length reported by `VIDIOC_QUERYBUF`.
    pub const fn length(&self) -> u32 {
        self.length
    }

    /// Offset the buffer was mapped from.
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Start of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.region.as_ptr()
    }

    pub(crate) const fn region(&self) -> &M {
        &self.region
    }
}

/// The fixed set of buffers negotiated with the driver.
///
/// The pool owns every mapping. Mappings leave the pool only through
/// [`BufferPool::release`], which consumes it.
pub struct BufferPool<M: MappedRegion> {
    buffers: Vec<MappedBuffer<M>>,
}

impl<M: MappedRegion> BufferPool<M> {
    /// Request `count` mapped-memory buffers and map every one of them.
    ///
    /// Either the whole pool is returned or nothing stays mapped: if buffer
    /// `k` fails, buffers `0..k` are unmapped before the error is returned
    /// and any unmap failures are carried in [`CaptureFailure::cleanup`].
    pub fn allocate<D>(device: &mut D, count: u32) -> std::result::Result<Self, CaptureFailure>
    where
        D: DeviceControl<Region = M>,
    {
        let granted = request_buffers(device, count)?;

        let mut buffers = Vec::with_capacity(granted.min(count) as usize);
        for index in 0..granted {
            match map_buffer(device, index) {
                Ok(buffer) => buffers.push(buffer),
                Err(error) => {
                    let cleanup = Self { buffers }.release();
                    return Err(CaptureFailure {
                        error,
                        state: CaptureState::Created,
                        cleanup,
                    });
                }
            }
        }

        debug!("mapped {granted} buffers");
        Ok(Self { buffers })
    }

    /// Number of buffers.
    pub const fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no buffers. Never true for an allocated pool.
    pub const fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Buffer `index`, if it is inside the pool.
    pub fn get(&self, index: u32) -> Option<&MappedBuffer<M>> {
        self.buffers.get(index as usize)
    }

    /// Buffers in index order.
    pub fn iter(&self) -> impl Iterator<Item = &MappedBuffer<M>> {
        self.buffers.iter()
    }

    /// Unmap every buffer. Each unmap is attempted regardless of the others;
    /// failures are returned in index order.
    pub fn release(self) -> Vec<Error> {
        let mut errors = Vec::new();
        for buffer in self.buffers {
            let index = buffer.index;
            if let Err(source) = buffer.region.unmap() {
                warn!("munmap of buffer {index} failed: {source}");
                errors.push(Error::Unmapping { index, source });
            }
        }
        errors
    }
}

fn request_buffers<D: DeviceControl>(device: &mut D, count: u32) -> Result<u32> {
    let mut req = RawRequestBuffers::mmap_capture(count);
    device
        .request_buffers(&mut req)
        .map_err(|source| Error::request(Request::RequestBuffers, source))?;

    debug!("{}: requested {count}, granted {}", Request::RequestBuffers, req.count);
    if req.count < MIN_BUFFERS {
        return Err(Error::InsufficientBuffers {
            requested: count,
            granted: req.count,
        });
    }
    Ok(req.count)
}

fn map_buffer<D: DeviceControl>(device: &mut D, index: u32) -> Result<MappedBuffer<D::Region>> {
    let mut buf = RawBuffer::mmap_capture(index);
    device
        .query_buffer(&mut buf)
        .map_err(|source| Error::Request {
            request: Request::QueryBuffer,
            index: Some(index),
            source,
        })?;

    let Locator::Offset(offset) = buf.locator() else {
        return Err(Error::Mapping {
            index,
            source: std::io::Error::from_raw_os_error(libc::EINVAL),
        });
    };
    let length = buf.length;

    let region = device
        .map(offset, length)
        .map_err(|source| Error::Mapping { index, source })?;
    debug!("buffer {index}: length {length}, offset {offset:#x}");

    Ok(MappedBuffer {
        index,
        length,
        offset,
        region,
    })
}
