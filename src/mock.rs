//! Simulated device for testing without hardware.
//!
//! Behaves like a well-mannered capture driver by default and can be told to
//! adjust formats, grant fewer buffers, fail individual requests, or return
//! corrupted descriptors.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::abi::{
    RawBuffer, RawCapability, RawFmtDesc, RawFormat, RawPixFormat, RawRequestBuffers,
    BUF_FLAG_DONE, BUF_TYPE_VIDEO_CAPTURE, CAP_DEVICE_CAPS, CAP_READWRITE, CAP_STREAMING,
    CAP_VIDEO_CAPTURE, FIELD_NONE, FMT_FLAG_COMPRESSED, MEMORY_MMAP, MEMORY_USERPTR,
};
use crate::traits::{DeviceControl, FourCC, MappedRegion};

/// Page granularity used to lay out simulated buffer offsets.
const PAGE: u32 = 4096;

fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

fn eio() -> io::Error {
    io::Error::from_raw_os_error(libc::EIO)
}

/// Counters shared between the device and its regions.
#[derive(Debug, Default, Clone)]
pub struct MockStats {
    /// Successful `map` calls.
    pub maps: usize,
    /// Successful `unmap` calls.
    pub unmaps: usize,
    /// Failed `unmap` calls.
    pub failed_unmaps: usize,
    /// `VIDIOC_QBUF` calls, by index, including failed ones.
    pub queued: Vec<u32>,
    /// `VIDIOC_STREAMON` calls.
    pub stream_on: usize,
    /// `VIDIOC_STREAMOFF` calls.
    pub stream_off: usize,
    /// `VIDIOC_DQBUF` calls.
    pub dequeues: usize,
    /// `VIDIOC_S_FMT` calls.
    pub set_format: usize,
    /// `VIDIOC_G_FMT` calls.
    pub get_format: usize,
    /// `read()` calls.
    pub reads: usize,
}

/// Injected failures.
#[derive(Debug, Default, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct Faults {
    /// `VIDIOC_QUERYCAP` fails.
    pub query_cap: bool,
    /// `VIDIOC_S_FMT` fails.
    pub set_format: bool,
    /// `VIDIOC_ENUM_FMT` fails with `EIO` at this index.
    pub enum_format_at: Option<u32>,
    /// `VIDIOC_QUERYBUF` fails for this index.
    pub query_buffer_at: Option<u32>,
    /// `VIDIOC_QUERYBUF` reports user-pointer memory for this index.
    pub user_pointer_at: Option<u32>,
    /// `map` fails for this index.
    pub map_at: Option<u32>,
    /// `unmap` fails for this index.
    pub unmap_at: Option<u32>,
    /// `VIDIOC_QBUF` fails for this index.
    pub queue_at: Option<u32>,
    /// `VIDIOC_STREAMON` fails.
    pub stream_on: bool,
    /// `VIDIOC_STREAMOFF` fails.
    pub stream_off: bool,
    /// `VIDIOC_DQBUF` fails.
    pub dequeue: bool,
    /// `read()` fails.
    pub read: bool,
}

/// How the simulated driver adjusts a requested format.
#[derive(Debug, Clone, Default)]
pub struct Adjustments {
    /// Clamp geometry to this maximum.
    pub max_size: Option<(u32, u32)>,
    /// Replace any requested pixel format with this one.
    pub fourcc: Option<FourCC>,
    /// Report a zero image size.
    pub zero_size: bool,
    /// `VIDIOC_S_FMT` echoes the request untouched; only `VIDIOC_G_FMT`
    /// reports what the driver really applied.
    pub stale_set_format: bool,
}

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: RawCapability,
    formats: Vec<(FourCC, &'static str, u32)>,
    format: RawPixFormat,
    adjust: Adjustments,
    grant: Option<u32>,
    buffer_length: Option<u32>,
    payload: Vec<u8>,
    descriptor_override: Option<(u32, u32)>,
    faults: Faults,
    buffers: Vec<Rc<RefCell<Vec<u8>>>>,
    queue: VecDeque<u32>,
    streaming: bool,
    sequence: u32,
    stats: Rc<RefCell<MockStats>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn fixed<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [0u8; N];
    for (dst, src) in out.iter_mut().take(N - 1).zip(text.bytes()) {
        *dst = src;
    }
    out
}

fn yuyv(width: u32, height: u32) -> RawPixFormat {
    RawPixFormat {
        width,
        height,
        pixelformat: FourCC::YUYV.code(),
        field: FIELD_NONE,
        bytesperline: width * 2,
        sizeimage: width * 2 * height,
        ..RawPixFormat::default()
    }
}

impl MockDevice {
    /// Create a new mock device: 640x480 YUYV, capture + streaming +
    /// read-write, reported through device caps.
    #[must_use]
    pub fn new() -> Self {
        let format = yuyv(640, 480);
        Self {
            capabilities: RawCapability {
                driver: fixed("mock"),
                card: fixed("Mock Camera"),
                bus_info: fixed("platform:mock-0"),
                version: (6 << 16) | (1 << 8) | 2,
                capabilities: CAP_DEVICE_CAPS
                    | CAP_VIDEO_CAPTURE
                    | CAP_STREAMING
                    | CAP_READWRITE,
                device_caps: CAP_VIDEO_CAPTURE | CAP_STREAMING | CAP_READWRITE,
                reserved: [0; 3],
            },
            formats: vec![
                (FourCC::YUYV, "YUYV 4:2:2", 0),
                (FourCC::MJPG, "Motion-JPEG", FMT_FLAG_COMPRESSED),
            ],
            payload: ramp(format.sizeimage as usize),
            format,
            adjust: Adjustments::default(),
            grant: None,
            buffer_length: None,
            descriptor_override: None,
            faults: Faults::default(),
            buffers: Vec::new(),
            queue: VecDeque::new(),
            streaming: false,
            sequence: 0,
            stats: Rc::new(RefCell::new(MockStats::default())),
        }
    }

    /// Set the raw capability masks.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: u32, device_caps: u32) -> Self {
        self.capabilities.capabilities = capabilities;
        self.capabilities.device_caps = device_caps;
        self
    }

    /// Set how the driver adjusts requested formats.
    #[must_use]
    pub fn with_adjustments(mut self, adjust: Adjustments) -> Self {
        self.adjust = adjust;
        self
    }

    /// Grant this many buffers regardless of the request.
    #[must_use]
    pub const fn with_granted_buffers(mut self, count: u32) -> Self {
        self.grant = Some(count);
        self
    }

    /// Make every buffer this long instead of the image size.
    #[must_use]
    pub const fn with_buffer_length(mut self, length: u32) -> Self {
        self.buffer_length = Some(length);
        self
    }

    /// Bytes the device "writes" into the next dequeued buffer.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Report this `(index, bytesused)` from `VIDIOC_DQBUF`.
    #[must_use]
    pub const fn with_descriptor(mut self, index: u32, bytes_used: u32) -> Self {
        self.descriptor_override = Some((index, bytes_used));
        self
    }

    /// Inject request failures.
    #[must_use]
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> MockStats {
        self.stats.borrow().clone()
    }

    fn apply(&self, requested: RawPixFormat) -> RawPixFormat {
        let (mut width, mut height) = (requested.width, requested.height);
        if let Some((max_w, max_h)) = self.adjust.max_size {
            width = width.min(max_w);
            height = height.min(max_h);
        }
        let mut pix = yuyv(width, height);
        pix.pixelformat = self
            .adjust
            .fourcc
            .map_or(requested.pixelformat, FourCC::code);
        if self.adjust.zero_size {
            pix.sizeimage = 0;
        }
        pix
    }
}

fn copy_payload(payload: &[u8], dst: &mut [u8]) -> usize {
    let n = payload.len().min(dst.len());
    for (d, s) in dst.iter_mut().zip(payload) {
        *d = *s;
    }
    n
}

/// Deterministic non-constant test payload.
pub fn ramp(len: usize) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    (0..len).map(|i| (i % 251) as u8).collect()
}

impl DeviceControl for MockDevice {
    type Region = MockRegion;

    fn query_capabilities(&mut self, cap: &mut RawCapability) -> io::Result<()> {
        if self.faults.query_cap {
            return Err(io::Error::from_raw_os_error(libc::ENOTTY));
        }
        *cap = self.capabilities;
        Ok(())
    }

    fn enum_format(&mut self, desc: &mut RawFmtDesc) -> io::Result<()> {
        if desc.type_ != BUF_TYPE_VIDEO_CAPTURE {
            return Err(einval());
        }
        if self.faults.enum_format_at == Some(desc.index) {
            return Err(eio());
        }
        let (fourcc, name, flags) = self
            .formats
            .get(desc.index as usize)
            .copied()
            .ok_or_else(einval)?;
        desc.pixelformat = fourcc.code();
        desc.flags = flags;
        desc.description = fixed(name);
        Ok(())
    }

    fn set_format(&mut self, format: &mut RawFormat) -> io::Result<()> {
        self.stats.borrow_mut().set_format += 1;
        if self.faults.set_format || self.streaming {
            return Err(einval());
        }
        let requested = format.pix().ok_or_else(einval)?;
        self.format = self.apply(requested);
        if !self.adjust.stale_set_format {
            format.set_pix(self.format);
        }
        Ok(())
    }

    fn get_format(&mut self, format: &mut RawFormat) -> io::Result<()> {
        self.stats.borrow_mut().get_format += 1;
        if format.type_ != BUF_TYPE_VIDEO_CAPTURE {
            return Err(einval());
        }
        format.set_pix(self.format);
        Ok(())
    }

    fn request_buffers(&mut self, req: &mut RawRequestBuffers) -> io::Result<()> {
        if req.type_ != BUF_TYPE_VIDEO_CAPTURE || req.memory != MEMORY_MMAP {
            return Err(einval());
        }
        let count = self.grant.unwrap_or(req.count);
        let length = self.buffer_length.unwrap_or(self.format.sizeimage);
        self.buffers = (0..count)
            .map(|_| Rc::new(RefCell::new(vec![0; length as usize])))
            .collect();
        self.queue.clear();
        req.count = count;
        Ok(())
    }

    fn query_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()> {
        if self.faults.query_buffer_at == Some(buf.index) {
            return Err(eio());
        }
        let storage = self.buffers.get(buf.index as usize).ok_or_else(einval)?;
        #[allow(clippy::cast_possible_truncation)]
        let length = storage.borrow().len() as u32;
        let stride = length.div_ceil(PAGE) * PAGE;
        buf.length = length;
        buf.memory = MEMORY_MMAP;
        buf.set_offset(buf.index * stride);
        if self.faults.user_pointer_at == Some(buf.index) {
            buf.memory = MEMORY_USERPTR;
        }
        Ok(())
    }

    fn queue_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()> {
        self.stats.borrow_mut().queued.push(buf.index);
        if self.faults.queue_at == Some(buf.index) {
            return Err(einval());
        }
        if buf.index as usize >= self.buffers.len() {
            return Err(einval());
        }
        self.queue.push_back(buf.index);
        Ok(())
    }

    fn dequeue_buffer(&mut self, buf: &mut RawBuffer) -> io::Result<()> {
        self.stats.borrow_mut().dequeues += 1;
        if self.faults.dequeue {
            return Err(eio());
        }
        if !self.streaming {
            return Err(einval());
        }
        let index = self.queue.pop_front().ok_or_else(einval)?;
        let storage = self.buffers.get(index as usize).ok_or_else(einval)?;
        let written = {
            let mut bytes = storage.borrow_mut();
            copy_payload(&self.payload, &mut bytes)
        };
        #[allow(clippy::cast_possible_truncation)]
        let (index, bytes_used) = self
            .descriptor_override
            .unwrap_or((index, written as u32));
        buf.index = index;
        buf.bytesused = bytes_used;
        buf.flags = BUF_FLAG_DONE;
        buf.field = FIELD_NONE;
        buf.sequence = self.sequence;
        let ts = Duration::from_millis(u64::from(self.sequence) * 33);
        buf.timestamp.tv_sec = ts.as_secs().try_into().unwrap_or_default();
        buf.timestamp.tv_usec = ts.subsec_micros().try_into().unwrap_or_default();
        self.sequence += 1;
        Ok(())
    }

    fn stream_on(&mut self, buf_type: u32) -> io::Result<()> {
        self.stats.borrow_mut().stream_on += 1;
        if self.faults.stream_on || buf_type != BUF_TYPE_VIDEO_CAPTURE {
            return Err(eio());
        }
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self, buf_type: u32) -> io::Result<()> {
        self.stats.borrow_mut().stream_off += 1;
        if buf_type != BUF_TYPE_VIDEO_CAPTURE {
            return Err(einval());
        }
        self.streaming = false;
        self.queue.clear();
        if self.faults.stream_off {
            return Err(eio());
        }
        Ok(())
    }

    fn map(&mut self, offset: u32, length: u32) -> io::Result<Self::Region> {
        let storage = self
            .buffers
            .iter()
            .enumerate()
            .find(|(index, storage)| {
                let len = storage.borrow().len();
                #[allow(clippy::cast_possible_truncation)]
                let stride = (len as u32).div_ceil(PAGE) * PAGE;
                *index as u32 * stride == offset && len == length as usize
            })
            .map(|(index, storage)| (index, Rc::clone(storage)));
        let (index, bytes) = storage.ok_or_else(einval)?;
        #[allow(clippy::cast_possible_truncation)]
        let index = index as u32;
        if self.faults.map_at == Some(index) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        self.stats.borrow_mut().maps += 1;
        Ok(MockRegion {
            index,
            bytes,
            fail_unmap: self.faults.unmap_at == Some(index),
            stats: Rc::clone(&self.stats),
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stats.borrow_mut().reads += 1;
        if self.faults.read {
            return Err(eio());
        }
        Ok(copy_payload(&self.payload, buf))
    }
}

/// Region handed out by [`MockDevice::map`].
pub struct MockRegion {
    index: u32,
    bytes: Rc<RefCell<Vec<u8>>>,
    fail_unmap: bool,
    stats: Rc<RefCell<MockStats>>,
}

impl MockRegion {
    /// Buffer index this region maps.
    pub const fn index(&self) -> u32 {
        self.index
    }
}

impl MappedRegion for MockRegion {
    fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    fn as_ptr(&self) -> *const u8 {
        self.bytes.borrow().as_ptr()
    }

    fn with_bytes<R, F: FnOnce(&[u8]) -> R>(&self, f: F) -> R {
        f(&self.bytes.borrow())
    }

    fn unmap(self) -> io::Result<()> {
        if self.fail_unmap {
            self.stats.borrow_mut().failed_unmaps += 1;
            return Err(einval());
        }
        self.stats.borrow_mut().unmaps += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let mut device = MockDevice::new();
        let mut cap = RawCapability::default();
        device
            .query_capabilities(&mut cap)
            .expect("query_capabilities should succeed");
        assert_eq!(crate::abi::c_string(&cap.driver), "mock");
        assert_ne!(cap.device_caps & CAP_VIDEO_CAPTURE, 0);
    }

    #[test]
    fn test_mock_format_adjustment() {
        let mut device = MockDevice::new().with_adjustments(Adjustments {
            max_size: Some((320, 240)),
            ..Adjustments::default()
        });
        let mut format = RawFormat::capture(yuyv(1280, 720));
        device.set_format(&mut format).expect("set_format should succeed");
        let pix = format.pix().expect("capture format");
        assert_eq!((pix.width, pix.height), (320, 240));
        assert_eq!(pix.sizeimage, 320 * 240 * 2);
    }

    #[test]
    fn test_mock_buffers_have_distinct_offsets() {
        let mut device = MockDevice::new();
        let mut req = RawRequestBuffers::mmap_capture(3);
        device.request_buffers(&mut req).expect("reqbufs");

        let mut offsets = Vec::new();
        for index in 0..req.count {
            let mut buf = RawBuffer::mmap_capture(index);
            device.query_buffer(&mut buf).expect("querybuf");
            offsets.push(buf.offset().expect("mmap offset"));
        }
        offsets.dedup();
        assert_eq!(offsets.len(), 3);
    }

    #[test]
    fn test_mock_dequeue_requires_streaming() {
        let mut device = MockDevice::new();
        let mut req = RawRequestBuffers::mmap_capture(2);
        device.request_buffers(&mut req).expect("reqbufs");
        let mut buf = RawBuffer::mmap_capture(0);
        device.queue_buffer(&mut buf).expect("qbuf");

        let mut out = RawBuffer::mmap_capture(0);
        assert!(device.dequeue_buffer(&mut out).is_err());

        device.stream_on(BUF_TYPE_VIDEO_CAPTURE).expect("streamon");
        device.dequeue_buffer(&mut out).expect("dqbuf");
        assert_eq!(out.index, 0);
        assert_eq!(out.bytesused, 640 * 480 * 2);
    }

    #[test]
    fn test_ramp_is_not_constant() {
        let data = ramp(600);
        assert_eq!(data.first(), Some(&0));
        assert_eq!(data.get(250), Some(&250));
        assert_eq!(data.get(251), Some(&0));
    }
}
