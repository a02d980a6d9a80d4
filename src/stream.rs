//! Single-frame streaming capture.
//!
//! One capture walks the buffer pool through
//! `BuffersAllocated -> Queued -> Streaming -> Dequeued -> Stopped`:
//! queue every buffer, start streaming, take exactly one filled buffer back,
//! copy it out, then stop streaming and unmap. Stream-off and unmap run on
//! every path once the pool exists; the first error is kept and later ones
//! are attached to it.

use std::time::Duration;

use log::{debug, warn};

use crate::abi::{RawBuffer, BUF_TYPE_VIDEO_CAPTURE};
use crate::error::{CaptureFailure, CaptureState, Error, Result};
use crate::frame;
use crate::ioctl::Request;
use crate::pool::BufferPool;
use crate::traits::{DeviceControl, Format, Frame, FrameMetadata};

struct Session {
    state: CaptureState,
    reached: CaptureState,
    stream_off_pending: bool,
}

impl Session {
    const fn new() -> Self {
        Self {
            state: CaptureState::Created,
            reached: CaptureState::Created,
            stream_off_pending: false,
        }
    }

    fn advance(&mut self, next: CaptureState) {
        debug!("capture state {:?} -> {next:?}", self.state);
        self.state = next;
        self.reached = next;
    }

    fn fail(&mut self, error: &Error) {
        debug!("capture state {:?} -> Failed: {error}", self.state);
        self.state = CaptureState::Failed;
    }

    fn run<D: DeviceControl>(
        &mut self,
        device: &mut D,
        pool: &BufferPool<D::Region>,
        format: &Format,
    ) -> Result<Frame> {
        for buffer in pool.iter() {
            let index = buffer.index();
            let mut buf = RawBuffer::mmap_capture(index);
            self.stream_off_pending = true;
            device
                .queue_buffer(&mut buf)
                .map_err(|source| Error::queue(Request::QueueBuffer, Some(index), source))?;
        }
        self.advance(CaptureState::Queued);

        device
            .stream_on(BUF_TYPE_VIDEO_CAPTURE)
            .map_err(|source| Error::queue(Request::StreamOn, None, source))?;
        self.advance(CaptureState::Streaming);

        let mut buf = RawBuffer::mmap_capture(0);
        device
            .dequeue_buffer(&mut buf)
            .map_err(|source| Error::queue(Request::DequeueBuffer, None, source))?;
        self.advance(CaptureState::Dequeued);
        debug!(
            "dequeued buffer {}: {} bytes, sequence {}",
            buf.index, buf.bytesused, buf.sequence
        );

        let buffer = pool.get(buf.index).ok_or_else(|| Error::CorruptedBuffer {
            index: buf.index,
            reason: format!("index outside pool of {} buffers", pool.len()),
        })?;
        let data = frame::extract(buffer, buf.bytesused)?;

        Ok(Frame {
            data,
            metadata: FrameMetadata {
                index: buf.index,
                sequence: buf.sequence,
                timestamp: buf.timestamp(),
                bytes_used: buf.bytesused,
                flags: buf.flags,
            },
            format: format.clone(),
        })
    }

    fn stop<D: DeviceControl>(&mut self, device: &mut D, succeeded: bool) -> Option<Error> {
        if !self.stream_off_pending {
            return None;
        }
        self.stream_off_pending = false;
        match device.stream_off(BUF_TYPE_VIDEO_CAPTURE) {
            Ok(()) => {
                if succeeded {
                    self.advance(CaptureState::Stopped);
                }
                None
            }
            Err(source) => {
                warn!("{} failed: {source}", Request::StreamOff);
                Some(Error::queue(Request::StreamOff, None, source))
            }
        }
    }
}

/// Capture one frame with memory-mapped streaming I/O.
///
/// `format` must be the format the driver reported after negotiation; it is
/// attached to the returned frame as-is.
pub fn capture_one<D: DeviceControl>(
    device: &mut D,
    format: &Format,
    buffer_count: u32,
) -> std::result::Result<Frame, CaptureFailure> {
    let pool = BufferPool::allocate(device, buffer_count)?;
    let mut session = Session::new();
    session.advance(CaptureState::BuffersAllocated);

    let outcome = session.run(device, &pool, format);
    if let Err(error) = &outcome {
        session.fail(error);
    }

    let mut cleanup = Vec::new();
    cleanup.extend(session.stop(device, outcome.is_ok()));
    cleanup.extend(pool.release());

    let state = session.reached;
    let mut cleanup = cleanup.into_iter();
    match outcome {
        Err(error) => Err(CaptureFailure {
            error,
            state,
            cleanup: cleanup.collect(),
        }),
        Ok(frame) => cleanup.next().map_or(Ok(frame), |error| {
            Err(CaptureFailure {
                error,
                state,
                cleanup: cleanup.collect(),
            })
        }),
    }
}

/// Capture one frame with a single blocking `read()`.
///
/// Reads at most `format.size` bytes and returns what the driver delivered.
pub fn read_frame<D: DeviceControl>(device: &mut D, format: &Format) -> Result<Frame> {
    let mut data = vec![0; format.size as usize];
    let read = device.read(&mut data).map_err(Error::Read)?;
    if read == 0 {
        return Err(Error::CorruptedBuffer {
            index: 0,
            reason: "read() returned no data".to_owned(),
        });
    }
    data.truncate(read);
    debug!("read {read} of {} bytes", format.size);

    Ok(Frame {
        metadata: FrameMetadata {
            index: 0,
            sequence: 0,
            timestamp: Duration::ZERO,
            bytes_used: u32::try_from(read).unwrap_or(u32::MAX),
            flags: 0,
        },
        data,
        format: format.clone(),
    })
}
