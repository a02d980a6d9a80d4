//! End-to-end capture of one frame.

use log::info;

use crate::abi;
use crate::capability;
use crate::config::{CaptureConfig, CaptureMode};
use crate::error::{CaptureFailure, CaptureState};
use crate::format;
use crate::stream;
use crate::traits::{DeviceControl, Frame};

/// Capture a single frame from `device` as described by `config`.
///
/// Checks the record layout, queries and validates capabilities, negotiates
/// the format, then takes one frame through the configured transfer method.
/// Nothing touches device memory before negotiation succeeds.
pub fn capture_frame<D: DeviceControl>(
    device: &mut D,
    config: &CaptureConfig,
) -> Result<Frame, CaptureFailure> {
    abi::verify_layout()?;

    let caps = capability::query(device)?;
    capability::validate(&caps, config.needs_read_write())?;

    let format = format::negotiate(device, &config.format, config.policy)?;

    let frame = match config.mode {
        CaptureMode::Mmap => stream::capture_one(device, &format, config.buffer_count)?,
        CaptureMode::ReadWrite => {
            stream::read_frame(device, &format).map_err(|error| CaptureFailure {
                error,
                state: CaptureState::Created,
                cleanup: Vec::new(),
            })?
        }
    };

    info!(
        "captured {} bytes from buffer {} (sequence {})",
        frame.data.len(),
        frame.metadata.index,
        frame.metadata.sequence
    );
    Ok(frame)
}
