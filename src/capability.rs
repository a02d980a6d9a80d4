//! Device capability query and validation.

use log::{debug, info, warn};

use crate::abi::{
    c_string, RawCapability, CAP_DEVICE_CAPS, CAP_READWRITE, CAP_STREAMING, CAP_VIDEO_CAPTURE,
};
use crate::error::{Error, Result};
use crate::ioctl::Request;
use crate::traits::{DeviceCapabilities, DeviceControl};

/// Issue `VIDIOC_QUERYCAP` and decode the result.
pub fn query<D: DeviceControl>(device: &mut D) -> Result<DeviceCapabilities> {
    let mut raw = RawCapability::default();
    device
        .query_capabilities(&mut raw)
        .map_err(|source| Error::request(Request::QueryCap, source))?;

    let caps = resolve(&raw);
    info!(
        "device: {} ({}) at {}, kernel {}",
        caps.card,
        caps.driver,
        caps.bus_info,
        version_string(caps.version)
    );
    debug!(
        "capabilities {:#010x}, device_caps {:#010x}, effective {:#010x} [{}]",
        caps.capabilities,
        caps.device_caps,
        caps.effective,
        names(caps.effective).join(" ")
    );
    Ok(caps)
}

/// Decode a raw capability record.
///
/// When the aggregate mask carries `V4L2_CAP_DEVICE_CAPS` the per-node mask
/// is authoritative, otherwise the aggregate mask is.
pub fn resolve(raw: &RawCapability) -> DeviceCapabilities {
    let effective = if raw.capabilities & CAP_DEVICE_CAPS == 0 {
        raw.capabilities
    } else {
        raw.device_caps
    };

    DeviceCapabilities {
        driver: c_string(&raw.driver),
        card: c_string(&raw.card),
        bus_info: c_string(&raw.bus_info),
        version: raw.version,
        capabilities: raw.capabilities,
        device_caps: raw.device_caps,
        effective,
        can_capture: effective & CAP_VIDEO_CAPTURE != 0,
        can_stream: effective & CAP_STREAMING != 0,
        can_read_write: effective & CAP_READWRITE != 0,
    }
}

/// Check the bits a capture depends on.
///
/// Video capture is always required, read-write only when asked for. A
/// missing streaming bit is only logged: some drivers under-report it.
pub fn validate(caps: &DeviceCapabilities, require_read_write: bool) -> Result<()> {
    if !caps.can_capture {
        return Err(Error::DeviceCapability {
            missing: "V4L2_CAP_VIDEO_CAPTURE",
            bit: CAP_VIDEO_CAPTURE,
        });
    }
    if require_read_write && !caps.can_read_write {
        return Err(Error::DeviceCapability {
            missing: "V4L2_CAP_READWRITE",
            bit: CAP_READWRITE,
        });
    }
    if !caps.can_stream {
        warn!("device does not report V4L2_CAP_STREAMING");
    }
    Ok(())
}

const NAMES: [(u32, &str); 4] = [
    (CAP_VIDEO_CAPTURE, "VIDEO_CAPTURE"),
    (CAP_READWRITE, "READWRITE"),
    (CAP_STREAMING, "STREAMING"),
    (CAP_DEVICE_CAPS, "DEVICE_CAPS"),
];

/// Names of the capability bits set in `mask` that a capture cares about.
pub fn names(mask: u32) -> Vec<&'static str> {
    NAMES
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|&(_, name)| name)
        .collect()
}

/// `KERNEL_VERSION` triple as `major.minor.patch`.
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}
