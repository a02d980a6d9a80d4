//! Capture format negotiation.

use log::{debug, info, warn};

use crate::abi::{
    c_string, RawFmtDesc, RawFormat, RawPixFormat, BUF_TYPE_VIDEO_CAPTURE, FMT_FLAG_COMPRESSED,
    FMT_FLAG_EMULATED,
};
use crate::error::{Error, Result};
use crate::ioctl::Request;
use crate::traits::{DeviceControl, FieldOrder, Format, FormatDescription, FourCC};

/// What to accept once the driver has adjusted a requested format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatPolicy {
    /// Accept anything with a non-zero image size.
    #[default]
    Lenient,
    /// Also require the requested pixel format and geometry.
    Strict,
}

impl From<RawPixFormat> for Format {
    fn from(pix: RawPixFormat) -> Self {
        Self {
            width: pix.width,
            height: pix.height,
            fourcc: FourCC::from_code(pix.pixelformat),
            field: FieldOrder::from_code(pix.field),
            stride: pix.bytesperline,
            size: pix.sizeimage,
            colorspace: pix.colorspace,
            ycbcr_enc: pix.ycbcr_enc,
            quantization: pix.quantization,
            xfer_func: pix.xfer_func,
            flags: pix.flags,
        }
    }
}

fn request_record(format: &Format) -> RawFormat {
    RawFormat::capture(RawPixFormat {
        width: format.width,
        height: format.height,
        pixelformat: format.fourcc.code(),
        field: format.field.code(),
        ..RawPixFormat::default()
    })
}

/// Read the format currently applied to the capture queue.
pub fn current_format<D: DeviceControl>(device: &mut D) -> Result<Format> {
    let mut raw = RawFormat::new(BUF_TYPE_VIDEO_CAPTURE);
    device
        .get_format(&mut raw)
        .map_err(|source| Error::request(Request::GetFormat, source))?;
    let pix = raw.pix().ok_or_else(|| Error::FormatNegotiation {
        reason: format!("driver returned buffer type {}", raw.type_),
    })?;
    Ok(pix.into())
}

/// Apply `requested` with `VIDIOC_S_FMT`, then read back what the driver
/// actually chose with `VIDIOC_G_FMT`.
///
/// The driver may clamp or substitute any field, so only the read-back
/// values are returned.
pub fn negotiate<D: DeviceControl>(
    device: &mut D,
    requested: &Format,
    policy: FormatPolicy,
) -> Result<Format> {
    let mut raw = request_record(requested);
    device
        .set_format(&mut raw)
        .map_err(|source| Error::request(Request::SetFormat, source))?;
    debug!(
        "{} accepted {}x{} {}",
        Request::SetFormat,
        requested.width,
        requested.height,
        requested.fourcc
    );

    let actual = current_format(device)?;
    info!(
        "format: {}x{} {} stride {} size {}",
        actual.width, actual.height, actual.fourcc, actual.stride, actual.size
    );

    if actual.size == 0 {
        return Err(Error::FormatNegotiation {
            reason: "driver reported an image size of 0".to_owned(),
        });
    }

    let adjusted = actual.fourcc != requested.fourcc
        || actual.width != requested.width
        || actual.height != requested.height;
    if adjusted {
        warn!(
            "driver adjusted format: requested {}x{} {}, got {}x{} {}",
            requested.width,
            requested.height,
            requested.fourcc,
            actual.width,
            actual.height,
            actual.fourcc
        );
        if policy == FormatPolicy::Strict {
            return Err(Error::FormatNegotiation {
                reason: format!(
                    "requested {}x{} {}, driver chose {}x{} {}",
                    requested.width,
                    requested.height,
                    requested.fourcc,
                    actual.width,
                    actual.height,
                    actual.fourcc
                ),
            });
        }
    }

    Ok(actual)
}

/// List the pixel formats the capture queue offers.
///
/// Walks `VIDIOC_ENUM_FMT` from index 0 until the driver answers `EINVAL`.
pub fn enumerate_formats<D: DeviceControl>(device: &mut D) -> Result<Vec<FormatDescription>> {
    let mut formats = Vec::new();
    for index in 0.. {
        let mut desc = RawFmtDesc {
            index,
            type_: BUF_TYPE_VIDEO_CAPTURE,
            ..RawFmtDesc::default()
        };
        match device.enum_format(&mut desc) {
            Ok(()) => formats.push(FormatDescription {
                index,
                fourcc: FourCC::from_code(desc.pixelformat),
                description: c_string(&desc.description),
                compressed: desc.flags & FMT_FLAG_COMPRESSED != 0,
                emulated: desc.flags & FMT_FLAG_EMULATED != 0,
            }),
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => break,
            Err(source) => {
                return Err(Error::Request {
                    request: Request::EnumFormat,
                    index: Some(index),
                    source,
                });
            }
        }
    }
    Ok(formats)
}
