//! Copy-out of a dequeued frame.

use crate::error::{Error, Result};
use crate::pool::MappedBuffer;
use crate::traits::MappedRegion;

/// Copy the first `bytes_used` bytes of `buffer` into an owned vector.
///
/// `bytes_used` comes from the driver and is checked before the mapping is
/// read: zero, or anything past the mapped length, is a corrupted buffer.
pub fn extract<M: MappedRegion>(buffer: &MappedBuffer<M>, bytes_used: u32) -> Result<Vec<u8>> {
    let index = buffer.index();
    if bytes_used == 0 {
        return Err(Error::CorruptedBuffer {
            index,
            reason: "driver reported zero bytes used".to_owned(),
        });
    }
    let used = bytes_used as usize;
    let mapped = buffer.region().len();
    if bytes_used > buffer.length() || used > mapped {
        return Err(Error::CorruptedBuffer {
            index,
            reason: format!(
                "bytesused {bytes_used} exceeds buffer length {}",
                buffer.length().min(u32::try_from(mapped).unwrap_or(u32::MAX))
            ),
        });
    }

    buffer.region().with_bytes(|bytes| {
        bytes
            .get(..used)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::CorruptedBuffer {
                index,
                reason: format!("mapping shorter than {used} bytes"),
            })
    })
}
