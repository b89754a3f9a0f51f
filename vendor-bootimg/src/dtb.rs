use crate::header::VendorBootHeader;
use std::ops::Range;

/// Offset of the device-tree blob inside an image of `total_len` bytes.
///
/// The blob is taken to follow the header, the bootconfig region and the
/// concatenated ramdisks back to back, without page padding. When that would
/// run past the end of the buffer the blob is assumed to be the last
/// `dtb_size` bytes instead.
// FIXME: page-aligned layouts only land right through the clamp; needs
// checking against more device dumps before switching to aligned offsets.
// `VendorBootImage::ramdisk_region_offset` starts the ramdisks at the same
// unpadded position and has to move with it.
pub fn locate_dtb(header: &VendorBootHeader, total_len: usize) -> usize {
    let dtb_size = u64::from(header.dtb_size);
    let primary = u64::from(header.header_size)
        + u64::from(header.vendor_bootconfig_size)
        + u64::from(header.vendor_ramdisk_total_size);
    if primary + dtb_size > total_len as u64 {
        total_len.saturating_sub(header.dtb_size as usize)
    } else {
        primary as usize
    }
}

/// Byte range of the blob, or `None` when the header declares no blob or
/// the buffer is smaller than the blob itself.
pub fn dtb_range(header: &VendorBootHeader, total_len: usize) -> Option<Range<usize>> {
    let dtb_size = header.dtb_size as usize;
    if dtb_size == 0 || dtb_size > total_len {
        return None;
    }
    let start = locate_dtb(header, total_len);
    Some(start..start + dtb_size)
}
