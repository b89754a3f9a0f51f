use crate::dtb::dtb_range;
use crate::error::{Error, Result};
use crate::header::VendorBootHeader;
use crate::table::{RamdiskTableEntry, decode_ramdisk_table, select_recovery};

/// A parsed vendor_boot image borrowing the buffer it was read from.
pub struct VendorBootImage<'a> {
    data: &'a [u8],
    header: VendorBootHeader,
    entries: Vec<RamdiskTableEntry>,
}

impl<'a> VendorBootImage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = VendorBootHeader::parse(data)?;
        let entries = decode_ramdisk_table(&header, data)?;
        Ok(Self {
            data,
            header,
            entries,
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn header(&self) -> &VendorBootHeader {
        &self.header
    }

    pub fn entries(&self) -> &[RamdiskTableEntry] {
        &self.entries
    }

    /// Start of the concatenated ramdisk region, right after the header and
    /// the bootconfig block. The dtb is expected at this offset plus
    /// `vendor_ramdisk_total_size`.
    // FIXME: shares the unpadded layout assumption of `locate_dtb`.
    pub fn ramdisk_region_offset(&self) -> usize {
        (u64::from(self.header.header_size) + u64::from(self.header.vendor_bootconfig_size))
            as usize
    }

    /// Raw bytes of one ramdisk fragment, still compressed.
    pub fn ramdisk(&self, entry: &RamdiskTableEntry) -> Result<&'a [u8]> {
        let offset = self.ramdisk_region_offset() as u64 + u64::from(entry.offset);
        let size = entry.size as usize;
        let out_of_bounds = || Error::SegmentOutOfBounds {
            name: entry.label(),
            offset: offset as usize,
            size,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(size).ok_or_else(out_of_bounds)?;
        self.data.get(start..end).ok_or_else(out_of_bounds)
    }

    pub fn dtb(&self) -> Option<&'a [u8]> {
        dtb_range(&self.header, self.data.len()).and_then(|range| self.data.get(range))
    }

    pub fn recovery_entry(&self) -> Option<&RamdiskTableEntry> {
        select_recovery(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtb::locate_dtb;
    use crate::header::tests::{encode, sample};
    use crate::table::RamdiskType;
    use crate::table::tests::encode_entry;

    /// Header and table padded to `header_size`, the bootconfig block, the
    /// fragments back to back, then the blob.
    fn build(bootconfig: &[u8], fragments: &[(&str, u32, &[u8])], dtb: &[u8]) -> Vec<u8> {
        let mut header = sample();
        header.header_size = 4096;
        header.vendor_bootconfig_size = bootconfig.len() as u32;
        header.vendor_ramdisk_table_num_entries = fragments.len() as u32;
        header.vendor_ramdisk_total_size = fragments.iter().map(|f| f.2.len() as u32).sum();
        header.dtb_size = dtb.len() as u32;

        let mut data = encode(&header);
        let mut offset = 0u32;
        for (name, kind, bytes) in fragments {
            data.extend(encode_entry(bytes.len() as u32, offset, *kind, name));
            offset += bytes.len() as u32;
        }
        data.resize(4096, 0);
        data.extend_from_slice(bootconfig);
        for (_, _, bytes) in fragments {
            data.extend_from_slice(bytes);
        }
        data.extend_from_slice(dtb);
        data
    }

    #[test]
    fn slices_fragments_after_header() {
        let data = build(
            b"",
            &[("platform", 1, b"first fragment"), ("recovery", 2, b"second")],
            b"\xd0\x0d\xfe\xedblob",
        );
        let image = VendorBootImage::parse(&data).unwrap();
        assert_eq!(image.ramdisk_region_offset(), 4096);
        assert_eq!(image.entries().len(), 2);
        assert_eq!(image.ramdisk(&image.entries()[0]).unwrap(), b"first fragment");
        assert_eq!(image.ramdisk(&image.entries()[1]).unwrap(), b"second");

        let recovery = image.recovery_entry().unwrap();
        assert_eq!(recovery.kind, RamdiskType::Recovery);
        assert_eq!(recovery.name, "recovery");
        assert_eq!(image.dtb().unwrap(), b"\xd0\x0d\xfe\xedblob");
    }

    #[test]
    fn region_and_dtb_agree() {
        let data = build(
            b"androidboot.hardware=mt6789\n",
            &[("", 1, b"0123456789"), ("rec", 2, b"abc")],
            b"\xd0\x0d\xfe\xed",
        );
        let image = VendorBootImage::parse(&data).unwrap();
        let header = image.header();
        assert_eq!(image.ramdisk_region_offset(), 4096 + 28);
        assert_eq!(
            image.ramdisk_region_offset() + header.vendor_ramdisk_total_size as usize,
            locate_dtb(header, data.len())
        );
        assert_eq!(image.ramdisk(&image.entries()[1]).unwrap(), b"abc");
        assert_eq!(image.dtb().unwrap(), b"\xd0\x0d\xfe\xed");
    }

    #[test]
    fn fragment_past_end_is_an_error() {
        let mut data = build(b"", &[("platform", 1, b"0123456789")], b"");
        data.truncate(data.len() - 3);
        let image = VendorBootImage::parse(&data).unwrap();
        match image.ramdisk(&image.entries()[0]) {
            Err(Error::SegmentOutOfBounds { name, offset, size }) => {
                assert_eq!(name, "platform");
                assert_eq!(offset, 4096);
                assert_eq!(size, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(image.dtb().is_none());
    }

    #[test]
    fn no_entries() {
        let mut header = sample();
        header.vendor_ramdisk_table_num_entries = 0;
        let image_data = encode(&header);
        let image = VendorBootImage::parse(&image_data).unwrap();
        assert_eq!(image.ramdisk_region_offset(), 2128 + 0x40);
        assert!(image.recovery_entry().is_none());
    }
}
