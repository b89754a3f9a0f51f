use crate::constants::{VENDOR_BOOT_MAGIC, VENDOR_BOOT_MAGIC_SIZE};
use crate::error::{Error, Result};
use crate::layouts::vendor_boot_header as layout;
use crate::utils::ByteCursor;

/// Fixed-size header at the start of a vendor_boot image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorBootHeader {
    pub header_version: u32,
    pub page_size: u32,
    pub kernel_load_addr: u32,
    pub ramdisk_load_addr: u32,
    pub vendor_ramdisk_total_size: u32,
    pub cmdline: String,
    pub tags_load_addr: u32,
    pub product_name: String,
    pub header_size: u32,
    pub dtb_size: u32,
    pub dtb_load_addr: u64,
    pub vendor_ramdisk_table_size: u32,
    pub vendor_ramdisk_table_num_entries: u32,
    pub vendor_bootconfig_size: u32,
    /// Where the ramdisk table starts: right after the last fixed field.
    pub table_offset: usize,
}

impl VendorBootHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let magic = data.get(..VENDOR_BOOT_MAGIC_SIZE).unwrap_or(data);
        if magic != VENDOR_BOOT_MAGIC {
            return Err(Error::BadMagic {
                found: magic.to_vec(),
            });
        }

        let mut cursor = ByteCursor::at(data, VENDOR_BOOT_MAGIC_SIZE);
        let header = Self {
            header_version: cursor.u32_le("header_version")?,
            page_size: cursor.u32_le("page_size")?,
            kernel_load_addr: cursor.u32_le("kernel_load_addr")?,
            ramdisk_load_addr: cursor.u32_le("ramdisk_load_addr")?,
            vendor_ramdisk_total_size: cursor.u32_le("vendor_ramdisk_total_size")?,
            cmdline: cursor.text(layout::size_cmdline, "cmdline")?,
            tags_load_addr: cursor.u32_le("tags_load_addr")?,
            product_name: cursor.text(layout::size_name, "product_name")?,
            header_size: cursor.u32_le("header_size")?,
            dtb_size: cursor.u32_le("dtb_size")?,
            dtb_load_addr: cursor.u64_le("dtb_load_addr")?,
            vendor_ramdisk_table_size: cursor.u32_le("vendor_ramdisk_table_size")?,
            vendor_ramdisk_table_num_entries: cursor.u32_le("vendor_ramdisk_table_num_entries")?,
            vendor_bootconfig_size: cursor.u32_le("vendor_bootconfig_size")?,
            table_offset: cursor.position(),
        };
        debug_assert_eq!(header.table_offset, layout::total_size);
        Ok(header)
    }
}
