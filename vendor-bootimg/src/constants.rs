pub const VENDOR_BOOT_MAGIC: &[u8] = b"VNDRBOOT";
pub const VENDOR_BOOT_MAGIC_SIZE: usize = 8;

pub const VENDOR_BOOT_ARGS_SIZE: usize = 2048;
pub const VENDOR_BOOT_NAME_SIZE: usize = 64;

pub const VENDOR_RAMDISK_NAME_SIZE: usize = 32;
pub const VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE: usize = 32;

pub const VENDOR_RAMDISK_TYPE_NONE: u32 = 0;
pub const VENDOR_RAMDISK_TYPE_PLATFORM: u32 = 1;
pub const VENDOR_RAMDISK_TYPE_RECOVERY: u32 = 2;
pub const VENDOR_RAMDISK_TYPE_DLKM: u32 = 3;

pub const CPIO_HEADER_SIZE: usize = 110;
pub const CPIO_MAGIC_NEWC: &[u8] = b"070701";
pub const CPIO_MAGIC_CRC: &[u8] = b"070702";
pub const CPIO_TRAILER: &str = "TRAILER!!!";
