//! Byte offsets of the on-disk structures, computed at compile time from an
//! ordered list of `name type` pairs.
//!
//! `define_layout!` expands into a module holding `offset_<field>` and
//! `size_<field>` constants plus `total_size`, so each structure is written
//! down exactly once and every offset follows from the widths before it.

use crate::constants::{
    VENDOR_BOOT_ARGS_SIZE, VENDOR_BOOT_MAGIC_SIZE, VENDOR_BOOT_NAME_SIZE,
    VENDOR_RAMDISK_NAME_SIZE, VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE,
};
use paste::paste;

macro_rules! field_size {
    (u32) => {
        4
    };
    (u64) => {
        8
    };
    ($sz:expr) => {
        $sz
    };
}

macro_rules! define_layout_offsets {
    ($name:ident $t:tt $(,)?) => {
        paste! {
            pub const [<size_ $name>]: usize = field_size! { $t };
            pub const total_size: usize = [<offset_ $name>] + [<size_ $name>];
        }
    };
    ($name1:ident $t1:tt, $name2:ident $t2:tt $(,$name:ident $t:tt)* $(,)?) => {
        paste! {
            pub const [<size_ $name1>]: usize = field_size! { $t1 };
            pub const [<offset_ $name2>]: usize = [<offset_ $name1>] + [<size_ $name1>];
            define_layout_offsets! { $name2 $t2 $(,$name $t)* }
        }
    };
}

macro_rules! define_layout {
    (
        $mod_name:ident,
        initial_offset $initial_offset:expr,
        structure {$name1:ident $t1:tt $(,$name:ident $t:tt)* $(,)?} $(,)?
    ) => {
        paste! {
            #[allow(dead_code, non_upper_case_globals)]
            pub mod $mod_name {
                use super::*;
                pub const [<offset_ $name1>]: usize = $initial_offset;
                define_layout_offsets! { $name1 $t1 $(,$name $t)* }
            }
        }
    };
}

define_layout! {
    vendor_boot_header,
    initial_offset VENDOR_BOOT_MAGIC_SIZE,
    structure {
        header_version u32,
        page_size u32,
        kernel_addr u32,
        ramdisk_addr u32,
        vendor_ramdisk_size u32,
        cmdline VENDOR_BOOT_ARGS_SIZE,
        tags_addr u32,
        name VENDOR_BOOT_NAME_SIZE,
        header_size u32,
        dtb_size u32,
        dtb_addr u64,
        vendor_ramdisk_table_size u32,
        vendor_ramdisk_table_entry_num u32,
        bootconfig_size u32,
    },
}

define_layout! {
    ramdisk_table_entry,
    initial_offset 0,
    structure {
        ramdisk_size u32,
        ramdisk_offset u32,
        ramdisk_type u32,
        ramdisk_name VENDOR_RAMDISK_NAME_SIZE,
        board_id VENDOR_RAMDISK_TABLE_ENTRY_BOARD_ID_SIZE,
    },
}

/// Offset of the ramdisk table, directly after the last fixed header field.
pub const VENDOR_BOOT_HEADER_SIZE: usize = vendor_boot_header::total_size;

pub const RAMDISK_TABLE_ENTRY_SIZE: usize = ramdisk_table_entry::total_size;
