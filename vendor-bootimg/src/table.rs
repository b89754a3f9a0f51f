use crate::constants::{
    VENDOR_RAMDISK_TYPE_DLKM, VENDOR_RAMDISK_TYPE_NONE, VENDOR_RAMDISK_TYPE_PLATFORM,
    VENDOR_RAMDISK_TYPE_RECOVERY,
};
use crate::error::{Error, Result};
use crate::header::VendorBootHeader;
use crate::layouts::{RAMDISK_TABLE_ENTRY_SIZE, ramdisk_table_entry as layout};
use crate::utils::{ByteCursor, lossy_text, to_hex};
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RamdiskType {
    None,
    Platform,
    Recovery,
    Dlkm,
    Unknown(u32),
}

impl From<u32> for RamdiskType {
    fn from(raw: u32) -> Self {
        match raw {
            VENDOR_RAMDISK_TYPE_NONE => RamdiskType::None,
            VENDOR_RAMDISK_TYPE_PLATFORM => RamdiskType::Platform,
            VENDOR_RAMDISK_TYPE_RECOVERY => RamdiskType::Recovery,
            VENDOR_RAMDISK_TYPE_DLKM => RamdiskType::Dlkm,
            _ => RamdiskType::Unknown(raw),
        }
    }
}

impl Display for RamdiskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RamdiskType::None => f.write_str("none"),
            RamdiskType::Platform => f.write_str("platform"),
            RamdiskType::Recovery => f.write_str("recovery"),
            RamdiskType::Dlkm => f.write_str("dlkm"),
            RamdiskType::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// One descriptor of the vendor ramdisk table.
///
/// `offset` and `size` locate the fragment inside the concatenated ramdisk
/// region, not inside the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamdiskTableEntry {
    pub size: u32,
    pub offset: u32,
    pub kind: RamdiskType,
    pub name: String,
    pub board_id: String,
}

impl RamdiskTableEntry {
    fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::at(data, layout::offset_ramdisk_size);
        Ok(Self {
            size: cursor.u32_le("ramdisk_size")?,
            offset: cursor.u32_le("ramdisk_offset")?,
            kind: cursor.u32_le("ramdisk_type")?.into(),
            name: lossy_text(cursor.take(layout::size_ramdisk_name, "ramdisk_name")?),
            board_id: to_hex(cursor.take(layout::size_board_id, "board_id")?),
        })
    }

    /// The entry name, or its type when the name is empty.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.kind.to_string()
        } else {
            self.name.clone()
        }
    }
}

pub fn decode_ramdisk_table(
    header: &VendorBootHeader,
    data: &[u8],
) -> Result<Vec<RamdiskTableEntry>> {
    let count = header.vendor_ramdisk_table_num_entries as usize;
    let needed = count.saturating_mul(RAMDISK_TABLE_ENTRY_SIZE);
    let available = data.len().saturating_sub(header.table_offset);
    if available < needed {
        return Err(Error::TruncatedTable { needed, available });
    }

    let table = &data[header.table_offset..header.table_offset + needed];
    table
        .chunks_exact(RAMDISK_TABLE_ENTRY_SIZE)
        .map(RamdiskTableEntry::parse)
        .collect()
}

/// Picks the ramdisk a recovery build should be based on: the first
/// recovery-typed entry, otherwise the first entry in table order.
pub fn select_recovery(entries: &[RamdiskTableEntry]) -> Option<&RamdiskTableEntry> {
    entries
        .iter()
        .find(|e| e.kind == RamdiskType::Recovery)
        .or_else(|| entries.first())
}
