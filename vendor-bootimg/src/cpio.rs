use crate::compress::{CompressFormat, decompress};
use crate::constants::{CPIO_HEADER_SIZE, CPIO_MAGIC_CRC, CPIO_MAGIC_NEWC, CPIO_TRAILER};
use crate::error::{IoResultExt, Result};
use crate::report::{Event, Reporter};
use crate::utils::{align_to, lossy_text, norm_path};
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str;

pub const TYPE_MASK: u32 = 0o170000;
pub const TYPE_FIFO: u32 = 0o010000;
pub const TYPE_CHAR: u32 = 0o020000;
pub const TYPE_DIR: u32 = 0o040000;
pub const TYPE_BLOCK: u32 = 0o060000;
pub const TYPE_REGULAR: u32 = 0o100000;
pub const TYPE_SYMLINK: u32 = 0o120000;
pub const TYPE_SOCKET: u32 = 0o140000;

/// Fixed 110-byte "newc" record header. Every field after the magic is
/// eight ASCII hex digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioHeader {
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub file_size: u32,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub rdev_major: u32,
    pub rdev_minor: u32,
    pub name_size: u32,
    /// Only meaningful for `070702` archives; never verified.
    pub checksum: u32,
}

fn read_hex_u32(record: &[u8], index: usize, field: &'static str) -> Result<u32, &'static str> {
    let start = 6 + index * 8;
    str::from_utf8(&record[start..start + 8])
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or(field)
}

impl CpioHeader {
    /// Decodes the hex fields of a record whose magic was already checked.
    /// Returns the name of the first field that is not valid hex.
    fn parse(record: &[u8]) -> Result<Self, &'static str> {
        Ok(Self {
            ino: read_hex_u32(record, 0, "ino")?,
            mode: read_hex_u32(record, 1, "mode")?,
            uid: read_hex_u32(record, 2, "uid")?,
            gid: read_hex_u32(record, 3, "gid")?,
            nlink: read_hex_u32(record, 4, "nlink")?,
            mtime: read_hex_u32(record, 5, "mtime")?,
            file_size: read_hex_u32(record, 6, "filesize")?,
            dev_major: read_hex_u32(record, 7, "devmajor")?,
            dev_minor: read_hex_u32(record, 8, "devminor")?,
            rdev_major: read_hex_u32(record, 9, "rdevmajor")?,
            rdev_minor: read_hex_u32(record, 10, "rdevminor")?,
            name_size: read_hex_u32(record, 11, "namesize")?,
            checksum: read_hex_u32(record, 12, "checksum")?,
        })
    }
}

/// Why decoding stopped before the trailer. Entries decoded up to that
/// point are still returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    BadMagic { offset: usize, magic: String },
    InvalidField { offset: usize, field: &'static str },
    Truncated { offset: usize },
    MissingTrailer { offset: usize },
}

impl Display for Anomaly {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Anomaly::BadMagic { offset, magic } => {
                write!(f, "unexpected cpio magic {magic:?} at offset {offset}")
            }
            Anomaly::InvalidField { offset, field } => {
                write!(f, "invalid {field} field in cpio record at offset {offset}")
            }
            Anomaly::Truncated { offset } => {
                write!(f, "cpio record at offset {offset} runs past the end of the archive")
            }
            Anomaly::MissingTrailer { offset } => {
                write!(f, "cpio archive ends at offset {offset} without a trailer")
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name as stored in the archive.
    pub name: String,
    /// Sanitized path relative to the extraction root.
    pub path: PathBuf,
    pub kind: EntryKind,
    /// File content, or the link target for symlinks.
    pub data: Vec<u8>,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
}

impl ArchiveEntry {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn link_target(&self) -> Option<String> {
        (self.kind == EntryKind::Symlink).then(|| String::from_utf8_lossy(&self.data).into_owned())
    }

    fn is_regular(&self) -> bool {
        self.mode & TYPE_MASK == TYPE_REGULAR
    }
}

impl Display for ArchiveEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mode = self.mode;
        let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
        write!(
            f,
            "{}{}{}{}{}{}{}{}{}{}\t{}\t{}\t{}\t{}",
            match mode & TYPE_MASK {
                TYPE_DIR => 'd',
                TYPE_REGULAR => '-',
                TYPE_SYMLINK => 'l',
                TYPE_BLOCK => 'b',
                TYPE_CHAR => 'c',
                TYPE_FIFO => 'p',
                TYPE_SOCKET => 's',
                _ => '?',
            },
            bit(0o400, 'r'),
            bit(0o200, 'w'),
            bit(0o100, 'x'),
            bit(0o040, 'r'),
            bit(0o020, 'w'),
            bit(0o010, 'x'),
            bit(0o004, 'r'),
            bit(0o002, 'w'),
            bit(0o001, 'x'),
            self.uid,
            self.gid,
            self.size(),
            self.path.display(),
        )?;
        if let Some(target) = self.link_target() {
            write!(f, " -> {target}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Archive {
    pub format: CompressFormat,
    pub entries: Vec<ArchiveEntry>,
    pub anomaly: Option<Anomaly>,
}

impl Archive {
    pub fn is_complete(&self) -> bool {
        self.anomaly.is_none()
    }
}

#[derive(Debug)]
pub struct Extraction {
    pub archive: Archive,
    /// Entries actually materialized on disk.
    pub written: usize,
}

fn decode_newc(data: &[u8], reporter: &dyn Reporter) -> (Vec<ArchiveEntry>, Option<Anomaly>) {
    let mut entries = Vec::new();
    let mut pos = 0usize;
    let anomaly = loop {
        let offset = pos;
        if pos >= data.len() {
            break Some(Anomaly::MissingTrailer { offset });
        }
        let Some(record) = data.get(pos..pos + CPIO_HEADER_SIZE) else {
            break Some(Anomaly::Truncated { offset });
        };
        let magic = &record[..6];
        if magic != CPIO_MAGIC_NEWC && magic != CPIO_MAGIC_CRC {
            break Some(Anomaly::BadMagic {
                offset,
                magic: String::from_utf8_lossy(magic).into_owned(),
            });
        }
        let header = match CpioHeader::parse(record) {
            Ok(header) => header,
            Err(field) => break Some(Anomaly::InvalidField { offset, field }),
        };
        pos += CPIO_HEADER_SIZE;

        let name_size = header.name_size as usize;
        let Some(name) = data.get(pos..pos + name_size) else {
            break Some(Anomaly::Truncated { offset });
        };
        let name = lossy_text(name);
        // name and content are each padded from their own start
        pos += align_to(name_size, 4);
        if name == CPIO_TRAILER {
            break None;
        }

        let file_size = header.file_size as usize;
        let Some(content) = data.get(pos..pos + file_size) else {
            break Some(Anomaly::Truncated { offset });
        };
        pos += align_to(file_size, 4);

        let path = norm_path(&name);
        if path.is_empty() {
            if name != "." {
                reporter.report(Event::EntrySkipped {
                    name,
                    reason: "resolves to the extraction root",
                });
            }
            continue;
        }
        let kind = match header.mode & TYPE_MASK {
            TYPE_DIR => EntryKind::Directory,
            TYPE_SYMLINK => EntryKind::Symlink,
            _ => EntryKind::File,
        };
        entries.push(ArchiveEntry {
            path: PathBuf::from(path.into_owned()),
            name,
            kind,
            data: content.to_vec(),
            mode: header.mode,
            uid: header.uid,
            gid: header.gid,
            nlink: header.nlink,
            mtime: header.mtime,
        });
    };
    (entries, anomaly)
}

/// Decodes a newc archive, inflating it first if it is compressed.
///
/// Corruption inside the archive is not an error: decoding stops and the
/// entries read so far come back together with the [`Anomaly`]. A payload
/// that fails to inflate is an error and nothing is decoded.
pub fn decode(data: &[u8], reporter: &dyn Reporter) -> Result<Archive> {
    let (format, data) = decompress(data)?;
    if format != CompressFormat::Unknown {
        reporter.report(Event::Decompressed {
            format,
            size: data.len(),
        });
    }
    let (entries, anomaly) = decode_newc(&data, reporter);
    if let Some(anomaly) = &anomaly {
        reporter.report(Event::Anomaly(anomaly.clone()));
    }
    Ok(Archive {
        format,
        entries,
        anomaly,
    })
}

#[cfg(unix)]
pub(crate) fn make_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
pub(crate) fn make_symlink(_target: &str, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks can only be extracted on unix hosts",
    ))
}

/// True when some parent directory of `rel` under `root` is a symlink,
/// i.e. writing to `rel` would land wherever that link points.
fn crosses_symlink(root: &Path, rel: &Path) -> bool {
    let mut current = root.to_path_buf();
    let Some(parent) = rel.parent() else {
        return false;
    };
    for component in parent.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

/// Removes a symlink or file sitting where a new entry is about to be
/// created, so the write cannot go through an old link.
fn clear_target(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path).with_path(path),
        _ => Ok(()),
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).with_path(parent),
        None => Ok(()),
    }
}

fn materialize(entry: &ArchiveEntry, root: &Path, reporter: &dyn Reporter) -> Result<bool> {
    if crosses_symlink(root, &entry.path) {
        reporter.report(Event::EntrySkipped {
            name: entry.name.clone(),
            reason: "parent directory is a symlink",
        });
        return Ok(false);
    }
    let target = root.join(&entry.path);
    match entry.kind {
        EntryKind::Directory => {
            if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
                fs::remove_file(&target).with_path(&target)?;
            }
            fs::create_dir_all(&target).with_path(&target)?;
        }
        EntryKind::Symlink => {
            let link = entry.link_target().unwrap_or_default();
            if link.is_empty() {
                reporter.report(Event::EntrySkipped {
                    name: entry.name.clone(),
                    reason: "symlink has an empty target",
                });
                return Ok(false);
            }
            create_parent(&target)?;
            clear_target(&target)?;
            make_symlink(&link, &target).with_path(&target)?;
        }
        EntryKind::File => {
            // TODO: hard links (nlink > 1, data on the last member only) are
            // written as separate files; link them once an image needs it.
            if !entry.is_regular() || (entry.nlink > 1 && entry.data.is_empty()) {
                reporter.report(Event::Placeholder {
                    path: entry.path.clone(),
                    mode: entry.mode,
                    nlink: entry.nlink,
                });
            }
            create_parent(&target)?;
            clear_target(&target)?;
            fs::write(&target, &entry.data).with_path(&target)?;
        }
    }
    Ok(true)
}

/// Decodes `data` and creates its entries under `dest`.
///
/// Nothing is ever created outside `dest`. Failed writes abort the
/// extraction and leave already-written entries in place.
pub fn extract(data: &[u8], dest: &Path, reporter: &dyn Reporter) -> Result<Extraction> {
    let archive = decode(data, reporter)?;
    fs::create_dir_all(dest).with_path(dest)?;
    let mut written = 0;
    for entry in &archive.entries {
        if materialize(entry, dest, reporter)? {
            written += 1;
        }
    }
    reporter.report(Event::Extracted {
        dest: dest.to_path_buf(),
        entries: written,
    });
    Ok(Extraction { archive, written })
}

pub fn extract_file(path: &Path, dest: &Path, reporter: &dyn Reporter) -> Result<Extraction> {
    let data = fs::read(path).with_path(path)?;
    extract(&data, dest, reporter)
}
