//! Images that were already taken apart by another tool: a directory holding
//! `ramdisk/` or `ramdisk.cpio`, an optional `dtb` and an optional `header`
//! property file.

use crate::cpio::{self, make_symlink};
use crate::error::{Error, IoResultExt, Result};
use crate::props::{self, Props, read_props};
use crate::report::{Event, Reporter};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RamdiskSource {
    Directory(PathBuf),
    Cpio(PathBuf),
}

#[derive(Debug, Clone)]
pub struct UnpackedDir {
    pub root: PathBuf,
    pub ramdisk: RamdiskSource,
    pub dtb: Option<PathBuf>,
    pub props: Props,
}

impl UnpackedDir {
    pub fn load(dir: &Path, reporter: &dyn Reporter) -> Result<Self> {
        let ramdisk_dir = dir.join("ramdisk");
        let ramdisk_cpio = dir.join("ramdisk.cpio");
        let ramdisk = if ramdisk_dir.is_dir() {
            RamdiskSource::Directory(ramdisk_dir)
        } else if ramdisk_cpio.is_file() {
            RamdiskSource::Cpio(ramdisk_cpio)
        } else {
            return Err(Error::MissingRamdisk(dir.to_path_buf()));
        };

        let dtb_path = dir.join("dtb");
        let dtb = if dtb_path.is_file() {
            Some(dtb_path)
        } else {
            reporter.report(Event::DtbMissing(dtb_path));
            None
        };

        Ok(Self {
            root: dir.to_path_buf(),
            ramdisk,
            dtb,
            props: read_props(&dir.join("header"))?,
        })
    }

    pub fn cmdline(&self) -> &str {
        props::CMDLINE.resolve(&self.props).unwrap_or_default()
    }

    pub fn product_name(&self) -> &str {
        props::PRODUCT_NAME.resolve(&self.props).unwrap_or_default()
    }

    /// Fills `dest` with the ramdisk tree, extracting `ramdisk.cpio` or
    /// copying `ramdisk/` with symlinks kept as links. Returns the number
    /// of entries created.
    pub fn stage_ramdisk(&self, dest: &Path, reporter: &dyn Reporter) -> Result<usize> {
        match &self.ramdisk {
            RamdiskSource::Cpio(path) => Ok(cpio::extract_file(path, dest, reporter)?.written),
            RamdiskSource::Directory(src) => {
                let copied = copy_tree(src, dest)?;
                reporter.report(Event::Extracted {
                    dest: dest.to_path_buf(),
                    entries: copied,
                });
                Ok(copied)
            }
        }
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest).with_path(dest)?;
    let mut copied = 0;
    for entry in fs::read_dir(src).with_path(src)? {
        let entry = entry.with_path(src)?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry.file_type().with_path(&from)?;
        if file_type.is_symlink() {
            let target = fs::read_link(&from).with_path(&from)?;
            make_symlink(&target.to_string_lossy(), &to).with_path(&to)?;
            copied += 1;
        } else if file_type.is_dir() {
            copied += copy_tree(&from, &to)? + 1;
        } else {
            fs::copy(&from, &to).with_path(&from)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpio::tests::sample_archive;
    use crate::report::Collector;

    #[test]
    fn prefers_ramdisk_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("ramdisk")).unwrap();
        fs::write(dir.path().join("ramdisk.cpio"), sample_archive()).unwrap();
        fs::write(dir.path().join("dtb"), b"blob").unwrap();

        let reporter = Collector::new();
        let unpacked = UnpackedDir::load(dir.path(), &reporter).unwrap();
        assert_eq!(
            unpacked.ramdisk,
            RamdiskSource::Directory(dir.path().join("ramdisk"))
        );
        assert_eq!(unpacked.dtb, Some(dir.path().join("dtb")));
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn falls_back_to_cpio_and_reads_header() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ramdisk.cpio"), sample_archive()).unwrap();
        fs::write(
            dir.path().join("header"),
            "cmdline=bootopt=64S3,32N2\nname=X6885\n",
        )
        .unwrap();

        let reporter = Collector::new();
        let unpacked = UnpackedDir::load(dir.path(), &reporter).unwrap();
        assert_eq!(
            unpacked.ramdisk,
            RamdiskSource::Cpio(dir.path().join("ramdisk.cpio"))
        );
        assert_eq!(unpacked.dtb, None);
        assert_eq!(
            reporter.take(),
            [Event::DtbMissing(dir.path().join("dtb"))]
        );
        assert_eq!(unpacked.cmdline(), "bootopt=64S3,32N2");
        assert_eq!(unpacked.product_name(), "X6885");

        let out = dir.path().join("recovery_ramdisk");
        assert_eq!(unpacked.stage_ramdisk(&out, &reporter).unwrap(), 3);
        assert_eq!(fs::read(out.join("dir/hi.txt")).unwrap(), b"hi");
    }

    #[test]
    fn missing_ramdisk() {
        let dir = tempfile::tempdir().unwrap();
        let err = UnpackedDir::load(dir.path(), &Collector::new()).unwrap_err();
        assert!(matches!(err, Error::MissingRamdisk(p) if p == dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn copies_ramdisk_directory_with_links() {
        let dir = tempfile::tempdir().unwrap();
        let ramdisk = dir.path().join("ramdisk");
        fs::create_dir_all(ramdisk.join("lib/modules")).unwrap();
        fs::write(ramdisk.join("lib/modules/adaptive-ts.ko"), b"ko").unwrap();
        std::os::unix::fs::symlink("lib/modules", ramdisk.join("modules")).unwrap();

        let unpacked = UnpackedDir::load(dir.path(), &Collector::new()).unwrap();
        assert!(unpacked.props.is_empty());
        assert_eq!(unpacked.product_name(), "");

        let out = dir.path().join("recovery_ramdisk");
        assert_eq!(unpacked.stage_ramdisk(&out, &Collector::new()).unwrap(), 4);
        assert_eq!(fs::read(out.join("lib/modules/adaptive-ts.ko")).unwrap(), b"ko");
        assert_eq!(
            fs::read_link(out.join("modules")).unwrap(),
            Path::new("lib/modules")
        );
    }
}
