//! Byte-pattern patch for the `adaptive-ts.ko` touch driver shipped in
//! Transsion vendor ramdisks.
//!
//! Stock builds of the module leave the touch panel dead in recovery. The
//! first pattern is rewritten at its last occurrence; the second, a
//! `mov w0, #1` turned into `mov w0, #0`, only after that point.

use crate::error::{IoResultExt, Result};
use crate::report::{Event, Reporter};
use std::fs;
use std::path::Path;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BytePatch {
    pub name: &'static str,
    pub old: &'static [u8],
    pub new: &'static [u8],
}

pub const TOUCH_PATCH_BRANCH: BytePatch = BytePatch {
    name: "pattern1 (600000544000)",
    old: b"\x60\x00\x00\x54\x40\x00",
    new: b"\x60\x00\x00\x54\x00\x00",
};

pub const TOUCH_PATCH_MOV: BytePatch = BytePatch {
    name: "pattern2 (20008052)",
    old: b"\x20\x00\x80\x52",
    new: b"\x00\x00\x80\x52",
};

pub const TOUCH_MODULE_NAME: &str = "adaptive-ts.ko";

/// Offsets at which each patch was applied.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub first: Option<usize>,
    pub second: Option<usize>,
}

impl PatchReport {
    pub fn modified(&self) -> bool {
        self.first.is_some() || self.second.is_some()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Missing,
    Unchanged,
    Patched(PatchReport),
}

fn apply_at(data: &mut [u8], offset: usize, patch: &BytePatch) -> usize {
    let end = offset + patch.new.len();
    data[offset..end].copy_from_slice(patch.new);
    end
}

/// Replaces the last occurrence of `first.old`, then the first occurrence
/// of `second.old` at or after the end of that replacement (or anywhere,
/// if `first` did not match). The two replacements succeed independently.
pub fn patch_buffer(
    data: &mut [u8],
    first: &BytePatch,
    second: &BytePatch,
    reporter: &dyn Reporter,
) -> PatchReport {
    debug_assert_eq!(first.old.len(), first.new.len());
    debug_assert_eq!(second.old.len(), second.new.len());

    let mut report = PatchReport::default();
    let mut cursor = 0;

    match data.windows(first.old.len()).rposition(|w| w == first.old) {
        Some(offset) => {
            reporter.report(Event::PatchApplied {
                patch: first.name,
                offset,
            });
            cursor = apply_at(data, offset, first);
            report.first = Some(offset);
        }
        None => reporter.report(Event::PatchNotFound { patch: first.name }),
    }

    let found = data
        .get(cursor..)
        .and_then(|tail| tail.windows(second.old.len()).position(|w| w == second.old));
    match found {
        Some(relative) => {
            let offset = cursor + relative;
            reporter.report(Event::PatchApplied {
                patch: second.name,
                offset,
            });
            apply_at(data, offset, second);
            report.second = Some(offset);
        }
        None => reporter.report(Event::PatchNotFound { patch: second.name }),
    }

    report
}

/// Applies the touch patch to the module at `path` in place.
///
/// A missing file, or a path that is not a regular file, is not an error.
/// The file is only rewritten when at
/// least one pattern matched.
pub fn patch_file(path: &Path, reporter: &dyn Reporter) -> Result<PatchOutcome> {
    if !path.is_file() {
        reporter.report(Event::PatchTargetMissing(path.to_path_buf()));
        return Ok(PatchOutcome::Missing);
    }
    let mut data = fs::read(path).with_path(path)?;

    let report = patch_buffer(&mut data, &TOUCH_PATCH_BRANCH, &TOUCH_PATCH_MOV, reporter);
    if !report.modified() {
        reporter.report(Event::PatchUnchanged(path.to_path_buf()));
        return Ok(PatchOutcome::Unchanged);
    }
    fs::write(path, &data).with_path(path)?;
    reporter.report(Event::PatchWritten(path.to_path_buf()));
    Ok(PatchOutcome::Patched(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Collector;

    const P1: &[u8] = TOUCH_PATCH_BRANCH.old;
    const P2: &[u8] = TOUCH_PATCH_MOV.old;

    fn blob(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    fn patch(data: &mut [u8]) -> PatchReport {
        patch_buffer(data, &TOUCH_PATCH_BRANCH, &TOUCH_PATCH_MOV, &Collector::new())
    }

    #[test]
    fn only_rightmost_first_pattern_is_patched() {
        let mut data = blob(&[b"AA", P1, b"BBBB", P1, b"CC", P2]);
        let report = patch(&mut data);
        assert_eq!(report.first, Some(12));
        assert_eq!(&data[2..8], P1);
        assert_eq!(&data[12..18], TOUCH_PATCH_BRANCH.new);
        assert_eq!(report.second, Some(20));
        assert_eq!(&data[20..24], TOUCH_PATCH_MOV.new);
    }

    #[test]
    fn second_pattern_before_cursor_is_left_alone() {
        let mut data = blob(&[P2, b"xx", P1, b"yy", P2]);
        let report = patch(&mut data);
        assert_eq!(report.first, Some(6));
        assert_eq!(report.second, Some(14));
        assert_eq!(&data[..4], P2);
        assert_eq!(&data[14..18], TOUCH_PATCH_MOV.new);
    }

    #[test]
    fn second_pattern_only_before_cursor() {
        let mut data = blob(&[P2, P1]);
        let original = data.clone();
        let reporter = Collector::new();
        let report = patch_buffer(&mut data, &TOUCH_PATCH_BRANCH, &TOUCH_PATCH_MOV, &reporter);
        assert_eq!(report.first, Some(4));
        assert_eq!(report.second, None);
        assert_eq!(&data[..4], &original[..4]);
        assert!(reporter.events().contains(&Event::PatchNotFound {
            patch: TOUCH_PATCH_MOV.name
        }));
    }

    #[test]
    fn second_pattern_searched_from_start_without_first() {
        let mut data = blob(&[b"zz", P2, P2]);
        let report = patch(&mut data);
        assert_eq!(report.first, None);
        assert_eq!(report.second, Some(2));
        assert_eq!(&data[6..10], P2);
    }

    #[test]
    fn second_may_start_right_after_first() {
        let mut data = blob(&[P1, P2]);
        let report = patch(&mut data);
        assert_eq!(report, PatchReport {
            first: Some(0),
            second: Some(6)
        });
    }

    #[test]
    fn nothing_to_patch() {
        let mut data = b"no patterns in here".to_vec();
        let report = patch(&mut data);
        assert!(!report.modified());
        assert_eq!(data, b"no patterns in here");
    }

    #[test]
    fn patch_file_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Collector::new();

        let missing = dir.path().join(TOUCH_MODULE_NAME);
        assert_eq!(patch_file(&missing, &reporter).unwrap(), PatchOutcome::Missing);
        assert!(!missing.exists());
        assert_eq!(reporter.take(), [Event::PatchTargetMissing(missing.clone())]);

        let clean = dir.path().join("clean.ko");
        fs::write(&clean, b"\x7fELF nothing").unwrap();
        assert_eq!(patch_file(&clean, &reporter).unwrap(), PatchOutcome::Unchanged);
        assert_eq!(fs::read(&clean).unwrap(), b"\x7fELF nothing");

        fs::write(&missing, blob(&[b"\x7fELF", P1, P2])).unwrap();
        let outcome = patch_file(&missing, &reporter).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::Patched(PatchReport {
                first: Some(4),
                second: Some(10)
            })
        );
        assert_eq!(
            fs::read(&missing).unwrap(),
            blob(&[b"\x7fELF", TOUCH_PATCH_BRANCH.new, TOUCH_PATCH_MOV.new])
        );
    }

    #[test]
    fn directory_target_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(TOUCH_MODULE_NAME);
        fs::create_dir(&target).unwrap();

        let reporter = Collector::new();
        assert_eq!(patch_file(&target, &reporter).unwrap(), PatchOutcome::Missing);
        assert_eq!(reporter.take(), [Event::PatchTargetMissing(target.clone())]);
        assert!(target.is_dir());
    }
}
