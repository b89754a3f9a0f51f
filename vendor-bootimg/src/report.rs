//! Diagnostics side channel.
//!
//! Components never log directly; they hand [`Event`]s to a [`Reporter`]
//! supplied by the caller. [`TracingReporter`] forwards them to `tracing`,
//! [`Collector`] keeps them for inspection.

use crate::compress::CompressFormat;
use crate::cpio::Anomaly;
use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tracing::{Level, debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Decompressed {
        format: CompressFormat,
        size: usize,
    },
    Anomaly(Anomaly),
    EntrySkipped {
        name: String,
        reason: &'static str,
    },
    Placeholder {
        path: PathBuf,
        mode: u32,
        nlink: u32,
    },
    DtbMissing(PathBuf),
    Extracted {
        dest: PathBuf,
        entries: usize,
    },
    PatchApplied {
        patch: &'static str,
        offset: usize,
    },
    PatchNotFound {
        patch: &'static str,
    },
    PatchTargetMissing(PathBuf),
    PatchWritten(PathBuf),
    PatchUnchanged(PathBuf),
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::Anomaly(_)
            | Event::EntrySkipped { .. }
            | Event::PatchNotFound { .. }
            | Event::PatchTargetMissing(_)
            | Event::DtbMissing(_) => Level::WARN,
            Event::Placeholder { .. } | Event::Decompressed { .. } => Level::DEBUG,
            _ => Level::INFO,
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Decompressed { format, size } => {
                write!(f, "payload is {format:?}, inflated to {size} bytes")
            }
            Event::Anomaly(anomaly) => write!(f, "{anomaly}, stopping extraction"),
            Event::EntrySkipped { name, reason } => write!(f, "skipping {name:?}: {reason}"),
            Event::Placeholder { path, mode, nlink } => write!(
                f,
                "{path:?} (mode {mode:o}, nlink {nlink}) written as an empty file"
            ),
            Event::DtbMissing(path) => write!(f, "{path:?} not found, continuing without a dtb"),
            Event::Extracted { dest, entries } => {
                write!(f, "extracted {entries} entries to {dest:?}")
            }
            Event::PatchApplied { patch, offset } => {
                write!(f, "found {patch} at offset 0x{offset:x}, replacing")
            }
            Event::PatchNotFound { patch } => write!(f, "{patch} not found, skipping"),
            Event::PatchTargetMissing(path) => write!(f, "{path:?} not found, skipping patch"),
            Event::PatchWritten(path) => write!(f, "{path:?} patched"),
            Event::PatchUnchanged(path) => write!(f, "no modifications applied to {path:?}"),
        }
    }
}

pub trait Reporter {
    fn report(&self, event: Event);
}

impl<F: Fn(Event)> Reporter for F {
    fn report(&self, event: Event) {
        self(event)
    }
}

/// Emits every event as a `tracing` event at [`Event::level`].
#[derive(Debug, Default, Copy, Clone)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: Event) {
        let level = event.level();
        if level <= Level::WARN {
            warn!("{event}");
        } else if level == Level::INFO {
            info!("{event}");
        } else {
            debug!("{event}");
        }
    }
}

#[derive(Debug, Default)]
pub struct Collector {
    events: RefCell<Vec<Event>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<Event> {
        self.events.take()
    }
}

impl Reporter for Collector {
    fn report(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_reporters() {
        let seen = RefCell::new(Vec::new());
        let reporter = |event: Event| seen.borrow_mut().push(event.to_string());
        reporter.report(Event::PatchNotFound {
            patch: "pattern2 (20008052)",
        });
        assert_eq!(*seen.borrow(), ["pattern2 (20008052) not found, skipping"]);
    }

    #[test]
    fn levels() {
        assert_eq!(Event::DtbMissing(PathBuf::from("dtb")).level(), Level::WARN);
        assert_eq!(Event::PatchWritten(PathBuf::from("a.ko")).level(), Level::INFO);
        let placeholder = Event::Placeholder {
            path: PathBuf::from("dev/null"),
            mode: 0o20666,
            nlink: 1,
        };
        assert_eq!(placeholder.level(), Level::DEBUG);
        assert_eq!(
            placeholder.to_string(),
            "\"dev/null\" (mode 20666, nlink 1) written as an empty file"
        );
    }
}
