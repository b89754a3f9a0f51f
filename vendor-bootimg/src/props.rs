//! `key=value` property text, as found in `header` files of unpacked images
//! and in `*.prop` files inside a ramdisk.

use crate::error::{IoResultExt, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

pub type Props = BTreeMap<String, String>;

/// Parses property text. Blank lines, `#` comments and lines without `=`
/// are ignored; keys and values are trimmed and later keys win.
pub fn parse_props(text: &str) -> Props {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect()
}

/// Reads and parses a property file. A missing file yields no properties.
pub fn read_props(path: &Path) -> Result<Props> {
    match fs::read(path) {
        Ok(data) => Ok(parse_props(&String::from_utf8_lossy(&data))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Props::new()),
        Err(e) => Err(e).with_path(path),
    }
}

/// An ordered list of keys; the first one holding a non-empty value wins.
#[derive(Debug, Copy, Clone)]
pub struct Lookup(pub &'static [&'static str]);

impl Lookup {
    pub fn resolve<'p>(&self, props: &'p Props) -> Option<&'p str> {
        self.0
            .iter()
            .filter_map(|key| props.get(*key))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }
}

pub const CMDLINE: Lookup = Lookup(&["cmdline"]);
/// magiskboot writes the product name as `name`.
pub const PRODUCT_NAME: Lookup = Lookup(&["product_name", "name"]);
