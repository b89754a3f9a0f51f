pub mod compress;
pub mod constants;
pub mod cpio;
pub mod dtb;
pub mod error;
pub mod header;
pub mod image;
pub mod layouts;
pub mod patcher;
pub mod props;
pub mod report;
pub mod table;
pub mod unpacked;
pub mod utils;

pub use error::{Error, Result};
