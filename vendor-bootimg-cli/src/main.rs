use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use memmap2::Mmap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use vendor_bootimg::cpio;
use vendor_bootimg::header::VendorBootHeader;
use vendor_bootimg::image::VendorBootImage;
use vendor_bootimg::patcher::{self, PatchOutcome, TOUCH_MODULE_NAME};
use vendor_bootimg::report::TracingReporter;
use vendor_bootimg::unpacked::UnpackedDir;

#[derive(Parser, Debug)]
#[command(version, about = "Unpack Transsion vendor_boot images for recovery builds")]
struct Args {
    /// Also print debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header fields and the vendor ramdisk table
    Info { image: PathBuf },
    /// Unpack a vendor_boot image, or a directory produced by another unpacker
    Unpack {
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "out")]
        out: PathBuf,

        /// Patch lib/modules/adaptive-ts.ko in the recovery ramdisk
        #[arg(long)]
        patch_touch: bool,
    },
    /// List the members of a cpio archive
    List { archive: PathBuf },
    /// Extract a cpio archive, compressed or not
    Extract { archive: PathBuf, dest: PathBuf },
    /// Patch an adaptive-ts.ko module in place
    Patch { module: PathBuf },
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
    let mem = unsafe { Mmap::map(&file) }.with_context(|| format!("failed to map {path:?}"))?;
    Ok(mem)
}

fn print_info(header: &VendorBootHeader) {
    macro_rules! print_info_item {
        ($name:ident) => {
            println!("{}: {}", stringify!($name), header.$name);
        };
        ($name:ident, hex) => {
            println!("{}: 0x{:x}", stringify!($name), header.$name);
        };
    }

    print_info_item! { header_version }
    print_info_item! { page_size }
    print_info_item! { kernel_load_addr, hex }
    print_info_item! { ramdisk_load_addr, hex }
    print_info_item! { vendor_ramdisk_total_size }
    print_info_item! { cmdline }
    print_info_item! { tags_load_addr, hex }
    print_info_item! { product_name }
    print_info_item! { header_size }
    print_info_item! { dtb_size }
    print_info_item! { dtb_load_addr, hex }
    print_info_item! { vendor_ramdisk_table_size }
    print_info_item! { vendor_ramdisk_table_num_entries }
    print_info_item! { vendor_bootconfig_size }
}

fn info(path: &Path) -> Result<()> {
    let mem = map_file(path)?;
    let image = VendorBootImage::parse(&mem)?;
    print_info(image.header());
    for (i, entry) in image.entries().iter().enumerate() {
        println!(
            "ramdisk[{i}]: name={:?} type={} offset=0x{:x} size={} board_id={}",
            entry.name, entry.kind, entry.offset, entry.size, entry.board_id
        );
    }
    if let Some(dtb) = image.dtb() {
        let offset = dtb.as_ptr() as usize - mem.as_ptr() as usize;
        println!("dtb: offset=0x{offset:x} size={}", dtb.len());
    }
    Ok(())
}

/// Unpacks `input` into `out` and returns the recovery ramdisk directory.
fn unpack_image(input: &Path, out: &Path) -> Result<PathBuf> {
    let mem = map_file(input)?;
    let image = VendorBootImage::parse(&mem)
        .with_context(|| format!("failed to parse {input:?}"))?;
    info!(
        "{} vendor ramdisk entries, product {:?}",
        image.entries().len(),
        image.header().product_name
    );

    match image.dtb() {
        Some(dtb) => {
            let path = out.join("dtb.img");
            fs::write(&path, dtb).with_context(|| format!("failed to write {path:?}"))?;
            info!("dtb extracted to {path:?}");
        }
        None => warn!("image carries no dtb"),
    }

    for entry in image.entries() {
        let dest = out.join(format!("ramdisk_{}", entry.label()));
        let data = image.ramdisk(entry)?;
        cpio::extract(data, &dest, &TracingReporter)
            .with_context(|| format!("failed to extract ramdisk {:?}", entry.label()))?;
    }

    let Some(recovery) = image.recovery_entry() else {
        bail!("no vendor ramdisk to use as recovery");
    };
    Ok(out.join(format!("ramdisk_{}", recovery.label())))
}

fn unpack_dir(input: &Path, out: &Path) -> Result<PathBuf> {
    let unpacked = UnpackedDir::load(input, &TracingReporter)?;
    info!(
        "unpacked directory {input:?}, product {:?}",
        unpacked.product_name()
    );

    let recovery = out.join("recovery_ramdisk");
    unpacked.stage_ramdisk(&recovery, &TracingReporter)?;
    if let Some(dtb) = &unpacked.dtb {
        let path = out.join("dtb.img");
        fs::copy(dtb, &path).with_context(|| format!("failed to copy {dtb:?}"))?;
    }
    Ok(recovery)
}

fn unpack(input: &Path, out: &Path, patch_touch: bool) -> Result<()> {
    fs::create_dir_all(out).with_context(|| format!("failed to create {out:?}"))?;
    let recovery = if input.is_dir() {
        unpack_dir(input, out)?
    } else {
        unpack_image(input, out)?
    };
    println!("recovery ramdisk: {}", recovery.display());

    if patch_touch {
        let module = recovery.join("lib/modules").join(TOUCH_MODULE_NAME);
        patch(&module)?;
    }
    Ok(())
}

fn list(path: &Path) -> Result<()> {
    let mem = map_file(path)?;
    let archive = cpio::decode(&mem, &TracingReporter)?;
    for entry in &archive.entries {
        println!("{entry}");
    }
    if !archive.is_complete() {
        bail!("archive is truncated or corrupt");
    }
    Ok(())
}

fn patch(module: &Path) -> Result<()> {
    match patcher::patch_file(module, &TracingReporter)? {
        PatchOutcome::Patched(report) => println!("patched {}: {report:?}", module.display()),
        PatchOutcome::Unchanged => println!("{} left unchanged", module.display()),
        PatchOutcome::Missing => println!("{} not found", module.display()),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .with_target(false)
        .init();

    match &args.command {
        Command::Info { image } => info(image),
        Command::Unpack {
            input,
            out,
            patch_touch,
        } => unpack(input, out, *patch_touch),
        Command::List { archive } => list(archive),
        Command::Extract { archive, dest } => {
            let extraction = cpio::extract_file(archive, dest, &TracingReporter)?;
            println!(
                "{} of {} entries written to {}",
                extraction.written,
                extraction.archive.entries.len(),
                dest.display()
            );
            Ok(())
        }
        Command::Patch { module } => patch(module),
    }
}
