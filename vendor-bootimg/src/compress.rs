use crate::error::{Error, Result};
use crate::utils::SliceExt;
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use lz4::Decoder as LZ4FrameDecoder;
use lzma_rust2::{LzmaReader, XzReader};
use std::borrow::Cow;
use std::io::{self, Read};

// Vendor ramdisks are usually lz4-legacy, sometimes gzip.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum CompressFormat {
    Unknown,
    Gzip,
    Lzop,
    Xz,
    Lzma,
    Bzip2,
    Lz4,
    Lz4Legacy,
}

/// Leading bytes of each format with a fixed signature, checked in order.
const SIGNATURES: &[(&[u8], CompressFormat)] = &[
    (b"\x1f\x8b", CompressFormat::Gzip),
    (b"\x1f\x9e", CompressFormat::Gzip),
    (b"\x89LZO", CompressFormat::Lzop),
    (b"\xfd7zXZ", CompressFormat::Xz),
    (b"BZh", CompressFormat::Bzip2),
    (b"\x03\x21\x4c\x18", CompressFormat::Lz4),
    (b"\x04\x22\x4d\x18", CompressFormat::Lz4),
    (b"\x02\x21\x4c\x18", CompressFormat::Lz4Legacy),
];

/// Raw `.lzma` streams carry no magic: properties byte 0x5d, a power of two
/// dictionary size and an unknown (all ones) uncompressed length.
fn looks_like_lzma(data: &[u8]) -> bool {
    data.first() == Some(&0x5d)
        && data.len() > 13
        && data.u32_at(1).is_some_and(u32::is_power_of_two)
        && data.get(5..13).is_some_and(|size| size.iter().all(|&b| b == 0xff))
}

pub fn parse_compress_format(data: &[u8]) -> CompressFormat {
    SIGNATURES
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|&(_, format)| format)
        .unwrap_or_else(|| {
            if looks_like_lzma(data) {
                CompressFormat::Lzma
            } else {
                CompressFormat::Unknown
            }
        })
}

// LZ4 legacy block archive
//
// len:  |   4   |          4            |           n           | ... |
// data: | magic | compressed block size | compressed block data | ... |
//
// Some writers append the total uncompressed size, which shows up either as
// the final word of the buffer or as a block size larger than any compressed
// block can be.

const LZ4_BLOCK_SIZE: usize = 0x800000;
const LZ4_MAGIC: u32 = 0x184c2102;

fn inflate_lz4_legacy(data: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
    let max_block = lz4::block::compress_bound(LZ4_BLOCK_SIZE).unwrap_or(LZ4_BLOCK_SIZE);
    let mut block_buf = vec![0u8; LZ4_BLOCK_SIZE];
    let mut pos = 0;
    while let Some(mut block_size) = data.u32_at(pos) {
        pos += 4;
        if block_size == LZ4_MAGIC {
            match data.u32_at(pos) {
                Some(size) => {
                    block_size = size;
                    pos += 4;
                }
                None => break,
            }
        }
        let block_size = block_size as usize;
        if block_size > max_block || pos == data.len() {
            break;
        }
        let block = data.get(pos..pos + block_size).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "truncated lz4 legacy block")
        })?;
        let len = lz4::block::decompress_to_buffer(
            block,
            Some(LZ4_BLOCK_SIZE as i32),
            &mut block_buf,
        )?;
        out.extend_from_slice(&block_buf[..len]);
        pos += block_size;
    }
    Ok(())
}

fn inflate(format: CompressFormat, data: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
    match format {
        CompressFormat::Gzip => MultiGzDecoder::new(data).read_to_end(out).map(drop),
        CompressFormat::Xz => XzReader::new(data, true).read_to_end(out).map(drop),
        CompressFormat::Lzma => LzmaReader::new_mem_limit(data, u32::MAX, None)
            .map_err(io::Error::other)?
            .read_to_end(out)
            .map(drop),
        CompressFormat::Bzip2 => BzDecoder::new(data).read_to_end(out).map(drop),
        CompressFormat::Lz4 => LZ4FrameDecoder::new(data)?.read_to_end(out).map(drop),
        CompressFormat::Lz4Legacy => inflate_lz4_legacy(data, out),
        CompressFormat::Lzop => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "lzop payloads are not supported",
        )),
        CompressFormat::Unknown => {
            out.extend_from_slice(data);
            Ok(())
        }
    }
}

/// Decompresses a whole payload if its magic names a known format.
///
/// Unknown data is returned borrowed and untouched. A failure while
/// inflating discards everything produced so far.
pub fn decompress(data: &[u8]) -> Result<(CompressFormat, Cow<'_, [u8]>)> {
    let format = parse_compress_format(data);
    if format == CompressFormat::Unknown {
        return Ok((format, Cow::Borrowed(data)));
    }
    let mut out = Vec::new();
    inflate(format, data, &mut out).map_err(|source| Error::Decompress { format, source })?;
    Ok((format, Cow::Owned(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn sniff_formats() {
        assert_eq!(parse_compress_format(b"\x1f\x8b\x08\x00"), CompressFormat::Gzip);
        assert_eq!(parse_compress_format(b"\x02\x21\x4c\x18\x00"), CompressFormat::Lz4Legacy);
        assert_eq!(parse_compress_format(b"\x04\x22\x4d\x18"), CompressFormat::Lz4);
        assert_eq!(parse_compress_format(b"BZh9"), CompressFormat::Bzip2);
        assert_eq!(parse_compress_format(b"070701"), CompressFormat::Unknown);
        assert_eq!(parse_compress_format(b""), CompressFormat::Unknown);
    }

    #[test]
    fn sniff_raw_lzma() {
        let mut header = vec![0x5d];
        header.extend_from_slice(&0x80_0000u32.to_le_bytes());
        header.extend_from_slice(&[0xff; 8]);
        header.push(0);
        assert_eq!(parse_compress_format(&header), CompressFormat::Lzma);

        // dictionary size must be a power of two
        header[1] = 1;
        assert_eq!(parse_compress_format(&header), CompressFormat::Unknown);
        header[1] = 0;

        // a known length is not what kernel ramdisk writers emit
        header[5] = 0;
        assert_eq!(parse_compress_format(&header), CompressFormat::Unknown);
        header[5] = 0xff;

        header.truncate(13);
        assert_eq!(parse_compress_format(&header), CompressFormat::Unknown);
    }

    #[test]
    fn raw_data_is_borrowed() {
        let data = b"070701plain";
        let (format, out) = decompress(data).unwrap();
        assert_eq!(format, CompressFormat::Unknown);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, data);
    }

    #[test]
    fn gzip_round_trip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello ramdisk").unwrap();
        let gz = encoder.finish().unwrap();
        let (format, out) = decompress(&gz).unwrap();
        assert_eq!(format, CompressFormat::Gzip);
        assert_eq!(&*out, b"hello ramdisk");
    }

    #[test]
    fn corrupt_gzip_is_an_error() {
        let data = b"\x1f\x8b\x08\x00garbage that is not deflate";
        match decompress(data) {
            Err(Error::Decompress { format, .. }) => assert_eq!(format, CompressFormat::Gzip),
            other => panic!("unexpected {:?}", other.map(|(f, _)| f)),
        }
    }

    #[test]
    fn lz4_legacy_blocks() {
        let first = vec![b'a'; 1000];
        let second = b"tail".to_vec();
        let mut data = LZ4_MAGIC.to_le_bytes().to_vec();
        for chunk in [&first, &second] {
            let block = lz4::block::compress(chunk, None, false).unwrap();
            data.extend_from_slice(&(block.len() as u32).to_le_bytes());
            data.extend_from_slice(&block);
        }
        // trailing uncompressed size, as written by the "lg" variant
        data.extend_from_slice(&1004u32.to_le_bytes());

        let (format, out) = decompress(&data).unwrap();
        assert_eq!(format, CompressFormat::Lz4Legacy);
        let mut expected = first.clone();
        expected.extend_from_slice(&second);
        assert_eq!(&*out, expected.as_slice());
    }
}
