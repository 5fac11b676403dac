//! File-level archive format on top of the range coder.
//!
//! Layout: a 12-byte header (file identifier, CRC-32 of the plaintext, and
//! plaintext byte count, all little-endian u32) followed by one compressed
//! block per 64 KiB of input. Bytes are coded with sixteen adaptive models
//! selected by the low nibble of the previous byte; the models keep their
//! learned statistics across blocks, only the coder restarts per block.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::coder::Coder;
use crate::crc;
use crate::error::{Error, Result};
use crate::model::AdaptiveModel;

/// Identifier in the first four archive bytes.
pub const FILE_ID: u32 = 0xA8BC_3B39;

/// Plaintext bytes covered by one compressed block.
pub const BLOCK_SIZE: usize = 65536;

/// Contexts: the low nibble of the previous byte picks the model.
const NUM_MODELS: usize = 16;

/// Code buffer per block. A symbol's width never drops below 2^-15, so a
/// block codes to at most 15 bits per byte plus the flush; twice the block
/// size therefore cannot overflow even on adversarial input.
const CODE_BUFFER_SIZE: usize = 2 * BLOCK_SIZE;

/// Byte counts reported after a compression or decompression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Plaintext size.
    pub data_bytes: u64,
    /// Archive size, header included.
    pub archive_bytes: u64,
}

impl Summary {
    /// Compression ratio, plaintext over archive.
    pub fn ratio(&self) -> f64 {
        if self.archive_bytes == 0 {
            return 0.0;
        }
        self.data_bytes as f64 / self.archive_bytes as f64
    }
}

fn byte_models() -> Result<Vec<AdaptiveModel>> {
    (0..NUM_MODELS).map(|_| AdaptiveModel::new(256)).collect()
}

/// Read as much of `buf` as the source can fill, tolerating short reads.
fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Compress `input` into an archive written to `output`.
///
/// The input is read twice: a first pass accumulates the byte count and
/// checksum for the header, then the stream seeks back to the start and is
/// coded block by block. An empty input produces a header and no blocks.
pub fn compress<R: Read + Seek, W: Write>(mut input: R, mut output: W) -> Result<Summary> {
    let mut data = vec![0u8; BLOCK_SIZE];

    let mut total: u64 = 0;
    let mut checksum = 0u32;
    loop {
        let nb = read_up_to(&mut input, &mut data)?;
        if nb == 0 {
            break;
        }
        total += nb as u64;
        checksum ^= crc::checksum(&data[..nb]);
    }
    let data_bytes = u32::try_from(total).map_err(|_| Error::InputTooLarge(total))?;
    input.seek(SeekFrom::Start(0))?;

    let mut header = [0u8; 12];
    header[0..4].copy_from_slice(&FILE_ID.to_le_bytes());
    header[4..8].copy_from_slice(&checksum.to_le_bytes());
    header[8..12].copy_from_slice(&data_bytes.to_le_bytes());
    output.write_all(&header)?;

    let mut models = byte_models()?;
    let mut coder = Coder::new(CODE_BUFFER_SIZE)?;
    let mut archive_bytes = header.len() as u64;
    let mut remaining = data_bytes as usize;
    while remaining > 0 {
        let nb = remaining.min(BLOCK_SIZE);
        input.read_exact(&mut data[..nb])?;

        coder.start_encoder()?;
        // Context rewinds to model 0 at each block boundary; the models
        // themselves keep their statistics for the whole file.
        let mut context = 0usize;
        for &byte in &data[..nb] {
            coder.encode(u32::from(byte), &mut models[context]);
            context = usize::from(byte) & (NUM_MODELS - 1);
        }
        archive_bytes += coder.write_block(&mut output)? as u64;

        remaining -= nb;
    }
    output.flush()?;

    Ok(Summary {
        data_bytes: u64::from(data_bytes),
        archive_bytes,
    })
}

/// Decompress an archive from `input`, writing the plaintext to `output`.
///
/// The file identifier is checked before any block is read; the checksum is
/// verified after the last block, so corruption surfaces here rather than
/// inside the coder.
pub fn decompress<R: Read, W: Write>(mut input: R, mut output: W) -> Result<Summary> {
    let mut header = [0u8; 12];
    input.read_exact(&mut header)?;
    let file_id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let data_bytes = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if file_id != FILE_ID {
        return Err(Error::BadFileId(file_id));
    }

    let mut models = byte_models()?;
    let mut coder = Coder::new(CODE_BUFFER_SIZE)?;
    let mut data = vec![0u8; BLOCK_SIZE];
    let mut archive_bytes = header.len() as u64;
    let mut checksum = 0u32;
    let mut remaining = data_bytes as usize;
    while remaining > 0 {
        archive_bytes += coder.read_block(&mut input)? as u64;

        let nb = remaining.min(BLOCK_SIZE);
        let mut context = 0usize;
        for slot in &mut data[..nb] {
            let symbol = coder.decode(&mut models[context]);
            *slot = symbol as u8;
            context = symbol as usize & (NUM_MODELS - 1);
        }
        coder.stop_decoder()?;

        checksum ^= crc::checksum(&data[..nb]);
        output.write_all(&data[..nb])?;
        remaining -= nb;
    }
    output.flush()?;

    if checksum != expected {
        return Err(Error::ChecksumMismatch {
            expected,
            found: checksum,
        });
    }

    Ok(Summary {
        data_bytes: u64::from(data_bytes),
        archive_bytes,
    })
}
