//! Range coder: the encoder/decoder state machine.
//!
//! The coder owns a 32-bit interval `(base, length)` (plus the code `value` on
//! the decode side) and a byte buffer holding one compressed block. Encoding
//! subdivides the interval by the model's cumulative distribution; whenever
//! `length` falls below [`MIN_LENGTH`] the top byte of `base` is streamed out
//! and the interval is scaled by 256. A wraparound of `base` means a carry out
//! of the already-streamed prefix, which is propagated backward through the
//! buffer. Decoding mirrors the arithmetic exactly, so encoder and decoder
//! stay bit-for-bit in agreement.
//!
//! The carry walk is the reason the buffer cannot be streamed to a sink while
//! encoding: earlier output bytes must stay mutable until [`Coder::stop_encoder`]
//! seals the block.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::model::{Model, LENGTH_SHIFT};

/// Renormalization threshold: the interval length never drops below this
/// while a coding session is active.
pub const MIN_LENGTH: u32 = 0x0100_0000;

/// Initial interval length.
pub const MAX_LENGTH: u32 = 0xFFFF_FFFF;

const MIN_BUFFER: usize = 16;
const MAX_BUFFER: usize = 0x0100_0000;

/// Bytes of spill room past the configured capacity. Renormalization during
/// the final flush may run a few bytes past the last accounted position; the
/// overflow check in `stop_encoder` still enforces the configured capacity.
const RENORM_SLACK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Encoding,
    Decoding,
}

/// Arithmetic encoder/decoder over a single code buffer.
///
/// A coder runs one encode *or* decode session at a time: `start_*`, a run of
/// [`encode`](Coder::encode) or [`decode`](Coder::decode) calls, then
/// `stop_*`. Models are passed per call and may be swapped freely between
/// calls, as long as the decode side replays the same model sequence.
#[derive(Debug)]
pub struct Coder {
    buffer: Vec<u8>,
    buffer_size: usize,
    ptr: usize,
    base: u32,
    value: u32,
    length: u32,
    mode: Mode,
}

impl Coder {
    /// Create a coder with an owned code buffer of `max_encoded_bytes`
    /// capacity (16 bytes to 16 MiB).
    pub fn new(max_encoded_bytes: usize) -> Result<Self> {
        if !(MIN_BUFFER..=MAX_BUFFER).contains(&max_encoded_bytes) {
            return Err(Error::InvalidBufferSize(max_encoded_bytes));
        }
        Ok(Self {
            buffer: vec![0; max_encoded_bytes + RENORM_SLACK],
            buffer_size: max_encoded_bytes,
            ptr: 0,
            base: 0,
            value: 0,
            length: 0,
            mode: Mode::Idle,
        })
    }

    /// Create a coder that reuses a caller-provided buffer. The buffer's
    /// length becomes the capacity; the vector is grown by the spill slack.
    pub fn with_buffer(mut buffer: Vec<u8>) -> Result<Self> {
        let buffer_size = buffer.len();
        if !(MIN_BUFFER..=MAX_BUFFER).contains(&buffer_size) {
            return Err(Error::InvalidBufferSize(buffer_size));
        }
        buffer.resize(buffer_size + RENORM_SLACK, 0);
        Ok(Self {
            buffer,
            buffer_size,
            ptr: 0,
            base: 0,
            value: 0,
            length: 0,
            mode: Mode::Idle,
        })
    }

    /// Configured code buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer_size
    }

    /// Begin an encode session.
    pub fn start_encoder(&mut self) -> Result<()> {
        if self.mode != Mode::Idle {
            return Err(Error::CoderState("cannot start encoder"));
        }
        self.mode = Mode::Encoding;
        self.base = 0;
        self.length = MAX_LENGTH;
        self.ptr = 0;
        Ok(())
    }

    /// Begin a decode session over the current buffer contents.
    pub fn start_decoder(&mut self) -> Result<()> {
        if self.mode != Mode::Idle {
            return Err(Error::CoderState("cannot start decoder"));
        }
        self.mode = Mode::Decoding;
        self.length = MAX_LENGTH;
        self.value = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]);
        // Renormalization pre-increments, so the next byte read is index 4.
        self.ptr = 3;
        Ok(())
    }

    /// Encode one symbol under the given model.
    pub fn encode<M: Model>(&mut self, symbol: u32, model: &mut M) {
        debug_assert_eq!(self.mode, Mode::Encoding);
        let alphabet = model.alphabet();
        debug_assert!(symbol < alphabet.data_symbols);

        let initial_base = self.base;
        if symbol == alphabet.last_symbol {
            // Top symbol: its width is whatever mass the others left over, so
            // one product suffices.
            let x = alphabet.distribution[symbol as usize] * (self.length >> LENGTH_SHIFT);
            self.base = self.base.wrapping_add(x);
            self.length -= x;
        } else {
            self.length >>= LENGTH_SHIFT;
            let x = alphabet.distribution[symbol as usize] * self.length;
            self.base = self.base.wrapping_add(x);
            self.length = alphabet.distribution[symbol as usize + 1] * self.length - x;
        }

        if initial_base > self.base {
            // base wrapped past 2^32: a deferred +1 on the streamed prefix.
            self.propagate_carry();
        }
        if self.length < MIN_LENGTH {
            self.renorm_encoder();
        }

        model.symbol_coded(symbol, true);
    }

    /// Decode one symbol under the given model.
    pub fn decode<M: Model>(&mut self, model: &mut M) -> u32 {
        debug_assert_eq!(self.mode, Mode::Decoding);
        let alphabet = model.alphabet();

        // `y` starts as the full span; it stays there when the top symbol is
        // decoded, since index N of the distribution is not stored.
        let mut y = self.length;
        let mut x;
        let symbol;

        if !alphabet.decoder_table.is_empty() {
            self.length >>= LENGTH_SHIFT;
            let dv = self.value / self.length;
            let t = (dv >> alphabet.table_shift) as usize;

            // The table brackets the symbol; bisection finishes the search.
            let mut lo = alphabet.decoder_table[t];
            let mut hi = alphabet.decoder_table[t + 1] + 1;
            while hi > lo + 1 {
                let mid = (lo + hi) >> 1;
                if alphabet.distribution[mid as usize] > dv {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            symbol = lo;
            x = alphabet.distribution[symbol as usize] * self.length;
            if symbol != alphabet.last_symbol {
                y = alphabet.distribution[symbol as usize + 1] * self.length;
            }
        } else {
            // Small alphabet: plain bisection over code-value products.
            x = 0;
            self.length >>= LENGTH_SHIFT;
            let mut lo = 0u32;
            let mut hi = alphabet.data_symbols;
            let mut mid = hi >> 1;
            loop {
                let z = self.length * alphabet.distribution[mid as usize];
                if z > self.value {
                    hi = mid;
                    y = z;
                } else {
                    lo = mid;
                    x = z;
                }
                mid = (lo + hi) >> 1;
                if mid == lo {
                    break;
                }
            }
            symbol = lo;
        }

        self.value -= x;
        self.length = y - x;
        if self.length < MIN_LENGTH {
            self.renorm_decoder();
        }

        model.symbol_coded(symbol, false);
        symbol
    }

    /// Finish an encode session, flushing the interval so the decoder can
    /// converge, and return the number of meaningful buffer bytes.
    pub fn stop_encoder(&mut self) -> Result<usize> {
        if self.mode != Mode::Encoding {
            return Err(Error::CoderState("invalid to stop encoder"));
        }
        self.mode = Mode::Idle;

        let initial_base = self.base;
        if self.length > 2 * MIN_LENGTH {
            // One more output byte is enough precision.
            self.base = self.base.wrapping_add(MIN_LENGTH);
            self.length = MIN_LENGTH >> 1;
        } else {
            // Tight interval: spend two more bytes.
            self.base = self.base.wrapping_add(MIN_LENGTH >> 1);
            self.length = MIN_LENGTH >> 9;
        }
        if initial_base > self.base {
            self.propagate_carry();
        }
        self.renorm_encoder();

        let code_bytes = self.ptr;
        if code_bytes > self.buffer_size {
            return Err(Error::BufferOverflow {
                code_bytes,
                capacity: self.buffer_size,
            });
        }
        Ok(code_bytes)
    }

    /// Finish a decode session. No flushing is needed on this side.
    pub fn stop_decoder(&mut self) -> Result<()> {
        if self.mode != Mode::Decoding {
            return Err(Error::CoderState("invalid to stop decoder"));
        }
        self.mode = Mode::Idle;
        Ok(())
    }

    /// Stop the encoder and write the block to `sink`: the code byte count as
    /// a base-128 varint (low 7 bits first, 0x80 = continuation), then the
    /// code bytes. Returns the total bytes written.
    pub fn write_block<W: Write>(&mut self, sink: &mut W) -> Result<usize> {
        let code_bytes = self.stop_encoder()?;

        let mut header = [0u8; 4];
        let mut header_bytes = 0;
        let mut nb = code_bytes;
        loop {
            let mut byte = (nb & 0x7F) as u8;
            nb >>= 7;
            if nb > 0 {
                byte |= 0x80;
            }
            header[header_bytes] = byte;
            header_bytes += 1;
            if nb == 0 {
                break;
            }
        }

        sink.write_all(&header[..header_bytes])?;
        sink.write_all(&self.buffer[..code_bytes])?;
        Ok(header_bytes + code_bytes)
    }

    /// Read a block from `source` into the code buffer and start the decoder.
    /// Returns the total bytes consumed.
    pub fn read_block<R: Read>(&mut self, source: &mut R) -> Result<usize> {
        if self.mode != Mode::Idle {
            return Err(Error::CoderState("cannot read block while coding"));
        }

        let mut code_bytes = 0usize;
        let mut header_bytes = 0;
        let mut shift = 0u32;
        loop {
            let mut byte = [0u8; 1];
            source.read_exact(&mut byte)?;
            header_bytes += 1;
            code_bytes |= usize::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 21 {
                // Any legal block size fits in four varint bytes.
                return Err(Error::MalformedBlockHeader);
            }
        }

        if code_bytes > self.buffer_size {
            return Err(Error::BlockTooLarge {
                code_bytes,
                capacity: self.buffer_size,
            });
        }
        source.read_exact(&mut self.buffer[..code_bytes])?;

        self.start_decoder()?;
        Ok(header_bytes + code_bytes)
    }

    /// Apply a deferred carry to the streamed prefix: zero the trailing run of
    /// 0xFF bytes, then increment the byte before it.
    ///
    /// The interval start cannot wrap before at least one byte has been
    /// emitted, so the walk always finds a byte to increment.
    fn propagate_carry(&mut self) {
        let mut p = self.ptr - 1;
        while self.buffer[p] == 0xFF {
            self.buffer[p] = 0;
            p -= 1;
        }
        self.buffer[p] += 1;
    }

    fn renorm_encoder(&mut self) {
        loop {
            self.buffer[self.ptr] = (self.base >> 24) as u8;
            self.ptr += 1;
            self.base <<= 8;
            self.length <<= 8;
            if self.length >= MIN_LENGTH {
                break;
            }
        }
    }

    fn renorm_decoder(&mut self) {
        loop {
            self.ptr += 1;
            self.value = (self.value << 8) | u32::from(self.buffer[self.ptr]);
            self.length <<= 8;
            if self.length >= MIN_LENGTH {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdaptiveModel, StaticModel};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn roundtrip_static(model_probs: &[f64], symbols: &[u32]) -> Vec<u32> {
        let mut enc_model = StaticModel::with_probabilities(model_probs).unwrap();
        let mut coder = Coder::new(65536).unwrap();
        coder.start_encoder().unwrap();
        for &s in symbols {
            coder.encode(s, &mut enc_model);
        }
        let mut block = Vec::new();
        coder.write_block(&mut block).unwrap();

        let mut dec_model = StaticModel::with_probabilities(model_probs).unwrap();
        coder.read_block(&mut Cursor::new(block)).unwrap();
        let decoded = (0..symbols.len()).map(|_| coder.decode(&mut dec_model)).collect();
        coder.stop_decoder().unwrap();
        decoded
    }

    #[test]
    fn test_buffer_size_limits() {
        assert!(matches!(Coder::new(15), Err(Error::InvalidBufferSize(15))));
        assert!(Coder::new(16).is_ok());
        assert!(Coder::new(0x0100_0000).is_ok());
        assert!(Coder::new(0x0100_0001).is_err());
        assert!(Coder::with_buffer(vec![0; 8]).is_err());
        assert_eq!(Coder::with_buffer(vec![0; 64]).unwrap().capacity(), 64);
    }

    #[test]
    fn test_mode_transitions() {
        let mut coder = Coder::new(1024).unwrap();
        assert!(matches!(coder.stop_decoder(), Err(Error::CoderState(_))));
        assert!(matches!(coder.stop_encoder(), Err(Error::CoderState(_))));

        coder.start_encoder().unwrap();
        assert!(matches!(coder.start_encoder(), Err(Error::CoderState(_))));
        assert!(matches!(coder.start_decoder(), Err(Error::CoderState(_))));
        assert!(matches!(coder.stop_decoder(), Err(Error::CoderState(_))));

        coder.stop_encoder().unwrap();
        assert!(coder.start_encoder().is_ok());
    }

    #[test]
    fn test_static_three_symbol_sequence() {
        // 6 symbols at these widths shrink the interval past the
        // renormalization threshold, so at least one byte streams out early.
        let decoded = roundtrip_static(&[0.5, 0.3, 0.2], &[0, 1, 2, 0, 1, 2]);
        assert_eq!(decoded, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_renormalizes_before_flush() {
        let mut model = StaticModel::with_probabilities(&[0.5, 0.3, 0.2]).unwrap();
        let mut coder = Coder::new(65536).unwrap();
        coder.start_encoder().unwrap();
        for &s in &[0u32, 1, 2, 0, 1, 2] {
            coder.encode(s, &mut model);
        }
        assert!(coder.ptr >= 1);
    }

    #[test]
    fn test_skewed_static_roundtrip() {
        // Heavy skew keeps the interval wide for long runs, which exercises
        // the carry path once the base accumulates near the wrap point.
        let symbols: Vec<u32> = (0..20_000).map(|i| if i % 97 == 0 { 1 } else { 0 }).collect();
        let decoded = roundtrip_static(&[0.95, 0.04, 0.01], &symbols);
        assert_eq!(decoded, symbols);
    }

    #[test]
    fn test_small_alphabet_uses_pure_bisection() {
        let mut enc_model = StaticModel::uniform(5).unwrap();
        assert!(enc_model.alphabet.decoder_table.is_empty());
        let symbols: Vec<u32> = (0..500).map(|i| i % 5).collect();

        let mut coder = Coder::new(4096).unwrap();
        coder.start_encoder().unwrap();
        for &s in &symbols {
            coder.encode(s, &mut enc_model);
        }
        let mut block = Vec::new();
        coder.write_block(&mut block).unwrap();

        let mut dec_model = StaticModel::uniform(5).unwrap();
        coder.read_block(&mut Cursor::new(block)).unwrap();
        for &expected in &symbols {
            assert_eq!(coder.decode(&mut dec_model), expected);
        }
        coder.stop_decoder().unwrap();
    }

    #[test]
    fn test_adaptive_models_stay_in_lockstep() {
        let symbols: Vec<u32> = (0..4000u32).map(|i| (i * i) % 200).collect();

        let mut enc_model = AdaptiveModel::new(200).unwrap();
        let mut coder = Coder::new(65536).unwrap();
        coder.start_encoder().unwrap();
        for &s in &symbols {
            coder.encode(s, &mut enc_model);
        }
        let mut block = Vec::new();
        coder.write_block(&mut block).unwrap();

        let mut dec_model = AdaptiveModel::new(200).unwrap();
        coder.read_block(&mut Cursor::new(block)).unwrap();
        for &expected in &symbols {
            assert_eq!(coder.decode(&mut dec_model), expected);
        }
        coder.stop_decoder().unwrap();

        // The decoder's model must have tracked the encoder's exactly. The
        // decoder lookup table is excluded: the encode side never rebuilds it.
        assert_eq!(enc_model.symbol_count, dec_model.symbol_count);
        assert_eq!(enc_model.total_count, dec_model.total_count);
        assert_eq!(enc_model.update_cycle, dec_model.update_cycle);
        assert_eq!(enc_model.symbols_until_update, dec_model.symbols_until_update);
        assert_eq!(
            enc_model.alphabet.distribution,
            dec_model.alphabet.distribution
        );
    }

    #[test]
    fn test_interval_invariant_holds_throughout() {
        let symbols: Vec<u32> = (0..2000u32).map(|i| (i * 7) % 31).collect();
        let mut model = AdaptiveModel::new(31).unwrap();
        let mut coder = Coder::new(65536).unwrap();

        coder.start_encoder().unwrap();
        assert_eq!(coder.length, MAX_LENGTH);
        for &s in &symbols {
            coder.encode(s, &mut model);
            assert!(coder.length >= MIN_LENGTH);
        }
        let mut block = Vec::new();
        coder.write_block(&mut block).unwrap();

        let mut dec_model = AdaptiveModel::new(31).unwrap();
        coder.read_block(&mut Cursor::new(block)).unwrap();
        assert_eq!(coder.length, MAX_LENGTH);
        for _ in 0..symbols.len() {
            coder.decode(&mut dec_model);
            assert!(coder.length >= MIN_LENGTH);
        }
        coder.stop_decoder().unwrap();
    }

    #[test]
    fn test_empty_session_block_roundtrips() {
        let mut coder = Coder::new(64).unwrap();
        coder.start_encoder().unwrap();
        let mut block = Vec::new();
        let written = coder.write_block(&mut block).unwrap();
        assert_eq!(written, block.len());

        coder.read_block(&mut Cursor::new(block)).unwrap();
        coder.stop_decoder().unwrap();
    }

    #[test]
    fn test_read_block_rejects_oversized_length() {
        let mut coder = Coder::new(16).unwrap();
        // Varint 100 followed by nothing: declared length exceeds capacity.
        let result = coder.read_block(&mut Cursor::new(vec![100u8]));
        assert!(matches!(result, Err(Error::BlockTooLarge { .. })));
    }

    #[test]
    fn test_read_block_rejects_runaway_varint() {
        let mut coder = Coder::new(1024).unwrap();
        let result = coder.read_block(&mut Cursor::new(vec![0x80u8; 8]));
        assert!(matches!(result, Err(Error::MalformedBlockHeader)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_adaptive_roundtrip(
            n in 2u32..512,
            raw in prop::collection::vec(0u32..512, 1..400),
        ) {
            let symbols: Vec<u32> = raw.iter().map(|&s| s % n).collect();

            let mut enc_model = AdaptiveModel::new(n).unwrap();
            let mut coder = Coder::new(65536).unwrap();
            coder.start_encoder().unwrap();
            for &s in &symbols {
                coder.encode(s, &mut enc_model);
            }
            let mut block = Vec::new();
            coder.write_block(&mut block).unwrap();

            let mut dec_model = AdaptiveModel::new(n).unwrap();
            coder.read_block(&mut Cursor::new(block)).unwrap();
            for &expected in &symbols {
                prop_assert_eq!(coder.decode(&mut dec_model), expected);
            }
            coder.stop_decoder().unwrap();
        }

        #[test]
        fn prop_encoding_is_deterministic(
            raw in prop::collection::vec(0u32..64, 1..300),
        ) {
            let encode = || {
                let mut model = AdaptiveModel::new(64).unwrap();
                let mut coder = Coder::new(65536).unwrap();
                coder.start_encoder().unwrap();
                for &s in &raw {
                    coder.encode(s, &mut model);
                }
                let mut block = Vec::new();
                coder.write_block(&mut block).unwrap();
                block
            };
            prop_assert_eq!(encode(), encode());
        }
    }
}
