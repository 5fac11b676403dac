//! Probability models for the range coder.
//!
//! Two kinds of model drive the coder: [`StaticModel`] carries a fixed
//! distribution given up front, [`AdaptiveModel`] learns symbol frequencies as
//! data is coded. Both expose the same thing to the coder: a cumulative
//! distribution in 15-bit fixed point, plus (for alphabets above 16 symbols) a
//! coarse lookup table that seeds the decoder's bisection search.
//!
//! The adaptive model retrains on a growing schedule rather than per symbol:
//! rebuilding the cumulative table costs O(N), so the rebuild interval starts
//! near N/2 and stretches by 5/4 after each update, capped at `(N + 6) * 8`.
//! When the total count crosses [`MAX_COUNT`] all counts are halved (rounding
//! up, so no symbol ever reaches zero probability).

use crate::error::{Error, Result};

/// Fractional bits of the cumulative distribution. Probabilities are
/// fixed-point with `1 << LENGTH_SHIFT` as the implicit total mass.
pub const LENGTH_SHIFT: u32 = 15;

/// Retotal threshold for adaptive models: counts are halved once their sum
/// would exceed this.
pub const MAX_COUNT: u32 = 1 << LENGTH_SHIFT;

const MIN_ALPHABET: u32 = 2;
const MAX_ALPHABET: u32 = 1 << 11;

/// Cumulative distribution layout shared by both model kinds.
///
/// `distribution[k]` is the 15-bit fixed-point mass strictly below symbol `k`;
/// index `N` is never stored, the coder special-cases the last symbol instead.
/// Alphabets above 16 symbols also carry a decoder lookup table mapping coarse
/// code-value slots to symbol-index bounds for the bisection search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    pub(crate) data_symbols: u32,
    pub(crate) last_symbol: u32,
    pub(crate) distribution: Vec<u32>,
    /// Empty for alphabets of 16 symbols or fewer.
    pub(crate) decoder_table: Vec<u32>,
    pub(crate) table_size: u32,
    pub(crate) table_shift: u32,
}

impl Alphabet {
    fn new(data_symbols: u32) -> Result<Self> {
        if !(MIN_ALPHABET..=MAX_ALPHABET).contains(&data_symbols) {
            return Err(Error::InvalidAlphabetSize(data_symbols));
        }

        let (table_size, table_shift, decoder_table) = if data_symbols > 16 {
            let mut table_bits = 3;
            while data_symbols > 1 << (table_bits + 2) {
                table_bits += 1;
            }
            let table_size = (1u32 << table_bits) + 4;
            // The fill below writes slots 0 through table_size + 1.
            let decoder_table = vec![0u32; table_size as usize + 2];
            (table_size, LENGTH_SHIFT - table_bits, decoder_table)
        } else {
            (0, 0, Vec::new())
        };

        Ok(Self {
            data_symbols,
            last_symbol: data_symbols - 1,
            distribution: vec![0; data_symbols as usize],
            decoder_table,
            table_size,
            table_shift,
        })
    }

    /// Rebuild the decoder lookup table from the current distribution.
    ///
    /// Each slot gets the highest symbol whose cumulative entry still lies
    /// below the slot boundary; trailing slots point at the last symbol.
    fn rebuild_decoder_table(&mut self) {
        if self.decoder_table.is_empty() {
            return;
        }
        let mut slot = 0usize;
        for k in 1..self.data_symbols as usize {
            let w = (self.distribution[k] >> self.table_shift) as usize;
            while slot < w {
                slot += 1;
                self.decoder_table[slot] = (k - 1) as u32;
            }
        }
        self.decoder_table[0] = 0;
        while slot <= self.table_size as usize {
            slot += 1;
            self.decoder_table[slot] = self.last_symbol;
        }
    }
}

/// Contract between a probability model and the [`Coder`](crate::Coder).
///
/// The coder reads the model's cumulative distribution to subdivide its
/// interval, then reports the coded symbol back so adaptive models can
/// retrain. Encoder and decoder drive their models through the same calls, so
/// equal call sequences keep both sides' model state in lockstep without any
/// transmitted side-channel.
pub trait Model {
    /// Number of symbols in the model's alphabet.
    fn symbols(&self) -> u32;

    /// Distribution the coder subdivides its interval with.
    #[doc(hidden)]
    fn alphabet(&self) -> &Alphabet;

    /// Hook invoked after each coded symbol. `from_encoder` suppresses the
    /// decoder-table rebuild, which only the decode side needs.
    #[doc(hidden)]
    fn symbol_coded(&mut self, symbol: u32, from_encoder: bool);
}

/// Immutable model over a fixed symbol distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticModel {
    pub(crate) alphabet: Alphabet,
}

impl StaticModel {
    /// Build a model where all `data_symbols` symbols are equally likely.
    pub fn uniform(data_symbols: u32) -> Result<Self> {
        Self::build(data_symbols, None)
    }

    /// Build a model from explicit symbol probabilities, one per symbol.
    ///
    /// Each probability must lie in `[0.0001, 0.9999]` and the vector must sum
    /// to 1 within a tolerance of 0.0001.
    pub fn with_probabilities(probabilities: &[f64]) -> Result<Self> {
        Self::build(probabilities.len() as u32, Some(probabilities))
    }

    fn build(data_symbols: u32, probabilities: Option<&[f64]>) -> Result<Self> {
        let mut alphabet = Alphabet::new(data_symbols)?;
        let uniform = 1.0 / f64::from(data_symbols);
        let one = f64::from(1u32 << LENGTH_SHIFT);

        // Running double-precision sum keeps the quantization error of each
        // entry below one fixed-point unit.
        let mut sum = 0.0f64;
        for k in 0..data_symbols as usize {
            let p = probabilities.map_or(uniform, |ps| ps[k]);
            if !(0.0001..=0.9999).contains(&p) {
                return Err(Error::InvalidProbability(p));
            }
            alphabet.distribution[k] = (sum * one) as u32;
            sum += p;
        }
        if !(0.9999..=1.0001).contains(&sum) {
            return Err(Error::InvalidDistribution(sum));
        }

        alphabet.rebuild_decoder_table();
        Ok(Self { alphabet })
    }
}

impl Model for StaticModel {
    fn symbols(&self) -> u32 {
        self.alphabet.data_symbols
    }

    fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    fn symbol_coded(&mut self, _symbol: u32, _from_encoder: bool) {}
}

/// Adaptive model that learns symbol frequencies as data is coded.
#[derive(Debug, Clone)]
pub struct AdaptiveModel {
    pub(crate) alphabet: Alphabet,
    pub(crate) symbol_count: Vec<u32>,
    pub(crate) total_count: u32,
    pub(crate) update_cycle: u32,
    pub(crate) symbols_until_update: u32,
}

impl AdaptiveModel {
    /// Build an adaptive model starting from a uniform distribution.
    pub fn new(data_symbols: u32) -> Result<Self> {
        let alphabet = Alphabet::new(data_symbols)?;
        let mut model = Self {
            symbol_count: vec![1; data_symbols as usize],
            alphabet,
            total_count: 0,
            update_cycle: 0,
            symbols_until_update: 0,
        };
        model.reset();
        Ok(model)
    }

    /// Restore the uniform distribution, discarding learned statistics.
    pub fn reset(&mut self) {
        let n = self.alphabet.data_symbols;
        self.total_count = 0;
        self.update_cycle = n;
        self.symbol_count.fill(1);
        self.update(false);
        self.update_cycle = (n + 6) >> 1;
        self.symbols_until_update = self.update_cycle;
    }

    fn update(&mut self, from_encoder: bool) {
        // Halve counts, rounding up, once the total crosses the threshold.
        // Rounding up keeps every symbol at a nonzero count.
        self.total_count += self.update_cycle;
        if self.total_count > MAX_COUNT {
            self.total_count = 0;
            for count in &mut self.symbol_count {
                *count = (*count + 1) >> 1;
                self.total_count += *count;
            }
        }

        // Cumulative counts scaled to 15-bit fixed point, biased low so the
        // widths stay within the implicit total mass.
        let scale = 0x8000_0000u32 / self.total_count;
        let mut sum = 0u32;
        for k in 0..self.alphabet.data_symbols as usize {
            self.alphabet.distribution[k] = (scale * sum) >> (31 - LENGTH_SHIFT);
            sum += self.symbol_count[k];
        }

        // Only the decode side reads the lookup table.
        if !from_encoder {
            self.alphabet.rebuild_decoder_table();
        }

        self.update_cycle = (5 * self.update_cycle) >> 2;
        let max_cycle = (self.alphabet.data_symbols + 6) << 3;
        if self.update_cycle > max_cycle {
            self.update_cycle = max_cycle;
        }
        self.symbols_until_update = self.update_cycle;
    }
}

impl Model for AdaptiveModel {
    fn symbols(&self) -> u32 {
        self.alphabet.data_symbols
    }

    fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    fn symbol_coded(&mut self, symbol: u32, from_encoder: bool) {
        self.symbol_count[symbol as usize] += 1;
        self.symbols_until_update -= 1;
        if self.symbols_until_update == 0 {
            self.update(from_encoder);
        }
    }
}
