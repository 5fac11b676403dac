//! # Range-Coded Arithmetic Entropy Codec
//!
//! *Near-entropy compression over arbitrary finite alphabets, with static and
//! adaptive probability models.*
//!
//! ## Intuition First
//!
//! Think of the message as an address. Every possible sequence of symbols owns
//! a sub-interval of `[0, 1)`, with more probable sequences owning wider
//! intervals; transmitting the message means transmitting enough digits to
//! single out its interval. Wide intervals need few digits, narrow ones need
//! many: that is the entire compression effect.
//!
//! A range coder is the integer-arithmetic realization of this idea: the
//! interval is a pair of 32-bit numbers `(base, length)`, each coded symbol
//! shrinks it proportionally to the symbol's probability, and whenever the
//! length drops below a threshold the leading byte (which can no longer
//! change, except for a possible carry) is streamed out and the interval is
//! rescaled by 256.
//!
//! ## Historical Context
//!
//! ```text
//! 1948  Shannon         Entropy as the fundamental limit
//! 1976  Rissanen/Pasco  Arithmetic coding: reaching the limit
//! 1979  Martin          Range coding: byte-wise renormalization
//! 1987  Witten et al.   The practical adaptive coder (CACM)
//! 2004  Said            Fast table-driven implementations
//! ```
//!
//! ## Implementation Notes
//!
//! - Probabilities are 15-bit fixed point ([`model::LENGTH_SHIFT`]): all coder
//!   math stays within `u32`, since a shifted length (17 bits at most) times a
//!   distribution entry (15 bits at most) cannot overflow.
//! - Carries out of `base` are propagated backward through the already-emitted
//!   bytes, so a block is held in memory until it is sealed; see
//!   [`Coder::write_block`].
//! - Alphabets above 16 symbols carry a lookup table that brackets the decoded
//!   symbol before a short bisection; smaller alphabets bisect directly.
//! - [`AdaptiveModel`] counts are halved (rounding up) when their total hits
//!   2^15, so no symbol ever decays to zero probability.
//! - Encoder and decoder mutate their models through identical call sequences
//!   and therefore stay in lockstep with no side-channel state.
//!
//! ## Complexity
//!
//! - **Time**: O(log N) per symbol for the bisection search, O(1) amortized
//!   renormalization; adaptive rebuilds are O(N) on a geometrically growing
//!   schedule, so O(1) amortized per symbol.
//! - **Space**: O(N) per model plus the code buffer.
//!
//! ## Failure Modes
//!
//! 1. **Mismatched models.** The decoder must replay the exact model sequence
//!    the encoder used; any divergence silently produces garbage, caught only
//!    by the archive layer's checksum.
//! 2. **Interleaved sessions.** One coder runs one encode *or* decode session
//!    at a time; mode misuse is rejected at `start_*`/`stop_*`.
//!
//! ## References
//!
//! - Martin, G. N. N. (1979). "Range encoding: an algorithm for removing
//!   redundancy from a digitised message."
//! - Witten, I. H., Neal, R. M., Cleary, J. G. (1987). "Arithmetic coding for
//!   data compression."
//! - Said, A. (2004). "Introduction to arithmetic coding: theory and
//!   practice."

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod coder;
pub mod crc;
pub mod error;
pub mod model;

pub use archive::{compress, decompress, Summary};
pub use coder::Coder;
pub use error::{Error, Result};
pub use model::{AdaptiveModel, Model, StaticModel};
