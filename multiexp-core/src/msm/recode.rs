//! Signed-digit recoding of scalars into c-bit windows.

use rayon::prelude::*;

use crate::field::MsmScalar;

/// Number of c-bit windows needed to cover `scalar_bits`.
pub(crate) const fn nb_windows(scalar_bits: usize, c: usize) -> usize {
    scalar_bits.div_ceil(c)
}

/// Precomputed limb index, mask and shifts selecting the c bits of one
/// window. When c does not divide 64 a window can straddle two limbs; the
/// `*_high` fields then select the spill-over bits from the next limb.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Selector {
    pub index: usize,
    pub shift: u32,
    pub mask: u64,
    pub multi_word: bool,
    pub mask_high: u64,
    pub shift_high: u32,
}

impl Selector {
    pub fn new(window: usize, c: usize, nb_limbs: usize) -> Self {
        let low_mask = (1u64 << c) - 1;
        let bit = window * c;
        let index = bit / 64;
        let shift = (bit - index * 64) as u32;
        let mask = low_mask << shift;
        let multi_word = 64 % c != 0 && shift as usize > 64 - c && index < nb_limbs - 1;
        let (mask_high, shift_high) = if multi_word {
            let nb_bits_high = shift as usize - (64 - c);
            ((1u64 << nb_bits_high) - 1, (c - nb_bits_high) as u32)
        } else {
            (0, 0)
        };
        Self {
            index,
            shift,
            mask,
            multi_word,
            mask_high,
            shift_high,
        }
    }

    #[inline(always)]
    pub fn extract(&self, limbs: &[u64]) -> u64 {
        let mut bits = (limbs[self.index] & self.mask) >> self.shift;
        if self.multi_word {
            bits |= (limbs[self.index + 1] & self.mask_high) << self.shift_high;
        }
        bits
    }
}

/// Rewrites every scalar into signed base-2^c digits stored in the same limb
/// layout, and counts the scalars whose whole value fits in the low c bits.
///
/// For each window, a digit that reaches 2^{c-1} borrows 2^c from the next
/// window and goes negative; negative digits are encoded as
/// `(magnitude - 1) | signbit` with the sign in bit c-1 of the window, so a
/// bucket worker gets its bucket index without a decrement on the subtract
/// path. Halving the digit range halves the bucket count.
///
/// Total over any limb value; scalars are not checked against the modulus.
#[tracing::instrument(skip_all, fields(n = scalars.len(), c, nb_tasks))]
pub(crate) fn partition_scalars<S: MsmScalar>(
    scalars: &[S],
    c: usize,
    scalars_mont: bool,
    nb_tasks: usize,
) -> (Vec<S::Limbs>, usize) {
    let mut recoded = vec![S::Limbs::default(); scalars.len()];
    if scalars.is_empty() {
        return (recoded, 0);
    }

    let selectors: Vec<Selector> = (0..nb_windows(S::NB_LIMBS * 64, c))
        .map(|w| Selector::new(w, c, S::NB_LIMBS))
        .collect();
    let mask = (1u64 << c) - 1;
    let msb_window = 1u64 << (c - 1);
    let max = 1i64 << (c - 1);

    let chunk = scalars.len().div_ceil(nb_tasks);
    let small_values = recoded
        .par_chunks_mut(chunk)
        .zip(scalars.par_chunks(chunk))
        .map(|(out, src)| {
            let mut small = 0usize;
            for (dst, s) in out.iter_mut().zip(src) {
                let value = if scalars_mont {
                    s.canonical_limbs()
                } else {
                    s.raw_limbs()
                };
                let limbs = value.as_ref();
                if S::fits_one_limb(&value) {
                    if limbs[0] == 0 {
                        continue;
                    }
                    if limbs[0] & mask == limbs[0] {
                        small += 1;
                    }
                }

                let mut carry = 0i64;
                let out_limbs = dst.as_mut();
                for sel in &selectors {
                    let mut digit = carry + sel.extract(limbs) as i64;
                    carry = 0;
                    if digit == 0 {
                        continue;
                    }
                    if digit >= max {
                        digit -= 1 << c;
                        carry = 1;
                    }
                    let bits = if digit >= 0 {
                        digit as u64
                    } else {
                        (-digit - 1) as u64 | msb_window
                    };
                    out_limbs[sel.index] |= bits << sel.shift;
                    if sel.multi_word {
                        out_limbs[sel.index + 1] |= bits >> sel.shift_high;
                    }
                }
            }
            small
        })
        .sum();

    (recoded, small_values)
}
