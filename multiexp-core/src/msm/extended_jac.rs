//! Extended-Jacobian bucket worker: the backend of choice for small window
//! widths, where bucket accumulation stays cache-resident and mixed
//! extended-Jacobian formulas beat anything inversion-based.

use ark_ec::short_weierstrass::{Affine, SWCurveConfig};

use super::recode::Selector;
use crate::curve::ExtendedPoint;
use crate::field::MsmScalar;

/// Accumulates one window's digits into `buckets` and reduces them to the
/// window subtotal.
///
/// `buckets` has `2^{width-1}` entries, all at infinity on entry; `width` is
/// the main window width c except for the top window, which only ever sees
/// digits the modulus can produce and gets a correspondingly smaller array.
pub(crate) fn process_window<P>(
    window: usize,
    c: usize,
    buckets: &mut [ExtendedPoint<P>],
    points: &[Affine<P>],
    digits: &[<P::ScalarField as MsmScalar>::Limbs],
) -> ExtendedPoint<P>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    let msb_window = 1u64 << (c - 1);
    let selector = Selector::new(window, c, <P::ScalarField as MsmScalar>::NB_LIMBS);

    for (point, limbs) in points.iter().zip(digits) {
        let bits = selector.extract(limbs.as_ref());
        if bits == 0 {
            continue;
        }
        if bits & msb_window == 0 {
            buckets[(bits - 1) as usize].add_mixed(point);
        } else {
            buckets[(bits & !msb_window) as usize].sub_mixed(point);
        }
    }

    reduce_buckets(buckets)
}

/// Weighted bucket sum Σ k·bucket[k-1] with the running-sum trick:
/// scanning from the heaviest bucket down, each bucket enters the running
/// sum once and the running sum enters the total once, so bucket k is
/// counted exactly k times using 2·|buckets|-2 additions.
pub(crate) fn reduce_buckets<P: SWCurveConfig>(
    buckets: &[ExtendedPoint<P>],
) -> ExtendedPoint<P> {
    let mut running = ExtendedPoint::<P>::INFINITY;
    let mut total = ExtendedPoint::<P>::INFINITY;
    for bucket in buckets.iter().rev() {
        if !bucket.is_infinity() {
            running.add(bucket);
        }
        total.add(&running);
    }
    total
}
