//! Batched affine addition sharing a single field inversion.

use ark_ec::short_weierstrass::{Affine, SWCurveConfig};
use ark_ff::{batch_inversion, Field};

/// Computes `buckets[ids[j]] += points[j]` for every j, in affine
/// coordinates, with one shared inversion across the whole batch.
///
/// Requirements, enforced by the batch scheduler:
/// - `ids` are pairwise distinct, so the writes never alias;
/// - no pair is degenerate: both sides finite, distinct x coordinates.
///
/// `inverses` is caller-owned scratch so repeated flushes reuse the
/// allocation.
pub fn batch_add_assign<P: SWCurveConfig>(
    buckets: &mut [Affine<P>],
    ids: &[u32],
    points: &[Affine<P>],
    inverses: &mut Vec<P::BaseField>,
) {
    debug_assert_eq!(ids.len(), points.len());

    inverses.clear();
    inverses.extend(
        ids.iter()
            .zip(points)
            .map(|(&id, p)| p.x - buckets[id as usize].x),
    );
    batch_inversion(inverses);

    for ((&id, p), inv) in ids.iter().zip(points).zip(inverses.iter()) {
        let bucket = &mut buckets[id as usize];
        let lambda = (p.y - bucket.y) * inv;
        let x3 = lambda.square() - bucket.x - p.x;
        bucket.y = lambda * (bucket.x - x3) - bucket.y;
        bucket.x = x3;
    }
}
