//! Batch-affine bucket worker for large window widths.
//!
//! Affine addition costs a field inversion, but Montgomery's trick shares
//! one inversion across many independent additions, bringing the amortised
//! cost below extended-Jacobian mixed addition once bucket arrays grow past
//! the cache-friendly sizes. The catch is that two pending additions into
//! the same bucket are not independent; the scheduler below stages at most
//! one operation per bucket and parks conflicting operations in a queue
//! drained between flushes.

use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::CurveGroup;
use ark_ff::AdditiveGroup;

use super::recode::Selector;
use crate::curve::{batch_add_assign, ExtendedPoint};
use crate::field::MsmScalar;

/// Hard cap on the staging area; below this the batch size tracks the bucket
/// count so small windows do not pay inversion setup for a handful of adds.
pub(crate) const MAX_BATCH_SIZE: usize = 600;

/// One deferred bucket operation. The sign shares the point word so the
/// queue stays two words per entry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BatchOp {
    bucket_id: u32,
    point_id: u32,
}

impl BatchOp {
    fn new(bucket_id: u32, point_index: usize, negate: bool) -> Self {
        Self {
            bucket_id,
            point_id: (point_index as u32) << 1 | negate as u32,
        }
    }

    #[inline(always)]
    fn is_neg(self) -> bool {
        self.point_id & 1 == 1
    }

    #[inline(always)]
    fn point_index(self) -> usize {
        (self.point_id >> 1) as usize
    }
}

/// Staging area for independent affine additions into distinct buckets.
struct AffineBatch<'a, P: SWCurveConfig> {
    buckets: &'a mut [Affine<P>],
    points: &'a [Affine<P>],
    batch_size: usize,
    staged_ids: Vec<u32>,
    staged_points: Vec<Affine<P>>,
    in_batch: Vec<bool>,
    inverses: Vec<P::BaseField>,
}

impl<'a, P: SWCurveConfig> AffineBatch<'a, P> {
    fn new(buckets: &'a mut [Affine<P>], points: &'a [Affine<P>]) -> Self {
        let batch_size = (buckets.len() / 5).clamp(1, MAX_BATCH_SIZE);
        let nb_buckets = buckets.len();
        Self {
            buckets,
            points,
            batch_size,
            staged_ids: Vec::with_capacity(batch_size),
            staged_points: Vec::with_capacity(batch_size),
            in_batch: vec![false; nb_buckets],
            inverses: Vec::with_capacity(batch_size),
        }
    }

    #[inline(always)]
    fn can_add(&self, bucket_id: u32) -> bool {
        !self.in_batch[bucket_id as usize]
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        self.staged_ids.len() == self.batch_size
    }

    /// Stages one operation. Callers must have checked `can_add` first.
    ///
    /// Operations that a chord addition cannot express are resolved on the
    /// spot: an infinite point is dropped, an empty bucket is overwritten, a
    /// cancellation clears the bucket, and an add-of-equal doubles directly
    /// rather than feeding a zero denominator to the shared inversion.
    fn add(&mut self, op: BatchOp) {
        let point = &self.points[op.point_index()];
        if point.infinity {
            return;
        }
        let addend = if op.is_neg() { -*point } else { *point };

        let bucket = &mut self.buckets[op.bucket_id as usize];
        if bucket.infinity {
            *bucket = addend;
            return;
        }
        if bucket.x == addend.x {
            if bucket.y == addend.y {
                *bucket = Projective::from(addend).double().into_affine();
            } else {
                *bucket = Affine::identity();
            }
            return;
        }

        self.in_batch[op.bucket_id as usize] = true;
        self.staged_ids.push(op.bucket_id);
        self.staged_points.push(addend);
    }

    /// Flushes the staging area through one shared inversion.
    fn execute_and_reset(&mut self) {
        if self.staged_ids.is_empty() {
            return;
        }
        batch_add_assign(
            self.buckets,
            &self.staged_ids,
            &self.staged_points,
            &mut self.inverses,
        );
        for &id in &self.staged_ids {
            self.in_batch[id as usize] = false;
        }
        self.staged_ids.clear();
        self.staged_points.clear();
    }
}

/// Back-to-front scan of the deferred queue, admitting whatever no longer
/// conflicts. Order within a bucket is immaterial: group addition commutes.
fn process_queue<P: SWCurveConfig>(queue: &mut Vec<BatchOp>, batch: &mut AffineBatch<'_, P>) {
    let mut i = queue.len();
    while i > 0 {
        i -= 1;
        if batch.can_add(queue[i].bucket_id) {
            let op = queue.swap_remove(i);
            batch.add(op);
            if batch.is_full() {
                batch.execute_and_reset();
            }
        }
    }
}

/// Accumulates one window's digits into affine `buckets` through the batch
/// scheduler, then reduces them to the window subtotal.
pub(crate) fn process_window_batch<P>(
    window: usize,
    c: usize,
    buckets: &mut [Affine<P>],
    points: &[Affine<P>],
    digits: &[<P::ScalarField as MsmScalar>::Limbs],
) -> ExtendedPoint<P>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    let msb_window = 1u64 << (c - 1);
    let selector = Selector::new(window, c, <P::ScalarField as MsmScalar>::NB_LIMBS);

    let mut batch = AffineBatch::new(buckets, points);
    let mut queue: Vec<BatchOp> = Vec::with_capacity(4096);

    for (i, limbs) in digits.iter().enumerate() {
        let bits = selector.extract(limbs.as_ref());
        if bits == 0 {
            continue;
        }
        let op = if bits & msb_window == 0 {
            BatchOp::new((bits - 1) as u32, i, false)
        } else {
            BatchOp::new((bits & !msb_window) as u32, i, true)
        };

        if batch.can_add(op.bucket_id) {
            batch.add(op);
            if batch.is_full() {
                batch.execute_and_reset();
                // backfill the freed slot from the queue
                if let Some(op) = queue.pop() {
                    batch.add(op);
                }
            }
        } else {
            queue.push(op);
        }
    }

    while !queue.is_empty() {
        process_queue(&mut queue, &mut batch);
        // flush even partially full so queued ops on the same bucket make
        // progress next scan
        batch.execute_and_reset();
    }
    batch.execute_and_reset();
    drop(batch);

    reduce_affine_buckets(buckets)
}

/// Running-sum reduction over affine buckets, accumulating in extended
/// Jacobian form.
fn reduce_affine_buckets<P: SWCurveConfig>(buckets: &[Affine<P>]) -> ExtendedPoint<P> {
    let mut running = ExtendedPoint::<P>::INFINITY;
    let mut total = ExtendedPoint::<P>::INFINITY;
    for bucket in buckets.iter().rev() {
        if !bucket.infinity {
            running.add_mixed(bucket);
        }
        total.add(&running);
    }
    total
}
