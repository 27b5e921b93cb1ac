//! Bucket-method (Pippenger) multi-scalar multiplication.
//!
//! The computation runs in three stages:
//!
//! 1. every scalar is recoded into signed base-2^c digits, so that a window
//!    needs 2^{c-1} buckets instead of 2^c (subtracting a point is one field
//!    negation);
//! 2. one worker per c-bit window places each digit's point into its bucket
//!    and reduces the buckets to a window subtotal, published on a
//!    capacity-1 channel;
//! 3. the combiner folds subtotals highest window first, doubling c times
//!    between windows.
//!
//! Two interchangeable bucket backends cover the width range: extended
//! Jacobian accumulation for narrow windows, and a conflict-aware batch
//! affine scheduler once buckets are numerous enough to amortise shared
//! inversions. Bucket arrays are stack-allocated per worker for the widths
//! where that fits, which is what the per-width dispatch below is for.

mod batch_affine;
mod extended_jac;
mod recode;

use std::thread;

use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ec::AffineRepr;
use ark_ff::Zero;
use crossbeam::channel::{bounded, Receiver};
use tracing::debug;

use crate::curve::ExtendedPoint;
use crate::field::MsmScalar;
use recode::{nb_windows, partition_scalars};

pub(crate) type ScalarLimbs<P> =
    <<P as ark_ec::CurveConfig>::ScalarField as MsmScalar>::Limbs;

/// Window widths the bucket pipeline is specialised for.
const IMPLEMENTED_WINDOWS: std::ops::RangeInclusive<usize> = 1..=21;
/// Upper bound on the caller-provided parallelism budget.
const MAX_NB_TASKS: usize = 1024;
/// Below this size the bucket machinery costs more than it saves.
const SMALL_MSM_THRESHOLD: usize = 32;
/// Narrower windows stay on the extended-Jacobian backend even when the
/// batch-affine entry point is used.
const BATCH_AFFINE_MIN_WINDOW: usize = 10;
/// Worker thread stack: the largest stack-resident bucket array is 2^11
/// extended points, comfortably inside 4 MiB for every supported field.
const WORKER_STACK_SIZE: usize = 4 << 20;
/// Share of small scalars above which the first window is bisected.
const SMALL_VALUES_SPLIT_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MsmError {
    #[error("points and scalars length mismatch: {points} points, {scalars} scalars")]
    LengthMismatch { points: usize, scalars: usize },
    #[error("invalid config: nb_tasks must be at most {MAX_NB_TASKS}, got {0}")]
    InvalidConfig(usize),
}

/// Options for one multi-exponentiation call.
#[derive(Debug, Clone, Copy)]
pub struct MsmConfig {
    /// Parallelism budget in `1..=1024`; `0` selects the number of available
    /// cores.
    pub nb_tasks: usize,
    /// Scalars are in Montgomery form and must be converted before recoding.
    /// This is the case for arkworks field elements built through the field
    /// API, hence the default.
    pub scalars_mont: bool,
}

impl Default for MsmConfig {
    fn default() -> Self {
        Self {
            nb_tasks: 0,
            scalars_mont: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    ExtendedJacobian,
    BatchAffine,
}

/// Computes Σ scalarᵢ·pointᵢ with extended-Jacobian bucket accumulation.
///
/// Returns an error if the slices differ in length or `cfg.nb_tasks`
/// exceeds 1024.
#[tracing::instrument(skip_all, fields(n = points.len()))]
pub fn msm<P>(
    points: &[Affine<P>],
    scalars: &[P::ScalarField],
    cfg: &MsmConfig,
) -> Result<Projective<P>, MsmError>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    msm_with(points, scalars, cfg, Backend::ExtendedJacobian)
}

/// Computes Σ scalarᵢ·pointᵢ, switching bucket accumulation to the batch
/// affine scheduler for window widths of 10 bits and up. Narrower windows
/// fall back to the extended-Jacobian backend; the result is identical
/// either way.
#[tracing::instrument(skip_all, fields(n = points.len()))]
pub fn msm_batch_affine<P>(
    points: &[Affine<P>],
    scalars: &[P::ScalarField],
    cfg: &MsmConfig,
) -> Result<Projective<P>, MsmError>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    msm_with(points, scalars, cfg, Backend::BatchAffine)
}

fn msm_with<P>(
    points: &[Affine<P>],
    scalars: &[P::ScalarField],
    cfg: &MsmConfig,
    backend: Backend,
) -> Result<Projective<P>, MsmError>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    if points.len() != scalars.len() {
        return Err(MsmError::LengthMismatch {
            points: points.len(),
            scalars: scalars.len(),
        });
    }
    if cfg.nb_tasks > MAX_NB_TASKS {
        return Err(MsmError::InvalidConfig(cfg.nb_tasks));
    }
    let nb_tasks = if cfg.nb_tasks == 0 {
        rayon::current_num_threads()
    } else {
        cfg.nb_tasks
    };

    if points.is_empty() {
        return Ok(Projective::zero());
    }
    if points.len() < SMALL_MSM_THRESHOLD {
        return Ok(msm_serial(points, scalars, cfg.scalars_mont));
    }

    let Plan {
        c,
        nb_splits,
        split_len,
    } = plan(
        points.len(),
        nb_tasks,
        <P::ScalarField as MsmScalar>::NB_LIMBS,
    );

    // Recoding runs over the whole input before any window worker starts:
    // the borrow at 2^{c-1} propagates carries from the lowest window up.
    let (digits, small_values) = partition_scalars(scalars, c, cfg.scalars_mont, nb_tasks);

    // A large share of scalars that only touch window 0 leaves that worker
    // with most of the work; bisecting its range rebalances the sweep.
    let split_first_window =
        small_values as f64 / scalars.len() as f64 >= SMALL_VALUES_SPLIT_RATIO;

    debug!(
        c,
        nb_splits, split_first_window, small_values, "multi-exponentiation plan"
    );

    if nb_splits == 1 {
        return Ok(msm_range(c, points, &digits, split_first_window, backend));
    }

    // Each split runs its own full per-range MSM; the partial results only
    // meet again for the final sum.
    let digits = digits.as_slice();
    let result = thread::scope(|s| {
        let handles: Vec<_> = (0..nb_splits - 1)
            .map(|i| {
                let range = i * split_len..(i + 1) * split_len;
                let (pts, dgs) = (&points[range.clone()], &digits[range]);
                s.spawn(move || msm_range(c, pts, dgs, split_first_window, backend))
            })
            .collect();

        let tail = (nb_splits - 1) * split_len;
        let mut acc = msm_range(c, &points[tail..], &digits[tail..], split_first_window, backend);
        for handle in handles {
            let partial = handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            acc += partial;
        }
        acc
    });
    Ok(result)
}

/// Plain double-and-add fold for inputs too small to amortise recoding.
fn msm_serial<P>(
    points: &[Affine<P>],
    scalars: &[P::ScalarField],
    scalars_mont: bool,
) -> Projective<P>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    points
        .iter()
        .zip(scalars)
        .map(|(point, scalar)| {
            let limbs = if scalars_mont {
                scalar.canonical_limbs()
            } else {
                scalar.raw_limbs()
            };
            point.mul_bigint(limbs)
        })
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Plan {
    c: usize,
    nb_splits: usize,
    split_len: usize,
}

/// Window width minimising the approximate group-operation count
/// bits/c · (n + 2^c). The argmin is what matters; the model deliberately
/// ignores cache effects and the two-limb selector penalty.
fn best_window(nb_points: usize, nb_limbs: usize) -> usize {
    let scalar_bits = (nb_limbs * 64) as f64;
    let mut best = 1;
    let mut min_cost = f64::INFINITY;
    for c in IMPLEMENTED_WINDOWS {
        let cost = scalar_bits * (nb_points + (1usize << c)) as f64 / c as f64;
        if cost < min_cost {
            min_cost = cost;
            best = c;
        }
    }
    best
}

/// Doubles the number of horizontal splits until the window workers saturate
/// the task budget. Each split halves the per-range point count (so the
/// window choice is re-evaluated) at the price of one extra addition when
/// the partial results are summed.
fn plan(nb_points: usize, nb_tasks: usize, nb_limbs: usize) -> Plan {
    let scalar_bits = nb_limbs * 64;
    let mut n = nb_points;
    let mut nb_splits = 1;
    loop {
        let c = best_window(n, nb_limbs);
        if nb_windows(scalar_bits, c) * nb_splits >= nb_tasks {
            return Plan {
                c,
                nb_splits,
                split_len: n,
            };
        }
        nb_splits <<= 1;
        n >>= 1;
    }
}

/// Bucket width of the top window. Digits above the modulus bit length never
/// occur, so the top window only needs buckets for the carry range the
/// modulus can actually produce: one bit more than the modulus bits not
/// covered by the lower windows.
fn last_window_width<P>(c: usize, nb_windows: usize) -> usize
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    let modulus_bits = <P::ScalarField as MsmScalar>::MODULUS_BITS as i64;
    let covered = (c * (nb_windows - 1)) as i64;
    (modulus_bits - covered + 1).clamp(1, c as i64) as usize
}

/// One full MSM over a contiguous range: a worker thread per window, the
/// combiner on the calling thread.
fn msm_range<P>(
    c: usize,
    points: &[Affine<P>],
    digits: &[ScalarLimbs<P>],
    split_first_window: bool,
    backend: Backend,
) -> Projective<P>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    let nb_windows = nb_windows(<P::ScalarField as MsmScalar>::NB_LIMBS * 64, c);
    let last_width = last_window_width::<P>(c, nb_windows);
    let main_backend = if backend == Backend::BatchAffine && c >= BATCH_AFFINE_MIN_WINDOW {
        Backend::BatchAffine
    } else {
        Backend::ExtendedJacobian
    };

    thread::scope(|s| {
        let mut receivers: Vec<Receiver<ExtendedPoint<P>>> = Vec::with_capacity(nb_windows);
        for w in 0..nb_windows {
            let (tx, rx) = bounded::<ExtendedPoint<P>>(1);
            receivers.push(rx);

            if w == nb_windows - 1 && nb_windows > 1 {
                // The top window sees a reduced digit range; a smaller
                // extended-Jacobian array beats the batch scheduler there.
                spawn_worker(s, format!("msm-window-{w}"), move || {
                    let total = run_window(
                        Backend::ExtendedJacobian,
                        w,
                        last_width,
                        c,
                        points,
                        digits,
                    );
                    tx.send(total).expect("window subtotal receiver dropped");
                });
            } else if w == 0 && split_first_window && points.len() > 1 {
                // Two half-range workers plus a joiner that publishes the
                // combined subtotal on window 0's channel, preserving the
                // combiner contract.
                let (half_tx, half_rx) = bounded::<ExtendedPoint<P>>(2);
                let mid = points.len() / 2;
                let halves = [
                    (&points[..mid], &digits[..mid], half_tx.clone()),
                    (&points[mid..], &digits[mid..], half_tx),
                ];
                for (i, (pts, dgs, htx)) in halves.into_iter().enumerate() {
                    spawn_worker(s, format!("msm-window-0-{i}"), move || {
                        let total = run_window(main_backend, 0, c, c, pts, dgs);
                        htx.send(total).expect("first-window joiner dropped");
                    });
                }
                spawn_worker(s, "msm-window-0-join".into(), move || {
                    let mut sum = half_rx.recv().expect("first-window half failed");
                    sum.add(&half_rx.recv().expect("first-window half failed"));
                    tx.send(sum).expect("window subtotal receiver dropped");
                });
            } else {
                spawn_worker(s, format!("msm-window-{w}"), move || {
                    let total = run_window(main_backend, w, c, c, points, digits);
                    tx.send(total).expect("window subtotal receiver dropped");
                });
            }
        }

        reduce_windows(c, &receivers).to_projective()
    })
}

fn spawn_worker<'scope, 'env, F>(
    s: &'scope thread::Scope<'scope, 'env>,
    name: String,
    f: F,
) where
    F: FnOnce() + Send + 'scope,
{
    thread::Builder::new()
        .name(name)
        .stack_size(WORKER_STACK_SIZE)
        .spawn_scoped(s, f)
        .expect("failed to spawn msm worker thread");
}

fn run_window<P>(
    backend: Backend,
    window: usize,
    width: usize,
    c: usize,
    points: &[Affine<P>],
    digits: &[ScalarLimbs<P>],
) -> ExtendedPoint<P>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    match backend {
        Backend::ExtendedJacobian => with_ext_buckets(width, |buckets| {
            extended_jac::process_window(window, c, buckets, points, digits)
        }),
        Backend::BatchAffine => with_affine_buckets(width, |buckets| {
            batch_affine::process_window_batch(window, c, buckets, points, digits)
        }),
    }
}

/// Horner fold of the window subtotals, highest window first:
/// R ← 2^c·R + subtotal_w restores each window's weight with exactly c
/// doublings per step.
fn reduce_windows<P: SWCurveConfig>(
    c: usize,
    receivers: &[Receiver<ExtendedPoint<P>>],
) -> ExtendedPoint<P> {
    let last = receivers.len() - 1;
    let mut acc = receivers[last].recv().expect("window worker failed");
    for rx in receivers[..last].iter().rev() {
        for _ in 0..c {
            acc.double_in_place();
        }
        acc.add(&rx.recv().expect("window worker failed"));
    }
    acc
}

/// Runs `f` over a fresh bucket array of `2^{width-1}` extended-Jacobian
/// points. Widths up to 12 get a stack array sized at compile time; wider
/// windows would not fit a worker stack and fall back to the heap.
fn with_ext_buckets<P, R>(width: usize, f: impl FnOnce(&mut [ExtendedPoint<P>]) -> R) -> R
where
    P: SWCurveConfig,
{
    macro_rules! on_stack {
        ($w:expr) => {{
            let mut buckets = [ExtendedPoint::<P>::INFINITY; 1 << ($w - 1)];
            f(&mut buckets)
        }};
    }
    match width {
        1 => on_stack!(1),
        2 => on_stack!(2),
        3 => on_stack!(3),
        4 => on_stack!(4),
        5 => on_stack!(5),
        6 => on_stack!(6),
        7 => on_stack!(7),
        8 => on_stack!(8),
        9 => on_stack!(9),
        10 => on_stack!(10),
        11 => on_stack!(11),
        12 => on_stack!(12),
        _ => f(&mut vec![ExtendedPoint::<P>::INFINITY; 1 << (width - 1)]),
    }
}

/// Affine-bucket variant of [`with_ext_buckets`].
fn with_affine_buckets<P, R>(width: usize, f: impl FnOnce(&mut [Affine<P>]) -> R) -> R
where
    P: SWCurveConfig,
{
    macro_rules! on_stack {
        ($w:expr) => {{
            let mut buckets = [Affine::<P>::identity(); 1 << ($w - 1)];
            f(&mut buckets)
        }};
    }
    match width {
        1 => on_stack!(1),
        2 => on_stack!(2),
        3 => on_stack!(3),
        4 => on_stack!(4),
        5 => on_stack!(5),
        6 => on_stack!(6),
        7 => on_stack!(7),
        8 => on_stack!(8),
        9 => on_stack!(9),
        10 => on_stack!(10),
        11 => on_stack!(11),
        12 => on_stack!(12),
        _ => f(&mut vec![Affine::<P>::identity(); 1 << (width - 1)]),
    }
}

/// Test-only entry forcing the window width, range handling and backend.
#[cfg(test)]
pub(crate) fn msm_with_c<P>(
    points: &[Affine<P>],
    scalars: &[P::ScalarField],
    c: usize,
    split_first_window: bool,
    backend: Backend,
) -> Projective<P>
where
    P: SWCurveConfig,
    P::ScalarField: MsmScalar,
{
    let (digits, _) = partition_scalars(scalars, c, true, 4);
    msm_range(c, points, &digits, split_first_window, backend)
}
