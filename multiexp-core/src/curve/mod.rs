//! Curve-side building blocks of the bucket pipeline: the extended Jacobian
//! accumulator and the shared-inversion batch affine adder. Affine and
//! Jacobian point types themselves come from `ark_ec`.

mod batch_add;
mod extended;

pub use batch_add::batch_add_assign;
pub use extended::ExtendedPoint;
