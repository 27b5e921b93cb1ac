//! Multi-scalar multiplication over arkworks short-Weierstrass curves.
//!
//! Given affine points P₀…Pₙ₋₁ and scalars s₀…sₙ₋₁, [`msm`] computes
//! Σ sᵢ·Pᵢ with the bucket method: signed-digit recoding, per-window bucket
//! accumulation on parallel workers, and a highest-window-first combiner.
//! [`msm_batch_affine`] selects the batch affine bucket backend for wide
//! windows, where sharing one field inversion across a batch of independent
//! affine additions beats projective formulas.
//!
//! Field and curve arithmetic come from `ark-ff`/`ark-ec`; anything
//! implementing [`ark_ec::short_weierstrass::SWCurveConfig`] over a
//! Montgomery-backed scalar field works.
//!
//! ```
//! use ark_bn254::{Fr, G1Affine};
//! use ark_ec::AffineRepr;
//! use multiexp_core::{msm, MsmConfig};
//!
//! let points = vec![G1Affine::generator(); 3];
//! let scalars = vec![Fr::from(1u64), Fr::from(2u64), Fr::from(4u64)];
//! let total = msm(&points, &scalars, &MsmConfig::default()).unwrap();
//! assert_eq!(total, G1Affine::generator() * Fr::from(7u64));
//! ```

pub mod curve;
pub mod field;
pub mod msm;

pub use curve::{batch_add_assign, ExtendedPoint};
pub use field::MsmScalar;
pub use msm::{msm, msm_batch_affine, MsmConfig, MsmError};
