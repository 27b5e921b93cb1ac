//! Scalar field adaptor: the limb-level view of scalars the recoder consumes.

use ark_ff::{BigInt, BigInteger, Fp, MontBackend, MontConfig, PrimeField};

/// Limb-level access to a scalar field element.
///
/// The bucket pipeline never does field arithmetic on scalars; it only needs
/// a fixed-width little-endian `u64` limb view, plus the out-of-Montgomery
/// conversion for callers whose scalars are in Montgomery form. Keeping this
/// behind a trait keeps the engine generic over the backing field
/// implementation.
pub trait MsmScalar: Copy + Send + Sync + 'static {
    /// Little-endian limb storage, also used for the recoded scalars.
    type Limbs: BigInteger;

    /// Number of 64-bit limbs in [`Self::Limbs`].
    const NB_LIMBS: usize;

    /// Bit size of the field modulus r.
    const MODULUS_BITS: u32;

    /// The stored limbs, reinterpreted as a little-endian integer without any
    /// conversion. Meaningful when the caller did not store the element in
    /// Montgomery form.
    fn raw_limbs(&self) -> Self::Limbs;

    /// The canonical integer value, converting out of Montgomery form.
    fn canonical_limbs(&self) -> Self::Limbs;

    /// True when every limb above the lowest is zero.
    fn fits_one_limb(limbs: &Self::Limbs) -> bool {
        limbs.as_ref()[1..].iter().all(|&limb| limb == 0)
    }
}

impl<T: MontConfig<N>, const N: usize> MsmScalar for Fp<MontBackend<T, N>, N> {
    type Limbs = BigInt<N>;

    const NB_LIMBS: usize = N;
    const MODULUS_BITS: u32 = <Self as PrimeField>::MODULUS_BIT_SIZE;

    #[inline(always)]
    fn raw_limbs(&self) -> BigInt<N> {
        self.0
    }

    #[inline(always)]
    fn canonical_limbs(&self) -> BigInt<N> {
        self.into_bigint()
    }
}
