//! Extended Jacobian point representation used by the bucket accumulators.
//!
//! A point is stored as (X, Y, ZZ, ZZZ) with ZZ³ = ZZZ², standing for the
//! affine point (X/ZZ, Y/ZZZ); ZZ = 0 marks infinity. Mixed addition in this
//! representation is cheaper than in plain Jacobian coordinates, which is
//! what makes it the right shape for bucket accumulation: the hot loop is
//! almost exclusively bucket ± affine point.

use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ff::{AdditiveGroup, Field, Zero};

#[derive(Debug)]
pub struct ExtendedPoint<P: SWCurveConfig> {
    pub x: P::BaseField,
    pub y: P::BaseField,
    pub zz: P::BaseField,
    pub zzz: P::BaseField,
}

impl<P: SWCurveConfig> Clone for ExtendedPoint<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: SWCurveConfig> Copy for ExtendedPoint<P> {}

impl<P: SWCurveConfig> ExtendedPoint<P> {
    pub const INFINITY: Self = Self {
        x: <P::BaseField as Field>::ONE,
        y: <P::BaseField as Field>::ONE,
        zz: <P::BaseField as AdditiveGroup>::ZERO,
        zzz: <P::BaseField as AdditiveGroup>::ZERO,
    };

    #[inline(always)]
    pub fn set_infinity(&mut self) {
        *self = Self::INFINITY;
    }

    #[inline(always)]
    pub fn is_infinity(&self) -> bool {
        self.zz.is_zero()
    }

    pub fn from_affine(p: &Affine<P>) -> Self {
        if p.infinity {
            return Self::INFINITY;
        }
        Self {
            x: p.x,
            y: p.y,
            zz: <P::BaseField as Field>::ONE,
            zzz: <P::BaseField as Field>::ONE,
        }
    }

    /// self += q, full extended-Jacobian addition.
    pub fn add(&mut self, q: &Self) {
        if q.is_infinity() {
            return;
        }
        if self.is_infinity() {
            *self = *q;
            return;
        }

        let u1 = self.x * q.zz;
        let u2 = q.x * self.zz;
        let s1 = self.y * q.zzz;
        let s2 = q.y * self.zzz;

        // degenerate chord: same x means equal or opposite points
        if u1 == u2 {
            if s1 == s2 {
                self.double_in_place();
            } else {
                self.set_infinity();
            }
            return;
        }

        let p = u2 - u1;
        let r = s2 - s1;
        let pp = p.square();
        let ppp = p * pp;
        let q1 = u1 * pp;
        let x3 = r.square() - ppp - q1.double();
        let y3 = r * (q1 - x3) - s1 * ppp;
        self.zz = self.zz * q.zz * pp;
        self.zzz = self.zzz * q.zzz * ppp;
        self.x = x3;
        self.y = y3;
    }

    /// self += a, mixed addition with an affine point.
    pub fn add_mixed(&mut self, a: &Affine<P>) {
        if a.infinity {
            return;
        }
        if self.is_infinity() {
            *self = Self::from_affine(a);
            return;
        }

        let u2 = a.x * self.zz;
        let s2 = a.y * self.zzz;
        let p = u2 - self.x;
        let r = s2 - self.y;

        if p.is_zero() {
            if r.is_zero() {
                self.double_mixed(a);
            } else {
                self.set_infinity();
            }
            return;
        }

        let pp = p.square();
        let ppp = p * pp;
        let q = self.x * pp;
        let x3 = r.square() - ppp - q.double();
        let y3 = r * (q - x3) - self.y * ppp;
        self.zz *= pp;
        self.zzz *= ppp;
        self.x = x3;
        self.y = y3;
    }

    /// self -= a. Negating an affine point is a single field negation, which
    /// is what makes signed digits essentially free.
    pub fn sub_mixed(&mut self, a: &Affine<P>) {
        if a.infinity {
            return;
        }
        let neg = Affine::<P>::new_unchecked(a.x, -a.y);
        self.add_mixed(&neg);
    }

    /// self = 2·a for a finite affine point a.
    pub fn double_mixed(&mut self, a: &Affine<P>) {
        let u = a.y.double();
        let v = u.square();
        let w = u * v;
        let s = a.x * v;
        let xx = a.x.square();
        let m = xx + xx.double() + P::COEFF_A;
        let x3 = m.square() - s.double();
        let y3 = m * (s - x3) - w * a.y;
        *self = Self {
            x: x3,
            y: y3,
            zz: v,
            zzz: w,
        };
    }

    /// self = 2·self.
    pub fn double_in_place(&mut self) {
        let u = self.y.double();
        let v = u.square();
        let w = u * v;
        let s = self.x * v;
        let xx = self.x.square();
        let m = xx + xx.double() + P::mul_by_a(self.zz.square());
        let x3 = m.square() - s.double();
        let y3 = m * (s - x3) - w * self.y;
        self.zz *= v;
        self.zzz *= w;
        self.x = x3;
        self.y = y3;
    }

    /// Jacobian form: (X·ZZ², Y·ZZZ², ZZZ) satisfies X/Z² = X/ZZ, Y/Z³ = Y/ZZZ.
    pub fn to_projective(&self) -> Projective<P> {
        if self.is_infinity() {
            return Projective::zero();
        }
        Projective {
            x: self.x * self.zz.square(),
            y: self.y * self.zzz.square(),
            z: self.zzz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::CurveGroup;
    use ark_ff::UniformRand;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_affine<P: SWCurveConfig>(rng: &mut StdRng) -> Affine<P> {
        Projective::<P>::rand(rng).into_affine()
    }

    fn exercise_formulas<P: SWCurveConfig>(seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..25 {
            let a = random_affine::<P>(&mut rng);
            let b = random_affine::<P>(&mut rng);

            // round trip through the extended representation
            let ext = ExtendedPoint::<P>::from_affine(&a);
            assert_eq!(ext.to_projective().into_affine(), a);

            // mixed addition
            let mut sum = ExtendedPoint::<P>::from_affine(&a);
            sum.add_mixed(&b);
            assert_eq!(
                sum.to_projective().into_affine(),
                (Projective::from(a) + b).into_affine()
            );

            // mixed subtraction
            let mut diff = ExtendedPoint::<P>::from_affine(&a);
            diff.sub_mixed(&b);
            assert_eq!(
                diff.to_projective().into_affine(),
                (Projective::from(a) - b).into_affine()
            );

            // full addition
            let mut full = ExtendedPoint::<P>::from_affine(&a);
            full.double_in_place();
            full.add(&ExtendedPoint::from_affine(&b));
            assert_eq!(
                full.to_projective().into_affine(),
                (Projective::from(a).double() + b).into_affine()
            );

            // doubling
            let mut dbl = ExtendedPoint::<P>::from_affine(&a);
            dbl.double_in_place();
            assert_eq!(
                dbl.to_projective().into_affine(),
                Projective::from(a).double().into_affine()
            );
        }
    }

    #[test]
    fn formulas_match_arkworks_bn254_g1() {
        exercise_formulas::<ark_bn254::g1::Config>(0xB254);
    }

    #[test]
    fn formulas_match_arkworks_bls12_381_g1() {
        exercise_formulas::<ark_bls12_381::g1::Config>(0xB12);
    }

    #[test]
    fn formulas_match_arkworks_bls12_381_g2() {
        exercise_formulas::<ark_bls12_381::g2::Config>(0x62);
    }

    #[test]
    fn degenerate_branches() {
        let mut rng = StdRng::seed_from_u64(99);
        let a = random_affine::<ark_bn254::g1::Config>(&mut rng);

        // add of equal falls through to doubling
        let mut p = ExtendedPoint::from_affine(&a);
        p.add_mixed(&a);
        assert_eq!(
            p.to_projective().into_affine(),
            (Projective::from(a).double()).into_affine()
        );

        // add of the negation cancels
        let mut p = ExtendedPoint::from_affine(&a);
        p.add_mixed(&(-a));
        assert!(p.is_infinity());

        // sub of equal cancels
        let mut p = ExtendedPoint::from_affine(&a);
        p.sub_mixed(&a);
        assert!(p.is_infinity());

        // full add of opposite extended points cancels
        let mut p = ExtendedPoint::from_affine(&a);
        p.double_in_place();
        let mut q = ExtendedPoint::from_affine(&a);
        q.double_in_place();
        q.y = -q.y;
        p.add(&q);
        assert!(p.is_infinity());
    }

    #[test]
    fn infinity_is_absorbing() {
        let mut rng = StdRng::seed_from_u64(100);
        let a = random_affine::<ark_bn254::g1::Config>(&mut rng);

        let mut p = ExtendedPoint::<ark_bn254::g1::Config>::INFINITY;
        p.add_mixed(&Affine::identity());
        assert!(p.is_infinity());

        p.double_in_place();
        assert!(p.is_infinity());

        p.add_mixed(&a);
        assert_eq!(p.to_projective().into_affine(), a);

        p.add_mixed(&Affine::identity());
        assert_eq!(p.to_projective().into_affine(), a);

        assert!(ExtendedPoint::<ark_bn254::g1::Config>::INFINITY
            .to_projective()
            .is_zero());
    }
}
