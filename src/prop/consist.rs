use rand::Rng;

use crate::bits::BitVector;
use crate::solver::options::{Options, flip};

/// Consistent values: for each operator, a value for the unknown operand
/// that is *plausible* for the desired output alone, ignoring the fixed
/// operand. Consistent values never conflict; they serve both as the
/// stochastic alternative to the inverse library and as the recovery
/// value after a recoverable conflict.

/// Addition reaches every output from every operand.
pub(crate) fn cons_add<R: Rng>(rng: &mut R, t: &BitVector) -> BitVector {
    BitVector::new_random(rng, t.width())
}

/// Any value with the target's set bits set can complete an `and`.
pub(crate) fn cons_and<R: Rng>(rng: &mut R, t: &BitVector) -> BitVector {
    t.or(&BitVector::new_random(rng, t.width()))
}

/// Equality: an equality target accepts any value (the other side can
/// follow), a disequality target nudges the current assignment by one bit
/// so the operand is guaranteed to move.
pub(crate) fn cons_eq<R: Rng>(rng: &mut R, t: &BitVector, x_cur: &BitVector) -> BitVector {
    if t.is_true() {
        BitVector::new_random(rng, x_cur.width())
    } else {
        x_cur.flip_bit(rng.gen_range(0..x_cur.width()))
    }
}

/// `ult`: a strict bound only rules out the extreme value on each side.
pub(crate) fn cons_ult<R: Rng>(rng: &mut R, t: &BitVector, eidx: usize, width: u32) -> BitVector {
    let ones = BitVector::ones(width);
    let zero = BitVector::zero(width);
    if t.is_true() {
        if eidx == 0 {
            // something must lie above x
            BitVector::new_random_range(rng, &zero, &ones.dec())
        } else {
            // something must lie below x
            BitVector::new_random_range(rng, &BitVector::one(width), &ones)
        }
    } else {
        BitVector::new_random(rng, width)
    }
}

/// `shl`: the operand must carry the target's bits at some smaller
/// offset; the shift must not exceed the target's trailing zeros.
pub(crate) fn cons_shl<R: Rng>(rng: &mut R, t: &BitVector, eidx: usize, width: u32) -> BitVector {
    let log2w = width.trailing_zeros().max(1);
    if t.is_zero() {
        return if eidx == 0 {
            BitVector::new_random(rng, width)
        } else {
            BitVector::new_random(rng, log2w)
        };
    }
    let max_shift = t.count_trailing_zeros().min(width - 1) as u64;
    let shift = rng.gen_range(0..=max_shift) as u32;
    if eidx == 0 {
        t.lshr_by(shift)
    } else {
        BitVector::from_u64(log2w, shift as u64)
    }
}

/// Mirror of [`cons_shl`] with leading zeros.
pub(crate) fn cons_lshr<R: Rng>(rng: &mut R, t: &BitVector, eidx: usize, width: u32) -> BitVector {
    let log2w = width.trailing_zeros().max(1);
    if t.is_zero() {
        return if eidx == 0 {
            BitVector::new_random(rng, width)
        } else {
            BitVector::new_random(rng, log2w)
        };
    }
    let max_shift = t.count_leading_zeros().min(width - 1) as u64;
    let shift = rng.gen_range(0..=max_shift) as u32;
    if eidx == 0 {
        t.shl_by(shift)
    } else {
        BitVector::from_u64(log2w, shift as u64)
    }
}

/// `mul`: an odd target needs an odd factor; an even target needs a
/// factor with no more trailing zeros than the target.
pub(crate) fn cons_mul<R: Rng>(rng: &mut R, t: &BitVector) -> BitVector {
    let w = t.width();
    let x = BitVector::new_random(rng, w);
    if t.is_zero() {
        return x;
    }
    if t.get_bit(0) {
        return x.set_bit(0, true);
    }
    let budget = t.count_trailing_zeros();
    x.set_bit(rng.gen_range(0..=budget.min(w - 1)), true)
}

/// `udiv` on either side.
pub(crate) fn cons_udiv<R: Rng>(rng: &mut R, t: &BitVector, eidx: usize) -> BitVector {
    let w = t.width();
    let ones = BitVector::ones(w);
    if eidx == 0 {
        // x as dividend
        if t.is_ones() {
            // x / 0 covers any dividend
            return BitVector::new_random(rng, w);
        }
        if t.is_zero() {
            // some divisor must exceed x
            return BitVector::new_random_range(rng, &BitVector::zero(w), &ones.dec());
        }
        // pick a divisor that cannot overflow, then a matching dividend
        let s = BitVector::new_random_range(rng, &BitVector::one(w), &ones.udiv(t));
        let lo = s.mul(t);
        let headroom = ones.sub(&lo);
        let span = s.dec();
        let hi = if span.ult(&headroom) {
            lo.add(&span)
        } else {
            lo.add(&headroom)
        };
        BitVector::new_random_range(rng, &lo, &hi)
    } else {
        // x as divisor
        if t.is_ones() {
            return BitVector::from_u64(w, rng.gen_range(0..2));
        }
        if t.is_zero() {
            return BitVector::new_random_range(rng, &BitVector::one(w), &ones);
        }
        BitVector::new_random_range(rng, &BitVector::one(w), &ones.udiv(t))
    }
}

/// `urem` on either side.
pub(crate) fn cons_urem<R: Rng>(rng: &mut R, t: &BitVector, eidx: usize) -> BitVector {
    let w = t.width();
    let ones = BitVector::ones(w);
    if eidx == 0 {
        // x as dividend: x = t works through a zero modulus; otherwise
        // offset by a multiple of some modulus above t
        if t.is_ones() || rng.r#gen() {
            return t.clone();
        }
        let modulus = BitVector::new_random_range(rng, &t.inc(), &ones);
        let kmax = ones.sub(t).udiv(&modulus);
        let k = BitVector::new_random_range(rng, &BitVector::zero(w), &kmax);
        t.add(&k.mul(&modulus))
    } else {
        // x as modulus: zero leaves the dividend untouched, anything
        // above t can produce the remainder
        if t.is_ones() || rng.r#gen() {
            return BitVector::zero(w);
        }
        BitVector::new_random_range(rng, &t.inc(), &ones)
    }
}

/// `concat`: the unknown side is pinned to the matching slice of the
/// target; optionally the current assignment with a single bit flipped is
/// kept instead.
pub(crate) fn cons_concat<R: Rng>(
    rng: &mut R,
    opts: &Options,
    t: &BitVector,
    eidx: usize,
    x_cur: &BitVector,
) -> BitVector {
    if flip(rng, opts.prob_conc_flip) {
        return x_cur.flip_bit(rng.gen_range(0..x_cur.width()));
    }
    let w = t.width();
    let xw = x_cur.width();
    if eidx == 0 {
        t.slice(w - 1, w - xw)
    } else {
        t.slice(xw - 1, 0)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn bv(width: u32, value: u64) -> BitVector {
        BitVector::from_u64(width, value)
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(0xC0)
    }

    #[test]
    fn and_consistency_keeps_target_bits() {
        let mut r = rng();
        let t = bv(8, 0b1001_0010);
        for _ in 0..32 {
            let x = cons_and(&mut r, &t);
            assert_eq!(x.and(&t), t);
        }
    }

    #[test]
    fn eq_consistency_conditions_on_the_target() {
        let mut r = rng();
        let cur = bv(8, 0b1010_0101);
        for _ in 0..32 {
            // a disequality target must move the operand off its current
            // value, by exactly one bit
            let x = cons_eq(&mut r, &bv(1, 0), &cur);
            assert_ne!(x, cur);
            assert_eq!(x.hamming(&cur), 1);
            // an equality target keeps the full range open
            let y = cons_eq(&mut r, &bv(1, 1), &cur);
            assert_eq!(y.width(), cur.width());
        }
    }

    #[test]
    fn mul_consistency_respects_parity() {
        let mut r = rng();
        for _ in 0..32 {
            // odd target: odd factor
            assert!(cons_mul(&mut r, &bv(8, 21)).get_bit(0));
            // 2^2 target: factor with at most two trailing zeros
            let x = cons_mul(&mut r, &bv(8, 12));
            assert!(x.count_trailing_zeros() <= 2);
        }
    }

    #[test]
    fn shl_consistency_stays_shiftable() {
        let mut r = rng();
        let t = bv(8, 0b0011_0000);
        for _ in 0..32 {
            let x = cons_shl(&mut r, &t, 0, 8);
            // some shift turns x back into t
            let ok = (0..8).any(|k| x.shl_by(k) == t);
            assert!(ok, "no shift recovers {t:?} from {x:?}");
            let shift = cons_shl(&mut r, &t, 1, 8);
            assert!(shift.to_u64() <= 4);
        }
    }

    #[test]
    fn urem_consistency_is_reachable() {
        let mut r = rng();
        let t = bv(8, 5);
        for _ in 0..32 {
            let x = cons_urem(&mut r, &t, 0);
            // x = t + k * m for some modulus above t, so x % m = t for
            // m = 0 or the chosen modulus
            assert!(!x.ult(&t));
            let m = cons_urem(&mut r, &t, 1);
            assert!(m.is_zero() || t.ult(&m));
        }
    }

    #[test]
    fn udiv_consistency_brackets() {
        let mut r = rng();
        let t = bv(8, 6);
        for _ in 0..32 {
            let divisor = cons_udiv(&mut r, &t, 1);
            // a dividend exists for this divisor: divisor * t fits
            assert!(!divisor.umul_overflow(&t));
            let dividend = cons_udiv(&mut r, &t, 0);
            // some divisor maps the dividend to t
            let ok = (1..=255u64).any(|d| dividend.udiv(&bv(8, d)) == t);
            assert!(ok, "no divisor maps {dividend:?} to {t:?}");
        }
    }
}
