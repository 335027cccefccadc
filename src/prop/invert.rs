use std::cmp::Ordering;

use rand::Rng;

use crate::bits::BitVector;
use crate::solver::options::{Options, flip};

/// A propagation step that cannot produce the requested output.
///
/// A conflict is *recoverable* when the fixed operand is itself movable:
/// a different path selection (or a later move) can dissolve it. When the
/// fixed operand is a constant the conflict is non-recoverable and the
/// whole descent must be abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict {
    pub(crate) recoverable: bool,
}

pub(crate) type Inv = Result<BitVector, Conflict>;

fn conflict(fixed_is_const: bool) -> Conflict {
    Conflict {
        recoverable: !fixed_is_const,
    }
}

/// `x + s = t` has the unique solution `x = t - s`.
pub(crate) fn inv_add(t: &BitVector, s: &BitVector) -> BitVector {
    t.sub(s)
}

/// `x & s = t`: every set target bit needs `s` set (conflict otherwise)
/// and forces `x` set; clear target bits under a set `s` force `x` clear;
/// bits where `s` is clear are free.
pub(crate) fn inv_and<R: Rng>(
    rng: &mut R,
    opts: &Options,
    t: &BitVector,
    s: &BitVector,
    x_cur: &BitVector,
    s_const: bool,
) -> Inv {
    if t.and(s) != *t {
        return Err(conflict(s_const));
    }
    let dc = s.not();
    let free_bits: Vec<u32> = (0..t.width()).filter(|&i| dc.get_bit(i)).collect();
    let x = if !free_bits.is_empty() && flip(rng, opts.prob_and_flip) {
        // keep the current don't-care bits, flipping a single one
        let pick = free_bits[rng.gen_range(0..free_bits.len())];
        t.or(&x_cur.and(&dc)).flip_bit(pick)
    } else {
        t.or(&BitVector::new_random(rng, t.width()).and(&dc))
    };
    Ok(x)
}

/// `(x = s) = t`: equality forces `x = s`; disequality draws any other
/// value, optionally by flipping one bit of `s`.
pub(crate) fn inv_eq<R: Rng>(rng: &mut R, opts: &Options, t: &BitVector, s: &BitVector) -> BitVector {
    if t.is_true() {
        return s.clone();
    }
    if flip(rng, opts.prob_eq_flip) {
        return s.flip_bit(rng.gen_range(0..s.width()));
    }
    loop {
        let x = BitVector::new_random(rng, s.width());
        if x != *s {
            return x;
        }
    }
}

/// Inverse for `ult` on either side. `eidx` names the unknown operand.
pub(crate) fn inv_ult<R: Rng>(
    rng: &mut R,
    t: &BitVector,
    s: &BitVector,
    eidx: usize,
    s_const: bool,
) -> Inv {
    let w = s.width();
    let ones = BitVector::ones(w);
    let zero = BitVector::zero(w);
    if eidx == 0 {
        if t.is_true() {
            // x < s: impossible below zero
            if s.is_zero() {
                return Err(conflict(s_const));
            }
            Ok(BitVector::new_random_range(rng, &zero, &s.dec()))
        } else {
            Ok(BitVector::new_random_range(rng, s, &ones))
        }
    } else if t.is_true() {
        // s < x: impossible above all-ones
        if s.is_ones() {
            return Err(conflict(s_const));
        }
        Ok(BitVector::new_random_range(rng, &s.inc(), &ones))
    } else {
        Ok(BitVector::new_random_range(rng, &zero, s))
    }
}

/// Inverse for `shl`. Side 0 recovers the shifted operand, side 1 the
/// shift distance (whose width is the logarithm of the operand width).
pub(crate) fn inv_shl<R: Rng>(
    rng: &mut R,
    t: &BitVector,
    s: &BitVector,
    eidx: usize,
    s_const: bool,
) -> Inv {
    if eidx == 0 {
        let w = t.width();
        if !s.fits_u64() || s.to_u64() >= w as u64 {
            // saturated shift: the output is zero no matter the operand
            if !t.is_zero() {
                return Err(conflict(s_const));
            }
            return Ok(BitVector::new_random(rng, w));
        }
        let shift = s.to_u64() as u32;
        if shift > 0 && t.count_trailing_zeros() < shift {
            return Err(conflict(s_const));
        }
        // the shifted-out high bits are free
        let high = BitVector::new_random(rng, w).shl_by(w - shift);
        Ok(t.lshr_by(shift).or(&high))
    } else {
        let w = s.width();
        let log2w = w.trailing_zeros();
        if t.is_zero() {
            if s.is_zero() {
                return Ok(BitVector::new_random(rng, log2w.max(1)));
            }
            // need every set bit of s shifted out
            let tz = s.count_trailing_zeros();
            if tz == 0 {
                return Err(conflict(s_const));
            }
            let lo = BitVector::from_u64(log2w, (w - tz) as u64);
            let hi = BitVector::from_u64(log2w, (w - 1) as u64);
            return Ok(BitVector::new_random_range(rng, &lo, &hi));
        }
        let (tz_t, tz_s) = (t.count_trailing_zeros(), s.count_trailing_zeros());
        if tz_t < tz_s {
            return Err(conflict(s_const));
        }
        let shift = tz_t - tz_s;
        if s.shl_by(shift) != *t {
            return Err(conflict(s_const));
        }
        Ok(BitVector::from_u64(log2w, shift as u64))
    }
}

/// Inverse for `lshr`, the mirror of [`inv_shl`] with leading zeros.
pub(crate) fn inv_lshr<R: Rng>(
    rng: &mut R,
    t: &BitVector,
    s: &BitVector,
    eidx: usize,
    s_const: bool,
) -> Inv {
    if eidx == 0 {
        let w = t.width();
        if !s.fits_u64() || s.to_u64() >= w as u64 {
            if !t.is_zero() {
                return Err(conflict(s_const));
            }
            return Ok(BitVector::new_random(rng, w));
        }
        let shift = s.to_u64() as u32;
        if shift > 0 && t.count_leading_zeros() < shift {
            return Err(conflict(s_const));
        }
        // the shifted-out low bits are free
        let low = BitVector::new_random(rng, w).lshr_by(w - shift);
        Ok(t.shl_by(shift).or(&low))
    } else {
        let w = s.width();
        let log2w = w.trailing_zeros();
        if t.is_zero() {
            if s.is_zero() {
                return Ok(BitVector::new_random(rng, log2w.max(1)));
            }
            let lz = s.count_leading_zeros();
            if lz == 0 {
                return Err(conflict(s_const));
            }
            let lo = BitVector::from_u64(log2w, (w - lz) as u64);
            let hi = BitVector::from_u64(log2w, (w - 1) as u64);
            return Ok(BitVector::new_random_range(rng, &lo, &hi));
        }
        let (lz_t, lz_s) = (t.count_leading_zeros(), s.count_leading_zeros());
        if lz_t < lz_s {
            return Err(conflict(s_const));
        }
        let shift = lz_t - lz_s;
        if s.lshr_by(shift) != *t {
            return Err(conflict(s_const));
        }
        Ok(BitVector::from_u64(log2w, shift as u64))
    }
}

/// `x * s = t`: odd `s` inverts exactly through the 2-adic inverse; an
/// even `s = 2^n * m` requires `t` to carry at least `n` factors of two,
/// and leaves the top `n` bits of `x` free.
pub(crate) fn inv_mul<R: Rng>(rng: &mut R, t: &BitVector, s: &BitVector, s_const: bool) -> Inv {
    let w = t.width();
    if s.is_zero() {
        if t.is_zero() {
            return Ok(BitVector::new_random(rng, w));
        }
        return Err(conflict(s_const));
    }
    if s.get_bit(0) {
        return Ok(t.mul(&s.mod_inverse()));
    }
    let n = s.count_trailing_zeros();
    if t.count_trailing_zeros() < n {
        return Err(conflict(s_const));
    }
    let m = s.lshr_by(n);
    let mut x = t.lshr_by(n).mul(&m.mod_inverse());
    // solutions agree modulo 2^(w-n): the top n bits are free
    let r = BitVector::new_random(rng, w);
    for i in (w - n)..w {
        x = x.set_bit(i, r.get_bit(i));
    }
    Ok(x)
}

/// Inverse for `udiv` on either side.
pub(crate) fn inv_udiv<R: Rng>(
    rng: &mut R,
    t: &BitVector,
    s: &BitVector,
    eidx: usize,
    s_const: bool,
) -> Inv {
    let w = t.width();
    let ones = BitVector::ones(w);
    if eidx == 0 {
        // x / s = t
        if s.is_zero() {
            // division by zero is all-ones regardless of x
            if t.is_ones() {
                return Ok(BitVector::new_random(rng, w));
            }
            return Err(conflict(s_const));
        }
        if t.is_ones() {
            if s.is_one() {
                return Ok(ones);
            }
            return Err(conflict(s_const));
        }
        if s.umul_overflow(t) {
            return Err(conflict(s_const));
        }
        let lo = s.mul(t);
        let headroom = ones.sub(&lo);
        let span = s.dec();
        let hi = if span.ult(&headroom) {
            lo.add(&span)
        } else {
            lo.add(&headroom)
        };
        Ok(BitVector::new_random_range(rng, &lo, &hi))
    } else {
        // s / x = t
        if t.is_ones() {
            if s.is_ones() {
                // both 0 and 1 work
                return Ok(BitVector::from_u64(w, rng.gen_range(0..2)));
            }
            return Ok(BitVector::zero(w));
        }
        if t.is_zero() {
            // s / x = 0 needs x > s
            if s.is_ones() {
                return Err(conflict(s_const));
            }
            return Ok(BitVector::new_random_range(rng, &s.inc(), &ones));
        }
        if t.compare(s) == Ordering::Greater {
            return Err(conflict(s_const));
        }
        let lo = s.udiv(&t.inc()).inc();
        let hi = s.udiv(t);
        if hi.ult(&lo) {
            return Err(conflict(s_const));
        }
        Ok(BitVector::new_random_range(rng, &lo, &hi))
    }
}

/// Inverse for `urem` on either side.
pub(crate) fn inv_urem<R: Rng>(
    rng: &mut R,
    t: &BitVector,
    s: &BitVector,
    eidx: usize,
    s_const: bool,
) -> Inv {
    let w = t.width();
    let ones = BitVector::ones(w);
    if eidx == 0 {
        // x % s = t
        if s.is_zero() {
            return Ok(t.clone());
        }
        if t.compare(s) != Ordering::Less {
            return Err(conflict(s_const));
        }
        // x = t + k * s for any k that does not overflow
        let kmax = ones.sub(t).udiv(s);
        let k = BitVector::new_random_range(rng, &BitVector::zero(w), &kmax);
        Ok(t.add(&k.mul(s)))
    } else {
        // s % x = t
        match t.compare(s) {
            Ordering::Greater => Err(conflict(s_const)),
            Ordering::Equal => {
                // x = 0, or any x above s
                if s.is_ones() || rng.r#gen() {
                    Ok(BitVector::zero(w))
                } else {
                    Ok(BitVector::new_random_range(rng, &s.inc(), &ones))
                }
            }
            Ordering::Less => {
                let diff = s.sub(t);
                if diff.compare(t) != Ordering::Greater {
                    // every divisor of s - t is at most t: no candidate
                    // exceeds the remainder
                    return Err(conflict(s_const));
                }
                // prefer a random divisor of s - t above t, falling back
                // to s - t itself
                for _ in 0..4 {
                    let q = BitVector::new_random_range(rng, &BitVector::one(w), &diff);
                    if diff.urem(&q).is_zero() {
                        let x = diff.udiv(&q);
                        if t.ult(&x) {
                            return Ok(x);
                        }
                    }
                }
                Ok(diff)
            }
        }
    }
}

/// Inverse for `concat`: the unknown side is the matching slice of the
/// target, and the other slice must agree with the fixed operand.
pub(crate) fn inv_concat(
    t: &BitVector,
    s: &BitVector,
    eidx: usize,
    x_width: u32,
    s_const: bool,
) -> Inv {
    let w = t.width();
    if eidx == 0 {
        // x is the high part; the low slice must equal s
        if t.slice(w - x_width - 1, 0) != *s {
            return Err(conflict(s_const));
        }
        Ok(t.slice(w - 1, w - x_width))
    } else {
        if t.slice(w - 1, x_width) != *s {
            return Err(conflict(s_const));
        }
        Ok(t.slice(x_width - 1, 0))
    }
}

/// Inverse for `slice`: the projected bits are pinned to the target; the
/// remaining bits keep their current assignment or are redrawn, with an
/// optional single-bit flip.
pub(crate) fn inv_slice<R: Rng>(
    rng: &mut R,
    opts: &Options,
    t: &BitVector,
    x_cur: &BitVector,
    hi: u32,
    lo: u32,
) -> BitVector {
    let w = x_cur.width();
    let keep = flip(rng, opts.prob_slice_keep_dc);
    let fresh = BitVector::new_random(rng, w);
    let mut x = if keep { x_cur.clone() } else { fresh };
    for i in 0..t.width() {
        x = x.set_bit(lo + i, t.get_bit(i));
    }
    let dc: Vec<u32> = (0..w).filter(|&i| i < lo || i > hi).collect();
    if !dc.is_empty() && flip(rng, opts.prob_slice_flip) {
        x = x.flip_bit(dc[rng.gen_range(0..dc.len())]);
    }
    x
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
        SmallRng::seed_from_u64(0xB17)
    }

    // inverse consistency: a returned value must reproduce the target
    // exactly when plugged back into the operator

    #[test]
    fn add_inverse_is_exact() {
        let t = bv(8, 3);
        let s = bv(8, 9);
        assert_eq!(inv_add(&t, &s).add(&s), t);
    }

    #[test]
    fn and_inverse_reproduces_target() {
        let mut r = rng();
        let opts = Options::default();
        let t = bv(8, 0b1010_0000);
        let s = bv(8, 0b1110_0011);
        for _ in 0..32 {
            let x = inv_and(&mut r, &opts, &t, &s, &bv(8, 0), false).unwrap();
            assert_eq!(x.and(&s), t);
        }
        // a target bit outside s conflicts
        let bad = bv(8, 0b0001_0000);
        assert!(inv_and(&mut r, &opts, &bad, &s, &bv(8, 0), true).is_err());
    }

    #[test]
    fn ult_inverse_lands_in_range() {
        let mut r = rng();
        for _ in 0..32 {
            let x = inv_ult(&mut r, &bv(1, 1), &bv(8, 17), 0, false).unwrap();
            assert!(x.ult(&bv(8, 17)));
            let y = inv_ult(&mut r, &bv(1, 1), &bv(8, 17), 1, false).unwrap();
            assert!(bv(8, 17).ult(&y));
            let z = inv_ult(&mut r, &bv(1, 0), &bv(8, 17), 0, false).unwrap();
            assert!(!z.ult(&bv(8, 17)));
        }
        // nothing is below zero
        assert!(inv_ult(&mut r, &bv(1, 1), &bv(8, 0), 0, true).is_err());
    }

    #[test]
    fn shl_inverse_recovers_both_sides() {
        let mut r = rng();
        // operand side: shifted-out bits are free
        for _ in 0..16 {
            let t = bv(8, 0b1011_0000);
            let s = bv(3, 4);
            let x = inv_shl(&mut r, &t, &s, 0, false).unwrap();
            assert_eq!(x.shl(&s), t);
        }
        // shift side: distance from the trailing-zero gap
        let t = bv(8, 0b0001_0100);
        let s = bv(8, 0b0000_0101);
        let x = inv_shl(&mut r, &t, &s, 1, false).unwrap();
        assert_eq!(s.shl(&x), t);
        assert_eq!(x.to_u64(), 2);
        // misaligned bits conflict
        let bad = bv(8, 0b0001_1100);
        assert!(inv_shl(&mut r, &bad, &s, 1, true).is_err());
    }

    #[test]
    fn shl_inverse_zero_target_picks_big_enough_shift() {
        let mut r = rng();
        let t = bv(8, 0);
        let s = bv(8, 0b0110_0000);
        for _ in 0..16 {
            let x = inv_shl(&mut r, &t, &s, 1, false).unwrap();
            assert!(s.shl(&x).is_zero());
        }
        // an odd operand can never be shifted to zero
        assert!(inv_shl(&mut r, &t, &bv(8, 3), 1, true).is_err());
    }

    #[test]
    fn lshr_inverse_mirrors_shl() {
        let mut r = rng();
        for _ in 0..16 {
            let t = bv(8, 0b0000_1101);
            let s = bv(3, 4);
            let x = inv_lshr(&mut r, &t, &s, 0, false).unwrap();
            assert_eq!(x.lshr(&s), t);
        }
        let t = bv(8, 0b0000_0101);
        let s = bv(8, 0b0001_0100);
        let x = inv_lshr(&mut r, &t, &s, 1, false).unwrap();
        assert_eq!(s.lshr(&x), t);
    }

    #[test]
    fn mul_inverse_handles_odd_and_even_factors() {
        let mut r = rng();
        // odd: unique solution
        let x = inv_mul(&mut r, &bv(8, 21), &bv(8, 3), false).unwrap();
        assert_eq!(x, bv(8, 7));
        // even: randomized top bits still satisfy the product
        for _ in 0..32 {
            let x = inv_mul(&mut r, &bv(8, 12), &bv(8, 4), false).unwrap();
            assert_eq!(x.mul(&bv(8, 4)), bv(8, 12));
        }
        // 4x = 6 has no solution mod 256
        assert!(inv_mul(&mut r, &bv(8, 6), &bv(8, 4), true).is_err());
    }

    #[test]
    fn udiv_inverse_brackets_the_quotient() {
        let mut r = rng();
        for _ in 0..32 {
            let x = inv_udiv(&mut r, &bv(8, 7), &bv(8, 9), 0, false).unwrap();
            assert_eq!(x.udiv(&bv(8, 9)), bv(8, 7));
            let y = inv_udiv(&mut r, &bv(8, 7), &bv(8, 63), 1, false).unwrap();
            assert_eq!(bv(8, 63).udiv(&y), bv(8, 7));
        }
        // quotient above the dividend is impossible
        assert!(inv_udiv(&mut r, &bv(8, 9), &bv(8, 7), 1, true).is_err());
        // division by zero must hit all-ones
        assert!(inv_udiv(&mut r, &bv(8, 9), &bv(8, 0), 0, true).is_err());
        let any = inv_udiv(&mut r, &BitVector::ones(8), &bv(8, 0), 0, false).unwrap();
        assert_eq!(any.udiv(&bv(8, 0)), BitVector::ones(8));
    }

    #[test]
    fn urem_inverse_solves_both_sides() {
        let mut r = rng();
        for _ in 0..32 {
            let x = inv_urem(&mut r, &bv(8, 3), &bv(8, 10), 0, false).unwrap();
            assert_eq!(x.urem(&bv(8, 10)), bv(8, 3));
            let y = inv_urem(&mut r, &bv(8, 3), &bv(8, 23), 1, false).unwrap();
            assert_eq!(bv(8, 23).urem(&y), bv(8, 3));
        }
        // remainder not below the modulus
        assert!(inv_urem(&mut r, &bv(8, 12), &bv(8, 10), 0, true).is_err());
        // x % 0 = x pins the dividend
        assert_eq!(
            inv_urem(&mut r, &bv(8, 12), &bv(8, 0), 0, false).unwrap(),
            bv(8, 12)
        );
    }

    #[test]
    fn concat_inverse_slices_the_target() {
        let t = bv(8, 0b1011_0110);
        let hi = bv(5, 0b10110);
        let lo = bv(3, 0b110);
        assert_eq!(inv_concat(&t, &lo, 0, 5, false).unwrap(), hi);
        assert_eq!(inv_concat(&t, &hi, 1, 3, false).unwrap(), lo);
        // disagreement on the fixed side conflicts
        assert!(inv_concat(&t, &bv(3, 0b111), 0, 5, true).is_err());
    }

    #[test]
    fn slice_inverse_pins_projected_bits() {
        let mut r = rng();
        let opts = Options::default();
        for _ in 0..32 {
            let x = inv_slice(&mut r, &opts, &bv(3, 0b101), &bv(8, 0xA5), 6, 4);
            assert_eq!(x.slice(6, 4), bv(3, 0b101));
        }
    }
}
