use rand::Rng;

use crate::bits::BitVector;
use crate::expr::{Formula, NodeId, NodeKind};
use crate::model::Model;
use crate::solver::options::{Options, PathSel, flip};

/// Adaptive state for descending into `ite` conditions.
///
/// When the enabled branch of a violated `ite` is a constant that cannot
/// be moved toward the target, flipping the condition is the only way
/// forward. The probability of doing so starts at the configured value
/// and drifts by `DELTA` every `flip_cond_const_npathsel` such selections,
/// bouncing off the per-mille bounds.
pub(crate) struct CondFlip {
    prob: u32,
    delta: i32,
    selections: u32,
}

const DELTA: i32 = 100;

impl CondFlip {
    pub(crate) fn new(start: u32) -> Self {
        Self {
            prob: start,
            delta: DELTA,
            selections: 0,
        }
    }

    fn current(&self) -> u32 {
        self.prob
    }

    fn note_selection(&mut self, npathsel: u32) {
        self.selections += 1;
        if self.selections < npathsel {
            return;
        }
        self.selections = 0;
        let next = self.prob as i32 + self.delta;
        if !(0..=1000).contains(&next) {
            self.delta = -self.delta;
        }
        self.prob = (self.prob as i32 + self.delta).clamp(0, 1000) as u32;
    }
}

/// Picks the child position to propagate into for the node behind `e`,
/// given the desired node output `target` and the children's current
/// model values.
pub(crate) fn select_path<R: Rng>(
    f: &Formula,
    m: &Model,
    opts: &Options,
    rng: &mut R,
    cond: &mut CondFlip,
    e: NodeId,
    target: &BitVector,
) -> usize {
    let kind = f.kind(e);
    match kind {
        NodeKind::Slice { .. } => return 0,
        NodeKind::Cond([c, t, el]) => return select_cond(f, m, opts, rng, cond, *c, *t, *el, target),
        _ => {}
    }

    let kids = kind.children();
    debug_assert_eq!(kids.len(), 2);
    // a constant child can never be moved
    let konst = [f.is_const(kids[0]), f.is_const(kids[1])];
    if konst[0] && !konst[1] {
        return 1;
    }
    if konst[1] && !konst[0] {
        return 0;
    }
    if opts.path_sel == PathSel::Random {
        return rng.gen_range(0..2);
    }

    let bve = [m.value(kids[0]), m.value(kids[1])];
    let essential = match kind {
        NodeKind::And(_) => select_and(&bve, target),
        NodeKind::Ult(_) => select_ult(&bve, target),
        NodeKind::Shl(_) => select_shl(&bve, target),
        NodeKind::Lshr(_) => select_lshr(&bve, target),
        NodeKind::Mul(_) => select_mul(&bve, target),
        NodeKind::Udiv(_) => select_udiv(&bve, target),
        NodeKind::Urem(_) => select_urem(&bve, target),
        NodeKind::Concat(_) => select_concat(&bve, target),
        // add, eq and the rest have no forced side
        _ => None,
    };
    essential.unwrap_or_else(|| rng.gen_range(0..2))
}

// the side that fails the "every target bit must be settable" check
fn select_and(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    let v0 = bve[0].and(t) != *t;
    let v1 = bve[1].and(t) != *t;
    match (v0, v1) {
        (true, false) => Some(0),
        (false, true) => Some(1),
        _ => None,
    }
}

fn select_ult(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    if t.is_true() {
        if bve[0].is_ones() {
            return Some(0);
        }
        if bve[1].is_zero() {
            return Some(1);
        }
    }
    None
}

fn select_shl(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    let w = bve[0].width();
    if !bve[1].fits_u64() || bve[1].to_u64() >= w as u64 {
        // saturated shift: only a shorter shift can produce a non-zero
        return if t.is_zero() { None } else { Some(1) };
    }
    let shift = bve[1].to_u64() as u32;
    if shift > 0 && t.count_trailing_zeros() < shift {
        return Some(1);
    }
    if *t != bve[0].shl_by(shift) {
        return Some(0);
    }
    None
}

fn select_lshr(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    let w = bve[0].width();
    if !bve[1].fits_u64() || bve[1].to_u64() >= w as u64 {
        return if t.is_zero() { None } else { Some(1) };
    }
    let shift = bve[1].to_u64() as u32;
    if shift > 0 && t.count_leading_zeros() < shift {
        return Some(1);
    }
    if *t != bve[0].lshr_by(shift) {
        return Some(0);
    }
    None
}

fn select_mul(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    // a zero factor cannot produce a non-zero product
    if !t.is_zero() {
        match (bve[0].is_zero(), bve[1].is_zero()) {
            (true, false) => return Some(0),
            (false, true) => return Some(1),
            _ => {}
        }
    }
    // an odd product has no even factor
    if t.get_bit(0) {
        match (bve[0].get_bit(0), bve[1].get_bit(0)) {
            (false, true) => return Some(0),
            (true, false) => return Some(1),
            _ => {}
        }
    }
    // trailing-zero budget mismatch: move the side with fewer factors of
    // two
    let (tz0, tz1) = (
        bve[0].count_trailing_zeros(),
        bve[1].count_trailing_zeros(),
    );
    if tz0.saturating_add(tz1) != t.count_trailing_zeros() && tz0 != tz1 {
        return Some(if tz0 < tz1 { 0 } else { 1 });
    }
    None
}

fn select_udiv(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    let s1 = &bve[1];
    if t.is_ones() {
        // only /0 and ones/1 reach all-ones
        if !s1.is_zero() && !s1.is_one() {
            return Some(1);
        }
        if s1.is_one() {
            return Some(0);
        }
        return None;
    }
    if s1.is_zero() || s1.umul_overflow(t) {
        return Some(1);
    }
    Some(0)
}

fn select_urem(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    let s1 = &bve[1];
    if t.is_ones() {
        // an all-ones remainder forces a zero divisor
        return Some(if s1.is_zero() { 0 } else { 1 });
    }
    if !s1.is_zero() && t.compare(s1) != std::cmp::Ordering::Less {
        return Some(1);
    }
    Some(0)
}

fn select_concat(bve: &[BitVector; 2], t: &BitVector) -> Option<usize> {
    let (w0, w1) = (bve[0].width(), bve[1].width());
    let hi_bad = t.slice(w0 + w1 - 1, w1) != bve[0];
    let lo_bad = t.slice(w1 - 1, 0) != bve[1];
    match (hi_bad, lo_bad) {
        (true, false) => Some(0),
        (false, true) => Some(1),
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn select_cond<R: Rng>(
    f: &Formula,
    m: &Model,
    opts: &Options,
    rng: &mut R,
    cond: &mut CondFlip,
    c: NodeId,
    t: NodeId,
    el: NodeId,
    target: &BitVector,
) -> usize {
    let enabled = if m.value(c).is_true() { 1 } else { 2 };
    if f.is_const(c) {
        return enabled;
    }
    let branch = if enabled == 1 { t } else { el };
    let prob = if f.is_const(branch) && m.value(branch) != *target {
        // the enabled branch is a constant that disagrees with the
        // target; only the condition can make progress
        let p = cond.current();
        cond.note_selection(opts.flip_cond_const_npathsel);
        p
    } else {
        opts.prob_flip_cond
    };
    if flip(rng, prob) { 0 } else { enabled }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn bv(width: u32, value: u64) -> BitVector {
        BitVector::from_u64(width, value)
    }

    #[test]
    fn and_selects_the_violating_side() {
        let t = bv(4, 0b1100);
        let bve = [bv(4, 0b1100), bv(4, 0b0101)];
        assert_eq!(select_and(&bve, &t), Some(1));
        let left_bad = [bv(4, 0b0101), bv(4, 0b1111)];
        assert_eq!(select_and(&left_bad, &t), Some(0));
        let both_bad = [bv(4, 0b0011), bv(4, 0b0101)];
        assert_eq!(select_and(&both_bad, &t), None);
    }

    #[test]
    fn ult_selects_the_saturated_side() {
        let t = bv(1, 1);
        assert_eq!(select_ult(&[bv(8, 255), bv(8, 9)], &t), Some(0));
        assert_eq!(select_ult(&[bv(8, 3), bv(8, 0)], &t), Some(1));
        assert_eq!(select_ult(&[bv(8, 9), bv(8, 3)], &t), None);
    }

    #[test]
    fn shl_blames_shift_or_operand() {
        // target has ones inside the shifted-out region: shift must move
        let t = bv(8, 0b0000_0110);
        let bve = [bv(8, 0b0000_0001), bv(3, 3)];
        assert_eq!(select_shl(&bve, &t), Some(1));
        // shifted-through bits mismatch: operand must move
        let t2 = bv(8, 0b0111_0000);
        let bve2 = [bv(8, 0b0000_0001), bv(3, 4)];
        assert_eq!(select_shl(&bve2, &t2), Some(0));
        // consistent state: no forced side
        let t3 = bv(8, 0b0001_0000);
        assert_eq!(select_shl(&bve2, &t3), None);
    }

    #[test]
    fn mul_applies_the_precedence_rules() {
        // zero factor with non-zero target
        assert_eq!(select_mul(&[bv(8, 0), bv(8, 6)], &bv(8, 12)), Some(0));
        // odd target with one even factor
        assert_eq!(select_mul(&[bv(8, 3), bv(8, 6)], &bv(8, 15)), Some(1));
        // trailing-zero mismatch picks the side with fewer twos
        assert_eq!(select_mul(&[bv(8, 2), bv(8, 8)], &bv(8, 8)), Some(0));
    }

    #[test]
    fn urem_rules_follow_the_remainder_bound() {
        // remainder must stay below the divisor
        assert_eq!(select_urem(&[bv(8, 20), bv(8, 5)], &bv(8, 9)), Some(1));
        assert_eq!(select_urem(&[bv(8, 20), bv(8, 12)], &bv(8, 9)), Some(0));
        // all-ones remainder needs a zero divisor
        assert_eq!(
            select_urem(&[bv(8, 20), bv(8, 5)], &BitVector::ones(8)),
            Some(1)
        );
    }

    #[test]
    fn constant_children_are_never_selected() {
        let mut f = Formula::new();
        let s = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s, None).unwrap();
        let c = f.mk_const(bv(8, 200));
        let node = f.mk_add(x, c).unwrap();

        let mut m = Model::new();
        let mut rng = SmallRng::seed_from_u64(3);
        m.init(&f, &[], &mut rng);
        let _ = m.ensure(&f, node, &mut rng);

        let opts = Options::default();
        let mut cond = CondFlip::new(opts.prob_flip_cond_const);
        let pos = node.pos();
        for _ in 0..16 {
            let eidx = select_path(&f, &m, &opts, &mut rng, &mut cond, pos, &bv(8, 7));
            let kids = f.kind(pos).children().to_vec();
            assert!(!f.is_const(kids[eidx]));
        }
    }

    #[test]
    fn cond_flip_probability_adapts_and_bounces() {
        let mut cf = CondFlip::new(900);
        cf.note_selection(1);
        assert_eq!(cf.current(), 1000);
        // the delta flips sign at the bound and walks back down
        cf.note_selection(1);
        assert_eq!(cf.current(), 900);
        for _ in 0..50 {
            cf.note_selection(1);
            assert!(cf.current() <= 1000);
        }
    }
}
