use hashbrown::HashMap;
use rapidhash::quality::RandomState;

use crate::bits::BitVector;
use crate::expr::{Formula, NodeId, NodeKind};
use crate::model::Model;

/// Weight of the distance term in unsatisfied `Eq`/`Ult` scores.
const CFACT: f64 = 0.5;

/// Per-edge "closeness to satisfied" scores for boolean nodes.
///
/// A score lives in `[0.0, 1.0]` and is `1.0` exactly when the edge
/// evaluates to true under the current model. Scores are memoized per
/// tagged edge (both polarities of a node score independently) and only
/// the boolean nodes of an updated cone are recomputed.
pub(crate) struct Scores {
    map: HashMap<u32, f64, RandomState>,
}

impl Scores {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    /// The memoized score of a boolean edge, computing it (and its
    /// children's scores) on demand.
    pub(crate) fn score(&mut self, f: &Formula, m: &Model, e: NodeId) -> f64 {
        if let Some(&s) = self.map.get(&e.raw()) {
            return s;
        }
        let s = self.compute(f, m, e);
        self.map.insert(e.raw(), s);
        s
    }

    /// Drops and eagerly recomputes both polarities of every boolean node
    /// in an updated cone, in ascending (children first) order.
    pub(crate) fn rescore_cone(&mut self, f: &Formula, m: &Model, cone: &[usize]) {
        for &i in cone {
            let e = NodeId::new(i, false);
            if f.sorts.width(f.sort_of(e)) == Some(1) {
                self.map.remove(&e.raw());
                self.map.remove(&e.not().raw());
            }
        }
        for &i in cone {
            let e = NodeId::new(i, false);
            if f.sorts.width(f.sort_of(e)) == Some(1) && m.get(e).is_some() {
                self.score(f, m, e);
                self.score(f, m, e.not());
            }
        }
    }

    fn compute(&mut self, f: &Formula, m: &Model, e: NodeId) -> f64 {
        let inv = e.is_neg();
        match f.kind(e) {
            NodeKind::And([a, b]) => {
                let (a, b) = (*a, *b);
                if !inv {
                    let sa = self.score(f, m, a);
                    let sb = self.score(f, m, b);
                    let mean = (sa + sb) / 2.0;
                    // the average must not round up to "satisfied" while a
                    // child is still unsatisfied
                    if mean >= 1.0 && (sa < 1.0 || sb < 1.0) {
                        sa.min(sb)
                    } else {
                        mean
                    }
                } else {
                    // an inverted conjunction is a disjunction
                    let sa = self.score(f, m, a.not());
                    let sb = self.score(f, m, b.not());
                    sa.max(sb)
                }
            }
            NodeKind::Eq([a, b]) => {
                let (va, vb) = (m.value(*a), m.value(*b));
                if !inv {
                    if va == vb {
                        1.0
                    } else {
                        let w = va.width() as f64;
                        CFACT * (1.0 - va.hamming(&vb) as f64 / w)
                    }
                } else if va == vb {
                    0.0
                } else {
                    1.0
                }
            }
            NodeKind::Ult([a, b]) => {
                let (va, vb) = (m.value(*a), m.value(*b));
                let w = va.width() as f64;
                if !inv {
                    if va.ult(&vb) {
                        1.0
                    } else {
                        CFACT * (1.0 - min_flip(&va, &vb) as f64 / w)
                    }
                } else if !va.ult(&vb) {
                    1.0
                } else {
                    CFACT * (1.0 - min_flip_inv(&va, &vb) as f64 / w)
                }
            }
            // variables and every other boolean operator score by their
            // evaluated truth value
            _ => {
                if m.value(e).is_true() {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Minimum number of bits that must be flipped in `a` (to decrease it) so
/// that `a < b`. Scanning from the most significant bit, every position
/// where `a` is set and `b` is clear must be cleared; the first position
/// where `a` is clear and `b` is set makes the prefix strictly smaller.
pub(crate) fn min_flip(a: &BitVector, b: &BitVector) -> u32 {
    if b.is_zero() {
        return a.width();
    }
    let mut res = 0;
    for i in (0..a.width()).rev() {
        match (a.get_bit(i), b.get_bit(i)) {
            (true, false) => res += 1,
            (false, true) => return res,
            _ => {}
        }
    }
    // all remaining bits equal: one more flip for strictness
    res + 1
}

/// Minimum number of bits that must be flipped in `a` (to increase it) so
/// that `a >= b`.
pub(crate) fn min_flip_inv(a: &BitVector, b: &BitVector) -> u32 {
    let mut res = 0;
    for i in (0..a.width()).rev() {
        match (a.get_bit(i), b.get_bit(i)) {
            (false, true) => res += 1,
            (true, false) => return res,
            _ => {}
        }
    }
    res
}
