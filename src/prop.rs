use rand::Rng;

use crate::bits::BitVector;
use crate::expr::{Formula, NodeId, NodeKind};
use crate::model::Model;
use crate::solver::options::{Options, flip};
use crate::solver::stats::Stats;

mod consist;
mod invert;
mod path;
pub(crate) mod score;

pub(crate) use path::CondFlip;
pub(crate) use score::Scores;

use invert::Inv;

/// The outcome of one propagation descent.
pub(crate) enum Descent {
    /// Reached a variable: assign `value` to `var`.
    Move { var: NodeId, value: BitVector },
    /// A non-recoverable conflict; the descent was abandoned.
    Conflict,
    /// The termination hook fired mid-descent.
    Stopped,
}

/// Walks from a violated boolean root down to a variable.
///
/// At every node the path selector picks a child; with probability
/// `prob_use_inv` the inverse-value library computes the exact operand
/// value forcing the desired output, falling back to the consistent-value
/// library otherwise and on recoverable conflicts. The walk allocates no
/// DAG nodes, terminates within the DAG height, and reports conflicts by
/// return value only; its side effects are the statistics counters.
pub(crate) fn propagate<R: Rng>(
    f: &Formula,
    m: &Model,
    opts: &Options,
    rng: &mut R,
    stats: &mut Stats,
    cond: &mut CondFlip,
    root: NodeId,
    should_stop: &mut dyn FnMut() -> bool,
) -> Descent {
    let mut cur = root;
    let mut target = BitVector::from_u64(1, 1);
    loop {
        if should_stop() {
            return Descent::Stopped;
        }
        // fold the edge inversion into the required node output
        let node_target = if cur.is_neg() { target.not() } else { target.clone() };
        match f.kind(cur) {
            NodeKind::Var => {
                return Descent::Move {
                    var: cur.pos(),
                    value: node_target,
                };
            }
            NodeKind::Const(_) => {
                // guarded by path selection, but a level-0 DAG can still
                // steer into a constant
                stats.props += 1;
                stats.non_rec_conflicts += 1;
                return Descent::Conflict;
            }
            _ => {}
        }
        let eidx = path::select_path(f, m, opts, rng, cond, cur.pos(), &node_target);
        let kids: Vec<NodeId> = f.kind(cur).children().to_vec();
        match step(f, m, opts, rng, stats, cur.pos(), &kids, eidx, &node_target) {
            Some(value) => {
                stats.props += 1;
                cur = kids[eidx];
                target = value;
            }
            None => {
                // the aborted step still counts toward the budget
                stats.props += 1;
                stats.non_rec_conflicts += 1;
                return Descent::Conflict;
            }
        }
    }
}

/// Computes the target value for the selected child edge, or `None` on a
/// non-recoverable conflict.
#[allow(clippy::too_many_arguments)]
fn step<R: Rng>(
    f: &Formula,
    m: &Model,
    opts: &Options,
    rng: &mut R,
    stats: &mut Stats,
    node: NodeId,
    kids: &[NodeId],
    eidx: usize,
    t: &BitVector,
) -> Option<BitVector> {
    let x_cur = m.value(kids[eidx]);
    match f.kind(node) {
        NodeKind::Slice { hi, lo, .. } => {
            Some(invert::inv_slice(rng, opts, t, &x_cur, *hi, *lo))
        }
        NodeKind::Cond(_) => {
            if eidx == 0 {
                // steer the condition toward whichever branch already
                // carries the target
                let vt = m.value(kids[1]);
                let ve = m.value(kids[2]);
                let cond_val = if vt == *t {
                    true
                } else if ve == *t {
                    false
                } else {
                    !m.value(kids[0]).is_true()
                };
                Some(BitVector::from_bool(cond_val))
            } else {
                Some(t.clone())
            }
        }
        kind => {
            let s = m.value(kids[1 - eidx]);
            let s_const = f.is_const(kids[1 - eidx]);
            let result: Inv = if flip(rng, opts.prob_use_inv) {
                inverse(rng, opts, kind, eidx, t, &s, &x_cur, s_const)
            } else {
                Ok(consistent(rng, opts, kind, eidx, t, &x_cur))
            };
            match result {
                Ok(v) => Some(v),
                Err(c) if c.recoverable => {
                    stats.rec_conflicts += 1;
                    Some(consistent(rng, opts, kind, eidx, t, &x_cur))
                }
                Err(_) => None,
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn inverse<R: Rng>(
    rng: &mut R,
    opts: &Options,
    kind: &NodeKind,
    eidx: usize,
    t: &BitVector,
    s: &BitVector,
    x_cur: &BitVector,
    s_const: bool,
) -> Inv {
    match kind {
        NodeKind::Add(_) => Ok(invert::inv_add(t, s)),
        NodeKind::And(_) => invert::inv_and(rng, opts, t, s, x_cur, s_const),
        NodeKind::Eq(_) => Ok(invert::inv_eq(rng, opts, t, s)),
        NodeKind::Ult(_) => invert::inv_ult(rng, t, s, eidx, s_const),
        NodeKind::Mul(_) => invert::inv_mul(rng, t, s, s_const),
        NodeKind::Shl(_) => invert::inv_shl(rng, t, s, eidx, s_const),
        NodeKind::Lshr(_) => invert::inv_lshr(rng, t, s, eidx, s_const),
        NodeKind::Udiv(_) => invert::inv_udiv(rng, t, s, eidx, s_const),
        NodeKind::Urem(_) => invert::inv_urem(rng, t, s, eidx, s_const),
        NodeKind::Concat(_) => invert::inv_concat(t, s, eidx, x_cur.width(), s_const),
        other => unreachable!("no inverse for {}", other.name()),
    }
}

fn consistent<R: Rng>(
    rng: &mut R,
    opts: &Options,
    kind: &NodeKind,
    eidx: usize,
    t: &BitVector,
    x_cur: &BitVector,
) -> BitVector {
    let width = x_cur.width();
    match kind {
        NodeKind::Add(_) => consist::cons_add(rng, t),
        NodeKind::And(_) => consist::cons_and(rng, t),
        NodeKind::Eq(_) => consist::cons_eq(rng, t, x_cur),
        NodeKind::Ult(_) => consist::cons_ult(rng, t, eidx, width),
        NodeKind::Mul(_) => consist::cons_mul(rng, t),
        NodeKind::Shl(_) => consist::cons_shl(rng, t, eidx, t.width()),
        NodeKind::Lshr(_) => consist::cons_lshr(rng, t, eidx, t.width()),
        NodeKind::Udiv(_) => consist::cons_udiv(rng, t, eidx),
        NodeKind::Urem(_) => consist::cons_urem(rng, t, eidx),
        NodeKind::Concat(_) => consist::cons_concat(rng, opts, t, eidx, x_cur),
        other => unreachable!("no consistent value for {}", other.name()),
    }
}
