use hashbrown::HashMap;

use crate::expr::{Formula, NodeId, NodeKind};

/// The simplifier contract consumed by the solver.
///
/// `simplify` must return a node equivalent under the theory, must follow
/// proxies, and must be idempotent: `simplify(simplify(x)) == simplify(x)`.
/// The returned edge carries a fresh external reference; the caller owns
/// it. Implementations may allocate fresh nodes and are responsible for
/// their reference counts.
///
/// The default implementation is [`Rewriter`]; a no-op implementation is
/// valid (and is what rewrite level 0 amounts to).
pub trait Simplify {
    fn simplify(&mut self, f: &mut Formula, e: NodeId) -> NodeId;
}

/// The built-in simplifier.
///
/// Rewriting is driven by the formula's rewrite level:
/// * level 0: proxy chasing only;
/// * level 1+: bottom-up reconstruction through the smart constructors,
///   which fold constants and neutral elements;
/// * level 2+: additionally, variable substitution from asserted
///   equalities (see [`substitute_constraints`]), run by the solver.
///
/// Whenever reconstruction produces a structurally different node, the old
/// node is rewritten into a [`NodeKind::Proxy`] so that every later lookup
/// lands on the replacement.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rewriter;

impl Simplify for Rewriter {
    fn simplify(&mut self, f: &mut Formula, e: NodeId) -> NodeId {
        let e = f.chase(e);
        if f.rewrite_level == 0 {
            return f.inc_ref(e);
        }
        let mut memo = HashMap::new();
        rebuild(f, e, &mut memo)
    }
}

// bottom-up reconstruction; returns an edge carrying one fresh external
// reference
fn rebuild(f: &mut Formula, e: NodeId, memo: &mut HashMap<usize, NodeId>) -> NodeId {
    let e = f.chase(e);
    let idx = e.idx();
    if let Some(&r) = memo.get(&idx) {
        let r = if e.is_neg() { r.not() } else { r };
        return f.inc_ref(r);
    }

    let rebuilt = match f.kind(e.pos()).clone() {
        NodeKind::Slice { child, hi, lo } => {
            let c = rebuild(f, child, memo);
            let r = f.mk_slice(c, hi, lo).expect("rebuilt slice keeps its bounds");
            f.release(c);
            r
        }
        NodeKind::And([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_and),
        NodeKind::Eq([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_eq),
        NodeKind::Ult([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_ult),
        NodeKind::Add([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_add),
        NodeKind::Mul([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_mul),
        NodeKind::Shl([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_shl),
        NodeKind::Lshr([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_lshr),
        NodeKind::Udiv([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_udiv),
        NodeKind::Urem([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_urem),
        NodeKind::Concat([a, b]) => rebuild_binary(f, memo, a, b, Formula::mk_concat),
        NodeKind::Cond([c, t, el]) => {
            let c2 = rebuild(f, c, memo);
            let t2 = rebuild(f, t, memo);
            let e2 = rebuild(f, el, memo);
            let r = f
                .mk_cond(c2, t2, e2)
                .expect("rebuilt cond keeps its sorts");
            for kid in [c2, t2, e2] {
                f.release(kid);
            }
            r
        }
        // leaves, and binders we never rewrite under
        _ => f.inc_ref(e.pos()),
    };

    let rebuilt = f.chase(rebuilt);
    if rebuilt.pos() != e.pos() && !matches!(f.kind(e.pos()), NodeKind::Proxy(_)) {
        f.set_proxy(e.pos(), rebuilt);
    }

    // memoize the positive polarity of the result
    let result_pos = if rebuilt.is_neg() {
        rebuilt.not()
    } else {
        rebuilt
    };
    memo.insert(idx, result_pos);
    if e.is_neg() { rebuilt.not() } else { rebuilt }
}

fn rebuild_binary(
    f: &mut Formula,
    memo: &mut HashMap<usize, NodeId>,
    a: NodeId,
    b: NodeId,
    mk: fn(&mut Formula, NodeId, NodeId) -> crate::error::Result<NodeId>,
) -> NodeId {
    let a2 = rebuild(f, a, memo);
    let b2 = rebuild(f, b, memo);
    let r = mk(f, a2, b2).expect("rebuilt operands keep their sorts");
    f.release(a2);
    f.release(b2);
    r
}

/// Harvests variable bindings from the asserted roots and installs them as
/// proxies: `Eq(x, c)` binds `x := c`, an asserted boolean literal `x`
/// (or `!x`) binds it to the matching constant. Returns true when at least
/// one new binding was installed; the caller re-simplifies the roots
/// afterwards so the bindings cascade.
pub(crate) fn substitute_constraints(f: &mut Formula, roots: &[NodeId]) -> bool {
    let mut changed = false;
    for &root in roots {
        let root = f.chase(root);
        match f.kind(root.pos()).clone() {
            NodeKind::Var => {
                let value = crate::bits::BitVector::from_u64(1, 1);
                let sort = f.sort_of(root);
                let t = f.const_inner(value, sort);
                let bound = if root.is_neg() { t.not() } else { t };
                f.set_proxy(root.pos(), bound);
                changed = true;
            }
            NodeKind::Eq([a, b]) if !root.is_neg() => {
                for (x, c) in [(a, b), (b, a)] {
                    let (x, c) = (f.chase(x), f.chase(c));
                    if matches!(f.kind(x), NodeKind::Var) && f.is_const(c) {
                        let bound = if x.is_neg() { c.not() } else { c };
                        f.set_proxy(x.pos(), bound);
                        changed = true;
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitVector;

    #[test]
    fn simplify_is_idempotent() {
        let mut f = Formula::new();
        let s = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s, None).unwrap();
        let c = f.mk_const(BitVector::from_u64(8, 5));
        let sum = f.mk_add(x, c).unwrap();

        let mut rw = Rewriter;
        let once = rw.simplify(&mut f, sum);
        let twice = rw.simplify(&mut f, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn substitution_folds_the_cone() {
        let mut f = Formula::new();
        let s = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s, None).unwrap();
        let three = f.mk_const(BitVector::from_u64(8, 3));
        let four = f.mk_const(BitVector::from_u64(8, 4));
        let bind = f.mk_eq(x, three).unwrap();
        let sum = f.mk_add(x, four).unwrap();

        assert!(substitute_constraints(&mut f, &[bind]));
        // the variable now forwards to its bound constant
        assert_eq!(f.chase(x), three);

        let mut rw = Rewriter;
        let sum2 = rw.simplify(&mut f, sum);
        assert_eq!(f.const_value(sum2).unwrap(), BitVector::from_u64(8, 7));
        // eval through the proxy agrees with the rewritten node
        assert_eq!(f.chase(sum), sum2);
    }

    #[test]
    fn conflicting_bindings_surface_as_false() {
        let mut f = Formula::new();
        let s = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s, None).unwrap();
        let three = f.mk_const(BitVector::from_u64(8, 3));
        let four = f.mk_const(BitVector::from_u64(8, 4));
        let r1 = f.mk_eq(x, three).unwrap();
        let r2 = f.mk_eq(x, four).unwrap();

        substitute_constraints(&mut f, &[r1, r2]);
        let mut rw = Rewriter;
        let r2s = rw.simplify(&mut f, r2);
        assert!(f.const_value(r2s).unwrap().is_false());
    }

    #[test]
    fn asserted_literals_bind_booleans() {
        let mut f = Formula::new();
        let b = f.sort_bool();
        let x = f.mk_var(b, None).unwrap();
        let y = f.mk_var(b, None).unwrap();

        substitute_constraints(&mut f, &[x, y.not()]);
        assert!(f.const_value(f.chase(x)).unwrap().is_true());
        assert!(f.const_value(f.chase(y)).unwrap().is_false());
    }
}
