use hashbrown::HashMap;
use rand::Rng;
use rapidhash::quality::RandomState;

use crate::bits::BitVector;
use crate::error::{Error, Result};
use crate::expr::{Formula, NodeId, NodeKind};

/// Tabulated values of a function symbol: argument tuple to result.
pub type FunTable = HashMap<Vec<BitVector>, BitVector, RandomState>;

/// The current concrete assignment.
///
/// Bit-vector values are memoized per node in a flat cache aligned with the
/// node arena; a cache entry exists only when it is known to equal the
/// bottom-up re-evaluation of the node. Inverted edges are read by
/// complementing the stored positive value. Function and array symbols get
/// a [`FunTable`] recording the argument tuples probed during solving.
pub struct Model {
    values: Vec<Option<BitVector>>,
    funs: HashMap<u32, FunTable, RandomState>,
    /// Fresh input and function values are drawn randomly instead of
    /// defaulting to zero.
    pub(crate) randomize: bool,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            funs: HashMap::with_hasher(RandomState::new()),
            randomize: false,
        }
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.funs.clear();
    }

    /// The memoized value behind an edge, inversion applied.
    pub fn get(&self, e: NodeId) -> Option<BitVector> {
        let v = self.values.get(e.idx())?.as_ref()?;
        Some(if e.is_neg() { v.not() } else { v.clone() })
    }

    /// Like [`Model::get`] but panics when the value is missing; the
    /// engine only calls this on nodes inside an evaluated cone.
    pub(crate) fn value(&self, e: NodeId) -> BitVector {
        self.get(e).expect("value missing from model")
    }

    pub(crate) fn fun_table(&self, fun: NodeId) -> Option<&FunTable> {
        self.funs.get(&(fun.idx() as u32))
    }

    fn grow(&mut self, f: &Formula) {
        if self.values.len() < f.node_count() {
            self.values.resize(f.node_count(), None);
        }
    }

    /// Installs the initial assignment for all roots: every free variable
    /// in their support receives a default (zero, or random when the model
    /// is randomized), then every reachable operator node is evaluated
    /// bottom-up in ascending id order.
    pub(crate) fn init<R: Rng>(&mut self, f: &Formula, roots: &[NodeId], rng: &mut R) {
        self.clear();
        self.grow(f);

        // mark everything reachable from the roots; lambda bodies are
        // evaluated under a binding during application, never globally
        let mut active = vec![false; f.node_count()];
        let mut stack: Vec<usize> = roots.iter().map(|r| r.idx()).collect();
        while let Some(i) = stack.pop() {
            if active[i] {
                continue;
            }
            active[i] = true;
            if matches!(f.node(i).kind, NodeKind::Lambda(_)) {
                continue;
            }
            for c in f.node(i).kind.children() {
                stack.push(c.idx());
            }
        }

        for i in 0..f.node_count() {
            if !active[i] {
                continue;
            }
            if let NodeKind::Var = f.node(i).kind {
                let width = f.width_of(NodeId::new(i, false));
                let v = if self.randomize {
                    BitVector::new_random(rng, width)
                } else {
                    BitVector::zero(width)
                };
                self.values[i] = Some(v);
            }
        }
        for i in 0..f.node_count() {
            if active[i] && !f.node(i).flags.contains(crate::expr::NodeFlags::PARAMETERIZED) {
                self.eval_idx(f, i, rng);
            }
        }
    }

    /// Re-evaluates the cone of influence of a set of freshly assigned
    /// variables, per the update contract: install the new values, walk
    /// the parent lists to collect every ancestor, then re-evaluate in
    /// ascending (topological) id order. Returns the cone for rescoring.
    pub(crate) fn update_cone<R: Rng>(
        &mut self,
        f: &Formula,
        changed: &[(NodeId, BitVector)],
        rng: &mut R,
    ) -> Vec<usize> {
        self.grow(f);
        for (var, value) in changed {
            debug_assert!(!var.is_neg());
            self.values[var.idx()] = Some(value.clone());
        }
        let cone = f.cone(changed.iter().map(|(v, _)| v.idx()));
        for &i in &cone {
            // only nodes already inside an evaluated cone are refreshed;
            // unvalued parents outside the asserted roots stay unvalued
            if self.values[i].is_some() {
                self.eval_idx(f, i, rng);
            }
        }
        cone
    }

    /// Evaluates `e` on demand, filling in any missing descendants.
    /// Fails on nodes with free lambda parameters.
    pub(crate) fn ensure<R: Rng>(&mut self, f: &Formula, e: NodeId, rng: &mut R) -> Result<BitVector> {
        self.grow(f);
        if f.node(e.idx()).flags.contains(crate::expr::NodeFlags::PARAMETERIZED) {
            return Err(Error::Parameterized);
        }
        let mut missing = Vec::new();
        let mut stack = vec![e.idx()];
        let mut seen = vec![false; f.node_count()];
        while let Some(i) = stack.pop() {
            if seen[i] || self.values[i].is_some() {
                continue;
            }
            seen[i] = true;
            missing.push(i);
            if matches!(f.node(i).kind, NodeKind::Lambda(_)) {
                continue;
            }
            for c in f.node(i).kind.children() {
                stack.push(c.idx());
            }
        }
        missing.sort_unstable();
        for i in missing {
            if let NodeKind::Var = f.node(i).kind {
                let width = f.width_of(NodeId::new(i, false));
                let v = if self.randomize {
                    BitVector::new_random(rng, width)
                } else {
                    BitVector::zero(width)
                };
                self.values[i] = Some(v);
            } else {
                self.eval_idx(f, i, rng);
            }
        }
        Ok(self.value(e))
    }

    // bottom-up step: computes the value of one node from its children's
    // memoized values and stores it
    fn eval_idx<R: Rng>(&mut self, f: &Formula, idx: usize, rng: &mut R) {
        let value = match &f.node(idx).kind {
            // leaves and non-valued kinds
            NodeKind::Var => return, // installed by the caller
            NodeKind::Uf | NodeKind::Args(_) | NodeKind::Lambda(_) | NodeKind::Released => return,
            NodeKind::Param { .. } => return, // only valued under a binding
            NodeKind::Proxy(_) => return,
            NodeKind::Const(v) => v.clone(),
            NodeKind::Slice { child, hi, lo } => self.value(*child).slice(*hi, *lo),
            NodeKind::And([a, b]) => self.value(*a).and(&self.value(*b)),
            NodeKind::Eq([a, b]) => BitVector::from_bool(self.value(*a) == self.value(*b)),
            NodeKind::FunEq([a, b]) => BitVector::from_bool(a == b),
            NodeKind::Ult([a, b]) => BitVector::from_bool(self.value(*a).ult(&self.value(*b))),
            NodeKind::Add([a, b]) => self.value(*a).add(&self.value(*b)),
            NodeKind::Mul([a, b]) => self.value(*a).mul(&self.value(*b)),
            NodeKind::Shl([a, b]) => self.value(*a).shl(&self.value(*b)),
            NodeKind::Lshr([a, b]) => self.value(*a).lshr(&self.value(*b)),
            NodeKind::Udiv([a, b]) => self.value(*a).udiv(&self.value(*b)),
            NodeKind::Urem([a, b]) => self.value(*a).urem(&self.value(*b)),
            NodeKind::Concat([a, b]) => self.value(*a).concat(&self.value(*b)),
            NodeKind::Cond([c, t, el]) => {
                if self.value(*c).is_true() {
                    self.value(*t)
                } else {
                    self.value(*el)
                }
            }
            NodeKind::Apply([fun, args]) => {
                let arg_vals: Vec<BitVector> = f
                    .kind(*args)
                    .children()
                    .iter()
                    .map(|&c| self.value(c))
                    .collect();
                let width = f.width_of(NodeId::new(idx, false));
                let (fun, arg_vals) = (*fun, arg_vals);
                self.apply_value(f, fun, arg_vals, width, rng)
            }
        };
        self.values[idx] = Some(value);
    }

    /// Looks an application up in the function tabulation, probing a fresh
    /// result on a miss. Lambdas are beta-evaluated; their probes are
    /// tabulated as well.
    fn apply_value<R: Rng>(
        &mut self,
        f: &Formula,
        fun: NodeId,
        args: Vec<BitVector>,
        width: u32,
        rng: &mut R,
    ) -> BitVector {
        let key = fun.idx() as u32;
        if let Some(v) = self.funs.get(&key).and_then(|t| t.get(&args)) {
            return v.clone();
        }
        let value = match f.kind(fun) {
            NodeKind::Lambda(_) => self.beta_eval(f, fun, &args, rng),
            _ => {
                if self.randomize {
                    BitVector::new_random(rng, width)
                } else {
                    BitVector::zero(width)
                }
            }
        };
        self.funs
            .entry(key)
            .or_default()
            .insert(args, value.clone());
        value
    }

    fn beta_eval<R: Rng>(
        &mut self,
        f: &Formula,
        lam: NodeId,
        args: &[BitVector],
        rng: &mut R,
    ) -> BitVector {
        let mut binding: HashMap<usize, BitVector> = HashMap::new();
        let mut cur = lam;
        let mut next_arg = 0;
        while let NodeKind::Lambda([p, b]) = f.kind(cur) {
            if next_arg >= args.len() {
                break;
            }
            binding.insert(p.idx(), args[next_arg].clone());
            next_arg += 1;
            cur = *b;
        }
        let mut local: HashMap<usize, BitVector> = HashMap::new();
        self.eval_bound(f, cur, &binding, &mut local, rng)
    }

    // evaluation under a parameter binding: parameterized nodes memoize
    // into a per-application map, everything else shares the global cache
    fn eval_bound<R: Rng>(
        &mut self,
        f: &Formula,
        e: NodeId,
        binding: &HashMap<usize, BitVector>,
        local: &mut HashMap<usize, BitVector>,
        rng: &mut R,
    ) -> BitVector {
        let idx = e.idx();
        let parameterized = f
            .node(idx)
            .flags
            .contains(crate::expr::NodeFlags::PARAMETERIZED);
        if !parameterized {
            self.grow(f);
            if self.values[idx].is_none() {
                // shared unparameterized subterm not seen before: evaluate
                // its descendants into the global cache
                let mut stack = vec![idx];
                let mut missing = Vec::new();
                while let Some(i) = stack.pop() {
                    if self.values[i].is_some() {
                        continue;
                    }
                    missing.push(i);
                    if matches!(f.node(i).kind, NodeKind::Lambda(_)) {
                        continue;
                    }
                    for c in f.node(i).kind.children() {
                        stack.push(c.idx());
                    }
                }
                missing.sort_unstable();
                missing.dedup();
                for i in missing {
                    if let NodeKind::Var = f.node(i).kind {
                        let width = f.width_of(NodeId::new(i, false));
                        let v = if self.randomize {
                            BitVector::new_random(rng, width)
                        } else {
                            BitVector::zero(width)
                        };
                        self.values[i] = Some(v);
                    } else {
                        self.eval_idx(f, i, rng);
                    }
                }
            }
            return self.value(e);
        }
        if let Some(v) = local.get(&idx) {
            return if e.is_neg() { v.not() } else { v.clone() };
        }
        let kind = f.kind(e).clone();
        let value = match kind {
            NodeKind::Param { .. } => binding
                .get(&idx)
                .cloned()
                .expect("parameter evaluated outside its binding"),
            NodeKind::Slice { child, hi, lo } => self
                .eval_bound(f, child, binding, local, rng)
                .slice(hi, lo),
            NodeKind::And([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.and(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Eq([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                let vb = self.eval_bound(f, b, binding, local, rng);
                BitVector::from_bool(va == vb)
            }
            NodeKind::Ult([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                let vb = self.eval_bound(f, b, binding, local, rng);
                BitVector::from_bool(va.ult(&vb))
            }
            NodeKind::Add([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.add(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Mul([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.mul(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Shl([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.shl(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Lshr([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.lshr(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Udiv([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.udiv(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Urem([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.urem(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Concat([a, b]) => {
                let va = self.eval_bound(f, a, binding, local, rng);
                va.concat(&self.eval_bound(f, b, binding, local, rng))
            }
            NodeKind::Cond([c, t, el]) => {
                if self.eval_bound(f, c, binding, local, rng).is_true() {
                    self.eval_bound(f, t, binding, local, rng)
                } else {
                    self.eval_bound(f, el, binding, local, rng)
                }
            }
            NodeKind::Apply([fun, args]) => {
                let kids: Vec<NodeId> = f.kind(args).children().to_vec();
                let arg_vals: Vec<BitVector> = kids
                    .into_iter()
                    .map(|c| self.eval_bound(f, c, binding, local, rng))
                    .collect();
                let width = f.width_of(e);
                self.apply_value(f, fun, arg_vals, width, rng)
            }
            other => unreachable!("parameterized {} has no value", other.name()),
        };
        local.insert(idx, value.clone());
        if e.is_neg() { value.not() } else { value }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn bottom_up_evaluation_matches_operators() {
        let mut f = Formula::new();
        let s = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s, None).unwrap();
        let c = f.mk_const(BitVector::from_u64(8, 10));
        let sum = f.mk_add(x, c).unwrap();
        let top = f.mk_ult(c, sum).unwrap();

        let mut m = Model::new();
        let mut rng = SmallRng::seed_from_u64(1);
        m.init(&f, &[top], &mut rng);

        // default assignment is zero
        assert!(m.value(x).is_zero());
        assert_eq!(m.value(sum), BitVector::from_u64(8, 10));
        assert!(m.value(top).is_false());

        // inverted edges complement the stored value
        assert_eq!(m.value(sum.not()), BitVector::from_u64(8, 245));
    }

    #[test]
    fn cone_update_refreshes_ancestors_only() {
        let mut f = Formula::new();
        let s = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s, None).unwrap();
        let y = f.mk_var(s, None).unwrap();
        let c = f.mk_const(BitVector::from_u64(8, 3));
        let sum = f.mk_add(x, c).unwrap();
        let other = f.mk_add(y, c).unwrap();
        let r1 = f.mk_ult(c, sum).unwrap();
        let r2 = f.mk_ult(c, other).unwrap();

        let mut m = Model::new();
        let mut rng = SmallRng::seed_from_u64(2);
        m.init(&f, &[r1, r2], &mut rng);

        let cone = m.update_cone(&f, &[(x, BitVector::from_u64(8, 7))], &mut rng);
        assert!(cone.contains(&sum.idx()) && cone.contains(&r1.idx()));
        assert!(!cone.contains(&other.idx()) && !cone.contains(&r2.idx()));

        assert_eq!(m.value(sum), BitVector::from_u64(8, 10));
        assert!(m.value(r1).is_true());
        // untouched cone keeps its old values
        assert_eq!(m.value(other), BitVector::from_u64(8, 3));
    }

    #[test]
    fn uf_applications_are_tabulated() {
        let mut f = Formula::new();
        let s8 = f.sort_bitvec(8).unwrap();
        let fs = f.sort_fun(&[s8], s8).unwrap();
        let g = f.mk_uf(fs, Some("g")).unwrap();
        let x = f.mk_var(s8, None).unwrap();
        let args = f.mk_args(&[x]).unwrap();
        let app = f.mk_apply(g, args).unwrap();
        let c = f.mk_const(BitVector::from_u64(8, 1));
        let root = f.mk_eq(app, c).unwrap();

        let mut m = Model::new();
        let mut rng = SmallRng::seed_from_u64(3);
        m.init(&f, &[root], &mut rng);

        // the probe for g(0) is recorded in the function model
        let table = m.fun_table(g).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.contains_key(&vec![BitVector::zero(8)]));
    }

    #[test]
    fn lambdas_beta_evaluate() {
        let mut f = Formula::new();
        let s8 = f.sort_bitvec(8).unwrap();
        let p = f.mk_param(s8, None).unwrap();
        let two = f.mk_const(BitVector::from_u64(8, 2));
        let body = f.mk_mul(p, two).unwrap();
        let double = f.mk_lambda(p, body).unwrap();

        let x = f.mk_var(s8, None).unwrap();
        let args = f.mk_args(&[x]).unwrap();
        let app = f.mk_apply(double, args).unwrap();
        let c = f.mk_const(BitVector::from_u64(8, 0));
        let root = f.mk_eq(app, c).unwrap();

        let mut m = Model::new();
        let mut rng = SmallRng::seed_from_u64(4);
        m.init(&f, &[root], &mut rng);
        assert!(m.value(app).is_zero());

        let mut rng2 = SmallRng::seed_from_u64(5);
        let _ = m.update_cone(&f, &[(x, BitVector::from_u64(8, 21))], &mut rng2);
        assert_eq!(m.value(app), BitVector::from_u64(8, 42));
    }
}
