use std::hash::BuildHasher;
use std::mem::discriminant;

use hashbrown::HashMap;

use crate::error::{Error, Result};
use crate::expr::{Formula, Node, NodeId, NodeKind};
use crate::sort::Sort;

/// Lambda construction.
///
/// A lambda's structural key must include its body, but bodies may share
/// parameters with other lambdas, so the key is computed by traversing the
/// body with every parameter replaced by a canonical representative (its
/// first-encounter number). The resulting hash is cached at creation;
/// structural lookups then compare bodies up to alpha-renaming.
///
/// Curried lambdas are kept verbatim: `λx. λy. B` stays two nodes; only
/// the *sort* flattens the parameter chain into a tuple domain.
impl Formula {
    /// Binds `param` over `body`. The parameter must be a fresh
    /// [`NodeKind::Param`] that is not yet bound by another lambda.
    pub fn mk_lambda(&mut self, param: NodeId, body: NodeId) -> Result<NodeId> {
        let (param, body) = (self.chase(param), self.chase(body));
        if param.is_neg() {
            return Err(Error::sort("lambda", 0, "an uninverted parameter edge", "inverted"));
        }
        match self.kind(param) {
            NodeKind::Param { binder } if *binder == NodeId::INVALID => {}
            NodeKind::Param { .. } => {
                return Err(Error::sort("lambda", 0, "an unbound parameter", "a bound parameter"));
            }
            other => {
                return Err(Error::sort("lambda", 0, "a parameter node", other.name()));
            }
        }

        // the domain flattens the curried parameter chain; the codomain is
        // the innermost body sort
        let param_sort = self.sort_of(param);
        let (mut domain, codomain) = match self.sorts.get(self.sort_of(body)) {
            &Sort::Fun { domain, codomain } => match self.sorts.get(domain) {
                Sort::Tuple(parts) => (parts.clone(), codomain),
                _ => (vec![domain], codomain),
            },
            _ => (Vec::new(), self.sort_of(body)),
        };
        domain.insert(0, param_sort);
        let domain = self.sort_tuple(&domain);
        let sort = self.sorts.intern(Sort::Fun { domain, codomain });

        let hash = self.alpha_hash(param, body);
        if let Some(existing) = self.lookup_unique(hash, |nodes, id| {
            match &nodes[id.idx()].kind {
                NodeKind::Lambda([p, b]) => alpha_eq(nodes, (param, body), (*p, *b)),
                _ => false,
            }
        }) {
            return Ok(self.ret(existing));
        }

        let id = self.push_node(NodeKind::Lambda([param, body]), sort);
        if let NodeKind::Param { binder } = &mut self.nodes[param.idx()].kind {
            *binder = id;
        }
        self.lambda_hashes.insert(id.idx() as u32, hash);
        self.insert_unique(hash, id);
        Ok(self.ret(id))
    }

    // body-traversal hash with parameters numbered by first encounter;
    // the bound parameter is always number zero
    fn alpha_hash(&self, param: NodeId, body: NodeId) -> u64 {
        let hb = *self.lambda_hashes.hasher();
        let mut order: HashMap<usize, u64> = HashMap::new();
        order.insert(param.idx(), 0);
        let mut memo: HashMap<usize, u64> = HashMap::new();
        let body_hash = self.alpha_hash_rec(body, &hb, &mut order, &mut memo);
        hb.hash_one(&(0xACu8, body_hash))
    }

    fn alpha_hash_rec(
        &self,
        e: NodeId,
        hb: &rapidhash::quality::RandomState,
        order: &mut HashMap<usize, u64>,
        memo: &mut HashMap<usize, u64>,
    ) -> u64 {
        let idx = e.idx();
        let base = if let Some(&h) = memo.get(&idx) {
            h
        } else {
            let h = match &self.nodes[idx].kind {
                NodeKind::Param { .. } => {
                    let next = order.len() as u64;
                    let n = *order.entry(idx).or_insert(next);
                    hb.hash_one(&(1u8, n))
                }
                NodeKind::Const(v) => hb.hash_one(&(2u8, v)),
                // free leaves keep their identity
                NodeKind::Var | NodeKind::Uf => hb.hash_one(&(3u8, idx as u64)),
                NodeKind::Slice { child, hi, lo } => {
                    let c = self.alpha_hash_rec(*child, hb, order, memo);
                    hb.hash_one(&(4u8, c, *hi, *lo))
                }
                kind => {
                    let tag = kind.name();
                    let mut acc = hb.hash_one(&(5u8, tag));
                    for &c in kind.children() {
                        let ch = self.alpha_hash_rec(c, hb, order, memo);
                        acc = hb.hash_one(&(acc, ch));
                    }
                    acc
                }
            };
            memo.insert(idx, h);
            h
        };
        if e.is_neg() { base ^ 0x9E37_79B9_7F4A_7C15 } else { base }
    }
}

/// Structural equality of two lambda abstractions up to renaming of their
/// bound parameters.
pub(super) fn alpha_eq(nodes: &[Node], a: (NodeId, NodeId), b: (NodeId, NodeId)) -> bool {
    if nodes[a.0.idx()].sort != nodes[b.0.idx()].sort {
        return false;
    }
    let mut map: HashMap<usize, usize> = HashMap::new();
    map.insert(a.0.idx(), b.0.idx());
    alpha_eq_rec(nodes, a.1, b.1, &mut map)
}

fn alpha_eq_rec(
    nodes: &[Node],
    x: NodeId,
    y: NodeId,
    map: &mut HashMap<usize, usize>,
) -> bool {
    if x.is_neg() != y.is_neg() {
        return false;
    }
    let (xi, yi) = (x.idx(), y.idx());
    if nodes[xi].sort != nodes[yi].sort {
        return false;
    }
    let (kx, ky) = (&nodes[xi].kind, &nodes[yi].kind);
    match (kx, ky) {
        (NodeKind::Param { .. }, NodeKind::Param { .. }) => map.get(&xi) == Some(&yi),
        (NodeKind::Const(a), NodeKind::Const(b)) => a == b,
        (NodeKind::Var, NodeKind::Var) | (NodeKind::Uf, NodeKind::Uf) => xi == yi,
        (
            NodeKind::Slice { child: c1, hi: h1, lo: l1 },
            NodeKind::Slice { child: c2, hi: h2, lo: l2 },
        ) => h1 == h2 && l1 == l2 && alpha_eq_rec(nodes, *c1, *c2, map),
        (NodeKind::Lambda([p1, b1]), NodeKind::Lambda([p2, b2])) => {
            if nodes[p1.idx()].sort != nodes[p2.idx()].sort {
                return false;
            }
            map.insert(p1.idx(), p2.idx());
            alpha_eq_rec(nodes, *b1, *b2, map)
        }
        _ => {
            if xi == yi {
                return true;
            }
            if discriminant(kx) != discriminant(ky) {
                return false;
            }
            let (cx, cy) = (kx.children(), ky.children());
            cx.len() == cy.len()
                && cx
                    .iter()
                    .zip(cy)
                    .all(|(&a, &b)| alpha_eq_rec(nodes, a, b, map))
        }
    }
}
