use std::hash::BuildHasher;

use bitflags::bitflags;
use hashbrown::{HashMap, hash_map::RawEntryMut};
use rapidhash::quality::RandomState;
use serde::{Deserialize, Serialize};

use crate::bits::BitVector;
use crate::error::{Error, Result};
use crate::sort::{Sort, SortId, SortTable};

mod build;
mod iter;
mod lambda;

/// A handle to a node within a [`Formula`].
///
/// This is a lightweight wrapper around a `u32`. It packs both the index of
/// the node and its inversion state into a single integer, allowing for
/// extremely fast copying and hashing.
///
/// # Bit Layout
/// * **Bits 1..32:** The index of the node in the formula's node arena.
/// * **Bit 0 (LSB):** The inversion flag. 1 = bitwise complement of the
///   node, 0 = the node itself.
///
/// Because inversion lives in the handle, `Not` is never materialized as a
/// node: complementing an edge is a single XOR, and `e.not().not() == e`
/// holds for free. The flag is only meaningful on bit-vector and boolean
/// typed edges.
///
/// *Note: Because the LSB is used for inversion, the maximum number of
/// nodes in a single formula is `u32::MAX / 2`.*
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "fast-binary", derive(bitcode::Encode, bitcode::Decode))]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) const INVALID: Self = Self(u32::MAX);

    pub(crate) fn new(idx: usize, neg: bool) -> Self {
        Self(((idx as u32) << 1) | (neg as u32))
    }
    pub(crate) fn raw(&self) -> u32 {
        self.0
    }
    pub(crate) fn idx(&self) -> usize {
        (self.0 >> 1) as usize
    }
    pub(crate) fn is_neg(&self) -> bool {
        (self.0 & 1) == 1
    }

    /// The complement of this edge.
    pub fn not(&self) -> Self {
        Self(self.0 ^ 1)
    }

    /// This edge without its inversion flag.
    pub fn pos(&self) -> Self {
        Self(self.0 & !1)
    }
}

/// An entry in a parent list: a parent node index tagged with the child
/// position (0, 1 or 2) that the edge occupies in the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParentEdge(u32);

impl ParentEdge {
    pub(crate) const NONE: Self = Self(u32::MAX);

    fn new(parent: usize, pos: usize) -> Self {
        Self(((parent as u32) << 2) | pos as u32)
    }
    pub(crate) fn idx(&self) -> usize {
        (self.0 >> 2) as usize
    }
    pub(crate) fn pos(&self) -> usize {
        (self.0 & 3) as usize
    }
    pub(crate) fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub(crate) struct NodeFlags: u8 {
        /// The node contains a free lambda parameter.
        const PARAMETERIZED = 0b0000_0001;
        /// A lambda node occurs somewhere below this node.
        const LAMBDA_BELOW  = 0b0000_0010;
        /// A function application occurs somewhere below this node.
        const APPLY_BELOW   = 0b0000_0100;
        /// The node has been asserted as a constraint root.
        const CONSTRAINT    = 0b0000_1000;
        /// The node was rewritten into a proxy.
        const SIMPLIFIED    = 0b0001_0000;
        /// The node was removed from the unique table.
        const ERASED        = 0b0010_0000;
        /// The node's child edges have been taken down.
        const DISCONNECTED  = 0b0100_0000;
    }
}

/// The operator of a node together with its child edges.
#[derive(Debug, Clone, PartialEq, Hash)]
pub enum NodeKind {
    /// A concrete bit-vector value. The stored value always has its least
    /// significant bit clear; odd constants are represented as the inverted
    /// edge of their complement.
    Const(BitVector),
    /// A free bit-vector or boolean variable.
    Var,
    /// An uninterpreted function or array symbol.
    Uf,
    /// A parameter bound by a lambda; `binder` back-links to the lambda
    /// once the parameter is bound.
    Param { binder: NodeId },
    /// An argument tuple for a function application.
    Args(Vec<NodeId>),
    /// The bits `hi..=lo` of the child.
    Slice { child: NodeId, hi: u32, lo: u32 },
    /// Bitwise conjunction.
    And([NodeId; 2]),
    /// Bit-vector equality.
    Eq([NodeId; 2]),
    /// Equality of function-sorted nodes.
    FunEq([NodeId; 2]),
    /// Unsigned less-than.
    Ult([NodeId; 2]),
    /// Addition modulo the width.
    Add([NodeId; 2]),
    /// Multiplication modulo the width.
    Mul([NodeId; 2]),
    /// Left shift; the right child holds the shift distance.
    Shl([NodeId; 2]),
    /// Logical right shift.
    Lshr([NodeId; 2]),
    /// Unsigned division, `x / 0 = 2^w - 1`.
    Udiv([NodeId; 2]),
    /// Unsigned remainder, `x % 0 = x`.
    Urem([NodeId; 2]),
    /// Concatenation; the left child occupies the high bits.
    Concat([NodeId; 2]),
    /// Function application: `[function, args]`.
    Apply([NodeId; 2]),
    /// A lambda abstraction: `[param, body]`.
    Lambda([NodeId; 2]),
    /// If-then-else on a boolean condition.
    Cond([NodeId; 3]),
    /// A forwarding edge to the node this one was rewritten into.
    Proxy(NodeId),
    /// Tombstone for a deallocated arena slot; ids are never reused so
    /// that ascending index order stays a topological order.
    Released,
}

impl NodeKind {
    pub(crate) fn children(&self) -> &[NodeId] {
        use NodeKind::*;
        match self {
            Const(_) | Var | Uf | Param { .. } | Released => &[],
            Proxy(t) => std::slice::from_ref(t),
            Slice { child, .. } => std::slice::from_ref(child),
            Args(kids) => kids,
            And(k) | Eq(k) | FunEq(k) | Ult(k) | Add(k) | Mul(k) | Shl(k) | Lshr(k) | Udiv(k)
            | Urem(k) | Concat(k) | Apply(k) | Lambda(k) => k,
            Cond(k) => k,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        use NodeKind::*;
        match self {
            Const(_) => "const",
            Var => "var",
            Uf => "uf",
            Param { .. } => "param",
            Args(_) => "args",
            Slice { .. } => "slice",
            And(_) => "and",
            Eq(_) => "eq",
            FunEq(_) => "funeq",
            Ult(_) => "ult",
            Add(_) => "add",
            Mul(_) => "mul",
            Shl(_) => "shl",
            Lshr(_) => "lshr",
            Udiv(_) => "udiv",
            Urem(_) => "urem",
            Concat(_) => "concat",
            Apply(_) => "apply",
            Lambda(_) => "lambda",
            Cond(_) => "cond",
            Proxy(_) => "proxy",
            Released => "released",
        }
    }

    fn is_interned(&self) -> bool {
        !self.children().is_empty() && !matches!(self, NodeKind::Proxy(_))
    }
}

/// One slot of the node arena.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) sort: SortId,
    pub(crate) flags: NodeFlags,
    /// Internal references: one per incoming child edge.
    refs: u32,
    /// External references: API handles held by the embedder.
    ext_refs: u32,
    /// Proxy chain bound: strictly decreases along every `Proxy` hop.
    rewrites: u32,
    first_parent: ParentEdge,
    last_parent: ParentEdge,
    prev_parent: [ParentEdge; 3],
    next_parent: [ParentEdge; 3],
}

impl Node {
    pub(crate) fn first_parent(&self) -> ParentEdge {
        self.first_parent
    }
}

const MAX_NODES: usize = (u32::MAX >> 1) as usize;
const MAX_REWRITES: u32 = 1 << 20;

/// A hash-consed DAG of bit-vector expressions.
///
/// `Formula` stores nodes in a flat arena and interns every node with
/// children: two structurally identical nodes are the same object, so
/// structural equality is a handle comparison. Ids are handed out in
/// creation order and never reused, which makes ascending index order a
/// topological order of the DAG; the model layer relies on this.
///
/// Each node keeps a doubly-linked list of its incoming edges (its
/// *parents*), threaded through the parents' per-position link slots; the
/// cone-of-influence computation walks these lists upwards.
///
/// # Example
/// ```rust
/// use bitprop::{BitVector, Formula};
///
/// let mut f = Formula::new();
/// let bv8 = f.sort_bitvec(8).unwrap();
/// let x = f.mk_var(bv8, Some("x")).unwrap();
/// let c = f.mk_const(BitVector::from_u64(8, 3));
///
/// // structurally identical nodes are interned
/// let s1 = f.mk_add(x, c).unwrap();
/// let s2 = f.mk_add(x, c).unwrap();
/// assert_eq!(s1, s2);
///
/// // negation lives on the edge: no node is allocated
/// let n = f.mk_not(s1);
/// assert_eq!(n.not(), s1);
/// ```
pub struct Formula {
    pub(crate) nodes: Vec<Node>,
    unique: HashMap<NodeId, (), RandomState>,
    pub(crate) sorts: SortTable,
    symbols: HashMap<String, NodeId, RandomState>,
    names: HashMap<u32, String, RandomState>,
    /// Free variables and uninterpreted symbols, in creation order.
    inputs: Vec<NodeId>,
    lambdas: Vec<NodeId>,
    pub(crate) lambda_hashes: HashMap<u32, u64, RandomState>,
    /// Free parameter ids per parameterized node.
    param_sets: HashMap<u32, Vec<NodeId>, RandomState>,
    feqs: Vec<NodeId>,
    pub(crate) sort_exp: bool,
    pub(crate) rewrite_level: u8,
}

impl Default for Formula {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            unique: HashMap::with_hasher(RandomState::new()),
            sorts: SortTable::new(),
            symbols: HashMap::with_hasher(RandomState::new()),
            names: HashMap::with_hasher(RandomState::new()),
            inputs: Vec::new(),
            lambdas: Vec::new(),
            lambda_hashes: HashMap::with_hasher(RandomState::new()),
            param_sets: HashMap::with_hasher(RandomState::new()),
            feqs: Vec::new(),
            sort_exp: true,
            rewrite_level: 3,
        }
    }
}

// structural hash of an arena slot; lambdas use their cached alpha hash
fn hash_node(
    nodes: &[Node],
    lambda_hashes: &HashMap<u32, u64, RandomState>,
    hb: &RandomState,
    idx: usize,
) -> u64 {
    match &nodes[idx].kind {
        NodeKind::Lambda(_) => lambda_hashes[&(idx as u32)],
        kind => hb.hash_one(kind),
    }
}

impl Formula {
    /// Creates a new, empty formula.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of arena slots, live and released.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes currently held by the unique table.
    pub fn unique_count(&self) -> usize {
        self.unique.len()
    }

    pub(crate) fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// The kind of the node behind an edge (inversion ignored).
    pub fn kind(&self, e: NodeId) -> &NodeKind {
        &self.nodes[e.idx()].kind
    }

    /// The sort of the node behind an edge.
    pub fn sort_of(&self, e: NodeId) -> SortId {
        self.nodes[e.idx()].sort
    }

    /// The evaluation width of a bit-vector or boolean typed edge.
    pub fn width_of(&self, e: NodeId) -> u32 {
        self.sorts
            .width(self.nodes[e.idx()].sort)
            .expect("width of a non-bit-vector node")
    }

    /// True iff the edge points at a constant.
    pub fn is_const(&self, e: NodeId) -> bool {
        matches!(self.nodes[e.idx()].kind, NodeKind::Const(_))
    }

    /// The value of a constant edge, with the inversion flag applied.
    pub fn const_value(&self, e: NodeId) -> Option<BitVector> {
        match &self.nodes[e.idx()].kind {
            NodeKind::Const(v) if e.is_neg() => Some(v.not()),
            NodeKind::Const(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// The symbol attached to the node behind `e`, if any.
    pub fn symbol(&self, e: NodeId) -> Option<&str> {
        self.names.get(&(e.idx() as u32)).map(String::as_str)
    }

    /// Looks a node up by symbol name.
    pub fn node_by_symbol(&self, name: &str) -> Option<NodeId> {
        self.symbols.get(name).copied()
    }

    pub(crate) fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub(crate) fn feqs(&self) -> &[NodeId] {
        &self.feqs
    }

    pub(crate) fn free_params(&self, idx: usize) -> &[NodeId] {
        self.param_sets
            .get(&(idx as u32))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Follows proxy forwarding until a live node is reached, composing
    /// the inversion flags along the way.
    pub fn chase(&self, mut e: NodeId) -> NodeId {
        while let NodeKind::Proxy(t) = &self.nodes[e.idx()].kind {
            e = if e.is_neg() { t.not() } else { *t };
        }
        e
    }

    /// Registers a fresh external reference to the node behind `e`.
    pub fn inc_ref(&mut self, e: NodeId) -> NodeId {
        let n = &mut self.nodes[e.idx()];
        n.ext_refs = n
            .ext_refs
            .checked_add(1)
            .expect("reference counter overflow");
        e
    }

    /// Releases an external reference. Once a node has neither external
    /// references nor parents it is erased from the unique table,
    /// disconnected from its children and its slot tombstoned; children
    /// are released recursively.
    pub fn release(&mut self, e: NodeId) {
        let idx = e.idx();
        let n = &mut self.nodes[idx];
        assert!(n.ext_refs > 0, "release without a matching reference");
        n.ext_refs -= 1;
        self.try_free(idx);
    }

    // ---- interning ----------------------------------------------------

    /// Returns the unique node for `kind`, creating it if necessary.
    /// `kind` must be an interned (arity > 0, non-proxy) kind.
    pub(crate) fn intern(&mut self, kind: NodeKind, sort: SortId) -> NodeId {
        debug_assert!(kind.is_interned());
        let hb = *self.unique.hasher();
        let hash = hb.hash_one(&kind);
        let nodes = &self.nodes;
        if let RawEntryMut::Occupied(entry) = self
            .unique
            .raw_entry_mut()
            .from_hash(hash, |id| nodes[id.idx()].kind == kind)
        {
            return *entry.key();
        }
        let id = self.push_node(kind, sort);
        self.insert_unique(hash, id);
        id
    }

    pub(crate) fn insert_unique(&mut self, hash: u64, id: NodeId) {
        let nodes = &self.nodes;
        let lambda_hashes = &self.lambda_hashes;
        let hb = *self.unique.hasher();
        match self.unique.raw_entry_mut().from_hash(hash, |_| false) {
            RawEntryMut::Vacant(entry) => {
                entry.insert_with_hasher(hash, id, (), |id| {
                    hash_node(nodes, lambda_hashes, &hb, id.idx())
                });
            }
            RawEntryMut::Occupied(_) => unreachable!("duplicate unique-table insert"),
        }
    }

    pub(crate) fn lookup_unique(
        &mut self,
        hash: u64,
        mut eq: impl FnMut(&[Node], NodeId) -> bool,
    ) -> Option<NodeId> {
        let nodes = &self.nodes;
        match self
            .unique
            .raw_entry_mut()
            .from_hash(hash, |&id| eq(nodes, id))
        {
            RawEntryMut::Occupied(entry) => Some(*entry.key()),
            RawEntryMut::Vacant(_) => None,
        }
    }

    fn remove_unique(&mut self, idx: usize) {
        if self.nodes[idx].flags.contains(NodeFlags::ERASED) {
            return;
        }
        self.nodes[idx].flags.insert(NodeFlags::ERASED);
        if !self.nodes[idx].kind.is_interned() {
            return;
        }
        let hb = *self.unique.hasher();
        let hash = hash_node(&self.nodes, &self.lambda_hashes, &hb, idx);
        if let RawEntryMut::Occupied(entry) = self
            .unique
            .raw_entry_mut()
            .from_hash(hash, |id| id.idx() == idx)
        {
            entry.remove();
        }
    }

    // ---- arena --------------------------------------------------------

    /// Appends a fresh node and wires up its child edges. The caller is
    /// responsible for unique-table bookkeeping.
    pub(crate) fn push_node(&mut self, kind: NodeKind, sort: SortId) -> NodeId {
        assert!(self.nodes.len() < MAX_NODES, "node arena exhausted");
        let idx = self.nodes.len();

        let mut flags = NodeFlags::empty();
        let mut params: Vec<NodeId> = Vec::new();
        for &c in kind.children() {
            let cn = &self.nodes[c.idx()];
            if cn.flags.contains(NodeFlags::PARAMETERIZED) {
                flags.insert(NodeFlags::PARAMETERIZED);
            }
            if matches!(cn.kind, NodeKind::Lambda(_)) || cn.flags.contains(NodeFlags::LAMBDA_BELOW)
            {
                flags.insert(NodeFlags::LAMBDA_BELOW);
            }
            if matches!(cn.kind, NodeKind::Apply(_)) || cn.flags.contains(NodeFlags::APPLY_BELOW) {
                flags.insert(NodeFlags::APPLY_BELOW);
            }
            for &p in self.free_params(c.idx()) {
                if !params.contains(&p) {
                    params.push(p);
                }
            }
        }
        if let NodeKind::Lambda([param, _]) = &kind {
            params.retain(|p| p.idx() != param.idx());
            if params.is_empty() {
                flags.remove(NodeFlags::PARAMETERIZED);
            }
        }
        if matches!(kind, NodeKind::Param { .. }) {
            flags.insert(NodeFlags::PARAMETERIZED);
            params.push(NodeId::new(idx, false));
        }

        let children: Vec<NodeId> = kind.children().to_vec();
        self.nodes.push(Node {
            kind,
            sort,
            flags,
            refs: 0,
            ext_refs: 0,
            rewrites: 0,
            first_parent: ParentEdge::NONE,
            last_parent: ParentEdge::NONE,
            prev_parent: [ParentEdge::NONE; 3],
            next_parent: [ParentEdge::NONE; 3],
        });
        for (pos, &c) in children.iter().enumerate() {
            self.connect(idx, pos, c);
        }
        if !params.is_empty() {
            params.sort_unstable();
            self.param_sets.insert(idx as u32, params);
        }

        let id = NodeId::new(idx, false);
        match &self.nodes[idx].kind {
            NodeKind::Var | NodeKind::Uf => self.inputs.push(id),
            NodeKind::Lambda(_) => self.lambdas.push(id),
            NodeKind::FunEq(_) => self.feqs.push(id),
            _ => {}
        }
        id
    }

    /// Links `parent`'s edge at `pos` into the parent list of the node
    /// behind `child` and takes an internal reference on it.
    fn connect(&mut self, parent: usize, pos: usize, child: NodeId) {
        let c = child.idx();
        let entry = ParentEdge::new(parent, pos);
        let head = self.nodes[c].first_parent;
        self.nodes[parent].next_parent[pos] = head;
        self.nodes[parent].prev_parent[pos] = ParentEdge::NONE;
        if head.is_none() {
            self.nodes[c].last_parent = entry;
        } else {
            self.nodes[head.idx()].prev_parent[head.pos()] = entry;
        }
        self.nodes[c].first_parent = entry;
        let n = &mut self.nodes[c];
        n.refs = n.refs.checked_add(1).expect("reference counter overflow");
    }

    /// Unlinks `parent`'s edge at `pos` from the parent list of `child`
    /// and drops the internal reference.
    fn disconnect(&mut self, parent: usize, pos: usize, child: NodeId) {
        let c = child.idx();
        let prev = self.nodes[parent].prev_parent[pos];
        let next = self.nodes[parent].next_parent[pos];
        if prev.is_none() {
            self.nodes[c].first_parent = next;
        } else {
            self.nodes[prev.idx()].next_parent[prev.pos()] = next;
        }
        if next.is_none() {
            self.nodes[c].last_parent = prev;
        } else {
            self.nodes[next.idx()].prev_parent[next.pos()] = prev;
        }
        self.nodes[parent].prev_parent[pos] = ParentEdge::NONE;
        self.nodes[parent].next_parent[pos] = ParentEdge::NONE;
        self.nodes[c].refs -= 1;
    }

    fn try_free(&mut self, idx: usize) {
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            {
                let n = &self.nodes[i];
                if n.refs > 0 || n.ext_refs > 0 || matches!(n.kind, NodeKind::Released) {
                    continue;
                }
            }
            self.remove_unique(i);
            let kids: Vec<NodeId> = self.nodes[i].kind.children().to_vec();
            for (pos, &c) in kids.iter().enumerate() {
                self.disconnect(i, pos, c);
                stack.push(c.idx());
            }
            self.nodes[i].flags.insert(NodeFlags::DISCONNECTED);
            self.nodes[i].kind = NodeKind::Released;
            let key = i as u32;
            if let Some(name) = self.names.remove(&key) {
                self.symbols.remove(&name);
            }
            self.param_sets.remove(&key);
            self.lambda_hashes.remove(&key);
            let gone = NodeId::new(i, false);
            self.inputs.retain(|&n| n != gone);
            self.lambdas.retain(|&n| n != gone);
            self.feqs.retain(|&n| n != gone);
        }
    }

    // ---- proxies ------------------------------------------------------

    /// Rewrites the node behind `old` into a forwarding proxy for
    /// `target`. All later lookups through `old` chase to `target`.
    pub(crate) fn set_proxy(&mut self, old: NodeId, target: NodeId) {
        let idx = old.idx();
        let target = self.chase(if old.is_neg() { target.not() } else { target });
        assert!(target.idx() != idx, "proxy cycle");
        let depth = self.nodes[target.idx()].rewrites + 1;
        assert!(depth < MAX_REWRITES, "proxy chain too deep");

        self.remove_unique(idx);
        let kids: Vec<NodeId> = self.nodes[idx].kind.children().to_vec();
        for (pos, &c) in kids.iter().enumerate() {
            self.disconnect(idx, pos, c);
        }
        self.nodes[idx].kind = NodeKind::Proxy(target);
        self.nodes[idx].rewrites = depth;
        self.nodes[idx].flags.insert(NodeFlags::SIMPLIFIED);
        self.connect(idx, 0, target);
        for k in kids {
            self.try_free(k.idx());
        }
    }

    pub(crate) fn mark_constraint(&mut self, e: NodeId) {
        self.nodes[e.idx()].flags.insert(NodeFlags::CONSTRAINT);
    }

    pub(crate) fn attach_symbol(&mut self, id: NodeId, name: &str) -> Result<()> {
        if self.symbols.contains_key(name) {
            return Err(Error::DuplicateSymbol(name.to_string()));
        }
        self.symbols.insert(name.to_string(), id);
        self.names.insert(id.idx() as u32, name.to_string());
        Ok(())
    }

    pub(crate) fn sort(&self, id: SortId) -> &Sort {
        self.sorts.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv8(f: &mut Formula) -> SortId {
        f.sort_bitvec(8).unwrap()
    }

    #[test]
    fn hash_consing_is_idempotent() {
        let mut f = Formula::new();
        let s = bv8(&mut f);
        let x = f.mk_var(s, None).unwrap();
        let y = f.mk_var(s, None).unwrap();
        assert_ne!(x, y); // variables are identified by id, never merged

        let a = f.mk_and(x, y).unwrap();
        let b = f.mk_and(x, y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn commutative_children_are_sorted() {
        let mut f = Formula::new();
        let s = bv8(&mut f);
        let x = f.mk_var(s, None).unwrap();
        let y = f.mk_var(s, None).unwrap();
        assert_eq!(f.mk_and(x, y).unwrap(), f.mk_and(y, x).unwrap());
        assert_eq!(f.mk_add(x, y).unwrap(), f.mk_add(y, x).unwrap());
        assert_eq!(f.mk_mul(x, y).unwrap(), f.mk_mul(y, x).unwrap());
        assert_eq!(f.mk_eq(x, y).unwrap(), f.mk_eq(y, x).unwrap());
    }

    #[test]
    fn eq_absorbs_double_inversion() {
        let mut f = Formula::new();
        let s = bv8(&mut f);
        let x = f.mk_var(s, None).unwrap();
        let y = f.mk_var(s, None).unwrap();
        let plain = f.mk_eq(x, y).unwrap();
        let inv = f.mk_eq(x.not(), y.not()).unwrap();
        assert_eq!(plain, inv);
    }

    #[test]
    fn inversion_is_free_and_involutive() {
        let mut f = Formula::new();
        let s = bv8(&mut f);
        let x = f.mk_var(s, None).unwrap();
        let before = f.node_count();
        let n = f.mk_not(x);
        assert_eq!(f.node_count(), before);
        assert_eq!(f.mk_not(n), x);
    }

    #[test]
    fn constants_absorb_inversion() {
        let mut f = Formula::new();
        let c = f.mk_const(BitVector::from_u64(4, 0b0101));
        // odd constants are stored complemented behind an inverted edge
        assert!(c.is_neg());
        assert_eq!(f.const_value(c).unwrap(), BitVector::from_u64(4, 0b0101));
        assert_eq!(
            f.const_value(c.not()).unwrap(),
            BitVector::from_u64(4, 0b1010)
        );
    }

    #[test]
    fn release_restores_table_population() {
        let mut f = Formula::new();
        let s = bv8(&mut f);
        let x = f.mk_var(s, None).unwrap();
        let y = f.mk_var(s, None).unwrap();
        let before = f.unique_count();

        let sum = f.mk_add(x, y).unwrap();
        let prod = f.mk_mul(sum, y).unwrap();
        assert_eq!(f.unique_count(), before + 2);

        f.release(prod);
        f.release(sum);
        assert_eq!(f.unique_count(), before);
        assert!(matches!(f.kind(prod), NodeKind::Released));
        // the variables are still externally held
        assert!(matches!(f.kind(x), NodeKind::Var));
    }

    #[test]
    fn parents_track_every_edge() {
        let mut f = Formula::new();
        let s = bv8(&mut f);
        let x = f.mk_var(s, None).unwrap();
        let y = f.mk_var(s, None).unwrap();
        let a = f.mk_add(x, y).unwrap();
        let m = f.mk_mul(x, y).unwrap();
        let _top = f.mk_and(a, m).unwrap();

        let parents: Vec<usize> = f.parents(x.idx()).map(|(p, _)| p).collect();
        assert_eq!(parents.len(), 2);
        assert!(parents.contains(&a.idx()) && parents.contains(&m.idx()));
    }

    #[test]
    fn proxy_chasing_composes_inversion() {
        let mut f = Formula::new();
        let s = bv8(&mut f);
        let x = f.mk_var(s, None).unwrap();
        let c = f.mk_const(BitVector::from_u64(8, 6));
        f.set_proxy(x, c);
        assert_eq!(f.chase(x), c);
        assert_eq!(f.chase(x.not()), c.not());
    }
}
