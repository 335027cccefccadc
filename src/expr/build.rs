use crate::bits::BitVector;
use crate::error::{Error, Result};
use crate::expr::{Formula, NodeId, NodeKind};
use crate::sort::{Sort, SortId};

/// Smart constructors.
///
/// Every constructor chases proxies on its arguments, checks sorts, applies
/// the normalizations of the creation contract (commutative child ordering,
/// double-inversion absorption on `Eq`, constant normalization) and, at
/// rewrite level 1 and above, folds operators whose result is forced.
/// Whatever survives is interned, so structurally identical calls return
/// the same node id.
impl Formula {
    // ---- sorts --------------------------------------------------------

    /// The boolean sort.
    pub fn sort_bool(&mut self) -> SortId {
        self.sorts.bool_sort()
    }

    /// The bit-vector sort of the given width.
    pub fn sort_bitvec(&mut self, width: u32) -> Result<SortId> {
        self.sorts.bitvec(width)
    }

    /// An ordered product of sorts.
    pub fn sort_tuple(&mut self, parts: &[SortId]) -> SortId {
        self.sorts.intern(Sort::Tuple(parts.to_vec()))
    }

    /// An array sort from a bit-vector index to a bit-vector element.
    pub fn sort_array(&mut self, index: SortId, element: SortId) -> Result<SortId> {
        for (i, s) in [index, element].into_iter().enumerate() {
            if !matches!(self.sorts.get(s), Sort::BitVec(_)) {
                return Err(Error::sort("array-sort", i, "BitVec", self.sorts.describe(s)));
            }
        }
        Ok(self.sorts.intern(Sort::Array { index, element }))
    }

    /// A function sort with a tuple domain.
    pub fn sort_fun(&mut self, domain: &[SortId], codomain: SortId) -> Result<SortId> {
        for (i, s) in domain.iter().enumerate() {
            if !self.sorts.is_bitvec_like(*s) {
                return Err(Error::sort(
                    "fun-sort",
                    i,
                    "Bool or BitVec",
                    self.sorts.describe(*s),
                ));
            }
        }
        if !self.sorts.is_bitvec_like(codomain) {
            return Err(Error::sort(
                "fun-sort",
                domain.len(),
                "Bool or BitVec codomain",
                self.sorts.describe(codomain),
            ));
        }
        let domain = self.sort_tuple(domain);
        Ok(self.sorts.intern(Sort::Fun { domain, codomain }))
    }

    // ---- leaves -------------------------------------------------------

    /// A bit-vector constant node for the given value.
    ///
    /// Constants are normalized so that the stored value has its least
    /// significant bit clear; for an odd value the returned edge is
    /// inverted. Inverting a constant edge therefore never allocates.
    pub fn mk_const(&mut self, value: BitVector) -> NodeId {
        let sort = self
            .sorts
            .bitvec(value.width())
            .expect("bit-vector values have width >= 1");
        let e = self.const_inner(value, sort);
        self.ret(e)
    }

    /// The boolean constant `true`.
    pub fn mk_true(&mut self) -> NodeId {
        let sort = self.sorts.bool_sort();
        let e = self.const_inner(BitVector::from_u64(1, 1), sort);
        self.ret(e)
    }

    /// The boolean constant `false`.
    pub fn mk_false(&mut self) -> NodeId {
        let sort = self.sorts.bool_sort();
        let e = self.const_inner(BitVector::zero(1), sort);
        self.ret(e)
    }

    pub(crate) fn const_inner(&mut self, value: BitVector, sort: SortId) -> NodeId {
        if value.get_bit(0) {
            self.push_node(NodeKind::Const(value.not()), sort).not()
        } else {
            self.push_node(NodeKind::Const(value), sort)
        }
    }

    pub(crate) fn false_inner(&mut self, sort: SortId) -> NodeId {
        let width = self.sorts.width(sort).expect("bit-vector sort");
        self.const_inner(BitVector::zero(width), sort)
    }

    /// A free variable of boolean or bit-vector sort.
    pub fn mk_var(&mut self, sort: SortId, symbol: Option<&str>) -> Result<NodeId> {
        if !self.sorts.is_bitvec_like(sort) {
            return Err(Error::sort("var", 0, "Bool or BitVec", self.sorts.describe(sort)));
        }
        self.leaf(NodeKind::Var, sort, symbol)
    }

    /// An uninterpreted function or array symbol.
    pub fn mk_uf(&mut self, sort: SortId, symbol: Option<&str>) -> Result<NodeId> {
        if !matches!(self.sorts.get(sort), Sort::Fun { .. } | Sort::Array { .. }) {
            return Err(Error::sort("uf", 0, "Fun or Array", self.sorts.describe(sort)));
        }
        self.leaf(NodeKind::Uf, sort, symbol)
    }

    /// A lambda parameter, unbound until used in [`Formula::mk_lambda`].
    pub fn mk_param(&mut self, sort: SortId, symbol: Option<&str>) -> Result<NodeId> {
        if !self.sorts.is_bitvec_like(sort) {
            return Err(Error::sort("param", 0, "Bool or BitVec", self.sorts.describe(sort)));
        }
        self.leaf(
            NodeKind::Param {
                binder: NodeId::INVALID,
            },
            sort,
            symbol,
        )
    }

    fn leaf(&mut self, kind: NodeKind, sort: SortId, symbol: Option<&str>) -> Result<NodeId> {
        if let Some(name) = symbol {
            if self.node_by_symbol(name).is_some() {
                return Err(Error::DuplicateSymbol(name.to_string()));
            }
        }
        let id = self.push_node(kind, sort);
        if let Some(name) = symbol {
            self.attach_symbol(id, name)?;
        }
        Ok(self.ret(id))
    }

    // ---- edge-level operators -----------------------------------------

    /// The bitwise complement of an edge. Pure tag arithmetic: no node is
    /// ever allocated for `Not`.
    pub fn mk_not(&mut self, e: NodeId) -> NodeId {
        let e = self.chase(e).not();
        self.ret(e)
    }

    /// Disjunction via De Morgan: `a | b = !(!a & !b)`.
    pub fn mk_or(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let and = self.mk_and(a.not(), b.not())?;
        Ok(and.not())
    }

    // ---- operators ----------------------------------------------------

    /// Bitwise conjunction of two same-sorted operands.
    pub fn mk_and(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_same_bv("and", a, b)?;
        let sort = self.sort_of(a);
        if self.rewrite_level >= 1 {
            if a == b {
                return Ok(self.ret(a));
            }
            if a == b.not() {
                let e = self.false_inner(sort);
                return Ok(self.ret(e));
            }
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.and(&vb), sort);
                return Ok(self.ret(e));
            }
            if let Some(v) = self.const_value(a) {
                if v.is_zero() {
                    return Ok(self.ret(a));
                }
                if v.is_ones() {
                    return Ok(self.ret(b));
                }
            }
            if let Some(v) = self.const_value(b) {
                if v.is_zero() {
                    return Ok(self.ret(b));
                }
                if v.is_ones() {
                    return Ok(self.ret(a));
                }
            }
        }
        let (a, b) = self.ordered(a, b);
        let e = self.intern(NodeKind::And([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Equality. Bit-vector operands produce an `Eq` node; function-sorted
    /// operands produce a `FunEq` node.
    pub fn mk_eq(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (mut a, mut b) = (self.chase(a), self.chase(b));
        let bool_sort = self.sorts.bool_sort();

        if matches!(self.sorts.get(self.sort_of(a)), Sort::Fun { .. }) {
            if self.sort_of(a) != self.sort_of(b) {
                return Err(Error::sort(
                    "funeq",
                    1,
                    self.sorts.describe(self.sort_of(a)),
                    self.sorts.describe(self.sort_of(b)),
                ));
            }
            let (a, b) = self.ordered(a, b);
            let e = self.intern(NodeKind::FunEq([a, b]), bool_sort);
            return Ok(self.ret(e));
        }

        self.check_same_bv("eq", a, b)?;
        // Eq(!a, !b) is the same predicate as Eq(a, b)
        if a.is_neg() && b.is_neg() {
            a = a.not();
            b = b.not();
        }
        if self.rewrite_level >= 1 {
            if a == b {
                let e = self.const_inner(BitVector::from_u64(1, 1), bool_sort);
                return Ok(self.ret(e));
            }
            if a == b.not() {
                let e = self.const_inner(BitVector::zero(1), bool_sort);
                return Ok(self.ret(e));
            }
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(BitVector::from_bool(va == vb), bool_sort);
                return Ok(self.ret(e));
            }
        }
        let (a, b) = self.ordered(a, b);
        let e = self.intern(NodeKind::Eq([a, b]), bool_sort);
        Ok(self.ret(e))
    }

    /// Equality of two function-sorted nodes. Only recorded for the
    /// benefit of engines that reason about functions; the propagation
    /// engine treats roots containing it as out of scope.
    pub fn mk_fun_eq(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let a = self.chase(a);
        if !matches!(self.sorts.get(self.sort_of(a)), Sort::Fun { .. }) {
            return Err(Error::sort(
                "funeq",
                0,
                "Fun",
                self.sorts.describe(self.sort_of(a)),
            ));
        }
        self.mk_eq(a, b)
    }

    /// Unsigned less-than of two same-sorted operands.
    pub fn mk_ult(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_same_bv("ult", a, b)?;
        let bool_sort = self.sorts.bool_sort();
        if self.rewrite_level >= 1 {
            if a == b {
                let e = self.const_inner(BitVector::zero(1), bool_sort);
                return Ok(self.ret(e));
            }
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(BitVector::from_bool(va.ult(&vb)), bool_sort);
                return Ok(self.ret(e));
            }
            // nothing is below zero, nothing is above all-ones
            if self.const_value(b).is_some_and(|v| v.is_zero())
                || self.const_value(a).is_some_and(|v| v.is_ones())
            {
                let e = self.const_inner(BitVector::zero(1), bool_sort);
                return Ok(self.ret(e));
            }
        }
        let e = self.intern(NodeKind::Ult([a, b]), bool_sort);
        Ok(self.ret(e))
    }

    /// Addition modulo the operand width.
    pub fn mk_add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_same_bv("add", a, b)?;
        let sort = self.sort_of(a);
        if self.rewrite_level >= 1 {
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.add(&vb), sort);
                return Ok(self.ret(e));
            }
            if self.const_value(a).is_some_and(|v| v.is_zero()) {
                return Ok(self.ret(b));
            }
            if self.const_value(b).is_some_and(|v| v.is_zero()) {
                return Ok(self.ret(a));
            }
        }
        let (a, b) = self.ordered(a, b);
        let e = self.intern(NodeKind::Add([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Multiplication modulo the operand width.
    pub fn mk_mul(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_same_bv("mul", a, b)?;
        let sort = self.sort_of(a);
        if self.rewrite_level >= 1 {
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.mul(&vb), sort);
                return Ok(self.ret(e));
            }
            for (c, other) in [(a, b), (b, a)] {
                if let Some(v) = self.const_value(c) {
                    if v.is_zero() {
                        return Ok(self.ret(c));
                    }
                    if v.is_one() {
                        return Ok(self.ret(other));
                    }
                }
            }
        }
        let (a, b) = self.ordered(a, b);
        let e = self.intern(NodeKind::Mul([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Left shift. The operand width must be a power of two and the shift
    /// operand width its base-two logarithm.
    pub fn mk_shl(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_shift("shl", a, b)?;
        let sort = self.sort_of(a);
        if self.rewrite_level >= 1 {
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.shl(&vb), sort);
                return Ok(self.ret(e));
            }
            if self.const_value(b).is_some_and(|v| v.is_zero()) {
                return Ok(self.ret(a));
            }
        }
        let e = self.intern(NodeKind::Shl([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Logical right shift, with the same width rule as [`Formula::mk_shl`].
    pub fn mk_lshr(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_shift("lshr", a, b)?;
        let sort = self.sort_of(a);
        if self.rewrite_level >= 1 {
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.lshr(&vb), sort);
                return Ok(self.ret(e));
            }
            if self.const_value(b).is_some_and(|v| v.is_zero()) {
                return Ok(self.ret(a));
            }
        }
        let e = self.intern(NodeKind::Lshr([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Unsigned division; division by zero yields all-ones.
    pub fn mk_udiv(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_same_bv("udiv", a, b)?;
        let sort = self.sort_of(a);
        if self.rewrite_level >= 1 {
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.udiv(&vb), sort);
                return Ok(self.ret(e));
            }
            if self.const_value(b).is_some_and(|v| v.is_one()) {
                return Ok(self.ret(a));
            }
        }
        let e = self.intern(NodeKind::Udiv([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Unsigned remainder; remainder by zero yields the dividend.
    pub fn mk_urem(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_same_bv("urem", a, b)?;
        let sort = self.sort_of(a);
        if self.rewrite_level >= 1 {
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.urem(&vb), sort);
                return Ok(self.ret(e));
            }
            if self.const_value(b).is_some_and(|v| v.is_one()) {
                let e = self.false_inner(sort);
                return Ok(self.ret(e));
            }
        }
        let e = self.intern(NodeKind::Urem([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Concatenation; `a` occupies the high bits.
    pub fn mk_concat(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        let (a, b) = (self.chase(a), self.chase(b));
        self.check_bv_like("concat", 0, a)?;
        self.check_bv_like("concat", 1, b)?;
        let width = self.width_of(a) + self.width_of(b);
        let sort = self.sorts.bitvec(width).expect("widths are positive");
        if self.rewrite_level >= 1 {
            if let (Some(va), Some(vb)) = (self.const_value(a), self.const_value(b)) {
                let e = self.const_inner(va.concat(&vb), sort);
                return Ok(self.ret(e));
            }
        }
        let e = self.intern(NodeKind::Concat([a, b]), sort);
        Ok(self.ret(e))
    }

    /// Zero extension by `n` bits, expressed as a concatenation with a
    /// zero constant.
    pub fn mk_uext(&mut self, e: NodeId, n: u32) -> Result<NodeId> {
        if n == 0 {
            let e = self.chase(e);
            return Ok(self.ret(e));
        }
        let zero = BitVector::zero(n);
        let sort = self.sorts.bitvec(n)?;
        let pad = self.const_inner(zero, sort);
        self.mk_concat(pad, e)
    }

    /// The bits `hi..=lo` of the operand.
    pub fn mk_slice(&mut self, e: NodeId, hi: u32, lo: u32) -> Result<NodeId> {
        let e = self.chase(e);
        self.check_bv_like("slice", 0, e)?;
        let width = self.width_of(e);
        if hi < lo || hi >= width {
            return Err(Error::SliceBounds { hi, lo, width });
        }
        let sort = self.sorts.bitvec(hi - lo + 1).expect("slice width >= 1");
        if self.rewrite_level >= 1 {
            if let Some(v) = self.const_value(e) {
                let ec = self.const_inner(v.slice(hi, lo), sort);
                return Ok(self.ret(ec));
            }
            if lo == 0 && hi == width - 1 && !self.sorts.is_bool(self.sort_of(e)) {
                return Ok(self.ret(e));
            }
            // complement commutes with projection, so keep slices positive
            if e.is_neg() {
                let inner = self.slice_inner(e.not(), hi, lo, sort);
                return Ok(self.ret(inner.not()));
            }
        }
        let s = self.slice_inner(e, hi, lo, sort);
        Ok(self.ret(s))
    }

    fn slice_inner(&mut self, child: NodeId, hi: u32, lo: u32, sort: SortId) -> NodeId {
        self.intern(NodeKind::Slice { child, hi, lo }, sort)
    }

    /// If-then-else over a boolean condition; the branches must share a
    /// sort.
    pub fn mk_cond(&mut self, c: NodeId, t: NodeId, e: NodeId) -> Result<NodeId> {
        let (c, t, e) = (self.chase(c), self.chase(t), self.chase(e));
        if !self.sorts.is_bool(self.sort_of(c)) {
            return Err(Error::sort(
                "cond",
                0,
                "Bool",
                self.sorts.describe(self.sort_of(c)),
            ));
        }
        self.check_bv_like("cond", 1, t)?;
        if self.sort_of(t) != self.sort_of(e) {
            return Err(Error::sort(
                "cond",
                2,
                self.sorts.describe(self.sort_of(t)),
                self.sorts.describe(self.sort_of(e)),
            ));
        }
        let sort = self.sort_of(t);
        if self.rewrite_level >= 1 {
            if let Some(v) = self.const_value(c) {
                let enabled = if v.is_true() { t } else { e };
                return Ok(self.ret(enabled));
            }
            if t == e {
                return Ok(self.ret(t));
            }
        }
        let node = self.intern(NodeKind::Cond([c, t, e]), sort);
        Ok(self.ret(node))
    }

    /// An argument tuple for [`Formula::mk_apply`]; one to three
    /// arguments.
    pub fn mk_args(&mut self, args: &[NodeId]) -> Result<NodeId> {
        if args.is_empty() || args.len() > 3 {
            return Err(Error::sort("args", args.len(), "1 to 3 arguments", "tuple"));
        }
        let mut kids = Vec::with_capacity(args.len());
        let mut sorts = Vec::with_capacity(args.len());
        for (i, &a) in args.iter().enumerate() {
            let a = self.chase(a);
            self.check_bv_like("args", i, a)?;
            sorts.push(self.sort_of(a));
            kids.push(a);
        }
        let sort = self.sort_tuple(&sorts);
        let e = self.intern(NodeKind::Args(kids), sort);
        Ok(self.ret(e))
    }

    /// Application of a function-sorted node to an argument tuple.
    pub fn mk_apply(&mut self, fun: NodeId, args: NodeId) -> Result<NodeId> {
        let (fun, args) = (self.chase(fun), self.chase(args));
        let &Sort::Fun { domain, codomain } = self.sorts.get(self.sort_of(fun)) else {
            return Err(Error::sort(
                "apply",
                0,
                "Fun",
                self.sorts.describe(self.sort_of(fun)),
            ));
        };
        if fun.is_neg() {
            return Err(Error::sort("apply", 0, "an uninverted function edge", "inverted"));
        }
        if !matches!(self.kind(args), NodeKind::Args(_)) || self.sort_of(args) != domain {
            return Err(Error::sort(
                "apply",
                1,
                self.sorts.describe(domain),
                self.sorts.describe(self.sort_of(args)),
            ));
        }
        let e = self.intern(NodeKind::Apply([fun, args]), codomain);
        Ok(self.ret(e))
    }

    // ---- helpers ------------------------------------------------------

    pub(crate) fn ret(&mut self, e: NodeId) -> NodeId {
        self.inc_ref(e)
    }

    // commutative operands are kept sorted by id so that `op(a, b)` and
    // `op(b, a)` intern to the same node
    fn ordered(&self, a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if self.sort_exp && b.raw() < a.raw() {
            (b, a)
        } else {
            (a, b)
        }
    }

    fn check_bv_like(&self, op: &'static str, child: usize, e: NodeId) -> Result<()> {
        let sort = self.sort_of(e);
        if !self.sorts.is_bitvec_like(sort) {
            return Err(Error::sort(op, child, "Bool or BitVec", self.sorts.describe(sort)));
        }
        Ok(())
    }

    fn check_same_bv(&self, op: &'static str, a: NodeId, b: NodeId) -> Result<()> {
        self.check_bv_like(op, 0, a)?;
        self.check_bv_like(op, 1, b)?;
        if self.sort_of(a) != self.sort_of(b) {
            return Err(Error::sort(
                op,
                1,
                self.sorts.describe(self.sort_of(a)),
                self.sorts.describe(self.sort_of(b)),
            ));
        }
        Ok(())
    }

    fn check_shift(&self, op: &'static str, a: NodeId, b: NodeId) -> Result<()> {
        self.check_bv_like(op, 0, a)?;
        self.check_bv_like(op, 1, b)?;
        let w = self.width_of(a);
        if w < 2 || !w.is_power_of_two() {
            return Err(Error::sort(
                op,
                0,
                "a power-of-two width of at least 2",
                format!("BitVec({w})"),
            ));
        }
        let expected = w.trailing_zeros();
        if self.width_of(b) != expected {
            return Err(Error::sort(
                op,
                1,
                format!("BitVec({expected})"),
                self.sorts.describe(self.sort_of(b)),
            ));
        }
        Ok(())
    }
}
