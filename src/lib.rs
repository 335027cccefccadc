//! A propagation-based local-search decision procedure for fixed-width
//! bit-vector constraints.
//!
//! Formulas are built into a hash-consed DAG ([`Formula`]) whose edges fold
//! boolean negation into a tag bit, so `not` never allocates. A concrete
//! assignment ([`model::Model`]) is evaluated bottom-up and kept consistent
//! through cone-of-influence updates. The engine ([`Solver::check_sat`])
//! repeatedly picks a violated root, walks down to a variable choosing at
//! each operator which operand must change and what value it should take
//! (the inverse- and consistent-value libraries), writes the new value
//! through, and stops when every root is satisfied or a budget runs out.
//!
//! The procedure is sound but incomplete: `Sat` answers come with a model,
//! while an exhausted move budget yields `Unknown`, never a wrong `Unsat`.
//!
//! ```rust
//! use bitprop::{Answer, BitVector, OptionKey, Solver};
//!
//! let mut solver = Solver::new();
//! solver.set_option(OptionKey::Seed, 42).unwrap();
//!
//! let f = solver.formula_mut();
//! let bv4 = f.sort_bitvec(4).unwrap();
//! let x = f.mk_var(bv4, Some("x")).unwrap();
//! let nine = f.mk_const(BitVector::from_u64(4, 0b1001));
//! let three = f.mk_const(BitVector::from_u64(4, 0b0011));
//! let sum = f.mk_add(x, nine).unwrap();
//! let root = f.mk_eq(sum, three).unwrap();
//!
//! solver.assert_formula(root).unwrap();
//! assert_eq!(solver.check_sat(), Answer::Sat);
//! assert_eq!(solver.get_value(x).unwrap(), BitVector::from_u64(4, 0b1010));
//! ```

pub mod bits;
pub mod error;
pub mod expr;
pub mod model;
mod prop;
pub mod simplify;
pub mod solver;
pub mod sort;

pub mod prelude {
    pub use crate::bits::BitVector;
    pub use crate::error::Error;
    pub use crate::expr::{Formula, NodeId, NodeKind};
    pub use crate::model::Model;
    pub use crate::simplify::{Rewriter, Simplify};
    pub use crate::solver::options::{Engine, OptionKey, Options, PathSel};
    pub use crate::solver::stats::Stats;
    pub use crate::solver::{Answer, Solver};
    pub use crate::sort::{Sort, SortId};
}

pub use bits::BitVector;
pub use error::Error;
pub use expr::{Formula, NodeId, NodeKind};
pub use simplify::{Rewriter, Simplify};
pub use solver::options::{Engine, OptionKey, Options, PathSel};
pub use solver::stats::Stats;
pub use solver::{Answer, Solver};
pub use sort::{Sort, SortId};
