use std::fmt;

use hashbrown::HashMap;
use rapidhash::quality::RandomState;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A handle to an interned [`Sort`].
///
/// Sorts are interned by structure, so two handles are equal iff the sorts
/// are structurally identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "fast-binary", derive(bitcode::Encode, bitcode::Decode))]
#[repr(transparent)]
pub struct SortId(u32);

impl SortId {
    pub(crate) fn idx(&self) -> usize {
        self.0 as usize
    }
}

/// The sort (type) of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    /// The boolean sort; evaluates as a 1-bit vector.
    Bool,
    /// A fixed-width bit-vector sort, width at least one.
    BitVec(u32),
    /// An ordered product of sorts, used for function domains and argument
    /// tuples.
    Tuple(Vec<SortId>),
    /// An array from a bit-vector index sort to a bit-vector element sort.
    Array { index: SortId, element: SortId },
    /// A function from a tuple domain to a bit-vector or boolean codomain.
    Fun { domain: SortId, codomain: SortId },
}

/// The interning table for sorts, owned by a solver.
pub(crate) struct SortTable {
    sorts: Vec<Sort>,
    lookup: HashMap<Sort, SortId, RandomState>,
}

impl SortTable {
    pub(crate) fn new() -> Self {
        Self {
            sorts: Vec::new(),
            lookup: HashMap::with_hasher(RandomState::new()),
        }
    }

    pub(crate) fn intern(&mut self, sort: Sort) -> SortId {
        if let Some(&id) = self.lookup.get(&sort) {
            return id;
        }
        let id = SortId(self.sorts.len() as u32);
        self.sorts.push(sort.clone());
        self.lookup.insert(sort, id);
        id
    }

    pub(crate) fn get(&self, id: SortId) -> &Sort {
        &self.sorts[id.idx()]
    }

    pub(crate) fn bool_sort(&mut self) -> SortId {
        self.intern(Sort::Bool)
    }

    pub(crate) fn bitvec(&mut self, width: u32) -> Result<SortId> {
        if width < 1 {
            return Err(Error::ZeroWidth);
        }
        Ok(self.intern(Sort::BitVec(width)))
    }

    /// The evaluation width of a sort; `Bool` counts as one bit.
    pub(crate) fn width(&self, id: SortId) -> Option<u32> {
        match self.get(id) {
            Sort::Bool => Some(1),
            Sort::BitVec(w) => Some(*w),
            _ => None,
        }
    }

    pub(crate) fn is_bool(&self, id: SortId) -> bool {
        matches!(self.get(id), Sort::Bool)
    }

    pub(crate) fn is_bitvec_like(&self, id: SortId) -> bool {
        matches!(self.get(id), Sort::Bool | Sort::BitVec(_))
    }

    pub(crate) fn describe(&self, id: SortId) -> String {
        match self.get(id) {
            Sort::Bool => "Bool".to_string(),
            Sort::BitVec(w) => format!("BitVec({w})"),
            Sort::Tuple(parts) => {
                let parts: Vec<_> = parts.iter().map(|&p| self.describe(p)).collect();
                format!("Tuple({})", parts.join(", "))
            }
            Sort::Array { index, element } => {
                format!(
                    "Array({} -> {})",
                    self.describe(*index),
                    self.describe(*element)
                )
            }
            Sort::Fun { domain, codomain } => {
                format!(
                    "Fun({} -> {})",
                    self.describe(*domain),
                    self.describe(*codomain)
                )
            }
        }
    }
}

impl fmt::Debug for SortTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortTable")
            .field("sorts", &self.sorts.len())
            .finish()
    }
}
