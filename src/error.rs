use thiserror::Error;

/// Errors reported by the public solver API.
///
/// These are precondition violations: a well-behaved embedder never sees
/// them. Propagation conflicts are *not* errors: the engine reports those
/// through return values and statistics, never by unwinding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// An operator was constructed with a child of the wrong sort.
    #[error("sort mismatch for child {child} of `{kind}`: expected {expected}, got {got}")]
    Sort {
        kind: &'static str,
        child: usize,
        expected: String,
        got: String,
    },

    /// Two bit-vector operands of differing widths were combined.
    #[error("width mismatch: {0} vs {1}")]
    WidthMismatch(u32, u32),

    /// A bit-vector sort of width zero was requested.
    #[error("bit-vector width must be at least 1")]
    ZeroWidth,

    /// An option value was outside its permitted range.
    #[error("value {value} out of range for option {key} (max {max})")]
    OptionValue {
        key: &'static str,
        value: u64,
        max: u64,
    },

    /// A slice used out-of-range or inverted bit indices.
    #[error("invalid slice bounds [{hi}:{lo}] for width {width}")]
    SliceBounds { hi: u32, lo: u32, width: u32 },

    /// `get_value` was called without a satisfying assignment available.
    #[error("no model available: the last `check_sat` did not return Sat")]
    NoModel,

    /// A value was requested for a node with free lambda parameters.
    #[error("node depends on an unbound lambda parameter")]
    Parameterized,

    /// A bit-string could not be parsed into a bit-vector value.
    #[error("invalid bit-string `{0}`")]
    Parse(String),

    /// A symbol name was registered twice.
    #[error("symbol `{0}` is already in use")]
    DuplicateSymbol(String),
}

impl Error {
    pub(crate) fn sort(
        kind: &'static str,
        child: usize,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Error::Sort {
            kind,
            child,
            expected: expected.into(),
            got: got.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
