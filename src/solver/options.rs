use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which engine `check_sat` dispatches to.
///
/// Only the propagation engine lives in this crate; bit-blasting and the
/// pure score-guided local search are external collaborators, and
/// selecting them here yields `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Engine {
    Prop,
    Sls,
    Bb,
}

/// Down-propagation child selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSel {
    /// Prefer the child whose operator invariant is violated.
    Essential,
    /// Pick uniformly among non-constant children.
    Random,
}

/// Solver configuration.
///
/// Probability-valued options are per-mille integers in `[0, 1000]`.
/// Values are validated in [`Options::set`]; an out-of-range value is a
/// precondition violation and reported as [`Error::OptionValue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub engine: Engine,
    /// RNG seed. A non-zero seed also switches the initial assignment and
    /// fresh function values from all-zero to randomized.
    pub seed: u64,
    pub path_sel: PathSel,
    /// Probability of consulting the inverse-value library for a step;
    /// otherwise the consistent-value library is used.
    pub prob_use_inv: u32,
    /// Probability of flipping one don't-care bit of the current
    /// assignment in `and` inversion instead of redrawing them.
    pub prob_and_flip: u32,
    /// Probability of flipping one bit of the fixed operand in a
    /// disequality instead of drawing a fresh random value.
    pub prob_eq_flip: u32,
    /// Probability of answering a concat step with the current assignment
    /// with one bit flipped.
    pub prob_conc_flip: u32,
    /// Probability of flipping one don't-care bit in a slice step.
    pub prob_slice_flip: u32,
    /// Probability of keeping (rather than redrawing) the don't-care bits
    /// of the current assignment in a slice step.
    pub prob_slice_keep_dc: u32,
    /// Probability of descending into the condition of an `ite`.
    pub prob_flip_cond: u32,
    /// Start probability of descending into the condition when the
    /// enabled branch is an unhelpful constant; adapted during search.
    pub prob_flip_cond_const: u32,
    /// Number of such condition selections between adaptations.
    pub flip_cond_const_npathsel: u32,
    /// Skip the move entirely on a non-recoverable conflict instead of
    /// restarting the violated root's inputs.
    pub no_move_on_conflict: bool,
    /// Keep commutative children sorted by id.
    pub sort_exp: bool,
    /// 0 = none, 1 = constant folding, 2 = plus variable substitution,
    /// 3 = substitution to fixpoint.
    pub rewrite_level: u8,
    /// Budget on propagation steps per `check_sat`; 0 means unlimited.
    pub nprops: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            engine: Engine::Prop,
            seed: 0,
            path_sel: PathSel::Essential,
            prob_use_inv: 990,
            prob_and_flip: 0,
            prob_eq_flip: 0,
            prob_conc_flip: 0,
            prob_slice_flip: 0,
            prob_slice_keep_dc: 500,
            prob_flip_cond: 100,
            prob_flip_cond_const: 100,
            flip_cond_const_npathsel: 500,
            no_move_on_conflict: false,
            sort_exp: true,
            rewrite_level: 3,
            nprops: 0,
        }
    }
}

/// The enumerated option keys of the programmatic API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKey {
    Engine,
    Seed,
    PropPathSel,
    PropProbUseInv,
    PropProbAndFlip,
    PropProbEqFlip,
    PropProbConcFlip,
    PropProbSliceFlip,
    PropProbSliceKeepDc,
    PropProbFlipCond,
    PropProbFlipCondConst,
    PropFlipCondConstNPathSel,
    PropNoMoveOnConflict,
    PropNprops,
    SortExp,
    RewriteLevel,
}

impl Options {
    /// Sets an option by key, validating its range.
    pub fn set(&mut self, key: OptionKey, value: u64) -> Result<()> {
        use OptionKey::*;
        match key {
            Engine => {
                self.engine = match value {
                    0 => self::Engine::Prop,
                    1 => self::Engine::Sls,
                    2 => self::Engine::Bb,
                    _ => return Err(range("ENGINE", value, 2)),
                }
            }
            Seed => self.seed = value,
            PropPathSel => {
                self.path_sel = match value {
                    0 => PathSel::Essential,
                    1 => PathSel::Random,
                    _ => return Err(range("PROP_PATH_SEL", value, 1)),
                }
            }
            PropProbUseInv => self.prob_use_inv = per_mille("PROP_PROB_USE_INV", value)?,
            PropProbAndFlip => self.prob_and_flip = per_mille("PROP_PROB_AND_FLIP", value)?,
            PropProbEqFlip => self.prob_eq_flip = per_mille("PROP_PROB_EQ_FLIP", value)?,
            PropProbConcFlip => self.prob_conc_flip = per_mille("PROP_PROB_CONC_FLIP", value)?,
            PropProbSliceFlip => self.prob_slice_flip = per_mille("PROP_PROB_SLICE_FLIP", value)?,
            PropProbSliceKeepDc => {
                self.prob_slice_keep_dc = per_mille("PROP_PROB_SLICE_KEEP_DC", value)?
            }
            PropProbFlipCond => self.prob_flip_cond = per_mille("PROP_PROB_FLIP_COND", value)?,
            PropProbFlipCondConst => {
                self.prob_flip_cond_const = per_mille("PROP_PROB_FLIP_COND_CONST", value)?
            }
            PropFlipCondConstNPathSel => {
                if value == 0 || value > u32::MAX as u64 {
                    return Err(range(
                        "PROP_FLIP_COND_CONST_NPATHSEL",
                        value,
                        u32::MAX as u64,
                    ));
                }
                self.flip_cond_const_npathsel = value as u32;
            }
            PropNoMoveOnConflict => {
                if value > 1 {
                    return Err(range("PROP_NO_MOVE_ON_CONFLICT", value, 1));
                }
                self.no_move_on_conflict = value == 1;
            }
            PropNprops => self.nprops = value,
            SortExp => {
                if value > 1 {
                    return Err(range("SORT_EXP", value, 1));
                }
                self.sort_exp = value == 1;
            }
            RewriteLevel => {
                if value > 3 {
                    return Err(range("REWRITE_LEVEL", value, 3));
                }
                self.rewrite_level = value as u8;
            }
        }
        Ok(())
    }
}

fn per_mille(key: &'static str, value: u64) -> Result<u32> {
    if value > 1000 {
        return Err(range(key, value, 1000));
    }
    Ok(value as u32)
}

fn range(key: &'static str, value: u64, max: u64) -> Error {
    Error::OptionValue { key, value, max }
}

/// One biased coin toss with a per-mille probability.
pub(crate) fn flip<R: Rng>(rng: &mut R, per_mille: u32) -> bool {
    per_mille > 0 && rng.gen_range(0..1000) < per_mille
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_mille_ranges_are_enforced() {
        let mut o = Options::default();
        assert!(o.set(OptionKey::PropProbUseInv, 1000).is_ok());
        assert_eq!(o.prob_use_inv, 1000);
        assert!(matches!(
            o.set(OptionKey::PropProbUseInv, 1001),
            Err(Error::OptionValue { .. })
        ));
        assert!(matches!(
            o.set(OptionKey::RewriteLevel, 4),
            Err(Error::OptionValue { .. })
        ));
    }

    #[test]
    fn enumerated_keys_map_to_variants() {
        let mut o = Options::default();
        o.set(OptionKey::Engine, 2).unwrap();
        assert_eq!(o.engine, Engine::Bb);
        o.set(OptionKey::PropPathSel, 1).unwrap();
        assert_eq!(o.path_sel, PathSel::Random);
        o.set(OptionKey::PropNoMoveOnConflict, 1).unwrap();
        assert!(o.no_move_on_conflict);
    }
}
