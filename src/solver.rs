use hashbrown::HashSet;
use log::{debug, trace, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rapidhash::quality::RandomState;
use serde::{Deserialize, Serialize};

use crate::bits::BitVector;
use crate::error::{Error, Result};
use crate::expr::{Formula, NodeId};
use crate::model::Model;
use crate::prop::{self, CondFlip, Descent, Scores};
use crate::simplify::{Rewriter, Simplify, substitute_constraints};

pub mod options;
pub mod stats;

use options::{Engine, OptionKey, Options};
use stats::Stats;

/// The result of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Answer {
    Sat,
    Unsat,
    Unknown,
}

/// A solver instance.
///
/// A `Solver` owns all of its state (the expression DAG, the model, the
/// scores, the RNG and the statistics) and nothing is shared between
/// instances. All operations are synchronous; long `check_sat` calls poll
/// the termination hook at the top of every move and at every descent
/// step, so an embedder can cancel cooperatively without corrupting
/// state.
///
/// # Example
/// ```rust
/// use bitprop::{Answer, BitVector, Solver};
///
/// let mut solver = Solver::new();
/// let f = solver.formula_mut();
/// let bv8 = f.sort_bitvec(8).unwrap();
///
/// // x * 3 == 21
/// let x = f.mk_var(bv8, Some("x")).unwrap();
/// let three = f.mk_const(BitVector::from_u64(8, 3));
/// let c21 = f.mk_const(BitVector::from_u64(8, 21));
/// let prod = f.mk_mul(x, three).unwrap();
/// let root = f.mk_eq(prod, c21).unwrap();
///
/// solver.assert_formula(root).unwrap();
/// assert_eq!(solver.check_sat(), Answer::Sat);
/// assert_eq!(solver.get_value(x).unwrap(), BitVector::from_u64(8, 7));
/// ```
pub struct Solver {
    formula: Formula,
    model: Model,
    scores: Scores,
    options: Options,
    rng: SmallRng,
    stats: Stats,
    roots: Vec<NodeId>,
    simplifier: Box<dyn Simplify>,
    terminate: Option<Box<dyn FnMut() -> bool>>,
    answer: Option<Answer>,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            formula: Formula::new(),
            model: Model::new(),
            scores: Scores::new(),
            options: Options::default(),
            rng: SmallRng::seed_from_u64(0),
            stats: Stats::default(),
            roots: Vec::new(),
            simplifier: Box::new(Rewriter),
            terminate: None,
            answer: None,
        }
    }
}

impl Solver {
    /// Creates a solver with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// The expression DAG owned by this solver.
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// Mutable access to the DAG, for building terms.
    pub fn formula_mut(&mut self) -> &mut Formula {
        &mut self.formula
    }

    /// The statistics of the most recent `check_sat` call.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The current option values.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Sets an option. Probabilities are per-mille in `[0, 1000]`; an
    /// out-of-range value is a precondition error.
    pub fn set_option(&mut self, key: OptionKey, value: u64) -> Result<()> {
        self.options.set(key, value)?;
        self.formula.sort_exp = self.options.sort_exp;
        self.formula.rewrite_level = self.options.rewrite_level;
        if key == OptionKey::Seed {
            self.rng = SmallRng::seed_from_u64(self.options.seed);
            self.model.randomize = self.options.seed != 0;
        }
        Ok(())
    }

    /// Installs the cooperative termination hook.
    pub fn set_termination(&mut self, hook: impl FnMut() -> bool + 'static) {
        self.terminate = Some(Box::new(hook));
    }

    /// Replaces the simplifier. The default is [`Rewriter`].
    pub fn set_simplifier(&mut self, simplifier: Box<dyn Simplify>) {
        self.simplifier = simplifier;
    }

    /// Asserts a boolean root to be true.
    pub fn assert_formula(&mut self, root: NodeId) -> Result<()> {
        let root = self.formula.chase(root);
        let sort = self.formula.sort_of(root);
        if self.formula.sorts.width(sort) != Some(1) {
            return Err(Error::sort(
                "assert",
                0,
                "Bool",
                self.formula.sorts.describe(sort),
            ));
        }
        self.formula.inc_ref(root);
        self.formula.mark_constraint(root);
        self.roots.push(root);
        self.answer = None;
        Ok(())
    }

    /// Decides satisfiability of the asserted roots.
    ///
    /// Returns [`Answer::Unknown`] when the move budget is exhausted, the
    /// termination hook fires, or the selected engine is not the
    /// propagation engine built into this crate.
    pub fn check_sat(&mut self) -> Answer {
        self.stats.reset();
        self.answer = None;
        if self.poll_terminate() {
            return self.conclude(Answer::Unknown);
        }

        let mut roots = self.roots.clone();
        self.resimplify(&mut roots);
        let substitution_rounds = match self.options.rewrite_level {
            0 | 1 => 0,
            2 => 1,
            _ => 16,
        };
        for _ in 0..substitution_rounds {
            if !substitute_constraints(&mut self.formula, &roots) {
                break;
            }
            self.resimplify(&mut roots);
        }

        let mut live = Vec::new();
        for &r in &roots {
            match self.formula.const_value(r) {
                Some(v) if v.is_false() => {
                    debug!("check_sat: a root simplified to false");
                    return self.conclude(Answer::Unsat);
                }
                Some(_) => {} // trivially satisfied
                None => live.push(r),
            }
        }

        if live.is_empty() {
            // every root simplified to true; any assignment is a model
            self.model.clear();
            return self.conclude(Answer::Sat);
        }

        if self.options.engine != Engine::Prop {
            warn!(
                "engine {:?} is an external collaborator; returning unknown",
                self.options.engine
            );
            return self.conclude(Answer::Unknown);
        }
        if let Some(&r) = live.iter().find(|&&r| !self.formula.engine_supported(r)) {
            warn!(
                "root {} contains functions or lambdas, which the \
                 propagation engine does not handle",
                r.raw()
            );
            return self.conclude(Answer::Unknown);
        }

        self.model.randomize = self.options.seed != 0;
        self.model.init(&self.formula, &live, &mut self.rng);
        self.scores.clear();

        let mut violated: HashSet<NodeId, RandomState> =
            HashSet::with_hasher(RandomState::new());
        for &r in &live {
            self.scores.score(&self.formula, &self.model, r);
            if !self.model.value(r).is_true() {
                violated.insert(r);
            }
        }

        let mut cond = CondFlip::new(self.options.prob_flip_cond_const);
        loop {
            if violated.is_empty() {
                return self.conclude(Answer::Sat);
            }
            if self.options.nprops > 0 && self.stats.props >= self.options.nprops {
                debug!("check_sat: propagation budget exhausted");
                return self.conclude(Answer::Unknown);
            }
            if self.poll_terminate() {
                return self.conclude(Answer::Unknown);
            }

            let pick = self.rng.gen_range(0..violated.len());
            let root = *violated.iter().nth(pick).expect("violated set is non-empty");

            let Solver {
                formula,
                model,
                options,
                rng,
                stats,
                terminate,
                ..
            } = self;
            let mut stop = || terminate.as_mut().is_some_and(|hook| hook());
            let outcome = prop::propagate(
                formula, model, options, rng, stats, &mut cond, root, &mut stop,
            );
            match outcome {
                Descent::Move { var, value } => {
                    trace!("move: node {} <- {}", var.raw(), value);
                    self.apply(&live, &mut violated, &[(var, value)]);
                    self.stats.moves += 1;
                }
                Descent::Conflict => {
                    trace!("descent aborted on a constant");
                    if !self.options.no_move_on_conflict {
                        // restart the violated root's inputs with a fresh
                        // random assignment
                        let vars = self.formula.support_vars(root);
                        let changed: Vec<(NodeId, BitVector)> = vars
                            .into_iter()
                            .map(|v| {
                                let width = self.formula.width_of(v);
                                (v, BitVector::new_random(&mut self.rng, width))
                            })
                            .collect();
                        self.apply(&live, &mut violated, &changed);
                        self.stats.restarts += 1;
                    }
                }
                Descent::Stopped => return self.conclude(Answer::Unknown),
            }
        }
    }

    /// The value of `node` under the satisfying assignment of the last
    /// `check_sat` call.
    pub fn get_value(&mut self, node: NodeId) -> Result<BitVector> {
        if self.answer != Some(Answer::Sat) {
            return Err(Error::NoModel);
        }
        let node = self.formula.chase(node);
        let Solver {
            formula,
            model,
            rng,
            ..
        } = self;
        model.ensure(formula, node, rng)
    }

    // writes a set of fresh variable values through: cone re-evaluation,
    // rescoring, and the violated-roots refresh
    fn apply(
        &mut self,
        roots: &[NodeId],
        violated: &mut HashSet<NodeId, RandomState>,
        changed: &[(NodeId, BitVector)],
    ) {
        let Solver {
            formula,
            model,
            rng,
            ..
        } = self;
        let cone = model.update_cone(formula, changed, rng);
        self.stats.cone_updates += 1;

        let mut scope: Vec<usize> = changed.iter().map(|(v, _)| v.idx()).collect();
        scope.extend(cone.iter().copied());
        scope.sort_unstable();
        scope.dedup();
        self.scores.rescore_cone(&self.formula, &self.model, &scope);

        for &r in roots {
            if scope.binary_search(&r.idx()).is_ok() {
                if self.model.value(r).is_true() {
                    violated.remove(&r);
                } else {
                    violated.insert(r);
                }
            }
        }
    }

    fn resimplify(&mut self, roots: &mut [NodeId]) {
        for r in roots.iter_mut() {
            let s = self.simplifier.simplify(&mut self.formula, *r);
            // the simplified node is kept alive by the proxy chain (or is
            // the root itself), so the transient reference can go
            self.formula.release(s);
            *r = s;
        }
    }

    fn poll_terminate(&mut self) -> bool {
        self.terminate.as_mut().is_some_and(|hook| hook())
    }

    fn conclude(&mut self, answer: Answer) -> Answer {
        self.answer = Some(answer);
        debug!("check_sat: {:?} with {:?}", answer, self.stats);
        answer
    }
}
