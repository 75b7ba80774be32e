//! A verifier for ensuring that functions are well formed.
//!
//! The verifier checks the structural invariants the analyses of this crate rely on:
//!
//! Block integrity
//!
//! - Every block in the layout ends with exactly one terminator.
//! - PHIs lead their block.
//! - The arguments of a PHI correspond one to one to the predecessors of its block.
//! - Branch destinations are blocks in the layout.
//!
//! SSA form
//!
//! - Every used value is defined by a parameter or an instruction in the layout.
//! - The result of an instruction refers back to it.
//! - Definitions dominate their uses. A PHI argument is used at the end of the corresponding
//!   predecessor.
//!
//! Assertions
//!
//! - Assertion pseudo-definitions only appear while range propagation has them inserted.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::fx::FxHashSet;
use crate::ir::{AnyEntity, Block, Function, Inst, InstData, Operand, Value, ValueDef};
use crate::timing;
use core::fmt::{self, Display, Formatter};

/// A verifier error.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VerifierError {
    /// The entity causing the verifier error.
    pub location: AnyEntity,
    /// Optionally provide some context for the given location; e.g., for `inst42` provide
    /// `Some("v3 = iadd v1, v2")` for better diagnostics.
    pub context: Option<String>,
    /// The error message.
    pub message: String,
}

impl std::error::Error for VerifierError {}

impl Display for VerifierError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.context {
            None => write!(f, "{}: {}", self.location, self.message),
            Some(context) => write!(f, "{} ({}): {}", self.location, context, self.message),
        }
    }
}

/// Convenience conversion from a location and a message.
impl<L, M> From<(L, M)> for VerifierError
where
    L: Into<AnyEntity>,
    M: Into<String>,
{
    fn from(items: (L, M)) -> Self {
        let (location, message) = items;
        Self {
            location: location.into(),
            context: None,
            message: message.into(),
        }
    }
}

/// Convenience conversion from a location, a context and a message.
impl<L, C, M> From<(L, C, M)> for VerifierError
where
    L: Into<AnyEntity>,
    C: Into<String>,
    M: Into<String>,
{
    fn from(items: (L, C, M)) -> Self {
        let (location, context, message) = items;
        Self {
            location: location.into(),
            context: Some(context.into()),
            message: message.into(),
        }
    }
}

/// Result of a step in the verification process.
///
/// Functions that return `VerifierStepResult` should also take a mutable reference to
/// `VerifierErrors` as argument in order to report errors.
///
/// Here, `Ok` represents a step that **did not lead to a fatal error**, meaning that the
/// verification process may continue. `Err` represents a fatal error, after which the
/// verification stops.
pub type VerifierStepResult = Result<(), ()>;

/// Result of a verification operation.
pub type VerifierResult<T> = Result<T, VerifierErrors>;

/// List of verifier errors.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl std::error::Error for VerifierErrors {}

impl VerifierErrors {
    /// Return a new `VerifierErrors` struct.
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Return whether no errors were reported.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return whether one or more errors were reported.
    #[inline]
    pub fn has_error(&self) -> bool {
        !self.0.is_empty()
    }

    /// Return a `VerifierStepResult` that is fatal if at least one error was reported.
    #[inline]
    pub fn as_result(&self) -> VerifierStepResult {
        if self.is_empty() { Ok(()) } else { Err(()) }
    }

    /// Report an error, adding it to the list of errors.
    pub fn report(&mut self, error: impl Into<VerifierError>) {
        self.0.push(error.into());
    }

    /// Report a fatal error and return `Err`.
    pub fn fatal(&mut self, error: impl Into<VerifierError>) -> VerifierStepResult {
        self.report(error);
        Err(())
    }

    /// Report a non-fatal error and return `Ok`.
    pub fn nonfatal(&mut self, error: impl Into<VerifierError>) -> VerifierStepResult {
        self.report(error);
        Ok(())
    }
}

impl From<Vec<VerifierError>> for VerifierErrors {
    fn from(v: Vec<VerifierError>) -> Self {
        Self(v)
    }
}

impl From<VerifierErrors> for Vec<VerifierError> {
    fn from(errors: VerifierErrors) -> Vec<VerifierError> {
        errors.0
    }
}

impl Display for VerifierErrors {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "- {err}")?;
        }
        Ok(())
    }
}

/// Whether assertion pseudo-definitions are expected in the function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assertions {
    /// The function is in its normal form; assertions are errors.
    Forbidden,
    /// Range propagation has inserted assertions.
    Allowed,
}

/// Verify `func`.
pub fn verify_function(func: &Function, assertions: Assertions) -> VerifierResult<()> {
    let _tt = timing::verifier();
    let mut errors = VerifierErrors::default();
    let verifier = Verifier::new(func, assertions);
    let result = verifier.run(&mut errors);
    if errors.is_empty() {
        result.expect("no errors reported");
        Ok(())
    } else {
        Err(errors)
    }
}

struct Verifier<'a> {
    func: &'a Function,
    cfg: ControlFlowGraph,
    domtree: DominatorTree,
    assertions: Assertions,
}

impl<'a> Verifier<'a> {
    fn new(func: &'a Function, assertions: Assertions) -> Self {
        let cfg = ControlFlowGraph::with_function(func);
        let domtree = DominatorTree::with_function(func, &cfg);
        Self {
            func,
            cfg,
            domtree,
            assertions,
        }
    }

    fn context(&self, inst: Inst) -> String {
        self.func.dfg.insts[inst].to_string()
    }

    fn block_integrity(&self, block: Block, errors: &mut VerifierErrors) -> VerifierStepResult {
        let layout = &self.func.layout;
        let Some(last) = layout.last_inst(block) else {
            return errors.fatal((block, "empty block"));
        };
        if !self.func.dfg.insts[last].is_terminator() {
            return errors.fatal((last, self.context(last), "block does not end in a terminator"));
        }

        let mut seen_non_phi = false;
        for inst in layout.block_insts(block) {
            let data = &self.func.dfg.insts[inst];
            if data.is_terminator() && inst != last {
                errors.fatal((inst, self.context(inst), "terminator in the middle of a block"))?;
            }
            if data.is_phi() {
                if seen_non_phi {
                    errors.nonfatal((inst, self.context(inst), "PHI after a non-PHI"))?;
                }
            } else {
                seen_non_phi = true;
            }
            for dest in data.branch_destinations() {
                if !layout.is_block_inserted(dest) {
                    errors.fatal((
                        inst,
                        self.context(inst),
                        format!("branch to {dest} which is not in the layout"),
                    ))?;
                }
            }
        }
        Ok(())
    }

    fn phi_args(&self, inst: Inst, block: Block, errors: &mut VerifierErrors) -> VerifierStepResult {
        let InstData::Phi { args, .. } = &self.func.dfg.insts[inst] else {
            return Ok(());
        };
        let preds: FxHashSet<Block> = self.cfg.pred_iter(block).collect();
        let mut seen = FxHashSet::default();
        for &(pred, _) in args {
            if !preds.contains(&pred) {
                errors.nonfatal((
                    inst,
                    self.context(inst),
                    format!("PHI argument for {pred} which is not a predecessor"),
                ))?;
            }
            if !seen.insert(pred) {
                errors.nonfatal((
                    inst,
                    self.context(inst),
                    format!("duplicate PHI argument for {pred}"),
                ))?;
            }
        }
        for pred in preds {
            if !seen.contains(&pred) {
                errors.nonfatal((
                    inst,
                    self.context(inst),
                    format!("missing PHI argument for {pred}"),
                ))?;
            }
        }
        Ok(())
    }

    // Check that `v` is defined and its definition dominates the program point `at`.
    fn value_use(
        &self,
        inst: Inst,
        v: Value,
        at: Inst,
        errors: &mut VerifierErrors,
    ) -> VerifierStepResult {
        let dfg = &self.func.dfg;
        if !dfg.value_is_valid(v) {
            return errors.fatal((inst, self.context(inst), format!("invalid value {v}")));
        }
        match dfg.value_def(v) {
            ValueDef::Param(_) => Ok(()),
            ValueDef::Inst(def) => {
                if self.func.layout.inst_block(def).is_none() {
                    return errors.fatal((
                        inst,
                        self.context(inst),
                        format!("{v} is defined by {def} which is not in the layout"),
                    ));
                }
                let use_block = self.func.layout.pp_block(at.into());
                if self.domtree.is_reachable(use_block)
                    && (def == at && !dfg.insts[inst].is_phi()
                        || !self.domtree.dominates(def, at, &self.func.layout))
                {
                    return errors.nonfatal((
                        inst,
                        self.context(inst),
                        format!("uses value {v} from non-dominating {def}"),
                    ));
                }
                Ok(())
            }
        }
    }

    fn instruction(&self, inst: Inst, errors: &mut VerifierErrors) -> VerifierStepResult {
        let data = &self.func.dfg.insts[inst];
        if let Some(result) = data.result() {
            if self.func.dfg.value_def(result) != ValueDef::Inst(inst) {
                errors.fatal((
                    inst,
                    self.context(inst),
                    format!("result {result} is not defined by this instruction"),
                ))?;
            }
        }

        match data {
            InstData::Assert { .. } if self.assertions == Assertions::Forbidden => {
                errors.nonfatal((inst, self.context(inst), "unexpected assertion"))?;
            }
            InstData::Phi { args, .. } => {
                for &(pred, arg) in args {
                    let Operand::Value(v) = arg else { continue };
                    let Some(term) = self.func.terminator(pred) else {
                        continue;
                    };
                    self.value_use(inst, v, term, errors)?;
                }
                return Ok(());
            }
            _ => {}
        }

        for v in data.uses() {
            self.value_use(inst, v, inst, errors)?;
        }
        Ok(())
    }

    fn run(&self, errors: &mut VerifierErrors) -> VerifierStepResult {
        for block in self.func.layout.blocks() {
            self.block_integrity(block, errors)?;
            for inst in self.func.layout.block_insts(block) {
                self.instruction(inst, errors)?;
                self.phi_args(inst, block, errors)?;
            }
        }
        Ok(())
    }
}
