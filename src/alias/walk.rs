//! Walks over the memory SSA def-use chains.
//!
//! [`MemWalker::walk_non_aliased_vuses`] follows the chain of memory states backwards from a
//! virtual use, skipping definitions that cannot clobber a reference. It looks through memory
//! PHIs by finding an argument whose definition dominates the PHI, and checking that every other
//! argument reaches it without a clobber.
//!
//! [`MemWalker::walk_aliased_vdefs`] instead visits every definition that may clobber a
//! reference, forking at PHIs.
//!
//! Both walks are bounded by a step budget. Running out of budget is not an error, the walk
//! just ends with an unknown result.

use crate::alias::ao_ref::AoRef;
use crate::alias::oracle::AliasOracle;
use crate::dominator_tree::DominatorTree;
use crate::fx::FxHashSet;
use crate::ir::{Block, MemState};
use crate::mem_ssa::{MemSsa, MemStateDef};
use crate::{timing, trace};
use smallvec::SmallVec;

/// What a visitor wants the walk to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkStep<T> {
    /// Keep walking.
    Continue,
    /// Give up.
    Stop,
    /// The walk is done, with a result.
    Found(T),
}

/// How a clobbering definition may be handled by [`VuseVisitor::translate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranslateMode {
    /// The reference may be rewritten to look through the definition.
    Translate,
    /// The definition may only be shown not to clobber the reference. Used for definitions
    /// reached over a back edge.
    Disambiguate,
}

/// The outcome of [`MemWalker::walk_non_aliased_vuses`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkResult<T> {
    /// A visitor produced a result.
    Found(T),
    /// The definition of this state may clobber the reference.
    Clobbered(MemState),
    /// The walk reached the function entry state.
    EntryReached,
    /// The budget ran out, a memory PHI could not be looked through, or a visitor gave up.
    Aborted,
}

impl<T> WalkResult<T> {
    /// The result, if the walk found one.
    pub fn found(self) -> Option<T> {
        match self {
            WalkResult::Found(t) => Some(t),
            _ => None,
        }
    }
}

/// Callbacks of [`MemWalker::walk_non_aliased_vuses`].
pub trait VuseVisitor<'r, T> {
    /// Called for each state whose defining statements up to the start of the walk do not
    /// clobber `r`, including the start state.
    fn visit(&mut self, r: &AoRef<'r>, vuse: MemState) -> WalkStep<T>;

    /// Called when the definition of `vuse` may clobber `r`.
    ///
    /// Returning `Continue` resumes the walk above the definition, after rewriting `r` or the
    /// visitor's own state as needed. A visitor that only disambiguates sets `mode` to
    /// [`TranslateMode::Disambiguate`].
    fn translate(
        &mut self,
        r: &mut AoRef<'r>,
        vuse: MemState,
        mode: &mut TranslateMode,
    ) -> WalkStep<T> {
        let _ = (r, vuse, mode);
        WalkStep::Stop
    }

    /// Map the next state to consider to an equivalent one, or `None` to give up.
    fn valueize(&mut self, vuse: MemState) -> Option<MemState> {
        Some(vuse)
    }
}

/// Walks over memory SSA guided by an alias oracle.
pub struct MemWalker<'w, 'a> {
    oracle: &'w AliasOracle<'a>,
    memssa: &'w MemSsa,
    domtree: &'w DominatorTree,
    tbaa_p: bool,
    visited: FxHashSet<MemState>,
    translated: bool,
}

impl<'w, 'a> MemWalker<'w, 'a> {
    /// Create a walker. Type-based disambiguation is enabled.
    pub fn new(oracle: &'w AliasOracle<'a>, memssa: &'w MemSsa, domtree: &'w DominatorTree) -> Self {
        Self {
            oracle,
            memssa,
            domtree,
            tbaa_p: true,
            visited: FxHashSet::default(),
            translated: false,
        }
    }

    /// Builder method selecting whether alias queries use type-based rules.
    pub fn with_tbaa(mut self, tbaa_p: bool) -> Self {
        self.tbaa_p = tbaa_p;
        self
    }

    /// Did the last walk translate the reference through a clobbering definition?
    pub fn translated(&self) -> bool {
        self.translated
    }

    fn def_block(&self, state: MemState) -> Option<Block> {
        self.memssa.def_block(state, self.oracle.func())
    }

    /// Does `block` dominate the definition of `state`?
    fn dominates_def(&self, block: Block, state: MemState) -> bool {
        self.def_block(state)
            .is_some_and(|b| self.domtree.block_dominates(block, b))
    }

    /// Call the visitor for each state equivalent to `vuse` with respect to `r`. The definitions
    /// between them do not clobber `r`.
    ///
    /// Each alias query consumes one unit of `limit`.
    pub fn walk_non_aliased_vuses<'r, T>(
        &mut self,
        r: &mut AoRef<'r>,
        mut vuse: MemState,
        visitor: &mut impl VuseVisitor<'r, T>,
        limit: &mut u32,
    ) -> WalkResult<T> {
        let _tt = timing::alias_walk();
        self.visited.clear();
        self.translated = false;
        let memssa = self.memssa;

        loop {
            match visitor.visit(r, vuse) {
                WalkStep::Continue => {}
                WalkStep::Stop => return WalkResult::Aborted,
                WalkStep::Found(t) => return WalkResult::Found(t),
            }
            let Some(next) = visitor.valueize(vuse) else {
                return WalkResult::Aborted;
            };
            vuse = next;

            match memssa.def(vuse) {
                MemStateDef::Entry => return WalkResult::EntryReached,
                MemStateDef::Phi(block) => {
                    let abort_on_visited = self.translated;
                    match self.continuation_for_phi(
                        block,
                        r,
                        limit,
                        abort_on_visited,
                        visitor,
                        TranslateMode::Translate,
                    ) {
                        Some(v) => vuse = v,
                        None => return WalkResult::Aborted,
                    }
                }
                MemStateDef::Inst(inst) => {
                    if *limit == 0 {
                        trace!("walk budget exhausted at {vuse}");
                        return WalkResult::Aborted;
                    }
                    *limit -= 1;
                    if self.oracle.stmt_may_clobber_ref(inst, r, self.tbaa_p) {
                        let mut mode = TranslateMode::Translate;
                        match visitor.translate(r, vuse, &mut mode) {
                            WalkStep::Continue => {
                                self.translated |= mode == TranslateMode::Translate;
                            }
                            WalkStep::Stop => return WalkResult::Clobbered(vuse),
                            WalkStep::Found(t) => return WalkResult::Found(t),
                        }
                    }
                    match memssa.vuse(inst) {
                        Some(v) => vuse = v,
                        None => return WalkResult::EntryReached,
                    }
                }
            }
        }
    }

    /// Find a state above the memory PHI of `block` that the walk for `r` may continue from,
    /// skipping only definitions that cannot clobber `r`.
    ///
    /// The result dominates the PHI. Returns `None` if there is no such state or the budget
    /// runs out. Reaching a PHI visited before in this walk counts as success unless
    /// `abort_on_visited` is set.
    pub fn continuation_for_phi<'r, T>(
        &mut self,
        block: Block,
        r: &mut AoRef<'r>,
        limit: &mut u32,
        abort_on_visited: bool,
        visitor: &mut impl VuseVisitor<'r, T>,
        mode: TranslateMode,
    ) -> Option<MemState> {
        let memssa = self.memssa;
        let phi = memssa.phi(block)?;
        let phi_state = phi.state.expand()?;
        let args = &phi.args;
        if let [(_, arg)] = args.as_slice() {
            return Some(*arg);
        }

        // Prefer an argument whose definition dominates the PHI.
        let mut target = args.iter().map(|&(_, arg)| arg).find(|&arg| {
            memssa.is_entry(arg)
                || self
                    .def_block(arg)
                    .is_some_and(|b| b != block && self.domtree.block_dominates(b, block))
        });
        // Otherwise the first walk up to the immediate dominator picks one.
        let dom = self.domtree.idom(block);

        for &(_, arg) in args {
            if Some(arg) == target {
                continue;
            }
            // Definitions reached over a back edge may only be disambiguated.
            let arg_mode = if self.dominates_def(block, arg) {
                TranslateMode::Disambiguate
            } else {
                mode
            };
            let skip = SkipUntil {
                phi: phi_state,
                target_bb: dom,
                abort_on_visited,
                mode: arg_mode,
            };
            if !self.maybe_skip_until(skip, &mut target, r, arg, limit, visitor) {
                trace!("no continuation for {phi_state} through {arg}");
                return None;
            }
        }
        target
    }

    /// Walk from `vuse` until reaching `target`, or with no target until reaching a
    /// definition dominating `skip.target_bb`, which becomes the target. Fails on a clobber.
    fn maybe_skip_until<'r, T>(
        &mut self,
        skip: SkipUntil,
        target: &mut Option<MemState>,
        r: &mut AoRef<'r>,
        mut vuse: MemState,
        limit: &mut u32,
        visitor: &mut impl VuseVisitor<'r, T>,
    ) -> bool {
        let memssa = self.memssa;
        let mut bb = self.def_block(skip.phi);
        self.visited.insert(skip.phi);

        while Some(vuse) != *target {
            let def = memssa.def(vuse);
            if target.is_none()
                && (def == MemStateDef::Entry
                    || skip
                        .target_bb
                        .zip(self.def_block(vuse))
                        .is_some_and(|(t, d)| self.domtree.block_dominates(d, t)))
            {
                *target = Some(vuse);
                return true;
            }

            let inst = match def {
                MemStateDef::Phi(block) => {
                    if self.visited.contains(&vuse) {
                        return !skip.abort_on_visited;
                    }
                    match self.continuation_for_phi(
                        block,
                        r,
                        limit,
                        skip.abort_on_visited,
                        visitor,
                        skip.mode,
                    ) {
                        Some(v) => {
                            vuse = v;
                            continue;
                        }
                        None => return false,
                    }
                }
                MemStateDef::Entry => return false,
                MemStateDef::Inst(inst) => inst,
            };

            if *limit == 0 {
                return false;
            }
            *limit -= 1;
            if self.oracle.stmt_may_clobber_ref(inst, r, self.tbaa_p) {
                let mut mode = skip.mode;
                if !matches!(visitor.translate(r, vuse, &mut mode), WalkStep::Continue) {
                    return false;
                }
            }
            // A block entered before was skipped by an earlier successful walk.
            let def_bb = self.def_block(vuse);
            if def_bb != bb {
                if !self.visited.insert(vuse) {
                    return !skip.abort_on_visited;
                }
                bb = def_bb;
            }
            match memssa.vuse(inst) {
                Some(v) => vuse = v,
                None => return false,
            }
        }
        true
    }

    /// Call `walker` for each definition starting at `vdef` that may clobber `r`, or for every
    /// definition if `r` is `None`. A `true` return from `walker` ends the walk along that path.
    ///
    /// The walk forks at memory PHIs and merges again at states recorded in `visited`. If the
    /// function entry is reached, `function_entry_reached` is set. Returns the number of
    /// definitions walked, or `None` when `limit` of them were walked. A `limit` of zero means
    /// no limit.
    pub fn walk_aliased_vdefs(
        &self,
        r: Option<&AoRef>,
        vdef: MemState,
        mut walker: impl FnMut(MemState) -> bool,
        visited: Option<&mut FxHashSet<MemState>>,
        mut function_entry_reached: Option<&mut bool>,
        limit: usize,
    ) -> Option<usize> {
        let _tt = timing::alias_walk();
        let memssa = self.memssa;
        let mut local_visited = FxHashSet::default();
        // Merge points are only tracked once the walk forks, unless the caller shares a set.
        let mut tracking = visited.is_some();
        let visited = visited.unwrap_or(&mut local_visited);
        if let Some(reached) = function_entry_reached.as_deref_mut() {
            *reached = false;
        }

        let mut count = 0;
        let mut pending: SmallVec<[MemState; 8]> = SmallVec::new();
        pending.push(vdef);
        'paths: while let Some(mut state) = pending.pop() {
            loop {
                if tracking && !visited.insert(state) {
                    continue 'paths;
                }
                let inst = match memssa.def(state) {
                    MemStateDef::Entry => {
                        if let Some(reached) = function_entry_reached.as_deref_mut() {
                            *reached = true;
                        }
                        continue 'paths;
                    }
                    MemStateDef::Phi(block) => {
                        tracking = true;
                        if let Some(phi) = memssa.phi(block) {
                            pending.extend(phi.args.iter().rev().map(|&(_, arg)| arg));
                        }
                        continue 'paths;
                    }
                    MemStateDef::Inst(inst) => inst,
                };

                count += 1;
                if count == limit {
                    trace!("aliased vdef walk from {vdef} hit the limit");
                    return None;
                }
                if r.is_none_or(|r| self.oracle.stmt_may_clobber_ref(inst, r, true))
                    && walker(state)
                {
                    continue 'paths;
                }
                match memssa.vuse(inst) {
                    Some(v) => state = v,
                    None => continue 'paths,
                }
            }
        }
        Some(count)
    }
}

/// Parameters of one skipping walk through a PHI argument.
#[derive(Clone, Copy)]
struct SkipUntil {
    phi: MemState,
    target_bb: Option<Block>,
    abort_on_visited: bool,
    mode: TranslateMode,
}
