//! Generic worklist solver for monotone dataflow analyses.
//!
//! An analysis supplies its direction, a boundary fact (for the entry's out
//! set, or the exit's in set when running backward), the initial fact for
//! every other set, a meet, and a per-block transfer function. The solver
//! owns the per-block fact maps and iterates a FIFO worklist to fixpoint;
//! termination is guaranteed by monotonicity over a finite-height lattice.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tacopt_ir::{BlockId, Function};

/// A result type used to indicate whether a change happened.
///
/// Supports boolean operations, with `Changed` representing a `true` value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeResult {
    Unchanged,
    Changed,
}

impl ChangeResult {
    #[inline]
    pub fn changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

impl core::ops::BitOr for ChangeResult {
    type Output = ChangeResult;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        if matches!(self, Self::Changed) {
            self
        } else {
            rhs
        }
    }
}

impl core::ops::BitOrAssign for ChangeResult {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// The direction facts flow through the CFG.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A monotone dataflow analysis over per-block facts.
pub trait DataflowAnalysis {
    type Fact: Clone;

    fn debug_name(&self) -> &'static str;

    fn direction(&self) -> Direction;

    /// The fact holding at the boundary: the entry's out set for a forward
    /// analysis, the exit's in set for a backward one.
    fn boundary_fact(&self, func: &Function) -> Self::Fact;

    /// The optimistic fact every other set starts from.
    fn initial_fact(&self) -> Self::Fact;

    /// Meet `src` into `dst`, reporting whether `dst` narrowed.
    fn meet_into(&self, src: &Self::Fact, dst: &mut Self::Fact) -> ChangeResult;

    /// Apply the block's statements to `input`, meeting the result into
    /// `output`.
    ///
    /// For a forward analysis `input` is the block's in set and `output` its
    /// out set; for a backward analysis the roles are reversed.
    fn transfer_block(
        &self,
        func: &Function,
        block: BlockId,
        input: &Self::Fact,
        output: &mut Self::Fact,
    ) -> ChangeResult;
}

/// The solved in/out fact maps of one analysis run. The maps live exactly as
/// long as this value; rewrites read from it and drop it before the next
/// analysis runs.
pub struct DataflowResults<F> {
    ins: FxHashMap<BlockId, F>,
    outs: FxHashMap<BlockId, F>,
}

impl<F> DataflowResults<F> {
    pub fn block_in(&self, block: BlockId) -> &F {
        self.ins.get(&block).expect("no in fact for block")
    }

    pub fn block_out(&self, block: BlockId) -> &F {
        self.outs.get(&block).expect("no out fact for block")
    }
}

/// Run `analysis` over `func` to fixpoint.
pub fn solve<A: DataflowAnalysis>(analysis: &A, func: &Function) -> DataflowResults<A::Fact> {
    let mut ins = FxHashMap::default();
    let mut outs = FxHashMap::default();
    let direction = analysis.direction();

    for &block in func.layout() {
        match direction {
            Direction::Forward => {
                ins.insert(block, analysis.initial_fact());
                if block == func.entry() {
                    outs.insert(block, analysis.boundary_fact(func));
                } else {
                    outs.insert(block, analysis.initial_fact());
                }
            }
            Direction::Backward => {
                outs.insert(block, analysis.initial_fact());
                if block == func.exit() {
                    ins.insert(block, analysis.boundary_fact(func));
                } else {
                    ins.insert(block, analysis.initial_fact());
                }
            }
        }
    }

    let mut results = DataflowResults { ins, outs };
    let mut worklist: VecDeque<BlockId> = func.layout().iter().copied().collect();
    log::debug!(
        target: "dataflow",
        "solving {} for {} ({} blocks)",
        analysis.debug_name(),
        func.name,
        func.layout().len()
    );

    while let Some(block) = worklist.pop_front() {
        match direction {
            Direction::Forward => {
                let mut in_fact = results
                    .ins
                    .remove(&block)
                    .expect("block disappeared from fact map");
                for &pred in func.preds(block) {
                    let pred_out = results.outs.get(&pred).expect("missing predecessor fact");
                    analysis.meet_into(pred_out, &mut in_fact);
                }
                let mut out_fact = results
                    .outs
                    .remove(&block)
                    .expect("block disappeared from fact map");
                let changed = analysis.transfer_block(func, block, &in_fact, &mut out_fact);
                results.ins.insert(block, in_fact);
                results.outs.insert(block, out_fact);
                if changed.changed() {
                    worklist.extend(func.succs(block).iter().copied());
                }
            }
            Direction::Backward => {
                let mut out_fact = results
                    .outs
                    .remove(&block)
                    .expect("block disappeared from fact map");
                for &succ in func.succs(block) {
                    let succ_in = results.ins.get(&succ).expect("missing successor fact");
                    analysis.meet_into(succ_in, &mut out_fact);
                }
                let mut in_fact = results
                    .ins
                    .remove(&block)
                    .expect("block disappeared from fact map");
                let changed = analysis.transfer_block(func, block, &out_fact, &mut in_fact);
                results.outs.insert(block, out_fact);
                results.ins.insert(block, in_fact);
                if changed.changed() {
                    worklist.extend(func.preds(block).iter().copied());
                }
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_result_combines_like_bool() {
        let mut status = ChangeResult::Unchanged;
        status |= ChangeResult::Unchanged;
        assert!(!status.changed());
        status |= ChangeResult::Changed;
        assert!(status.changed());
        status |= ChangeResult::Unchanged;
        assert!(status.changed());
    }
}
