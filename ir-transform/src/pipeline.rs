//! The per-function optimization pipeline.
//!
//! Order matters: the loop pipeline (dominance, natural loops, preheaders,
//! LICM, strength reduction) runs first so that loop rewrites see the
//! program shape the front end produced; then the scalar pipeline folds
//! constants, shares expressions, spreads copies, folds again, and lets
//! dead-code elimination sweep up, with a final single-use fusion peephole.

use tacopt_ir::{Function, IdGen, IrError, Program};
use tacopt_ir_analysis::{find_loops, materialize_preheaders, DominanceError, DominatorTree, LoopError};

use crate::{
    eliminate_common_subexpressions, eliminate_dead_code, fold_constants, fuse_single_use_temps,
    hoist_loop_invariants, propagate_copies, reduce_strength,
};

/// A fatal invariant violation aborting the current function's optimization.
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Dominance(#[from] DominanceError),
    #[error(transparent)]
    Loops(#[from] LoopError),
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Optimize a single sealed function in place.
pub fn optimize_function(func: &mut Function, ids: &mut IdGen) -> Result<(), OptimizeError> {
    log::debug!(target: "optimize", "optimizing function {}", func.name);

    let tree = DominatorTree::compute(func)?;
    let mut forest = find_loops(func, &tree);
    if !forest.is_empty() {
        materialize_preheaders(func, &mut forest, ids)?;
        // Preheaders add blocks and edges; rebuild dominance for the loop
        // transforms.
        let tree = DominatorTree::compute(func)?;
        hoist_loop_invariants(func, &forest, &tree);
        reduce_strength(func, &forest, &tree, ids);
    }

    fold_constants(func);
    eliminate_common_subexpressions(func, ids);
    propagate_copies(func);
    fold_constants(func);
    eliminate_dead_code(func);
    fuse_single_use_temps(func);

    func.remove_dead_blocks();
    func.validate()?;
    Ok(())
}

/// Optimize every function of the program, in order.
pub fn optimize_program(program: &mut Program, ids: &mut IdGen) -> Result<(), OptimizeError> {
    for func in &mut program.functions {
        optimize_function(func, ids)?;
    }
    Ok(())
}
