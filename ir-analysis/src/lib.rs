//! Analyses over the three-address IR.
//!
//! The dataflow analyses (constant propagation, available expressions, copy
//! propagation, live variables) all run on the generic worklist solver in
//! [solver]; dominance, natural loops and induction variables form the loop
//! pipeline consumed by strength reduction.

pub mod available_exprs;
pub mod constprop;
pub mod copyprop;
mod dominance;
pub mod induction;
pub mod liveness;
mod loops;
mod solver;

pub use self::{
    available_exprs::{merge_common_exprs, AvailableExpressions, Expr, ExprTable, SetFact},
    constprop::{CellValue, ConstFact, ConstantPropagation},
    copyprop::{CopyFact, CopyPairs, CopyPropagation},
    dominance::{DominanceError, DominatorTree, MAX_ITERATIONS},
    induction::{analyze_loop, BasicIv, DerivedIv, LoopIvs},
    liveness::{LiveFact, LiveVariables},
    loops::{find_loops, materialize_preheaders, Loop, LoopError, LoopForest},
    solver::{solve, ChangeResult, DataflowAnalysis, DataflowResults, Direction},
};
