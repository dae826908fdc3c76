//! Rewrite passes over the three-address IR.
//!
//! Every pass mutates the function graph in place and reports whether it
//! changed anything; [optimize_function] strings them together in the
//! canonical order.

mod copy_prop;
mod cse;
mod dce;
mod folding;
mod fuse;
mod licm;
mod pipeline;
mod strength_reduction;

pub use self::{
    copy_prop::propagate_copies,
    cse::eliminate_common_subexpressions,
    dce::eliminate_dead_code,
    folding::fold_constants,
    fuse::fuse_single_use_temps,
    licm::hoist_loop_invariants,
    pipeline::{optimize_function, optimize_program, OptimizeError},
    strength_reduction::reduce_strength,
};
