//! Copy-propagation rewrite.
//!
//! After solving, each block is walked forward from its in fact; every use
//! of a copy destination is substituted with its source. Substitution
//! chases chains (`v3 := v2`, `v2 := v1` makes a use of `v3` become `v1`):
//! installs kill both roles of the destination, so the chain is acyclic.

use tacopt_ir::{Function, Value};
use tacopt_ir_analysis::{copyprop, solve, ChangeResult, CopyPropagation};

pub fn propagate_copies(func: &mut Function) -> ChangeResult {
    let results = solve(&CopyPropagation, func);
    let mut changed = ChangeResult::Unchanged;
    let layout: Vec<_> = func.layout().to_vec();
    for block_id in layout {
        let mut fact = results.block_in(block_id).clone();
        for stmt in &mut func.block_mut(block_id).stmts {
            stmt.for_each_use_mut(|value| {
                while let Value::Var(var) = value {
                    match fact.source_of(*var) {
                        Some(src) => {
                            *value = Value::Var(src);
                            changed = ChangeResult::Changed;
                        }
                        None => break,
                    }
                }
            });
            // Track the rewritten statement so facts reflect the new copy
            // sources from here on.
            copyprop::transfer_stmt(stmt, &mut fact);
        }
    }
    if changed.changed() {
        log::debug!(target: "copy-prop", "{}: rewrote copy uses", func.name);
    }
    changed
}
