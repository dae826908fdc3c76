//! Constant folding, driven by the constant-propagation solve.
//!
//! After solving, each block is walked forward re-simulating the transfer
//! from its in fact; any used variable whose cell is a known constant is
//! rewritten to the literal. Defining statements are left in place — making
//! them dead is the job of live-variable DCE.

use tacopt_ir::{Function, Value};
use tacopt_ir_analysis::{constprop, solve, ChangeResult, ConstantPropagation};

pub fn fold_constants(func: &mut Function) -> ChangeResult {
    let results = solve(&ConstantPropagation, func);
    let mut changed = ChangeResult::Unchanged;
    let layout: Vec<_> = func.layout().to_vec();
    for block_id in layout {
        let mut fact = results.block_in(block_id).clone();
        for stmt in &mut func.block_mut(block_id).stmts {
            stmt.for_each_use_mut(|value| {
                if let Value::Var(var) = value {
                    if let Some(constant) = fact.get(var).and_then(|cell| cell.as_const()) {
                        *value = Value::Const(constant);
                        changed = ChangeResult::Changed;
                    }
                }
            });
            constprop::transfer_stmt(stmt, &mut fact);
        }
    }
    if changed.changed() {
        log::debug!(target: "folding", "{}: folded constant uses", func.name);
    }
    changed
}
