//! Loop-invariant code motion.
//!
//! Hoists arithmetic and copy statements into the loop preheader when it is
//! provably safe:
//!
//! * every operand is a constant or a variable with no definition inside
//!   the loop;
//! * the statement is the only in-loop definition of its target;
//! * its block dominates every exit block of the loop, so the definition
//!   executes on any path that leaves the loop;
//! * the target is not live into the header, so no use can observe a value
//!   from outside the loop that the hoisted definition would clobber.
//!
//! Hoisting can make further statements invariant, so each loop is
//! processed until no candidate remains.

use rustc_hash::FxHashMap;
use tacopt_ir::{BlockId, Function, StmtKind, Value, Var};
use tacopt_ir_analysis::{solve, ChangeResult, DominatorTree, LiveVariables, LoopForest};

pub fn hoist_loop_invariants(
    func: &mut Function,
    forest: &LoopForest,
    tree: &DominatorTree,
) -> ChangeResult {
    let mut overall = ChangeResult::Unchanged;
    for lp in &forest.loops {
        let Some(preheader) = lp.preheader else {
            continue;
        };
        loop {
            let results = solve(&LiveVariables, func);
            let header_live_in = results.block_in(lp.header);

            let blocks = lp.blocks_in_layout_order(func);
            let mut def_counts: FxHashMap<Var, usize> = FxHashMap::default();
            for &block in &blocks {
                for stmt in &func.block(block).stmts {
                    if let Some(def) = stmt.def() {
                        *def_counts.entry(def).or_insert(0) += 1;
                    }
                }
            }
            let exits = lp.exit_blocks(func);

            let mut candidates: Vec<(BlockId, usize)> = Vec::new();
            for &block in &blocks {
                if !exits.iter().all(|&exit| tree.dominates(block, exit)) {
                    continue;
                }
                for (index, stmt) in func.block(block).stmts.iter().enumerate() {
                    if !matches!(
                        stmt.kind,
                        StmtKind::Binary { .. } | StmtKind::Assign { .. }
                    ) {
                        continue;
                    }
                    let Some(def) = stmt.def() else {
                        continue;
                    };
                    if def_counts.get(&def) != Some(&1) || header_live_in.contains(&def) {
                        continue;
                    }
                    let mut invariant = true;
                    stmt.for_each_use(|value| {
                        if let Value::Var(var) = value {
                            if def_counts.contains_key(var) {
                                invariant = false;
                            }
                        }
                    });
                    if invariant {
                        candidates.push((block, index));
                    }
                }
            }
            if candidates.is_empty() {
                break;
            }

            let mut hoisted = Vec::with_capacity(candidates.len());
            for &(block, index) in &candidates {
                let stmt = &mut func.block_mut(block).stmts[index];
                stmt.dead = true;
                let mut moved = stmt.clone();
                moved.dead = false;
                hoisted.push(moved);
            }
            func.remove_dead_stmts();

            let func_name = func.name.clone();
            let target = func.block_mut(preheader);
            let mut at = if target.has_terminator() {
                target.stmts.len() - 1
            } else {
                target.stmts.len()
            };
            log::debug!(
                target: "licm",
                "{}: hoisting {} statements into {preheader}",
                func_name,
                hoisted.len()
            );
            for stmt in hoisted {
                target.stmts.insert(at, stmt);
                at += 1;
            }
            overall = ChangeResult::Changed;
        }
    }
    overall
}
