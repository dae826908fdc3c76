//! Peephole: single-use temporary fusion.
//!
//! When an arithmetic result is consumed by exactly one copy in the whole
//! function and nowhere else, and that copy directly follows it, the
//! arithmetic retargets the copy's destination and the copy goes away.
//! Use counts come from one linear scan over every statement.

use rustc_hash::FxHashMap;
use tacopt_ir::{Function, StmtKind, Value, Var};
use tacopt_ir_analysis::ChangeResult;

pub fn fuse_single_use_temps(func: &mut Function) -> ChangeResult {
    let mut use_counts: FxHashMap<Var, usize> = FxHashMap::default();
    for &block in func.layout() {
        for stmt in &func.block(block).stmts {
            stmt.for_each_use(|value| {
                if let Value::Var(var) = value {
                    *use_counts.entry(*var).or_insert(0) += 1;
                }
            });
        }
    }

    let mut changed = ChangeResult::Unchanged;
    let layout: Vec<_> = func.layout().to_vec();
    for block_id in layout {
        let block = func.block_mut(block_id);
        for index in 0..block.stmts.len().saturating_sub(1) {
            let fused_dst = match (&block.stmts[index].kind, &block.stmts[index + 1].kind) {
                (
                    StmtKind::Binary { dst, .. },
                    StmtKind::Assign {
                        dst: copy_dst,
                        src: Value::Var(copy_src),
                    },
                ) if copy_src == dst && use_counts.get(dst) == Some(&1) => Some(*copy_dst),
                _ => None,
            };
            if let Some(new_dst) = fused_dst {
                if let StmtKind::Binary { dst, .. } = &mut block.stmts[index].kind {
                    *dst = new_dst;
                }
                block.stmts[index + 1].dead = true;
                changed = ChangeResult::Changed;
            }
        }
        block.remove_dead_stmts();
    }
    if changed.changed() {
        log::debug!(target: "fuse", "{}: fused single-use temporaries", func.name);
    }
    changed
}
