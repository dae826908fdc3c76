//! Induction-variable classification.
//!
//! A basic induction variable is a variable whose only definition inside
//! the loop is `i := i ± c` in a block the header dominates. A derived
//! induction variable is defined once in the loop as a linear function of a
//! basic one, `j = a·i + b`. The classification feeds strength reduction.

use rustc_hash::FxHashMap;
use tacopt_ir::{BinaryOp, BlockId, Function, StmtKind, Value, Var};

use crate::{DominatorTree, Loop};

/// `var := var ± step` — the loop's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicIv {
    pub var: Var,
    /// Block holding the unique in-loop increment.
    pub block: BlockId,
    /// Signed step: `+c` for addition, `-c` for subtraction.
    pub step: i32,
}

/// `var = factor · basic + offset`, defined once inside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedIv {
    pub var: Var,
    pub basic: Var,
    pub factor: i32,
    pub offset: i32,
    /// Block holding the unique in-loop definition.
    pub block: BlockId,
}

/// The induction variables of one loop.
#[derive(Default)]
pub struct LoopIvs {
    pub basic: FxHashMap<Var, BasicIv>,
    pub derived: Vec<DerivedIv>,
}

impl LoopIvs {
    pub fn is_basic(&self, var: Var) -> bool {
        self.basic.contains_key(&var)
    }
}

fn def_counts(func: &Function, lp: &Loop) -> FxHashMap<Var, usize> {
    let mut counts = FxHashMap::default();
    for block in lp.blocks_in_layout_order(func) {
        for stmt in &func.block(block).stmts {
            if let Some(def) = stmt.def() {
                *counts.entry(def).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Classify the induction variables of `lp`.
pub fn analyze_loop(func: &Function, tree: &DominatorTree, lp: &Loop) -> LoopIvs {
    let counts = def_counts(func, lp);
    let mut ivs = LoopIvs::default();
    let blocks = lp.blocks_in_layout_order(func);

    // Basic induction variables: `i := i + c` / `i := i - c` as the only
    // in-loop definition of `i`, in a block dominated by the header.
    for &block in &blocks {
        for stmt in &func.block(block).stmts {
            let StmtKind::Binary { op, dst, lhs, rhs } = stmt.kind else {
                continue;
            };
            let (step_op, Value::Var(base), Value::Const(c)) = (op, lhs, rhs) else {
                continue;
            };
            if base != dst {
                continue;
            }
            let step = match step_op {
                BinaryOp::Add => c,
                BinaryOp::Sub => c.wrapping_neg(),
                _ => continue,
            };
            if counts.get(&dst) != Some(&1) {
                continue;
            }
            if !tree.dominates(lp.header, block) {
                continue;
            }
            ivs.basic.entry(dst).or_insert(BasicIv {
                var: dst,
                block,
                step,
            });
        }
    }

    if ivs.basic.is_empty() {
        return ivs;
    }

    // Derived induction variables: a single in-loop definition of the form
    // `j := k*i`, `j := i*k`, `j := i+k`, `j := k+i`, `j := i-k` or
    // `j := i`, with `i` basic. A basic variable is never reclassified.
    for &block in &blocks {
        for stmt in &func.block(block).stmts {
            let classified = match &stmt.kind {
                StmtKind::Binary { op, dst, lhs, rhs } => match (op, lhs, rhs) {
                    (BinaryOp::Mul, Value::Const(k), Value::Var(i))
                    | (BinaryOp::Mul, Value::Var(i), Value::Const(k)) => Some((*dst, *i, *k, 0)),
                    (BinaryOp::Add, Value::Var(i), Value::Const(k))
                    | (BinaryOp::Add, Value::Const(k), Value::Var(i)) => Some((*dst, *i, 1, *k)),
                    (BinaryOp::Sub, Value::Var(i), Value::Const(k)) => {
                        Some((*dst, *i, 1, k.wrapping_neg()))
                    }
                    _ => None,
                },
                StmtKind::Assign {
                    dst,
                    src: Value::Var(i),
                } => Some((*dst, *i, 1, 0)),
                _ => None,
            };
            let Some((var, basic, factor, offset)) = classified else {
                continue;
            };
            if !ivs.is_basic(basic) || ivs.is_basic(var) {
                continue;
            }
            if counts.get(&var) != Some(&1) {
                continue;
            }
            if ivs.derived.iter().any(|iv| iv.var == var) {
                continue;
            }
            ivs.derived.push(DerivedIv {
                var,
                basic,
                factor,
                offset,
                block,
            });
        }
    }

    log::debug!(
        target: "induction",
        "{}: loop at {}: {} basic, {} derived",
        func.name,
        lp.header,
        ivs.basic.len(),
        ivs.derived.len()
    );
    ivs
}
