//! Strength reduction of derived induction variables.
//!
//! For each derived variable `j = a·i + b` with `a ≠ 1`, the multiplication
//! moves into the preheader as the initialization of a fresh variable `t`,
//! an increment `t := t + a·step` is placed immediately after the basic
//! variable's own increment, in-loop uses of `j` are renamed to `t`, and
//! the original definition of `j` disappears. Only an addition remains on
//! the hot path.

use tacopt_ir::{BinaryOp, BlockId, Function, IdGen, Stmt, StmtKind, Value, Var};
use tacopt_ir_analysis::{
    analyze_loop, solve, BasicIv, ChangeResult, DominatorTree, LiveVariables, Loop, LoopForest,
};

pub fn reduce_strength(
    func: &mut Function,
    forest: &LoopForest,
    tree: &DominatorTree,
    ids: &mut IdGen,
) -> ChangeResult {
    let mut overall = ChangeResult::Unchanged;
    for lp in &forest.loops {
        let Some(preheader) = lp.preheader else {
            continue;
        };
        let ivs = analyze_loop(func, tree, lp);
        if ivs.derived.is_empty() {
            continue;
        }
        let liveness = solve(&LiveVariables, func);

        for derived in &ivs.derived {
            if derived.factor == 1 {
                continue;
            }
            // Deleting the definition is only sound when the variable's
            // value cannot be observed after the loop.
            let live_out_of_loop = lp.exit_blocks(func).iter().any(|&exit| {
                func.succs(exit)
                    .iter()
                    .any(|&succ| !lp.contains(succ) && liveness.block_in(succ).contains(&derived.var))
            });
            if live_out_of_loop {
                log::debug!(
                    target: "strength-reduction",
                    "{}: {} escapes its loop, skipping",
                    func.name,
                    derived.var
                );
                continue;
            }

            let basic = ivs.basic[&derived.basic];
            let replacement = ids.fresh_var();
            install_initialization(func, preheader, replacement, derived.factor, derived.offset, basic.var, ids);
            install_step(func, &basic, replacement, derived.factor);
            rename_uses_and_drop_definition(func, lp, derived.var, replacement);
            overall = ChangeResult::Changed;
            log::debug!(
                target: "strength-reduction",
                "{}: reduced {} = {}*{} + {} to {replacement}",
                func.name,
                derived.var,
                derived.factor,
                derived.basic,
                derived.offset
            );
        }
    }
    overall
}

/// Compute `t = factor·i + offset` at the end of the preheader (before its
/// terminator), decomposed into a multiplication plus an optional addition.
fn install_initialization(
    func: &mut Function,
    preheader: BlockId,
    replacement: Var,
    factor: i32,
    offset: i32,
    basic_var: Var,
    ids: &mut IdGen,
) {
    let block = func.block_mut(preheader);
    let mut at = if block.has_terminator() {
        block.stmts.len() - 1
    } else {
        block.stmts.len()
    };
    if offset == 0 {
        block
            .stmts
            .insert(at, Stmt::binary(BinaryOp::Mul, replacement, factor, basic_var));
    } else {
        let product = ids.fresh_var();
        block
            .stmts
            .insert(at, Stmt::binary(BinaryOp::Mul, product, factor, basic_var));
        at += 1;
        block
            .stmts
            .insert(at, Stmt::binary(BinaryOp::Add, replacement, product, offset));
    }
}

/// Insert `t := t + factor·step` immediately after the basic variable's
/// increment.
fn install_step(func: &mut Function, basic: &BasicIv, replacement: Var, factor: i32) {
    let step = factor.wrapping_mul(basic.step);
    let block = func.block_mut(basic.block);
    let increment = block
        .stmts
        .iter()
        .position(|stmt| {
            stmt.def() == Some(basic.var)
                && matches!(
                    stmt.kind,
                    StmtKind::Binary {
                        op: BinaryOp::Add | BinaryOp::Sub,
                        lhs: Value::Var(base),
                        rhs: Value::Const(_),
                        ..
                    } if base == basic.var
                )
        })
        .expect("basic induction variable increment is present in its block");
    block
        .stmts
        .insert(increment + 1, Stmt::binary(BinaryOp::Add, replacement, replacement, step));
}

/// Rename every in-loop use of the derived variable to `replacement` and
/// delete its single defining statement.
fn rename_uses_and_drop_definition(func: &mut Function, lp: &Loop, var: Var, replacement: Var) {
    for block in lp.blocks_in_layout_order(func) {
        for stmt in &mut func.block_mut(block).stmts {
            if stmt.def() == Some(var) {
                stmt.dead = true;
            } else {
                stmt.replace_use(var, Value::Var(replacement));
            }
        }
    }
    func.remove_dead_stmts();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use tacopt_ir::parse_program;
    use tacopt_ir_analysis::{find_loops, materialize_preheaders};

    fn run(source: &str) -> String {
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        let tree = DominatorTree::compute(func).unwrap();
        let mut forest = find_loops(func, &tree);
        materialize_preheaders(func, &mut forest, &mut ids).unwrap();
        let tree = DominatorTree::compute(func).unwrap();
        reduce_strength(func, &forest, &tree, &mut ids);
        func.validate().unwrap();
        program.to_string()
    }

    #[test]
    fn multiplication_leaves_the_loop() {
        let out = run(
            "\
FUNCTION main :
v1 := #0
LABEL L1 :
v2 := #4 * v1
WRITE v2
v1 := v1 + #1
IF v1 < #10 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN #0
",
        );
        assert_eq!(
            out,
            "\
FUNCTION main :
v1 := #0
v3 := #4 * v1
LABEL L1 :
WRITE v3
v1 := v1 + #1
v3 := v3 + #4
IF v1 < #10 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN #0
"
        );
    }

    #[test]
    fn wider_steps_scale_the_increment() {
        let out = run(
            "\
FUNCTION main :
v1 := #0
v2 := #0
LABEL L1 :
v3 := v1 * #3
v2 := v2 + v3
v1 := v1 + #2
IF v1 < #20 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN v2
",
        );
        // t := 3*i in the preheader, stepped by 3*2 after the increment.
        assert_eq!(
            out,
            "\
FUNCTION main :
v1 := #0
v2 := #0
v4 := #3 * v1
LABEL L1 :
v2 := v2 + v4
v1 := v1 + #2
v4 := v4 + #6
IF v1 < #20 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN v2
"
        );
    }

    #[test]
    fn unit_factor_variables_are_left_alone() {
        let source = "\
FUNCTION main :
v1 := #0
LABEL L1 :
v2 := v1 + #5
WRITE v2
v1 := v1 + #1
IF v1 < #10 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN #0
";
        assert_eq!(run(source), source);
    }

    #[test]
    fn escaping_derived_variables_are_not_reduced() {
        let source = "\
FUNCTION main :
v1 := #0
LABEL L1 :
v2 := #4 * v1
v1 := v1 + #1
IF v1 < #10 GOTO L1 ELSE GOTO L2
LABEL L2 :
WRITE v2
RETURN #0
";
        assert_eq!(run(source), source);
    }

    #[test]
    fn decrementing_counter_steps_negatively() {
        let out = run(
            "\
FUNCTION main :
v1 := #10
LABEL L1 :
v2 := #8 * v1
WRITE v2
v1 := v1 - #1
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN #0
",
        );
        assert_eq!(
            out,
            "\
FUNCTION main :
v1 := #10
v3 := #8 * v1
LABEL L1 :
WRITE v3
v1 := v1 - #1
v3 := v3 + #-8
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN #0
"
        );
    }
}
