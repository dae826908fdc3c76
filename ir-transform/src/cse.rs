//! Common-subexpression elimination.
//!
//! Preprocessing interns every expression to a representative variable (see
//! `merge_common_exprs`); the available-expression solve then proves which
//! representative computations are redundant, and those are marked dead and
//! removed. The copies left behind (`rd := e`) are copy propagation's food.

use tacopt_ir::{Function, IdGen, StmtKind};
use tacopt_ir_analysis::{
    available_exprs, merge_common_exprs, solve, AvailableExpressions, ChangeResult,
};

pub fn eliminate_common_subexpressions(func: &mut Function, ids: &mut IdGen) -> ChangeResult {
    let table = merge_common_exprs(func, ids);
    if table.is_empty() {
        return ChangeResult::Unchanged;
    }

    let results = solve(&AvailableExpressions::new(&table), func);
    let mut removed = 0usize;
    let layout: Vec<_> = func.layout().to_vec();
    for block_id in layout {
        let mut fact = results.block_in(block_id).clone();
        for stmt in &mut func.block_mut(block_id).stmts {
            if let StmtKind::Binary { dst, .. } = stmt.kind {
                if table.is_repr(dst) && fact.contains(dst) {
                    stmt.dead = true;
                    removed += 1;
                }
            }
            available_exprs::transfer_stmt(&table, stmt, &mut fact);
        }
    }
    func.remove_dead_stmts();
    log::debug!(
        target: "cse",
        "{}: removed {removed} redundant computations of {} expressions",
        func.name,
        table.len()
    );
    if removed > 0 {
        ChangeResult::Changed
    } else {
        ChangeResult::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use tacopt_ir::parse_program;

    #[test]
    fn second_computation_becomes_a_copy() {
        let source = "\
FUNCTION main :
v3 := v1 + v2
v4 := v1 + v2
WRITE v3
WRITE v4
RETURN #0
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        assert!(eliminate_common_subexpressions(func, &mut ids).changed());
        assert_eq!(
            program.to_string(),
            "\
FUNCTION main :
v5 := v1 + v2
v3 := v5
v4 := v5
WRITE v3
WRITE v4
RETURN #0
"
        );
    }

    #[test]
    fn killed_expressions_are_recomputed() {
        let source = "\
FUNCTION main :
v3 := v1 + v2
v1 := #0
v4 := v1 + v2
WRITE v4
RETURN #0
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        assert!(!eliminate_common_subexpressions(func, &mut ids).changed());
        // Redefining v1 kills the expression, so both computations stay.
        assert_eq!(
            program.to_string(),
            "\
FUNCTION main :
v5 := v1 + v2
v3 := v5
v1 := #0
v5 := v1 + v2
v4 := v5
WRITE v4
RETURN #0
"
        );
    }

    #[test]
    fn expression_available_on_both_arms_is_removed_at_the_join() {
        let source = "\
FUNCTION main :
READ v1
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L1 :
v2 := v1 * v1
GOTO L3
LABEL L2 :
v3 := v1 * v1
LABEL L3 :
v4 := v1 * v1
WRITE v4
RETURN #0
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        assert!(eliminate_common_subexpressions(func, &mut ids).changed());
        // The join block's computation is redundant; the arms keep theirs.
        assert_eq!(
            program.to_string(),
            "\
FUNCTION main :
READ v1
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L1 :
v5 := v1 * v1
v2 := v5
GOTO L3
LABEL L2 :
v5 := v1 * v1
v3 := v5
LABEL L3 :
v4 := v5
WRITE v4
RETURN #0
"
        );
    }
}
