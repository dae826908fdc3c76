//! Dead-code elimination driven by live-variable analysis.
//!
//! Blocks are walked back-to-front with a working live set seeded from the
//! block's out set. An arithmetic or copy statement whose destination is
//! not live right after it has no observable effect and is marked dead.
//! Loads, stores, calls, I/O and control flow are never touched. Removing a
//! statement can make earlier definitions dead, so the whole pass repeats
//! until a fixed point.

use tacopt_ir::{Function, StmtKind};
use tacopt_ir_analysis::{liveness, solve, ChangeResult, LiveVariables};

pub fn eliminate_dead_code(func: &mut Function) -> ChangeResult {
    let mut overall = ChangeResult::Unchanged;
    loop {
        let results = solve(&LiveVariables, func);
        let mut marked = 0usize;
        let layout: Vec<_> = func.layout().to_vec();
        for block_id in layout {
            let mut live = results.block_out(block_id).clone();
            for stmt in func.block_mut(block_id).stmts.iter_mut().rev() {
                if matches!(
                    stmt.kind,
                    StmtKind::Binary { .. } | StmtKind::Assign { .. }
                ) {
                    if let Some(def) = stmt.def() {
                        if !live.contains(&def) {
                            stmt.dead = true;
                            marked += 1;
                        }
                    }
                }
                liveness::transfer_stmt(stmt, &mut live);
            }
        }
        if marked == 0 {
            break;
        }
        func.remove_dead_stmts();
        overall = ChangeResult::Changed;
        log::debug!(target: "dce", "{}: removed {marked} dead statements", func.name);
    }
    overall
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use tacopt_ir::{parse_program, IdGen};

    #[test]
    fn chains_of_dead_definitions_disappear() {
        let source = "\
FUNCTION main :
v1 := #2
v2 := v1 + #1
v3 := v2 + #1
WRITE #0
RETURN #0
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        assert!(eliminate_dead_code(func).changed());
        assert_eq!(
            program.to_string(),
            "\
FUNCTION main :
WRITE #0
RETURN #0
"
        );
    }

    #[test]
    fn side_effecting_statements_survive() {
        let source = "\
FUNCTION main :
READ v1
v2 := *v1
*v1 := #0
ARG v1
v3 := CALL helper
WRITE #1
RETURN #0
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        // v2 and v3 are unused, but loads and calls may have effects and
        // are never removed by DCE.
        eliminate_dead_code(func);
        assert_eq!(program.to_string(), source);
    }

    #[test]
    fn live_definitions_are_kept() {
        let source = "\
FUNCTION main :
v1 := #2
v2 := v1 + #1
WRITE v2
RETURN #0
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        assert!(!eliminate_dead_code(func).changed());
        assert_eq!(program.to_string(), source);
    }

    #[test]
    fn loop_carried_definitions_stay() {
        let source = "\
FUNCTION main :
v1 := #0
LABEL L1 :
v1 := v1 + #1
IF v1 < #10 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN v1
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        assert!(!eliminate_dead_code(func).changed());
    }
}
