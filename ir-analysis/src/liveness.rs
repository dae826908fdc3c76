//! Live-variable analysis.
//!
//! Backward may-analysis: a variable is live at a point if some path to the
//! exit reads it before redefining it. The meet is union and the boundary
//! (the exit's in set) is empty.

use rustc_hash::FxHashSet;
use tacopt_ir::{BlockId, Function, Stmt, Value, Var};

use crate::{ChangeResult, DataflowAnalysis, Direction};

pub type LiveFact = FxHashSet<Var>;

/// Apply one statement back-to-front: the definition dies, then every
/// non-constant use becomes live.
pub fn transfer_stmt(stmt: &Stmt, fact: &mut LiveFact) {
    if let Some(def) = stmt.def() {
        fact.remove(&def);
    }
    stmt.for_each_use(|value| {
        if let Value::Var(var) = value {
            fact.insert(*var);
        }
    });
}

pub struct LiveVariables;

impl DataflowAnalysis for LiveVariables {
    type Fact = LiveFact;

    fn debug_name(&self) -> &'static str {
        "live-variables"
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn boundary_fact(&self, _func: &Function) -> Self::Fact {
        LiveFact::default()
    }

    fn initial_fact(&self) -> Self::Fact {
        LiveFact::default()
    }

    fn meet_into(&self, src: &Self::Fact, dst: &mut Self::Fact) -> ChangeResult {
        let before = dst.len();
        dst.extend(src.iter().copied());
        if dst.len() == before {
            ChangeResult::Unchanged
        } else {
            ChangeResult::Changed
        }
    }

    fn transfer_block(
        &self,
        func: &Function,
        block: BlockId,
        input: &Self::Fact,
        output: &mut Self::Fact,
    ) -> ChangeResult {
        // Backward: `input` is the block's out set, `output` its in set.
        let mut fact = input.clone();
        for stmt in func.block(block).stmts.iter().rev() {
            transfer_stmt(stmt, &mut fact);
        }
        self.meet_into(&fact, output)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::solve;
    use tacopt_ir::{parse_program, IdGen};

    fn live_names(fact: &LiveFact) -> Vec<u32> {
        let mut vars: Vec<u32> = fact.iter().map(|v| v.as_u32()).collect();
        vars.sort_unstable();
        vars
    }

    #[test]
    fn straight_line_liveness() {
        let source = "\
FUNCTION main :
v1 := #2
v2 := v1 + #3
WRITE v2
RETURN #0
";
        let mut ids = IdGen::new();
        let program = parse_program(source, &mut ids).unwrap();
        let func = &program.functions[0];
        let results = solve(&LiveVariables, func);

        // Nothing is live at the entry's in set or at the exit.
        assert!(results.block_in(func.entry()).is_empty());
        assert!(results.block_in(func.exit()).is_empty());

        // v1 is live between its definition and its use, which are in the
        // same block, so no block-boundary set contains it.
        for &block in func.layout() {
            assert!(!results.block_out(block).contains(&Var::new(1)));
        }
    }

    #[test]
    fn loop_carried_variables_stay_live() {
        let source = "\
FUNCTION main :
v1 := #0
LABEL L1 :
v1 := v1 + #1
IF v1 < #10 GOTO L1 ELSE GOTO L2
LABEL L2 :
WRITE v1
RETURN #0
";
        let mut ids = IdGen::new();
        let program = parse_program(source, &mut ids).unwrap();
        let func = &program.functions[0];
        let results = solve(&LiveVariables, func);

        let header = func.block_of_label(tacopt_ir::Label::new(1)).unwrap();
        assert_eq!(live_names(results.block_in(header)), vec![1]);
        assert_eq!(live_names(results.block_out(header)), vec![1]);
    }

    #[test]
    fn uses_on_one_path_union_at_branches() {
        let source = "\
FUNCTION main :
READ v1
READ v2
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L1 :
WRITE v2
LABEL L2 :
RETURN #0
";
        let mut ids = IdGen::new();
        let program = parse_program(source, &mut ids).unwrap();
        let func = &program.functions[0];
        let results = solve(&LiveVariables, func);

        // At the branch block's out set, v2 is live (used on the L1 arm).
        let entry = func.entry();
        let first = func.succs(entry)[0];
        assert_eq!(live_names(results.block_out(first)), vec![2]);
    }
}
