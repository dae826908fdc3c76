//! Available-expression analysis.
//!
//! Before solving, every arithmetic statement in the function is rewritten
//! by [merge_common_exprs]: trivial algebraic identities collapse into plain
//! copies, and every remaining expression is interned to a representative
//! variable, so that the dataflow fact is just a set of representatives.
//! The meet is intersection; [SetFact::Top] stands in for "every expression
//! is available" so the universe never has to be materialized.

use rustc_hash::{FxHashMap, FxHashSet};
use tacopt_ir::{BinaryOp, BlockId, Function, IdGen, Stmt, StmtKind, Value, Var};

use crate::{ChangeResult, DataflowAnalysis, Direction};

/// An interned expression: operator plus ordered operands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Expr {
    pub op: BinaryOp,
    pub lhs: Value,
    pub rhs: Value,
}

/// The interning tables produced by [merge_common_exprs].
#[derive(Default)]
pub struct ExprTable {
    reprs: FxHashMap<Expr, Var>,
    repr_set: FxHashSet<Var>,
    kill: FxHashMap<Var, Vec<Var>>,
}

impl ExprTable {
    /// Whether `var` is the representative of some interned expression.
    pub fn is_repr(&self, var: Var) -> bool {
        self.repr_set.contains(&var)
    }

    /// The representatives whose expressions read `var`, i.e. those killed
    /// when `var` is redefined.
    pub fn killed_by(&self, var: Var) -> &[Var] {
        self.kill.get(&var).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.reprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reprs.is_empty()
    }
}

/// Collapse `x + 0`, `x * 1`, `x * 0`, `x - 0`, `x / 1` (and the commutative
/// variants of `+` and `*`) into the value the statement is guaranteed to
/// produce.
fn simplify_identity(op: BinaryOp, lhs: Value, rhs: Value) -> Option<Value> {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Const(0), other) | (other, Value::Const(0)) => Some(other),
            _ => None,
        },
        BinaryOp::Sub => match rhs {
            Value::Const(0) => Some(lhs),
            _ => None,
        },
        BinaryOp::Mul => match (lhs, rhs) {
            (Value::Const(0), _) | (_, Value::Const(0)) => Some(Value::Const(0)),
            (Value::Const(1), other) | (other, Value::Const(1)) => Some(other),
            _ => None,
        },
        BinaryOp::Div => match rhs {
            Value::Const(1) => Some(lhs),
            _ => None,
        },
    }
}

/// Mandatory preprocessing for CSE: canonicalize identities into copies and
/// split every remaining `rd := x op y` into `e := x op y; rd := e`, where
/// `e` is the expression's shared representative. Occurrences proved
/// redundant by the dataflow lose their computation in the post-solve
/// rewrite, leaving a single arithmetic statement that copy propagation
/// then spreads.
pub fn merge_common_exprs(func: &mut Function, ids: &mut IdGen) -> ExprTable {
    let mut table = ExprTable::default();
    let layout: Vec<BlockId> = func.layout().to_vec();
    for block_id in layout {
        let block = func.block_mut(block_id);
        let mut rewritten = Vec::with_capacity(block.stmts.len());
        for stmt in block.stmts.drain(..) {
            let StmtKind::Binary { op, dst, lhs, rhs } = stmt.kind else {
                rewritten.push(stmt);
                continue;
            };
            if let Some(src) = simplify_identity(op, lhs, rhs) {
                rewritten.push(Stmt::assign(dst, src));
                continue;
            }
            let expr = Expr { op, lhs, rhs };
            let repr = match table.reprs.get(&expr) {
                Some(&repr) => repr,
                None => {
                    let repr = ids.fresh_var();
                    table.reprs.insert(expr, repr);
                    table.repr_set.insert(repr);
                    for operand in [lhs, rhs] {
                        if let Some(var) = operand.as_var() {
                            table.kill.entry(var).or_default().push(repr);
                        }
                    }
                    repr
                }
            };
            // Every occurrence keeps its own computation into the
            // representative; the post-solve rewrite deletes the ones whose
            // expression is already available.
            rewritten.push(Stmt::binary(op, repr, lhs, rhs));
            rewritten.push(Stmt::assign(dst, repr));
        }
        block.stmts = rewritten;
    }
    log::debug!(
        target: "available-exprs",
        "{}: interned {} expressions",
        func.name,
        table.len()
    );
    table
}

/// A set of representative variables, with a sentinel for the universal set.
///
/// `Top` encodes "no constraint yet" without materializing every expression;
/// intersecting anything into it just replaces it.
#[derive(Debug, Clone, PartialEq)]
pub enum SetFact {
    Top,
    Elems(FxHashSet<Var>),
}

impl SetFact {
    pub fn empty() -> Self {
        Self::Elems(FxHashSet::default())
    }

    pub fn contains(&self, var: Var) -> bool {
        match self {
            Self::Top => true,
            Self::Elems(set) => set.contains(&var),
        }
    }

    pub fn insert(&mut self, var: Var) {
        if let Self::Elems(set) = self {
            set.insert(var);
        }
    }

    /// Removal from `Top` is a no-op: the sentinel only survives on blocks
    /// the boundary never reaches, where the facts are irrelevant.
    pub fn remove(&mut self, var: Var) {
        if let Self::Elems(set) = self {
            set.remove(&var);
        }
    }

    pub fn meet_into(&self, dst: &mut SetFact) -> ChangeResult {
        match (self, &mut *dst) {
            (Self::Top, _) => ChangeResult::Unchanged,
            (src, SetFact::Top) => {
                *dst = src.clone();
                ChangeResult::Changed
            }
            (Self::Elems(src), SetFact::Elems(elems)) => {
                let before = elems.len();
                elems.retain(|var| src.contains(var));
                if elems.len() == before {
                    ChangeResult::Unchanged
                } else {
                    ChangeResult::Changed
                }
            }
        }
    }
}

/// Gen/kill for one statement: a definition kills every expression reading
/// the defined variable, and a representative definition makes its
/// expression available.
pub fn transfer_stmt(table: &ExprTable, stmt: &Stmt, fact: &mut SetFact) {
    let Some(def) = stmt.def() else {
        return;
    };
    for &repr in table.killed_by(def) {
        fact.remove(repr);
    }
    if matches!(stmt.kind, StmtKind::Binary { dst, .. } if dst == def) && table.is_repr(def) {
        fact.insert(def);
    }
}

pub struct AvailableExpressions<'t> {
    table: &'t ExprTable,
}

impl<'t> AvailableExpressions<'t> {
    pub fn new(table: &'t ExprTable) -> Self {
        Self { table }
    }
}

impl DataflowAnalysis for AvailableExpressions<'_> {
    type Fact = SetFact;

    fn debug_name(&self) -> &'static str {
        "available-expressions"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn boundary_fact(&self, _func: &Function) -> Self::Fact {
        SetFact::empty()
    }

    fn initial_fact(&self) -> Self::Fact {
        SetFact::Top
    }

    fn meet_into(&self, src: &Self::Fact, dst: &mut Self::Fact) -> ChangeResult {
        src.meet_into(dst)
    }

    fn transfer_block(
        &self,
        func: &Function,
        block: BlockId,
        input: &Self::Fact,
        output: &mut Self::Fact,
    ) -> ChangeResult {
        let mut fact = input.clone();
        for stmt in &func.block(block).stmts {
            transfer_stmt(self.table, stmt, &mut fact);
        }
        fact.meet_into(output)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::solve;
    use tacopt_ir::parse_program;

    #[test]
    fn identities_become_copies() {
        let source = "\
FUNCTION main :
v1 := v2 + #0
v3 := #1 * v2
v4 := v2 * #0
v5 := v2 / #1
RETURN v1
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        let table = merge_common_exprs(func, &mut ids);
        assert!(table.is_empty());
        let printed = program.to_string();
        assert_eq!(
            printed,
            "\
FUNCTION main :
v1 := v2
v3 := v2
v4 := #0
v5 := v2
RETURN v1
"
        );
    }

    #[test]
    fn repeated_expressions_share_a_representative() {
        let source = "\
FUNCTION main :
v3 := v1 + v2
v4 := v1 + v2
RETURN v3
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        let table = merge_common_exprs(func, &mut ids);
        assert_eq!(table.len(), 1);
        // v1..v4 parsed, so the representative is v5. Both occurrences keep
        // their computation until the dataflow proves the second redundant.
        assert_eq!(
            program.to_string(),
            "\
FUNCTION main :
v5 := v1 + v2
v3 := v5
v5 := v1 + v2
v4 := v5
RETURN v3
"
        );
    }

    #[test]
    fn redefinition_kills_dependent_expressions() {
        let source = "\
FUNCTION main :
v3 := v1 + v2
v1 := #0
v4 := v1 + v2
RETURN v4
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        let table = merge_common_exprs(func, &mut ids);
        let repr = Var::new(5);
        assert!(table.is_repr(repr));
        assert_eq!(table.killed_by(Var::new(1)), &[repr]);

        let results = solve(&AvailableExpressions::new(&table), func);
        // At exit, the expression was re-generated by the second occurrence.
        let exit_in = results.block_in(func.exit());
        assert!(exit_in.contains(repr));
    }

    #[test]
    fn intersection_across_branches() {
        // The expression is computed on only one arm, so it is not
        // available at the join.
        let source = "\
FUNCTION main :
READ v1
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L1 :
v2 := v1 + #1
GOTO L3
LABEL L2 :
v3 := v1 - #1
LABEL L3 :
RETURN #0
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = &mut program.functions[0];
        let table = merge_common_exprs(func, &mut ids);
        assert_eq!(table.len(), 2);

        let results = solve(&AvailableExpressions::new(&table), func);
        let exit_in = results.block_in(func.exit());
        assert_eq!(exit_in, &SetFact::empty());
    }
}
