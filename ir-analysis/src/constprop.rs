//! Constant propagation.
//!
//! A must-analysis over the per-variable lattice `Undef ⊐ Const(c) ⊐ Nac`.
//! Facts are partial maps from variable to lattice cell; a variable absent
//! from the map is `Undef`, so the optimistic initial fact is simply the
//! empty map.

use rustc_hash::FxHashMap;
use tacopt_ir::{BinaryOp, BlockId, Function, Stmt, StmtKind, Value, Var};

use crate::{ChangeResult, DataflowAnalysis, Direction};

/// One cell of the constant-propagation lattice.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CellValue {
    /// No definition seen yet (top).
    Undef,
    /// Every definition seen so far produced this constant.
    Const(i32),
    /// Not a constant (bottom).
    Nac,
}

impl CellValue {
    pub fn meet(self, other: Self) -> Self {
        match (self, other) {
            (Self::Undef, x) | (x, Self::Undef) => x,
            (Self::Nac, _) | (_, Self::Nac) => Self::Nac,
            (Self::Const(a), Self::Const(b)) => {
                if a == b {
                    Self::Const(a)
                } else {
                    Self::Nac
                }
            }
        }
    }

    #[inline]
    pub fn as_const(self) -> Option<i32> {
        match self {
            Self::Const(c) => Some(c),
            _ => None,
        }
    }
}

/// Evaluate `lhs op rhs` over lattice cells.
///
/// Division by a known zero yields `Undef` rather than a trap-generating
/// fold; the runtime division stays in the IR.
pub fn eval_binary(op: BinaryOp, lhs: CellValue, rhs: CellValue) -> CellValue {
    if matches!(lhs, CellValue::Undef) || matches!(rhs, CellValue::Undef) {
        return CellValue::Undef;
    }
    if matches!(lhs, CellValue::Nac) || matches!(rhs, CellValue::Nac) {
        return CellValue::Nac;
    }
    let (CellValue::Const(lhs), CellValue::Const(rhs)) = (lhs, rhs) else {
        unreachable!()
    };
    match op.evaluate(lhs, rhs) {
        Some(result) => CellValue::Const(result),
        None => CellValue::Undef,
    }
}

/// Fact: variable states at a program point. Absent means `Undef`.
pub type ConstFact = FxHashMap<Var, CellValue>;

/// Look up the cell of an operand.
pub fn value_of(fact: &ConstFact, value: &Value) -> CellValue {
    match value {
        Value::Const(c) => CellValue::Const(*c),
        Value::Var(var) => fact.get(var).copied().unwrap_or(CellValue::Undef),
    }
}

fn update(fact: &mut ConstFact, var: Var, cell: CellValue) {
    if matches!(cell, CellValue::Undef) {
        fact.remove(&var);
    } else {
        fact.insert(var, cell);
    }
}

fn meet_value(fact: &mut ConstFact, var: Var, cell: CellValue) -> ChangeResult {
    let old = fact.get(&var).copied().unwrap_or(CellValue::Undef);
    let new = old.meet(cell);
    if new == old {
        ChangeResult::Unchanged
    } else {
        update(fact, var, new);
        ChangeResult::Changed
    }
}

/// Apply one statement to `fact`.
///
/// Loads, reads and calls pin their destination at `Nac`; stores, branches
/// and writes leave the fact untouched.
pub fn transfer_stmt(stmt: &Stmt, fact: &mut ConstFact) {
    match &stmt.kind {
        StmtKind::Assign { dst, src } => {
            let cell = value_of(fact, src);
            update(fact, *dst, cell);
        }
        StmtKind::Binary { op, dst, lhs, rhs } => {
            let cell = eval_binary(*op, value_of(fact, lhs), value_of(fact, rhs));
            update(fact, *dst, cell);
        }
        _ => {
            if let Some(def) = stmt.def() {
                update(fact, def, CellValue::Nac);
            }
        }
    }
}

pub struct ConstantPropagation;

impl DataflowAnalysis for ConstantPropagation {
    type Fact = ConstFact;

    fn debug_name(&self) -> &'static str {
        "constant-propagation"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn boundary_fact(&self, func: &Function) -> Self::Fact {
        // Parameter values are caller-supplied and unknown intraprocedurally.
        func.params
            .iter()
            .map(|&param| (param, CellValue::Nac))
            .collect()
    }

    fn initial_fact(&self) -> Self::Fact {
        ConstFact::default()
    }

    fn meet_into(&self, src: &Self::Fact, dst: &mut Self::Fact) -> ChangeResult {
        let mut changed = ChangeResult::Unchanged;
        for (&var, &cell) in src {
            changed |= meet_value(dst, var, cell);
        }
        changed
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
            transfer_stmt(stmt, &mut fact);
        }
        self.meet_into(&fact, output)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::solve;
    use tacopt_ir::{IdGen, Relop};

    #[test]
    fn meet_follows_the_lattice() {
        use CellValue::*;
        assert_eq!(Undef.meet(Const(3)), Const(3));
        assert_eq!(Const(3).meet(Undef), Const(3));
        assert_eq!(Const(3).meet(Const(3)), Const(3));
        assert_eq!(Const(3).meet(Const(4)), Nac);
        assert_eq!(Nac.meet(Const(3)), Nac);
        assert_eq!(Undef.meet(Nac), Nac);
    }

    #[test]
    fn division_by_const_zero_is_undef() {
        use CellValue::*;
        assert_eq!(eval_binary(BinaryOp::Div, Const(7), Const(0)), Undef);
        assert_eq!(eval_binary(BinaryOp::Div, Const(7), Const(2)), Const(3));
        assert_eq!(eval_binary(BinaryOp::Add, Undef, Nac), Undef);
        assert_eq!(eval_binary(BinaryOp::Mul, Nac, Const(2)), Nac);
    }

    #[test]
    fn straight_line_facts_reach_const() {
        let mut ids = IdGen::new();
        let v1 = ids.fresh_var();
        let v2 = ids.fresh_var();
        let v3 = ids.fresh_var();
        let mut func = Function::new("main");
        func.push_stmt(Stmt::assign(v1, 2));
        func.push_stmt(Stmt::assign(v2, 3));
        func.push_stmt(Stmt::binary(BinaryOp::Add, v3, v1, v2));
        func.push_stmt(Stmt::ret(v3));
        func.seal(&mut ids).unwrap();

        let results = solve(&ConstantPropagation, &func);
        let exit_in = results.block_in(func.exit());
        assert_eq!(exit_in.get(&v3), Some(&CellValue::Const(5)));
    }

    #[test]
    fn conflicting_paths_meet_to_nac() {
        // v1 is 1 on one arm and 2 on the other.
        let mut ids = IdGen::new();
        let v1 = ids.fresh_var();
        let v2 = ids.fresh_var();
        let l_then = ids.fresh_label();
        let l_else = ids.fresh_label();
        let l_join = ids.fresh_label();
        let mut func = Function::new("main");
        func.push_stmt(Stmt::read(v2));
        func.push_stmt(Stmt::branch(Relop::Gt, v2, 0, l_then, l_else));
        func.push_label(l_then);
        func.push_stmt(Stmt::assign(v1, 1));
        func.push_stmt(Stmt::goto(l_join));
        func.push_label(l_else);
        func.push_stmt(Stmt::assign(v1, 2));
        func.push_label(l_join);
        func.push_stmt(Stmt::ret(v1));
        func.seal(&mut ids).unwrap();

        let results = solve(&ConstantPropagation, &func);
        let exit_in = results.block_in(func.exit());
        assert_eq!(exit_in.get(&v1), Some(&CellValue::Nac));
        assert_eq!(exit_in.get(&v2), Some(&CellValue::Nac));
    }

    #[test]
    fn params_are_seeded_nac() {
        let mut ids = IdGen::new();
        let p = ids.fresh_var();
        let v = ids.fresh_var();
        let mut func = Function::new("f");
        func.params.push(p);
        func.push_stmt(Stmt::binary(BinaryOp::Mul, v, p, 0));
        func.push_stmt(Stmt::ret(v));
        func.seal(&mut ids).unwrap();

        let results = solve(&ConstantPropagation, &func);
        let exit_in = results.block_in(func.exit());
        assert_eq!(exit_in.get(&p), Some(&CellValue::Nac));
        // Nac * const is still Nac; the algebraic identity is CSE's job.
        assert_eq!(exit_in.get(&v), Some(&CellValue::Nac));
    }

    fn cell_strategy() -> impl Strategy<Value = CellValue> {
        prop_oneof![
            Just(CellValue::Undef),
            Just(CellValue::Nac),
            (-4i32..=4).prop_map(CellValue::Const),
        ]
    }

    proptest! {
        #[test]
        fn meet_is_commutative(a in cell_strategy(), b in cell_strategy()) {
            prop_assert_eq!(a.meet(b), b.meet(a));
        }

        #[test]
        fn meet_is_associative(
            a in cell_strategy(),
            b in cell_strategy(),
            c in cell_strategy(),
        ) {
            prop_assert_eq!(a.meet(b).meet(c), a.meet(b.meet(c)));
        }

        #[test]
        fn meet_is_idempotent(a in cell_strategy()) {
            prop_assert_eq!(a.meet(a), a);
        }
    }
}
