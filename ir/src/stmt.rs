use core::fmt;

use smallvec::SmallVec;

use crate::{Label, Value, Var};

/// Binary arithmetic operators.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Evaluate the operator over two known constants.
    ///
    /// Arithmetic wraps; division by zero (and `i32::MIN / -1`) returns
    /// `None`, leaving the runtime operation in place.
    pub fn evaluate(self, lhs: i32, rhs: i32) -> Option<i32> {
        match self {
            Self::Add => Some(lhs.wrapping_add(rhs)),
            Self::Sub => Some(lhs.wrapping_sub(rhs)),
            Self::Mul => Some(lhs.wrapping_mul(rhs)),
            Self::Div => {
                if rhs == 0 {
                    None
                } else {
                    Some(lhs.wrapping_div(rhs))
                }
            }
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        })
    }
}

/// Relational operators used by conditional branches.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Relop {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Relop {
    pub fn evaluate(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

impl fmt::Display for Relop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        })
    }
}

/// The closed set of statement forms in the IR.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StmtKind {
    /// `dst := lhs op rhs`
    Binary {
        op: BinaryOp,
        dst: Var,
        lhs: Value,
        rhs: Value,
    },
    /// `dst := src`
    Assign { dst: Var, src: Value },
    /// `dst := *addr`
    Load { dst: Var, addr: Value },
    /// `*addr := src`
    Store { addr: Value, src: Value },
    /// `IF lhs relop rhs GOTO then_target ELSE GOTO else_target`
    If {
        relop: Relop,
        lhs: Value,
        rhs: Value,
        then_target: Label,
        else_target: Label,
    },
    /// `GOTO target`
    Goto { target: Label },
    /// `dst := CALL callee(args)`; `dst` may be absent for value-less calls.
    Call {
        dst: Option<Var>,
        callee: String,
        args: Vec<Value>,
    },
    /// `RETURN value`
    Return { value: Value },
    /// `READ dst`
    Read { dst: Var },
    /// `WRITE src`
    Write { src: Value },
}

/// A single three-address statement plus the dead-code marker used by the
/// elimination passes. Dead statements are detached from their block in a
/// batch after each pass.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub dead: bool,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { kind, dead: false }
    }

    pub fn binary(op: BinaryOp, dst: Var, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Self {
        Self::new(StmtKind::Binary {
            op,
            dst,
            lhs: lhs.into(),
            rhs: rhs.into(),
        })
    }

    pub fn assign(dst: Var, src: impl Into<Value>) -> Self {
        Self::new(StmtKind::Assign {
            dst,
            src: src.into(),
        })
    }

    pub fn goto(target: Label) -> Self {
        Self::new(StmtKind::Goto { target })
    }

    pub fn branch(
        relop: Relop,
        lhs: impl Into<Value>,
        rhs: impl Into<Value>,
        then_target: Label,
        else_target: Label,
    ) -> Self {
        Self::new(StmtKind::If {
            relop,
            lhs: lhs.into(),
            rhs: rhs.into(),
            then_target,
            else_target,
        })
    }

    pub fn ret(value: impl Into<Value>) -> Self {
        Self::new(StmtKind::Return {
            value: value.into(),
        })
    }

    pub fn write(src: impl Into<Value>) -> Self {
        Self::new(StmtKind::Write { src: src.into() })
    }

    pub fn read(dst: Var) -> Self {
        Self::new(StmtKind::Read { dst })
    }

    /// The single variable this statement writes, if any.
    pub fn def(&self) -> Option<Var> {
        match &self.kind {
            StmtKind::Binary { dst, .. }
            | StmtKind::Assign { dst, .. }
            | StmtKind::Load { dst, .. }
            | StmtKind::Read { dst } => Some(*dst),
            StmtKind::Call { dst, .. } => *dst,
            StmtKind::Store { .. }
            | StmtKind::If { .. }
            | StmtKind::Goto { .. }
            | StmtKind::Return { .. }
            | StmtKind::Write { .. } => None,
        }
    }

    /// The ordered values this statement reads.
    pub fn uses(&self) -> SmallVec<[Value; 2]> {
        let mut uses = SmallVec::new();
        self.for_each_use(|value| uses.push(*value));
        uses
    }

    /// Visit each used value in order.
    pub fn for_each_use(&self, mut f: impl FnMut(&Value)) {
        match &self.kind {
            StmtKind::Binary { lhs, rhs, .. } | StmtKind::If { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            StmtKind::Assign { src, .. } | StmtKind::Write { src } => f(src),
            StmtKind::Load { addr, .. } => f(addr),
            StmtKind::Store { addr, src } => {
                f(addr);
                f(src);
            }
            StmtKind::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            StmtKind::Return { value } => f(value),
            StmtKind::Goto { .. } | StmtKind::Read { .. } => {}
        }
    }

    /// Visit each used value in order, mutably.
    pub fn for_each_use_mut(&mut self, mut f: impl FnMut(&mut Value)) {
        match &mut self.kind {
            StmtKind::Binary { lhs, rhs, .. } | StmtKind::If { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            StmtKind::Assign { src, .. } | StmtKind::Write { src } => f(src),
            StmtKind::Load { addr, .. } => f(addr),
            StmtKind::Store { addr, src } => {
                f(addr);
                f(src);
            }
            StmtKind::Call { args, .. } => {
                for arg in args {
                    f(arg);
                }
            }
            StmtKind::Return { value } => f(value),
            StmtKind::Goto { .. } | StmtKind::Read { .. } => {}
        }
    }

    /// Replace every use of `from` with `to`.
    pub fn replace_use(&mut self, from: Var, to: Value) {
        self.for_each_use_mut(|value| {
            if value.as_var() == Some(from) {
                *value = to;
            }
        });
    }

    /// Whether this statement transfers control, i.e. must be the last
    /// statement of its block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::If { .. } | StmtKind::Goto { .. } | StmtKind::Return { .. }
        )
    }

    /// The labels this statement branches to, in true-before-false order.
    pub fn branch_targets(&self) -> SmallVec<[Label; 2]> {
        match &self.kind {
            StmtKind::Goto { target } => SmallVec::from_slice(&[*target]),
            StmtKind::If {
                then_target,
                else_target,
                ..
            } => SmallVec::from_slice(&[*then_target, *else_target]),
            _ => SmallVec::new(),
        }
    }

    /// Rewrite any branch target equal to `old` to `new`, returning whether a
    /// target was rewritten.
    pub fn retarget(&mut self, old: Label, new: Label) -> bool {
        let mut changed = false;
        match &mut self.kind {
            StmtKind::Goto { target } => {
                if *target == old {
                    *target = new;
                    changed = true;
                }
            }
            StmtKind::If {
                then_target,
                else_target,
                ..
            } => {
                if *then_target == old {
                    *then_target = new;
                    changed = true;
                }
                if *else_target == old {
                    *else_target = new;
                    changed = true;
                }
            }
            _ => {}
        }
        changed
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Binary { op, dst, lhs, rhs } => write!(f, "{dst} := {lhs} {op} {rhs}"),
            StmtKind::Assign { dst, src } => write!(f, "{dst} := {src}"),
            StmtKind::Load { dst, addr } => write!(f, "{dst} := *{addr}"),
            StmtKind::Store { addr, src } => write!(f, "*{addr} := {src}"),
            StmtKind::If {
                relop,
                lhs,
                rhs,
                then_target,
                else_target,
            } => write!(
                f,
                "IF {lhs} {relop} {rhs} GOTO {then_target} ELSE GOTO {else_target}"
            ),
            StmtKind::Goto { target } => write!(f, "GOTO {target}"),
            StmtKind::Call { dst, callee, args } => {
                for arg in args {
                    writeln!(f, "ARG {arg}")?;
                }
                match dst {
                    Some(dst) => write!(f, "{dst} := CALL {callee}"),
                    None => write!(f, "CALL {callee}"),
                }
            }
            StmtKind::Return { value } => write!(f, "RETURN {value}"),
            StmtKind::Read { dst } => write!(f, "READ {dst}"),
            StmtKind::Write { src } => write!(f, "WRITE {src}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn def_and_uses_per_kind() {
        let v1 = Var::new(1);
        let v2 = Var::new(2);
        let v3 = Var::new(3);

        let op = Stmt::binary(BinaryOp::Add, v3, v1, v2);
        assert_eq!(op.def(), Some(v3));
        assert_eq!(op.uses().as_slice(), &[Value::Var(v1), Value::Var(v2)]);

        let store = Stmt::new(StmtKind::Store {
            addr: Value::Var(v1),
            src: Value::Const(4),
        });
        assert_eq!(store.def(), None);
        assert_eq!(store.uses().as_slice(), &[Value::Var(v1), Value::Const(4)]);

        let call = Stmt::new(StmtKind::Call {
            dst: None,
            callee: "f".to_string(),
            args: vec![Value::Var(v2)],
        });
        assert_eq!(call.def(), None);
        assert_eq!(call.uses().as_slice(), &[Value::Var(v2)]);

        let read = Stmt::read(v1);
        assert_eq!(read.def(), Some(v1));
        assert!(read.uses().is_empty());
    }

    #[test]
    fn replace_use_only_touches_matching_vars() {
        let v1 = Var::new(1);
        let v2 = Var::new(2);
        let mut stmt = Stmt::binary(BinaryOp::Mul, Var::new(3), v1, v1);
        stmt.replace_use(v1, Value::Var(v2));
        assert_eq!(stmt.uses().as_slice(), &[Value::Var(v2), Value::Var(v2)]);

        let mut stmt = Stmt::write(v1);
        stmt.replace_use(v2, Value::Const(0));
        assert_eq!(stmt.uses().as_slice(), &[Value::Var(v1)]);
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        assert_eq!(BinaryOp::Div.evaluate(10, 0), None);
        assert_eq!(BinaryOp::Div.evaluate(10, 2), Some(5));
        assert_eq!(BinaryOp::Div.evaluate(i32::MIN, -1), Some(i32::MIN));
        assert_eq!(BinaryOp::Mul.evaluate(i32::MAX, 2), Some(-2));
    }

    #[test]
    fn retarget_rewrites_branch_labels() {
        let l1 = Label::new(1);
        let l2 = Label::new(2);
        let l3 = Label::new(3);
        let mut branch = Stmt::branch(Relop::Lt, Var::new(1), 0, l1, l2);
        assert!(branch.retarget(l1, l3));
        assert_eq!(branch.branch_targets().as_slice(), &[l3, l2]);
        assert!(!branch.retarget(l1, l3));
    }
}
