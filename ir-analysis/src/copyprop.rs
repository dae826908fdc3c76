//! Copy propagation analysis.
//!
//! A must-analysis tracking which `rd := rs` copies are in force at each
//! program point. The fact keeps the relation in both directions so that
//! redefinitions of either side can kill the affected pairings cheaply;
//! [CopyFact::Top] is the usual "no constraint yet" sentinel.

use rustc_hash::FxHashMap;
use tacopt_ir::{BlockId, Function, Stmt, StmtKind, Value, Var};

use crate::{ChangeResult, DataflowAnalysis, Direction};

/// The copies in force at a program point: `dst_to_src` maps each copy
/// destination to its (unique) source, `src_to_dsts` is the inverse
/// relation used for kills.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyPairs {
    dst_to_src: FxHashMap<Var, Var>,
    src_to_dsts: FxHashMap<Var, Vec<Var>>,
}

impl CopyPairs {
    /// The source of the copy currently defining `dst`, if any.
    pub fn source_of(&self, dst: Var) -> Option<Var> {
        self.dst_to_src.get(&dst).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.dst_to_src.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dst_to_src.len()
    }

    /// Remove every pairing in which `var` participates, on either side.
    pub fn kill(&mut self, var: Var) {
        if let Some(src) = self.dst_to_src.remove(&var) {
            if let Some(dsts) = self.src_to_dsts.get_mut(&src) {
                dsts.retain(|&d| d != var);
                if dsts.is_empty() {
                    self.src_to_dsts.remove(&src);
                }
            }
        }
        if let Some(dsts) = self.src_to_dsts.remove(&var) {
            for dst in dsts {
                self.dst_to_src.remove(&dst);
            }
        }
    }

    /// Record `dst := src`, first killing anything touching `dst`.
    pub fn install(&mut self, dst: Var, src: Var) {
        self.kill(dst);
        if dst == src {
            return;
        }
        self.dst_to_src.insert(dst, src);
        self.src_to_dsts.entry(src).or_default().push(dst);
    }
}

/// Fact for the analysis: `Top` before any path constraint arrives, or the
/// concrete pairing relation.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyFact {
    Top,
    Pairs(CopyPairs),
}

impl CopyFact {
    pub fn empty() -> Self {
        Self::Pairs(CopyPairs::default())
    }

    pub fn source_of(&self, dst: Var) -> Option<Var> {
        match self {
            // Top only survives on blocks the boundary never reaches; there
            // is nothing meaningful to substitute there.
            Self::Top => None,
            Self::Pairs(pairs) => pairs.source_of(dst),
        }
    }

    pub fn meet_into(&self, dst: &mut CopyFact) -> ChangeResult {
        match (self, &mut *dst) {
            (Self::Top, _) => ChangeResult::Unchanged,
            (src, CopyFact::Top) => {
                *dst = src.clone();
                ChangeResult::Changed
            }
            (Self::Pairs(src), CopyFact::Pairs(pairs)) => {
                let stale: Vec<Var> = pairs
                    .dst_to_src
                    .iter()
                    .filter(|&(&d, &s)| src.source_of(d) != Some(s))
                    .map(|(&d, _)| d)
                    .collect();
                if stale.is_empty() {
                    return ChangeResult::Unchanged;
                }
                for dst_var in stale {
                    pairs.kill(dst_var);
                }
                ChangeResult::Changed
            }
        }
    }
}

/// Gen/kill for one statement: a copy between variables installs its
/// pairing; any other definition just kills.
pub fn transfer_stmt(stmt: &Stmt, fact: &mut CopyFact) {
    let CopyFact::Pairs(pairs) = fact else {
        return;
    };
    match &stmt.kind {
        StmtKind::Assign {
            dst,
            src: Value::Var(src),
        } => {
            pairs.install(*dst, *src);
        }
        _ => {
            if let Some(def) = stmt.def() {
                pairs.kill(def);
            }
        }
    }
}

pub struct CopyPropagation;

impl DataflowAnalysis for CopyPropagation {
    type Fact = CopyFact;

    fn debug_name(&self) -> &'static str {
        "copy-propagation"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn boundary_fact(&self, _func: &Function) -> Self::Fact {
        CopyFact::empty()
    }

    fn initial_fact(&self) -> Self::Fact {
        CopyFact::Top
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
            transfer_stmt(stmt, &mut fact);
        }
        fact.meet_into(output)
    }
}
