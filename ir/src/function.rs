use cranelift_entity::{PrimaryMap, SecondaryMap};
use rustc_hash::FxHashMap;

use crate::{Block, BlockId, IdGen, Label, Stmt, StmtKind, Var};

/// Errors raised when the CFG cannot be built or an in-place rewrite would
/// leave it inconsistent. These are invariant violations: the caller aborts
/// optimization of the offending function.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    #[error("function {function}: block {block} has a branch before its final statement")]
    MisplacedTerminator { function: String, block: BlockId },
    #[error("function {function}: block {block} does not end in a branch or return")]
    MissingTerminator { function: String, block: BlockId },
    #[error("function {function}: label {label} is defined more than once")]
    DuplicateLabel { function: String, label: Label },
    #[error("function {function}: branch references unknown label {label}")]
    UnresolvedLabel { function: String, label: Label },
    #[error("function {function}: {old} is not a successor of {pred}")]
    NotASuccessor {
        function: String,
        pred: BlockId,
        old: BlockId,
    },
    #[error("function {function}: block {block} cannot become a branch target without a label")]
    UnlabeledTarget { function: String, block: BlockId },
    #[error("function {function}: predecessor/successor lists are inconsistent at {block}")]
    InconsistentCfg { function: String, block: BlockId },
}

/// A user declaration of aggregate storage: the variable holding the base
/// address, and the size in bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecInfo {
    pub addr: Var,
    pub size: u32,
}

/// A function: parameters, declarations, and a CFG of basic blocks.
///
/// Blocks live in an arena keyed by [BlockId]; `layout` holds the live blocks
/// in program order. The label index and the predecessor/successor lists
/// store block ids only, so the cyclic CFG never owns anything. Adjacency
/// lists are kept in edge-discovery order, which makes analysis iteration
/// deterministic.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<Var>,
    decs: Vec<(Var, DecInfo)>,
    blocks: PrimaryMap<BlockId, Block>,
    layout: Vec<BlockId>,
    labels: FxHashMap<Label, BlockId>,
    preds: SecondaryMap<BlockId, Vec<BlockId>>,
    succs: SecondaryMap<BlockId, Vec<BlockId>>,
    entry: Option<BlockId>,
    exit: Option<BlockId>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            decs: Vec::new(),
            blocks: PrimaryMap::new(),
            layout: Vec::new(),
            labels: FxHashMap::default(),
            preds: SecondaryMap::new(),
            succs: SecondaryMap::new(),
            entry: None,
            exit: None,
        }
    }

    /// Declare `var` as aggregate storage of `size` bytes, minting the
    /// variable that holds its base address.
    pub fn insert_dec(&mut self, var: Var, size: u32, ids: &mut IdGen) -> Var {
        let addr = ids.fresh_var();
        self.decs.push((var, DecInfo { addr, size }));
        addr
    }

    /// Record a declaration whose address variable is already known (used by
    /// the text reader).
    pub fn add_dec(&mut self, var: Var, addr: Var, size: u32) {
        self.decs.push((var, DecInfo { addr, size }));
    }

    pub fn decs(&self) -> &[(Var, DecInfo)] {
        &self.decs
    }

    /// Append a statement to the function under construction, starting a new
    /// block if the current one already ends in a branch.
    pub fn push_stmt(&mut self, stmt: Stmt) {
        let need_new_block = match self.layout.last() {
            None => true,
            Some(&last) => self.blocks[last].has_terminator(),
        };
        if need_new_block {
            let block = self.blocks.push(Block::new(None));
            self.layout.push(block);
        }
        let current = *self.layout.last().expect("just ensured a block exists");
        self.blocks[current].stmts.push(stmt);
    }

    /// Start a new labeled block (or attach the label to the current block if
    /// it is still empty and unlabeled).
    pub fn push_label(&mut self, label: Label) {
        if let Some(&last) = self.layout.last() {
            let block = &mut self.blocks[last];
            if block.stmts.is_empty() && block.label.is_none() {
                block.label = Some(label);
                return;
            }
        }
        let block = self.blocks.push(Block::new(Some(label)));
        self.layout.push(block);
    }

    /// Close the function for construction: synthesize entry and exit blocks,
    /// materialize fall-through as explicit `GOTO`s (minting labels where
    /// needed) so that every block ends in a terminator — a block falling
    /// off the end of the function gets `RETURN #0` — build the label
    /// index, and derive the edge lists.
    pub fn seal(&mut self, ids: &mut IdGen) -> Result<(), IrError> {
        assert!(self.entry.is_none(), "function already sealed");

        let entry = self.blocks.push(Block::new(None));
        self.layout.insert(0, entry);
        let exit = self.blocks.push(Block::new(None));
        self.layout.push(exit);

        self.labels.clear();
        for &id in &self.layout {
            if let Some(label) = self.blocks[id].label {
                if self.labels.insert(label, id).is_some() {
                    return Err(IrError::DuplicateLabel {
                        function: self.name.clone(),
                        label,
                    });
                }
            }
        }

        for position in 0..self.layout.len() - 1 {
            let id = self.layout[position];
            let block = &self.blocks[id];
            if block
                .stmts
                .iter()
                .rev()
                .skip(1)
                .any(|stmt| stmt.is_terminator())
            {
                return Err(IrError::MisplacedTerminator {
                    function: self.name.clone(),
                    block: id,
                });
            }

            match block.terminator().map(|stmt| stmt.kind.clone()) {
                Some(StmtKind::Goto { target }) => {
                    let succ = self.resolve_label(target)?;
                    self.add_edge(id, succ);
                }
                Some(StmtKind::If {
                    then_target,
                    else_target,
                    ..
                }) => {
                    let then_block = self.resolve_label(then_target)?;
                    let else_block = self.resolve_label(else_target)?;
                    self.add_edge(id, then_block);
                    self.add_edge(id, else_block);
                }
                Some(StmtKind::Return { .. }) => {
                    self.add_edge(id, exit);
                }
                Some(_) => unreachable!("terminator() only yields branch statements"),
                None => {
                    let next = self.layout[position + 1];
                    if next == exit {
                        // Falling off the end of the function returns zero;
                        // the exit block has no label to branch to.
                        self.blocks[id].stmts.push(Stmt::ret(0));
                        self.add_edge(id, exit);
                    } else {
                        let label = self.ensure_label(next, ids);
                        self.blocks[id].stmts.push(Stmt::goto(label));
                        self.add_edge(id, next);
                    }
                }
            }
        }

        self.entry = Some(entry);
        self.exit = Some(exit);
        log::debug!(
            target: "ir",
            "sealed function {}: {} blocks",
            self.name,
            self.layout.len()
        );
        Ok(())
    }

    fn resolve_label(&self, label: Label) -> Result<BlockId, IrError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or_else(|| IrError::UnresolvedLabel {
                function: self.name.clone(),
                label,
            })
    }

    /// Give `block` a label if it does not already have one.
    pub fn ensure_label(&mut self, block: BlockId, ids: &mut IdGen) -> Label {
        if let Some(label) = self.blocks[block].label {
            return label;
        }
        let label = ids.fresh_label();
        self.blocks[block].label = Some(label);
        self.labels.insert(label, block);
        label
    }

    fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.succs[from].push(to);
        self.preds[to].push(from);
    }

    /// Append a fresh block to the layout, immediately before the exit block.
    pub fn append_block(&mut self, block: Block) -> BlockId {
        let id = self.blocks.push(block);
        if let Some(label) = self.blocks[id].label {
            self.labels.insert(label, id);
        }
        let at = self
            .exit
            .and_then(|exit| self.layout.iter().position(|&b| b == exit))
            .unwrap_or(self.layout.len());
        self.layout.insert(at, id);
        id
    }

    /// Add a raw edge. Used when a rewrite constructs a new block whose
    /// terminator was just written and its targets are known-resolved.
    pub fn connect(&mut self, from: BlockId, to: BlockId) {
        self.add_edge(from, to);
    }

    /// Retarget the `pred -> old` edge to `pred -> new`, updating both the
    /// terminator's embedded label and the adjacency lists. Every branch
    /// rewrite performed by the optimizer goes through here.
    pub fn replace_successor(
        &mut self,
        pred: BlockId,
        old: BlockId,
        new: BlockId,
    ) -> Result<(), IrError> {
        let new_label = self.blocks[new]
            .label
            .ok_or_else(|| IrError::UnlabeledTarget {
                function: self.name.clone(),
                block: new,
            })?;
        let old_label = self.blocks[old].label;

        let mut replaced = 0usize;
        for succ in self.succs[pred].iter_mut() {
            if *succ == old {
                *succ = new;
                replaced += 1;
            }
        }
        if replaced == 0 {
            return Err(IrError::NotASuccessor {
                function: self.name.clone(),
                pred,
                old,
            });
        }

        if let (Some(old_label), Some(term)) = (old_label, self.blocks[pred].terminator_mut()) {
            term.retarget(old_label, new_label);
        }

        let mut remaining = replaced;
        self.preds[old].retain(|&p| {
            if p == pred && remaining > 0 {
                remaining -= 1;
                false
            } else {
                true
            }
        });
        for _ in 0..replaced {
            self.preds[new].push(pred);
        }
        log::trace!(
            target: "ir",
            "{}: retargeted {pred} -> {old} to {pred} -> {new}",
            self.name
        );
        Ok(())
    }

    /// Detach every block marked dead, cleaning the label index and both
    /// adjacency directions. Returns how many blocks were removed.
    pub fn remove_dead_blocks(&mut self) -> usize {
        let dead: Vec<BlockId> = self
            .layout
            .iter()
            .copied()
            .filter(|&id| self.blocks[id].dead)
            .collect();
        for &id in &dead {
            if let Some(label) = self.blocks[id].label {
                self.labels.remove(&label);
            }
            let succs = std::mem::take(&mut self.succs[id]);
            for succ in succs {
                self.preds[succ].retain(|&p| p != id);
            }
            let preds = std::mem::take(&mut self.preds[id]);
            for pred in preds {
                self.succs[pred].retain(|&s| s != id);
            }
        }
        self.layout.retain(|&id| !self.blocks[id].dead);
        dead.len()
    }

    /// Detach dead statements in every live block, returning how many were
    /// removed.
    pub fn remove_dead_stmts(&mut self) -> usize {
        let mut removed = 0;
        for &id in &self.layout {
            removed += self.blocks[id].remove_dead_stmts();
        }
        removed
    }

    pub fn is_sealed(&self) -> bool {
        self.entry.is_some()
    }

    pub fn entry(&self) -> BlockId {
        self.entry.expect("function has not been sealed")
    }

    pub fn exit(&self) -> BlockId {
        self.exit.expect("function has not been sealed")
    }

    /// Whether `block` is one of the synthetic entry/exit blocks.
    pub fn is_synthetic(&self, block: BlockId) -> bool {
        self.entry == Some(block) || self.exit == Some(block)
    }

    /// The live blocks, in program order.
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    pub fn block_of_label(&self, label: Label) -> Option<BlockId> {
        self.labels.get(&label).copied()
    }

    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.preds[block]
    }

    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        &self.succs[block]
    }

    /// Check the structural invariants of the sealed CFG.
    pub fn validate(&self) -> Result<(), IrError> {
        for &id in &self.layout {
            let block = &self.blocks[id];
            if block
                .stmts
                .iter()
                .rev()
                .skip(1)
                .any(|stmt| stmt.is_terminator())
            {
                return Err(IrError::MisplacedTerminator {
                    function: self.name.clone(),
                    block: id,
                });
            }
            if id != self.exit() && !block.has_terminator() {
                return Err(IrError::MissingTerminator {
                    function: self.name.clone(),
                    block: id,
                });
            }
            if let Some(term) = block.terminator() {
                for target in term.branch_targets() {
                    let succ = self.resolve_label(target)?;
                    if !self.succs[id].contains(&succ) {
                        return Err(IrError::InconsistentCfg {
                            function: self.name.clone(),
                            block: id,
                        });
                    }
                }
            }
            for &succ in &self.succs[id] {
                if !self.preds[succ].contains(&id) || !self.layout.contains(&succ) {
                    return Err(IrError::InconsistentCfg {
                        function: self.name.clone(),
                        block: id,
                    });
                }
            }
            for &pred in &self.preds[id] {
                if !self.succs[pred].contains(&id) || !self.layout.contains(&pred) {
                    return Err(IrError::InconsistentCfg {
                        function: self.name.clone(),
                        block: id,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{BinaryOp, Relop, Value};

    fn two_way_function(ids: &mut IdGen) -> Function {
        // entry -> b1 -> {b2, b3} -> b4 -> exit
        let v1 = ids.fresh_var();
        let l2 = ids.fresh_label();
        let l3 = ids.fresh_label();
        let l4 = ids.fresh_label();
        let mut func = Function::new("main");
        func.push_stmt(Stmt::assign(v1, 1));
        func.push_stmt(Stmt::branch(Relop::Lt, v1, 0, l2, l3));
        func.push_label(l2);
        func.push_stmt(Stmt::binary(BinaryOp::Add, v1, v1, 1));
        func.push_stmt(Stmt::goto(l4));
        func.push_label(l3);
        func.push_stmt(Stmt::binary(BinaryOp::Sub, v1, v1, 1));
        func.push_label(l4);
        func.push_stmt(Stmt::ret(v1));
        func.seal(ids).unwrap();
        func
    }

    #[test]
    fn seal_builds_entry_exit_and_edges() {
        let mut ids = IdGen::new();
        let func = two_way_function(&mut ids);
        assert_eq!(func.layout().len(), 6);

        let entry = func.entry();
        let exit = func.exit();
        assert_eq!(func.succs(entry).len(), 1);
        let b1 = func.succs(entry)[0];
        // The diamond: b1 branches to b2 (true) then b3 (false).
        assert_eq!(func.succs(b1).len(), 2);
        let (b2, b3) = (func.succs(b1)[0], func.succs(b1)[1]);
        let b4 = func.succs(b2)[0];
        assert_eq!(func.succs(b3), &[b4]);
        assert_eq!(func.preds(b4), &[b2, b3]);
        assert_eq!(func.succs(b4), &[exit]);
        assert!(func.preds(entry).is_empty());
        func.validate().unwrap();
    }

    #[test]
    fn fall_through_is_materialized_as_goto() {
        let mut ids = IdGen::new();
        let func = two_way_function(&mut ids);
        let entry = func.entry();
        // The synthetic entry falls through to the first real block, so it
        // must have received an explicit GOTO.
        let term = func.block(entry).terminator().expect("entry terminator");
        assert!(matches!(term.kind, StmtKind::Goto { .. }));
        // b3 had no branch and was followed by b4: same story.
        let b1 = func.succs(entry)[0];
        let b3 = func.succs(b1)[1];
        let term = func.block(b3).terminator().expect("b3 terminator");
        assert!(matches!(term.kind, StmtKind::Goto { .. }));
    }

    #[test]
    fn falling_off_the_end_materializes_a_return() {
        let mut ids = IdGen::new();
        let v1 = ids.fresh_var();
        let mut func = Function::new("main");
        func.push_stmt(Stmt::write(v1));
        func.seal(&mut ids).unwrap();

        // The final real block gained `RETURN #0` and an edge to exit.
        let entry = func.entry();
        let last = func.succs(entry)[0];
        let term = func.block(last).terminator().expect("materialized return");
        assert!(matches!(
            term.kind,
            StmtKind::Return {
                value: Value::Const(0)
            }
        ));
        assert_eq!(func.succs(last), &[func.exit()]);
        func.validate().unwrap();
    }

    #[test]
    fn validate_requires_a_terminator_on_every_real_block() {
        let mut ids = IdGen::new();
        let mut func = two_way_function(&mut ids);
        func.validate().unwrap();

        let entry = func.entry();
        let b1 = func.succs(entry)[0];
        func.block_mut(b1).stmts.pop();
        assert!(matches!(
            func.validate(),
            Err(IrError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn misplaced_terminator_is_rejected() {
        let mut ids = IdGen::new();
        let v1 = ids.fresh_var();
        let mut func = Function::new("bad");
        let block = func.blocks.push(Block::new(None));
        func.layout.push(block);
        func.blocks[block].stmts.push(Stmt::ret(v1));
        func.blocks[block].stmts.push(Stmt::write(v1));
        assert!(matches!(
            func.seal(&mut ids),
            Err(IrError::MisplacedTerminator { .. })
        ));
    }

    #[test]
    fn unresolved_branch_target_is_rejected() {
        let mut ids = IdGen::new();
        let mut func = Function::new("bad");
        func.push_stmt(Stmt::goto(Label::new(99)));
        assert!(matches!(
            func.seal(&mut ids),
            Err(IrError::UnresolvedLabel { .. })
        ));
    }

    #[test]
    fn replace_successor_rewrites_terminator_and_adjacency() {
        let mut ids = IdGen::new();
        let mut func = two_way_function(&mut ids);
        let entry = func.entry();
        let b1 = func.succs(entry)[0];
        let b2 = func.succs(b1)[0];

        let label = ids.fresh_label();
        let detour = func.append_block(Block::new(Some(label)));
        let target = func.block(b2).label.expect("b2 is a branch target");
        func.block_mut(detour).stmts.push(Stmt::goto(target));
        func.connect(detour, b2);

        func.replace_successor(b1, b2, detour).unwrap();
        assert_eq!(func.succs(b1)[0], detour);
        assert!(func.preds(b2).contains(&detour));
        assert!(!func.preds(b2).contains(&b1));
        assert!(func.preds(detour).contains(&b1));
        let term = func.block(b1).terminator().unwrap();
        assert_eq!(term.branch_targets()[0], label);
        func.validate().unwrap();

        assert!(matches!(
            func.replace_successor(b1, b2, detour),
            Err(IrError::NotASuccessor { .. })
        ));
    }

    #[test]
    fn dead_block_removal_detaches_edges_and_labels() {
        let mut ids = IdGen::new();
        let mut func = two_way_function(&mut ids);
        let entry = func.entry();
        let b1 = func.succs(entry)[0];
        let b2 = func.succs(b1)[0];
        let label = func.block(b2).label.unwrap();

        func.block_mut(b2).dead = true;
        assert_eq!(func.remove_dead_blocks(), 1);
        assert!(!func.layout().contains(&b2));
        assert!(func.block_of_label(label).is_none());
        assert!(!func.succs(b1).contains(&b2));
        for &id in func.layout() {
            assert!(!func.preds(id).contains(&b2));
        }
    }

    #[test]
    fn values_compare_structurally() {
        assert_eq!(Value::Const(3), Value::Const(3));
        assert_ne!(Value::Const(3), Value::Var(Var::new(3)));
    }
}
