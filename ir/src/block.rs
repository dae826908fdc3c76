use crate::{Label, Stmt};

/// A basic block: an optional label followed by a straight-line statement
/// sequence. After CFG closure, at most one terminator appears and it is the
/// final statement; everything before it falls through.
#[derive(Clone, Debug)]
pub struct Block {
    pub label: Option<Label>,
    pub stmts: Vec<Stmt>,
    /// Marks the block for batch removal via `Function::remove_dead_blocks`.
    pub dead: bool,
}

impl Block {
    pub fn new(label: Option<Label>) -> Self {
        Self {
            label,
            stmts: Vec::new(),
            dead: false,
        }
    }

    /// The block's terminator, if its final statement is one.
    pub fn terminator(&self) -> Option<&Stmt> {
        self.stmts.last().filter(|stmt| stmt.is_terminator())
    }

    pub fn terminator_mut(&mut self) -> Option<&mut Stmt> {
        self.stmts.last_mut().filter(|stmt| stmt.is_terminator())
    }

    pub fn has_terminator(&self) -> bool {
        self.terminator().is_some()
    }

    /// Detach all statements marked dead, returning how many were removed.
    pub fn remove_dead_stmts(&mut self) -> usize {
        let before = self.stmts.len();
        self.stmts.retain(|stmt| !stmt.dead);
        before - self.stmts.len()
    }
}
