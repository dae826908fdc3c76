use core::fmt;

use cranelift_entity::entity_impl;

/// An IR variable, e.g. `v42` in the textual form.
///
/// Identifiers are opaque dense integers; 0 is reserved to mean "none" and is
/// never produced by [IdGen].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(u32);

impl Var {
    /// Construct a variable from its raw id.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is 0, which is reserved.
    pub fn new(raw: u32) -> Self {
        assert_ne!(raw, 0, "variable id 0 is reserved");
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An IR label, e.g. `L7` in the textual form.
///
/// Same identifier discipline as [Var]: 0 is reserved.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(u32);

impl Label {
    /// Construct a label from its raw id.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is 0, which is reserved.
    pub fn new(raw: u32) -> Self {
        assert_ne!(raw, 0, "label id 0 is reserved");
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A handle for a basic block in a function's block arena.
///
/// Blocks reference each other only through these ids; the arena owns the
/// block data, so the cyclic edges of the CFG never form owning cycles.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);
entity_impl!(BlockId, "blk");

/// Generator for fresh [Var] and [Label] identifiers.
///
/// Both counters are monotone and only move backwards on an explicit
/// [reset](IdGen::reset) between independent compilations. The generator is
/// an explicit context value threaded through construction and the passes
/// that mint temporaries, rather than process-global state.
#[derive(Debug, Clone)]
pub struct IdGen {
    next_var: u32,
    next_label: u32,
}

impl Default for IdGen {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGen {
    pub fn new() -> Self {
        Self {
            next_var: 1,
            next_label: 1,
        }
    }

    /// Mint a fresh variable id.
    pub fn fresh_var(&mut self) -> Var {
        let var = Var::new(self.next_var);
        self.next_var += 1;
        var
    }

    /// Mint a fresh label id.
    pub fn fresh_label(&mut self) -> Label {
        let label = Label::new(self.next_label);
        self.next_label += 1;
        label
    }

    /// Record an externally-produced variable id so later [fresh_var](Self::fresh_var)
    /// calls never collide with it.
    pub fn observe_var(&mut self, var: Var) {
        self.next_var = self.next_var.max(var.as_u32() + 1);
    }

    /// Record an externally-produced label id, as [observe_var](Self::observe_var).
    pub fn observe_label(&mut self, label: Label) {
        self.next_label = self.next_label.max(label.as_u32() + 1);
    }

    /// Reset both counters. Only valid between independent compilations;
    /// previously issued ids may be reused afterwards.
    pub fn reset(&mut self) {
        self.next_var = 1;
        self.next_label = 1;
    }
}
