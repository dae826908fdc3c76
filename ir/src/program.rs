use crate::Function;

/// A whole program: an ordered sequence of functions, each optimized
/// independently.
#[derive(Default, Debug)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }
}
