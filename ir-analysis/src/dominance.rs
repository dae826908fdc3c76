//! Dominance analysis.
//!
//! Iterative set-intersection over the CFG: `dom(b) = {b} ∪ ⋂ dom(p)` for
//! every predecessor `p`, seeded with `dom(entry) = {entry}` and full sets
//! everywhere else. Convergence takes O(n) passes on reducible graphs; an
//! explicit iteration cap turns pathological inputs into a hard error
//! instead of an endless loop.

use rustc_hash::{FxHashMap, FxHashSet};
use tacopt_ir::{BlockId, Function};

/// Upper bound on intersection passes before the analysis gives up.
pub const MAX_ITERATIONS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum DominanceError {
    #[error(
        "function {function}: dominance analysis did not converge within {iterations} iterations"
    )]
    NonConvergence { function: String, iterations: usize },
}

/// Dominator sets plus the tree induced by immediate dominators.
pub struct DominatorTree {
    doms: FxHashMap<BlockId, FxHashSet<BlockId>>,
    idoms: FxHashMap<BlockId, Option<BlockId>>,
    children: FxHashMap<BlockId, Vec<BlockId>>,
}

impl DominatorTree {
    /// Compute the dominator tree of a sealed function.
    pub fn compute(func: &Function) -> Result<Self, DominanceError> {
        let entry = func.entry();
        let all: FxHashSet<BlockId> = func.layout().iter().copied().collect();

        let mut doms: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
        for &block in func.layout() {
            if block == entry {
                doms.insert(block, std::iter::once(entry).collect());
            } else {
                doms.insert(block, all.clone());
            }
        }

        let mut iterations = 0;
        loop {
            if iterations >= MAX_ITERATIONS {
                return Err(DominanceError::NonConvergence {
                    function: func.name.clone(),
                    iterations,
                });
            }
            iterations += 1;

            let mut changed = false;
            for &block in func.layout() {
                if block == entry {
                    continue;
                }
                let mut new_set: FxHashSet<BlockId> = std::iter::once(block).collect();
                let mut preds = func.preds(block).iter();
                if let Some(&first) = preds.next() {
                    let mut intersection = doms[&first].clone();
                    for &pred in preds {
                        let pred_doms = &doms[&pred];
                        intersection.retain(|b| pred_doms.contains(b));
                    }
                    new_set.extend(intersection);
                }
                if new_set != doms[&block] {
                    doms.insert(block, new_set);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        log::debug!(
            target: "dominance",
            "{}: converged after {iterations} iterations",
            func.name
        );

        // The immediate dominator of b is the unique element of dom(b)\{b}
        // dominated by every other element, i.e. the one with the largest
        // dominator set of its own.
        let mut idoms: FxHashMap<BlockId, Option<BlockId>> = FxHashMap::default();
        for &block in func.layout() {
            if block == entry {
                idoms.insert(block, None);
                continue;
            }
            let idom = doms[&block]
                .iter()
                .copied()
                .filter(|&d| d != block)
                .max_by_key(|d| doms[d].len());
            idoms.insert(block, idom);
        }

        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for &block in func.layout() {
            if let Some(Some(parent)) = idoms.get(&block) {
                children.entry(*parent).or_default().push(block);
            }
        }

        Ok(Self {
            doms,
            idoms,
            children,
        })
    }

    /// Whether `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.doms.get(&b).is_some_and(|set| set.contains(&a))
    }

    pub fn dom_set(&self, block: BlockId) -> Option<&FxHashSet<BlockId>> {
        self.doms.get(&block)
    }

    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idoms.get(&block).copied().flatten()
    }

    /// Children of `block` in the dominator tree, in layout order.
    pub fn children(&self, block: BlockId) -> &[BlockId] {
        self.children
            .get(&block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use tacopt_ir::{parse_program, IdGen, Label};

    fn diamond() -> (Function, BlockId, BlockId, BlockId, BlockId) {
        // entry -> A -> {B, C} -> D -> exit
        let source = "\
FUNCTION main :
READ v1
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L1 :
v2 := #1
GOTO L3
LABEL L2 :
v2 := #2
LABEL L3 :
RETURN v2
";
        let mut ids = IdGen::new();
        let mut program = parse_program(source, &mut ids).unwrap();
        let func = program.functions.remove(0);
        let a = func.succs(func.entry())[0];
        let b = func.block_of_label(Label::new(1)).unwrap();
        let c = func.block_of_label(Label::new(2)).unwrap();
        let d = func.block_of_label(Label::new(3)).unwrap();
        (func, a, b, c, d)
    }

    #[test]
    fn diamond_join_is_dominated_by_the_fork() {
        let (func, a, b, c, d) = diamond();
        let tree = DominatorTree::compute(&func).unwrap();

        let mut dom_d: Vec<BlockId> = tree.dom_set(d).unwrap().iter().copied().collect();
        dom_d.sort_unstable();
        let mut expected = vec![func.entry(), a, d];
        expected.sort_unstable();
        assert_eq!(dom_d, expected);
        assert_eq!(tree.idom(d), Some(a));
        assert_eq!(tree.idom(b), Some(a));
        assert_eq!(tree.idom(c), Some(a));
        assert_eq!(tree.idom(a), Some(func.entry()));
        assert_eq!(tree.idom(func.entry()), None);
        assert!(tree.dominates(a, d));
        assert!(!tree.dominates(b, d));
    }

    #[test]
    fn every_block_dominates_itself_and_nontrivially_more() {
        let (func, ..) = diamond();
        let tree = DominatorTree::compute(&func).unwrap();
        for &block in func.layout() {
            assert!(tree.dominates(block, block));
            if block != func.entry() {
                assert!(tree.dom_set(block).unwrap().len() >= 2);
            }
        }
    }

    #[test]
    fn dominator_tree_children_are_consistent_with_idom() {
        let (func, a, ..) = diamond();
        let tree = DominatorTree::compute(&func).unwrap();
        for &block in func.layout() {
            for &child in tree.children(block) {
                assert_eq!(tree.idom(child), Some(block));
            }
        }
        assert_eq!(tree.children(a).len(), 3);
    }

    #[test]
    fn loop_header_dominates_the_body() {
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
        let program = parse_program(source, &mut ids).unwrap();
        let func = &program.functions[0];
        let tree = DominatorTree::compute(func).unwrap();
        let header = func.block_of_label(Label::new(1)).unwrap();
        let after = func.block_of_label(Label::new(2)).unwrap();
        assert!(tree.dominates(header, after));
        assert!(!tree.dominates(after, header));
    }
}
