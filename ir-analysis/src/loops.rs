//! Natural-loop analysis and preheader materialization.
//!
//! A back edge is an edge `s -> h` whose target dominates its source. The
//! natural loop of a back edge is the smallest block set containing `h` and
//! every block that reaches `s` without passing through `h`, found by a
//! reverse search from `s` bounded at the header. Loops sharing a header
//! are merged. Nesting is containment of headers; a preheader is the unique
//! out-of-loop predecessor of the header, materialized on demand.

use rustc_hash::{FxHashMap, FxHashSet};
use tacopt_ir::{Block, BlockId, Function, IdGen, IrError, Stmt};

use crate::DominatorTree;

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Ir(#[from] IrError),
    #[error("function {function}: preheader invariants failed for loop headed at {header}")]
    PreheaderInvariant { function: String, header: BlockId },
}

/// One natural loop (possibly merged from several back edges sharing a
/// header).
pub struct Loop {
    pub header: BlockId,
    /// All blocks of the loop, the header included.
    pub blocks: FxHashSet<BlockId>,
    /// Sources of the back edges targeting this loop's header, in discovery
    /// order.
    pub back_edge_sources: Vec<BlockId>,
    /// The dedicated predecessor outside the loop, once materialized.
    pub preheader: Option<BlockId>,
    /// Index of the innermost enclosing loop in the owning forest.
    pub parent: Option<usize>,
    /// Nesting depth; top-level loops are at depth 1.
    pub depth: u32,
}

impl Loop {
    fn new(header: BlockId) -> Self {
        Self {
            header,
            blocks: std::iter::once(header).collect(),
            back_edge_sources: Vec::new(),
            preheader: None,
            parent: None,
            depth: 1,
        }
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// The loop's blocks in layout order, for deterministic iteration.
    pub fn blocks_in_layout_order(&self, func: &Function) -> Vec<BlockId> {
        func.layout()
            .iter()
            .copied()
            .filter(|block| self.contains(*block))
            .collect()
    }

    /// Blocks inside the loop with at least one successor outside it.
    pub fn exit_blocks(&self, func: &Function) -> Vec<BlockId> {
        self.blocks_in_layout_order(func)
            .into_iter()
            .filter(|&block| func.succs(block).iter().any(|succ| !self.contains(*succ)))
            .collect()
    }
}

/// Every natural loop of a function, with the nesting relation resolved.
pub struct LoopForest {
    pub loops: Vec<Loop>,
    innermost: FxHashMap<BlockId, usize>,
}

impl LoopForest {
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The innermost loop containing `block`, if any.
    pub fn innermost_loop(&self, block: BlockId) -> Option<usize> {
        self.innermost.get(&block).copied()
    }

    pub fn loop_depth(&self, block: BlockId) -> u32 {
        self.innermost_loop(block)
            .map(|index| self.loops[index].depth)
            .unwrap_or(0)
    }
}

fn reachable_from_entry(func: &Function) -> FxHashSet<BlockId> {
    let mut reachable = FxHashSet::default();
    let mut worklist = vec![func.entry()];
    while let Some(block) = worklist.pop() {
        if !reachable.insert(block) {
            continue;
        }
        worklist.extend(func.succs(block).iter().copied());
    }
    reachable
}

/// Detect back edges and build the natural loops of `func`.
pub fn find_loops(func: &Function, tree: &DominatorTree) -> LoopForest {
    let reachable = reachable_from_entry(func);
    let mut loops: Vec<Loop> = Vec::new();
    let mut by_header: FxHashMap<BlockId, usize> = FxHashMap::default();

    for &block in func.layout() {
        if !reachable.contains(&block) {
            continue;
        }
        for &succ in func.succs(block) {
            if !tree.dominates(succ, block) {
                continue;
            }
            // Back edge block -> succ; succ is (or joins) a loop header.
            log::debug!(target: "loops", "{}: back edge {block} -> {succ}", func.name);
            let index = *by_header.entry(succ).or_insert_with(|| {
                loops.push(Loop::new(succ));
                loops.len() - 1
            });
            loops[index].back_edge_sources.push(block);
            grow_natural_loop(func, &mut loops[index], block);
        }
    }

    resolve_nesting(&mut loops);

    let mut innermost: FxHashMap<BlockId, usize> = FxHashMap::default();
    for (index, lp) in loops.iter().enumerate() {
        for &block in &lp.blocks {
            match innermost.get(&block) {
                Some(&current) if loops[current].depth >= lp.depth => {}
                _ => {
                    innermost.insert(block, index);
                }
            }
        }
    }

    LoopForest { loops, innermost }
}

/// Reverse search from the back-edge source, bounded at the header (already
/// a member of `lp.blocks`).
fn grow_natural_loop(func: &Function, lp: &mut Loop, source: BlockId) {
    let mut worklist = Vec::new();
    if lp.blocks.insert(source) {
        worklist.push(source);
    }
    while let Some(block) = worklist.pop() {
        for &pred in func.preds(block) {
            if lp.blocks.insert(pred) {
                worklist.push(pred);
            }
        }
    }
}

fn resolve_nesting(loops: &mut [Loop]) {
    // Loop A nests in loop B iff B contains A's header. The parent is the
    // smallest such container; the size/index tie-break keeps the relation
    // acyclic on irreducible inputs.
    for index in 0..loops.len() {
        let header = loops[index].header;
        let size = loops[index].blocks.len();
        let parent = loops
            .iter()
            .enumerate()
            .filter(|&(other, lp)| {
                other != index
                    && lp.blocks.contains(&header)
                    && (lp.blocks.len() > size || (lp.blocks.len() == size && other < index))
            })
            .min_by_key(|&(_, lp)| lp.blocks.len())
            .map(|(other, _)| other);
        loops[index].parent = parent;
    }
    for index in 0..loops.len() {
        let mut depth = 1;
        let mut cursor = loops[index].parent;
        while let Some(parent) = cursor {
            depth += 1;
            cursor = loops[parent].parent;
        }
        loops[index].depth = depth;
    }
}

/// Ensure every loop has a preheader: the unique predecessor of the header
/// from outside the loop, whose only successor is the header.
///
/// Reuses a qualifying existing block; otherwise appends a fresh block with
/// a single `GOTO header` and retargets every outside branch through
/// `replace_successor`. The post-conditions are re-checked and fatal on
/// failure.
pub fn materialize_preheaders(
    func: &mut Function,
    forest: &mut LoopForest,
    ids: &mut IdGen,
) -> Result<(), LoopError> {
    for index in 0..forest.loops.len() {
        let header = forest.loops[index].header;

        let mut outside: Vec<BlockId> = Vec::new();
        for &pred in func.preds(header) {
            if !forest.loops[index].contains(pred) && !outside.contains(&pred) {
                outside.push(pred);
            }
        }

        if outside.is_empty() {
            // No entry from outside; nothing to hoist into.
            continue;
        }

        // The synthetic entry never becomes a preheader; loop rewrites
        // would otherwise insert code into it.
        if let [only] = outside.as_slice() {
            if !func.is_synthetic(*only) && func.succs(*only) == [header].as_slice() {
                forest.loops[index].preheader = Some(*only);
                log::debug!(
                    target: "loops",
                    "{}: reusing {only} as preheader of loop at {header}",
                    func.name
                );
                continue;
            }
        }

        let header_label = func.ensure_label(header, ids);
        let label = ids.fresh_label();
        let mut block = Block::new(Some(label));
        block.stmts.push(Stmt::goto(header_label));
        let preheader = func.append_block(block);
        for &pred in &outside {
            func.replace_successor(pred, header, preheader)
                .map_err(LoopError::Ir)?;
        }
        func.connect(preheader, header);
        forest.loops[index].preheader = Some(preheader);
        log::debug!(
            target: "loops",
            "{}: created preheader {preheader} for loop at {header}",
            func.name
        );

        // The new block sits on paths inside every enclosing loop; record
        // the membership so their analyses see definitions placed in it.
        let mut ancestor = forest.loops[index].parent;
        while let Some(outer) = ancestor {
            forest.loops[outer].blocks.insert(preheader);
            ancestor = forest.loops[outer].parent;
        }
        if let Some(outer) = forest.loops[index].parent {
            forest.innermost.insert(preheader, outer);
        }

        let lp = &forest.loops[index];
        let outside_preds: Vec<BlockId> = func
            .preds(header)
            .iter()
            .copied()
            .filter(|pred| !lp.contains(*pred))
            .collect();
        if lp.contains(preheader)
            || outside_preds.as_slice() != [preheader].as_slice()
            || func.succs(preheader) != [header].as_slice()
        {
            return Err(LoopError::PreheaderInvariant {
                function: func.name.clone(),
                header,
            });
        }
    }
    Ok(())
}
