use core::fmt;

use rustc_hash::FxHashSet;

use crate::{BlockId, Function, Label, Program, StmtKind};

/// A trailing `GOTO` whose target is the textually-next block is elided when
/// printing: the fall-through it encodes is implied by the layout. Such a
/// goto also does not count as a reference that keeps the target's label.
fn suppressed_gotos(func: &Function) -> FxHashSet<BlockId> {
    let mut suppressed = FxHashSet::default();
    let layout = func.layout();
    for pair in layout.windows(2) {
        let (block, next) = (pair[0], pair[1]);
        if let Some(StmtKind::Goto { target }) = func.block(block).terminator().map(|s| &s.kind) {
            if func.block(next).label == Some(*target) {
                suppressed.insert(block);
            }
        }
    }
    suppressed
}

fn referenced_labels(func: &Function, suppressed: &FxHashSet<BlockId>) -> FxHashSet<Label> {
    let mut referenced = FxHashSet::default();
    for &id in func.layout() {
        let block = func.block(id);
        for (index, stmt) in block.stmts.iter().enumerate() {
            if index + 1 == block.stmts.len() && suppressed.contains(&id) {
                continue;
            }
            for target in stmt.branch_targets() {
                referenced.insert(target);
            }
        }
    }
    referenced
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FUNCTION {} :", self.name)?;
        for param in &self.params {
            writeln!(f, "PARAM {param}")?;
        }
        for (var, dec) in self.decs() {
            writeln!(f, "DEC {var} {}", dec.size)?;
            writeln!(f, "{} := &{var}", dec.addr)?;
        }

        let suppressed = suppressed_gotos(self);
        let referenced = referenced_labels(self, &suppressed);
        for &id in self.layout() {
            let block = self.block(id);
            if let Some(label) = block.label {
                if referenced.contains(&label) {
                    writeln!(f, "LABEL {label} :")?;
                }
            }
            for (index, stmt) in block.stmts.iter().enumerate() {
                if index + 1 == block.stmts.len() && suppressed.contains(&id) {
                    continue;
                }
                writeln!(f, "{stmt}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, function) in self.functions.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{parse_program, IdGen};

    #[test]
    fn labels_without_references_are_suppressed() {
        let source = "\
FUNCTION main :
v1 := #1
LABEL L9 :
WRITE v1
LABEL L2 :
IF v1 > #0 GOTO L2 ELSE GOTO L3
LABEL L3 :
RETURN #0
";
        let mut ids = IdGen::new();
        let program = parse_program(source, &mut ids).unwrap();
        let printed = program.to_string();
        // L9 is never the target of a branch; L2 and L3 are.
        assert!(!printed.contains("LABEL L9"));
        assert!(printed.contains("LABEL L2 :\n"));
        assert!(printed.contains("LABEL L3 :\n"));
    }

    #[test]
    fn call_arguments_print_as_arg_lines() {
        let source = "\
FUNCTION main :
ARG v1
ARG #3
v2 := CALL f
RETURN v2
";
        let mut ids = IdGen::new();
        let program = parse_program(source, &mut ids).unwrap();
        assert_eq!(program.to_string(), source);
    }

    #[test]
    fn goto_to_the_next_block_is_elided() {
        let source = "\
FUNCTION main :
v1 := #1
GOTO L1
LABEL L1 :
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN #0
";
        let mut ids = IdGen::new();
        let program = parse_program(source, &mut ids).unwrap();
        let printed = program.to_string();
        assert_eq!(
            printed,
            "\
FUNCTION main :
v1 := #1
LABEL L1 :
IF v1 > #0 GOTO L1 ELSE GOTO L2
LABEL L2 :
RETURN #0
"
        );
    }
}
