//! Generated lines and the blocks they compose into.

/// One line of generated Lua.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Lua source without indentation.
    pub code: String,
    /// Nesting depth.
    pub indent: usize,
    /// Source line the code was generated from (0 for glue code).
    pub source_line: usize,
}

/// An ordered run of output lines plus the names it needs declared local.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Lines in output order.
    pub lines: Vec<OutputLine>,
    /// Names assigned in the block, in first-assignment order.
    pub names: Vec<String>,
}

impl Block {
    /// An empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line.
    pub fn push(&mut self, indent: usize, code: impl Into<String>, source_line: usize) {
        self.lines.push(OutputLine {
            code: code.into(),
            indent,
            source_line,
        });
    }

    /// Appends another block, merging its declarations.
    pub fn extend(&mut self, other: Block) {
        self.lines.extend(other.lines);
        for name in other.names {
            self.declare(name);
        }
    }

    /// Records a name to declare local. Repeats are ignored.
    pub fn declare(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    /// True if no lines were generated.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Renders the block, declaring its names at the indent of its first line.
    pub fn render(&self, unit: &str) -> String {
        let mut out = String::new();
        if !self.names.is_empty() {
            let indent = self.lines.first().map_or(0, |l| l.indent);
            out.push_str(&unit.repeat(indent));
            out.push_str("local ");
            out.push_str(&self.names.join(", "));
            out.push('\n');
        }
        for line in &self.lines {
            out.push_str(&unit.repeat(line.indent));
            out.push_str(&line.code);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_declares_locals_first() {
        let mut block = Block::new();
        block.push(1, "x = 1", 2);
        block.push(1, "if x then", 3);
        block.push(2, "y = x", 4);
        block.push(1, "end", 3);
        block.declare("x");
        block.declare("y");
        block.declare("x");
        assert_eq!(
            block.render("  "),
            "  local x, y\n  x = 1\n  if x then\n    y = x\n  end\n"
        );
    }

    #[test]
    fn test_extend_merges_names() {
        let mut a = Block::new();
        a.declare("x");
        let mut b = Block::new();
        b.push(0, "y = 2", 1);
        b.declare("x");
        b.declare("y");
        a.extend(b);
        assert_eq!(a.names, vec!["x", "y"]);
        assert_eq!(a.lines.len(), 1);
    }
}
