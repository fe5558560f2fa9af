//! CST production over tree-sitter with deadlines and incremental reparse.

use std::time::{Duration, Instant};

use tree_sitter::{InputEdit, Parser, Point, Tree};

use atlas_core::error::EngineError;

/// Default per-file parse deadline.
pub const PARSE_DEADLINE: Duration = Duration::from_secs(5);

/// A single text edit, expressed in bytes and rows/columns, matching
/// tree-sitter's edit model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EditSpan {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_point: (usize, usize),
    pub old_end_point: (usize, usize),
    pub new_end_point: (usize, usize),
}

impl EditSpan {
    fn to_input_edit(self) -> InputEdit {
        InputEdit {
            start_byte: self.start_byte,
            old_end_byte: self.old_end_byte,
            new_end_byte: self.new_end_byte,
            start_position: Point::new(self.start_point.0, self.start_point.1),
            old_end_position: Point::new(self.old_end_point.0, self.old_end_point.1),
            new_end_position: Point::new(self.new_end_point.0, self.new_end_point.1),
        }
    }
}

/// Wrapper around a tree-sitter [`Parser`] enforcing the per-file deadline.
pub struct CstParser {
    parser: Parser,
}

/// A successful parse: the tree plus elapsed wall time.
pub struct ParsedTree {
    pub tree: Tree,
    pub parse_time_ms: u64,
}

impl CstParser {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Parse `text` from scratch.
    pub fn parse(
        &mut self,
        grammar: &tree_sitter::Language,
        text: &str,
        deadline: Duration,
    ) -> Result<ParsedTree, EngineError> {
        self.run(grammar, text, None, deadline)
    }

    /// Reparse after edits, reusing `old_tree`. The edits must already be
    /// applied to `text`; they are replayed onto the old tree so tree-sitter
    /// can reuse unchanged subtrees.
    pub fn parse_incremental(
        &mut self,
        grammar: &tree_sitter::Language,
        text: &str,
        edits: &[EditSpan],
        old_tree: &mut Tree,
        deadline: Duration,
    ) -> Result<ParsedTree, EngineError> {
        for edit in edits {
            old_tree.edit(&edit.to_input_edit());
        }
        self.run(grammar, text, Some(old_tree), deadline)
    }

    fn run(
        &mut self,
        grammar: &tree_sitter::Language,
        text: &str,
        old_tree: Option<&Tree>,
        deadline: Duration,
    ) -> Result<ParsedTree, EngineError> {
        self.parser
            .set_language(grammar)
            .map_err(|e| EngineError::Parse(format!("grammar rejected: {e}")))?;
        #[allow(deprecated)]
        self.parser
            .set_timeout_micros(deadline.as_micros() as u64);

        let start = Instant::now();
        let result = self.parser.parse(text, old_tree);
        let elapsed = start.elapsed();
        self.parser.reset();

        match result {
            Some(tree) => Ok(ParsedTree {
                tree,
                parse_time_ms: elapsed.as_millis() as u64,
            }),
            None if elapsed >= deadline => {
                Err(EngineError::ParseTimeout(deadline.as_millis() as u64))
            }
            None => Err(EngineError::Parse("parser produced no tree".to_string())),
        }
    }
}

impl Default for CstParser {
    fn default() -> Self {
        Self::new()
    }
}
