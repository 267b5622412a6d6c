use crate::core::ActiveDocument;
use crate::syntax::{Chunk, ExpressionKind, NodeRef, Span, StatementKind};
use lsp_types::*;

/// Provides folding ranges for code sections (blocks, literals, comments)
#[derive(Clone, Default)]
pub struct FoldingRangeProvider;

impl FoldingRangeProvider {
    pub fn new() -> Self {
        Self
    }

    /// Provide folding ranges for the entire document
    pub fn provide(&self, document: &ActiveDocument) -> Vec<FoldingRange> {
        let mut ranges = Vec::new();

        if let Some(chunk) = document.parsed_payload.as_deref() {
            self.find_block_ranges(chunk, &mut ranges);
            self.find_import_ranges(chunk, &mut ranges);
        }
        self.find_comment_ranges(&document.text_document.text, &mut ranges);

        ranges.sort_by_key(|range| (range.start_line, std::cmp::Reverse(range.end_line)));
        ranges
    }

    /// Function bodies, control-flow blocks and multi-line list/map literals
    fn find_block_ranges(&self, chunk: &Chunk, ranges: &mut Vec<FoldingRange>) {
        let mut stack: Vec<NodeRef<'_>> = chunk.roots().collect();
        while let Some(node) = stack.pop() {
            if is_foldable(&node) {
                push_range(ranges, node.span(), FoldingRangeKind::Region);
            }
            stack.extend(node.children());
        }
    }

    /// Runs of consecutive include/import directives
    fn find_import_ranges(&self, chunk: &Chunk, ranges: &mut Vec<FoldingRange>) {
        let mut run: Option<Span> = None;
        for directive in &chunk.dependencies {
            run = match run {
                Some(span) if directive.span.start.line <= span.end.line + 1 => Some(span.to(directive.span)),
                Some(span) => {
                    push_range(ranges, span, FoldingRangeKind::Imports);
                    Some(directive.span)
                }
                None => Some(directive.span),
            };
        }
        if let Some(span) = run {
            push_range(ranges, span, FoldingRangeKind::Imports);
        }
    }

    /// Runs of consecutive `//` comment lines
    fn find_comment_ranges(&self, text: &str, ranges: &mut Vec<FoldingRange>) {
        let mut comment_start: Option<u32> = None;
        let mut last_line = 0;

        for (line_num, line) in text.lines().enumerate() {
            let line_num = line_num as u32;
            if line.trim_start().starts_with("//") {
                comment_start.get_or_insert(line_num);
                last_line = line_num;
            } else if let Some(start) = comment_start.take() {
                push_lines(ranges, start, last_line, FoldingRangeKind::Comment);
            }
        }
        if let Some(start) = comment_start {
            push_lines(ranges, start, last_line, FoldingRangeKind::Comment);
        }
    }
}

fn is_foldable(node: &NodeRef<'_>) -> bool {
    match node {
        NodeRef::Statement(statement) => matches!(
            statement.kind,
            StatementKind::If { .. } | StatementKind::While { .. } | StatementKind::For { .. }
        ),
        NodeRef::Expression(expression) => matches!(
            expression.kind,
            ExpressionKind::Function(_) | ExpressionKind::List(_) | ExpressionKind::Map(_)
        ),
        NodeRef::Parameter(_) => false,
    }
}

fn push_range(ranges: &mut Vec<FoldingRange>, span: Span, kind: FoldingRangeKind) {
    push_lines(ranges, span.start.line, span.end.line, kind);
}

fn push_lines(ranges: &mut Vec<FoldingRange>, start_line: u32, end_line: u32, kind: FoldingRangeKind) {
    // Only create range if it spans multiple lines
    if end_line > start_line {
        ranges.push(FoldingRange {
            start_line,
            start_character: None,
            end_line,
            end_character: None,
            kind: Some(kind),
            collapsed_text: None,
        });
    }
}
