//! Closed AST for the MiniScript dialect.
//!
//! Statements and expressions are tagged unions; [`NodeRef`] unifies the
//! node kinds for generic traversal so that every walk over the tree is an
//! exhaustive `match`.

/// Zero-based line/character position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open source range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Whether `position` lies within the span. The end position counts as
    /// inside so that a cursor placed right after an identifier still hits it.
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Identifies a function scope within one document. The chunk root is [`ROOT_SCOPE`].
pub type ScopeId = u32;

pub const ROOT_SCOPE: ScopeId = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

/// A parsed document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    pub body: Vec<Statement>,
    /// Every include/import directive, in source order.
    pub dependencies: Vec<DependencyDirective>,
    /// Number of scopes in the chunk, root included.
    pub scope_count: u32,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Include,
    Import,
}

/// An `#include`/`include` or `#import`/`import` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyDirective {
    pub kind: DirectiveKind,
    pub path: String,
    /// Namespace alias; present only for imports.
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub condition: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Assignment {
        target: Expression,
        operator: AssignmentOperator,
        value: Expression,
    },
    /// A call statement or any other bare expression.
    Expression(Expression),
    If {
        clauses: Vec<IfClause>,
        else_body: Option<Vec<Statement>>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    For {
        variable: Identifier,
        iterable: Expression,
        body: Vec<Statement>,
    },
    Return(Option<Expression>),
    Break,
    Continue,
    Include {
        path: String,
    },
    Import {
        path: String,
        alias: Identifier,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Isa,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
    New,
    /// `@f`: reference a function without calling it.
    AddressOf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Identifier,
    pub default: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub scope: ScopeId,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Identifier(String),
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    List(Vec<Expression>),
    Map(Vec<MapEntry>),
    Member {
        base: Box<Expression>,
        name: Identifier,
    },
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    Slice {
        base: Box<Expression>,
        from: Option<Box<Expression>>,
        to: Option<Box<Expression>>,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Function(FunctionLiteral),
    /// Placeholder produced by error recovery.
    Invalid,
}

/// A borrowed reference to any AST node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Statement(&'a Statement),
    Expression(&'a Expression),
    Parameter(&'a Parameter),
}

impl<'a> NodeRef<'a> {
    pub fn span(&self) -> Span {
        match *self {
            NodeRef::Statement(statement) => statement.span,
            NodeRef::Expression(expression) => expression.span,
            NodeRef::Parameter(parameter) => parameter.span,
        }
    }

    pub fn as_expression(&self) -> Option<&'a Expression> {
        match *self {
            NodeRef::Expression(expression) => Some(expression),
            _ => None,
        }
    }

    /// The scope introduced by this node, if it is a function literal.
    pub fn introduced_scope(&self) -> Option<ScopeId> {
        match *self {
            NodeRef::Expression(Expression {
                kind: ExpressionKind::Function(function),
                ..
            }) => Some(function.scope),
            _ => None,
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        match *self {
            NodeRef::Statement(statement) => statement_children(statement),
            NodeRef::Expression(expression) => expression_children(expression),
            NodeRef::Parameter(parameter) => parameter
                .default
                .as_ref()
                .map(NodeRef::Expression)
                .into_iter()
                .collect(),
        }
    }
}

fn block(body: &[Statement]) -> impl Iterator<Item = NodeRef<'_>> {
    body.iter().map(NodeRef::Statement)
}

fn statement_children(statement: &Statement) -> Vec<NodeRef<'_>> {
    match &statement.kind {
        StatementKind::Assignment { target, value, .. } => {
            vec![NodeRef::Expression(target), NodeRef::Expression(value)]
        }
        StatementKind::Expression(expression) => vec![NodeRef::Expression(expression)],
        StatementKind::If { clauses, else_body } => {
            let mut children = Vec::new();
            for clause in clauses {
                children.push(NodeRef::Expression(&clause.condition));
                children.extend(block(&clause.body));
            }
            if let Some(else_body) = else_body {
                children.extend(block(else_body));
            }
            children
        }
        StatementKind::While { condition, body } => std::iter::once(NodeRef::Expression(condition))
            .chain(block(body))
            .collect(),
        StatementKind::For { iterable, body, .. } => std::iter::once(NodeRef::Expression(iterable))
            .chain(block(body))
            .collect(),
        StatementKind::Return(value) => value.iter().map(NodeRef::Expression).collect(),
        StatementKind::Break
        | StatementKind::Continue
        | StatementKind::Include { .. }
        | StatementKind::Import { .. } => Vec::new(),
    }
}

fn expression_children(expression: &Expression) -> Vec<NodeRef<'_>> {
    match &expression.kind {
        ExpressionKind::Identifier(_)
        | ExpressionKind::Number(_)
        | ExpressionKind::String(_)
        | ExpressionKind::Boolean(_)
        | ExpressionKind::Null
        | ExpressionKind::Invalid => Vec::new(),
        ExpressionKind::List(items) => items.iter().map(NodeRef::Expression).collect(),
        ExpressionKind::Map(entries) => entries
            .iter()
            .flat_map(|entry| [NodeRef::Expression(&entry.key), NodeRef::Expression(&entry.value)])
            .collect(),
        ExpressionKind::Member { base, .. } => vec![NodeRef::Expression(base)],
        ExpressionKind::Index { base, index } => {
            vec![NodeRef::Expression(base), NodeRef::Expression(index)]
        }
        ExpressionKind::Slice { base, from, to } => std::iter::once(NodeRef::Expression(&**base))
            .chain(from.iter().map(|e| NodeRef::Expression(&**e)))
            .chain(to.iter().map(|e| NodeRef::Expression(&**e)))
            .collect(),
        ExpressionKind::Call { callee, arguments } => std::iter::once(NodeRef::Expression(&**callee))
            .chain(arguments.iter().map(NodeRef::Expression))
            .collect(),
        ExpressionKind::Binary { left, right, .. } => {
            vec![NodeRef::Expression(left), NodeRef::Expression(right)]
        }
        ExpressionKind::Unary { operand, .. } => vec![NodeRef::Expression(operand)],
        ExpressionKind::Function(function) => function
            .parameters
            .iter()
            .map(NodeRef::Parameter)
            .chain(block(&function.body))
            .collect(),
    }
}

impl Chunk {
    /// Top-level statements as nodes.
    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_>> {
        block(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Span {
        Span::new(Position::new(sl, sc), Position::new(el, ec))
    }

    fn ident(name: &str, span: Span) -> Expression {
        Expression {
            kind: ExpressionKind::Identifier(name.to_string()),
            span,
        }
    }

    #[test]
    fn test_span_contains_is_inclusive_of_end() {
        let s = span(1, 2, 1, 5);
        assert!(s.contains(Position::new(1, 2)));
        assert!(s.contains(Position::new(1, 5)));
        assert!(!s.contains(Position::new(1, 6)));
        assert!(!s.contains(Position::new(0, 3)));
    }

    #[test]
    fn test_span_to_covers_both() {
        assert_eq!(span(0, 4, 0, 6).to(span(2, 0, 2, 1)), span(0, 4, 2, 1));
    }

    #[test]
    fn test_member_children() {
        let base = ident("a", span(0, 0, 0, 1));
        let member = Expression {
            kind: ExpressionKind::Member {
                base: Box::new(base.clone()),
                name: Identifier {
                    name: "b".into(),
                    span: span(0, 2, 0, 3),
                },
            },
            span: span(0, 0, 0, 3),
        };
        let children = NodeRef::Expression(&member).children();
        assert_eq!(children, vec![NodeRef::Expression(&base)]);
    }

    #[test]
    fn test_function_introduces_scope() {
        let function = Expression {
            kind: ExpressionKind::Function(FunctionLiteral {
                scope: 3,
                parameters: Vec::new(),
                body: Vec::new(),
            }),
            span: span(0, 0, 1, 12),
        };
        assert_eq!(NodeRef::Expression(&function).introduced_scope(), Some(3));
        assert!(NodeRef::Expression(&function).children().is_empty());
    }
}
