use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};
use super::{SyntaxError, SyntaxErrorKind};

/// Output of [`parse`]: a best-effort chunk plus every lexer and parser error.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub chunk: Chunk,
    pub errors: Vec<SyntaxError>,
}

/// Parse MiniScript source. Never panics on malformed input.
pub fn parse(source: &str) -> ParseResult {
    let (tokens, mut errors) = Lexer::new(source).tokenize();
    let mut parser = Parser::new(tokens);
    let chunk = parser.parse_chunk();
    errors.extend(parser.errors);
    ParseResult { chunk, errors }
}

const OR_BP: u8 = 1;
const AND_BP: u8 = 2;
const NOT_BP: u8 = 3;
const ISA_BP: u8 = 4;
const COMPARISON_BP: u8 = 5;
const ADDITIVE_BP: u8 = 6;
const MULTIPLICATIVE_BP: u8 = 7;
const NEGATE_BP: u8 = 8;
const POWER_BP: u8 = 9;

/// Deepest statement and expression nesting parsed before giving up on the
/// rest of the line.
const MAX_NESTING_DEPTH: usize = 200;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    previous_end: Position,
    next_scope: ScopeId,
    depth: usize,
    /// Set once nesting overflowed on the current line; the unwinding
    /// frames then neither cross line breaks nor report more errors.
    cut_off: bool,
    dependencies: Vec<DependencyDirective>,
    errors: Vec<SyntaxError>,
}

impl Parser {
    /// `tokens` must end with [`TokenKind::Eof`]; lexer error tokens are
    /// dropped since the lexer already reported them.
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|token| token.kind != TokenKind::Error)
            .collect();
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span.end).unwrap_or_default();
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span::new(end, end),
            });
        }

        Parser {
            tokens,
            pos: 0,
            previous_end: Position::default(),
            next_scope: ROOT_SCOPE + 1,
            depth: 0,
            cut_off: false,
            dependencies: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn parse_chunk(&mut self) -> Chunk {
        let body = self.parse_block(true);
        let end = self.current().span.end;
        Chunk {
            body,
            dependencies: std::mem::take(&mut self.dependencies),
            scope_count: self.next_scope,
            span: Span::new(Position::default(), end),
        }
    }

    // ── Token helpers ─────────────────────────────────────────────────

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn start(&self) -> Position {
        self.current().span.start
    }

    fn span_from(&self, start: Position) -> Span {
        Span::new(start, self.previous_end.max(start))
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.previous_end = token.span.end;
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.expected(what);
            false
        }
    }

    fn expected(&mut self, what: &str) {
        if self.cut_off {
            return;
        }
        let token = self.current().clone();
        self.error(
            format!("expected {what}, found {}", token.kind.describe()),
            token.span,
        );
    }

    fn error(&mut self, message: String, span: Span) {
        self.errors.push(SyntaxError {
            kind: SyntaxErrorKind::Parser,
            message,
            span,
        });
    }

    fn skip_newlines(&mut self) {
        if self.cut_off {
            return;
        }
        while matches!(self.kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
        )
    }

    fn recover_to_line_end(&mut self) {
        while !self.at_statement_end() {
            self.advance();
        }
    }

    /// Enter one nesting level. Past the limit the rest of the line is
    /// skipped and `false` is returned.
    fn enter(&mut self) -> bool {
        if self.depth >= MAX_NESTING_DEPTH {
            let span = self.current().span;
            self.error("code is nested too deeply".to_string(), span);
            self.recover_to_line_end();
            self.cut_off = true;
            return false;
        }
        self.depth += 1;
        true
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn contextual(&self, word: &str) -> bool {
        matches!(self.kind(), TokenKind::Identifier(name) if name == word)
    }

    fn expect_identifier(&mut self, what: &str) -> Option<Identifier> {
        match self.kind().clone() {
            TokenKind::Identifier(name) => {
                let token = self.advance();
                Some(Identifier {
                    name,
                    span: token.span,
                })
            }
            _ => {
                self.expected(what);
                None
            }
        }
    }

    fn expect_string(&mut self, what: &str) -> Option<String> {
        match self.kind().clone() {
            TokenKind::String(value) => {
                self.advance();
                Some(value)
            }
            _ => {
                self.expected(what);
                None
            }
        }
    }

    fn expect_end(&mut self, keyword: TokenKind, name: &str) {
        let what = format!("'end {name}'");
        if self.eat(&TokenKind::End) {
            if !self.eat(&keyword) {
                self.expected(&what);
            }
        } else {
            self.expected(&what);
        }
    }

    // ── Statements ────────────────────────────────────────────────────

    fn parse_block(&mut self, top_level: bool) -> Vec<Statement> {
        let mut body = Vec::new();
        loop {
            self.cut_off = false;
            while matches!(self.kind(), TokenKind::Newline | TokenKind::Semicolon) {
                self.advance();
            }

            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::End | TokenKind::Else if !top_level => break,
                TokenKind::End | TokenKind::Else => {
                    let token = self.current().clone();
                    self.error(
                        format!("unexpected {}", token.kind.describe()),
                        token.span,
                    );
                    self.advance();
                    self.recover_to_line_end();
                    continue;
                }
                _ => {}
            }

            let before = self.pos;
            if let Some(statement) = self.parse_statement() {
                body.push(statement);
            }

            if !self.at_statement_end() {
                self.expected("end of line");
                self.recover_to_line_end();
            }
            if self.pos == before {
                self.advance();
            }
        }
        body
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        if !self.enter() {
            return None;
        }
        let statement = self.parse_statement_inner();
        self.leave();
        statement
    }

    fn parse_statement_inner(&mut self) -> Option<Statement> {
        let start = self.start();
        match self.kind().clone() {
            TokenKind::If => Some(self.parse_if()),
            TokenKind::While => Some(self.parse_while()),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end()
                    || matches!(self.kind(), TokenKind::Else | TokenKind::End)
                {
                    None
                } else {
                    Some(self.parse_expression())
                };
                Some(self.statement(StatementKind::Return(value), start))
            }
            TokenKind::Break => {
                self.advance();
                Some(self.statement(StatementKind::Break, start))
            }
            TokenKind::Continue => {
                self.advance();
                Some(self.statement(StatementKind::Continue, start))
            }
            TokenKind::HashInclude => {
                self.advance();
                self.parse_include(start)
            }
            TokenKind::HashImport => {
                self.advance();
                self.parse_hash_import(start)
            }
            TokenKind::Identifier(word)
                if word == "include" && matches!(self.peek_kind(1), TokenKind::String(_)) =>
            {
                self.advance();
                self.parse_include(start)
            }
            TokenKind::Identifier(word)
                if word == "import" && matches!(self.peek_kind(1), TokenKind::String(_)) =>
            {
                self.advance();
                self.parse_import_as(start)
            }
            _ => Some(self.parse_expression_statement()),
        }
    }

    fn statement(&self, kind: StatementKind, start: Position) -> Statement {
        Statement {
            kind,
            span: self.span_from(start),
        }
    }

    fn parse_include(&mut self, start: Position) -> Option<Statement> {
        let path = self.expect_string("include path")?;
        let statement = self.statement(StatementKind::Include { path: path.clone() }, start);
        self.dependencies.push(DependencyDirective {
            kind: DirectiveKind::Include,
            path,
            alias: None,
            span: statement.span,
        });
        Some(statement)
    }

    /// `#import name from "path"`
    fn parse_hash_import(&mut self, start: Position) -> Option<Statement> {
        let alias = self.expect_identifier("import name")?;
        if self.contextual("from") {
            self.advance();
        } else {
            self.expected("'from'");
            return None;
        }
        let path = self.expect_string("import path")?;
        Some(self.finish_import(path, alias, start))
    }

    /// `import "path" as name`
    fn parse_import_as(&mut self, start: Position) -> Option<Statement> {
        let path = self.expect_string("import path")?;
        if self.contextual("as") {
            self.advance();
        } else {
            self.expected("'as'");
            return None;
        }
        let alias = self.expect_identifier("import name")?;
        Some(self.finish_import(path, alias, start))
    }

    fn finish_import(&mut self, path: String, alias: Identifier, start: Position) -> Statement {
        let statement = self.statement(
            StatementKind::Import {
                path: path.clone(),
                alias: alias.clone(),
            },
            start,
        );
        self.dependencies.push(DependencyDirective {
            kind: DirectiveKind::Import,
            path,
            alias: Some(alias.name),
            span: statement.span,
        });
        statement
    }

    fn parse_if(&mut self) -> Statement {
        let start = self.start();
        self.advance();
        let condition = self.parse_expression();
        self.expect(&TokenKind::Then, "'then'");

        if !self.at_statement_end() {
            return self.parse_single_line_if(start, condition);
        }

        let mut clauses = Vec::new();
        let mut else_body = None;
        let body = self.parse_block(false);
        clauses.push(IfClause {
            condition,
            body,
            span: self.span_from(start),
        });

        while self.check(&TokenKind::Else) {
            let clause_start = self.start();
            self.advance();
            if self.eat(&TokenKind::If) {
                let condition = self.parse_expression();
                self.expect(&TokenKind::Then, "'then'");
                let body = self.parse_block(false);
                clauses.push(IfClause {
                    condition,
                    body,
                    span: self.span_from(clause_start),
                });
            } else {
                else_body = Some(self.parse_block(false));
                break;
            }
        }

        self.expect_end(TokenKind::If, "if");
        self.statement(StatementKind::If { clauses, else_body }, start)
    }

    /// `if cond then stmt [else stmt]` on one line.
    fn parse_single_line_if(&mut self, start: Position, condition: Expression) -> Statement {
        let body: Vec<Statement> = self.parse_statement().into_iter().collect();
        let clauses = vec![IfClause {
            condition,
            body,
            span: self.span_from(start),
        }];

        let else_body = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(vec![self.parse_if()])
            } else {
                Some(self.parse_statement().into_iter().collect())
            }
        } else {
            None
        };

        self.statement(StatementKind::If { clauses, else_body }, start)
    }

    fn parse_while(&mut self) -> Statement {
        let start = self.start();
        self.advance();
        let condition = self.parse_expression();
        let body = self.parse_block(false);
        self.expect_end(TokenKind::While, "while");
        self.statement(StatementKind::While { condition, body }, start)
    }

    fn parse_for(&mut self) -> Option<Statement> {
        let start = self.start();
        self.advance();
        let variable = self.expect_identifier("loop variable")?;
        self.expect(&TokenKind::In, "'in'");
        let iterable = self.parse_expression();
        let body = self.parse_block(false);
        self.expect_end(TokenKind::For, "for");
        Some(self.statement(
            StatementKind::For {
                variable,
                iterable,
                body,
            },
            start,
        ))
    }

    fn parse_expression_statement(&mut self) -> Statement {
        let start = self.start();
        let mut expression = self.parse_expression();

        if let Some(operator) = assignment_operator(self.kind()) {
            self.advance();
            let value = self.parse_expression();
            if !matches!(
                expression.kind,
                ExpressionKind::Identifier(_)
                    | ExpressionKind::Member { .. }
                    | ExpressionKind::Index { .. }
            ) {
                self.error("invalid assignment target".to_string(), expression.span);
            }
            return self.statement(
                StatementKind::Assignment {
                    target: expression,
                    operator,
                    value,
                },
                start,
            );
        }

        // Command-style call without parentheses: `print "hi"`, `print a, b`
        if matches!(
            expression.kind,
            ExpressionKind::Identifier(_) | ExpressionKind::Member { .. }
        ) && self.starts_expression()
        {
            let mut arguments = vec![self.parse_expression()];
            while self.eat(&TokenKind::Comma) {
                self.skip_newlines();
                arguments.push(self.parse_expression());
            }
            expression = Expression {
                kind: ExpressionKind::Call {
                    callee: Box::new(expression),
                    arguments,
                },
                span: self.span_from(start),
            };
        }

        self.statement(StatementKind::Expression(expression), start)
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Identifier(_)
                | TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Function
                | TokenKind::Not
                | TokenKind::Minus
                | TokenKind::New
                | TokenKind::At
        )
    }

    // ── Expressions ───────────────────────────────────────────────────

    pub fn parse_expression(&mut self) -> Expression {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_bp: u8) -> Expression {
        let start = self.start();
        if !self.enter() {
            return Expression {
                kind: ExpressionKind::Invalid,
                span: self.span_from(start),
            };
        }
        let expression = self.parse_binary_inner(start, min_bp);
        self.leave();
        expression
    }

    fn parse_binary_inner(&mut self, start: Position, min_bp: u8) -> Expression {
        let mut lhs = self.parse_unary();

        while let Some((operator, bp)) = binary_operator(self.kind()) {
            if bp < min_bp {
                break;
            }
            self.advance();
            self.skip_newlines();

            // `^` is right-associative
            let next_bp = if operator == BinaryOperator::Power {
                bp
            } else {
                bp + 1
            };
            let rhs = self.parse_binary(next_bp);
            lhs = Expression {
                kind: ExpressionKind::Binary {
                    operator,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
                span: self.span_from(start),
            };
        }

        lhs
    }

    fn parse_unary(&mut self) -> Expression {
        let start = self.start();
        let (operator, operand) = match self.kind() {
            TokenKind::Not => {
                self.advance();
                (UnaryOperator::Not, self.parse_binary(NOT_BP))
            }
            TokenKind::Minus => {
                self.advance();
                (UnaryOperator::Negate, self.parse_binary(NEGATE_BP))
            }
            TokenKind::New => {
                self.advance();
                (UnaryOperator::New, self.parse_postfix())
            }
            TokenKind::At => {
                self.advance();
                (UnaryOperator::AddressOf, self.parse_postfix())
            }
            _ => return self.parse_postfix(),
        };

        Expression {
            kind: ExpressionKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            span: self.span_from(start),
        }
    }

    fn parse_postfix(&mut self) -> Expression {
        let start = self.start();
        let mut expression = self.parse_primary();

        loop {
            match self.kind() {
                TokenKind::LParen => {
                    self.advance();
                    let arguments = self.parse_sequence(&TokenKind::RParen, "')'", |p| {
                        p.parse_expression()
                    });
                    expression = Expression {
                        kind: ExpressionKind::Call {
                            callee: Box::new(expression),
                            arguments,
                        },
                        span: self.span_from(start),
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.skip_newlines();
                    expression = self.parse_index_or_slice(expression, start);
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = match self.kind().clone() {
                        TokenKind::Identifier(name) => {
                            let token = self.advance();
                            Identifier {
                                name,
                                span: token.span,
                            }
                        }
                        _ => {
                            // Keep the member node so `a.` can still be completed
                            self.expected("member name");
                            Identifier {
                                name: String::new(),
                                span: Span::new(self.previous_end, self.previous_end),
                            }
                        }
                    };
                    expression = Expression {
                        kind: ExpressionKind::Member {
                            base: Box::new(expression),
                            name,
                        },
                        span: self.span_from(start),
                    };
                }
                _ => break,
            }
        }

        expression
    }

    fn parse_index_or_slice(&mut self, base: Expression, start: Position) -> Expression {
        let base = Box::new(base);
        let from = if self.check(&TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expression()))
        };

        let kind = if self.eat(&TokenKind::Colon) {
            let to = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()))
            };
            ExpressionKind::Slice { base, from, to }
        } else {
            match from {
                Some(index) => ExpressionKind::Index { base, index },
                None => ExpressionKind::Slice {
                    base,
                    from: None,
                    to: None,
                },
            }
        };

        self.skip_newlines();
        self.expect(&TokenKind::RBracket, "']'");
        Expression {
            kind,
            span: self.span_from(start),
        }
    }

    /// Comma-separated items up to `close`, tolerating line breaks.
    fn parse_sequence<T>(
        &mut self,
        close: &TokenKind,
        what: &str,
        mut item: impl FnMut(&mut Self) -> T,
    ) -> Vec<T> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.check(close) && !self.check(&TokenKind::Eof) {
            items.push(item(self));
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(close, what);
        items
    }

    fn parse_primary(&mut self) -> Expression {
        let start = self.start();
        let kind = match self.kind().clone() {
            TokenKind::Number(value) => {
                self.advance();
                ExpressionKind::Number(value)
            }
            TokenKind::String(value) => {
                self.advance();
                ExpressionKind::String(value)
            }
            TokenKind::True => {
                self.advance();
                ExpressionKind::Boolean(true)
            }
            TokenKind::False => {
                self.advance();
                ExpressionKind::Boolean(false)
            }
            TokenKind::Null => {
                self.advance();
                ExpressionKind::Null
            }
            TokenKind::Identifier(name) => {
                self.advance();
                ExpressionKind::Identifier(name)
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expression();
                self.skip_newlines();
                self.expect(&TokenKind::RParen, "')'");
                inner.kind
            }
            TokenKind::LBracket => {
                self.advance();
                let items =
                    self.parse_sequence(&TokenKind::RBracket, "']'", |p| p.parse_expression());
                ExpressionKind::List(items)
            }
            TokenKind::LBrace => {
                self.advance();
                let entries = self.parse_sequence(&TokenKind::RBrace, "'}'", |p| {
                    let key = p.parse_expression();
                    p.expect(&TokenKind::Colon, "':'");
                    p.skip_newlines();
                    let value = p.parse_expression();
                    MapEntry { key, value }
                });
                ExpressionKind::Map(entries)
            }
            TokenKind::Function => ExpressionKind::Function(self.parse_function()),
            _ => {
                let token = self.current().clone();
                self.expected("expression");
                if !self.at_statement_end()
                    && !matches!(token.kind, TokenKind::End | TokenKind::Else)
                {
                    self.advance();
                }
                return Expression {
                    kind: ExpressionKind::Invalid,
                    span: token.span,
                };
            }
        };

        Expression {
            kind,
            span: self.span_from(start),
        }
    }

    fn parse_function(&mut self) -> FunctionLiteral {
        self.advance();
        let scope = self.next_scope;
        self.next_scope += 1;

        let parameters = if self.eat(&TokenKind::LParen) {
            self.parse_sequence(&TokenKind::RParen, "')'", |p| {
                let start = p.start();
                let name = p.expect_identifier("parameter name").unwrap_or(Identifier {
                    name: String::new(),
                    span: p.current().span,
                });
                let default = if p.eat(&TokenKind::Assign) {
                    Some(p.parse_expression())
                } else {
                    None
                };
                Parameter {
                    name,
                    default,
                    span: p.span_from(start),
                }
            })
        } else {
            Vec::new()
        };

        let body = self.parse_block(false);
        self.expect_end(TokenKind::Function, "function");
        FunctionLiteral {
            scope,
            parameters,
            body,
        }
    }
}

fn assignment_operator(kind: &TokenKind) -> Option<AssignmentOperator> {
    let operator = match kind {
        TokenKind::Assign => AssignmentOperator::Assign,
        TokenKind::PlusAssign => AssignmentOperator::Add,
        TokenKind::MinusAssign => AssignmentOperator::Subtract,
        TokenKind::StarAssign => AssignmentOperator::Multiply,
        TokenKind::SlashAssign => AssignmentOperator::Divide,
        TokenKind::PercentAssign => AssignmentOperator::Modulo,
        TokenKind::CaretAssign => AssignmentOperator::Power,
        _ => return None,
    };
    Some(operator)
}

/// Maps a token to a binary operator and its binding power.
fn binary_operator(kind: &TokenKind) -> Option<(BinaryOperator, u8)> {
    let operator = match kind {
        TokenKind::Or => (BinaryOperator::Or, OR_BP),
        TokenKind::And => (BinaryOperator::And, AND_BP),
        TokenKind::Isa => (BinaryOperator::Isa, ISA_BP),
        TokenKind::EqEq => (BinaryOperator::Equal, COMPARISON_BP),
        TokenKind::NotEq => (BinaryOperator::NotEqual, COMPARISON_BP),
        TokenKind::Less => (BinaryOperator::Less, COMPARISON_BP),
        TokenKind::Greater => (BinaryOperator::Greater, COMPARISON_BP),
        TokenKind::LessEq => (BinaryOperator::LessEqual, COMPARISON_BP),
        TokenKind::GreaterEq => (BinaryOperator::GreaterEqual, COMPARISON_BP),
        TokenKind::Plus => (BinaryOperator::Add, ADDITIVE_BP),
        TokenKind::Minus => (BinaryOperator::Subtract, ADDITIVE_BP),
        TokenKind::Star => (BinaryOperator::Multiply, MULTIPLICATIVE_BP),
        TokenKind::Slash => (BinaryOperator::Divide, MULTIPLICATIVE_BP),
        TokenKind::Percent => (BinaryOperator::Modulo, MULTIPLICATIVE_BP),
        TokenKind::Caret => (BinaryOperator::Power, POWER_BP),
        _ => return None,
    };
    Some(operator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Chunk {
        let result = parse(source);
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
        result.chunk
    }

    fn single(source: &str) -> StatementKind {
        let mut chunk = parse_ok(source);
        assert_eq!(chunk.body.len(), 1);
        chunk.body.remove(0).kind
    }

    // ── Statements ────────────────────────────────────────────────────

    #[test]
    fn test_simple_assignment() {
        match single("x = 1") {
            StatementKind::Assignment {
                target,
                operator,
                value,
            } => {
                assert_eq!(target.kind, ExpressionKind::Identifier("x".into()));
                assert_eq!(operator, AssignmentOperator::Assign);
                assert_eq!(value.kind, ExpressionKind::Number(1.0));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_compound_assignment_to_member() {
        match single("player.score += 10") {
            StatementKind::Assignment {
                target, operator, ..
            } => {
                assert!(matches!(target.kind, ExpressionKind::Member { .. }));
                assert_eq!(operator, AssignmentOperator::Add);
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_command_call_without_parens() {
        match single("print \"hello\", 2") {
            StatementKind::Expression(Expression {
                kind: ExpressionKind::Call { callee, arguments },
                ..
            }) => {
                assert_eq!(callee.kind, ExpressionKind::Identifier("print".into()));
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_block_if_with_else_if_and_else() {
        let source = "if a then\n  x = 1\nelse if b then\n  x = 2\nelse\n  x = 3\nend if";
        match single(source) {
            StatementKind::If { clauses, else_body } => {
                assert_eq!(clauses.len(), 2);
                assert_eq!(else_body.map(|b| b.len()), Some(1));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_single_line_if_else() {
        match single("if a then x = 1 else x = 2") {
            StatementKind::If { clauses, else_body } => {
                assert_eq!(clauses.len(), 1);
                assert_eq!(clauses[0].body.len(), 1);
                assert!(else_body.is_some());
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn test_while_and_for_loops() {
        let chunk = parse_ok("while i < 10\n  i += 1\nend while\nfor x in [1, 2]\n  print x\nend for");
        assert!(matches!(chunk.body[0].kind, StatementKind::While { .. }));
        match &chunk.body[1].kind {
            StatementKind::For { variable, body, .. } => {
                assert_eq!(variable.name, "x");
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected for, got {other:?}"),
        }
    }

    #[test]
    fn test_function_literal_allocates_scopes() {
        let chunk = parse_ok(
            "add = function(a, b = 1)\n  inner = function\n  end function\n  return a + b\nend function",
        );
        assert_eq!(chunk.scope_count, 3);
        match &chunk.body[0].kind {
            StatementKind::Assignment { value, .. } => match &value.kind {
                ExpressionKind::Function(function) => {
                    assert_eq!(function.scope, 1);
                    assert_eq!(function.parameters.len(), 2);
                    assert!(function.parameters[1].default.is_some());
                    assert_eq!(function.body.len(), 2);
                }
                other => panic!("expected function, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    // ── Directives ────────────────────────────────────────────────────

    #[test]
    fn test_all_directive_forms() {
        let chunk = parse_ok(
            "#include \"a.src\"\ninclude \"b.ms\"\n#import utils from \"c.src\"\nimport \"lib.ms\" as mathlib",
        );
        let summary: Vec<_> = chunk
            .dependencies
            .iter()
            .map(|d| (d.kind, d.path.as_str(), d.alias.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (DirectiveKind::Include, "a.src", None),
                (DirectiveKind::Include, "b.ms", None),
                (DirectiveKind::Import, "c.src", Some("utils")),
                (DirectiveKind::Import, "lib.ms", Some("mathlib")),
            ]
        );
    }

    #[test]
    fn test_include_as_plain_identifier_is_not_a_directive() {
        let chunk = parse_ok("include = 3");
        assert!(chunk.dependencies.is_empty());
    }

    // ── Expressions ───────────────────────────────────────────────────

    #[test]
    fn test_precedence() {
        match single("x = 1 + 2 * 3") {
            StatementKind::Assignment { value, .. } => match value.kind {
                ExpressionKind::Binary {
                    operator, right, ..
                } => {
                    assert_eq!(operator, BinaryOperator::Add);
                    assert!(matches!(
                        right.kind,
                        ExpressionKind::Binary {
                            operator: BinaryOperator::Multiply,
                            ..
                        }
                    ));
                }
                other => panic!("expected binary, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        match single("x = 2 ^ 3 ^ 2") {
            StatementKind::Assignment { value, .. } => match value.kind {
                ExpressionKind::Binary { left, right, .. } => {
                    assert_eq!(left.kind, ExpressionKind::Number(2.0));
                    assert!(matches!(right.kind, ExpressionKind::Binary { .. }));
                }
                other => panic!("expected binary, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_postfix_chain_and_slice() {
        match single("x = a.b[1](2)[1:]") {
            StatementKind::Assignment { value, .. } => {
                assert!(matches!(value.kind, ExpressionKind::Slice { to: None, .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_multiline_map_and_list() {
        let chunk = parse_ok("m = {\n  \"a\": 1,\n  \"b\": [1,\n 2],\n}");
        match &chunk.body[0].kind {
            StatementKind::Assignment { value, .. } => match &value.kind {
                ExpressionKind::Map(entries) => assert_eq!(entries.len(), 2),
                other => panic!("expected map, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_spans_cover_statement() {
        let chunk = parse_ok("\n  value = foo.bar");
        assert_eq!(
            chunk.body[0].span,
            Span::new(Position::new(1, 2), Position::new(1, 17))
        );
    }

    // ── Error recovery ────────────────────────────────────────────────

    #[test]
    fn test_recovers_after_bad_line() {
        let result = parse("x = = 2\ny = 3");
        assert!(!result.errors.is_empty());
        assert!(result.errors.iter().all(|e| e.kind == SyntaxErrorKind::Parser));
        assert!(result.chunk.body.iter().any(|s| matches!(
            &s.kind,
            StatementKind::Assignment { target, .. }
                if target.kind == ExpressionKind::Identifier("y".into())
        )));
    }

    #[test]
    fn test_unterminated_block_reports_error() {
        let result = parse("while true\n  x = 1\n");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("end while"));
        assert_eq!(result.chunk.body.len(), 1);
    }

    #[test]
    fn test_stray_end_reports_error() {
        let result = parse("end if\nx = 1");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.chunk.body.len(), 1);
    }

    #[test]
    fn test_dangling_member_access_keeps_member_node() {
        let result = parse("x = player.");
        assert_eq!(result.errors.len(), 1);
        match &result.chunk.body[0].kind {
            StatementKind::Assignment { value, .. } => match &value.kind {
                ExpressionKind::Member { name, .. } => assert!(name.name.is_empty()),
                other => panic!("expected member, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_garbage_never_panics() {
        for source in ["(((", "]]]", "function(", "if then else end", "{:}", "a[", "#import", "x = @"] {
            let _ = parse(source);
        }
    }

    #[test]
    fn test_deep_parentheses_are_cut_off() {
        let source = format!("x = {}1\ny = 2", "(".repeat(5000));
        let result = parse(&source);
        assert!(result
            .errors
            .iter()
            .any(|e| e.message == "code is nested too deeply"));
        // The next line still parses
        assert!(matches!(
            &result.chunk.body.last().map(|s| &s.kind),
            Some(StatementKind::Assignment { .. })
        ));
        assert_eq!(result.chunk.body.len(), 2);
    }

    #[test]
    fn test_deep_unary_and_power_chains_are_cut_off() {
        for source in [
            format!("x = {}1", "not ".repeat(5000)),
            format!("x = {}1", "- ".repeat(5000)),
            format!("x = 2{}", " ^ 2".repeat(5000)),
            format!("x = {}", "[".repeat(5000)),
        ] {
            let result = parse(&source);
            assert!(!result.errors.is_empty());
        }
    }

    #[test]
    fn test_deep_blocks_are_cut_off() {
        let source = format!("{}{}", "if x then\n".repeat(3000), "end if\n".repeat(3000));
        let result = parse(&source);
        assert!(result
            .errors
            .iter()
            .any(|e| e.message == "code is nested too deeply"));
    }
}
