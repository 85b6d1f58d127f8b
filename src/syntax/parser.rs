//! Tokens to a syntax tree.

use super::ast::{Arg, BinOp, BoolOp, CmpOp, Expr, FunctionDef, Literal, Stmt, StmtKind, UnaryOp};
use super::error::{ParseError, ParseErrorKind, ParseResult};
use super::lexer::tokenize;
use super::token::{Span, Token, TokenKind};

/// Recursive-descent parser for a single function definition.
///
/// Statement lines are recorded relative to the `def` line, which is line 1.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    def_line: usize,
    last_line: usize,
}

impl Parser {
    /// Creates a parser over a token stream from [`tokenize`].
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            def_line: 1,
            last_line: 1,
        }
    }

    /// Parses decorators (ignored) followed by one `def`.
    pub fn parse_function(&mut self) -> ParseResult<FunctionDef> {
        self.skip_newlines();
        while self.check(&TokenKind::At) {
            // Decorators are evaluated by the host, not translated.
            while !matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
                self.advance();
            }
            self.skip_newlines();
        }

        if !self.check(&TokenKind::Def) {
            let span = self.peek().span;
            return Err(match self.peek_kind() {
                TokenKind::Eof => ParseError::new(ParseErrorKind::MissingFunction, span),
                _ => self.unexpected("`def`"),
            });
        }
        self.def_line = self.peek().span.line;
        self.advance();

        let name = self.expect_name("function name")?;
        self.expect(TokenKind::LParen, "`(`")?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen, "`)`")?;
        self.expect(TokenKind::Colon, "`:`")?;
        let body = self.parse_suite()?;
        let end_line = self.relative(self.last_line);

        self.skip_newlines();
        if !self.check(&TokenKind::Eof) {
            return Err(ParseError::new(
                ParseErrorKind::Unsupported("code after the function definition".to_string()),
                self.peek().span,
            ));
        }

        Ok(FunctionDef {
            name,
            params,
            body,
            end_line,
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<String>> {
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            match self.peek_kind() {
                TokenKind::Star | TokenKind::DoubleStar => {
                    return Err(self.unsupported("variadic parameters"));
                }
                _ => {}
            }
            params.push(self.expect_name("parameter name")?);
            if self.check(&TokenKind::Assign) {
                return Err(self.unsupported("default parameter values"));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    /// Parses the block after a `:`, either indented or on the same line.
    fn parse_suite(&mut self) -> ParseResult<Vec<Stmt>> {
        if !self.eat(&TokenKind::Newline) {
            return Ok(vec![self.parse_simple_statement()?]);
        }
        self.expect(TokenKind::Indent, "an indented block")?;

        let mut body = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::Dedent | TokenKind::Eof) {
            body.push(self.parse_statement()?);
            self.skip_newlines();
        }
        self.eat(&TokenKind::Dedent);
        Ok(body)
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.peek_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Def => Err(self.unsupported("nested function definition")),
            TokenKind::At => Err(self.unsupported("nested decorator")),
            TokenKind::Reserved(keyword) => {
                let keyword = *keyword;
                Err(self.unsupported(&format!("`{}` statement", keyword)))
            }
            _ => self.parse_simple_statement(),
        }
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let line = self.current_line();
        self.advance();
        let test = self.parse_test()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let body = self.parse_suite()?;

        let orelse = match self.peek_kind() {
            TokenKind::Elif => vec![self.parse_if()?],
            TokenKind::Else => {
                self.advance();
                self.expect(TokenKind::Colon, "`:`")?;
                self.parse_suite()?
            }
            _ => Vec::new(),
        };

        Ok(Stmt {
            line,
            kind: StmtKind::If { test, body, orelse },
        })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let line = self.current_line();
        self.advance();
        let target = self.parse_target_list()?;
        self.expect(TokenKind::In, "`in`")?;
        let iter = self.parse_testlist()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let body = self.parse_suite()?;
        if self.check(&TokenKind::Else) {
            return Err(self.unsupported("`for ... else`"));
        }
        Ok(Stmt {
            line,
            kind: StmtKind::For { target, iter, body },
        })
    }

    /// Loop targets stop before `in`, so they are parsed below comparisons.
    fn parse_target_list(&mut self) -> ParseResult<Expr> {
        let first = self.parse_arith()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_arith()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.current_line();
        let kind = match self.peek_kind() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_testlist()?))
                }
            }
            TokenKind::Name(name) if name == "print" && !self.next_continues_expression() => {
                self.advance();
                let mut values = Vec::new();
                while !self.at_statement_end() {
                    values.push(self.parse_test()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                StmtKind::Print(values)
            }
            _ => self.parse_expression_statement()?,
        };

        if !self.at_statement_end() {
            return Err(self.unexpected("end of statement"));
        }
        self.eat(&TokenKind::Newline);
        Ok(Stmt { line, kind })
    }

    /// True if the token after `print` continues an expression rather than
    /// starting a Python 2 print statement.
    fn next_continues_expression(&self) -> bool {
        matches!(
            self.peek_at(1).map(|t| &t.kind),
            Some(
                TokenKind::LParen
                    | TokenKind::Assign
                    | TokenKind::Dot
                    | TokenKind::LBracket
                    | TokenKind::PlusAssign
                    | TokenKind::MinusAssign
            )
        )
    }

    fn parse_expression_statement(&mut self) -> ParseResult<StmtKind> {
        let first = self.parse_testlist()?;

        let aug = match self.peek_kind() {
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mult),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::PercentAssign => Some(BinOp::Mod),
            _ => None,
        };
        if let Some(op) = aug {
            let span = self.peek().span;
            self.advance();
            if !matches!(first, Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }) {
                return Err(ParseError::new(ParseErrorKind::InvalidAssignmentTarget, span));
            }
            let value = self.parse_testlist()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.check(&TokenKind::Assign) {
            // Python 3 print call
            if let Expr::Call { func, args } = &first {
                if **func == Expr::name("print") {
                    return self.print_from_call(args);
                }
            }
            return Ok(StmtKind::Expr(first));
        }

        let mut targets = Vec::new();
        let mut value = first;
        while self.check(&TokenKind::Assign) {
            let span = self.peek().span;
            self.advance();
            if !is_assignable(&value) {
                return Err(ParseError::new(ParseErrorKind::InvalidAssignmentTarget, span));
            }
            targets.push(value);
            value = self.parse_testlist()?;
        }

        Ok(StmtKind::Assign { targets, value })
    }

    fn print_from_call(&self, args: &[Arg]) -> ParseResult<StmtKind> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Positional(value) => values.push(value.clone()),
                _ => return Err(self.unsupported("print with keyword or starred arguments")),
            }
        }
        Ok(StmtKind::Print(values))
    }

    fn parse_testlist(&mut self) -> ParseResult<Expr> {
        let first = self.parse_test()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_testlist_end() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn parse_test(&mut self) -> ParseResult<Expr> {
        if let TokenKind::Reserved("lambda") = self.peek_kind() {
            return Err(self.unsupported("lambda expression"));
        }
        let expr = self.parse_or()?;
        if self.check(&TokenKind::If) {
            return Err(self.unsupported("conditional expression"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let first = self.parse_and()?;
        if !self.check(&TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let first = self.parse_not()?;
        if !self.check(&TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();

        while let Some(op) = self.comparison_operator() {
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }

        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    /// Consumes a comparison operator, including `not in` and `is not`.
    fn comparison_operator(&mut self) -> Option<CmpOp> {
        let op = match self.peek_kind() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Less => CmpOp::Lt,
            TokenKind::LessEq => CmpOp::LtE,
            TokenKind::Greater => CmpOp::Gt,
            TokenKind::GreaterEq => CmpOp::GtE,
            TokenKind::In => CmpOp::In,
            TokenKind::Is => {
                self.advance();
                return Some(if self.eat(&TokenKind::Not) {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                });
            }
            TokenKind::Not if self.peek_at(1).map(|t| &t.kind) == Some(&TokenKind::In) => {
                self.advance();
                self.advance();
                return Some(CmpOp::NotIn);
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = binop(left, op, right);
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mult,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_factor()?;
            left = binop(left, op, right);
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::USub,
            TokenKind::Plus => UnaryOp::UAdd,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exponent = self.parse_factor()?;
            return Ok(binop(base, BinOp::Pow, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    self.expect(TokenKind::RParen, "`)`")?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    self.expect(TokenKind::RBracket, "`]`")?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name("attribute name")?;
                    expr = Expr::attribute(expr, attr);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Arg>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let arg = match self.peek_kind() {
                TokenKind::Star => {
                    self.advance();
                    Arg::Star(self.parse_test()?)
                }
                TokenKind::DoubleStar => {
                    self.advance();
                    Arg::DoubleStar(self.parse_test()?)
                }
                TokenKind::Name(name)
                    if self.peek_at(1).map(|t| &t.kind) == Some(&TokenKind::Assign) =>
                {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    Arg::Keyword(name, self.parse_test()?)
                }
                _ => Arg::Positional(self.parse_test()?),
            };
            if self.check(&TokenKind::For) {
                return Err(self.unsupported("generator expression"));
            }
            args.push(arg);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_subscript(&mut self) -> ParseResult<Expr> {
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let index = self.parse_testlist()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(index);
            }
            Some(Box::new(index))
        };

        self.expect(TokenKind::Colon, "`:`")?;
        let upper = if matches!(self.peek_kind(), TokenKind::Colon | TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat(&TokenKind::Colon) && !self.check(&TokenKind::RBracket) {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let kind = self.peek_kind().clone();
        match kind {
            TokenKind::Name(name) => {
                self.advance();
                Ok(Expr::Name(name))
            }
            TokenKind::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(i)))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(x)))
            }
            TokenKind::Str(mut s) => {
                self.advance();
                // Adjacent literals concatenate
                while let TokenKind::Str(next) = self.peek_kind() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Literal::Str(s)))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr::Literal(Literal::None))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            TokenKind::LParen => self.parse_paren(),
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_dict(),
            TokenKind::Reserved("lambda") => Err(self.unsupported("lambda expression")),
            TokenKind::Reserved(keyword) => Err(self.unsupported(&format!("`{}` expression", keyword))),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_paren(&mut self) -> ParseResult<Expr> {
        self.advance();
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }

        let first = self.parse_test()?;
        if self.check(&TokenKind::For) {
            return Err(self.unsupported("generator expression"));
        }
        if self.eat(&TokenKind::RParen) {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(Expr::Tuple(items))
    }

    fn parse_list(&mut self) -> ParseResult<Expr> {
        self.advance();
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_test()?);
            if self.check(&TokenKind::For) {
                return Err(self.unsupported("list comprehension"));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "`]`")?;
        Ok(Expr::List(items))
    }

    fn parse_dict(&mut self) -> ParseResult<Expr> {
        self.advance();
        let mut pairs = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.parse_test()?;
            if !self.check(&TokenKind::Colon) {
                return Err(self.unsupported("set literal"));
            }
            self.advance();
            let value = self.parse_test()?;
            if self.check(&TokenKind::For) {
                return Err(self.unsupported("dict comprehension"));
            }
            pairs.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Expr::Dict(pairs))
    }

    // Token helpers

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            let line = self.tokens[self.pos].span.line;
            if !matches!(self.tokens[self.pos].kind, TokenKind::Dedent | TokenKind::Eof) {
                self.last_line = self.last_line.max(line);
            }
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> ParseResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_name(&mut self, expected: &'static str) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent
        )
    }

    fn at_testlist_end(&self) -> bool {
        self.at_statement_end()
            || matches!(
                self.peek_kind(),
                TokenKind::Assign
                    | TokenKind::Colon
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::PlusAssign
                    | TokenKind::MinusAssign
                    | TokenKind::StarAssign
                    | TokenKind::SlashAssign
                    | TokenKind::PercentAssign
            )
    }

    fn current_line(&self) -> usize {
        self.relative(self.peek().span.line)
    }

    fn relative(&self, line: usize) -> usize {
        line.saturating_sub(self.def_line) + 1
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        let token = self.peek();
        ParseError::new(
            ParseErrorKind::UnexpectedToken {
                found: token.kind.clone(),
                expected,
            },
            token.span,
        )
    }

    fn unsupported(&self, construct: &str) -> ParseError {
        ParseError::new(
            ParseErrorKind::Unsupported(construct.to_string()),
            self.peek().span,
        )
    }
}

fn binop(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::BinOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => true,
        Expr::Tuple(items) | Expr::List(items) => items.iter().all(is_assignable),
        _ => false,
    }
}

/// Removes the indentation shared by all non-blank lines, so that methods
/// copied out of a class body parse as top-level functions.
fn dedent(source: &str) -> String {
    let common = source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        if line.trim().is_empty() {
            out.push('\n');
            continue;
        }
        out.push_str(&line[common..]);
        out.push('\n');
    }
    out
}

/// Parses the source text of one function definition.
pub fn parse_function(source: &str) -> ParseResult<FunctionDef> {
    let text = dedent(source);
    let tokens = tokenize(&text)?;
    if tokens.is_empty() {
        return Err(ParseError::new(ParseErrorKind::MissingFunction, Span::default()));
    }
    Parser::new(tokens).parse_function()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(source: &str) -> Vec<Stmt> {
        parse_function(source).unwrap().body
    }

    #[test]
    fn test_parse_simple_function() {
        let def = parse_function(
            "def add_link(client, url):\n    link_id = client.incr('counter')\n    return link_id\n",
        )
        .unwrap();
        assert_eq!(def.name, "add_link");
        assert_eq!(def.params, vec!["client", "url"]);
        assert_eq!(def.body.len(), 2);
        assert_eq!(def.body[0].line, 2);
        assert_eq!(def.body[1].line, 3);
        assert_eq!(def.end_line, 3);
        assert!(matches!(def.body[1].kind, StmtKind::Return(Some(Expr::Name(_)))));
    }

    #[test]
    fn test_indented_method_with_decorator() {
        let source = "
            @remote
            def get(self, client):
                return self.shard('10')
        ";
        let def = parse_function(source).unwrap();
        assert!(def.is_method());
        assert_eq!(def.body[0].line, 2);
    }

    #[test]
    fn test_chained_assignment() {
        let stmts = body("def f():\n    a = b = '1'\n");
        let StmtKind::Assign { targets, value } = &stmts[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(targets, &vec![Expr::name("a"), Expr::name("b")]);
        assert_eq!(value, &Expr::Literal(Literal::Str("1".into())));
    }

    #[test]
    fn test_elif_nests_in_orelse() {
        let stmts = body("def f(x):\n    if x:\n        pass\n    elif y:\n        pass\n    else:\n        pass\n");
        let StmtKind::If { orelse, .. } = &stmts[0].kind else {
            panic!("expected if");
        };
        assert_eq!(orelse.len(), 1);
        assert_eq!(orelse[0].line, 4);
        assert!(matches!(&orelse[0].kind, StmtKind::If { orelse, .. } if orelse.len() == 1));
    }

    #[test]
    fn test_precedence() {
        let stmts = body("def f():\n    return 1 + 2 * 3 ** 2\n");
        let StmtKind::Return(Some(Expr::BinOp { op, right, .. })) = &stmts[0].kind else {
            panic!("expected binop");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(**right, Expr::BinOp { op: BinOp::Mult, .. }));
    }

    #[test]
    fn test_comparison_operators() {
        let stmts = body("def f(a):\n    return a is not None and a not in b\n");
        let StmtKind::Return(Some(Expr::BoolOp { values, .. })) = &stmts[0].kind else {
            panic!("expected boolop");
        };
        assert!(matches!(&values[0], Expr::Compare { ops, .. } if ops == &vec![CmpOp::IsNot]));
        assert!(matches!(&values[1], Expr::Compare { ops, .. } if ops == &vec![CmpOp::NotIn]));
    }

    #[test]
    fn test_print_forms() {
        let stmts = body("def f(x):\n    print(x)\n    print x, 1\n");
        assert_eq!(stmts[0].kind, StmtKind::Print(vec![Expr::name("x")]));
        assert!(matches!(&stmts[1].kind, StmtKind::Print(v) if v.len() == 2));
    }

    #[test]
    fn test_for_and_augassign() {
        let stmts = body("def f(items):\n    total = 0\n    for i in range(10):\n        total += i\n    return total\n");
        let StmtKind::For { target, body, .. } = &stmts[1].kind else {
            panic!("expected for");
        };
        assert_eq!(target, &Expr::name("i"));
        assert!(matches!(body[0].kind, StmtKind::AugAssign { op: BinOp::Add, .. }));
    }

    #[test]
    fn test_call_argument_forms() {
        let stmts = body("def f(c, args):\n    c.get(*args)\n");
        let StmtKind::Expr(Expr::Call { args, .. }) = &stmts[0].kind else {
            panic!("expected call");
        };
        assert!(matches!(args[0], Arg::Star(_)));
    }

    #[test]
    fn test_dict_tuple_and_subscript() {
        let stmts = body("def f():\n    x = {'a': 1}['a']\n    y = (2, 3)\n    z = y[1:]\n");
        assert!(matches!(&stmts[0].kind, StmtKind::Assign { value: Expr::Subscript { .. }, .. }));
        assert!(matches!(&stmts[1].kind, StmtKind::Assign { value: Expr::Tuple(v), .. } if v.len() == 2));
        assert!(matches!(&stmts[2].kind, StmtKind::Assign { value: Expr::Subscript { index, .. }, .. } if matches!(**index, Expr::Slice { .. })));
    }

    #[test]
    fn test_unsupported_constructs() {
        for (source, construct) in [
            ("def f():\n    while True:\n        pass\n", "`while` statement"),
            ("def f():\n    return [x for x in y]\n", "list comprehension"),
            ("def f():\n    return a if b else c\n", "conditional expression"),
            ("def f():\n    def g():\n        pass\n", "nested function definition"),
            ("def f(x=1):\n    pass\n", "default parameter values"),
        ] {
            let err = parse_function(source).unwrap_err();
            assert_eq!(
                err.kind,
                ParseErrorKind::Unsupported(construct.to_string()),
                "source: {}",
                source
            );
        }
    }

    #[test]
    fn test_missing_function() {
        let err = parse_function("\n\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingFunction);
    }

    #[test]
    fn test_single_line_suite() {
        let stmts = body("def f(x):\n    if x: return 1\n    return 2\n");
        assert!(matches!(&stmts[0].kind, StmtKind::If { body, .. } if body.len() == 1));
        assert_eq!(stmts.len(), 2);
    }
}
