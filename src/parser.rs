use crate::{
    ast::{
        BinaryOperator, Branch, Case, Class, Decl, Expr, ExprKind, Function, Import, Program,
        Stmt, StmtKind, UnaryOperator,
    },
    token::{Position, Spanned, Token, TokenKind},
};

type Result<T, E = ()> = std::result::Result<T, E>;

/// On failure, the partially parsed tree is returned along with every
/// recorded error.
pub type ParseResult<T> = Result<T, (T, Vec<Spanned<Error>>)>;

/// Parses a whole program.
///
/// Errors don't stop the parser: after each failed statement or declaration,
/// it skips to the next statement boundary and resumes, so a single call may
/// report several errors.
pub fn parse(tokens: &[Token<'_>]) -> ParseResult<Program> {
    let (program, errors) = run(tokens, Parser::parse_program);
    let program = program.unwrap_or_default();
    if errors.is_empty() {
        Ok(program)
    } else {
        Err((program, errors))
    }
}

/// Parses a single expression, which must span the whole input.
pub fn parse_expr(tokens: &[Token<'_>]) -> Result<Expr, Vec<Spanned<Error>>> {
    let (expr, errors) = run(tokens, |p| {
        let expr = p.parse_expr()?;
        while p.take(TokenKind::Newline) {}
        p.consume(TokenKind::Eof, "after expression")?;
        Ok(expr)
    });
    match expr {
        Some(expr) if errors.is_empty() => Ok(expr),
        _ => Err(errors),
    }
}

fn run<'tok, 'src, T>(
    tokens: &'tok [Token<'src>],
    f: impl FnOnce(&mut Parser<'tok, 'src>) -> Result<T>,
) -> (Option<T>, Vec<Spanned<Error>>) {
    let mut p = Parser::new(tokens);
    let parsed = f(&mut p).ok();
    (parsed, p.errors)
}

struct Parser<'tok, 'src> {
    tokens: &'tok [Token<'src>],
    cursor: usize,
    errors: Vec<Spanned<Error>>,
}

impl<'src> Parser<'_, 'src> {
    fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        loop {
            // Stray structural tokens at file scope carry no meaning.
            while matches!(
                self.peek().kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
            ) {
                self.advance();
            }
            if self.is(TokenKind::Eof) {
                break;
            }
            if self.at_declaration() {
                if let Ok(decl) = self.synchronize(Parser::parse_declaration) {
                    program.declarations.push(decl);
                }
            } else if let Ok(stmt) = self.synchronize(Parser::parse_statement) {
                program.statements.push(stmt);
            }
        }
        Ok(program)
    }

    fn at_declaration(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Def | TokenKind::Async | TokenKind::Class | TokenKind::Import
        )
    }

    fn parse_declaration(&mut self) -> Result<Decl> {
        match self.peek().kind {
            TokenKind::Def | TokenKind::Async => self.parse_function().map(Decl::Function),
            TokenKind::Class => self.parse_class().map(Decl::Class),
            TokenKind::Import => self.parse_import().map(Decl::Import),
            actual => {
                let pos = self.peek().pos();
                self.error(pos.wrap(Error::ExpectedDeclaration { actual }));
                Err(())
            }
        }
    }

    fn parse_function(&mut self) -> Result<Function> {
        let pos = self.peek().pos();
        let is_async = self.take(TokenKind::Async);
        self.consume(TokenKind::Def, "to start a function")?;
        let name = self.parse_ident("after 'def'")?;
        self.consume(TokenKind::LParen, "after function name")?;
        let params = self.parse_list(TokenKind::RParen, |p| p.parse_ident("as parameter"))?;
        self.consume(TokenKind::RParen, "after parameters")?;
        self.consume(TokenKind::Colon, "after function signature")?;
        let body = self.parse_block()?;
        Ok(Function {
            name,
            params,
            body,
            is_async,
            pos,
        })
    }

    fn parse_class(&mut self) -> Result<Class> {
        let pos = self.consume(TokenKind::Class, "to start a class")?.pos();
        let name = self.parse_ident("after 'class'")?;
        let base = if self.take(TokenKind::LParen) {
            let base = self.parse_ident("as base class")?;
            self.consume(TokenKind::RParen, "after base class")?;
            Some(base)
        } else {
            None
        };
        self.consume(TokenKind::Colon, "after class name")?;
        let members = self.parse_suite(Parser::parse_declaration)?;
        Ok(Class {
            name,
            base,
            members,
            pos,
        })
    }

    fn parse_import(&mut self) -> Result<Import> {
        let pos = self.consume(TokenKind::Import, "to start an import")?.pos();
        let module = self.parse_ident("after 'import'")?;
        let alias = if self.take(TokenKind::As) {
            Some(self.parse_ident("after 'as'")?)
        } else {
            None
        };
        self.end_of_statement()?;
        Ok(Import { module, alias, pos })
    }

    /// Parses the body of a compound statement or declaration. The caller
    /// must have consumed the colon.
    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.parse_suite(Parser::parse_statement)
    }

    /// Parses either an indented sequence of items or a single item on the
    /// same line as the colon.
    fn parse_suite<T>(&mut self, item: fn(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        match self.peek().kind {
            TokenKind::Newline | TokenKind::Indent | TokenKind::Eof => self.parse_indented(item),
            _ => Ok(vec![item(self)?]),
        }
    }

    /// Parses `INDENT item+ DEDENT`. Newlines between items (and before the
    /// indent, left by comment-only lines) are skipped.
    fn parse_indented<T>(&mut self, item: fn(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        while self.take(TokenKind::Newline) {}
        let c = self.peek();
        if !self.take(TokenKind::Indent) {
            self.error(c.pos().wrap(Error::ExpectedIndentedBlock { actual: c.kind }));
            return Err(());
        }

        let mut items = Vec::new();
        loop {
            while self.take(TokenKind::Newline) {}
            if self.is(TokenKind::Dedent) || self.is(TokenKind::Eof) {
                break;
            }
            if let Ok(parsed) = self.synchronize(item) {
                items.push(parsed);
            }
        }
        self.take(TokenKind::Dedent);
        Ok(items)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        match self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Match => self.parse_match(),
            _ => self.parse_simple_statement(),
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt> {
        let start = self.peek();
        let kind = match start.kind {
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                StmtKind::Return(value)
            }
            // One token of lookahead tells an assignment apart from an
            // expression statement that starts with an identifier.
            TokenKind::Identifier if self.lookahead_is(TokenKind::Assign) => {
                let name = self.parse_ident("as assignment target")?;
                self.consume(TokenKind::Assign, "after assignment target")?;
                let value = self.parse_expr()?;
                StmtKind::Assignment { name, value }
            }
            _ => StmtKind::Expression(self.parse_expr()?),
        };
        self.end_of_statement()?;
        Ok(Stmt {
            kind,
            pos: start.pos(),
        })
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let pos = self.consume(TokenKind::If, "to start a conditional")?.pos();
        let mut branches = vec![self.parse_branch()?];
        let mut else_body = Vec::new();
        while self.continues_with(&[TokenKind::Elif, TokenKind::Else]) {
            if self.take(TokenKind::Elif) {
                branches.push(self.parse_branch()?);
            } else {
                self.consume(TokenKind::Else, "to start an else branch")?;
                self.consume(TokenKind::Colon, "after 'else'")?;
                else_body = self.parse_block()?;
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If {
                branches,
                else_body,
            },
            pos,
        })
    }

    fn parse_branch(&mut self) -> Result<Branch> {
        let cond = self.parse_expr()?;
        self.consume(TokenKind::Colon, "after condition")?;
        let body = self.parse_block()?;
        Ok(Branch { cond, body })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let pos = self.consume(TokenKind::While, "to start a loop")?.pos();
        let cond = self.parse_expr()?;
        self.consume(TokenKind::Colon, "after loop condition")?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::While { cond, body },
            pos,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        let pos = self.consume(TokenKind::For, "to start a loop")?.pos();
        let var = self.parse_ident("after 'for'")?;
        self.consume(TokenKind::In, "after loop variable")?;
        let iterable = self.parse_expr()?;
        self.consume(TokenKind::Colon, "after loop iterable")?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::For {
                var,
                iterable,
                body,
            },
            pos,
        })
    }

    fn parse_match(&mut self) -> Result<Stmt> {
        let pos = self.consume(TokenKind::Match, "to start a match")?.pos();
        let value = self.parse_expr()?;
        self.consume(TokenKind::Colon, "after match subject")?;
        let cases = self.parse_indented(Parser::parse_case)?;
        Ok(Stmt {
            kind: StmtKind::Match { value, cases },
            pos,
        })
    }

    fn parse_case(&mut self) -> Result<Case> {
        let pattern = self.parse_expr()?;
        self.consume(TokenKind::Colon, "after case pattern")?;
        let body = self.parse_block()?;
        Ok(Case { pattern, body })
    }

    fn parse_ident(&mut self, context: &'static str) -> Result<Box<str>> {
        let token = self.consume(TokenKind::Identifier, context)?;
        Ok(token.lexeme.into())
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        self.parse_binary_level(&[(TokenKind::Or, BinaryOperator::Or)], Parser::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[(TokenKind::And, BinaryOperator::And)],
            Parser::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::EqEq, BinaryOperator::Eq),
                (TokenKind::NotEq, BinaryOperator::NotEq),
            ],
            Parser::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Less, BinaryOperator::Less),
                (TokenKind::LessEq, BinaryOperator::LessEq),
                (TokenKind::Greater, BinaryOperator::Greater),
                (TokenKind::GreaterEq, BinaryOperator::GreaterEq),
            ],
            Parser::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Plus, BinaryOperator::Add),
                (TokenKind::Minus, BinaryOperator::Sub),
            ],
            Parser::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinaryOperator::Mul),
                (TokenKind::Slash, BinaryOperator::Div),
                (TokenKind::SlashSlash, BinaryOperator::FloorDiv),
                (TokenKind::Percent, BinaryOperator::Mod),
            ],
            Parser::parse_power,
        )
    }

    /// `**` is right-associative: the right operand recurses into this same
    /// level instead of the next one.
    fn parse_power(&mut self) -> Result<Expr> {
        let left = self.parse_unary()?;
        if self.take(TokenKind::StarStar) {
            let right = self.parse_power()?;
            return Ok(binary(BinaryOperator::Pow, left, right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let token = self.peek();
        let op = match token.kind {
            TokenKind::Minus => UnaryOperator::Neg,
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Not => UnaryOperator::Not,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let unary = ExprKind::Unary {
            op,
            operand: Box::new(operand),
        };
        Ok(Expr::new(unary, token.pos()))
    }

    /// Parses calls, attribute accesses and subscripts, left to right.
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let pos = expr.pos;
            let kind = if self.take(TokenKind::LParen) {
                let args = self.parse_list(TokenKind::RParen, Parser::parse_expr)?;
                self.consume(TokenKind::RParen, "after arguments")?;
                ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                }
            } else if self.take(TokenKind::Dot) {
                let name = self.parse_ident("after '.'")?;
                ExprKind::Attribute {
                    object: Box::new(expr),
                    name,
                }
            } else if self.take(TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.consume(TokenKind::RBracket, "after subscript")?;
                ExprKind::Subscript {
                    object: Box::new(expr),
                    index: Box::new(index),
                }
            } else {
                break;
            };
            expr = Expr::new(kind, pos);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.peek();
        let kind = match token.kind {
            TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::Boolean
            | TokenKind::None => {
                self.advance();
                ExprKind::Literal(token.literal.into())
            }
            TokenKind::Identifier => {
                self.advance();
                ExprKind::Identifier(token.lexeme.into())
            }

            // Grouping or tuple: ( expr ) | ( [expr (, expr)* [,]] )
            TokenKind::LParen => {
                self.advance();
                return self.parse_paren(token.pos());
            }

            // List: [ [expr (, expr)*] ]
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_list(TokenKind::RBracket, Parser::parse_expr)?;
                self.consume(TokenKind::RBracket, "after list elements")?;
                ExprKind::List(elements)
            }

            // Dict: { [expr : expr (, expr : expr)*] }
            TokenKind::LBrace => {
                self.advance();
                let pairs = self.parse_list(TokenKind::RBrace, |p| {
                    let key = p.parse_expr()?;
                    p.consume(TokenKind::Colon, "after dictionary key")?;
                    let value = p.parse_expr()?;
                    Ok((key, value))
                })?;
                self.consume(TokenKind::RBrace, "after dictionary entries")?;
                ExprKind::Dict(pairs)
            }

            actual => {
                self.error(token.pos().wrap(Error::ExpectedExpression { actual }));
                return Err(());
            }
        };
        Ok(Expr::new(kind, token.pos()))
    }

    /// Parses what follows an opening parenthesis. A comma (or nothing at all)
    /// between the parentheses makes a tuple; otherwise the parentheses only
    /// group.
    fn parse_paren(&mut self, pos: Position) -> Result<Expr> {
        if self.take(TokenKind::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), pos));
        }
        let first = self.parse_expr()?;
        if self.take(TokenKind::RParen) {
            return Ok(first);
        }
        if !self.is(TokenKind::Comma) {
            self.consume(TokenKind::RParen, "after expression")?;
        }

        let mut elements = vec![first];
        while self.take(TokenKind::Comma) {
            if self.is(TokenKind::RParen) {
                break;
            }
            elements.push(self.parse_expr()?);
        }
        self.consume(TokenKind::RParen, "after tuple elements")?;
        Ok(Expr::new(ExprKind::Tuple(elements), pos))
    }

    /// Parses `item (, item)* [,]` until `end_delim` is found. Does **NOT**
    /// consume the end delimiter.
    fn parse_list<T>(
        &mut self,
        end_delim: TokenKind,
        mut parse_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while self.except([end_delim]) {
            items.push(parse_item(self)?);

            // After consuming an item, we must consume the separator, unless
            // the list ends here.
            if !self.take(TokenKind::Comma) {
                if self.is(end_delim) {
                    break;
                }
                let c = self.peek();
                self.error(c.pos().wrap(Error::UnexpectedAny {
                    actual: c.kind,
                    expected: Box::from([TokenKind::Comma, end_delim]),
                }));
                return Err(());
            }
        }
        Ok(items)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        )
    }

    /// Checks that a simple statement ends here. The terminator itself is left
    /// for the enclosing block.
    fn end_of_statement(&mut self) -> Result<()> {
        if self.at_statement_end() {
            return Ok(());
        }
        let c = self.peek();
        self.error(c.pos().wrap(Error::Unexpected {
            actual: c.kind,
            expected: TokenKind::Newline,
            context: "after statement",
        }));
        Err(())
    }
}

impl<'tok, 'src> Parser<'tok, 'src> {
    fn new(tokens: &'tok [Token<'src>]) -> Parser<'tok, 'src> {
        let mut p = Parser {
            tokens,
            cursor: 0,
            errors: Vec::with_capacity(8),
        };
        p.setup();
        p
    }

    /// Records an error.
    fn error(&mut self, error: Spanned<Error>) {
        self.errors.push(error);
    }

    /// Setups the parser, skipping any trivia if necessary.
    fn setup(&mut self) {
        while self.peek().kind.is_trivia() {
            self.cursor += 1;
        }
    }

    /// Returns the current token. Past the end of the buffer, this is always
    /// an end of input token.
    fn peek(&self) -> Token<'src> {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => {
                let pos = self.tokens.last().map_or(Position::START, Token::pos);
                Token::synthetic(TokenKind::Eof, pos)
            }
        }
    }

    /// Returns the current token and advances. Skips any trivia.
    fn advance(&mut self) -> Token<'src> {
        let c = self.peek(); // Before any advancement
        if c.is_eof() {
            return c;
        }
        while {
            self.cursor += 1;
            self.peek().kind.is_trivia()
        } {}
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one, returning it.
    /// If not, records an error.
    fn consume(&mut self, expect: TokenKind, context: &'static str) -> Result<Token<'src>> {
        let c = self.peek();
        if self.is(expect) {
            self.advance();
            Ok(c)
        } else {
            self.error(c.pos().wrap(Error::Unexpected {
                actual: c.kind,
                expected: expect,
                context,
            }));
            Err(())
        }
    }

    /// Returns true while the current token does *not* match one of the
    /// provided ones. [`TokenKind::Eof`] is implicitly included in the list.
    ///
    /// This won't advance the cursor.
    fn except(&self, except: impl IntoIterator<Item = TokenKind>) -> bool {
        let c = self.peek();
        for e in except {
            if c.kind == e {
                return false;
            }
        }
        c.kind != TokenKind::Eof
    }

    /// Peeks at the token after the current one, then resets the cursor.
    fn lookahead_is(&mut self, expect: TokenKind) -> bool {
        let saved = self.cursor;
        self.advance();
        let is = self.is(expect);
        self.cursor = saved;
        is
    }

    /// Skips newlines if (and only if) the next token after them is one of
    /// the provided ones. Lets a branch keyword follow a single-line body.
    fn continues_with(&mut self, kinds: &[TokenKind]) -> bool {
        let saved = self.cursor;
        while self.take(TokenKind::Newline) {}
        if kinds.contains(&self.peek().kind) {
            true
        } else {
            self.cursor = saved;
            false
        }
    }

    /// Runs `f`. In the case of an error, skips tokens until the end of the
    /// current statement, so that the caller can resume with the next one.
    fn synchronize<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.cursor;
        let result = f(self);
        if result.is_ok() {
            return result;
        }
        loop {
            let c = self.peek().kind;
            match c {
                // The enclosing block (or the program) ends here.
                TokenKind::Eof | TokenKind::Dedent => break,
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                // The body of the failed statement is discarded along with it.
                TokenKind::Indent => {
                    self.skip_indented();
                    break;
                }
                c if c.starts_statement() && self.cursor != start => break,
                _ => {
                    self.advance();
                }
            }
        }
        result
    }

    /// Skips a whole indented block, including its nested blocks.
    fn skip_indented(&mut self) {
        let mut depth = 0_usize;
        loop {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Eof => break,
                _ => (),
            }
        }
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    let pos = left.pos;
    let kind = ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    };
    Expr::new(kind, pos)
}

impl Parser<'_, '_> {
    /// Parses one left-associative precedence level: `next (op next)*`.
    fn parse_binary_level(
        &mut self,
        operators: &[(TokenKind, BinaryOperator)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        loop {
            let kind = self.peek().kind;
            let Some(&(_, op)) = operators.iter().find(|(k, _)| *k == kind) else {
                break;
            };
            self.advance(); // Operator
            let right = next(self)?;
            left = binary(op, left, right);
        }
        Ok(left)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected {expected} {context}, but got {actual}")]
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
        context: &'static str,
    },
    #[error("expected one of {}, but got {actual}", one_of(.expected))]
    UnexpectedAny {
        actual: TokenKind,
        expected: Box<[TokenKind]>,
    },
    #[error("expected expression, but got {actual}")]
    ExpectedExpression { actual: TokenKind },
    #[error("expected an indented block, but got {actual}")]
    ExpectedIndentedBlock { actual: TokenKind },
    #[error("expected a declaration, but got {actual}")]
    ExpectedDeclaration { actual: TokenKind },
}

fn one_of(kinds: &[TokenKind]) -> String {
    let kinds: Vec<_> = kinds.iter().map(ToString::to_string).collect();
    kinds.join(", ")
}
