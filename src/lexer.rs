use std::{collections::VecDeque, iter::Peekable, str::Chars};

use thiserror::Error;

use crate::token::{Literal, Position, Token, TokenKind, KEYWORDS};

/// Number of spaces that make up one indentation level.
pub const INDENT_WIDTH: usize = 4;

/// Tokenizes the provided string, returning every token up to (and
/// including) the final [`TokenKind::Eof`].
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut tokens = Vec::with_capacity(src.len() / 2 + 8);
    tokenize_into(src, &mut tokens)?;
    Ok(tokens)
}

/// Tokenizes the provided string, producing the tokens into the provided
/// buffer. On error, the buffer holds the tokens scanned so far.
pub fn tokenize_into<'src>(src: &'src str, tokens: &mut Vec<Token<'src>>) -> Result<(), LexError> {
    assert_eq!(tokens.len(), 0, "must pass clean tokens buffer");
    let mut lexer = Lexer::new(src);
    loop {
        let token = lexer.next_token()?;
        let is_eof = token.is_eof();
        tokens.push(token);
        if is_eof {
            return Ok(());
        }
    }
}

/// The indentation-aware lexer.
///
/// Besides the tokens scanned from the text, the lexer synthesizes
/// [`TokenKind::Indent`], [`TokenKind::Dedent`] and [`TokenKind::Newline`]
/// tokens from line breaks, tracking the open indentation levels in a stack.
/// A single line break may close several levels at once; since
/// [`Lexer::next_token`] returns one token per call, the extra dedents are
/// buffered and drained on the following calls.
pub struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    line: u32,
    column: u32,
    current_pos: Position,
    /// Open indentation levels (in units of [`INDENT_WIDTH`]). Never empty.
    indent_stack: Vec<usize>,
    pending: VecDeque<Token<'src>>,
    /// Depth of open brackets, inside which line breaks are insignificant.
    nesting: u32,
    started: bool,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Constructs a new lexer with the default state.
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            line: 1,
            column: 1,
            current_pos: Position::START,
            indent_stack: vec![0],
            pending: VecDeque::new(),
            nesting: 0,
            started: false,
            finished: false,
        }
    }

    /// Returns the next token.
    ///
    /// Once the input is exhausted, every open indentation level is closed
    /// with a dedent, followed by [`TokenKind::Eof`]. Calling it again after
    /// that keeps producing [`TokenKind::Eof`].
    pub fn next_token(&mut self) -> Result<Token<'src>, LexError> {
        if let Some(token) = self.pending.pop_front() {
            return Ok(token);
        }
        if !self.started {
            self.started = true;
            if let Some(token) = self.indentation(None)? {
                return Ok(token);
            }
        }
        loop {
            self.skip_blanks();
            if let Some(token) = self.scan_token()? {
                return Ok(token);
            }
        }
    }

    /// Scans a token starting at the current character. Returns `None` if
    /// the scanned text produces no token (a line break inside brackets).
    fn scan_token(&mut self) -> Result<Option<Token<'src>>, LexError> {
        use TokenKind::*;
        let kind = match self.mark_advance() {
            '\0' if self.cursor == self.current_lo => return Ok(Some(self.end_of_input())),
            '\n' if self.nesting > 0 && !self.line_starts_statement() => {
                return Ok(Option::None);
            }
            '\n' => {
                // A statement keyword can't continue a bracketed expression, so
                // brackets left open on the previous lines are abandoned.
                self.nesting = 0;
                let newline = self.current_pos;
                return self.indentation(Some(newline));
            }
            '+' => Plus,
            '-' => Minus,
            '*' => match self.peek() {
                '*' => self.advance_with(StarStar),
                _ => Star,
            },
            '/' => match self.peek() {
                '/' => self.advance_with(SlashSlash),
                _ => Slash,
            },
            '%' => Percent,
            '=' => match self.peek() {
                '=' => self.advance_with(EqEq),
                _ => Assign,
            },
            '!' => match self.peek() {
                '=' => self.advance_with(NotEq),
                _ => return Err(self.unexpected('!')),
            },
            '<' => match self.peek() {
                '=' => self.advance_with(LessEq),
                _ => Less,
            },
            '>' => match self.peek() {
                '=' => self.advance_with(GreaterEq),
                _ => Greater,
            },
            '(' => self.open(LParen),
            ')' => self.close(RParen),
            '[' => self.open(LBracket),
            ']' => self.close(RBracket),
            '{' => self.open(LBrace),
            '}' => self.close(RBrace),
            ',' => Comma,
            '.' => Dot,
            ':' => Colon,
            '#' => self.comment(),
            quote @ ('"' | '\'') => return self.string(quote).map(Some),
            c if c.is_ascii_digit() => return self.number().map(Some),
            c if c.is_ascii_alphabetic() || c == '_' => {
                return Ok(Some(self.identifier_or_keyword()));
            }
            c => return Err(self.unexpected(c)),
        };
        Ok(Some(self.produce(kind)))
    }

    /// Measures the indentation of the line that starts at the cursor and
    /// emits the corresponding structural token.
    ///
    /// `newline` holds the position of the line break that ended the previous
    /// line; it is `None` for the first line of the input, which produces no
    /// [`TokenKind::Newline`].
    fn indentation(&mut self, newline: Option<Position>) -> Result<Option<Token<'src>>, LexError> {
        let mut spaces = 0;
        loop {
            match self.peek() {
                ' ' => {
                    self.advance();
                    spaces += 1;
                }
                '\t' => return Err(LexError::TabIndentation { pos: self.pos() }),
                _ => break,
            }
        }
        let newline_token = newline.map(|pos| Token::new(TokenKind::Newline, "\n", pos));

        // Blank and comment-only lines leave the indentation untouched.
        if matches!(self.peek(), '\n' | '\r' | '#') || self.is_at_end() {
            return Ok(newline_token);
        }

        let pos = self.pos();
        if spaces % INDENT_WIDTH != 0 {
            return Err(LexError::InvalidIndentation {
                width: spaces,
                pos: Position::new(pos.line, 1),
            });
        }
        let level = spaces / INDENT_WIDTH;

        let top = self.top_level();
        if level > top {
            self.indent_stack.push(level);
            return Ok(Some(Token::synthetic(TokenKind::Indent, pos)));
        }
        if level < top {
            while self.top_level() > level {
                self.indent_stack.pop();
                self.pending
                    .push_back(Token::synthetic(TokenKind::Dedent, pos));
            }
            if self.top_level() != level {
                return Err(LexError::InconsistentDedent { pos });
            }
            return Ok(self.pending.pop_front());
        }
        Ok(newline_token)
    }

    /// Closes every open indentation level and produces the end of input.
    fn end_of_input(&mut self) -> Token<'src> {
        let pos = self.current_pos;
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.pending
                .push_back(Token::synthetic(TokenKind::Dedent, pos));
        }
        self.pending
            .push_back(Token::synthetic(TokenKind::Eof, pos));
        self.pending
            .pop_front()
            .unwrap_or(Token::synthetic(TokenKind::Eof, pos))
    }

    /// Scans a string. The quotes are kept in the lexeme and stripped from the
    /// literal. Escape sequences pass through undecoded: a backslash only
    /// prevents the following character from closing the string.
    fn string(&mut self, quote: char) -> Result<Token<'src>, LexError> {
        loop {
            if self.is_at_end() {
                return Err(LexError::UnterminatedString {
                    pos: self.current_pos,
                });
            }
            match self.advance() {
                '\\' => {
                    self.advance();
                }
                c if c == quote => break,
                _ => (),
            }
        }
        let lexeme = self.substr();
        let contents = &lexeme[1..lexeme.len() - 1];
        Ok(self
            .produce(TokenKind::String)
            .with_literal(Literal::Str(contents)))
    }

    /// Scans an integer or a float. A number is a float only if its integer
    /// part is followed by a dot *and* another digit, so `1.x` is an integer
    /// followed by an attribute access.
    fn number(&mut self) -> Result<Token<'src>, LexError> {
        self.digits();
        if self.peek() == '.' && self.peek_nth(1).is_ascii_digit() {
            self.advance();
            self.digits();
            let value = self
                .substr()
                .parse()
                .map_err(|_| self.invalid_number())?;
            return Ok(self
                .produce(TokenKind::Float)
                .with_literal(Literal::Float(value)));
        }
        let value = self
            .substr()
            .parse()
            .map_err(|_| self.invalid_number())?;
        Ok(self
            .produce(TokenKind::Integer)
            .with_literal(Literal::Int(value)))
    }

    fn digits(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
    }

    fn identifier_or_keyword(&mut self) -> Token<'src> {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';

        while valid_identifier_suffix(self.peek()) {
            self.advance();
        }
        let substr = self.substr();
        match KEYWORDS.get(substr).copied() {
            Some(TokenKind::Boolean) => self
                .produce(TokenKind::Boolean)
                .with_literal(Literal::Bool(substr == "True")),
            Some(keyword) => self.produce(keyword),
            None => self.produce(TokenKind::Identifier),
        }
    }

    fn comment(&mut self) -> TokenKind {
        while !matches!(self.peek(), '\n') && !self.is_at_end() {
            self.advance();
        }
        TokenKind::Comment
    }

    /// Whether the line that starts at the cursor opens with a keyword that
    /// may only start a statement.
    fn line_starts_statement(&self) -> bool {
        let line = self.src[self.cursor..].trim_start_matches([' ', '\t']);
        let end = line
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(line.len());
        KEYWORDS
            .get(&line[..end])
            .copied()
            .is_some_and(TokenKind::starts_statement)
    }

    fn open(&mut self, kind: TokenKind) -> TokenKind {
        self.nesting += 1;
        kind
    }

    fn close(&mut self, kind: TokenKind) -> TokenKind {
        self.nesting = self.nesting.saturating_sub(1);
        kind
    }

    fn unexpected(&self, found: char) -> LexError {
        LexError::UnexpectedCharacter {
            found,
            pos: self.current_pos,
        }
    }

    fn invalid_number(&self) -> LexError {
        LexError::InvalidNumber {
            lexeme: self.substr().into(),
            pos: self.current_pos,
        }
    }
}

impl<'src> Lexer<'src> {
    /// Skips intra-line whitespace. Line breaks are significant and are never
    /// skipped here.
    fn skip_blanks(&mut self) {
        while matches!(self.peek(), ' ' | '\t' | '\r' | '\x0c') {
            self.advance();
        }
    }

    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.current_pos = self.pos();
        self.advance()
    }

    /// Returns the next character and advances the iterator. Returns `'\0'`
    /// (without advancing) once the input is exhausted.
    fn advance(&mut self) -> char {
        let Some(c) = self.iter.next() else {
            return '\0';
        };
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the character `n` positions ahead of the cursor.
    fn peek_nth(&self, n: usize) -> char {
        self.src[self.cursor..].chars().nth(n).unwrap_or('\0')
    }

    fn is_at_end(&mut self) -> bool {
        self.iter.peek().is_none()
    }

    fn top_level(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    /// Returns the position of the cursor.
    fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &'src str {
        &self.src[self.current_lo..self.cursor]
    }

    /// Produces a token using the marked bounds.
    fn produce(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, self.substr(), self.current_pos)
    }
}

/// Streams tokens until (and including) the end of input or the first error.
impl<'src> Iterator for Lexer<'src> {
    type Item = Result<Token<'src>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let next = self.next_token();
        self.finished = match &next {
            Ok(token) => token.is_eof(),
            Err(_) => true,
        };
        Some(next)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("{pos}: unterminated string literal")]
    UnterminatedString { pos: Position },
    #[error("{pos}: indentation of {width} spaces is not a multiple of {}", INDENT_WIDTH)]
    InvalidIndentation { width: usize, pos: Position },
    #[error("{pos}: dedent does not match any outer indentation level")]
    InconsistentDedent { pos: Position },
    #[error("{pos}: tabs are not allowed in indentation")]
    TabIndentation { pos: Position },
    #[error("{pos}: unexpected character {found:?}")]
    UnexpectedCharacter { found: char, pos: Position },
    #[error("{pos}: invalid number literal {lexeme}")]
    InvalidNumber { lexeme: Box<str>, pos: Position },
}

impl LexError {
    pub fn pos(&self) -> Position {
        match self {
            LexError::UnterminatedString { pos }
            | LexError::InvalidIndentation { pos, .. }
            | LexError::InconsistentDedent { pos }
            | LexError::TabIndentation { pos }
            | LexError::UnexpectedCharacter { pos, .. }
            | LexError::InvalidNumber { pos, .. } => *pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .expect("failed to tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tests_with_lexemes() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/%" => [
                (Plus, "+"),
                (Minus, "-"),
                (Star, "*"),
                (Slash, "/"),
                (Percent, "%"),
                (Eof, ""),
            ],
            "** // == != <= >= = < >" => [
                (StarStar, "**"),
                (SlashSlash, "//"),
                (EqEq, "=="),
                (NotEq, "!="),
                (LessEq, "<="),
                (GreaterEq, ">="),
                (Assign, "="),
                (Less, "<"),
                (Greater, ">"),
                (Eof, ""),
            ],
            "***///===" => [
                (StarStar, "**"),
                (Star, "*"),
                (SlashSlash, "//"),
                (Slash, "/"),
                (EqEq, "=="),
                (Assign, "="),
                (Eof, ""),
            ],
            "([{}]),.:" => [
                (LParen, "("),
                (LBracket, "["),
                (LBrace, "{"),
                (RBrace, "}"),
                (RBracket, "]"),
                (RParen, ")"),
                (Comma, ","),
                (Dot, "."),
                (Colon, ":"),
                (Eof, ""),
            ],
            "if elif else while for in def class return" => [
                (If, "if"),
                (Elif, "elif"),
                (Else, "else"),
                (While, "while"),
                (For, "for"),
                (In, "in"),
                (Def, "def"),
                (Class, "class"),
                (Return, "return"),
                (Eof, ""),
            ],
            "import as match async await and or not" => [
                (Import, "import"),
                (As, "as"),
                (Match, "match"),
                (Async, "async"),
                (Await, "await"),
                (And, "and"),
                (Or, "or"),
                (Not, "not"),
                (Eof, ""),
            ],
            "x _y foo_1 If iff True true None" => [
                (Identifier, "x"),
                (Identifier, "_y"),
                (Identifier, "foo_1"),
                (Identifier, "If"),
                (Identifier, "iff"),
                (Boolean, "True"),
                (Identifier, "true"),
                (None, "None"),
                (Eof, ""),
            ],
            "1 1.5 1.x 007" => [
                (Integer, "1"),
                (Float, "1.5"),
                (Integer, "1"),
                (Dot, "."),
                (Identifier, "x"),
                (Integer, "007"),
                (Eof, ""),
            ],
            r#""a" 'b' "it's" 'say "hi"' "\"" '\\'"# => [
                (String, r#""a""#),
                (String, "'b'"),
                (String, r#""it's""#),
                (String, r#"'say "hi"'"#),
                (String, r#""\"""#),
                (String, r"'\\'"),
                (Eof, ""),
            ],
            "x # trailing comment" => [
                (Identifier, "x"),
                (Comment, "# trailing comment"),
                (Eof, ""),
            ],
        });

        for (input, tokens) in cases {
            let lexed: Vec<_> = tokenize(input)
                .expect("failed to tokenize")
                .into_iter()
                .map(|t| (t.kind, t.lexeme))
                .collect();
            assert_eq!(&lexed, tokens, "input: {input:?}");
        }
    }

    #[test]
    fn literal_values() {
        let tokens = tokenize(r#"42 2.25 "hi\n" True False None x"#).unwrap();
        let literals: Vec<_> = tokens.iter().map(|t| t.literal).collect();
        assert_eq!(
            literals,
            [
                Literal::Int(42),
                Literal::Float(2.25),
                Literal::Str(r"hi\n"),
                Literal::Bool(true),
                Literal::Bool(false),
                Literal::None,
                Literal::None,
                Literal::None,
            ]
        );
    }

    #[test]
    fn positions_are_one_based() {
        let tokens = tokenize("x = 1\nfoo(y)").unwrap();
        let positions: Vec<_> = tokens.iter().map(|t| (t.kind, t.line, t.column)).collect();
        use TokenKind::*;
        assert_eq!(
            positions,
            [
                (Identifier, 1, 1),
                (Assign, 1, 3),
                (Integer, 1, 5),
                (Newline, 1, 6),
                (Identifier, 2, 1),
                (LParen, 2, 4),
                (Identifier, 2, 5),
                (RParen, 2, 6),
                (Eof, 2, 7),
            ]
        );
    }

    #[test]
    fn indent_and_dedent() {
        use TokenKind::*;
        let src = indoc! {"
            if a:
                b
            c
        "};
        assert_eq!(
            kinds(src),
            [If, Identifier, Colon, Indent, Identifier, Dedent, Identifier, Newline, Eof]
        );
    }

    #[test]
    fn multiple_dedents_are_drained() {
        use TokenKind::*;
        let src = indoc! {"
            def f():
                while x:
                    if y:
                        z
            w
        "};
        assert_eq!(
            kinds(src),
            [
                Def, Identifier, LParen, RParen, Colon, Indent, //
                While, Identifier, Colon, Indent, //
                If, Identifier, Colon, Indent, //
                Identifier, Dedent, Dedent, Dedent, //
                Identifier, Newline, Eof,
            ]
        );
    }

    #[test]
    fn open_levels_are_closed_at_end_of_input() {
        use TokenKind::*;
        let src = "while a:\n    while b:\n        c";
        assert_eq!(
            kinds(src),
            [
                While, Identifier, Colon, Indent, //
                While, Identifier, Colon, Indent, //
                Identifier, Dedent, Dedent, Eof,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_keep_indentation() {
        use TokenKind::*;
        let src = indoc! {"
            if a:

                # a comment
                b
              # misaligned comment
                c
        "};
        assert_eq!(
            kinds(src),
            [
                If, Identifier, Colon, Newline, Newline, //
                Comment, Indent, Identifier, Newline, Comment, Newline, //
                Identifier, Newline, Dedent, Eof,
            ]
        );
    }

    #[test]
    fn line_breaks_inside_brackets_are_ignored() {
        use TokenKind::*;
        let src = "f(1,\n  2,\n     3)\nx";
        assert_eq!(
            kinds(src),
            [
                Identifier, LParen, Integer, Comma, Integer, Comma, Integer, RParen, //
                Newline, Identifier, Eof,
            ]
        );
    }

    #[test]
    fn unclosed_bracket_ends_at_statement_keyword() {
        use TokenKind::*;
        let src = indoc! {"
            def f(:
                return 1
            x = (2
            if y:
                z
        "};
        assert_eq!(
            kinds(src),
            [
                Def, Identifier, LParen, Colon, Indent, //
                Return, Integer, Dedent, //
                Identifier, Assign, LParen, Integer, Newline, //
                If, Identifier, Colon, Indent, //
                Identifier, Newline, Dedent, Eof,
            ]
        );
    }

    #[test]
    fn error_invalid_indentation() {
        let src = "if a:\n  b";
        assert_eq!(
            tokenize(src),
            Err(LexError::InvalidIndentation {
                width: 2,
                pos: Position::new(2, 1),
            })
        );
    }

    #[test]
    fn error_inconsistent_dedent() {
        let src = "if a:\n        b\n    c";
        assert_eq!(
            tokenize(src),
            Err(LexError::InconsistentDedent {
                pos: Position::new(3, 5),
            })
        );
    }

    #[test]
    fn error_tab_indentation() {
        let src = "if a:\n\tb";
        assert_eq!(
            tokenize(src),
            Err(LexError::TabIndentation {
                pos: Position::new(2, 1),
            })
        );
    }

    #[test]
    fn error_unterminated_string() {
        assert_eq!(
            tokenize("x = \"abc"),
            Err(LexError::UnterminatedString {
                pos: Position::new(1, 5),
            })
        );
        assert_eq!(
            tokenize(r"'abc\"),
            Err(LexError::UnterminatedString {
                pos: Position::new(1, 1),
            })
        );
    }

    #[test]
    fn error_unexpected_character() {
        assert_eq!(
            tokenize("a $ b"),
            Err(LexError::UnexpectedCharacter {
                found: '$',
                pos: Position::new(1, 3),
            })
        );
        assert_eq!(
            tokenize("!x"),
            Err(LexError::UnexpectedCharacter {
                found: '!',
                pos: Position::new(1, 1),
            })
        );
    }

    #[test]
    fn error_integer_out_of_range() {
        assert_eq!(
            tokenize("99999999999999999999"),
            Err(LexError::InvalidNumber {
                lexeme: "99999999999999999999".into(),
                pos: Position::START,
            })
        );
    }

    #[test]
    fn error_display() {
        let error = tokenize("if a:\n   b").unwrap_err();
        assert_eq!(
            error.to_string(),
            "2:1: indentation of 3 spaces is not a multiple of 4"
        );
    }

    #[test]
    fn iterator_stops_after_eof() {
        let tokens: Vec<_> = Lexer::new("a b").collect();
        assert_eq!(tokens.len(), 3);
        assert!(matches!(tokens.last(), Some(Ok(t)) if t.is_eof()));

        let tokens: Vec<_> = Lexer::new("a $ b").collect();
        assert_eq!(tokens.len(), 2);
        assert!(matches!(tokens.last(), Some(Err(_))));
    }

    /// Builds a source with one `x` statement per line, indented according to
    /// `levels`. Each level is at most one deeper than the previous one.
    fn indented_source(levels: &[usize]) -> String {
        let mut src = String::new();
        let mut previous = 0;
        for &level in levels {
            let level = level.min(previous + 1);
            src.push_str(&" ".repeat(level * INDENT_WIDTH));
            src.push_str("x\n");
            previous = level;
        }
        src
    }

    fn scanned_pairs<'a>(tokens: &[Token<'a>]) -> Vec<(TokenKind, Literal<'a>)> {
        tokens
            .iter()
            .filter(|t| !t.kind.is_structural())
            .map(|t| (t.kind, t.literal))
            .collect()
    }

    const FRAGMENTS: &[&str] = &[
        "x", "foo", "_bar", "42", "3.25", "\"s\"", "'t'", "\"a\\\"b\"", "+", "-", "*", "**",
        "/", "//", "%", "==", "!=", "<", "<=", ">", ">=", "=", "(", ")", "[", "]", "{", "}",
        ",", ".", ":", "True", "False", "None", "and", "or", "not", "if", "def", "return",
    ];

    proptest! {
        #[test]
        fn doesnt_crash(s in "\\PC*") {
            let result = tokenize(&s);
            if let Ok(tokens) = result {
                prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
                prop_assert_eq!(tokens.iter().filter(|t| t.is_eof()).count(), 1);
            }
        }

        #[test]
        fn valid_indentation_is_balanced(levels in prop::collection::vec(0usize..5, 0..24)) {
            let src = indented_source(&levels);
            let tokens = tokenize(&src);
            prop_assert!(tokens.is_ok(), "{:?}", tokens);
            let mut depth = 0i64;
            for token in tokens.unwrap() {
                match token.kind {
                    TokenKind::Indent => depth += 1,
                    TokenKind::Dedent => depth -= 1,
                    _ => (),
                }
                prop_assert!(depth >= 0);
            }
            prop_assert_eq!(depth, 0);
        }

        #[test]
        fn invalid_indentation_width_is_rejected(
            levels in prop::collection::vec(0usize..4, 1..12),
            index in any::<prop::sample::Index>(),
            extra in 1usize..4,
        ) {
            let bad_line = index.index(levels.len());
            let mut src = String::new();
            let mut previous = 0;
            for (i, &level) in levels.iter().enumerate() {
                let level = level.min(previous + 1);
                let mut width = level * INDENT_WIDTH;
                if i == bad_line {
                    width += extra;
                }
                src.push_str(&" ".repeat(width));
                src.push_str("x\n");
                previous = level;
            }
            let error = tokenize(&src).unwrap_err();
            let line = u32::try_from(bad_line + 1).unwrap();
            prop_assert!(
                matches!(error, LexError::InvalidIndentation { pos, .. } if pos.line == line),
                "{:?}",
                error
            );
        }

        #[test]
        fn lexemes_round_trip(parts in prop::collection::vec(prop::sample::select(FRAGMENTS), 0..32)) {
            let src = parts.join(" ");
            let first = tokenize(&src).unwrap();
            let rebuilt = first
                .iter()
                .filter(|t| !t.kind.is_structural())
                .map(|t| t.lexeme)
                .collect::<Vec<_>>()
                .join(" ");
            let second = tokenize(&rebuilt).unwrap();
            prop_assert_eq!(scanned_pairs(&first), scanned_pairs(&second));
        }
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $lexeme:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![$(($kind, $lexeme)),*],
            )),*]
        }};
    }
    use cases;
}
