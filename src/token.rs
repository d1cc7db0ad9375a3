use std::fmt;

#[derive(Copy, Clone, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// The source text of the token. Empty for synthetic structural tokens.
    pub lexeme: &'src str,
    pub literal: Literal<'src>,
    pub line: u32,
    pub column: u32,
}

impl<'src> Token<'src> {
    pub fn new(kind: TokenKind, lexeme: &'src str, pos: Position) -> Token<'src> {
        Token {
            kind,
            lexeme,
            literal: Literal::None,
            line: pos.line,
            column: pos.column,
        }
    }

    /// Produces a synthetic (zero-width) token at the given position.
    pub fn synthetic(kind: TokenKind, pos: Position) -> Token<'src> {
        Token::new(kind, "", pos)
    }

    pub fn with_literal(mut self, literal: Literal<'src>) -> Token<'src> {
        self.literal = literal;
        self
    }

    pub fn pos(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:?}, {})", self.kind, self.lexeme, self.pos())?;
        if self.literal != Literal::None {
            write!(f, " = {:?}", self.literal)?;
        }
        Ok(())
    }
}

/// The value carried by literal tokens.
///
/// Strings borrow their contents (without the quotes) from the source. Escape
/// sequences are kept verbatim.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Literal<'src> {
    Str(&'src str),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const START: Position = Position { line: 1, column: 1 };

    pub fn new(line: u32, column: u32) -> Position {
        Position { line, column }
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { pos: self, inner }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({self})")
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub pos: Position,
    pub inner: T,
}

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pos, self.inner)
    }
}

impl<T: std::error::Error> std::error::Error for Spanned<T> {}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    String,
    Integer,
    Float,
    Boolean,
    None,

    Plus,
    Minus,
    Star,
    /// `**`
    StarStar,
    Slash,
    /// `//`
    SlashSlash,
    Percent,

    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,

    And,
    Or,
    Not,

    /// `=`
    Assign,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,

    If,
    Elif,
    Else,
    While,
    For,
    In,
    Def,
    Class,
    Return,
    Import,
    As,
    Match,
    Async,
    Await,

    Indent,
    Dedent,
    Newline,
    Comment,
    Eof,
}

impl TokenKind {
    /// Tokens the parser skips over.
    pub fn is_trivia(self) -> bool {
        self == TokenKind::Comment
    }

    /// Tokens synthesized from whitespace rather than scanned from text.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            TokenKind::Indent | TokenKind::Dedent | TokenKind::Newline | TokenKind::Eof
        )
    }

    /// Tokens that may only start a statement (used as synchronization
    /// points during error recovery).
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Class
                | TokenKind::Def
                | TokenKind::Async
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::Import
                | TokenKind::Match
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let s = match self {
            Identifier => "identifier",
            String => "string",
            Integer => "integer",
            Float => "float",
            Boolean => "boolean",
            None => "'None'",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            StarStar => "'**'",
            Slash => "'/'",
            SlashSlash => "'//'",
            Percent => "'%'",
            EqEq => "'=='",
            NotEq => "'!='",
            Less => "'<'",
            LessEq => "'<='",
            Greater => "'>'",
            GreaterEq => "'>='",
            And => "'and'",
            Or => "'or'",
            Not => "'not'",
            Assign => "'='",
            LParen => "'('",
            RParen => "')'",
            LBracket => "'['",
            RBracket => "']'",
            LBrace => "'{'",
            RBrace => "'}'",
            Comma => "','",
            Dot => "'.'",
            Colon => "':'",
            If => "'if'",
            Elif => "'elif'",
            Else => "'else'",
            While => "'while'",
            For => "'for'",
            In => "'in'",
            Def => "'def'",
            Class => "'class'",
            Return => "'return'",
            Import => "'import'",
            As => "'as'",
            Match => "'match'",
            Async => "'async'",
            Await => "'await'",
            Indent => "indent",
            Dedent => "dedent",
            Newline => "newline",
            Comment => "comment",
            Eof => "end of input",
        };
        f.write_str(s)
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "if" => TokenKind::If,
    "elif" => TokenKind::Elif,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "for" => TokenKind::For,
    "in" => TokenKind::In,
    "def" => TokenKind::Def,
    "class" => TokenKind::Class,
    "return" => TokenKind::Return,
    "import" => TokenKind::Import,
    "as" => TokenKind::As,
    "match" => TokenKind::Match,
    "async" => TokenKind::Async,
    "await" => TokenKind::Await,
    "and" => TokenKind::And,
    "or" => TokenKind::Or,
    "not" => TokenKind::Not,
    "True" => TokenKind::Boolean,
    "False" => TokenKind::Boolean,
    "None" => TokenKind::None,
};
