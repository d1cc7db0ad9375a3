// program     ::= (declaration | statement | NEWLINE)* EOF
// declaration ::= ['async'] 'def' ID '(' [ID (',' ID)*] ')' ':' block
//               | 'class' ID ['(' ID ')'] ':' INDENT declaration+ DEDENT
//               | 'import' ID ['as' ID]
// block       ::= INDENT statement+ DEDENT
//               | simple_stmt
// statement   ::= 'if' expr ':' block ('elif' expr ':' block)* ['else' ':' block]
//               | 'while' expr ':' block
//               | 'for' ID 'in' expr ':' block
//               | 'match' expr ':' INDENT (expr ':' block)+ DEDENT
//               | simple_stmt
// simple_stmt ::= ID '=' expr
//               | 'return' [expr]
//               | expr
// expr        ::= expr 'or' expr
//               | expr 'and' expr
//               | expr ('==' | '!=') expr
//               | expr ('<' | '<=' | '>' | '>=') expr
//               | expr ('+' | '-') expr
//               | expr ('*' | '/' | '//' | '%') expr
//               | expr '**' expr
//               | ('-' | '+' | 'not') expr
//               | expr '(' [expr (',' expr)*] ')'
//               | expr '.' ID
//               | expr '[' expr ']'
//               | '(' expr ')'
//               | '(' [expr (',' expr)* [',']] ')'
//               | '[' [expr (',' expr)*] ']'
//               | '{' [expr ':' expr (',' expr ':' expr)*] '}'
//               | ID | integer | float | string | True | False | None

// Precedence (tightest first)
//
// call, attribute, subscript
// unary - + not
// **  (right-associative)
// * / // %
// + -
// < <= > >=
// == !=
// and
// or

use std::fmt;

use crate::token::{self, Position};

pub mod visit;

#[derive(Debug, PartialEq, Default)]
pub struct Program {
    pub declarations: Vec<Decl>,
    pub statements: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub enum Decl {
    Function(Function),
    Class(Class),
    Import(Import),
}

impl Decl {
    pub fn pos(&self) -> Position {
        match self {
            Decl::Function(function) => function.pos,
            Decl::Class(class) => class.pos,
            Decl::Import(import) => import.pos,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Function {
    pub name: Box<str>,
    pub params: Vec<Box<str>>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub pos: Position,
}

#[derive(Debug, PartialEq)]
pub struct Class {
    pub name: Box<str>,
    pub base: Option<Box<str>>,
    pub members: Vec<Decl>,
    pub pos: Position,
}

#[derive(Debug, PartialEq)]
pub struct Import {
    pub module: Box<str>,
    pub alias: Option<Box<str>>,
    pub pos: Position,
}

#[derive(Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

#[derive(Debug, PartialEq)]
pub enum StmtKind {
    Assignment {
        name: Box<str>,
        value: Expr,
    },
    Expression(Expr),
    Return(Option<Expr>),
    If {
        /// The `if` branch followed by every `elif` branch.
        branches: Vec<Branch>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        var: Box<str>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Match {
        value: Expr,
        cases: Vec<Case>,
    },
}

#[derive(Debug, PartialEq)]
pub struct Branch {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub struct Case {
    pub pattern: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Expr {
        Expr { kind, pos }
    }
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(Box<str>),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Attribute {
        object: Box<Expr>,
        name: Box<str>,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Tuple(Vec<Expr>),
}

/// An owned literal value.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Str(Box<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
}

impl From<token::Literal<'_>> for Literal {
    fn from(literal: token::Literal<'_>) -> Self {
        match literal {
            token::Literal::Str(s) => Literal::Str(s.into()),
            token::Literal::Int(i) => Literal::Int(i),
            token::Literal::Float(f) => Literal::Float(f),
            token::Literal::Bool(b) => Literal::Bool(b),
            token::Literal::None => Literal::None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOperator::*;
        f.write_str(match self {
            Or => "or",
            And => "and",
            Eq => "==",
            NotEq => "!=",
            Less => "<",
            LessEq => "<=",
            Greater => ">",
            GreaterEq => ">=",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            FloorDiv => "//",
            Mod => "%",
            Pow => "**",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `+x`
    Plus,
    /// `-x`
    Neg,
    /// `not x`
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOperator::Plus => "+",
            UnaryOperator::Neg => "-",
            UnaryOperator::Not => "not",
        })
    }
}
