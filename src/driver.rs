use std::fmt;

use crate::{
    ast::{
        visit::{self, Visit},
        Class, Expr, Function, Import, Program, Stmt,
    },
    codegen::{self, Diagnostic},
    ir::{self, Builder},
    lexer::{self, LexError},
    parser,
    token::Spanned,
};

#[derive(Clone, Debug)]
pub struct Options {
    pub module_name: String,
    /// The host when absent.
    pub target: Option<Target>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            module_name: "main".to_owned(),
            target: None,
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    x86_64_darwin,
    x86_64_linux,
    aarch64_darwin,
    aarch64_linux,
}

impl Target {
    pub const ALL: &[Target] = &[
        Target::x86_64_darwin,
        Target::x86_64_linux,
        Target::aarch64_darwin,
        Target::aarch64_linux,
    ];

    pub const fn triple(&self) -> &'static str {
        match self {
            Target::x86_64_darwin => "x86_64-apple-darwin",
            Target::x86_64_linux => "x86_64-unknown-linux-gnu",
            Target::aarch64_darwin => "aarch64-apple-darwin",
            Target::aarch64_linux => "aarch64-unknown-linux-gnu",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::x86_64_darwin => f.write_str("x86_64_darwin"),
            Target::x86_64_linux => f.write_str("x86_64_linux"),
            Target::aarch64_darwin => f.write_str("aarch64_darwin"),
            Target::aarch64_linux => f.write_str("aarch64_linux"),
        }
    }
}

/// A successfully compiled module.
#[derive(Debug)]
pub struct Artifact {
    pub module: ir::Module,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("{} syntax error(s)", .0.len())]
    Parse(Vec<Spanned<parser::Error>>),

    /// Holds every diagnostic of the run, warnings included.
    #[error("{} code generation error(s)", error_count(.0))]
    Codegen(Vec<Diagnostic>),

    #[error(transparent)]
    Backend(#[from] ir::Error),
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics
        .iter()
        .filter(|d| d.severity == codegen::Severity::Error)
        .count()
}

/// Tokenizes and parses `source`.
pub fn parse_source(source: &str) -> Result<Program, Error> {
    let tokens = lexer::tokenize(source)?;
    parser::parse(&tokens).map_err(|(_, errors)| Error::Parse(errors))
}

/// Runs the whole pipeline over `source`.
pub fn compile_source(source: &str, options: &Options) -> Result<Artifact, Error> {
    let program = parse_source(source)?;
    compile_program(&program, options)
}

pub fn compile_program(program: &Program, options: &Options) -> Result<Artifact, Error> {
    let triple = options.target.as_ref().map(Target::triple);
    let builder = Builder::new(&options.module_name, triple)?;
    let compilation = codegen::compile(program, builder);
    if !compilation.success {
        return Err(Error::Codegen(compilation.diagnostics));
    }
    Ok(Artifact {
        module: compilation.module,
        warnings: compilation.diagnostics,
    })
}

/// Node counts of a program.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Census {
    pub functions: usize,
    pub classes: usize,
    pub imports: usize,
    pub statements: usize,
    pub expressions: usize,
}

impl Census {
    pub fn of(program: &Program) -> Census {
        let mut census = Census::default();
        census.visit_program(program);
        census
    }
}

impl Visit for Census {
    fn visit_function(&mut self, function: &Function) {
        self.functions += 1;
        visit::walk_function(self, function);
    }

    fn visit_class(&mut self, class: &Class) {
        self.classes += 1;
        visit::walk_class(self, class);
    }

    fn visit_import(&mut self, _: &Import) {
        self.imports += 1;
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        self.statements += 1;
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        self.expressions += 1;
        visit::walk_expr(self, expr);
    }
}

impl fmt::Display for Census {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} functions, {} classes, {} imports, {} statements, {} expressions",
            self.functions, self.classes, self.imports, self.statements, self.expressions
        )
    }
}
