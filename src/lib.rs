/// The lexer takes the source input, mapping it into a sequence of tokens,
/// including the synthetic `INDENT`/`DEDENT` tokens that delimit blocks.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The code generator lowers an AST to basic-block IR through a backend.
pub mod codegen;

/// The IR produced by the default backend.
pub mod ir;

pub mod ast;
pub mod token;

mod driver;
pub use driver::*;

pub mod util {
    pub mod fmt;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
