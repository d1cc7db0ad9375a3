use std::fmt::{self, Write};

use crate::token::{Literal, Token};

/// Prints one token per line: position, kind, lexeme and (for literals) the
/// scanned value. Comments are included.
pub fn print_tokens(w: &mut impl Write, tokens: &[Token<'_>]) -> fmt::Result {
    for token in tokens {
        let pos = token.pos().to_string();
        write!(w, "{pos:<8}{:?}", token.kind)?;
        if !token.lexeme.is_empty() && !token.kind.is_structural() {
            write!(w, " {:?}", token.lexeme)?;
        }
        match token.literal {
            Literal::None => (),
            Literal::Str(s) => write!(w, " = {s:?}")?,
            Literal::Int(i) => write!(w, " = {i}")?,
            Literal::Float(f) => write!(w, " = {f:?}")?,
            Literal::Bool(b) => write!(w, " = {b}")?,
        }
        writeln!(w)?;
    }
    Ok(())
}

pub fn print_tokens_string(tokens: &[Token<'_>]) -> String {
    let mut buf = String::with_capacity(tokens.len() * 16);
    // Writing into a `String` never fails.
    _ = print_tokens(&mut buf, tokens);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn dumps_every_token() {
        let tokens = tokenize("x = 'a' # c\nif True:\n    y(1.5)").unwrap();
        assert_eq!(
            print_tokens_string(&tokens),
            indoc! {r##"
                1:1     Identifier "x"
                1:3     Assign "="
                1:5     String "'a'" = "a"
                1:9     Comment "# c"
                1:12    Newline
                2:1     If "if"
                2:4     Boolean "True" = true
                2:8     Colon ":"
                3:5     Indent
                3:5     Identifier "y"
                3:6     LParen "("
                3:7     Float "1.5" = 1.5
                3:10    RParen ")"
                3:11    Dedent
                3:11    Eof
            "##}
        );
    }
}
