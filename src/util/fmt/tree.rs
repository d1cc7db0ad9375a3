use std::fmt::{self, Write};

use crate::ast::*;

const INDENT_WIDTH: usize = 2;

/// Displays a syntax tree node as an indented outline, one node per line.
pub struct Tree<'a, T: ?Sized>(pub &'a T);

impl fmt::Display for Tree<'_, Program> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        print_program(f, self.0)
    }
}

impl fmt::Display for Tree<'_, Expr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        print_expr(f, 0, self.0)
    }
}

pub fn print_program_string(program: &Program) -> String {
    Tree(program).to_string()
}

pub fn print_expr_string(expr: &Expr) -> String {
    Tree(expr).to_string()
}

pub fn print_program(w: &mut impl Write, program: &Program) -> fmt::Result {
    for decl in &program.declarations {
        print_decl(w, 0, decl)?;
    }
    print_body(w, 0, &program.statements)
}

fn print_decl(w: &mut impl Write, i: usize, decl: &Decl) -> fmt::Result {
    sp(w, i)?;
    match decl {
        Decl::Function(function) => {
            if function.is_async {
                write!(w, "async ")?;
            }
            write!(w, "function {}(", function.name)?;
            for (idx, param) in function.params.iter().enumerate() {
                if idx > 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{param}")?;
            }
            writeln!(w, ") ({})", function.pos)?;
            print_body(w, i + 1, &function.body)?;
        }
        Decl::Class(class) => {
            write!(w, "class {}", class.name)?;
            if let Some(base) = &class.base {
                write!(w, "({base})")?;
            }
            writeln!(w, " ({})", class.pos)?;
            for member in &class.members {
                print_decl(w, i + 1, member)?;
            }
        }
        Decl::Import(import) => {
            write!(w, "import {}", import.module)?;
            if let Some(alias) = &import.alias {
                write!(w, " as {alias}")?;
            }
            writeln!(w, " ({})", import.pos)?;
        }
    }
    Ok(())
}

fn print_body(w: &mut impl Write, i: usize, body: &[Stmt]) -> fmt::Result {
    for stmt in body {
        print_stmt(w, i, stmt)?;
    }
    Ok(())
}

/// Prints a label line followed by the given body, one level deeper.
fn print_labeled_body(w: &mut impl Write, i: usize, label: &str, body: &[Stmt]) -> fmt::Result {
    sp(w, i)?;
    writeln!(w, "{label}")?;
    print_body(w, i + 1, body)
}

fn print_labeled_expr(w: &mut impl Write, i: usize, label: &str, expr: &Expr) -> fmt::Result {
    sp(w, i)?;
    writeln!(w, "{label}")?;
    print_expr(w, i + 1, expr)
}

pub fn print_stmt(w: &mut impl Write, i: usize, stmt: &Stmt) -> fmt::Result {
    sp(w, i)?;
    let pos = stmt.pos;
    match &stmt.kind {
        StmtKind::Assignment { name, value } => {
            writeln!(w, "assignment {name} ({pos})")?;
            print_expr(w, i + 1, value)?;
        }
        StmtKind::Expression(expr) => {
            writeln!(w, "expression ({pos})")?;
            print_expr(w, i + 1, expr)?;
        }
        StmtKind::Return(value) => {
            writeln!(w, "return ({pos})")?;
            if let Some(value) = value {
                print_expr(w, i + 1, value)?;
            }
        }
        StmtKind::If {
            branches,
            else_body,
        } => {
            writeln!(w, "if ({pos})")?;
            for Branch { cond, body } in branches {
                print_labeled_expr(w, i + 1, "condition", cond)?;
                print_labeled_body(w, i + 1, "then", body)?;
            }
            if !else_body.is_empty() {
                print_labeled_body(w, i + 1, "else", else_body)?;
            }
        }
        StmtKind::While { cond, body } => {
            writeln!(w, "while ({pos})")?;
            print_labeled_expr(w, i + 1, "condition", cond)?;
            print_labeled_body(w, i + 1, "body", body)?;
        }
        StmtKind::For {
            var,
            iterable,
            body,
        } => {
            writeln!(w, "for {var} ({pos})")?;
            print_labeled_expr(w, i + 1, "in", iterable)?;
            print_labeled_body(w, i + 1, "body", body)?;
        }
        StmtKind::Match { value, cases } => {
            writeln!(w, "match ({pos})")?;
            print_expr(w, i + 1, value)?;
            for Case { pattern, body } in cases {
                print_labeled_expr(w, i + 1, "case", pattern)?;
                print_labeled_body(w, i + 2, "body", body)?;
            }
        }
    }
    Ok(())
}

pub fn print_expr(w: &mut impl Write, i: usize, expr: &Expr) -> fmt::Result {
    sp(w, i)?;
    let pos = expr.pos;
    match &expr.kind {
        ExprKind::Literal(literal) => match literal {
            Literal::Int(val) => writeln!(w, "int {val} ({pos})")?,
            Literal::Float(val) => writeln!(w, "float {val:?} ({pos})")?,
            Literal::Str(val) => writeln!(w, "string {val:?} ({pos})")?,
            Literal::Bool(val) => writeln!(w, "bool {val} ({pos})")?,
            Literal::None => writeln!(w, "none ({pos})")?,
        },
        ExprKind::Identifier(name) => {
            writeln!(w, "ident {name} ({pos})")?;
        }
        ExprKind::Binary { op, left, right } => {
            writeln!(w, "binary {op:?} ({pos})")?;
            print_expr(w, i + 1, left)?;
            print_expr(w, i + 1, right)?;
        }
        ExprKind::Unary { op, operand } => {
            writeln!(w, "unary {op:?} ({pos})")?;
            print_expr(w, i + 1, operand)?;
        }
        ExprKind::Call { callee, args } => {
            writeln!(w, "call ({pos})")?;
            print_expr(w, i + 1, callee)?;
            if !args.is_empty() {
                sp(w, i + 1)?;
                writeln!(w, "arguments")?;
                for arg in args {
                    print_expr(w, i + 2, arg)?;
                }
            }
        }
        ExprKind::Attribute { object, name } => {
            writeln!(w, "attribute {name} ({pos})")?;
            print_expr(w, i + 1, object)?;
        }
        ExprKind::Subscript { object, index } => {
            writeln!(w, "subscript ({pos})")?;
            print_expr(w, i + 1, object)?;
            print_expr(w, i + 1, index)?;
        }
        ExprKind::List(elements) => {
            writeln!(w, "list ({pos})")?;
            for element in elements {
                print_expr(w, i + 1, element)?;
            }
        }
        ExprKind::Tuple(elements) => {
            writeln!(w, "tuple ({pos})")?;
            for element in elements {
                print_expr(w, i + 1, element)?;
            }
        }
        ExprKind::Dict(pairs) => {
            writeln!(w, "dict ({pos})")?;
            for (key, value) in pairs {
                sp(w, i + 1)?;
                writeln!(w, "pair")?;
                print_expr(w, i + 2, key)?;
                print_expr(w, i + 2, value)?;
            }
        }
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> fmt::Result {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
