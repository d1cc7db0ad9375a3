//! Read-only traversal of the AST.
//!
//! Each `visit_*` method defaults to the matching `walk_*` function, which
//! visits every child of the node exactly once and in source order. An
//! implementation overrides the methods for the nodes it cares about and
//! calls the `walk_*` function to keep descending.

use crate::ast::*;

pub trait Visit {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program);
    }

    fn visit_decl(&mut self, decl: &Decl) {
        walk_decl(self, decl);
    }

    fn visit_function(&mut self, function: &Function) {
        walk_function(self, function);
    }

    fn visit_class(&mut self, class: &Class) {
        walk_class(self, class);
    }

    fn visit_import(&mut self, import: &Import) {
        _ = import;
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

/// Declarations are visited before statements.
pub fn walk_program<V: Visit + ?Sized>(v: &mut V, program: &Program) {
    for decl in &program.declarations {
        v.visit_decl(decl);
    }
    for stmt in &program.statements {
        v.visit_stmt(stmt);
    }
}

pub fn walk_decl<V: Visit + ?Sized>(v: &mut V, decl: &Decl) {
    match decl {
        Decl::Function(function) => v.visit_function(function),
        Decl::Class(class) => v.visit_class(class),
        Decl::Import(import) => v.visit_import(import),
    }
}

pub fn walk_function<V: Visit + ?Sized>(v: &mut V, function: &Function) {
    walk_body(v, &function.body);
}

pub fn walk_class<V: Visit + ?Sized>(v: &mut V, class: &Class) {
    for member in &class.members {
        v.visit_decl(member);
    }
}

pub fn walk_body<V: Visit + ?Sized>(v: &mut V, body: &[Stmt]) {
    for stmt in body {
        v.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visit + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Assignment { name: _, value } => v.visit_expr(value),
        StmtKind::Expression(expr) => v.visit_expr(expr),
        StmtKind::Return(value) => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        StmtKind::If {
            branches,
            else_body,
        } => {
            for Branch { cond, body } in branches {
                v.visit_expr(cond);
                walk_body(v, body);
            }
            walk_body(v, else_body);
        }
        StmtKind::While { cond, body } => {
            v.visit_expr(cond);
            walk_body(v, body);
        }
        StmtKind::For {
            var: _,
            iterable,
            body,
        } => {
            v.visit_expr(iterable);
            walk_body(v, body);
        }
        StmtKind::Match { value, cases } => {
            v.visit_expr(value);
            for Case { pattern, body } in cases {
                v.visit_expr(pattern);
                walk_body(v, body);
            }
        }
    }
}

pub fn walk_expr<V: Visit + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Identifier(_) => {}
        ExprKind::Binary { op: _, left, right } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        ExprKind::Unary { op: _, operand } => v.visit_expr(operand),
        ExprKind::Call { callee, args } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Attribute { object, name: _ } => v.visit_expr(object),
        ExprKind::Subscript { object, index } => {
            v.visit_expr(object);
            v.visit_expr(index);
        }
        ExprKind::List(elements) | ExprKind::Tuple(elements) => {
            for element in elements {
                v.visit_expr(element);
            }
        }
        ExprKind::Dict(pairs) => {
            for (key, value) in pairs {
                v.visit_expr(key);
                v.visit_expr(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::tokenize, parser, token::Position};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    /// Records the position of every visited node.
    #[derive(Default)]
    struct Recorder {
        exprs: Vec<Position>,
        stmts: Vec<Position>,
        decls: Vec<Position>,
    }

    impl Visit for Recorder {
        fn visit_decl(&mut self, decl: &Decl) {
            self.decls.push(decl.pos());
            walk_decl(self, decl);
        }

        fn visit_stmt(&mut self, stmt: &Stmt) {
            self.stmts.push(stmt.pos);
            walk_stmt(self, stmt);
        }

        fn visit_expr(&mut self, expr: &Expr) {
            self.exprs.push(expr.pos);
            walk_expr(self, expr);
        }
    }

    fn record(src: &str) -> Recorder {
        let tokens = tokenize(src).unwrap();
        let program = parser::parse(&tokens).unwrap();
        let mut recorder = Recorder::default();
        recorder.visit_program(&program);
        recorder
    }

    #[test]
    fn visits_every_node_once_in_source_order() {
        let recorder = record(indoc! {"
            x = f(1, [2], {3: 4})
            def g(a):
                return a.b[0]
            class C:
                import m
        "});

        let p = Position::new;
        assert_eq!(recorder.decls, [p(2, 1), p(4, 1), p(5, 5)]);
        assert_eq!(recorder.stmts, [p(3, 5), p(1, 1)]);
        assert_eq!(
            recorder.exprs,
            [
                // return a.b[0]
                p(3, 12),
                p(3, 12),
                p(3, 12),
                p(3, 16),
                // f(1, [2], {3: 4})
                p(1, 5),
                p(1, 5),
                p(1, 7),
                p(1, 10),
                p(1, 11),
                p(1, 15),
                p(1, 16),
                p(1, 19),
            ]
        );
    }

    #[test]
    fn visits_control_flow_children() {
        let recorder = record(indoc! {"
            if a:
                b
            elif c:
                d
            else:
                e
            while f:
                g
            for h in i:
                j
            match k:
                1: l
                _: m
        "});
        assert_eq!(recorder.stmts.len(), 4 + 2 + 2 + 3);
        assert_eq!(recorder.exprs.len(), 5 + 2 + 2 + 5);
    }
}
