//! Lowering of a [`Program`] to basic-block IR.
//!
//! The generator is generic over a [`Backend`]. It synthesizes `main` for the
//! top-level statements, emits one function per `def` (every parameter and
//! return value is a 64-bit integer) and keeps local variables in stack
//! slots. Problems are collected as [`Diagnostic`]s rather than aborting, so a
//! single run reports as much as possible.

use std::{collections::HashMap, fmt};

use crate::{
    ast::{
        BinaryOperator, Case, Decl, Expr, ExprKind, Function, Literal, Program, Stmt, StmtKind,
        UnaryOperator,
    },
    token::Position,
};

pub mod backend;

use backend::{
    ArithOp, Backend, CastOp, FloatPredicate, IntPredicate, LogicOp, Signature, TypeClass,
};

/// Functions of the C library declared on first use, with their number of
/// `f64` parameters. They return an `f64`.
const RUNTIME_FUNCTIONS: &[(&str, usize)] = &[("pow", 2), ("floor", 1), ("fmod", 2)];

fn is_runtime_function(name: &str) -> bool {
    RUNTIME_FUNCTIONS.iter().any(|&(runtime, _)| runtime == name)
}

/// Lowers the program through `backend` and validates the result.
pub fn compile<B: Backend>(program: &Program, backend: B) -> Compilation<B::Module> {
    let mut generator = Generator::new(backend);
    generator.generate(program);
    generator.finish()
}

pub struct Compilation<M> {
    pub module: M,
    pub diagnostics: Vec<Diagnostic>,
    /// No diagnostic has error severity.
    pub success: bool,
}

impl<M> Compilation<M> {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// Absent for problems found when validating the whole module.
    pub pos: Option<Position>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{pos}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticKind {
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("invalid module: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    #[error("undefined name `{name}`")]
    UndefinedName { name: Box<str> },

    #[error("value of type {found} is not callable")]
    NotCallable { found: TypeClass },

    #[error("{construct} are not supported")]
    Unsupported { construct: &'static str },

    #[error("`for` loops can only iterate over `range` with one to three arguments")]
    UnsupportedIterable,

    #[error("function `{name}` is already defined")]
    DuplicateFunction { name: Box<str> },

    #[error("invalid operands to `{op}`: {left} and {right}")]
    InvalidOperands {
        op: BinaryOperator,
        left: TypeClass,
        right: TypeClass,
    },

    #[error("invalid operand to `{op}`: {found}")]
    InvalidOperand { op: UnaryOperator, found: TypeClass },

    #[error("`{name}` takes {expected} arguments, but {found} were given")]
    ArityMismatch {
        name: Box<str>,
        expected: usize,
        found: usize,
    },

    #[error("`async` on function `{name}` is ignored")]
    AsyncIgnored { name: Box<str> },

    #[error("class `{name}` is skipped")]
    ClassSkipped { name: Box<str> },
}

impl CodegenError {
    pub fn severity(&self) -> Severity {
        match self {
            CodegenError::UndefinedName { .. }
            | CodegenError::AsyncIgnored { .. }
            | CodegenError::ClassSkipped { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// A local variable.
#[derive(Copy, Clone)]
struct Slot<V, T> {
    ptr: V,
    ty: T,
}

/// State of the function being generated.
struct Scope<B: Backend> {
    function: B::Function,
    ret: B::Type,
    symbols: HashMap<Box<str>, Slot<B::Value, B::Type>>,
}

impl<B: Backend> Scope<B> {
    fn new(function: B::Function, ret: B::Type) -> Scope<B> {
        Scope {
            function,
            ret,
            symbols: HashMap::new(),
        }
    }
}

struct Types<T> {
    int: T,
    int32: T,
    float: T,
    ptr: T,
}

/// Block labels used by an `if` or `match` chain.
struct ChainLabels {
    test: &'static str,
    body: &'static str,
    default: &'static str,
    end: &'static str,
}

const IF_LABELS: ChainLabels = ChainLabels {
    test: "if.cond",
    body: "if.then",
    default: "if.else",
    end: "if.end",
};

const MATCH_LABELS: ChainLabels = ChainLabels {
    test: "match.test",
    body: "match.case",
    default: "match.default",
    end: "match.end",
};

#[derive(Copy, Clone, PartialEq, Eq)]
enum Operands {
    Int,
    Float,
    Pointer,
}

struct Generator<B: Backend> {
    backend: B,
    types: Types<B::Type>,
    main: B::Function,
    main_entry: B::Block,
    scope: Scope<B>,
    diagnostics: Vec<Diagnostic>,
}

impl<B: Backend> Generator<B> {
    fn new(mut backend: B) -> Generator<B> {
        let types = Types {
            int: backend.int_type(64),
            int32: backend.int_type(32),
            float: backend.float_type(),
            ptr: backend.string_type(),
        };
        backend.declare_extern("printf", Signature::variadic(vec![types.ptr], types.int32));
        let main = backend.add_function("main", Signature::new(vec![], types.int32));
        let entry = backend.append_block(main, "entry");
        backend.position_at_end(entry);
        Generator {
            backend,
            main,
            main_entry: entry,
            scope: Scope::new(main, types.int32),
            types,
            diagnostics: Vec::new(),
        }
    }

    fn generate(&mut self, program: &Program) {
        let mut bodies = Vec::new();
        for decl in &program.declarations {
            match decl {
                Decl::Function(function) => {
                    if let Some(id) = self.declare_function(function) {
                        bodies.push((id, function));
                    }
                }
                Decl::Class(class) => {
                    let name = class.name.clone();
                    self.report(CodegenError::ClassSkipped { name }, class.pos);
                }
                Decl::Import(_) => {}
            }
        }
        for (id, function) in bodies {
            self.g_function(id, function);
        }

        self.scope = Scope::new(self.main, self.types.int32);
        self.backend.position_at_end(self.main_entry);
        self.g_body(&program.statements);
        self.seal();
    }

    fn finish(mut self) -> Compilation<B::Module> {
        if let Err(messages) = self.backend.verify() {
            for message in messages {
                self.diagnostics.push(Diagnostic {
                    severity: Severity::Error,
                    kind: DiagnosticKind::Validation(message),
                    pos: None,
                });
            }
        }
        let success = !self
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error);
        Compilation {
            module: self.backend.finish(),
            diagnostics: self.diagnostics,
            success,
        }
    }

    fn report(&mut self, error: CodegenError, pos: Position) {
        self.diagnostics.push(Diagnostic {
            severity: error.severity(),
            kind: DiagnosticKind::Codegen(error),
            pos: Some(pos),
        });
    }
}

/// Declarations and function bodies.
impl<B: Backend> Generator<B> {
    fn declare_function(&mut self, function: &Function) -> Option<B::Function> {
        let name = &*function.name;
        if self.backend.get_function(name).is_some() || is_runtime_function(name) {
            let name = function.name.clone();
            self.report(CodegenError::DuplicateFunction { name }, function.pos);
            return None;
        }
        if function.is_async {
            let name = function.name.clone();
            self.report(CodegenError::AsyncIgnored { name }, function.pos);
        }
        let params = vec![self.types.int; function.params.len()];
        let signature = Signature::new(params, self.types.int);
        Some(self.backend.add_function(name, signature))
    }

    fn g_function(&mut self, id: B::Function, function: &Function) {
        let entry = self.backend.append_block(id, "entry");
        self.backend.position_at_end(entry);
        self.scope = Scope::new(id, self.types.int);

        for (i, param) in function.params.iter().enumerate() {
            let ptr = self.backend.build_alloca(self.types.int);
            let value = self.backend.param(id, i);
            self.backend.build_store(value, ptr);
            let slot = Slot {
                ptr,
                ty: self.types.int,
            };
            self.scope.symbols.insert(param.clone(), slot);
        }

        self.g_body(&function.body);
        self.seal();
    }

    /// Terminates the current block with a return of the zero value.
    fn seal(&mut self) {
        let current = self.current_block();
        if !self.backend.is_terminated(current) {
            self.g_default_return();
        }
    }

    fn g_default_return(&mut self) {
        let ret = self.scope.ret;
        if self.backend.type_class(ret) == TypeClass::Void {
            self.backend.build_ret_void();
        } else {
            let zero = self.zero(ret);
            self.backend.build_ret(zero);
        }
    }

    fn current_block(&self) -> B::Block {
        self.backend
            .current_block()
            .expect("the generator is always positioned inside a function")
    }

    fn append_block(&mut self, name: &str) -> B::Block {
        self.backend.append_block(self.scope.function, name)
    }

    fn branch_if_open(&mut self, target: B::Block) {
        let current = self.current_block();
        if !self.backend.is_terminated(current) {
            self.backend.build_br(target);
        }
    }
}

/// Statements.
impl<B: Backend> Generator<B> {
    fn g_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.g_stmt(stmt);
        }
    }

    fn g_stmt(&mut self, stmt: &Stmt) {
        // Code after a terminator is unreachable but must still live in a
        // block of its own.
        let current = self.current_block();
        if self.backend.is_terminated(current) {
            let dead = self.append_block("dead");
            self.backend.position_at_end(dead);
        }

        match &stmt.kind {
            StmtKind::Assignment { name, value } => {
                let value = self.g_expr(value);
                self.g_assign(name, value);
            }
            StmtKind::Expression(expr) => {
                self.g_expr(expr);
            }
            StmtKind::Return(value) => self.g_return(value.as_ref()),
            StmtKind::If {
                branches,
                else_body,
            } => {
                let arms: Vec<_> = branches
                    .iter()
                    .map(|branch| (&branch.cond, branch.body.as_slice()))
                    .collect();
                let default = (!else_body.is_empty()).then_some(else_body.as_slice());
                self.g_chain(&IF_LABELS, None, &arms, default);
            }
            StmtKind::While { cond, body } => self.g_while(cond, body),
            StmtKind::For {
                var,
                iterable,
                body,
            } => self.g_for(var, iterable, body),
            StmtKind::Match { value, cases } => self.g_match(value, cases),
        }
    }

    fn g_assign(&mut self, name: &str, value: B::Value) {
        match self.scope.symbols.get(name).copied() {
            Some(slot) => {
                let value = self.coerce(value, slot.ty);
                self.backend.build_store(value, slot.ptr);
            }
            None => {
                let ty = self.backend.type_of(value);
                let ptr = self.backend.build_alloca(ty);
                self.backend.build_store(value, ptr);
                self.scope.symbols.insert(name.into(), Slot { ptr, ty });
            }
        }
    }

    fn g_return(&mut self, value: Option<&Expr>) {
        let Some(expr) = value else {
            self.g_default_return();
            return;
        };
        let value = self.g_expr(expr);
        let ret = self.scope.ret;
        if self.backend.type_class(ret) == TypeClass::Void {
            self.backend.build_ret_void();
        } else {
            let value = self.coerce(value, ret);
            self.backend.build_ret(value);
        }
    }

    /// Lowers a chain of guarded arms, as produced by `if`/`elif`/`else` and
    /// by `match`.
    ///
    /// Every block is created up front in the order `body0, test1, body1, ...,
    /// default, end`. The first test is evaluated in the current block. With a
    /// `subject`, each arm's expression is compared to it for equality;
    /// otherwise it is evaluated as a condition.
    fn g_chain(
        &mut self,
        labels: &ChainLabels,
        subject: Option<B::Value>,
        arms: &[(&Expr, &[Stmt])],
        default: Option<&[Stmt]>,
    ) {
        let mut tests = vec![self.current_block()];
        let mut bodies = Vec::with_capacity(arms.len());
        for i in 0..arms.len() {
            if i > 0 {
                tests.push(self.append_block(labels.test));
            }
            bodies.push(self.append_block(labels.body));
        }
        let default_block = default.map(|_| self.append_block(labels.default));
        let end = self.append_block(labels.end);

        for (i, (guard, body)) in arms.iter().enumerate() {
            self.backend.position_at_end(tests[i]);
            let cond = match subject {
                Some(subject) => {
                    let pattern = self.g_expr(guard);
                    let equal = self.g_compare(BinaryOperator::Eq, subject, pattern, guard.pos);
                    self.truthy(equal)
                }
                None => {
                    let value = self.g_expr(guard);
                    self.truthy(value)
                }
            };
            let next = match tests.get(i + 1) {
                Some(&test) => test,
                None => default_block.unwrap_or(end),
            };
            self.backend.build_cond_br(cond, bodies[i], next);

            self.backend.position_at_end(bodies[i]);
            self.g_body(body);
            self.branch_if_open(end);
        }

        if let (Some(block), Some(body)) = (default_block, default) {
            if arms.is_empty() {
                self.backend.build_br(block);
            }
            self.backend.position_at_end(block);
            self.g_body(body);
            self.branch_if_open(end);
        }
        if arms.is_empty() && default_block.is_none() {
            self.backend.build_br(end);
        }
        self.backend.position_at_end(end);
    }

    /// The first `_` case is the default; cases after it are never reached.
    fn g_match(&mut self, value: &Expr, cases: &[Case]) {
        let subject = self.g_expr(value);
        let mut arms = Vec::with_capacity(cases.len());
        let mut default = None;
        for case in cases {
            if matches!(&case.pattern.kind, ExprKind::Identifier(name) if &**name == "_") {
                default = Some(case.body.as_slice());
                break;
            }
            arms.push((&case.pattern, case.body.as_slice()));
        }
        self.g_chain(&MATCH_LABELS, Some(subject), &arms, default);
    }

    fn g_while(&mut self, cond: &Expr, body: &[Stmt]) {
        let cond_block = self.append_block("while.cond");
        let body_block = self.append_block("while.body");
        let end = self.append_block("while.end");

        self.backend.build_br(cond_block);
        self.backend.position_at_end(cond_block);
        let value = self.g_expr(cond);
        let value = self.truthy(value);
        self.backend.build_cond_br(value, body_block, end);

        self.backend.position_at_end(body_block);
        self.g_body(body);
        self.branch_if_open(cond_block);

        self.backend.position_at_end(end);
    }

    /// Lowers `for var in range(...)` to a counted loop.
    ///
    /// Without an explicit step the loop runs while `var < stop`. With one,
    /// the direction is decided at run time: the loop runs while
    /// `var < stop` for a positive step and while `var > stop` for a
    /// negative one, so a zero step runs no iterations.
    fn g_for(&mut self, var: &str, iterable: &Expr, body: &[Stmt]) {
        let Some(args) = range_arguments(iterable) else {
            self.report(CodegenError::UnsupportedIterable, iterable.pos);
            return;
        };
        let int = self.types.int;
        let mut bounds = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.g_expr(arg);
            bounds.push(self.coerce(value, int));
        }
        let zero = self.backend.const_int(int, 0);
        let (start, stop, step) = match bounds[..] {
            [stop] => (zero, stop, None),
            [start, stop] => (start, stop, None),
            [start, stop, step] => (start, stop, Some(step)),
            _ => unreachable!("`range` arguments are checked above"),
        };

        let ptr = self.int_slot(var);
        self.backend.build_store(start, ptr);

        let cond_block = self.append_block("for.cond");
        let body_block = self.append_block("for.body");
        let step_block = self.append_block("for.step");
        let end = self.append_block("for.end");
        self.backend.build_br(cond_block);

        self.backend.position_at_end(cond_block);
        let current = self.backend.build_load(int, ptr);
        let cond = match step {
            None => self.backend.build_icmp(IntPredicate::Slt, current, stop),
            Some(step) => {
                let ascending = self.backend.build_icmp(IntPredicate::Sgt, step, zero);
                let below = self.backend.build_icmp(IntPredicate::Slt, current, stop);
                let up = self.backend.build_logic(LogicOp::And, ascending, below);
                let descending = self.backend.build_icmp(IntPredicate::Slt, step, zero);
                let above = self.backend.build_icmp(IntPredicate::Sgt, current, stop);
                let down = self.backend.build_logic(LogicOp::And, descending, above);
                self.backend.build_logic(LogicOp::Or, up, down)
            }
        };
        self.backend.build_cond_br(cond, body_block, end);

        self.backend.position_at_end(body_block);
        self.g_body(body);
        self.branch_if_open(step_block);

        self.backend.position_at_end(step_block);
        let current = self.backend.build_load(int, ptr);
        let step = match step {
            Some(step) => step,
            None => self.backend.const_int(int, 1),
        };
        let next = self.backend.build_arith(ArithOp::Add, current, step);
        self.backend.build_store(next, ptr);
        self.backend.build_br(cond_block);

        self.backend.position_at_end(end);
    }

    /// The slot of an integer variable, rebinding `name` if it currently holds
    /// a value of another type.
    fn int_slot(&mut self, name: &str) -> B::Value {
        let int = self.types.int;
        match self.scope.symbols.get(name) {
            Some(slot) if slot.ty == int => slot.ptr,
            _ => {
                let ptr = self.backend.build_alloca(int);
                self.scope.symbols.insert(name.into(), Slot { ptr, ty: int });
                ptr
            }
        }
    }
}

/// Expressions.
impl<B: Backend> Generator<B> {
    fn g_expr(&mut self, expr: &Expr) -> B::Value {
        match &expr.kind {
            ExprKind::Literal(literal) => self.g_literal(literal),
            ExprKind::Identifier(name) => self.g_identifier(name, expr.pos),
            ExprKind::Binary { op, left, right } => {
                let left = self.g_expr(left);
                let right = self.g_expr(right);
                self.g_binary(*op, left, right, expr.pos)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.g_expr(operand);
                self.g_unary(*op, operand, expr.pos)
            }
            ExprKind::Call { callee, args } => self.g_call(callee, args, expr.pos),
            ExprKind::Attribute { .. } => self.unsupported("attribute accesses", expr.pos),
            ExprKind::Subscript { .. } => self.unsupported("subscripts", expr.pos),
            ExprKind::List(_) => self.unsupported("list literals", expr.pos),
            ExprKind::Dict(_) => self.unsupported("dictionary literals", expr.pos),
            ExprKind::Tuple(_) => self.unsupported("tuple literals", expr.pos),
        }
    }

    fn g_literal(&mut self, literal: &Literal) -> B::Value {
        match literal {
            Literal::Int(value) => self.backend.const_int(self.types.int, *value),
            Literal::Float(value) => self.backend.const_float(*value),
            Literal::Bool(value) => self.backend.const_bool(*value),
            Literal::Str(value) => self.backend.const_string(&unescape(value)),
            Literal::None => self.backend.const_int(self.types.int, 0),
        }
    }

    fn g_identifier(&mut self, name: &str, pos: Position) -> B::Value {
        if let Some(slot) = self.scope.symbols.get(name).copied() {
            return self.backend.build_load(slot.ty, slot.ptr);
        }
        if let Some(function) = self.backend.get_function(name) {
            return self.backend.function_value(function);
        }
        self.report(CodegenError::UndefinedName { name: name.into() }, pos);
        self.backend.const_int(self.types.int, 0)
    }

    fn g_binary(
        &mut self,
        op: BinaryOperator,
        left: B::Value,
        right: B::Value,
        pos: Position,
    ) -> B::Value {
        use BinaryOperator::*;
        match op {
            And | Or => {
                let left = self.truthy(left);
                let right = self.truthy(right);
                let op = if op == And { LogicOp::And } else { LogicOp::Or };
                self.backend.build_logic(op, left, right)
            }
            Eq | NotEq | Less | LessEq | Greater | GreaterEq => {
                self.g_compare(op, left, right, pos)
            }
            Pow => self.g_power(left, right, pos),
            FloorDiv => self.g_floor_div(left, right, pos),
            Add | Sub | Mul | Div | Mod => {
                let Some((lhs, rhs, operands)) = self.unify(left, right, true) else {
                    return self.invalid_operands(op, left, right, pos);
                };
                let arith = match (op, operands) {
                    (Add, Operands::Int) => ArithOp::Add,
                    (Sub, Operands::Int) => ArithOp::Sub,
                    (Mul, Operands::Int) => ArithOp::Mul,
                    (Div, Operands::Int) => ArithOp::SDiv,
                    (Mod, Operands::Int) => ArithOp::SRem,
                    (Add, Operands::Float) => ArithOp::FAdd,
                    (Sub, Operands::Float) => ArithOp::FSub,
                    (Mul, Operands::Float) => ArithOp::FMul,
                    (Div, Operands::Float) => ArithOp::FDiv,
                    (Mod, Operands::Float) => ArithOp::FRem,
                    _ => return self.invalid_operands(op, left, right, pos),
                };
                self.backend.build_arith(arith, lhs, rhs)
            }
        }
    }

    fn g_compare(
        &mut self,
        op: BinaryOperator,
        left: B::Value,
        right: B::Value,
        pos: Position,
    ) -> B::Value {
        use BinaryOperator::*;
        let Some((lhs, rhs, operands)) = self.unify(left, right, false) else {
            return self.invalid_operands(op, left, right, pos);
        };
        match operands {
            Operands::Float => {
                let pred = match op {
                    Eq => FloatPredicate::Oeq,
                    NotEq => FloatPredicate::One,
                    Less => FloatPredicate::Olt,
                    LessEq => FloatPredicate::Ole,
                    Greater => FloatPredicate::Ogt,
                    _ => FloatPredicate::Oge,
                };
                self.backend.build_fcmp(pred, lhs, rhs)
            }
            Operands::Pointer if !matches!(op, Eq | NotEq) => {
                self.invalid_operands(op, left, right, pos)
            }
            Operands::Int | Operands::Pointer => {
                let pred = match op {
                    Eq => IntPredicate::Eq,
                    NotEq => IntPredicate::Ne,
                    Less => IntPredicate::Slt,
                    LessEq => IntPredicate::Sle,
                    Greater => IntPredicate::Sgt,
                    _ => IntPredicate::Sge,
                };
                self.backend.build_icmp(pred, lhs, rhs)
            }
        }
    }

    /// `**` is computed in floating point through `pow` and converted back
    /// when both operands are integers.
    fn g_power(&mut self, left: B::Value, right: B::Value, pos: Position) -> B::Value {
        let Some((lhs, rhs, operands)) = self.unify(left, right, true) else {
            return self.invalid_operands(BinaryOperator::Pow, left, right, pos);
        };
        if operands == Operands::Pointer {
            return self.invalid_operands(BinaryOperator::Pow, left, right, pos);
        }
        let float = self.types.float;
        let base = self.coerce(lhs, float);
        let exponent = self.coerce(rhs, float);
        let result = self.call_runtime("pow", &[base, exponent]);
        match operands {
            Operands::Int => self.coerce(result, self.types.int),
            _ => result,
        }
    }

    /// Floor division rounds toward negative infinity. On integers the
    /// truncated quotient is decremented when the remainder is non-zero and
    /// its sign differs from the divisor's.
    fn g_floor_div(&mut self, left: B::Value, right: B::Value, pos: Position) -> B::Value {
        let op = BinaryOperator::FloorDiv;
        match self.unify(left, right, true) {
            Some((lhs, rhs, Operands::Int)) => {
                let int = self.types.int;
                let zero = self.backend.const_int(int, 0);
                let quotient = self.backend.build_arith(ArithOp::SDiv, lhs, rhs);
                let remainder = self.backend.build_arith(ArithOp::SRem, lhs, rhs);
                let inexact = self.backend.build_icmp(IntPredicate::Ne, remainder, zero);
                let remainder_negative =
                    self.backend.build_icmp(IntPredicate::Slt, remainder, zero);
                let divisor_negative = self.backend.build_icmp(IntPredicate::Slt, rhs, zero);
                let signs_differ =
                    self.backend
                        .build_logic(LogicOp::Xor, remainder_negative, divisor_negative);
                let adjust = self.backend.build_logic(LogicOp::And, inexact, signs_differ);
                let adjust = self.backend.build_cast(CastOp::ZExt, adjust, int);
                self.backend.build_arith(ArithOp::Sub, quotient, adjust)
            }
            Some((lhs, rhs, Operands::Float)) => {
                let quotient = self.backend.build_arith(ArithOp::FDiv, lhs, rhs);
                self.call_runtime("floor", &[quotient])
            }
            _ => self.invalid_operands(op, left, right, pos),
        }
    }

    fn g_unary(&mut self, op: UnaryOperator, operand: B::Value, pos: Position) -> B::Value {
        let class = self.class_of(operand);
        match (op, class) {
            (_, TypeClass::Void) | (UnaryOperator::Neg, TypeClass::Pointer) => {
                self.report(CodegenError::InvalidOperand { op, found: class }, pos);
                self.backend.const_int(self.types.int, 0)
            }
            (UnaryOperator::Plus, _) => operand,
            (UnaryOperator::Neg, TypeClass::Int(1)) => {
                let widened = self.coerce(operand, self.types.int);
                self.backend.build_neg(widened)
            }
            (UnaryOperator::Neg, _) => self.backend.build_neg(operand),
            (UnaryOperator::Not, TypeClass::Int(_)) => self.backend.build_not(operand),
            (UnaryOperator::Not, _) => {
                let value = self.truthy(operand);
                self.backend.build_not(value)
            }
        }
    }

    fn g_call(&mut self, callee: &Expr, args: &[Expr], pos: Position) -> B::Value {
        if let ExprKind::Identifier(name) = &callee.kind {
            if !self.scope.symbols.contains_key(name) {
                let function = match self.backend.get_function(name) {
                    Some(function) => Some(function),
                    None => self.runtime_function(name),
                };
                if let Some(function) = function {
                    return self.g_direct_call(name, function, args, pos);
                }
            }
        }

        let target = self.g_expr(callee);
        let found = self.class_of(target);
        if found != TypeClass::Pointer {
            self.report(CodegenError::NotCallable { found }, pos);
            return self.backend.const_int(self.types.int, 0);
        }
        let int = self.types.int;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.g_expr(arg);
            values.push(self.coerce(value, int));
        }
        let signature = Signature::new(vec![int; args.len()], int);
        match self.backend.build_call(target, &signature, &values) {
            Some(value) => value,
            None => self.backend.const_int(int, 0),
        }
    }

    fn g_direct_call(
        &mut self,
        name: &str,
        function: B::Function,
        args: &[Expr],
        pos: Position,
    ) -> B::Value {
        let signature = self.backend.signature(function);
        if !signature.accepts(args.len()) {
            let error = CodegenError::ArityMismatch {
                name: name.into(),
                expected: signature.params.len(),
                found: args.len(),
            };
            self.report(error, pos);
            return self.backend.const_int(self.types.int, 0);
        }

        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let value = self.g_expr(arg);
            let value = match signature.params.get(i) {
                Some(&ty) => self.coerce(value, ty),
                None => self.promote_variadic(value),
            };
            values.push(value);
        }
        let callee = self.backend.function_value(function);
        match self.backend.build_call(callee, &signature, &values) {
            Some(value) => value,
            None => self.backend.const_int(self.types.int, 0),
        }
    }

    /// Calls a function of the C library, declaring it on first use.
    fn call_runtime(&mut self, name: &str, args: &[B::Value]) -> B::Value {
        let Some(function) = self.runtime_function(name) else {
            return self.backend.const_float(0.0);
        };
        let signature = self.backend.signature(function);
        let callee = self.backend.function_value(function);
        match self.backend.build_call(callee, &signature, args) {
            Some(value) => value,
            None => self.backend.const_float(0.0),
        }
    }

    /// The declaration of the runtime function `name`, if there is one.
    fn runtime_function(&mut self, name: &str) -> Option<B::Function> {
        let &(_, arity) = RUNTIME_FUNCTIONS.iter().find(|&&(runtime, _)| runtime == name)?;
        if let Some(function) = self.backend.get_function(name) {
            return Some(function);
        }
        let float = self.types.float;
        let signature = Signature::new(vec![float; arity], float);
        Some(self.backend.declare_extern(name, signature))
    }

    fn unsupported(&mut self, construct: &'static str, pos: Position) -> B::Value {
        self.report(CodegenError::Unsupported { construct }, pos);
        self.backend.const_int(self.types.int, 0)
    }

    fn invalid_operands(
        &mut self,
        op: BinaryOperator,
        left: B::Value,
        right: B::Value,
        pos: Position,
    ) -> B::Value {
        let error = CodegenError::InvalidOperands {
            op,
            left: self.class_of(left),
            right: self.class_of(right),
        };
        self.report(error, pos);
        self.backend.const_int(self.types.int, 0)
    }
}

/// Conversions between value types.
impl<B: Backend> Generator<B> {
    fn class_of(&self, value: B::Value) -> TypeClass {
        self.backend.type_class(self.backend.type_of(value))
    }

    /// Brings both operands of a binary operator to a common type.
    ///
    /// Integers of different widths are widened to the larger one, and to 64
    /// bits for arithmetic. An integer meeting a float is converted to a
    /// float. Pointers only pair with pointers; any other mix is rejected.
    fn unify(
        &mut self,
        left: B::Value,
        right: B::Value,
        arithmetic: bool,
    ) -> Option<(B::Value, B::Value, Operands)> {
        match (self.class_of(left), self.class_of(right)) {
            (TypeClass::Int(a), TypeClass::Int(b)) => {
                let bits = if arithmetic { a.max(b).max(64) } else { a.max(b) };
                let ty = self.backend.int_type(bits);
                let left = self.coerce(left, ty);
                let right = self.coerce(right, ty);
                Some((left, right, Operands::Int))
            }
            (TypeClass::Int(_) | TypeClass::Float, TypeClass::Int(_) | TypeClass::Float) => {
                let float = self.types.float;
                let left = self.coerce(left, float);
                let right = self.coerce(right, float);
                Some((left, right, Operands::Float))
            }
            (TypeClass::Pointer, TypeClass::Pointer) => Some((left, right, Operands::Pointer)),
            _ => None,
        }
    }

    /// Converts `value` to `to`. Booleans are zero-extended and wider
    /// integers sign-extended.
    fn coerce(&mut self, value: B::Value, to: B::Type) -> B::Value {
        let from = self.backend.type_of(value);
        if from == to {
            return value;
        }
        let int = self.types.int;
        match (self.backend.type_class(from), self.backend.type_class(to)) {
            (TypeClass::Int(a), TypeClass::Int(b)) if a < b => {
                let op = if a == 1 { CastOp::ZExt } else { CastOp::SExt };
                self.backend.build_cast(op, value, to)
            }
            (TypeClass::Int(_), TypeClass::Int(_)) => {
                self.backend.build_cast(CastOp::Trunc, value, to)
            }
            (TypeClass::Int(1), TypeClass::Float) => {
                let widened = self.coerce(value, int);
                self.backend.build_cast(CastOp::SiToFp, widened, to)
            }
            (TypeClass::Int(_), TypeClass::Float) => {
                self.backend.build_cast(CastOp::SiToFp, value, to)
            }
            (TypeClass::Float, TypeClass::Int(_)) => {
                self.backend.build_cast(CastOp::FpToSi, value, to)
            }
            (TypeClass::Pointer, TypeClass::Int(_)) => {
                self.backend.build_cast(CastOp::PtrToInt, value, to)
            }
            (TypeClass::Int(_), TypeClass::Pointer) => {
                self.backend.build_cast(CastOp::IntToPtr, value, to)
            }
            (TypeClass::Float, TypeClass::Pointer) => {
                let int_value = self.backend.build_cast(CastOp::FpToSi, value, int);
                self.backend.build_cast(CastOp::IntToPtr, int_value, to)
            }
            (TypeClass::Pointer, TypeClass::Float) => {
                let int_value = self.backend.build_cast(CastOp::PtrToInt, value, int);
                self.backend.build_cast(CastOp::SiToFp, int_value, to)
            }
            (TypeClass::Float, TypeClass::Float)
            | (TypeClass::Pointer, TypeClass::Pointer)
            | (TypeClass::Void, _)
            | (_, TypeClass::Void) => value,
        }
    }

    /// Integers narrower than 32 bits are widened when passed through `...`.
    fn promote_variadic(&mut self, value: B::Value) -> B::Value {
        match self.class_of(value) {
            TypeClass::Int(bits) if bits < 32 => self.coerce(value, self.types.int32),
            _ => value,
        }
    }

    /// Converts a value to a one-bit condition: non-zero, non-null values are
    /// true.
    fn truthy(&mut self, value: B::Value) -> B::Value {
        let ty = self.backend.type_of(value);
        match self.backend.type_class(ty) {
            TypeClass::Int(1) => value,
            TypeClass::Int(_) => {
                let zero = self.backend.const_int(ty, 0);
                self.backend.build_icmp(IntPredicate::Ne, value, zero)
            }
            TypeClass::Float => {
                let zero = self.backend.const_float(0.0);
                self.backend.build_fcmp(FloatPredicate::One, value, zero)
            }
            TypeClass::Pointer => {
                let null = self.backend.const_null();
                self.backend.build_icmp(IntPredicate::Ne, value, null)
            }
            TypeClass::Void => self.backend.const_bool(false),
        }
    }

    fn zero(&mut self, ty: B::Type) -> B::Value {
        match self.backend.type_class(ty) {
            TypeClass::Float => self.backend.const_float(0.0),
            TypeClass::Pointer => self.backend.const_null(),
            TypeClass::Int(_) => self.backend.const_int(ty, 0),
            TypeClass::Void => self.backend.const_int(self.types.int, 0),
        }
    }
}

/// The arguments of `range(...)` with one to three arguments.
fn range_arguments(iterable: &Expr) -> Option<&[Expr]> {
    let ExprKind::Call { callee, args } = &iterable.kind else {
        return None;
    };
    match &callee.kind {
        ExprKind::Identifier(name) if &**name == "range" && (1..=3).contains(&args.len()) => {
            Some(args.as_slice())
        }
        _ => None,
    }
}

/// Decodes the escape sequences kept verbatim by the lexer. Unknown escapes
/// are kept as written.
fn unescape(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('t') => bytes.push(b'\t'),
            Some('r') => bytes.push(b'\r'),
            Some('0') => bytes.push(b'\0'),
            Some('\\') => bytes.push(b'\\'),
            Some('\'') => bytes.push(b'\''),
            Some('"') => bytes.push(b'"'),
            Some(other) => {
                bytes.push(b'\\');
                let mut buf = [0; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{self, Builder, Module},
        lexer::tokenize,
        parser,
    };
    use cranelift_codegen::ir::Opcode;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn compile_source(src: &str) -> Compilation<Module> {
        let tokens = tokenize(src).unwrap();
        let program = parser::parse(&tokens).unwrap();
        let builder = Builder::new("test", Some("x86_64-unknown-linux-gnu")).unwrap();
        compile(&program, builder)
    }

    /// Every block label paired with the labels of its successors.
    fn edges(function: &ir::Function) -> Vec<(String, Vec<String>)> {
        function
            .blocks()
            .iter()
            .map(|info| {
                let successors = info
                    .successors
                    .iter()
                    .map(|&block| function.label(block).to_owned())
                    .collect();
                (info.label.to_string(), successors)
            })
            .collect()
    }

    fn main_edges(src: &str) -> Vec<(String, Vec<String>)> {
        let compilation = compile_source(src);
        assert_eq!(compilation.diagnostics, vec![]);
        edges(compilation.module.function("main").unwrap())
    }

    fn owned(edges: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        edges
            .iter()
            .map(|(label, successors)| {
                let successors = successors.iter().map(|s| s.to_string()).collect();
                (label.to_string(), successors)
            })
            .collect()
    }

    fn messages(src: &str) -> (bool, Vec<String>) {
        let compilation = compile_source(src);
        let messages = compilation
            .diagnostics
            .iter()
            .map(|d| format!("{}: {d}", d.severity))
            .collect();
        (compilation.success, messages)
    }

    #[test]
    fn test_function_and_call() {
        let compilation = compile_source(indoc! {"
            def f(x): return x + 1
            f(2)
        "});
        assert!(compilation.success);
        assert_eq!(compilation.diagnostics, vec![]);

        let text = compilation.module.to_string();
        assert!(text.starts_with(indoc! {"
            ; module 'test'
            ; target x86_64-unknown-linux-gnu
            ; extern printf(ptr, ...) -> i32
        "}));
        assert!(text.contains("function %main() -> i32"));
        assert!(text.contains("function %f(i64) -> i64"));

        let main = compilation.module.function("main").unwrap();
        let calls = main.opcodes().into_iter().filter(|&op| op == Opcode::Call);
        assert_eq!(calls.count(), 1);
        let f = compilation.module.function("f").unwrap();
        assert_eq!(
            f.opcodes(),
            vec![
                Opcode::StackAddr,
                Opcode::Store,
                Opcode::Load,
                Opcode::Iconst,
                Opcode::Iadd,
                Opcode::Return,
            ]
        );
    }

    #[test]
    fn test_if_else() {
        let src = indoc! {"
            x = 1
            if x < 2:
                x = 3
            else:
                x = 4
        "};
        assert_eq!(
            main_edges(src),
            owned(&[
                ("entry", &["if.then", "if.else"]),
                ("if.then", &["if.end"]),
                ("if.else", &["if.end"]),
                ("if.end", &[]),
            ])
        );
    }

    #[test]
    fn test_elif_without_else() {
        let src = indoc! {"
            x = 1
            if x == 1:
                x = 2
            elif x == 2:
                x = 3
        "};
        assert_eq!(
            main_edges(src),
            owned(&[
                ("entry", &["if.then", "if.cond"]),
                ("if.then", &["if.end"]),
                ("if.cond", &["if.then1", "if.end"]),
                ("if.then1", &["if.end"]),
                ("if.end", &[]),
            ])
        );
    }

    #[test]
    fn test_while() {
        let src = indoc! {"
            i = 0
            while i < 3:
                i = i + 1
        "};
        assert_eq!(
            main_edges(src),
            owned(&[
                ("entry", &["while.cond"]),
                ("while.cond", &["while.body", "while.end"]),
                ("while.body", &["while.cond"]),
                ("while.end", &[]),
            ])
        );
    }

    #[test]
    fn test_for_range() {
        let src = indoc! {r#"
            for i in range(3):
                printf("%ld\n", i)
        "#};
        assert_eq!(
            main_edges(src),
            owned(&[
                ("entry", &["for.cond"]),
                ("for.cond", &["for.body", "for.end"]),
                ("for.body", &["for.step"]),
                ("for.step", &["for.cond"]),
                ("for.end", &[]),
            ])
        );
    }

    #[test]
    fn test_for_range_with_step_checks_direction() {
        let compilation = compile_source(indoc! {"
            total = 0
            for i in range(10, 0, -2):
                total = total + i
        "});
        assert!(compilation.success);
        let main = compilation.module.function("main").unwrap();
        let cond = main.block_by_label("for.cond").unwrap();
        let logic: Vec<_> = main
            .opcodes_in(cond.block)
            .into_iter()
            .filter(|op| matches!(op, Opcode::Band | Opcode::Bor))
            .collect();
        assert_eq!(logic, vec![Opcode::Band, Opcode::Band, Opcode::Bor]);
    }

    #[test]
    fn test_match() {
        let src = indoc! {"
            x = 2
            match x:
                1: y = 10
                2: y = 20
                _: y = 0
        "};
        assert_eq!(
            main_edges(src),
            owned(&[
                ("entry", &["match.case", "match.test"]),
                ("match.case", &["match.end"]),
                ("match.test", &["match.case1", "match.default"]),
                ("match.case1", &["match.end"]),
                ("match.default", &["match.end"]),
                ("match.end", &[]),
            ])
        );
    }

    #[test]
    fn test_code_after_return() {
        let compilation = compile_source(indoc! {"
            def f():
                return 1
                x = 2
        "});
        assert!(compilation.success);
        let f = compilation.module.function("f").unwrap();
        let labels: Vec<_> = f.blocks().iter().map(|b| &*b.label).collect();
        assert_eq!(labels, vec!["entry", "dead"]);
        assert!(f.blocks().iter().all(|b| b.terminated));
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_float() {
        let compilation = compile_source("x = 1 + 2.5\n");
        assert!(compilation.success);
        let opcodes = compilation.module.function("main").unwrap().opcodes();
        assert!(opcodes.contains(&Opcode::FcvtFromSint));
        assert!(opcodes.contains(&Opcode::Fadd));
    }

    #[test]
    fn test_runtime_functions_are_declared_on_use() {
        let compilation = compile_source(indoc! {"
            a = 7 // 2
            b = 2 ** 3
            c = 7.5 // 2.0
        "});
        assert!(compilation.success);
        let module = &compilation.module;
        assert!(module.function("pow").unwrap().is_extern);
        assert!(module.function("floor").unwrap().is_extern);
        let b = compile_source("a = 7 // 2\n");
        assert!(b.module.function("floor").is_none());
    }

    #[test]
    fn test_runtime_functions_can_be_called_directly() {
        let compilation = compile_source(indoc! {"
            x = pow(2.0, 10)
            y = floor(x / 3.0)
            z = fmod(y, 7.0)
        "});
        assert_eq!(compilation.diagnostics, vec![]);
        let module = &compilation.module;
        for &(name, arity) in RUNTIME_FUNCTIONS {
            let function = module.function(name).unwrap();
            assert!(function.is_extern, "{name}");
            assert_eq!(function.signature.params.len(), arity, "{name}");
        }
        let main = module.function("main").unwrap();
        let calls = main.opcodes().into_iter().filter(|&op| op == Opcode::Call);
        assert_eq!(calls.count(), 3);
        assert!(module.verify().is_ok());

        assert_eq!(
            messages("floor(1.0, 2.0)\n"),
            (
                false,
                vec!["error: 1:1: `floor` takes 1 arguments, but 2 were given".to_owned()]
            )
        );
    }

    #[test]
    fn test_float_remainder_calls_fmod() {
        let compilation = compile_source("x = 7.5 % 2\n");
        assert!(compilation.success);
        let module = &compilation.module;
        assert!(module.function("fmod").unwrap().is_extern);
        let opcodes = module.function("main").unwrap().opcodes();
        assert!(opcodes.contains(&Opcode::Call));
        assert!(!opcodes.contains(&Opcode::Srem));
        assert!(compile_source("x = 7 % 2\n").module.function("fmod").is_none());
    }

    #[test]
    fn test_string_escapes() {
        let compilation = compile_source("printf(\"a\\tb\\n\")\n");
        assert!(compilation.success);
        assert_eq!(&*compilation.module.strings()[0], b"a\tb\n\0");
        assert!(compilation.module.to_string().contains("; data0 = \"a\\tb\\n\\x00\""));
    }

    #[test]
    fn test_warnings() {
        assert_eq!(
            messages(indoc! {"
                async def g(): return 1
                class C:
                    import m
                x = y + 1
            "}),
            (
                true,
                vec![
                    "warning: 1:1: `async` on function `g` is ignored".to_owned(),
                    "warning: 2:1: class `C` is skipped".to_owned(),
                    "warning: 4:5: undefined name `y`".to_owned(),
                ]
            )
        );
    }

    #[test]
    fn test_errors() {
        let cases = [
            ("[1, 2]\n", "error: 1:1: list literals are not supported"),
            ("x = 1\nx()\n", "error: 2:1: value of type i64 is not callable"),
            (
                "x = \"a\" + 1\n",
                "error: 1:5: invalid operands to `+`: ptr and i64",
            ),
            (
                "def f(x): return x\nf(1, 2)\n",
                "error: 2:1: `f` takes 1 arguments, but 2 were given",
            ),
            (
                "def main(): return 0\n",
                "error: 1:1: function `main` is already defined",
            ),
            (
                "def fmod(a, b): return a\n",
                "error: 1:1: function `fmod` is already defined",
            ),
            (
                "for i in 5:\n    i\n",
                "error: 1:10: `for` loops can only iterate over `range` with one to three arguments",
            ),
            ("x = -\"s\"\n", "error: 1:5: invalid operand to `-`: ptr"),
        ];
        for (src, expected) in cases {
            assert_eq!(messages(src), (false, vec![expected.to_owned()]), "{src}");
        }
    }

    #[test]
    fn test_module_stays_valid_after_errors() {
        let compilation = compile_source(indoc! {"
            def f(x):
                if x.y:
                    return [x]
                return x
            f(1, 2, 3)
        "});
        assert!(!compilation.success);
        assert_eq!(compilation.module.verify(), Ok(()));
        assert!(compilation
            .errors()
            .all(|d| matches!(d.kind, DiagnosticKind::Codegen(_))));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"a\n\t\\\"\q"#), b"a\n\t\\\"\\q".to_vec());
    }
}
