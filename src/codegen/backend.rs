//! The capability the code generator lowers programs through.
//!
//! The generator never inspects the IR it builds: it only creates types,
//! constants, functions, blocks and instructions through [`Backend`], so any
//! SSA IR with basic blocks and explicit branches can implement it. The
//! crate's own implementation is [`crate::ir::Builder`], over Cranelift.

use std::fmt;

pub trait Backend {
    type Type: Copy + PartialEq + fmt::Debug;
    type Value: Copy + fmt::Debug;
    type Function: Copy + PartialEq + fmt::Debug;
    type Block: Copy + PartialEq + fmt::Debug;
    type Module;

    // Types

    fn int_type(&mut self, bits: u32) -> Self::Type;
    fn float_type(&mut self) -> Self::Type;
    /// The one-bit integer produced by comparisons.
    fn bool_type(&mut self) -> Self::Type;
    /// The type of string constants (a pointer to their first byte).
    fn string_type(&mut self) -> Self::Type;
    fn void_type(&mut self) -> Self::Type;
    fn pointer_type(&mut self) -> Self::Type;

    fn type_of(&self, value: Self::Value) -> Self::Type;
    fn type_class(&self, ty: Self::Type) -> TypeClass;

    // Constants

    fn const_int(&mut self, ty: Self::Type, value: i64) -> Self::Value;
    fn const_float(&mut self, value: f64) -> Self::Value;
    fn const_bool(&mut self, value: bool) -> Self::Value;
    /// Creates a global, NUL-terminated copy of `value` and returns a pointer
    /// to it.
    fn const_string(&mut self, value: &[u8]) -> Self::Value;
    fn const_null(&mut self) -> Self::Value;

    // Functions and blocks

    /// Adds a function with a body. The body starts without blocks.
    fn add_function(&mut self, name: &str, signature: Signature<Self::Type>) -> Self::Function;
    /// Declares a function defined outside of the module.
    fn declare_extern(&mut self, name: &str, signature: Signature<Self::Type>)
        -> Self::Function;
    fn get_function(&self, name: &str) -> Option<Self::Function>;
    /// Returns a pointer to the function, usable as a callee or a value.
    fn function_value(&mut self, function: Self::Function) -> Self::Value;
    fn signature(&self, function: Self::Function) -> Signature<Self::Type>;
    /// The `index`th parameter, creating the entry block if the function has
    /// no block yet.
    fn param(&mut self, function: Self::Function, index: usize) -> Self::Value;

    /// Appends a block to the function. The first block is the entry. Labels
    /// are made unique within the function, so the same name may be
    /// requested many times.
    fn append_block(&mut self, function: Self::Function, name: &str) -> Self::Block;
    fn position_at_end(&mut self, block: Self::Block);
    fn current_block(&self) -> Option<Self::Block>;
    /// Whether the block already ends with a terminator.
    fn is_terminated(&self, block: Self::Block) -> bool;

    // Instructions (inserted at the end of the current block, which must
    // not be terminated yet)

    fn build_arith(&mut self, op: ArithOp, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn build_icmp(&mut self, pred: IntPredicate, lhs: Self::Value, rhs: Self::Value)
        -> Self::Value;
    fn build_fcmp(
        &mut self,
        pred: FloatPredicate,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> Self::Value;
    fn build_logic(&mut self, op: LogicOp, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn build_neg(&mut self, value: Self::Value) -> Self::Value;
    /// Bitwise complement.
    fn build_not(&mut self, value: Self::Value) -> Self::Value;
    fn build_cast(&mut self, op: CastOp, value: Self::Value, to: Self::Type) -> Self::Value;
    /// Allocates a stack slot in the current function and returns its
    /// address. The address is usable from every block of the function.
    fn build_alloca(&mut self, ty: Self::Type) -> Self::Value;
    fn build_load(&mut self, ty: Self::Type, ptr: Self::Value) -> Self::Value;
    fn build_store(&mut self, value: Self::Value, ptr: Self::Value);
    /// Returns `None` for calls to functions returning void.
    fn build_call(
        &mut self,
        callee: Self::Value,
        signature: &Signature<Self::Type>,
        args: &[Self::Value],
    ) -> Option<Self::Value>;
    fn build_br(&mut self, target: Self::Block);
    fn build_cond_br(&mut self, cond: Self::Value, then: Self::Block, otherwise: Self::Block);
    fn build_ret(&mut self, value: Self::Value);
    fn build_ret_void(&mut self);

    // Module

    /// Checks the structural and type rules of the module built so far,
    /// returning one message per violation.
    fn verify(&self) -> Result<(), Vec<String>>;
    fn finish(self) -> Self::Module;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signature<T> {
    pub params: Vec<T>,
    pub ret: T,
    /// Accepts any number of extra arguments after `params`.
    pub variadic: bool,
}

impl<T> Signature<T> {
    pub fn new(params: Vec<T>, ret: T) -> Signature<T> {
        Signature {
            params,
            ret,
            variadic: false,
        }
    }

    pub fn variadic(params: Vec<T>, ret: T) -> Signature<T> {
        Signature {
            params,
            ret,
            variadic: true,
        }
    }

    /// Whether a call with `count` arguments matches this signature.
    pub fn accepts(&self, count: usize) -> bool {
        if self.variadic {
            count >= self.params.len()
        } else {
            count == self.params.len()
        }
    }
}

/// Backend-independent description of a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeClass {
    Int(u32),
    Float,
    Pointer,
    Void,
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeClass::Int(bits) => write!(f, "i{bits}"),
            TypeClass::Float => f.write_str("f64"),
            TypeClass::Pointer => f.write_str("ptr"),
            TypeClass::Void => f.write_str("void"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

/// Ordered predicates: comparisons involving NaN are false.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FloatPredicate {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CastOp {
    ZExt,
    SExt,
    Trunc,
    SiToFp,
    FpToSi,
    PtrToInt,
    IntToPtr,
}
