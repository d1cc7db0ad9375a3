//! The default backend: Cranelift IR, written into an object file.
//!
//! [`Builder`] implements [`Backend`] over `cranelift_codegen` functions and a
//! `cranelift_object` module. Function bodies are kept as Cranelift IR until
//! [`Module::emit_object`] compiles them, so a [`Module`] can be printed as
//! CLIF text and checked with Cranelift's verifier first.
//!
//! Cranelift has no pointer or boolean types. Every [`Value`] carries the
//! [`Type`] the generator gave it, and the builder picks the machine type
//! (`i8` for booleans, the target's pointer width for pointers).
//!
//! [`Backend`]: crate::codegen::backend::Backend

use std::{collections::HashMap, fmt};

use cranelift_codegen::{
    entity::EntityRef,
    ir::{self as clif, types, Opcode},
    Context,
};
use cranelift_module::{DataId, FuncId, Module as _, ModuleError};
use cranelift_object::ObjectModule;

use crate::codegen::backend::TypeClass;

mod builder;

pub use builder::Builder;

pub type Signature = crate::codegen::backend::Signature<Type>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int(u32),
    Float,
    Ptr,
    Void,
}

impl Type {
    pub const BOOL: Type = Type::Int(1);

    pub fn class(self) -> TypeClass {
        match self {
            Type::Int(bits) => TypeClass::Int(bits),
            Type::Float => TypeClass::Float,
            Type::Ptr => TypeClass::Pointer,
            Type::Void => TypeClass::Void,
        }
    }

    /// The Cranelift type holding values of this type.
    fn machine(self, pointer: clif::Type) -> clif::Type {
        match self {
            Type::Int(0..=8) => types::I8,
            Type::Int(9..=16) => types::I16,
            Type::Int(17..=32) => types::I32,
            Type::Int(_) | Type::Void => types::I64,
            Type::Float => types::F64,
            Type::Ptr => pointer,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.class(), f)
    }
}

/// Index of a function in its module.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionId(u32);

impl FunctionId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub function: FunctionId,
    pub block: clif::Block,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Value {
    repr: Repr,
    ty: Type,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Repr {
    Ssa(clif::Value),
    /// A function used as a value. Its address is only materialized when
    /// the value is used as anything but the callee of a direct call.
    Function(FunctionId),
}

impl Value {
    fn ssa(value: clif::Value, ty: Type) -> Value {
        Value {
            repr: Repr::Ssa(value),
            ty,
        }
    }

    pub fn ty(self) -> Type {
        self.ty
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported target `{triple}`: {message}")]
    Target { triple: Box<str>, message: String },

    #[error("invalid code generator setting: {0}")]
    Setting(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("function `{name}` has no declaration")]
    Undeclared { name: Box<str> },

    #[error("failed to compile function `{name}`")]
    Define {
        name: Box<str>,
        #[source]
        source: ModuleError,
    },

    #[error("failed to write the object file: {0}")]
    Emit(String),
}

pub struct Function {
    pub name: Box<str>,
    pub signature: Signature,
    pub is_extern: bool,
    /// Absent if the object module rejected the declaration.
    id: Option<FuncId>,
    func: clif::Function,
    blocks: Vec<BlockInfo>,
    /// Every label handed out, and every requested one, mapped to the next
    /// suffix to try for it.
    label_suffixes: HashMap<Box<str>, u32>,
    imported_functions: HashMap<FuncId, clif::FuncRef>,
    imported_data: HashMap<DataId, clif::GlobalValue>,
}

impl Function {
    /// The Cranelift IR of the function. Empty for externs.
    pub fn clif(&self) -> &clif::Function {
        &self.func
    }

    /// Blocks in layout order.
    pub fn blocks(&self) -> &[BlockInfo] {
        &self.blocks
    }

    pub fn block_by_label(&self, label: &str) -> Option<&BlockInfo> {
        self.blocks.iter().find(|b| &*b.label == label)
    }

    pub fn label(&self, block: clif::Block) -> &str {
        &self.blocks[block.index()].label
    }

    /// Opcodes of the instructions of `block`, in order.
    pub fn opcodes_in(&self, block: clif::Block) -> Vec<Opcode> {
        self.func
            .layout
            .block_insts(block)
            .map(|inst| self.func.dfg.insts[inst].opcode())
            .collect()
    }

    pub fn opcodes(&self) -> Vec<Opcode> {
        self.blocks
            .iter()
            .flat_map(|info| self.opcodes_in(info.block))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct BlockInfo {
    pub block: clif::Block,
    /// Unique within the function.
    pub label: Box<str>,
    pub successors: Vec<clif::Block>,
    pub terminated: bool,
}

/// A finished module: verified-or-not Cranelift IR plus the string data
/// already written to the object.
pub struct Module {
    name: Box<str>,
    object: ObjectModule,
    functions: Vec<Function>,
    strings: Vec<Box<[u8]>>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triple(&self) -> String {
        self.object.isa().triple().to_string()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| &*f.name == name)
    }

    /// Functions with a body, in definition order.
    pub fn defined_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| !f.is_extern)
    }

    /// String constants, NUL terminator included.
    pub fn strings(&self) -> &[Box<[u8]>] {
        &self.strings
    }

    /// Runs Cranelift's verifier over every defined function.
    pub fn verify(&self) -> Result<(), Vec<String>> {
        verify_functions(&self.object, &self.functions)
    }

    /// Compiles every function for the module's target and returns the
    /// object file.
    pub fn emit_object(self) -> Result<Vec<u8>, Error> {
        let Module {
            mut object,
            functions,
            ..
        } = self;
        for function in functions.into_iter().filter(|f| !f.is_extern) {
            let Some(id) = function.id else {
                return Err(Error::Undeclared {
                    name: function.name,
                });
            };
            let mut context = Context::for_function(function.func);
            object
                .define_function(id, &mut context)
                .map_err(|source| Error::Define {
                    name: function.name,
                    source,
                })?;
        }
        object
            .finish()
            .emit()
            .map_err(|error| Error::Emit(error.to_string()))
    }
}

fn verify_functions(object: &ObjectModule, functions: &[Function]) -> Result<(), Vec<String>> {
    let mut messages = Vec::new();
    for function in functions.iter().filter(|f| !f.is_extern) {
        if let Err(errors) = cranelift_codegen::verify_function(&function.func, object.isa()) {
            messages.extend(
                errors
                    .0
                    .iter()
                    .map(|error| format!("in function `{}`: {error}", function.name)),
            );
        }
    }
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("triple", &self.triple())
            .field("functions", &self.functions.len())
            .field("strings", &self.strings.len())
            .finish_non_exhaustive()
    }
}

/// CLIF text of every defined function, preceded by comments listing the
/// target, the string data, the externs and the block labels.
impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module '{}'", self.name)?;
        writeln!(f, "; target {}", self.triple())?;
        for (i, bytes) in self.strings.iter().enumerate() {
            writeln!(f, "; data{i} = \"{}\"", bytes.escape_ascii())?;
        }
        for function in self.functions.iter().filter(|f| f.is_extern) {
            write!(f, "; extern {}(", function.name)?;
            let signature = &function.signature;
            for (i, param) in signature.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{param}")?;
            }
            if signature.variadic {
                f.write_str(", ...")?;
            }
            writeln!(f, ") -> {}", signature.ret)?;
        }
        for function in self.defined_functions() {
            writeln!(f)?;
            f.write_str(";")?;
            for info in &function.blocks {
                write!(f, " {}={}", info.block, info.label)?;
            }
            writeln!(f)?;
            write!(f, "{}", function.func.display())?;
        }
        Ok(())
    }
}
