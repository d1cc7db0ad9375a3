use std::collections::HashMap;

use cranelift_codegen::{
    cursor::{Cursor, FuncCursor},
    entity::EntityRef,
    ir::{
        self as clif, condcodes::FloatCC, condcodes::IntCC, AbiParam, InstBuilder,
        MemFlags, StackSlotData, StackSlotKind, UserFuncName,
    },
    isa,
    settings::{self, Configurable},
};
use cranelift_module::{DataDescription, DataId, Linkage, Module as _};
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::{
    codegen::backend::{
        ArithOp, Backend, CastOp, FloatPredicate, IntPredicate, LogicOp, TypeClass,
    },
    ir::{
        verify_functions, BlockInfo, BlockRef, Error, Function, FunctionId, Module, Repr,
        Signature, Type, Value,
    },
};

/// Builds a [`Module`] through the [`Backend`] interface.
///
/// Instructions are appended to the end of the block the builder is
/// positioned at. Stack slots are addressed from the top of the entry block
/// so that their addresses dominate every use.
pub struct Builder {
    name: Box<str>,
    object: ObjectModule,
    pointer: clif::Type,
    functions: Vec<Function>,
    by_name: HashMap<Box<str>, FunctionId>,
    strings: Vec<Box<[u8]>>,
    string_ids: HashMap<Box<[u8]>, DataId>,
    position: Option<BlockRef>,
    /// Declarations the object module rejected.
    errors: Vec<String>,
}

impl Builder {
    /// Creates a builder for `triple`, or for the host when it is `None`.
    pub fn new(module_name: &str, triple: Option<&str>) -> Result<Builder, Error> {
        let mut flags = settings::builder();
        flags
            .set("is_pic", "true")
            .map_err(|error| Error::Setting(error.to_string()))?;
        let target_error = |message: String| Error::Target {
            triple: triple.unwrap_or("host").into(),
            message,
        };
        let isa_builder = match triple {
            Some(triple) => {
                isa::lookup_by_name(triple).map_err(|error| target_error(error.to_string()))?
            }
            None => cranelift_native::builder().map_err(|message| target_error(message.into()))?,
        };
        let isa = isa_builder
            .finish(settings::Flags::new(flags))
            .map_err(|error| target_error(error.to_string()))?;
        let pointer = isa.pointer_type();
        let object = ObjectBuilder::new(isa, module_name, cranelift_module::default_libcall_names())?;

        Ok(Builder {
            name: module_name.into(),
            object: ObjectModule::new(object),
            pointer,
            functions: Vec::new(),
            by_name: HashMap::new(),
            strings: Vec::new(),
            string_ids: HashMap::new(),
            position: None,
            errors: Vec::new(),
        })
    }

    fn position(&self) -> BlockRef {
        self.position
            .expect("builder must be positioned at a block before building instructions")
    }

    fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    fn block_info(&mut self, block: BlockRef) -> &mut BlockInfo {
        &mut self.function_mut(block.function).blocks[block.block.index()]
    }

    /// A cursor at the end of the current block.
    fn cursor(&mut self) -> FuncCursor<'_> {
        let BlockRef { function, block } = self.position();
        FuncCursor::new(&mut self.function_mut(function).func).at_bottom(block)
    }

    fn machine(&self, ty: Type) -> clif::Type {
        ty.machine(self.pointer)
    }

    fn clif_signature(&self, signature: &Signature) -> clif::Signature {
        let mut sig = self.object.make_signature();
        for &param in &signature.params {
            sig.params.push(AbiParam::new(self.machine(param)));
        }
        if signature.ret != Type::Void {
            sig.returns.push(AbiParam::new(self.machine(signature.ret)));
        }
        sig
    }

    fn declare(&mut self, name: &str, signature: Signature, is_extern: bool) -> FunctionId {
        let sig = self.clif_signature(&signature);
        let linkage = if is_extern {
            Linkage::Import
        } else {
            Linkage::Export
        };
        let id = match self.object.declare_function(name, linkage, &sig) {
            Ok(id) => Some(id),
            Err(error) => {
                self.errors.push(error.to_string());
                None
            }
        };
        let index = FunctionId(u32::try_from(self.functions.len()).unwrap_or(u32::MAX));
        self.functions.push(Function {
            name: name.into(),
            signature,
            is_extern,
            id,
            func: clif::Function::with_name_signature(UserFuncName::testcase(name), sig),
            blocks: Vec::new(),
            label_suffixes: HashMap::new(),
            imported_functions: HashMap::new(),
            imported_data: HashMap::new(),
        });
        self.by_name.insert(name.into(), index);
        index
    }

    /// Makes `callee` referable from the function being built.
    fn func_ref(&mut self, callee: FunctionId) -> Option<clif::FuncRef> {
        let id = self.functions[callee.index()].id?;
        let current = self.position().function;
        let function = &mut self.functions[current.index()];
        if let Some(&func_ref) = function.imported_functions.get(&id) {
            return Some(func_ref);
        }
        let func_ref = self.object.declare_func_in_func(id, &mut function.func);
        function.imported_functions.insert(id, func_ref);
        Some(func_ref)
    }

    fn global_value(&mut self, data: DataId) -> clif::GlobalValue {
        let current = self.position().function;
        let function = &mut self.functions[current.index()];
        if let Some(&global) = function.imported_data.get(&data) {
            return global;
        }
        let global = self.object.declare_data_in_func(data, &mut function.func);
        function.imported_data.insert(data, global);
        global
    }

    /// Returns the data object holding `bytes`, defining it on first use.
    fn string_data(&mut self, bytes: Vec<u8>) -> Option<DataId> {
        if let Some(&id) = self.string_ids.get(bytes.as_slice()) {
            return Some(id);
        }
        let bytes = bytes.into_boxed_slice();
        let mut description = DataDescription::new();
        description.define(bytes.clone());
        let defined = self
            .object
            .declare_anonymous_data(false, false)
            .and_then(|id| self.object.define_data(id, &description).map(|()| id));
        match defined {
            Ok(id) => {
                self.strings.push(bytes.clone());
                self.string_ids.insert(bytes, id);
                Some(id)
            }
            Err(error) => {
                self.errors.push(error.to_string());
                None
            }
        }
    }

    /// The Cranelift value of `value`, materializing function addresses.
    fn raw(&mut self, value: Value) -> clif::Value {
        match value.repr {
            Repr::Ssa(raw) => raw,
            Repr::Function(function) => {
                let pointer = self.pointer;
                match self.func_ref(function) {
                    Some(func_ref) => self.cursor().ins().func_addr(pointer, func_ref),
                    None => self.cursor().ins().iconst(pointer, 0),
                }
            }
        }
    }

    fn value_type(&self, raw: clif::Value) -> clif::Type {
        let current = self.position().function;
        self.functions[current.index()].func.dfg.value_type(raw)
    }

    /// Calls `fmod`, which stands in for the missing floating point
    /// remainder instruction.
    fn fmod(&mut self, lhs: Value, rhs: Value) -> Value {
        let function = match self.get_function("fmod") {
            Some(function) => function,
            None => {
                let signature = Signature::new(vec![Type::Float, Type::Float], Type::Float);
                self.declare("fmod", signature, true)
            }
        };
        let callee = self.function_value(function);
        let signature = self.signature(function);
        self.build_call(callee, &signature, &[lhs, rhs])
            .unwrap_or(lhs)
    }

    fn terminate(&mut self, successors: Vec<clif::Block>) {
        let info = self.block_info(self.position());
        info.terminated = true;
        info.successors = successors;
    }
}

/// Returns `name`, or `name` followed by the smallest suffix not handed out
/// yet. Every label returned is recorded in `suffixes`.
fn unique_label(suffixes: &mut HashMap<Box<str>, u32>, name: &str) -> Box<str> {
    let mut next = suffixes.get(name).copied().unwrap_or(0);
    loop {
        let candidate: Box<str> = match next {
            0 => name.into(),
            n => format!("{name}{n}").into(),
        };
        next += 1;
        if !suffixes.contains_key(&candidate) {
            suffixes.insert(name.into(), next);
            suffixes.entry(candidate.clone()).or_insert(1);
            return candidate;
        }
    }
}

impl Backend for Builder {
    type Type = Type;
    type Value = Value;
    type Function = FunctionId;
    type Block = BlockRef;
    type Module = Module;

    fn int_type(&mut self, bits: u32) -> Type {
        Type::Int(bits)
    }

    fn float_type(&mut self) -> Type {
        Type::Float
    }

    fn bool_type(&mut self) -> Type {
        Type::BOOL
    }

    fn string_type(&mut self) -> Type {
        Type::Ptr
    }

    fn void_type(&mut self) -> Type {
        Type::Void
    }

    fn pointer_type(&mut self) -> Type {
        Type::Ptr
    }

    fn type_of(&self, value: Value) -> Type {
        value.ty
    }

    fn type_class(&self, ty: Type) -> TypeClass {
        ty.class()
    }

    fn const_int(&mut self, ty: Type, value: i64) -> Value {
        let machine = self.machine(ty);
        let value = if ty == Type::BOOL { value & 1 } else { value };
        // Immediates of narrow types must be zero-extended.
        let bits = machine.bits();
        let imm = if bits < 64 {
            value & ((1_i64 << bits) - 1)
        } else {
            value
        };
        let raw = self.cursor().ins().iconst(machine, imm);
        Value::ssa(raw, ty)
    }

    fn const_float(&mut self, value: f64) -> Value {
        let raw = self.cursor().ins().f64const(value);
        Value::ssa(raw, Type::Float)
    }

    fn const_bool(&mut self, value: bool) -> Value {
        self.const_int(Type::BOOL, i64::from(value))
    }

    fn const_string(&mut self, value: &[u8]) -> Value {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value);
        bytes.push(0);
        let Some(data) = self.string_data(bytes) else {
            return self.const_null();
        };
        let global = self.global_value(data);
        let pointer = self.pointer;
        let raw = self.cursor().ins().global_value(pointer, global);
        Value::ssa(raw, Type::Ptr)
    }

    fn const_null(&mut self) -> Value {
        self.const_int(Type::Ptr, 0)
    }

    fn add_function(&mut self, name: &str, signature: Signature) -> FunctionId {
        self.declare(name, signature, false)
    }

    fn declare_extern(&mut self, name: &str, signature: Signature) -> FunctionId {
        self.declare(name, signature, true)
    }

    fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).copied()
    }

    fn function_value(&mut self, function: FunctionId) -> Value {
        Value {
            repr: Repr::Function(function),
            ty: Type::Ptr,
        }
    }

    fn signature(&self, function: FunctionId) -> Signature {
        self.functions[function.index()].signature.clone()
    }

    fn param(&mut self, function: FunctionId, index: usize) -> Value {
        let entry = match self.functions[function.index()].func.layout.entry_block() {
            Some(entry) => entry,
            None => self.append_block(function, "entry").block,
        };
        let function = &self.functions[function.index()];
        let raw = function.func.dfg.block_params(entry)[index];
        Value::ssa(raw, function.signature.params[index])
    }

    fn append_block(&mut self, function: FunctionId, name: &str) -> BlockRef {
        let function_data = self.function_mut(function);
        let func = &mut function_data.func;
        let block = func.dfg.make_block();
        if func.layout.entry_block().is_none() {
            let params: Vec<_> = func.signature.params.iter().map(|p| p.value_type).collect();
            for ty in params {
                func.dfg.append_block_param(block, ty);
            }
        }
        func.layout.append_block(block);

        let label = unique_label(&mut function_data.label_suffixes, name);
        function_data.blocks.push(BlockInfo {
            block,
            label,
            successors: Vec::new(),
            terminated: false,
        });
        BlockRef { function, block }
    }

    fn position_at_end(&mut self, block: BlockRef) {
        self.position = Some(block);
    }

    fn current_block(&self) -> Option<BlockRef> {
        self.position
    }

    fn is_terminated(&self, block: BlockRef) -> bool {
        self.functions[block.function.index()].blocks[block.block.index()].terminated
    }

    fn build_arith(&mut self, op: ArithOp, lhs: Value, rhs: Value) -> Value {
        if op == ArithOp::FRem {
            return self.fmod(lhs, rhs);
        }
        let (a, b) = (self.raw(lhs), self.raw(rhs));
        let mut cursor = self.cursor();
        let ins = cursor.ins();
        let raw = match op {
            ArithOp::Add => ins.iadd(a, b),
            ArithOp::Sub => ins.isub(a, b),
            ArithOp::Mul => ins.imul(a, b),
            ArithOp::SDiv => ins.sdiv(a, b),
            ArithOp::SRem => ins.srem(a, b),
            ArithOp::FAdd => ins.fadd(a, b),
            ArithOp::FSub => ins.fsub(a, b),
            ArithOp::FMul => ins.fmul(a, b),
            ArithOp::FDiv => ins.fdiv(a, b),
            ArithOp::FRem => unreachable!("float remainder calls `fmod`"),
        };
        Value::ssa(raw, lhs.ty)
    }

    fn build_icmp(&mut self, pred: IntPredicate, lhs: Value, rhs: Value) -> Value {
        let cc = match pred {
            IntPredicate::Eq => IntCC::Equal,
            IntPredicate::Ne => IntCC::NotEqual,
            IntPredicate::Slt => IntCC::SignedLessThan,
            IntPredicate::Sle => IntCC::SignedLessThanOrEqual,
            IntPredicate::Sgt => IntCC::SignedGreaterThan,
            IntPredicate::Sge => IntCC::SignedGreaterThanOrEqual,
        };
        let (a, b) = (self.raw(lhs), self.raw(rhs));
        let raw = self.cursor().ins().icmp(cc, a, b);
        Value::ssa(raw, Type::BOOL)
    }

    fn build_fcmp(&mut self, pred: FloatPredicate, lhs: Value, rhs: Value) -> Value {
        let cc = match pred {
            FloatPredicate::Oeq => FloatCC::Equal,
            FloatPredicate::One => FloatCC::OrderedNotEqual,
            FloatPredicate::Olt => FloatCC::LessThan,
            FloatPredicate::Ole => FloatCC::LessThanOrEqual,
            FloatPredicate::Ogt => FloatCC::GreaterThan,
            FloatPredicate::Oge => FloatCC::GreaterThanOrEqual,
        };
        let (a, b) = (self.raw(lhs), self.raw(rhs));
        let raw = self.cursor().ins().fcmp(cc, a, b);
        Value::ssa(raw, Type::BOOL)
    }

    fn build_logic(&mut self, op: LogicOp, lhs: Value, rhs: Value) -> Value {
        let (a, b) = (self.raw(lhs), self.raw(rhs));
        let mut cursor = self.cursor();
        let raw = match op {
            LogicOp::And => cursor.ins().band(a, b),
            LogicOp::Or => cursor.ins().bor(a, b),
            LogicOp::Xor => cursor.ins().bxor(a, b),
        };
        Value::ssa(raw, lhs.ty)
    }

    fn build_neg(&mut self, value: Value) -> Value {
        let a = self.raw(value);
        let raw = match value.ty {
            Type::Float => self.cursor().ins().fneg(a),
            _ => self.cursor().ins().ineg(a),
        };
        Value::ssa(raw, value.ty)
    }

    fn build_not(&mut self, value: Value) -> Value {
        let a = self.raw(value);
        // Booleans only use their lowest bit.
        let raw = match value.ty {
            Type::BOOL => self.cursor().ins().bxor_imm(a, 1),
            _ => self.cursor().ins().bnot(a),
        };
        Value::ssa(raw, value.ty)
    }

    fn build_cast(&mut self, op: CastOp, value: Value, to: Type) -> Value {
        let a = self.raw(value);
        let from_bits = self.machine(value.ty).bits();
        let target = self.machine(to);
        let mut cursor = self.cursor();
        let ins = cursor.ins();
        let raw = match op {
            CastOp::SiToFp => ins.fcvt_from_sint(target, a),
            CastOp::FpToSi => ins.fcvt_to_sint_sat(target, a),
            CastOp::SExt if target.bits() > from_bits => ins.sextend(target, a),
            CastOp::ZExt | CastOp::PtrToInt | CastOp::IntToPtr if target.bits() > from_bits => {
                ins.uextend(target, a)
            }
            CastOp::Trunc if to == Type::BOOL => {
                let low = if from_bits > 8 { ins.ireduce(target, a) } else { a };
                cursor.ins().band_imm(low, 1)
            }
            _ if target.bits() < from_bits => ins.ireduce(target, a),
            _ => a,
        };
        Value::ssa(raw, to)
    }

    fn build_alloca(&mut self, ty: Type) -> Value {
        let size = self.machine(ty).bytes();
        let pointer = self.pointer;
        let function = self.position().function;
        let func = &mut self.function_mut(function).func;
        let slot = func.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size,
            u8::try_from(size.trailing_zeros()).unwrap_or(0),
        ));
        let Some(entry) = func.layout.entry_block() else {
            unreachable!("a positioned function has an entry block");
        };
        let raw = FuncCursor::new(func)
            .at_first_insertion_point(entry)
            .ins()
            .stack_addr(pointer, slot, 0);
        Value::ssa(raw, Type::Ptr)
    }

    fn build_load(&mut self, ty: Type, ptr: Value) -> Value {
        let machine = self.machine(ty);
        let p = self.raw(ptr);
        let raw = self.cursor().ins().load(machine, MemFlags::trusted(), p, 0);
        Value::ssa(raw, ty)
    }

    fn build_store(&mut self, value: Value, ptr: Value) {
        let (v, p) = (self.raw(value), self.raw(ptr));
        self.cursor().ins().store(MemFlags::trusted(), v, p, 0);
    }

    fn build_call(
        &mut self,
        callee: Value,
        signature: &Signature,
        args: &[Value],
    ) -> Option<Value> {
        let args: Vec<_> = args.iter().map(|&arg| self.raw(arg)).collect();
        let direct = match callee.repr {
            Repr::Function(function) if args.len() == signature.params.len() => {
                self.func_ref(function)
            }
            _ => None,
        };
        let inst = match direct {
            Some(func_ref) => self.cursor().ins().call(func_ref, &args),
            // Variadic and indirect calls go through a signature built from
            // the arguments actually passed.
            None => {
                let mut sig = self.object.make_signature();
                for &arg in &args {
                    sig.params.push(AbiParam::new(self.value_type(arg)));
                }
                if signature.ret != Type::Void {
                    sig.returns.push(AbiParam::new(self.machine(signature.ret)));
                }
                let target = self.raw(callee);
                let mut cursor = self.cursor();
                let sig_ref = cursor.func.import_signature(sig);
                cursor.ins().call_indirect(sig_ref, target, &args)
            }
        };
        let current = self.position().function;
        let results = self.functions[current.index()].func.dfg.inst_results(inst);
        results
            .first()
            .map(|&raw| Value::ssa(raw, signature.ret))
    }

    fn build_br(&mut self, target: BlockRef) {
        self.cursor().ins().jump(target.block, &[]);
        self.terminate(vec![target.block]);
    }

    fn build_cond_br(&mut self, cond: Value, then: BlockRef, otherwise: BlockRef) {
        let c = self.raw(cond);
        self.cursor()
            .ins()
            .brif(c, then.block, &[], otherwise.block, &[]);
        self.terminate(vec![then.block, otherwise.block]);
    }

    fn build_ret(&mut self, value: Value) {
        let v = self.raw(value);
        self.cursor().ins().return_(&[v]);
        self.terminate(Vec::new());
    }

    fn build_ret_void(&mut self) {
        self.cursor().ins().return_(&[]);
        self.terminate(Vec::new());
    }

    fn verify(&self) -> Result<(), Vec<String>> {
        let mut messages = self.errors.clone();
        if let Err(errors) = verify_functions(&self.object, &self.functions) {
            messages.extend(errors);
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }

    fn finish(self) -> Module {
        Module {
            name: self.name,
            object: self.object,
            functions: self.functions,
            strings: self.strings,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use cranelift_codegen::ir::Opcode;
    use pretty_assertions::assert_eq;

    fn builder() -> Builder {
        Builder::new("test", Some("x86_64-unknown-linux-gnu")).unwrap()
    }

    #[test]
    fn block_labels_are_unique() {
        let mut b = builder();
        let f = b.add_function("f", Signature::new(vec![], Type::Void));
        for name in ["entry", "if.then", "if.then", "if.then1", "if.then"] {
            let block = b.append_block(f, name);
            b.position_at_end(block);
            b.build_ret_void();
        }
        for _ in 0..500 {
            let block = b.append_block(f, "dead");
            b.position_at_end(block);
            b.build_ret_void();
        }
        assert_eq!(b.verify(), Ok(()));

        let module = b.finish();
        let function = module.function("f").unwrap();
        let labels: Vec<_> = function.blocks().iter().map(|info| &*info.label).collect();
        assert_eq!(
            labels[..5],
            ["entry", "if.then", "if.then1", "if.then11", "if.then2"]
        );
        assert_eq!(labels[5], "dead");
        assert_eq!(labels[504], "dead499");
        let distinct: HashSet<_> = labels.iter().collect();
        assert_eq!(distinct.len(), labels.len());
    }

    #[test]
    fn allocas_are_addressed_in_entry_block() {
        let mut b = builder();
        let int = Type::Int(64);
        let f = b.add_function("f", Signature::new(vec![int], int));
        let entry = b.append_block(f, "entry");
        let body = b.append_block(f, "body");
        b.position_at_end(entry);
        b.build_br(body);
        b.position_at_end(body);
        let slot = b.build_alloca(int);
        let x = b.param(f, 0);
        b.build_store(x, slot);
        let loaded = b.build_load(int, slot);
        b.build_ret(loaded);
        assert_eq!(b.verify(), Ok(()));

        let module = b.finish();
        let function = module.function("f").unwrap();
        assert_eq!(
            function.opcodes_in(entry.block),
            vec![Opcode::StackAddr, Opcode::Jump]
        );
        assert_eq!(
            function.opcodes_in(body.block),
            vec![Opcode::Store, Opcode::Load, Opcode::Return]
        );
        assert_eq!(function.blocks()[0].successors, vec![body.block]);
    }

    #[test]
    fn narrow_constants_and_booleans() {
        let mut b = builder();
        let f = b.add_function("f", Signature::new(vec![], Type::Int(32)));
        let entry = b.append_block(f, "entry");
        b.position_at_end(entry);
        let wide = b.const_int(Type::Int(64), 300);
        let flag = b.build_cast(CastOp::Trunc, wide, Type::BOOL);
        let flag = b.build_not(flag);
        let widened = b.build_cast(CastOp::ZExt, flag, Type::Int(32));
        let minus_one = b.const_int(Type::Int(32), -1);
        let sum = b.build_arith(ArithOp::Add, widened, minus_one);
        b.build_ret(sum);
        assert_eq!(b.type_of(flag), Type::BOOL);
        assert_eq!(b.verify(), Ok(()));

        let module = b.finish();
        assert_eq!(
            module.function("f").unwrap().opcodes(),
            vec![
                Opcode::Iconst,
                Opcode::Ireduce,
                Opcode::BandImm,
                Opcode::BxorImm,
                Opcode::Uextend,
                Opcode::Iconst,
                Opcode::Iadd,
                Opcode::Return,
            ]
        );
    }

    #[test]
    fn variadic_calls_and_strings() {
        let mut b = builder();
        let signature = Signature::variadic(vec![Type::Ptr], Type::Int(32));
        let printf = b.declare_extern("printf", signature);
        let main = b.add_function("main", Signature::new(vec![], Type::Int(32)));
        let entry = b.append_block(main, "entry");
        b.position_at_end(entry);
        let format = b.const_string(b"%ld\n");
        let _same = b.const_string(b"%ld\n");
        let n = b.const_int(Type::Int(64), 42);
        let callee = b.function_value(printf);
        let signature = b.signature(printf);
        let written = b.build_call(callee, &signature, &[format, n]).unwrap();
        assert_eq!(b.type_of(written), Type::Int(32));
        b.build_ret(written);
        assert_eq!(b.verify(), Ok(()));

        let module = b.finish();
        assert_eq!(module.strings().len(), 1);
        let text = module.to_string();
        assert!(text.contains("; data0 = \"%ld\\n\\x00\"\n"), "{text}");
        assert!(text.contains("; extern printf(ptr, ...) -> i32\n"), "{text}");
        assert!(text.contains("; block0=entry\n"), "{text}");
        assert!(text.contains("function %main() -> i32"), "{text}");

        let opcodes = module.function("main").unwrap().opcodes();
        assert!(opcodes.contains(&Opcode::FuncAddr));
        assert!(opcodes.contains(&Opcode::CallIndirect));

        let object = module.emit_object().unwrap();
        assert!(object.starts_with(b"\x7fELF"));
    }

    #[test]
    fn verify_reports_unterminated_blocks() {
        let mut b = builder();
        let f = b.add_function("f", Signature::new(vec![], Type::Int(64)));
        let entry = b.append_block(f, "entry");
        b.position_at_end(entry);
        b.const_int(Type::Int(64), 1);

        let messages = b.verify().unwrap_err();
        assert!(!messages.is_empty());
        assert!(
            messages.iter().all(|m| m.starts_with("in function `f`: ")),
            "{messages:?}"
        );
    }

    #[test]
    fn targets() {
        let aarch64 = Builder::new("m", Some("aarch64-apple-darwin")).unwrap().finish();
        assert_eq!(aarch64.triple(), "aarch64-apple-darwin");
        assert!(Builder::new("host", None).is_ok());
        assert!(matches!(
            Builder::new("m", Some("not-a-target")),
            Err(Error::Target { .. })
        ));
    }
}
