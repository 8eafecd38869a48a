/*! Per-instruction translation into a CFG node's operation stream. */

use super::LoweringContext;
use crate::arena::Handle;
use crate::gir::{CFGNode, CFGNodePool, Incoming, Operation, Phi};
use crate::hlir::{
    self, BinaryOp, CastOp, ComparePredicate, Instruction, OpTableCode, ResourceClass, UnaryOp,
};
use spirv::Op;

fn map_binary_op(op: BinaryOp) -> Op {
    match op {
        BinaryOp::FAdd => Op::FAdd,
        BinaryOp::FSub => Op::FSub,
        BinaryOp::FMul => Op::FMul,
        BinaryOp::FDiv => Op::FDiv,
        BinaryOp::Add => Op::IAdd,
        BinaryOp::Sub => Op::ISub,
        BinaryOp::Mul => Op::IMul,
        BinaryOp::SDiv => Op::SDiv,
        BinaryOp::UDiv => Op::UDiv,
        BinaryOp::Shl => Op::ShiftLeftLogical,
        BinaryOp::LShr => Op::ShiftRightLogical,
        BinaryOp::AShr => Op::ShiftRightArithmetic,
        BinaryOp::SRem => Op::SRem,
        BinaryOp::FRem => Op::FRem,
        // the target has no unsigned remainder opcode; for unsigned
        // operands modulo and remainder agree
        BinaryOp::URem => Op::UMod,
        BinaryOp::And => Op::BitwiseAnd,
        BinaryOp::Or => Op::BitwiseOr,
        BinaryOp::Xor => Op::BitwiseXor,
    }
}

fn map_unary_op(op: UnaryOp) -> Op {
    match op {
        UnaryOp::FNeg => Op::FNegate,
    }
}

fn map_cast_op(op: CastOp) -> Op {
    match op {
        CastOp::BitCast => Op::Bitcast,
        CastOp::SExt => Op::SConvert,
        CastOp::Trunc | CastOp::ZExt => Op::UConvert,
        CastOp::FpTrunc | CastOp::FpExt => Op::FConvert,
        CastOp::FpToUi => Op::ConvertFToU,
        CastOp::FpToSi => Op::ConvertFToS,
        CastOp::SiToFp => Op::ConvertSToF,
        CastOp::UiToFp => Op::ConvertUToF,
    }
}

impl LoweringContext<'_> {
    pub(super) fn emit_instruction(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
    ) {
        let function = self.function;
        let hlir::Value::Instruction { ty, ref name, ref op } = function.values[value] else {
            log::error!("block lists a value that is not an instruction");
            return;
        };
        match *op {
            Instruction::Binary { op, lhs, rhs } => {
                let mut operation = Operation::new(map_binary_op(op));
                operation.result_id = self.get_id(value);
                operation.result_type_id =
                    self.types.type_of_hlir(self.builder, self.module, ty);
                operation.add_operand(self.get_id(lhs));
                operation.add_operand(self.get_id(rhs));
                pool[node].operations.push(operation);
            }
            Instruction::Unary { op, value: input } => {
                let mut operation = Operation::new(map_unary_op(op));
                operation.result_id = self.get_id(value);
                operation.result_type_id =
                    self.types.type_of_hlir(self.builder, self.module, ty);
                operation.add_operand(self.get_id(input));
                pool[node].operations.push(operation);
            }
            Instruction::Cast { op, value: input } => {
                let mut operation = Operation::new(map_cast_op(op));
                operation.result_id = self.get_id(value);
                operation.result_type_id =
                    self.types.type_of_hlir(self.builder, self.module, ty);
                operation.add_operand(self.get_id(input));
                pool[node].operations.push(operation);
            }
            Instruction::Compare { op, lhs, rhs } => {
                self.emit_compare(pool, node, value, ty, op, lhs, rhs)
            }
            Instruction::Load { pointer } => {
                let mut operation = Operation::new(Op::Load);
                operation.result_id = self.get_id(value);
                operation.result_type_id =
                    self.types.type_of_hlir(self.builder, self.module, ty);
                operation.add_operand(self.get_id(pointer));
                pool[node].operations.push(operation);
            }
            Instruction::Store {
                value: stored,
                pointer,
            } => {
                // emitted operand order is (pointer, value)
                let mut operation = Operation::new(Op::Store);
                operation.add_operand(self.get_id(pointer));
                operation.add_operand(self.get_id(stored));
                pool[node].operations.push(operation);
            }
            Instruction::GetElementPtr {
                in_bounds,
                base,
                ref indices,
            } => self.emit_getelementptr(pool, node, value, ty, in_bounds, base, indices),
            Instruction::ExtractValue {
                aggregate,
                ref indices,
            } => {
                let mut operation = Operation::new(Op::CompositeExtract);
                operation.result_id = self.get_id(value);
                operation.result_type_id =
                    self.types.type_of_hlir(self.builder, self.module, ty);
                operation.add_operand(self.get_id(aggregate));
                operation.add_operands(indices.iter().copied());
                pool[node].operations.push(operation);
            }
            Instruction::Alloca { array_size } => self.emit_alloca(value, ty, name, array_size),
            Instruction::Select {
                condition,
                accept,
                reject,
            } => {
                let mut operation = Operation::new(Op::Select);
                operation.result_id = self.get_id(value);
                operation.result_type_id =
                    self.types.type_of_hlir(self.builder, self.module, ty);
                operation.add_operand(self.get_id(condition));
                operation.add_operand(self.get_id(accept));
                operation.add_operand(self.get_id(reject));
                pool[node].operations.push(operation);
            }
            Instruction::Phi { ref incoming } => self.emit_phi(pool, node, value, ty, incoming),
            Instruction::Call {
                ref callee,
                ref arguments,
            } => {
                if callee.starts_with("dx.op") {
                    self.emit_op_table(pool, node, value, ty, arguments);
                } else {
                    log::error!("plain function calls are not supported: {}", callee);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_compare(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        predicate: ComparePredicate,
        lhs: Handle<hlir::Value>,
        rhs: Handle<hlir::Value>,
    ) {
        use ComparePredicate as Cp;

        let result_id = self.get_id(value);
        let result_type_id = self.types.type_of_hlir(self.builder, self.module, ty);
        let id0 = self.get_id(lhs);
        let id1 = self.get_id(rhs);

        let mut arguments = vec![id0, id1];
        let op = match predicate {
            // constant predicates copy a literal boolean instead of comparing
            Cp::FcmpFalse => {
                arguments = vec![self.builder.make_bool_constant(false)];
                Op::CopyLogical
            }
            Cp::FcmpTrue => {
                arguments = vec![self.builder.make_bool_constant(true)];
                Op::CopyLogical
            }
            Cp::FcmpOeq => Op::FOrdEqual,
            Cp::FcmpUeq => Op::FUnordEqual,
            Cp::FcmpOgt => Op::FOrdGreaterThan,
            Cp::FcmpUgt => Op::FUnordGreaterThan,
            Cp::FcmpOge => Op::FOrdGreaterThanEqual,
            Cp::FcmpUge => Op::FUnordGreaterThanEqual,
            Cp::FcmpOlt => Op::FOrdLessThan,
            Cp::FcmpUlt => Op::FUnordLessThan,
            Cp::FcmpOle => Op::FOrdLessThanEqual,
            Cp::FcmpUle => Op::FUnordLessThanEqual,
            Cp::FcmpOne => Op::FOrdNotEqual,
            Cp::FcmpUne => Op::FUnordNotEqual,
            Cp::IcmpEq => Op::IEqual,
            Cp::IcmpNe => Op::INotEqual,
            Cp::IcmpSlt => Op::SLessThan,
            Cp::IcmpSle => Op::SLessThanEqual,
            Cp::IcmpSgt => Op::SGreaterThan,
            Cp::IcmpSge => Op::SGreaterThanEqual,
            Cp::IcmpUlt => Op::ULessThan,
            Cp::IcmpUle => Op::ULessThanEqual,
            Cp::IcmpUgt => Op::UGreaterThan,
            Cp::IcmpUge => Op::UGreaterThanEqual,
        };

        let mut operation = Operation::new(op);
        operation.result_id = result_id;
        operation.result_type_id = result_type_id;
        operation.arguments = arguments;
        pool[node].operations.push(operation);
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_getelementptr(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        in_bounds: bool,
        base: Handle<hlir::Value>,
        indices: &[Handle<hlir::Value>],
    ) {
        // A leading pointer index other than a constant 0 would need a
        // pointer-style chain backed by variable pointers; reject it and
        // drop the index otherwise.
        match indices.first() {
            Some(&first) if self.constant_value(first) == Some(0) => {}
            _ => {
                log::error!("access chain with a non-zero leading index");
                return;
            }
        }

        let mut operation = Operation::new(if in_bounds {
            Op::InBoundsAccessChain
        } else {
            Op::AccessChain
        });
        operation.result_id = self.get_id(value);
        operation.result_type_id = self.types.type_of_hlir(self.builder, self.module, ty);
        operation.add_operand(self.get_id(base));
        for &index in &indices[1..] {
            operation.add_operand(self.get_id(index));
        }
        pool[node].operations.push(operation);
    }

    fn emit_alloca(
        &mut self,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        name: &str,
        array_size: Handle<hlir::Value>,
    ) {
        let hlir::Type::Pointer { pointee } = self.module.types[ty] else {
            log::error!("alloca result is not a pointer");
            return;
        };
        // stack arrays arrive as a single element of array type
        if self.constant_value(array_size) != Some(1) {
            log::error!("alloca with a non-unit array size");
            return;
        }
        let pointee_type_id = self.types.type_of_hlir(self.builder, self.module, pointee);
        let variable_id = self.builder.create_variable(
            spirv::StorageClass::Function,
            pointee_type_id,
            if name.is_empty() { None } else { Some(name) },
        );
        self.values.insert(value, variable_id);
    }

    fn emit_phi(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        incoming: &[(Handle<hlir::Value>, Handle<hlir::BasicBlock>)],
    ) {
        let mut phi = Phi {
            id: self.get_id(value),
            type_id: self.types.type_of_hlir(self.builder, self.module, ty),
            incoming: Vec::with_capacity(incoming.len()),
        };
        for &(incoming_value, incoming_block) in incoming {
            let Some(&block) = self.bb_map.get(&incoming_block) else {
                log::warn!("phi names an unreachable predecessor");
                continue;
            };
            phi.incoming.push(Incoming {
                block,
                id: self.get_id(incoming_value),
            });
        }
        pool[node].phis.push(phi);
    }

    fn emit_op_table(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        arguments: &[Handle<hlir::Value>],
    ) {
        // the op-table selector is the constant first argument
        let Some(code) = arguments.first().and_then(|&a| self.constant_value(a)) else {
            log::error!("op-table call without a constant selector");
            return;
        };
        let Some(code) = OpTableCode::from_u32(code as u32) else {
            log::error!("unknown op-table opcode {}", code);
            return;
        };
        match code {
            OpTableCode::LoadInput => self.emit_load_input(pool, node, value, ty, arguments),
            OpTableCode::StoreOutput => self.emit_store_output(pool, node, arguments),
            OpTableCode::CreateHandle => self.emit_create_handle(pool, node, value, arguments),
            OpTableCode::CBufferLoadLegacy => {
                self.emit_cbuffer_load_legacy(pool, node, value, ty, arguments)
            }
            OpTableCode::Sample
            | OpTableCode::SampleBias
            | OpTableCode::SampleLevel
            | OpTableCode::SampleCmp
            | OpTableCode::SampleCmpLevelZero => {
                self.emit_sample(code, pool, node, value, ty, arguments)
            }
        }
    }

    fn emit_load_input(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        arguments: &[Handle<hlir::Value>],
    ) {
        let Some(element) = arguments.get(1).and_then(|&a| self.constant_value(a)) else {
            log::error!("input load without a constant element index");
            return;
        };
        let Some(&variable_id) = self.input_elements.get(&(element as u32)) else {
            log::error!("input element {} has no variable", element);
            return;
        };
        let Some(&column) = arguments.get(3) else {
            log::error!("input load without a column operand");
            return;
        };

        let num_rows = self
            .builder
            .get_num_type_components(self.builder.get_deref_type_id(variable_id));
        let result_type_id = self.types.type_of_hlir(self.builder, self.module, ty);

        let pointer_id = if num_rows > 1 {
            let pointer_id = self.builder.allocate_id();
            let mut operation = Operation::new(Op::InBoundsAccessChain);
            operation.result_id = pointer_id;
            operation.result_type_id = self
                .builder
                .make_pointer(spirv::StorageClass::Input, result_type_id);
            operation.add_operand(variable_id);
            operation.add_operand(self.get_id_forced(column, 32));
            pool[node].operations.push(operation);
            pointer_id
        } else {
            variable_id
        };

        let mut operation = Operation::new(Op::Load);
        operation.result_id = self.get_id(value);
        operation.result_type_id = result_type_id;
        operation.add_operand(pointer_id);
        pool[node].operations.push(operation);
    }

    fn emit_store_output(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        arguments: &[Handle<hlir::Value>],
    ) {
        let Some(element) = arguments.get(1).and_then(|&a| self.constant_value(a)) else {
            log::error!("output store without a constant element index");
            return;
        };
        let Some(&variable_id) = self.output_elements.get(&(element as u32)) else {
            log::error!("output element {} has no variable", element);
            return;
        };
        let (Some(&column), Some(&stored)) = (arguments.get(3), arguments.get(4)) else {
            log::error!("output store without column and value operands");
            return;
        };

        let deref_type_id = self.builder.get_deref_type_id(variable_id);
        let num_rows = self.builder.get_num_type_components(deref_type_id);

        let pointer_id = if num_rows > 1 {
            let pointer_id = self.builder.allocate_id();
            let mut operation = Operation::new(Op::InBoundsAccessChain);
            operation.result_id = pointer_id;
            let scalar_type_id = self.builder.get_scalar_type_id(deref_type_id);
            operation.result_type_id = self
                .builder
                .make_pointer(spirv::StorageClass::Output, scalar_type_id);
            operation.add_operand(variable_id);
            operation.add_operand(self.get_id_forced(column, 32));
            pool[node].operations.push(operation);
            pointer_id
        } else {
            variable_id
        };

        let mut operation = Operation::new(Op::Store);
        operation.add_operand(pointer_id);
        operation.add_operand(self.get_id(stored));
        pool[node].operations.push(operation);
    }

    fn emit_create_handle(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        arguments: &[Handle<hlir::Value>],
    ) {
        let Some(class) = arguments.get(1).and_then(|&a| self.constant_value(a)) else {
            log::error!("handle creation without a constant resource class");
            return;
        };
        let Some(class) = ResourceClass::from_u32(class as u32) else {
            log::error!("unknown resource class {}", class);
            return;
        };
        let Some(range) = arguments.get(2).and_then(|&a| self.constant_value(a)) else {
            log::error!("handle creation without a constant range index");
            return;
        };
        let range = range as usize;
        // operand 3 is the index into the range, operand 4 the non-uniform
        // flag; single-entry ranges leave both unused here

        match class {
            ResourceClass::Srv => {
                let image_id = self.resources.srv_index_to_id.get(range).copied().unwrap_or(0);
                if image_id == 0 {
                    log::error!("SRV range {} is not bound", range);
                    return;
                }
                self.emit_handle_load(pool, node, value, image_id);
            }
            ResourceClass::Sampler => {
                let sampler_id = self
                    .resources
                    .sampler_index_to_id
                    .get(range)
                    .copied()
                    .unwrap_or(0);
                if sampler_id == 0 {
                    log::error!("sampler range {} is not bound", range);
                    return;
                }
                self.emit_handle_load(pool, node, value, sampler_id);
            }
            ResourceClass::Uav => {
                let variable_id = self.resources.uav_index_to_id.get(range).copied().unwrap_or(0);
                self.handle_values.insert(value, variable_id);
            }
            ResourceClass::Cbv => {
                let variable_id = self.resources.cbv_index_to_id.get(range).copied().unwrap_or(0);
                if variable_id == 0 {
                    log::error!("CBV range {} is not bound", range);
                    return;
                }
                self.handle_values.insert(value, variable_id);
            }
        }
    }

    /// Load from a `UniformConstant` variable and bind the handle to the
    /// loaded id, remembering its type for sampling queries.
    fn emit_handle_load(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        variable_id: spirv::Word,
    ) {
        let type_id = self.builder.get_deref_type_id(variable_id);
        let id = self.builder.allocate_id();
        let mut operation = Operation::new(Op::Load);
        operation.result_id = id;
        operation.result_type_id = type_id;
        operation.add_operand(variable_id);
        self.types.record_type_for_id(id, type_id);
        self.handle_values.insert(value, id);
        pool[node].operations.push(operation);
    }

    fn emit_cbuffer_load_legacy(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        arguments: &[Handle<hlir::Value>],
    ) {
        let (Some(&handle), Some(&row)) = (arguments.get(1), arguments.get(2)) else {
            log::error!("constant buffer load without handle and row operands");
            return;
        };
        let pointer_id = self.handle_values.get(&handle).copied().unwrap_or(0);
        if pointer_id == 0 {
            log::error!("constant buffer load from an unbound handle");
            return;
        }

        let vec4_index = self.get_id(row);
        let float_type = self.builder.make_float_type(32);
        let vec4_type = self.builder.make_vector_type(float_type, 4);

        let access_chain_id = self.builder.allocate_id();
        let mut operation = Operation::new(Op::InBoundsAccessChain);
        operation.result_id = access_chain_id;
        operation.result_type_id = self
            .builder
            .make_pointer(spirv::StorageClass::Uniform, vec4_type);
        let member_index = self.builder.make_uint_constant(0);
        operation.add_operands([pointer_id, member_index, vec4_index]);
        pool[node].operations.push(operation);

        // The call formally returns a struct, but extract-value reads
        // vectors just as well; only a float/int mismatch needs a bitcast.
        let need_bitcast = match self.module.types[ty] {
            hlir::Type::Struct { ref members } if members.len() == 4 => {
                !matches!(self.module.types[members[0]], hlir::Type::Float { width: 32 })
            }
            _ => {
                log::error!("constant buffer load result is not a 4-member struct");
                false
            }
        };

        let load_id = if need_bitcast {
            self.builder.allocate_id()
        } else {
            self.get_id(value)
        };
        let mut operation = Operation::new(Op::Load);
        operation.result_id = load_id;
        operation.result_type_id = vec4_type;
        operation.add_operand(access_chain_id);
        pool[node].operations.push(operation);

        if need_bitcast {
            let uint_type = self.builder.make_integer_type(32, false);
            let uint4_type = self.builder.make_vector_type(uint_type, 4);
            let mut operation = Operation::new(Op::Bitcast);
            operation.result_id = self.get_id(value);
            operation.result_type_id = uint4_type;
            operation.add_operand(load_id);
            pool[node].operations.push(operation);
        }
    }
}
