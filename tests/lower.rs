/*! End-to-end lowering scenarios over programmatically built HLIR. */

use gryphon::arena::{Arena, Handle};
use gryphon::gir::{self, Builder, Operation, WriterFlags};
use gryphon::hlir::{self, MetadataNode, MetadataOperand};
use gryphon::lower;
use spirv::{Decoration, Op, StorageClass, Word};

//
// HLIR construction helpers
//

fn int(value: u64) -> MetadataOperand {
    MetadataOperand::Integer(value)
}

fn string(value: &str) -> MetadataOperand {
    MetadataOperand::String(value.to_string())
}

fn node(handle: Handle<MetadataNode>) -> MetadataOperand {
    MetadataOperand::Node(handle)
}

fn add_node(module: &mut hlir::Module, operands: Vec<MetadataOperand>) -> Handle<MetadataNode> {
    module.metadata.append(MetadataNode { operands })
}

fn set_shader_model(module: &mut hlir::Module, model: &str) {
    let handle = add_node(module, vec![string(model)]);
    module
        .named_metadata
        .insert("dx.shaderModel".to_string(), vec![handle]);
}

fn signature_element(
    module: &mut hlir::Module,
    element_id: u64,
    name: &str,
    component_type: u64,
    semantic: u64,
    rows: u64,
    cols: u64,
    start_row: u64,
) -> Handle<MetadataNode> {
    add_node(
        module,
        vec![
            int(element_id),
            string(name),
            int(component_type),
            int(semantic),
            int(0),
            int(0),
            int(rows),
            int(cols),
            int(start_row),
            int(0),
        ],
    )
}

fn set_entry_point(
    module: &mut hlir::Module,
    name: &str,
    inputs: Vec<Handle<MetadataNode>>,
    outputs: Vec<Handle<MetadataNode>>,
) {
    let inputs_node = add_node(module, inputs.into_iter().map(node).collect());
    let outputs_node = add_node(module, outputs.into_iter().map(node).collect());
    let signature = add_node(module, vec![node(inputs_node), node(outputs_node)]);
    let entry = add_node(
        module,
        vec![MetadataOperand::Null, string(name), node(signature)],
    );
    module
        .named_metadata
        .insert("dx.entryPoints".to_string(), vec![entry]);
}

fn set_resources(
    module: &mut hlir::Module,
    srvs: Option<Handle<MetadataNode>>,
    uavs: Option<Handle<MetadataNode>>,
    cbvs: Option<Handle<MetadataNode>>,
    samplers: Option<Handle<MetadataNode>>,
) {
    let operand = |list: Option<Handle<MetadataNode>>| match list {
        Some(handle) => node(handle),
        None => MetadataOperand::Null,
    };
    let list = add_node(
        module,
        vec![operand(srvs), operand(uavs), operand(cbvs), operand(samplers)],
    );
    module
        .named_metadata
        .insert("dx.resources".to_string(), vec![list]);
}

fn srv_entry(
    module: &mut hlir::Module,
    index: u64,
    name: &str,
    bind_space: u64,
    bind_register: u64,
    kind: u64,
    component_type: u64,
) -> Handle<MetadataNode> {
    let tags = add_node(module, vec![int(0), int(component_type)]);
    add_node(
        module,
        vec![
            int(index),
            MetadataOperand::Null,
            string(name),
            int(bind_space),
            int(bind_register),
            int(1),
            int(kind),
            MetadataOperand::Null,
            node(tags),
        ],
    )
}

fn cbv_entry(
    module: &mut hlir::Module,
    index: u64,
    name: &str,
    bind_space: u64,
    bind_register: u64,
    size_bytes: u64,
) -> Handle<MetadataNode> {
    add_node(
        module,
        vec![
            int(index),
            MetadataOperand::Null,
            string(name),
            int(bind_space),
            int(bind_register),
            int(1),
            int(size_bytes),
        ],
    )
}

fn sampler_entry(
    module: &mut hlir::Module,
    index: u64,
    name: &str,
    bind_space: u64,
    bind_register: u64,
) -> Handle<MetadataNode> {
    add_node(
        module,
        vec![
            int(index),
            MetadataOperand::Null,
            string(name),
            int(bind_space),
            int(bind_register),
            int(1),
            int(0),
        ],
    )
}

struct FunctionBuilder {
    values: Arena<hlir::Value>,
    blocks: Arena<hlir::BasicBlock>,
}

impl FunctionBuilder {
    fn new() -> Self {
        FunctionBuilder {
            values: Arena::new(),
            blocks: Arena::new(),
        }
    }

    fn block(&mut self, name: &str) -> Handle<hlir::BasicBlock> {
        self.blocks.append(hlir::BasicBlock {
            name: name.to_string(),
            instructions: Vec::new(),
            terminator: hlir::Terminator::Unreachable,
        })
    }

    fn constant_u32(&mut self, value: u32) -> Handle<hlir::Value> {
        self.values
            .append(hlir::Value::Constant(hlir::Constant::Integer {
                width: 32,
                value: value as u64,
            }))
    }

    fn constant_f32(&mut self, value: f32) -> Handle<hlir::Value> {
        self.values
            .append(hlir::Value::Constant(hlir::Constant::Float(value)))
    }

    fn undef(&mut self, ty: Handle<hlir::Type>) -> Handle<hlir::Value> {
        self.values.append(hlir::Value::Undef(ty))
    }

    fn inst(
        &mut self,
        block: Handle<hlir::BasicBlock>,
        ty: Handle<hlir::Type>,
        op: hlir::Instruction,
    ) -> Handle<hlir::Value> {
        let value = self.values.append(hlir::Value::Instruction {
            ty,
            name: String::new(),
            op,
        });
        self.blocks[block].instructions.push(value);
        value
    }

    fn terminate(&mut self, block: Handle<hlir::BasicBlock>, terminator: hlir::Terminator) {
        self.blocks[block].terminator = terminator;
    }

    fn finish(self, name: &str, entry: Handle<hlir::BasicBlock>) -> hlir::Function {
        hlir::Function {
            name: name.to_string(),
            values: self.values,
            blocks: self.blocks,
            entry,
        }
    }
}

//
// Inspection helpers over the builder output
//

fn variables_of_class(builder: &Builder, class: StorageClass) -> Vec<Word> {
    builder
        .declarations
        .iter()
        .filter(|operation| {
            operation.op == Op::Variable && operation.arguments[0] == class as Word
        })
        .map(|operation| operation.result_id)
        .collect()
}

fn has_decoration(
    builder: &Builder,
    target: Word,
    decoration: Decoration,
    operand: Option<Word>,
) -> bool {
    builder.annotations.iter().any(|annotation| {
        annotation.op == Op::Decorate
            && annotation.arguments[0] == target
            && annotation.arguments[1] == decoration as Word
            && operand.map_or(true, |value| annotation.arguments.get(2) == Some(&value))
    })
}

fn declarations_of(builder: &Builder, op: Op) -> Vec<&Operation> {
    builder
        .declarations
        .iter()
        .filter(|operation| operation.op == op)
        .collect()
}

fn type_id_by(builder: &Builder, op: Op, arguments: &[Word]) -> Word {
    declarations_of(builder, op)
        .into_iter()
        .find(|operation| operation.arguments == arguments)
        .map(|operation| operation.result_id)
        .expect("type declaration not found")
}

fn uint_constant_id(builder: &Builder, value: u32) -> Word {
    let uint_type = type_id_by(builder, Op::TypeInt, &[32, 0]);
    builder
        .declarations
        .iter()
        .find(|operation| {
            operation.op == Op::Constant
                && operation.result_type_id == uint_type
                && operation.arguments == [value]
        })
        .map(|operation| operation.result_id)
        .expect("uint constant not found")
}

fn float_constant_id(builder: &Builder, value: f32) -> Word {
    let float_type = type_id_by(builder, Op::TypeFloat, &[32]);
    builder
        .declarations
        .iter()
        .find(|operation| {
            operation.op == Op::Constant
                && operation.result_type_id == float_type
                && operation.arguments == [value.to_bits()]
        })
        .map(|operation| operation.result_id)
        .expect("float constant not found")
}

fn find_node(pool: &gir::CFGNodePool, name: &str) -> Handle<gir::CFGNode> {
    pool.iter()
        .find(|(_, node)| node.name == name)
        .map(|(handle, _)| handle)
        .unwrap_or_else(|| panic!("no CFG node named {name:?}"))
}

fn convert(module: &hlir::Module) -> (Builder, gir::ConvertedFunction) {
    let mut builder = Builder::new(WriterFlags::empty());
    let converted = lower::convert_entry_point(module, &mut builder).expect("lowering failed");
    (builder, converted)
}

//
// Scenarios
//

#[test]
fn passthrough_vertex_shader() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "vs");
    let input = signature_element(&mut module, 0, "POSITION", 9, 0, 1, 4, 0);
    let output = signature_element(&mut module, 1, "SV_Position", 9, 3, 1, 4, 0);
    set_entry_point(&mut module, "main", vec![input], vec![output]);

    let mut function = FunctionBuilder::new();
    let entry = function.block("entry");
    function.terminate(entry, hlir::Terminator::Return { value: None });
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    let inputs = variables_of_class(&builder, StorageClass::Input);
    let outputs = variables_of_class(&builder, StorageClass::Output);
    assert_eq!(inputs.len(), 1);
    assert_eq!(outputs.len(), 1);
    assert!(has_decoration(&builder, inputs[0], Decoration::Location, Some(0)));
    assert!(has_decoration(
        &builder,
        outputs[0],
        Decoration::BuiltIn,
        Some(spirv::BuiltIn::Position as Word),
    ));

    let entry_point = builder.entry_point().expect("no entry point record");
    assert_eq!(entry_point.execution_model, spirv::ExecutionModel::Vertex);
    assert_eq!(entry_point.name, "main");
    assert_eq!(entry_point.interface, vec![inputs[0], outputs[0]]);

    let entry_node = &converted.pool[converted.entry];
    assert_eq!(entry_node.name, "entry.entry");
    assert!(entry_node.operations.is_empty());
    assert_eq!(
        entry_node.terminator,
        Some(gir::Terminator::Return { value: None })
    );
}

#[test]
fn constant_buffer_fetch() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "vs");
    set_entry_point(&mut module, "main", Vec::new(), Vec::new());
    let cbv = cbv_entry(&mut module, 0, "cb0", 0, 0, 64);
    let cbvs = add_node(&mut module, vec![node(cbv)]);
    set_resources(&mut module, None, None, Some(cbvs), None);

    let f32_ty = module.types.insert(hlir::Type::Float { width: 32 });
    let struct_ty = module.types.insert(hlir::Type::Struct {
        members: vec![f32_ty; 4],
    });
    let void_ty = module.types.insert(hlir::Type::Void);

    let mut function = FunctionBuilder::new();
    let entry = function.block("entry");
    let create_handle = function.constant_u32(57);
    let class = function.constant_u32(2);
    let range = function.constant_u32(0);
    let index = function.constant_u32(0);
    let non_uniform = function.constant_u32(0);
    let handle = function.inst(
        entry,
        void_ty,
        hlir::Instruction::Call {
            callee: "dx.op.createHandle".to_string(),
            arguments: vec![create_handle, class, range, index, non_uniform],
        },
    );
    let load_legacy = function.constant_u32(59);
    let row = function.constant_u32(2);
    let loaded = function.inst(
        entry,
        struct_ty,
        hlir::Instruction::Call {
            callee: "dx.op.cbufferLoadLegacy".to_string(),
            arguments: vec![load_legacy, handle, row],
        },
    );
    function.inst(
        entry,
        f32_ty,
        hlir::Instruction::ExtractValue {
            aggregate: loaded,
            indices: vec![0],
        },
    );
    function.terminate(entry, hlir::Terminator::Return { value: None });
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    // uniform block: { vec4<f32>[4] @stride 16 @offset 0 } @Block
    let arrays = declarations_of(&builder, Op::TypeArray);
    assert_eq!(arrays.len(), 1);
    let array_id = arrays[0].result_id;
    assert_eq!(arrays[0].arguments[1], uint_constant_id(&builder, 4));
    assert!(has_decoration(&builder, array_id, Decoration::ArrayStride, Some(16)));

    let structs = declarations_of(&builder, Op::TypeStruct);
    assert_eq!(structs.len(), 1);
    let struct_id = structs[0].result_id;
    assert_eq!(structs[0].arguments, [array_id]);
    assert!(has_decoration(&builder, struct_id, Decoration::Block, None));
    assert!(builder.annotations.iter().any(|annotation| {
        annotation.op == Op::MemberDecorate
            && annotation.arguments == [struct_id, 0, Decoration::Offset as Word, 0]
    }));

    let uniforms = variables_of_class(&builder, StorageClass::Uniform);
    assert_eq!(uniforms.len(), 1);
    assert!(has_decoration(&builder, uniforms[0], Decoration::DescriptorSet, Some(0)));
    assert!(has_decoration(&builder, uniforms[0], Decoration::Binding, Some(0)));

    let operations = &converted.pool[converted.entry].operations;
    assert_eq!(operations.len(), 3);

    assert_eq!(operations[0].op, Op::InBoundsAccessChain);
    assert_eq!(
        operations[0].arguments,
        [
            uniforms[0],
            uint_constant_id(&builder, 0),
            uint_constant_id(&builder, 2),
        ]
    );

    let float_type = type_id_by(&builder, Op::TypeFloat, &[32]);
    let vec4_type = type_id_by(&builder, Op::TypeVector, &[float_type, 4]);
    assert_eq!(operations[1].op, Op::Load);
    assert_eq!(operations[1].result_type_id, vec4_type);
    assert_eq!(operations[1].arguments, [operations[0].result_id]);

    assert_eq!(operations[2].op, Op::CompositeExtract);
    assert_eq!(operations[2].arguments, [operations[1].result_id, 0]);
}

/// Resource topology shared by the sampling scenarios: one Texture2D at
/// binding 1 and one sampler at binding 2, both in set 0.
fn sampling_module() -> (hlir::Module, FunctionBuilder, SamplingHandles) {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "ps");
    set_entry_point(&mut module, "main", Vec::new(), Vec::new());
    let srv = srv_entry(&mut module, 0, "tex", 0, 1, 2, 9);
    let srvs = add_node(&mut module, vec![node(srv)]);
    let sampler = sampler_entry(&mut module, 0, "samp", 0, 2);
    let samplers = add_node(&mut module, vec![node(sampler)]);
    set_resources(&mut module, Some(srvs), None, None, Some(samplers));

    let f32_ty = module.types.insert(hlir::Type::Float { width: 32 });
    let i32_ty = module.types.insert(hlir::Type::Integer { width: 32 });
    let void_ty = module.types.insert(hlir::Type::Void);
    let result_ty = module.types.insert(hlir::Type::Struct {
        members: vec![f32_ty, f32_ty, f32_ty, f32_ty, i32_ty],
    });

    let mut function = FunctionBuilder::new();
    let entry = function.block("entry");

    let create_handle = function.constant_u32(57);
    let zero = function.constant_u32(0);
    let srv_class = function.constant_u32(0);
    let image_handle = function.inst(
        entry,
        void_ty,
        hlir::Instruction::Call {
            callee: "dx.op.createHandle".to_string(),
            arguments: vec![create_handle, srv_class, zero, zero, zero],
        },
    );
    let sampler_class = function.constant_u32(3);
    let sampler_handle = function.inst(
        entry,
        void_ty,
        hlir::Instruction::Call {
            callee: "dx.op.createHandle".to_string(),
            arguments: vec![create_handle, sampler_class, zero, zero, zero],
        },
    );

    let handles = SamplingHandles {
        entry,
        image_handle,
        sampler_handle,
        f32_ty,
        i32_ty,
        result_ty,
    };
    (module, function, handles)
}

struct SamplingHandles {
    entry: Handle<hlir::BasicBlock>,
    image_handle: Handle<hlir::Value>,
    sampler_handle: Handle<hlir::Value>,
    f32_ty: Handle<hlir::Type>,
    i32_ty: Handle<hlir::Type>,
    result_ty: Handle<hlir::Type>,
}

#[test]
fn sampled_texture_2d() {
    let (mut module, mut function, handles) = sampling_module();

    let sample = function.constant_u32(60);
    let u = function.constant_f32(0.5);
    let v = function.constant_f32(0.25);
    let undef_coord = function.undef(handles.f32_ty);
    let offset_zero = function.constant_u32(0);
    let undef_offset = function.undef(handles.i32_ty);
    let undef_clamp = function.undef(handles.f32_ty);
    function.inst(
        handles.entry,
        handles.result_ty,
        hlir::Instruction::Call {
            callee: "dx.op.sample".to_string(),
            arguments: vec![
                sample,
                handles.image_handle,
                handles.sampler_handle,
                u,
                v,
                undef_coord,
                undef_coord,
                offset_zero,
                offset_zero,
                undef_offset,
                undef_clamp,
            ],
        },
    );
    function.terminate(handles.entry, hlir::Terminator::Return { value: None });
    let entry = handles.entry;
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    let resource_variables = variables_of_class(&builder, StorageClass::UniformConstant);
    assert_eq!(resource_variables.len(), 2);
    let (texture, sampler) = (resource_variables[0], resource_variables[1]);
    assert!(has_decoration(&builder, texture, Decoration::DescriptorSet, Some(0)));
    assert!(has_decoration(&builder, texture, Decoration::Binding, Some(1)));
    assert!(has_decoration(&builder, sampler, Decoration::DescriptorSet, Some(0)));
    assert!(has_decoration(&builder, sampler, Decoration::Binding, Some(2)));

    let operations = &converted.pool[converted.entry].operations;
    assert_eq!(operations.len(), 5);

    assert_eq!(operations[0].op, Op::Load);
    assert_eq!(operations[0].arguments, [texture]);
    assert_eq!(operations[1].op, Op::Load);
    assert_eq!(operations[1].arguments, [sampler]);

    assert_eq!(operations[2].op, Op::SampledImage);
    assert_eq!(
        operations[2].arguments,
        [operations[0].result_id, operations[1].result_id]
    );

    assert_eq!(operations[3].op, Op::CompositeConstruct);
    assert_eq!(
        operations[3].arguments,
        [
            float_constant_id(&builder, 0.5),
            float_constant_id(&builder, 0.25),
        ]
    );

    // zero offsets raise no image-operand mask at all
    assert_eq!(operations[4].op, Op::ImageSampleImplicitLod);
    assert_eq!(
        operations[4].arguments,
        [operations[2].result_id, operations[3].result_id]
    );
    let float_type = type_id_by(&builder, Op::TypeFloat, &[32]);
    let vec4_type = type_id_by(&builder, Op::TypeVector, &[float_type, 4]);
    assert_eq!(operations[4].result_type_id, vec4_type);
}

#[test]
fn sample_cmp_level_zero() {
    let (mut module, mut function, handles) = sampling_module();

    let sample_cmp = function.constant_u32(65);
    let u = function.constant_f32(0.5);
    let v = function.constant_f32(0.25);
    let undef_coord = function.undef(handles.f32_ty);
    let undef_offset = function.undef(handles.i32_ty);
    let dref = function.constant_f32(0.75);
    function.inst(
        handles.entry,
        handles.result_ty,
        hlir::Instruction::Call {
            callee: "dx.op.sampleCmpLevelZero".to_string(),
            arguments: vec![
                sample_cmp,
                handles.image_handle,
                handles.sampler_handle,
                u,
                v,
                undef_coord,
                undef_coord,
                undef_offset,
                undef_offset,
                undef_offset,
                dref,
            ],
        },
    );
    function.terminate(handles.entry, hlir::Terminator::Return { value: None });
    let entry = handles.entry;
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    // the combined image is built over a depth variant of the texture type
    assert!(declarations_of(&builder, Op::TypeImage)
        .iter()
        .any(|image| image.arguments[2] == 1));

    let operations = &converted.pool[converted.entry].operations;
    let sample = &operations[operations.len() - 2];
    assert_eq!(sample.op, Op::ImageSampleDrefExplicitLod);
    assert_eq!(sample.arguments.len(), 4);
    assert_eq!(sample.arguments[2], spirv::ImageOperands::LOD.bits());
    assert_eq!(sample.arguments[3], float_constant_id(&builder, 0.0));
    let float_type = type_id_by(&builder, Op::TypeFloat, &[32]);
    assert_eq!(sample.result_type_id, float_type);

    // the scalar comparison result is splatted back into a 4-vector
    let splat = operations.last().unwrap();
    assert_eq!(splat.op, Op::CompositeConstruct);
    assert_eq!(splat.arguments, vec![sample.result_id; 4]);
    let vec4_type = type_id_by(&builder, Op::TypeVector, &[float_type, 4]);
    assert_eq!(splat.result_type_id, vec4_type);
}

#[test]
fn sample_with_min_lod_clamp() {
    let (mut module, mut function, handles) = sampling_module();

    let sample = function.constant_u32(60);
    let u = function.constant_f32(0.5);
    let v = function.constant_f32(0.25);
    let undef_coord = function.undef(handles.f32_ty);
    let undef_offset = function.undef(handles.i32_ty);
    let clamp = function.constant_f32(1.5);
    function.inst(
        handles.entry,
        handles.result_ty,
        hlir::Instruction::Call {
            callee: "dx.op.sample".to_string(),
            arguments: vec![
                sample,
                handles.image_handle,
                handles.sampler_handle,
                u,
                v,
                undef_coord,
                undef_coord,
                undef_offset,
                undef_offset,
                undef_offset,
                clamp,
            ],
        },
    );
    function.terminate(handles.entry, hlir::Terminator::Return { value: None });
    let entry = handles.entry;
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    assert!(builder.capabilities().contains(&spirv::Capability::MinLod));

    let operations = &converted.pool[converted.entry].operations;
    let sample = operations.last().unwrap();
    assert_eq!(sample.op, Op::ImageSampleImplicitLod);
    assert_eq!(sample.arguments.len(), 4);
    assert_eq!(sample.arguments[2], spirv::ImageOperands::MIN_LOD.bits());
    assert_eq!(sample.arguments[3], float_constant_id(&builder, 1.5));
}

#[test]
fn scratch_variable_roundtrip() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "vs");
    set_entry_point(&mut module, "main", Vec::new(), Vec::new());

    let f32_ty = module.types.insert(hlir::Type::Float { width: 32 });
    let bool_ty = module.types.insert(hlir::Type::Integer { width: 1 });
    let array_ty = module.types.insert(hlir::Type::Array {
        element: f32_ty,
        length: 4,
    });
    let array_ptr_ty = module.types.insert(hlir::Type::Pointer { pointee: array_ty });
    let f32_ptr_ty = module.types.insert(hlir::Type::Pointer { pointee: f32_ty });

    let mut function = FunctionBuilder::new();
    let entry = function.block("entry");

    let one = function.constant_u32(1);
    let scratch = function.inst(
        entry,
        array_ptr_ty,
        hlir::Instruction::Alloca { array_size: one },
    );
    let zero = function.constant_u32(0);
    let two = function.constant_u32(2);
    let element = function.inst(
        entry,
        f32_ptr_ty,
        hlir::Instruction::GetElementPtr {
            in_bounds: true,
            base: scratch,
            indices: vec![zero, two],
        },
    );
    let stored = function.constant_f32(3.0);
    let void_ty = module.types.insert(hlir::Type::Void);
    function.inst(
        entry,
        void_ty,
        hlir::Instruction::Store {
            value: stored,
            pointer: element,
        },
    );
    let loaded = function.inst(entry, f32_ty, hlir::Instruction::Load { pointer: element });
    let bias = function.constant_f32(1.0);
    let sum = function.inst(
        entry,
        f32_ty,
        hlir::Instruction::Binary {
            op: hlir::BinaryOp::FAdd,
            lhs: loaded,
            rhs: bias,
        },
    );
    let limit = function.constant_f32(2.0);
    let below = function.inst(
        entry,
        bool_ty,
        hlir::Instruction::Compare {
            op: hlir::ComparePredicate::FcmpOlt,
            lhs: sum,
            rhs: limit,
        },
    );
    let fallback = function.constant_f32(4.0);
    function.inst(
        entry,
        f32_ty,
        hlir::Instruction::Select {
            condition: below,
            accept: sum,
            reject: fallback,
        },
    );
    function.terminate(entry, hlir::Terminator::Return { value: None });
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    // the stack slot becomes a function-storage variable of the array type
    let scratch_variables = variables_of_class(&builder, StorageClass::Function);
    assert_eq!(scratch_variables.len(), 1);
    let float_type = type_id_by(&builder, Op::TypeFloat, &[32]);
    let array_type = type_id_by(
        &builder,
        Op::TypeArray,
        &[float_type, uint_constant_id(&builder, 4)],
    );
    assert_eq!(builder.get_deref_type_id(scratch_variables[0]), array_type);

    let operations = &converted.pool[converted.entry].operations;
    let kinds: Vec<Op> = operations.iter().map(|operation| operation.op).collect();
    assert_eq!(
        kinds,
        [
            Op::InBoundsAccessChain,
            Op::Store,
            Op::Load,
            Op::FAdd,
            Op::FOrdLessThan,
            Op::Select,
        ]
    );

    // the constant-zero leading index is dropped from the chain
    assert_eq!(
        operations[0].arguments,
        [scratch_variables[0], uint_constant_id(&builder, 2)]
    );
    // store emits (pointer, value)
    assert_eq!(
        operations[1].arguments,
        [operations[0].result_id, float_constant_id(&builder, 3.0)]
    );
    assert_eq!(operations[2].arguments, [operations[0].result_id]);
    assert_eq!(
        operations[5].arguments,
        [
            operations[4].result_id,
            operations[3].result_id,
            float_constant_id(&builder, 4.0),
        ]
    );
}

#[test]
fn conditional_branch_with_phi() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "vs");
    set_entry_point(&mut module, "main", Vec::new(), Vec::new());

    let f32_ty = module.types.insert(hlir::Type::Float { width: 32 });
    let bool_ty = module.types.insert(hlir::Type::Integer { width: 1 });

    let mut function = FunctionBuilder::new();
    let entry = function.block("entry");
    let then_block = function.block("bb1");
    let else_block = function.block("bb2");
    let join = function.block("bb3");

    let condition = function.undef(bool_ty);
    function.terminate(
        entry,
        hlir::Terminator::BranchConditional {
            condition,
            true_block: then_block,
            false_block: else_block,
        },
    );
    function.terminate(then_block, hlir::Terminator::Branch { target: join });
    function.terminate(else_block, hlir::Terminator::Branch { target: join });

    let a = function.constant_f32(1.0);
    let b = function.constant_f32(2.0);
    function.inst(
        join,
        f32_ty,
        hlir::Instruction::Phi {
            incoming: vec![(a, then_block), (b, else_block)],
        },
    );
    function.terminate(join, hlir::Terminator::Return { value: None });
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    let then_node = find_node(&converted.pool, "bb1");
    let else_node = find_node(&converted.pool, "bb2");
    let join_node = find_node(&converted.pool, "bb3");

    assert_eq!(
        converted.pool[converted.entry].successors,
        vec![then_node, else_node]
    );
    match converted.pool[converted.entry].terminator {
        Some(gir::Terminator::BranchConditional {
            condition,
            true_block,
            false_block,
        }) => {
            assert_ne!(condition, 0);
            assert_eq!(true_block, then_node);
            assert_eq!(false_block, else_node);
        }
        ref other => panic!("unexpected terminator {other:?}"),
    }

    // the phi stays out of the operation stream
    let join_ir = &converted.pool[join_node];
    assert!(join_ir.operations.is_empty());
    assert_eq!(join_ir.phis.len(), 1);
    let phi = &join_ir.phis[0];
    assert_eq!(
        phi.incoming,
        vec![
            gir::Incoming {
                block: then_node,
                id: float_constant_id(&builder, 1.0),
            },
            gir::Incoming {
                block: else_node,
                id: float_constant_id(&builder, 2.0),
            },
        ]
    );
}

#[test]
fn switch_terminator() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "vs");
    set_entry_point(&mut module, "main", Vec::new(), Vec::new());

    let mut function = FunctionBuilder::new();
    let entry = function.block("entry");
    let default_block = function.block("bbd");
    let case0 = function.block("bb0");
    let case1 = function.block("bb1");

    let selector = function.constant_u32(7);
    function.terminate(
        entry,
        hlir::Terminator::Switch {
            selector,
            default: default_block,
            cases: vec![(0, case0), (1, case1)],
        },
    );
    for block in [default_block, case0, case1] {
        function.terminate(block, hlir::Terminator::Return { value: None });
    }
    module.functions.push(function.finish("main", entry));

    let (builder, converted) = convert(&module);

    let default_node = find_node(&converted.pool, "bbd");
    let case0_node = find_node(&converted.pool, "bb0");
    let case1_node = find_node(&converted.pool, "bb1");

    assert_eq!(
        converted.pool[converted.entry].terminator,
        Some(gir::Terminator::Switch {
            selector: uint_constant_id(&builder, 7),
            default: default_node,
            cases: vec![
                gir::SwitchCase {
                    value: 0,
                    block: case0_node,
                },
                gir::SwitchCase {
                    value: 1,
                    block: case1_node,
                },
            ],
        })
    );
    assert_eq!(
        converted.pool[converted.entry].successors,
        vec![default_node, case0_node, case1_node]
    );
}

//
// Error and idempotence properties
//

#[test]
fn missing_entry_point_metadata_is_fatal() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "vs");

    let mut builder = Builder::default();
    match lower::convert_entry_point(&module, &mut builder) {
        Err(lower::Error::MissingNamedMetadata(name)) => assert_eq!(name, "dx.entryPoints"),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("lowering unexpectedly succeeded"),
    }
}

#[test]
fn unknown_shader_model_is_fatal() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "xx");
    set_entry_point(&mut module, "main", Vec::new(), Vec::new());

    let mut builder = Builder::default();
    assert!(matches!(
        lower::convert_entry_point(&module, &mut builder),
        Err(lower::Error::UnknownShaderModel(_))
    ));
}

#[test]
fn lowering_is_deterministic() {
    let mut module = hlir::Module::default();
    set_shader_model(&mut module, "vs");
    let input = signature_element(&mut module, 0, "POSITION", 9, 0, 1, 4, 0);
    let output = signature_element(&mut module, 1, "SV_Position", 9, 3, 1, 4, 0);
    set_entry_point(&mut module, "main", vec![input], vec![output]);
    let cbv = cbv_entry(&mut module, 0, "cb0", 0, 0, 32);
    let cbvs = add_node(&mut module, vec![node(cbv)]);
    set_resources(&mut module, None, None, Some(cbvs), None);

    let mut function = FunctionBuilder::new();
    let entry = function.block("entry");
    function.terminate(entry, hlir::Terminator::Return { value: None });
    module.functions.push(function.finish("main", entry));

    let (builder_a, converted_a) = convert(&module);
    let (builder_b, converted_b) = convert(&module);

    assert_eq!(builder_a.declarations, builder_b.declarations);
    assert_eq!(builder_a.annotations, builder_b.annotations);
    assert_eq!(
        converted_a.pool[converted_a.entry].operations,
        converted_b.pool[converted_b.entry].operations
    );
}
