/*! Lowering of one HLIR entry point into a GIR function.

[`convert_entry_point`] drives the whole conversion: decode the execution
model, emit resource and stage I/O variables, discover the CFG breadth-first
from the entry block, then translate every instruction and terminator in
discovery order. State lives in a [`LoweringContext`] threaded through the
per-instruction code: the type, value, and resource tables, the stage I/O
and handle maps, and a borrow of the caller's [`Builder`].

Failures split two ways. Missing or malformed module-level metadata aborts
with an [`Error`]; everything else — an unknown intrinsic, a constant the
target cannot express, an assumption the input violates — logs a diagnostic
and skips the instruction, leaving a hole in the id graph for a downstream
consumer to flag. Partial translation is deliberate.
*/

mod block;
mod image;
mod resources;
mod types;
mod values;

pub use resources::ResourceBinder;
pub use types::TypeTable;
pub use values::ValueTable;

use crate::arena::Handle;
use crate::gir::{self, Builder, CFGNode, CFGNodePool, ConvertedFunction};
use crate::hlir::{self, MetadataError, MetadataNode, NodeView, Semantic, SignatureElement};
use crate::FastHashMap;
use spirv::Word;
use std::mem;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("missing named metadata {0:?}")]
    MissingNamedMetadata(&'static str),
    #[error("unknown shader model {0:?}")]
    UnknownShaderModel(String),
    #[error("entry point function {0:?} is not defined in the module")]
    UnknownEntryPoint(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Everything the per-instruction code needs, in one place.
struct LoweringContext<'a> {
    builder: &'a mut Builder,
    module: &'a hlir::Module,
    function: &'a hlir::Function,

    types: TypeTable,
    values: ValueTable,
    resources: ResourceBinder,

    /// Stage I/O: signature element id to variable id.
    input_elements: FastHashMap<u32, Word>,
    output_elements: FastHashMap<u32, Word>,
    /// Handle-creation results: loaded image/sampler ids, or the variable id
    /// itself for constant and storage buffers.
    handle_values: FastHashMap<Handle<hlir::Value>, Word>,

    /// HLIR basic block to its CFG node.
    bb_map: FastHashMap<Handle<hlir::BasicBlock>, Handle<CFGNode>>,
}

impl LoweringContext<'_> {
    fn get_id(&mut self, value: Handle<hlir::Value>) -> Word {
        self.values
            .get_id(self.builder, &self.types, self.module, self.function, value, 0)
    }

    fn get_id_forced(&mut self, value: Handle<hlir::Value>, width: u8) -> Word {
        self.values
            .get_id(self.builder, &self.types, self.module, self.function, value, width)
    }

    /// Integer constant payload of `value`, if it is one.
    fn constant_value(&self, value: Handle<hlir::Value>) -> Option<u64> {
        match self.function.values[value] {
            hlir::Value::Constant(hlir::Constant::Integer { value, .. }) => Some(value),
            _ => None,
        }
    }

    fn is_undef(&self, value: Handle<hlir::Value>) -> bool {
        matches!(self.function.values[value], hlir::Value::Undef(_))
    }

    fn emit_stage_variables(&mut self) -> Result<(), Error> {
        let entry = self
            .module
            .named_metadata_node("dx.entryPoints")
            .ok_or(Error::MissingNamedMetadata("dx.entryPoints"))?;
        let entry_view = NodeView::new(&self.module.metadata, entry)?;
        let Some(signature) = entry_view.opt_node(2)? else {
            return Ok(());
        };
        let signature_view = NodeView::new(&self.module.metadata, signature)?;
        if let Some(inputs) = signature_view.opt_node(0)? {
            self.emit_signature_list(inputs, spirv::StorageClass::Input)?;
        }
        if let Some(outputs) = signature_view.opt_node(1)? {
            self.emit_signature_list(outputs, spirv::StorageClass::Output)?;
        }
        Ok(())
    }

    fn emit_signature_list(
        &mut self,
        list: Handle<MetadataNode>,
        class: spirv::StorageClass,
    ) -> Result<(), Error> {
        let view = NodeView::new(&self.module.metadata, list)?;
        let mut location = 0;
        for index in 0..view.len() {
            let node = view.node(index)?;
            let element = match SignatureElement::from_node(&self.module.metadata, node) {
                Ok(element) => element,
                Err(error) => {
                    log::error!("skipping signature element: {}", error);
                    continue;
                }
            };

            let type_id = self.types.synth(
                self.builder,
                element.component_type,
                element.rows,
                element.cols,
            );
            let variable_id =
                self.builder
                    .create_variable(class, type_id, Some(&element.semantic_name));
            let elements = if class == spirv::StorageClass::Output {
                &mut self.output_elements
            } else {
                &mut self.input_elements
            };
            elements.insert(element.element_id, variable_id);

            if class == spirv::StorageClass::Output && element.semantic == Semantic::Target {
                // render targets take their location from the semantic index
                self.builder.add_decoration(
                    variable_id,
                    spirv::Decoration::Location,
                    &[element.start_row],
                );
            } else if element.semantic != Semantic::User {
                self.emit_builtin_decoration(variable_id, element.semantic);
            } else {
                self.builder
                    .add_decoration(variable_id, spirv::Decoration::Location, &[location]);
                location += element.rows;
            }

            self.builder.add_entry_point_interface(variable_id);
        }
        Ok(())
    }

    fn emit_builtin_decoration(&mut self, id: Word, semantic: Semantic) {
        match semantic {
            Semantic::Position => self.builder.add_decoration(
                id,
                spirv::Decoration::BuiltIn,
                &[spirv::BuiltIn::Position as Word],
            ),
            // remaining builtins are skipped until they are mapped
            _ => {}
        }
    }

    fn lower_terminator(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        terminator: &hlir::Terminator,
    ) {
        let lowered = match *terminator {
            hlir::Terminator::Branch { target } => gir::Terminator::Branch {
                target: self.bb_map[&target],
            },
            hlir::Terminator::BranchConditional {
                condition,
                true_block,
                false_block,
            } => gir::Terminator::BranchConditional {
                condition: self.get_id(condition),
                true_block: self.bb_map[&true_block],
                false_block: self.bb_map[&false_block],
            },
            hlir::Terminator::Switch {
                selector,
                default,
                ref cases,
            } => gir::Terminator::Switch {
                selector: self.get_id(selector),
                default: self.bb_map[&default],
                cases: cases
                    .iter()
                    .map(|&(value, block)| gir::SwitchCase {
                        value,
                        block: self.bb_map[&block],
                    })
                    .collect(),
            },
            hlir::Terminator::Return { value } => gir::Terminator::Return {
                value: value.map(|value| self.get_id(value)),
            },
            hlir::Terminator::Unreachable => gir::Terminator::Unreachable,
        };
        pool[node].terminator = Some(lowered);
    }
}

fn execution_model(module: &hlir::Module) -> Result<spirv::ExecutionModel, Error> {
    let node = module
        .named_metadata_node("dx.shaderModel")
        .ok_or(Error::MissingNamedMetadata("dx.shaderModel"))?;
    let view = NodeView::new(&module.metadata, node)?;
    Ok(match view.string(0)? {
        "vs" => spirv::ExecutionModel::Vertex,
        "ps" => spirv::ExecutionModel::Fragment,
        "hs" => spirv::ExecutionModel::TessellationControl,
        "ds" => spirv::ExecutionModel::TessellationEvaluation,
        "gs" => spirv::ExecutionModel::Geometry,
        "cs" => spirv::ExecutionModel::GLCompute,
        other => return Err(Error::UnknownShaderModel(other.to_string())),
    })
}

fn entry_point_name(module: &hlir::Module) -> Result<String, Error> {
    let node = module
        .named_metadata_node("dx.entryPoints")
        .ok_or(Error::MissingNamedMetadata("dx.entryPoints"))?;
    let view = NodeView::new(&module.metadata, node)?;
    Ok(view.string(1)?.to_string())
}

/// Lower the module's entry point into a GIR function.
///
/// Module-scope output (types, constants, variables, decorations, the
/// entry-point record) accumulates in `builder`; the function body is
/// returned as a [`ConvertedFunction`] owning its CFG node pool.
pub fn convert_entry_point(
    module: &hlir::Module,
    builder: &mut Builder,
) -> Result<ConvertedFunction, Error> {
    let execution_model = execution_model(module)?;
    builder.emit_entry_point(execution_model, "main");

    let entry_name = entry_point_name(module)?;
    let function = module
        .function_by_name(&entry_name)
        .ok_or_else(|| Error::UnknownEntryPoint(entry_name.clone()))?;

    let mut ctx = LoweringContext {
        builder,
        module,
        function,
        types: TypeTable::default(),
        values: ValueTable::default(),
        resources: ResourceBinder::default(),
        input_elements: FastHashMap::default(),
        output_elements: FastHashMap::default(),
        handle_values: FastHashMap::default(),
        bb_map: FastHashMap::default(),
    };

    ctx.emit_resources()?;
    ctx.emit_stage_variables()?;

    // Traverse the CFG breadth-first and register all reachable blocks in
    // the pool before any instruction is visited; phis and forward branches
    // need the complete block map.
    let mut pool = CFGNodePool::default();
    let entry_block = function.entry;
    let entry_node = pool.create_node(format!("{}.entry", function.blocks[entry_block].name));
    ctx.bb_map.insert(entry_block, entry_node);

    let mut to_process = vec![entry_block];
    let mut processing = Vec::new();
    let mut visit_order = Vec::new();
    while !to_process.is_empty() {
        mem::swap(&mut to_process, &mut processing);
        for &block in processing.iter() {
            visit_order.push(block);
            for successor in function.blocks[block].terminator.successors() {
                if !ctx.bb_map.contains_key(&successor) {
                    let node = pool.create_node(function.blocks[successor].name.clone());
                    ctx.bb_map.insert(successor, node);
                    to_process.push(successor);
                }
                pool.add_branch(ctx.bb_map[&block], ctx.bb_map[&successor]);
            }
        }
        processing.clear();
    }

    for &block in &visit_order {
        let node = ctx.bb_map[&block];
        for &instruction in &function.blocks[block].instructions {
            ctx.emit_instruction(&mut pool, node, instruction);
        }
        ctx.lower_terminator(&mut pool, node, &function.blocks[block].terminator);
    }

    Ok(ConvertedFunction {
        pool,
        entry: entry_node,
    })
}
