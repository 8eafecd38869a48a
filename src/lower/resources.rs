/*! Resource binding: metadata lists into module-scope variables.

Each entry of the SRV/UAV/CBV/sampler lists becomes one decorated variable,
and its variable id lands in a per-kind table indexed by the entry's range
index, where handle creation later finds it.
*/

use super::{Error, LoweringContext};
use crate::arena::Handle;
use crate::hlir::{CbvEntry, MetadataNode, NodeView, ResourceKind, SamplerEntry, SrvEntry};
use spirv::Word;

/// Per-kind tables from metadata range index to variable id. Grown on
/// demand; unoccupied slots hold the 0 sentinel.
#[derive(Default)]
pub struct ResourceBinder {
    pub srv_index_to_id: Vec<Word>,
    pub uav_index_to_id: Vec<Word>,
    pub cbv_index_to_id: Vec<Word>,
    pub sampler_index_to_id: Vec<Word>,
}

fn bind_slot(table: &mut Vec<Word>, index: u32, id: Word) {
    let index = index as usize;
    if table.len() <= index {
        table.resize(index + 1, 0);
    }
    table[index] = id;
}

const fn image_dimension(kind: ResourceKind) -> spirv::Dim {
    match kind {
        ResourceKind::Texture1D | ResourceKind::Texture1DArray => spirv::Dim::Dim1D,
        ResourceKind::Texture2D
        | ResourceKind::Texture2DMS
        | ResourceKind::Texture2DArray
        | ResourceKind::Texture2DMSArray => spirv::Dim::Dim2D,
        ResourceKind::Texture3D => spirv::Dim::Dim3D,
        ResourceKind::TextureCube | ResourceKind::TextureCubeArray => spirv::Dim::DimCube,
        ResourceKind::TypedBuffer | ResourceKind::StructuredBuffer | ResourceKind::RawBuffer => {
            spirv::Dim::DimBuffer
        }
    }
}

const fn image_arrayed(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::Texture1DArray
            | ResourceKind::Texture2DArray
            | ResourceKind::Texture2DMSArray
            | ResourceKind::TextureCubeArray
    )
}

const fn image_multisampled(kind: ResourceKind) -> bool {
    matches!(
        kind,
        ResourceKind::Texture2DMS | ResourceKind::Texture2DMSArray
    )
}

fn variable_name(name: &str) -> Option<&str> {
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

impl LoweringContext<'_> {
    pub(super) fn emit_resources(&mut self) -> Result<(), Error> {
        let Some(list) = self.module.named_metadata_node("dx.resources") else {
            return Ok(());
        };
        let view = NodeView::new(&self.module.metadata, list)?;
        if let Some(srvs) = view.opt_node(0)? {
            self.emit_srvs(srvs)?;
        }
        if let Some(uavs) = view.opt_node(1)? {
            self.emit_uavs(uavs)?;
        }
        if let Some(cbvs) = view.opt_node(2)? {
            self.emit_cbvs(cbvs)?;
        }
        if let Some(samplers) = view.opt_node(3)? {
            self.emit_samplers(samplers)?;
        }
        Ok(())
    }

    fn emit_srvs(&mut self, srvs: Handle<MetadataNode>) -> Result<(), Error> {
        let view = NodeView::new(&self.module.metadata, srvs)?;
        for index in 0..view.len() {
            let entry = match SrvEntry::from_node(&self.module.metadata, view.node(index)?) {
                Ok(entry) => entry,
                Err(error) => {
                    log::error!("skipping SRV entry: {}", error);
                    continue;
                }
            };

            let sampled_type_id = match entry.component {
                Some(component) => self.types.synth(self.builder, component, 1, 1),
                // structured and raw buffers read as uint; users bitcast
                None => self.builder.make_integer_type(32, false),
            };

            let type_id = self.builder.make_image_type(
                sampled_type_id,
                image_dimension(entry.kind),
                false,
                image_arrayed(entry.kind),
                image_multisampled(entry.kind),
                1,
                spirv::ImageFormat::Unknown,
            );

            let variable_id = self.builder.create_variable(
                spirv::StorageClass::UniformConstant,
                type_id,
                variable_name(&entry.name),
            );
            self.builder.add_decoration(
                variable_id,
                spirv::Decoration::DescriptorSet,
                &[entry.bind_space],
            );
            self.builder.add_decoration(
                variable_id,
                spirv::Decoration::Binding,
                &[entry.bind_register],
            );

            bind_slot(&mut self.resources.srv_index_to_id, entry.index, variable_id);
        }
        Ok(())
    }

    fn emit_uavs(&mut self, uavs: Handle<MetadataNode>) -> Result<(), Error> {
        let view = NodeView::new(&self.module.metadata, uavs)?;
        if !view.is_empty() {
            log::warn!("ignoring {} UAV resource(s)", view.len());
        }
        // Keep the index table sized anyway so handle creation indexes
        // safely and binds the 0 sentinel.
        for index in 0..view.len() {
            let entry_view = NodeView::new(&self.module.metadata, view.node(index)?)?;
            bind_slot(&mut self.resources.uav_index_to_id, entry_view.int_u32(0)?, 0);
        }
        Ok(())
    }

    fn emit_cbvs(&mut self, cbvs: Handle<MetadataNode>) -> Result<(), Error> {
        let view = NodeView::new(&self.module.metadata, cbvs)?;
        for index in 0..view.len() {
            let entry = match CbvEntry::from_node(&self.module.metadata, view.node(index)?) {
                Ok(entry) => entry,
                Err(error) => {
                    log::error!("skipping CBV entry: {}", error);
                    continue;
                }
            };

            // The buffer is exposed as an array of vec4<f32> rows; loads
            // bitcast away from float when the consumer wants integers.
            let vec4_length = (entry.size_bytes + 15) / 16;
            let float_type = self.builder.make_float_type(32);
            let vec4_type = self.builder.make_vector_type(float_type, 4);
            let length_id = self.builder.make_uint_constant(vec4_length);
            let member_array_type = self.builder.make_array_type(vec4_type, length_id, 16);
            self.builder
                .add_decoration(member_array_type, spirv::Decoration::ArrayStride, &[16]);

            let struct_type = self
                .builder
                .make_struct_type(vec![member_array_type], &entry.name);
            self.builder
                .add_member_decoration(struct_type, 0, spirv::Decoration::Offset, &[0]);
            self.builder
                .add_decoration(struct_type, spirv::Decoration::Block, &[]);

            let variable_id = self.builder.create_variable(
                spirv::StorageClass::Uniform,
                struct_type,
                variable_name(&entry.name),
            );
            self.builder.add_decoration(
                variable_id,
                spirv::Decoration::DescriptorSet,
                &[entry.bind_space],
            );
            self.builder.add_decoration(
                variable_id,
                spirv::Decoration::Binding,
                &[entry.bind_register],
            );

            bind_slot(&mut self.resources.cbv_index_to_id, entry.index, variable_id);
        }
        Ok(())
    }

    fn emit_samplers(&mut self, samplers: Handle<MetadataNode>) -> Result<(), Error> {
        let view = NodeView::new(&self.module.metadata, samplers)?;
        for index in 0..view.len() {
            let entry = match SamplerEntry::from_node(&self.module.metadata, view.node(index)?) {
                Ok(entry) => entry,
                Err(error) => {
                    log::error!("skipping sampler entry: {}", error);
                    continue;
                }
            };

            let type_id = self.builder.make_sampler_type();
            let variable_id = self.builder.create_variable(
                spirv::StorageClass::UniformConstant,
                type_id,
                variable_name(&entry.name),
            );
            self.builder.add_decoration(
                variable_id,
                spirv::Decoration::DescriptorSet,
                &[entry.bind_space],
            );
            self.builder.add_decoration(
                variable_id,
                spirv::Decoration::Binding,
                &[entry.bind_register],
            );

            bind_slot(
                &mut self.resources.sampler_index_to_id,
                entry.index,
                variable_id,
            );
        }
        Ok(())
    }
}
