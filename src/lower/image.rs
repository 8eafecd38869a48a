/*! Texture sampling lowering.

Sampling intrinsics combine a loaded image handle and sampler handle into a
sampled image, gather coordinate and offset operands, pick the implicit or
explicit LOD opcode, and assemble the image-operands tail. Comparison
variants return a scalar which gets splatted back to the 4-vector the value
graph expects.
*/

use super::LoweringContext;
use crate::arena::Handle;
use crate::gir::{CFGNode, CFGNodePool, Operation};
use crate::hlir::{self, OpTableCode};
use spirv::{ImageOperands, Op, Word};

impl LoweringContext<'_> {
    /// `OpSampledImage` of the two handles. The image type is re-made with
    /// the depth flag of the sampling variant, since a depth-comparison
    /// sample needs a depth image type.
    fn build_sampled_image(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        image_id: Word,
        sampler_id: Word,
        comparison: bool,
    ) -> Word {
        let image_type_id = self.types.type_of_id(image_id);
        let Some(dim) = self.builder.get_type_dimensionality(image_type_id) else {
            log::error!("sampling from a handle that is not an image");
            return 0;
        };
        let arrayed = self.builder.is_arrayed_image_type(image_type_id);
        let multisampled = self.builder.is_multisampled_image_type(image_type_id);
        let sampled_format = self.builder.get_image_component_type(image_type_id);

        let image_type_id = self.builder.make_image_type(
            sampled_format,
            dim,
            comparison,
            arrayed,
            multisampled,
            2,
            spirv::ImageFormat::Unknown,
        );

        let id = self.builder.allocate_id();
        let mut operation = Operation::new(Op::SampledImage);
        operation.result_id = id;
        operation.result_type_id = self.builder.make_sampled_image_type(image_type_id);
        operation.add_operand(image_id);
        operation.add_operand(sampler_id);
        pool[node].operations.push(operation);
        id
    }

    /// A vector of `elements`, or the element itself when there is only
    /// one.
    fn build_vector(
        &mut self,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        element_type: Word,
        elements: &[Word],
    ) -> Word {
        if let [element] = *elements {
            return element;
        }
        let id = self.builder.allocate_id();
        let mut operation = Operation::new(Op::CompositeConstruct);
        operation.result_id = id;
        operation.result_type_id = self
            .builder
            .make_vector_type(element_type, elements.len() as u32);
        operation.add_operands(elements.iter().copied());
        pool[node].operations.push(operation);
        id
    }

    pub(super) fn emit_sample(
        &mut self,
        code: OpTableCode,
        pool: &mut CFGNodePool,
        node: Handle<CFGNode>,
        value: Handle<hlir::Value>,
        ty: Handle<hlir::Type>,
        arguments: &[Handle<hlir::Value>],
    ) {
        let comparison =
            matches!(code, OpTableCode::SampleCmp | OpTableCode::SampleCmpLevelZero);

        let (Some(&image), Some(&sampler)) = (arguments.get(1), arguments.get(2)) else {
            log::error!("sample without image and sampler operands");
            return;
        };
        let image_id = self.handle_values.get(&image).copied().unwrap_or(0);
        let sampler_id = self.handle_values.get(&sampler).copied().unwrap_or(0);
        if image_id == 0 || sampler_id == 0 {
            log::error!("sample from an unbound image or sampler handle");
            return;
        }

        let combined_id = self.build_sampled_image(pool, node, image_id, sampler_id, comparison);

        let image_type_id = self.types.type_of_id(image_id);
        let Some(dim) = self.builder.get_type_dimensionality(image_type_id) else {
            return;
        };
        let arrayed = self.builder.is_arrayed_image_type(image_type_id);

        let num_coords = match dim {
            spirv::Dim::Dim1D | spirv::Dim::DimBuffer => 1,
            spirv::Dim::Dim2D => 2,
            spirv::Dim::Dim3D | spirv::Dim::DimCube => 3,
            _ => {
                log::error!("unexpected sample dimensionality {:?}", dim);
                return;
            }
        };
        let num_coords_full = if arrayed { num_coords + 1 } else { num_coords };

        let mut coords: [Word; 4] = [0; 4];
        for (offset, coord) in coords[..num_coords_full].iter_mut().enumerate() {
            let Some(&operand) = arguments.get(3 + offset) else {
                log::error!("sample is missing coordinate operand {}", offset);
                return;
            };
            *coord = self.get_id(operand);
        }

        let mut image_ops = ImageOperands::empty();
        match code {
            OpTableCode::SampleLevel | OpTableCode::SampleCmpLevelZero => {
                image_ops |= ImageOperands::LOD;
            }
            OpTableCode::SampleBias => {
                image_ops |= ImageOperands::BIAS;
            }
            _ => {}
        }

        // Offsets must be compile-time; undef reads as 0, and the operand
        // mask is only raised when some offset is actually non-zero.
        let mut offsets: [Word; 3] = [0; 3];
        for (index, slot) in offsets[..num_coords].iter_mut().enumerate() {
            let Some(&operand) = arguments.get(7 + index) else {
                log::error!("sample is missing offset operand {}", index);
                return;
            };
            let literal = if self.is_undef(operand) {
                0
            } else {
                match self.constant_value(operand) {
                    Some(raw) => raw as u32 as i32,
                    None => {
                        log::error!("sample offsets must be constant");
                        0
                    }
                }
            };
            if literal != 0 {
                image_ops |= ImageOperands::CONST_OFFSET;
            }
            *slot = self.builder.make_int_constant(literal);
        }

        let dref_id = if code == OpTableCode::SampleCmp {
            arguments.get(10).map(|&a| self.get_id(a)).unwrap_or(0)
        } else {
            0
        };

        let aux_index = if code == OpTableCode::SampleCmp { 11 } else { 10 };
        let mut aux_argument = 0;
        match code {
            OpTableCode::Sample | OpTableCode::SampleCmp => {
                // a defined clamp operand turns into a minimum LOD
                if let Some(&operand) = arguments.get(aux_index) {
                    if !self.is_undef(operand) {
                        aux_argument = self.get_id(operand);
                        image_ops |= ImageOperands::MIN_LOD;
                        self.builder.add_capability(spirv::Capability::MinLod);
                    }
                }
            }
            OpTableCode::SampleCmpLevelZero => {
                aux_argument = self.builder.make_float_constant(0.0);
            }
            _ => {
                if let Some(&operand) = arguments.get(aux_index) {
                    aux_argument = self.get_id(operand);
                }
            }
        }

        let op = match code {
            OpTableCode::SampleLevel => Op::ImageSampleExplicitLod,
            OpTableCode::SampleCmp => Op::ImageSampleDrefImplicitLod,
            OpTableCode::SampleCmpLevelZero => Op::ImageSampleDrefExplicitLod,
            _ => Op::ImageSampleImplicitLod,
        };

        // The result arrives as a struct whose leading member is the texel
        // component; a trailing status member only matters for tiled
        // resources and stays untouched.
        let scalar_type_id = match self.module.types[ty] {
            hlir::Type::Struct { ref members } if !members.is_empty() => {
                self.types.type_of_hlir(self.builder, self.module, members[0])
            }
            _ => {
                log::error!("sample result is not a struct");
                return;
            }
        };

        // Comparison sampling only returns a scalar; the splat below
        // restores the 4-vector shape the value graph expects.
        let sampled_value_id = if comparison {
            self.builder.allocate_id()
        } else {
            self.get_id(value)
        };

        let mut operation = Operation::new(op);
        operation.result_id = sampled_value_id;
        operation.result_type_id = if comparison {
            scalar_type_id
        } else {
            self.builder.make_vector_type(scalar_type_id, 4)
        };

        operation.add_operand(combined_id);
        let float_type = self.builder.make_float_type(32);
        let coordinate_id = self.build_vector(pool, node, float_type, &coords[..num_coords_full]);
        operation.add_operand(coordinate_id);

        if dref_id != 0 {
            operation.add_operand(dref_id);
        }

        if !image_ops.is_empty() {
            operation.add_operand(image_ops.bits());
            if image_ops.intersects(ImageOperands::BIAS | ImageOperands::LOD) {
                operation.add_operand(aux_argument);
            }
            if image_ops.contains(ImageOperands::CONST_OFFSET) {
                let int_type = self.builder.make_integer_type(32, true);
                let offset_id = self.build_vector(pool, node, int_type, &offsets[..num_coords]);
                operation.add_operand(offset_id);
            }
            if image_ops.contains(ImageOperands::MIN_LOD) {
                operation.add_operand(aux_argument);
            }
        }

        pool[node].operations.push(operation);

        if comparison {
            let mut operation = Operation::new(Op::CompositeConstruct);
            operation.result_id = self.get_id(value);
            let float_type = self.builder.make_float_type(32);
            operation.result_type_id = self.builder.make_vector_type(float_type, 4);
            operation.arguments = vec![sampled_value_id; 4];
            pool[node].operations.push(operation);
        }
    }
}
