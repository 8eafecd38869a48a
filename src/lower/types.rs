use crate::arena::Handle;
use crate::gir::Builder;
use crate::hlir::{self, ComponentType};
use crate::FastHashMap;
use spirv::Word;

/// Maps HLIR types and synthesized component descriptors to interned GIR
/// type ids, and remembers the pointee type of loaded resource handles.
#[derive(Default)]
pub struct TypeTable {
    /// Pointee types of handle ids, recorded at image/sampler load sites.
    id_to_type: FastHashMap<Word, Word>,
}

impl TypeTable {
    /// GIR type of an HLIR type. Pointers land in `Function` storage;
    /// callers override the class for anything non-local. Returns 0 for
    /// types with no direct GIR counterpart.
    pub fn type_of_hlir(
        &self,
        builder: &mut Builder,
        module: &hlir::Module,
        ty: Handle<hlir::Type>,
    ) -> Word {
        match module.types[ty] {
            hlir::Type::Float { width } => builder.make_float_type(width),
            hlir::Type::Integer { width: 1 } => builder.make_bool_type(),
            hlir::Type::Integer { width } => builder.make_integer_type(width, false),
            hlir::Type::Pointer { pointee } => {
                let pointee_id = self.type_of_hlir(builder, module, pointee);
                builder.make_pointer(spirv::StorageClass::Function, pointee_id)
            }
            hlir::Type::Array { element, length } => {
                let element_id = self.type_of_hlir(builder, module, element);
                let length_id = builder.make_uint_constant(length);
                builder.make_array_type(element_id, length_id, 0)
            }
            hlir::Type::Void | hlir::Type::Struct { .. } => {
                log::error!("no GIR type for HLIR type {:?}", module.types[ty]);
                0
            }
        }
    }

    /// GIR type for `component` scalars arranged as `rows` by `cols`: the
    /// scalar itself for 1x1, a vector for a single row, a matrix otherwise.
    pub fn synth(
        &self,
        builder: &mut Builder,
        component: ComponentType,
        rows: u32,
        cols: u32,
    ) -> Word {
        let component_id = match component {
            ComponentType::I1 => builder.make_bool_type(),
            ComponentType::I16 => builder.make_integer_type(16, true),
            ComponentType::U16 => builder.make_integer_type(16, false),
            ComponentType::I32 => builder.make_integer_type(32, true),
            ComponentType::U32 => builder.make_integer_type(32, false),
            ComponentType::I64 => builder.make_integer_type(64, true),
            ComponentType::U64 => builder.make_integer_type(64, false),
            ComponentType::F16 => builder.make_float_type(16),
            ComponentType::F32 => builder.make_float_type(32),
            ComponentType::F64 => builder.make_float_type(64),
        };
        if rows == 1 && cols == 1 {
            component_id
        } else if rows == 1 {
            builder.make_vector_type(component_id, cols)
        } else {
            builder.make_matrix_type(component_id, rows, cols)
        }
    }

    pub fn record_type_for_id(&mut self, id: Word, type_id: Word) {
        self.id_to_type.insert(id, type_id);
    }

    /// Previously recorded type of `id`, 0 when unknown.
    pub fn type_of_id(&self, id: Word) -> Word {
        self.id_to_type.get(&id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gir::{TypeDescriptor, WriterFlags};

    #[test]
    fn synth_reuses_the_scalar_component() {
        let mut builder = Builder::new(WriterFlags::empty());
        let table = TypeTable::default();
        let scalar = table.synth(&mut builder, ComponentType::F32, 1, 1);
        let vector = table.synth(&mut builder, ComponentType::F32, 1, 4);
        match builder.type_descriptor(vector) {
            Some(&TypeDescriptor::Vector { component, count }) => {
                assert_eq!(component, scalar);
                assert_eq!(count, 4);
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
    }

    #[test]
    fn one_bit_integers_are_booleans() {
        let mut builder = Builder::new(WriterFlags::empty());
        let table = TypeTable::default();
        let mut module = hlir::Module::default();
        let bool_ty = module.types.insert(hlir::Type::Integer { width: 1 });
        let id = table.type_of_hlir(&mut builder, &module, bool_ty);
        assert_eq!(builder.type_descriptor(id), Some(&TypeDescriptor::Bool));
    }
}
