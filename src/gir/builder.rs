/*! The in-memory GIR module builder.

The builder owns the identifier allocator and the module-scope sections of
the produced IR: type and constant declarations, variables, undefs,
decorations, debug names, capabilities, and the entry-point record. Types
and scalar constants are interned — asking for the same structural
descriptor twice returns the same id — while struct types, variables, and
undefs are created fresh per call.

Nothing here encodes binary SPIR-V; the operation lists are handed to a
downstream encoder as-is.
*/

use super::helpers;
use super::Operation;
use crate::{FastHashMap, FastHashSet};
use spirv::Word;

#[derive(Default)]
struct IdGenerator(Word);

impl IdGenerator {
    fn next(&mut self) -> Word {
        self.0 += 1;
        self.0
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WriterFlags: u32 {
        /// Include debug labels for named objects.
        const DEBUG = 0x1;
    }
}

impl Default for WriterFlags {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            WriterFlags::DEBUG
        } else {
            WriterFlags::empty()
        }
    }
}

/// A GIR type, described structurally.
///
/// Composite descriptors refer to their component types by id, so interning
/// a descriptor implies its components were interned first. This is the key
/// of the builder's type lookup table and the payload of the reverse
/// id-to-descriptor table behind the introspection queries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Bool,
    Integer {
        width: u8,
        signed: bool,
    },
    Float {
        width: u8,
    },
    Vector {
        component: Word,
        count: u32,
    },
    Matrix {
        column: Word,
        columns: u32,
    },
    Pointer {
        class: spirv::StorageClass,
        pointee: Word,
    },
    Array {
        element: Word,
        length: Word,
        stride: u32,
    },
    Struct {
        members: Vec<Word>,
    },
    Image {
        sampled_type: Word,
        dim: spirv::Dim,
        depth: bool,
        arrayed: bool,
        multisampled: bool,
        sampled: u32,
        format: spirv::ImageFormat,
    },
    Sampler,
    SampledImage {
        image: Word,
    },
}

/// Interning key for scalar constants. Floats are keyed by bit pattern so
/// the key can hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum ConstantKey {
    Uint(u32),
    Sint(i32),
    Float(u32),
    Double(u64),
    Bool(bool),
}

/// The entry-point record: execution model, name, and the interface ids
/// appended while stage I/O variables are emitted.
#[derive(Clone, Debug)]
pub struct EntryPoint {
    pub execution_model: spirv::ExecutionModel,
    pub name: String,
    pub interface: Vec<Word>,
}

pub struct Builder {
    id_gen: IdGenerator,
    flags: WriterFlags,

    lookup_type: FastHashMap<TypeDescriptor, Word>,
    /// Reverse of `lookup_type`, plus the fresh (non-interned) types.
    type_descriptors: FastHashMap<Word, TypeDescriptor>,
    cached_constants: FastHashMap<ConstantKey, Word>,
    /// Type id of every value id the builder itself created.
    id_types: FastHashMap<Word, Word>,

    /// Module-scope type, constant, variable, and undef declarations, in
    /// creation order.
    pub declarations: Vec<Operation>,
    /// Decorations and member decorations.
    pub annotations: Vec<Operation>,
    /// Debug names.
    pub debugs: Vec<Operation>,

    capabilities_used: FastHashSet<spirv::Capability>,
    entry_point: Option<EntryPoint>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new(WriterFlags::default())
    }
}

impl Builder {
    pub fn new(flags: WriterFlags) -> Self {
        Builder {
            id_gen: IdGenerator::default(),
            flags,
            lookup_type: FastHashMap::default(),
            type_descriptors: FastHashMap::default(),
            cached_constants: FastHashMap::default(),
            id_types: FastHashMap::default(),
            declarations: Vec::new(),
            annotations: Vec::new(),
            debugs: Vec::new(),
            capabilities_used: FastHashSet::default(),
            entry_point: None,
        }
    }

    /// Hand out a fresh id, greater than every id allocated before.
    pub fn allocate_id(&mut self) -> Word {
        self.id_gen.next()
    }

    fn debug_name(&mut self, id: Word, name: &str) {
        if name.is_empty() || !self.flags.contains(WriterFlags::DEBUG) {
            return;
        }
        let mut operation = Operation::new(spirv::Op::Name);
        operation.add_operand(id);
        operation.add_operands(helpers::string_to_words(name));
        self.debugs.push(operation);
    }

    //
    // Types
    //

    fn type_declaration(id: Word, descriptor: &TypeDescriptor) -> Operation {
        use spirv::Op;
        let (op, arguments) = match *descriptor {
            TypeDescriptor::Bool => (Op::TypeBool, Vec::new()),
            TypeDescriptor::Integer { width, signed } => {
                (Op::TypeInt, vec![width as Word, signed as Word])
            }
            TypeDescriptor::Float { width } => (Op::TypeFloat, vec![width as Word]),
            TypeDescriptor::Vector { component, count } => {
                (Op::TypeVector, vec![component, count])
            }
            TypeDescriptor::Matrix { column, columns } => (Op::TypeMatrix, vec![column, columns]),
            TypeDescriptor::Pointer { class, pointee } => {
                (Op::TypePointer, vec![class as Word, pointee])
            }
            TypeDescriptor::Array {
                element, length, ..
            } => (Op::TypeArray, vec![element, length]),
            TypeDescriptor::Struct { ref members } => (Op::TypeStruct, members.clone()),
            TypeDescriptor::Image {
                sampled_type,
                dim,
                depth,
                arrayed,
                multisampled,
                sampled,
                format,
            } => (
                Op::TypeImage,
                vec![
                    sampled_type,
                    dim as Word,
                    depth as Word,
                    arrayed as Word,
                    multisampled as Word,
                    sampled,
                    format as Word,
                ],
            ),
            TypeDescriptor::Sampler => (Op::TypeSampler, Vec::new()),
            TypeDescriptor::SampledImage { image } => (Op::TypeSampledImage, vec![image]),
        };
        let mut operation = Operation::new(op);
        operation.result_id = id;
        operation.arguments = arguments;
        operation
    }

    /// Return the id for `descriptor`, declaring the type if it was not
    /// interned yet.
    pub fn get_or_make_type(&mut self, descriptor: TypeDescriptor) -> Word {
        if let Some(&id) = self.lookup_type.get(&descriptor) {
            return id;
        }
        let id = self.id_gen.next();
        self.declarations.push(Self::type_declaration(id, &descriptor));
        self.lookup_type.insert(descriptor.clone(), id);
        self.type_descriptors.insert(id, descriptor);
        id
    }

    pub fn make_bool_type(&mut self) -> Word {
        self.get_or_make_type(TypeDescriptor::Bool)
    }

    pub fn make_integer_type(&mut self, width: u8, signed: bool) -> Word {
        self.get_or_make_type(TypeDescriptor::Integer { width, signed })
    }

    pub fn make_float_type(&mut self, width: u8) -> Word {
        self.get_or_make_type(TypeDescriptor::Float { width })
    }

    pub fn make_vector_type(&mut self, component: Word, count: u32) -> Word {
        self.get_or_make_type(TypeDescriptor::Vector { component, count })
    }

    /// A matrix of `cols` columns, each a vector of `rows` components.
    pub fn make_matrix_type(&mut self, component: Word, rows: u32, cols: u32) -> Word {
        let column = self.make_vector_type(component, rows);
        self.get_or_make_type(TypeDescriptor::Matrix {
            column,
            columns: cols,
        })
    }

    pub fn make_pointer(&mut self, class: spirv::StorageClass, pointee: Word) -> Word {
        self.get_or_make_type(TypeDescriptor::Pointer { class, pointee })
    }

    /// `length` is the id of an integer constant. A non-zero `stride`
    /// distinguishes explicitly laid out arrays of the same shape.
    pub fn make_array_type(&mut self, element: Word, length: Word, stride: u32) -> Word {
        self.get_or_make_type(TypeDescriptor::Array {
            element,
            length,
            stride,
        })
    }

    /// Struct types are never interned: two structs of identical member
    /// lists may still be decorated differently.
    pub fn make_struct_type(&mut self, members: Vec<Word>, name: &str) -> Word {
        let id = self.id_gen.next();
        let descriptor = TypeDescriptor::Struct { members };
        self.declarations.push(Self::type_declaration(id, &descriptor));
        self.type_descriptors.insert(id, descriptor);
        self.debug_name(id, name);
        id
    }

    #[allow(clippy::too_many_arguments)]
    pub fn make_image_type(
        &mut self,
        sampled_type: Word,
        dim: spirv::Dim,
        depth: bool,
        arrayed: bool,
        multisampled: bool,
        sampled: u32,
        format: spirv::ImageFormat,
    ) -> Word {
        self.get_or_make_type(TypeDescriptor::Image {
            sampled_type,
            dim,
            depth,
            arrayed,
            multisampled,
            sampled,
            format,
        })
    }

    pub fn make_sampler_type(&mut self) -> Word {
        self.get_or_make_type(TypeDescriptor::Sampler)
    }

    pub fn make_sampled_image_type(&mut self, image: Word) -> Word {
        self.get_or_make_type(TypeDescriptor::SampledImage { image })
    }

    //
    // Constants
    //

    fn get_or_make_constant(
        &mut self,
        key: ConstantKey,
        type_id: Word,
        value_words: &[Word],
    ) -> Word {
        if let Some(&id) = self.cached_constants.get(&key) {
            return id;
        }
        let id = self.id_gen.next();
        let mut operation = Operation::new(spirv::Op::Constant);
        operation.result_id = id;
        operation.result_type_id = type_id;
        operation.add_operands(value_words.iter().copied());
        self.declarations.push(operation);
        self.cached_constants.insert(key, id);
        self.id_types.insert(id, type_id);
        id
    }

    pub fn make_uint_constant(&mut self, value: u32) -> Word {
        let type_id = self.make_integer_type(32, false);
        self.get_or_make_constant(ConstantKey::Uint(value), type_id, &[value])
    }

    pub fn make_int_constant(&mut self, value: i32) -> Word {
        let type_id = self.make_integer_type(32, true);
        self.get_or_make_constant(ConstantKey::Sint(value), type_id, &[value as Word])
    }

    pub fn make_float_constant(&mut self, value: f32) -> Word {
        let type_id = self.make_float_type(32);
        let bits = value.to_bits();
        self.get_or_make_constant(ConstantKey::Float(bits), type_id, &[bits])
    }

    pub fn make_double_constant(&mut self, value: f64) -> Word {
        let type_id = self.make_float_type(64);
        let bits = value.to_bits();
        self.get_or_make_constant(
            ConstantKey::Double(bits),
            type_id,
            &[bits as Word, (bits >> 32) as Word],
        )
    }

    pub fn make_bool_constant(&mut self, value: bool) -> Word {
        let type_id = self.make_bool_type();
        if let Some(&id) = self.cached_constants.get(&ConstantKey::Bool(value)) {
            return id;
        }
        let id = self.id_gen.next();
        let mut operation = Operation::new(if value {
            spirv::Op::ConstantTrue
        } else {
            spirv::Op::ConstantFalse
        });
        operation.result_id = id;
        operation.result_type_id = type_id;
        self.declarations.push(operation);
        self.cached_constants.insert(ConstantKey::Bool(value), id);
        self.id_types.insert(id, type_id);
        id
    }

    //
    // Variables and undefs
    //

    /// Declare a variable of `type_id` in `class`. The declared id has
    /// pointer type; every call creates a new variable.
    pub fn create_variable(
        &mut self,
        class: spirv::StorageClass,
        type_id: Word,
        name: Option<&str>,
    ) -> Word {
        let pointer_type_id = self.make_pointer(class, type_id);
        let id = self.id_gen.next();
        let mut operation = Operation::new(spirv::Op::Variable);
        operation.result_id = id;
        operation.result_type_id = pointer_type_id;
        operation.add_operand(class as Word);
        self.declarations.push(operation);
        self.id_types.insert(id, pointer_type_id);
        if let Some(name) = name {
            self.debug_name(id, name);
        }
        id
    }

    pub fn create_undefined(&mut self, type_id: Word) -> Word {
        let id = self.id_gen.next();
        let mut operation = Operation::new(spirv::Op::Undef);
        operation.result_id = id;
        operation.result_type_id = type_id;
        self.declarations.push(operation);
        self.id_types.insert(id, type_id);
        id
    }

    //
    // Annotations
    //

    pub fn add_decoration(
        &mut self,
        target: Word,
        decoration: spirv::Decoration,
        operands: &[Word],
    ) {
        let mut operation = Operation::new(spirv::Op::Decorate);
        operation.add_operand(target);
        operation.add_operand(decoration as Word);
        operation.add_operands(operands.iter().copied());
        self.annotations.push(operation);
    }

    pub fn add_member_decoration(
        &mut self,
        target: Word,
        member: u32,
        decoration: spirv::Decoration,
        operands: &[Word],
    ) {
        let mut operation = Operation::new(spirv::Op::MemberDecorate);
        operation.add_operand(target);
        operation.add_operand(member);
        operation.add_operand(decoration as Word);
        operation.add_operands(operands.iter().copied());
        self.annotations.push(operation);
    }

    pub fn add_capability(&mut self, capability: spirv::Capability) {
        self.capabilities_used.insert(capability);
    }

    pub fn capabilities(&self) -> &FastHashSet<spirv::Capability> {
        &self.capabilities_used
    }

    //
    // Entry point
    //

    pub fn emit_entry_point(&mut self, execution_model: spirv::ExecutionModel, name: &str) {
        self.entry_point = Some(EntryPoint {
            execution_model,
            name: name.to_string(),
            interface: Vec::new(),
        });
    }

    pub fn add_entry_point_interface(&mut self, id: Word) {
        if let Some(ref mut entry_point) = self.entry_point {
            entry_point.interface.push(id);
        }
    }

    pub fn entry_point(&self) -> Option<&EntryPoint> {
        self.entry_point.as_ref()
    }

    //
    // Introspection
    //

    pub fn type_descriptor(&self, type_id: Word) -> Option<&TypeDescriptor> {
        self.type_descriptors.get(&type_id)
    }

    /// Type id of a value the builder created, 0 if unknown.
    pub fn value_type_id(&self, id: Word) -> Word {
        self.id_types.get(&id).copied().unwrap_or(0)
    }

    /// Pointee type of a pointer-typed value (e.g. a variable), 0 if the
    /// value or its type is unknown.
    pub fn get_deref_type_id(&self, id: Word) -> Word {
        match self.type_descriptor(self.value_type_id(id)) {
            Some(&TypeDescriptor::Pointer { pointee, .. }) => pointee,
            _ => 0,
        }
    }

    /// The scalar component of a vector or matrix type; scalars return
    /// themselves.
    pub fn get_scalar_type_id(&self, type_id: Word) -> Word {
        match self.type_descriptor(type_id) {
            Some(&TypeDescriptor::Vector { component, .. }) => component,
            Some(&TypeDescriptor::Matrix { column, .. }) => self.get_scalar_type_id(column),
            _ => type_id,
        }
    }

    /// Component count of a vector or matrix type; scalars count as one.
    pub fn get_num_type_components(&self, type_id: Word) -> u32 {
        match self.type_descriptor(type_id) {
            Some(&TypeDescriptor::Vector { count, .. }) => count,
            Some(&TypeDescriptor::Matrix { columns, .. }) => columns,
            _ => 1,
        }
    }

    pub fn get_type_dimensionality(&self, type_id: Word) -> Option<spirv::Dim> {
        match self.type_descriptor(type_id) {
            Some(&TypeDescriptor::Image { dim, .. }) => Some(dim),
            _ => None,
        }
    }

    pub fn is_arrayed_image_type(&self, type_id: Word) -> bool {
        matches!(
            self.type_descriptor(type_id),
            Some(&TypeDescriptor::Image { arrayed: true, .. })
        )
    }

    pub fn is_multisampled_image_type(&self, type_id: Word) -> bool {
        matches!(
            self.type_descriptor(type_id),
            Some(&TypeDescriptor::Image {
                multisampled: true,
                ..
            })
        )
    }

    /// Sampled component type of an image type, 0 if not an image.
    pub fn get_image_component_type(&self, type_id: Word) -> Word {
        match self.type_descriptor(type_id) {
            Some(&TypeDescriptor::Image { sampled_type, .. }) => sampled_type,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_interning_is_idempotent() {
        let mut builder = Builder::new(WriterFlags::empty());
        let f32_a = builder.make_float_type(32);
        let f32_b = builder.make_float_type(32);
        assert_eq!(f32_a, f32_b);
        let vec4_a = builder.make_vector_type(f32_a, 4);
        let vec4_b = builder.make_vector_type(f32_b, 4);
        assert_eq!(vec4_a, vec4_b);
        // one TypeFloat + one TypeVector
        assert_eq!(builder.declarations.len(), 2);
    }

    #[test]
    fn constants_are_cached_by_value() {
        let mut builder = Builder::new(WriterFlags::empty());
        let a = builder.make_uint_constant(7);
        let b = builder.make_uint_constant(7);
        let c = builder.make_uint_constant(8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        // signed and unsigned constants of the same bits are distinct
        let d = builder.make_int_constant(7);
        assert_ne!(a, d);
    }

    #[test]
    fn variables_are_fresh_and_pointer_typed() {
        let mut builder = Builder::new(WriterFlags::empty());
        let f32_id = builder.make_float_type(32);
        let a = builder.create_variable(spirv::StorageClass::Input, f32_id, None);
        let b = builder.create_variable(spirv::StorageClass::Input, f32_id, None);
        assert_ne!(a, b);
        assert_eq!(builder.get_deref_type_id(a), f32_id);
        assert_eq!(builder.get_deref_type_id(b), f32_id);
    }

    #[test]
    fn image_introspection() {
        let mut builder = Builder::new(WriterFlags::empty());
        let f32_id = builder.make_float_type(32);
        let image = builder.make_image_type(
            f32_id,
            spirv::Dim::Dim2D,
            false,
            true,
            false,
            1,
            spirv::ImageFormat::Unknown,
        );
        assert_eq!(
            builder.get_type_dimensionality(image),
            Some(spirv::Dim::Dim2D)
        );
        assert!(builder.is_arrayed_image_type(image));
        assert!(!builder.is_multisampled_image_type(image));
        assert_eq!(builder.get_image_component_type(image), f32_id);
    }
}
