use super::TypeTable;
use crate::arena::Handle;
use crate::gir::Builder;
use crate::hlir;
use crate::FastHashMap;
use spirv::Word;

/// Idempotent mapping from HLIR values to GIR ids.
///
/// Constants and undefs materialize eagerly through the builder;
/// instruction results get a fresh id on first reference, so operands may
/// name values defined later in the function (phis do).
#[derive(Default)]
pub struct ValueTable {
    ids: FastHashMap<Handle<hlir::Value>, Word>,
}

impl ValueTable {
    pub fn get_id(
        &mut self,
        builder: &mut Builder,
        types: &TypeTable,
        module: &hlir::Module,
        function: &hlir::Function,
        value: Handle<hlir::Value>,
        forced_width: u8,
    ) -> Word {
        if let Some(&id) = self.ids.get(&value) {
            return id;
        }
        let id = match function.values[value] {
            hlir::Value::Undef(ty) => {
                let type_id = types.type_of_hlir(builder, module, ty);
                builder.create_undefined(type_id)
            }
            hlir::Value::Constant(constant) => constant_id(builder, constant, forced_width),
            hlir::Value::Instruction { .. } => builder.allocate_id(),
        };
        // cached even when constant lowering failed, so the sentinel is stable
        self.ids.insert(value, id);
        id
    }

    /// Bind `value` to an id produced outside the table. Stack variables
    /// use this: their id is the variable, not a fresh result.
    pub fn insert(&mut self, value: Handle<hlir::Value>, id: Word) {
        self.ids.insert(value, id);
    }
}

fn constant_id(builder: &mut Builder, constant: hlir::Constant, forced_width: u8) -> Word {
    match constant {
        hlir::Constant::Float(value) => builder.make_float_constant(value),
        hlir::Constant::Double(value) => builder.make_double_constant(value),
        hlir::Constant::Integer { width, value } => {
            let width = if forced_width != 0 { forced_width } else { width };
            match width {
                32 => builder.make_uint_constant(value as u32),
                _ => {
                    log::error!("cannot lower a {}-bit integer constant", width);
                    0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::gir::WriterFlags;

    fn test_function() -> (hlir::Module, hlir::Function) {
        let mut module = hlir::Module::default();
        let f32_ty = module.types.insert(hlir::Type::Float { width: 32 });
        let mut values = Arena::new();
        values.append(hlir::Value::Constant(hlir::Constant::Float(1.5)));
        values.append(hlir::Value::Undef(f32_ty));
        values.append(hlir::Value::Constant(hlir::Constant::Integer {
            width: 64,
            value: 1,
        }));
        let mut blocks = Arena::new();
        let entry = blocks.append(hlir::BasicBlock {
            name: "entry".to_string(),
            instructions: Vec::new(),
            terminator: hlir::Terminator::Unreachable,
        });
        let function = hlir::Function {
            name: "main".to_string(),
            values,
            blocks,
            entry,
        };
        (module, function)
    }

    #[test]
    fn ids_are_idempotent() {
        let (module, function) = test_function();
        let mut builder = Builder::new(WriterFlags::empty());
        let types = TypeTable::default();
        let mut table = ValueTable::default();

        let handles: Vec<_> = function.values.iter().map(|(handle, _)| handle).collect();
        for &handle in &handles {
            let first = table.get_id(&mut builder, &types, &module, &function, handle, 0);
            let second = table.get_id(&mut builder, &types, &module, &function, handle, 0);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn wide_integer_constants_yield_the_sentinel() {
        let (module, function) = test_function();
        let mut builder = Builder::new(WriterFlags::empty());
        let types = TypeTable::default();
        let mut table = ValueTable::default();

        let wide = function.values.iter().map(|(h, _)| h).nth(2).unwrap();
        assert_eq!(
            table.get_id(&mut builder, &types, &module, &function, wide, 0),
            0
        );
        // the override makes it expressible
        let mut table = ValueTable::default();
        assert_ne!(
            table.get_id(&mut builder, &types, &module, &function, wide, 32),
            0
        );
    }
}
