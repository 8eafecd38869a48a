/*! Gryphon: a lowering core for shader IR translation.

Gryphon converts one entry point of a parsed HLIR module — a DXIL-flavored,
LLVM-shaped IR of typed SSA values, basic blocks, and typed metadata — into
GIR, a SPIR-V style graphics IR held in memory: module-scope declarations for
types, constants, resource variables, and stage I/O, plus a control-flow graph
of nodes each carrying an ordered operation stream and a terminator.

The crate deliberately sits between two collaborators it does not contain:
the bitcode reader that produces [`hlir::Module`] values, and the binary
encoder / CFG structurizer that consume the [`gir::Builder`] contents and the
returned [`gir::ConvertedFunction`].

The interesting entry point is [`lower::convert_entry_point`].
*/

pub mod arena;
pub mod gir;
pub mod hlir;
pub mod lower;

/// Map of IR objects, keyed by small dense values. Not resistant to
/// HashDoS, which is fine for compiler-internal tables.
pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
/// Set counterpart of [`FastHashMap`].
pub type FastHashSet<K> = rustc_hash::FxHashSet<K>;
