//! Runtime support for JIT-compiled code: the C-ABI trampoline contract and
//! the code cache that stores and invalidates compiled entries.

pub mod code_cache;
pub mod trampoline;
