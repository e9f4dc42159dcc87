//! The runtime core: value representation, object model, heap, register
//! file and bytecode interpreter (spec §4.4, §5, §6).

pub mod gc;
pub mod interpreter;
pub mod object;
pub mod register_file;
pub mod shape;
pub mod value;

pub use gc::{GcConfig, GcHeap, GcStats, HeapIndex, HeapObject};
pub use object::{DefineError, FunctionKind, JsArray, JsFunction, JsObject, JsTypedArray, PropertyDescriptor, TypedArrayKind};
pub use register_file::{RegisterFile, RegisterFileStats};
pub use shape::{CallIc, IcState, PropIc, PropertyAttribute, PropertyKey, Shape, ShapeRegistry};
pub use value::{HeapTag, Value, ValueType};

/// Runtime (interpreter-level) execution errors. `RuntimeError`/`InternalError`
/// from spec §7, represented as a Rust enum at the embedder boundary rather
/// than unwinding as host exceptions (spec §6: "errors to the embedder are
/// conveyed through the Value channel, never host exceptions").
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("type error: {0}")]
    TypeError(String),

    #[error("reference error: {0}")]
    ReferenceError(String),

    #[error("range error: {0}")]
    RangeError(String),

    /// A user `throw` with an arbitrary value, carried as raw bits since
    /// `VmError` must not borrow the heap.
    #[error("uncaught exception")]
    Thrown(Value),

    /// Corrupt bytecode, deopt descriptor mismatch, or any other invariant
    /// violation (spec §7's InternalError: "surfaces as an InternalError
    /// value and taints the Context").
    #[error("internal error: {0}")]
    Internal(String),
}

pub type VmResult<T> = Result<T, VmError>;
