//! The object model: property storage, prototype chains, arrays, functions
//! and typed arrays.
//!
//! An object is a mapping from `PropertyKey` to `PropertyDescriptor`, plus a
//! prototype reference and `{extensible, sealed, frozen}` flags (spec §3).
//! Storage is shape-driven: an object's own slots are a flat `Vec<Slot>`
//! whose layout is described by its `Shape` (see `vm::shape`), so objects
//! with identical key insertion history share one shape and one inline-cache
//! hit path.
//!
//! Grounded on `original_source/src/core/object.h`'s property model
//! (`PropertyDescriptor`, accessor vs data distinction, `getOwnPropertyKeys`)
//! mapped onto the shape-table storage strategy from
//! `pro-grammer-SD-axiom/axm/src/inline_cache.rs`.

use crate::vm::gc::HeapIndex;
use crate::vm::shape::{PropertyAttribute, PropertyKey, Shape, ShapeRegistry};
use crate::vm::value::Value;
use std::sync::Arc;

/// A single property slot: either a plain value or an accessor pair. Which
/// one is active is determined by the owning shape entry's `ACCESSOR` bit.
#[derive(Debug, Clone)]
enum Slot {
    Data(Value),
    Accessor { getter: Value, setter: Value },
}

/// A property, resolved from an object's shape + slot storage. Mirrors
/// `original_source/object.h`'s `PropertyDescriptor` (`hasValue`/`hasGet`/
/// `hasSet`/`isAccessor`/...).
#[derive(Debug, Clone, Copy)]
pub enum PropertyDescriptor {
    Data { value: Value, writable: bool, enumerable: bool, configurable: bool },
    Accessor { getter: Value, setter: Value, enumerable: bool, configurable: bool },
}

impl PropertyDescriptor {
    pub fn is_enumerable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { enumerable, .. } => *enumerable,
            PropertyDescriptor::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { configurable, .. } => *configurable,
            PropertyDescriptor::Accessor { configurable, .. } => *configurable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineError {
    /// Target slot is non-configurable and this definition would change its
    /// kind (data vs accessor) — spec §3's "a non-configurable descriptor
    /// cannot change kind".
    NonConfigurableKindChange,
    /// Object is sealed/frozen/non-extensible and the key does not exist yet.
    NotExtensible,
    /// Setting the prototype would introduce a cycle (spec §3, end-to-end
    /// scenario 6).
    PrototypeCycle,
}

impl std::fmt::Display for DefineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefineError::NonConfigurableKindChange => write!(f, "cannot redefine non-configurable property"),
            DefineError::NotExtensible => write!(f, "object is not extensible"),
            DefineError::PrototypeCycle => write!(f, "cyclic __proto__ value"),
        }
    }
}

impl std::error::Error for DefineError {}

/// An ordinary JS object: shape-addressed property slots plus a prototype
/// link and the extensibility flags from spec §3.
#[derive(Debug, Clone)]
pub struct JsObject {
    shape: Arc<Shape>,
    slots: Vec<Slot>,
    pub prototype: Option<HeapIndex>,
    pub extensible: bool,
    pub sealed: bool,
    pub frozen: bool,
}

impl JsObject {
    pub fn new() -> Self {
        JsObject { shape: ShapeRegistry::global().empty_shape(), slots: Vec::new(), prototype: None, extensible: true, sealed: false, frozen: false }
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn shape_id(&self) -> u32 {
        self.shape.id
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.shape.slot_of(key).is_some()
    }

    pub fn get_own_property_descriptor(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let slot = self.shape.slot_of(key)?;
        let attrs = self.shape.attributes_at(slot)?;
        match &self.slots[slot as usize] {
            Slot::Data(value) => Some(PropertyDescriptor::Data {
                value: *value,
                writable: attrs.is_writable(),
                enumerable: attrs.is_enumerable(),
                configurable: attrs.is_configurable(),
            }),
            Slot::Accessor { getter, setter } => Some(PropertyDescriptor::Accessor {
                getter: *getter,
                setter: *setter,
                enumerable: attrs.is_enumerable(),
                configurable: attrs.is_configurable(),
            }),
        }
    }

    /// Own-property data lookup used by the interpreter's fast path once an
    /// inline cache has resolved `key` to `slot` for this object's shape.
    pub fn get_slot(&self, slot: u16) -> Option<Value> {
        match self.slots.get(slot as usize)? {
            Slot::Data(v) => Some(*v),
            Slot::Accessor { .. } => None,
        }
    }

    pub fn set_slot_value(&mut self, slot: u16) -> Option<&mut Value> {
        match self.slots.get_mut(slot as usize)? {
            Slot::Data(v) => Some(v),
            Slot::Accessor { .. } => None,
        }
    }

    /// Defines (creates or replaces) an own data property. Returns the slot
    /// index for inline-cache seeding.
    pub fn define_data(&mut self, key: PropertyKey, value: Value, attrs: PropertyAttribute) -> Result<u16, DefineError> {
        if let Some(slot) = self.shape.slot_of(&key) {
            let existing_attrs = self.shape.attributes_at(slot).unwrap();
            if !existing_attrs.is_configurable() && existing_attrs.is_accessor() != attrs.is_accessor() {
                return Err(DefineError::NonConfigurableKindChange);
            }
            if existing_attrs != attrs {
                self.shape = ShapeRegistry::global().transition_attrs(&self.shape, slot, attrs);
            }
            self.slots[slot as usize] = Slot::Data(value);
            return Ok(slot);
        }
        if !self.extensible {
            return Err(DefineError::NotExtensible);
        }
        self.shape = ShapeRegistry::global().transition_add(&self.shape, key, attrs);
        self.slots.push(Slot::Data(value));
        Ok((self.slots.len() - 1) as u16)
    }

    pub fn define_accessor(&mut self, key: PropertyKey, getter: Value, setter: Value, enumerable: bool, configurable: bool) -> Result<u16, DefineError> {
        let attrs = PropertyAttribute::ACCESSOR
            | if enumerable { PropertyAttribute::ENUMERABLE } else { PropertyAttribute::NONE }
            | if configurable { PropertyAttribute::CONFIGURABLE } else { PropertyAttribute::NONE };
        if let Some(slot) = self.shape.slot_of(&key) {
            let existing_attrs = self.shape.attributes_at(slot).unwrap();
            if !existing_attrs.is_configurable() && !existing_attrs.is_accessor() {
                return Err(DefineError::NonConfigurableKindChange);
            }
            self.shape = ShapeRegistry::global().transition_attrs(&self.shape, slot, attrs);
            self.slots[slot as usize] = Slot::Accessor { getter, setter };
            return Ok(slot);
        }
        if !self.extensible {
            return Err(DefineError::NotExtensible);
        }
        self.shape = ShapeRegistry::global().transition_add(&self.shape, key, attrs);
        self.slots.push(Slot::Accessor { getter, setter });
        Ok((self.slots.len() - 1) as u16)
    }

    /// Assigns to an existing writable data property, or creates one with
    /// default attributes (`set` semantics, distinct from `defineProperty`).
    pub fn set_property(&mut self, key: PropertyKey, value: Value) -> Result<(), DefineError> {
        if let Some(slot) = self.shape.slot_of(&key) {
            let attrs = self.shape.attributes_at(slot).unwrap();
            if attrs.is_accessor() {
                if let Slot::Accessor { setter, .. } = self.slots[slot as usize] {
                    let _ = setter; // invoked by the interpreter, which owns call machinery
                }
                return Ok(());
            }
            if !attrs.is_writable() || self.frozen {
                return Ok(()); // non-writable assignment is a silent no-op in sloppy mode
            }
            self.slots[slot as usize] = Slot::Data(value);
            return Ok(());
        }
        if !self.extensible || self.frozen || self.sealed {
            return Ok(());
        }
        self.define_data(key, value, PropertyAttribute::default()).map(|_| ())
    }

    pub fn delete_property(&mut self, key: &PropertyKey) -> Result<bool, DefineError> {
        let Some(slot) = self.shape.slot_of(key) else { return Ok(true) };
        let attrs = self.shape.attributes_at(slot).unwrap();
        if !attrs.is_configurable() {
            return Ok(false);
        }
        // Rebuild the shape without this key; slots compact to match.
        let registry = ShapeRegistry::global();
        let mut new_shape = registry.empty_shape();
        let mut new_slots = Vec::with_capacity(self.slots.len() - 1);
        for (i, k) in self.shape.keys().enumerate() {
            if k == key {
                continue;
            }
            let a = self.shape.attributes_at(i as u16).unwrap();
            new_shape = registry.transition_add(&new_shape, k.clone(), a);
            new_slots.push(self.slots[i].clone());
        }
        self.shape = new_shape;
        self.slots = new_slots;
        Ok(true)
    }

    pub fn own_property_keys(&self, include_non_enumerable: bool) -> Vec<PropertyKey> {
        self.shape
            .keys()
            .enumerate()
            .filter(|(i, _)| include_non_enumerable || self.shape.attributes_at(*i as u16).unwrap().is_enumerable())
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Sets `prototype`, rejecting any assignment that would introduce a
    /// cycle in the prototype chain. `lookup` resolves a `HeapIndex` to the
    /// `JsObject` it names (the caller's heap), since this type has no heap
    /// access of its own.
    pub fn set_prototype<F>(&mut self, prototype: Option<HeapIndex>, self_index: HeapIndex, lookup: F) -> Result<(), DefineError>
    where
        F: Fn(HeapIndex) -> Option<HeapIndex>,
    {
        if let Some(mut cursor) = prototype {
            loop {
                if cursor == self_index {
                    return Err(DefineError::PrototypeCycle);
                }
                match lookup(cursor) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
        self.prototype = prototype;
        Ok(())
    }

    pub(crate) fn trace(&self, worklist: &mut Vec<HeapIndex>) {
        if let Some(p) = self.prototype {
            worklist.push(p);
        }
        for slot in &self.slots {
            match slot {
                Slot::Data(v) => push_if_heap(v, worklist),
                Slot::Accessor { getter, setter } => {
                    push_if_heap(getter, worklist);
                    push_if_heap(setter, worklist);
                }
            }
        }
    }
}

impl Default for JsObject {
    fn default() -> Self {
        JsObject::new()
    }
}

fn push_if_heap(v: &Value, worklist: &mut Vec<HeapIndex>) {
    if let Some(idx) = v.heap_index() {
        worklist.push(idx);
    }
}

/// A dense JS array: contiguous elements plus an overflow `JsObject` for
/// named properties (`arr.foo = 1`) and non-index own properties like
/// `length`'s attribute overrides.
#[derive(Debug, Clone)]
pub struct JsArray {
    pub elements: Vec<Value>,
    pub extra: JsObject,
}

impl JsArray {
    pub fn new() -> Self {
        JsArray { elements: Vec::new(), extra: JsObject::new() }
    }

    pub fn from_elements(elements: Vec<Value>) -> Self {
        JsArray { elements, extra: JsObject::new() }
    }

    pub fn length(&self) -> u32 {
        self.elements.len() as u32
    }

    pub(crate) fn trace(&self, worklist: &mut Vec<HeapIndex>) {
        for v in &self.elements {
            push_if_heap(v, worklist);
        }
        self.extra.trace(worklist);
    }
}

impl Default for JsArray {
    fn default() -> Self {
        JsArray::new()
    }
}

/// A function value: either interpreted (pointing at a compiled bytecode
/// function by id) or a host-provided native function.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    Bytecode { function_id: u32 },
    Native { native_id: u32 },
}

#[derive(Debug, Clone)]
pub struct JsFunction {
    pub name: String,
    pub kind: FunctionKind,
    /// Captured upvalues for closures: slots in the defining scope object,
    /// materialized only for variables actually captured (spec §4.3).
    pub captured_scope: Option<HeapIndex>,
    pub extra: JsObject,
}

impl JsFunction {
    pub fn bytecode(name: impl Into<String>, function_id: u32, captured_scope: Option<HeapIndex>) -> Self {
        JsFunction { name: name.into(), kind: FunctionKind::Bytecode { function_id }, captured_scope, extra: JsObject::new() }
    }

    pub fn native(name: impl Into<String>, native_id: u32) -> Self {
        JsFunction { name: name.into(), kind: FunctionKind::Native { native_id }, captured_scope: None, extra: JsObject::new() }
    }

    pub(crate) fn trace(&self, worklist: &mut Vec<HeapIndex>) {
        if let Some(scope) = self.captured_scope {
            worklist.push(scope);
        }
        self.extra.trace(worklist);
    }
}

/// Typed-array element kind (spec §3's "typed-array variants").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedArrayKind {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl TypedArrayKind {
    pub fn element_size(self) -> usize {
        match self {
            TypedArrayKind::Int8 | TypedArrayKind::Uint8 | TypedArrayKind::Uint8Clamped => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsTypedArray {
    pub kind: TypedArrayKind,
    pub buffer: Vec<u8>,
    pub byte_offset: usize,
    pub length: usize,
}

impl JsTypedArray {
    pub fn new(kind: TypedArrayKind, length: usize) -> Self {
        JsTypedArray { kind, buffer: vec![0u8; length * kind.element_size()], byte_offset: 0, length }
    }

    pub(crate) fn trace_buffer(&self, _worklist: &mut Vec<HeapIndex>) {
        // Raw bytes carry no heap references.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::shape::PropertyAttribute;

    #[test]
    fn define_then_get_roundtrips() {
        let mut obj = JsObject::new();
        let slot = obj.define_data(PropertyKey::string("x"), Value::smi(1), PropertyAttribute::default()).unwrap();
        assert_eq!(obj.get_slot(slot), Some(Value::smi(1)));
    }

    #[test]
    fn non_configurable_data_cannot_become_accessor() {
        let mut obj = JsObject::new();
        obj.define_data(PropertyKey::string("x"), Value::smi(1), PropertyAttribute::WRITABLE | PropertyAttribute::ENUMERABLE).unwrap();
        let err = obj.define_accessor(PropertyKey::string("x"), Value::undefined(), Value::undefined(), true, true);
        assert_eq!(err, Err(DefineError::NonConfigurableKindChange));
    }

    #[test]
    fn non_writable_set_is_a_no_op() {
        let mut obj = JsObject::new();
        obj.define_data(PropertyKey::string("x"), Value::smi(1), PropertyAttribute::ENUMERABLE | PropertyAttribute::CONFIGURABLE).unwrap();
        obj.set_property(PropertyKey::string("x"), Value::smi(2)).unwrap();
        let slot = obj.shape().slot_of(&PropertyKey::string("x")).unwrap();
        assert_eq!(obj.get_slot(slot), Some(Value::smi(1)));
    }

    #[test]
    fn prototype_self_cycle_is_rejected() {
        let mut obj = JsObject::new();
        let self_idx = HeapIndex(7);
        let result = obj.set_prototype(Some(self_idx), self_idx, |_| None);
        assert_eq!(result, Err(DefineError::PrototypeCycle));
    }

    #[test]
    fn prototype_transitive_cycle_is_rejected() {
        // a -> b -> a
        let mut a = JsObject::new();
        let a_idx = HeapIndex(1);
        let b_idx = HeapIndex(2);
        let result = a.set_prototype(Some(b_idx), a_idx, move |idx| if idx == b_idx { Some(a_idx) } else { None });
        assert_eq!(result, Err(DefineError::PrototypeCycle));
    }

    #[test]
    fn delete_configurable_property_compacts_slots() {
        let mut obj = JsObject::new();
        obj.define_data(PropertyKey::string("a"), Value::smi(1), PropertyAttribute::default()).unwrap();
        obj.define_data(PropertyKey::string("b"), Value::smi(2), PropertyAttribute::default()).unwrap();
        assert!(obj.delete_property(&PropertyKey::string("a")).unwrap());
        assert!(!obj.has_own_property(&PropertyKey::string("a")));
        let slot = obj.shape().slot_of(&PropertyKey::string("b")).unwrap();
        assert_eq!(obj.get_slot(slot), Some(Value::smi(2)));
    }
}
