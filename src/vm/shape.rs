//! Shapes (hidden classes) and the property inline cache.
//!
//! A `Shape` is the immutable identity of an object's property layout: an
//! ordered list of keys with attribute bits. Two objects share a shape iff
//! their key sets and attributes are identical in the same insertion order
//! (spec §3). Shapes are interned process-wide in a `ShapeRegistry` — never
//! freed while any descendant transition is reachable — and linked by a
//! transition tree keyed by `(shape_id, key)` so repeatedly adding the same
//! property to freshly-created objects converges on one shared shape instead
//! of allocating a fresh one per instance.
//!
//! Grounded on `pro-grammer-SD-axiom/axm/src/inline_cache.rs`'s `Shape`/
//! `PropIC`/`IcState` design (V8/CPython-style monomorphic → polymorphic →
//! megamorphic inline caches), extended with the attribute bits and key kinds
//! from `original_source/src/core/object.h`'s `PropertyAttribute`/
//! `PropertyKey`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

/// Attribute bits on a property slot (spec §3's `PropertyDescriptor` flags),
/// mirroring `original_source/src/core/object.h`'s `PropertyAttribute` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAttribute(u8);

impl PropertyAttribute {
    pub const NONE: PropertyAttribute = PropertyAttribute(0);
    pub const WRITABLE: PropertyAttribute = PropertyAttribute(1 << 0);
    pub const ENUMERABLE: PropertyAttribute = PropertyAttribute(1 << 1);
    pub const CONFIGURABLE: PropertyAttribute = PropertyAttribute(1 << 2);
    pub const ACCESSOR: PropertyAttribute = PropertyAttribute(1 << 3);

    pub const fn contains(self, other: PropertyAttribute) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn union(self, other: PropertyAttribute) -> PropertyAttribute {
        PropertyAttribute(self.0 | other.0)
    }

    pub const fn remove(self, other: PropertyAttribute) -> PropertyAttribute {
        PropertyAttribute(self.0 & !other.0)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    pub const fn is_enumerable(self) -> bool {
        self.contains(Self::ENUMERABLE)
    }

    pub const fn is_configurable(self) -> bool {
        self.contains(Self::CONFIGURABLE)
    }

    pub const fn is_accessor(self) -> bool {
        self.contains(Self::ACCESSOR)
    }
}

impl std::ops::BitOr for PropertyAttribute {
    type Output = PropertyAttribute;
    fn bitor(self, rhs: PropertyAttribute) -> PropertyAttribute {
        self.union(rhs)
    }
}

impl Default for PropertyAttribute {
    fn default() -> Self {
        PropertyAttribute::WRITABLE | PropertyAttribute::ENUMERABLE | PropertyAttribute::CONFIGURABLE
    }
}

/// A property key: string, symbol, or dense array index. An integer key and
/// its decimal-string form denote the same slot (spec §3); callers normalize
/// via `PropertyKey::from_str_or_index` at the lookup boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    String(std::sync::Arc<str>),
    Symbol(u64),
    Integer(u32),
}

impl PropertyKey {
    pub fn string(s: impl Into<std::sync::Arc<str>>) -> Self {
        PropertyKey::String(s.into())
    }

    /// Parses `s` as a canonical non-negative decimal integer index when
    /// possible, otherwise keeps it as a string key. `"03"` is not canonical
    /// (leading zero) and stays a string key, matching array-index semantics.
    pub fn from_str_or_index(s: &str) -> Self {
        if !s.is_empty()
            && s.bytes().all(|b| b.is_ascii_digit())
            && (s == "0" || !s.starts_with('0'))
        {
            if let Ok(i) = s.parse::<u32>() {
                return PropertyKey::Integer(i);
            }
        }
        PropertyKey::string(s)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{s}"),
            PropertyKey::Symbol(id) => write!(f, "Symbol(#{id})"),
            PropertyKey::Integer(i) => write!(f, "{i}"),
        }
    }
}

static NEXT_SHAPE_ID: AtomicU32 = AtomicU32::new(1);

/// An object's property layout: ordered `(key, attributes)` with slot index
/// implied by position. Immutable once interned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    pub id: u32,
    entries: Vec<(PropertyKey, PropertyAttribute)>,
}

impl Shape {
    fn empty() -> Self {
        Shape { id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed), entries: Vec::new() }
    }

    pub fn slot_of(&self, key: &PropertyKey) -> Option<u16> {
        self.entries.iter().position(|(k, _)| k == key).map(|i| i as u16)
    }

    pub fn attributes_at(&self, slot: u16) -> Option<PropertyAttribute> {
        self.entries.get(slot as usize).map(|(_, a)| *a)
    }

    pub fn key_at(&self, slot: u16) -> Option<&PropertyKey> {
        self.entries.get(slot as usize).map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    fn appended(&self, key: PropertyKey, attrs: PropertyAttribute) -> Self {
        let mut entries = self.entries.clone();
        entries.push((key, attrs));
        Shape { id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed), entries }
    }

    /// Same keys, with the attributes at `slot` replaced — used when
    /// `defineProperty` narrows writability on an already-configurable slot
    /// without adding a new property.
    fn with_attrs_at(&self, slot: u16, attrs: PropertyAttribute) -> Self {
        let mut entries = self.entries.clone();
        entries[slot as usize].1 = attrs;
        Shape { id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed), entries }
    }
}

#[derive(Default)]
struct RegistryInner {
    shapes: HashMap<u32, std::sync::Arc<Shape>>,
    /// Transition tree: (from shape id, key) -> to shape id, for `add property`.
    add_transitions: HashMap<(u32, PropertyKey), u32>,
    /// Transition tree for attribute-only changes on an existing slot.
    attr_transitions: HashMap<(u32, u16, PropertyAttribute), u32>,
    empty_id: u32,
}

/// Process-wide interning table for shapes (spec §5: "the shape registry ...
/// [is] process-wide and mutated under fine-grained locks").
pub struct ShapeRegistry {
    inner: Mutex<RegistryInner>,
}

impl ShapeRegistry {
    fn new() -> Self {
        let empty = Shape::empty();
        let empty_id = empty.id;
        let mut shapes = HashMap::new();
        shapes.insert(empty_id, std::sync::Arc::new(empty));
        ShapeRegistry { inner: Mutex::new(RegistryInner { shapes, add_transitions: HashMap::new(), attr_transitions: HashMap::new(), empty_id }) }
    }

    pub fn global() -> &'static ShapeRegistry {
        static REGISTRY: OnceLock<ShapeRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ShapeRegistry::new)
    }

    pub fn empty_shape(&self) -> std::sync::Arc<Shape> {
        let inner = self.inner.lock().unwrap();
        inner.shapes[&inner.empty_id].clone()
    }

    pub fn get(&self, id: u32) -> Option<std::sync::Arc<Shape>> {
        self.inner.lock().unwrap().shapes.get(&id).cloned()
    }

    /// Transitions `from` by appending `key` with `attrs`, reusing a cached
    /// transition if one already exists for this (shape, key) pair.
    pub fn transition_add(&self, from: &Shape, key: PropertyKey, attrs: PropertyAttribute) -> std::sync::Arc<Shape> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&to_id) = inner.add_transitions.get(&(from.id, key.clone())) {
            return inner.shapes[&to_id].clone();
        }
        let next = from.appended(key.clone(), attrs);
        let next_id = next.id;
        let next = std::sync::Arc::new(next);
        inner.shapes.insert(next_id, next.clone());
        inner.add_transitions.insert((from.id, key), next_id);
        next
    }

    pub fn transition_attrs(&self, from: &Shape, slot: u16, attrs: PropertyAttribute) -> std::sync::Arc<Shape> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&to_id) = inner.attr_transitions.get(&(from.id, slot, attrs)) {
            return inner.shapes[&to_id].clone();
        }
        let next = from.with_attrs_at(slot, attrs);
        let next_id = next.id;
        let next = std::sync::Arc::new(next);
        inner.shapes.insert(next_id, next.clone());
        inner.attr_transitions.insert((from.id, slot, attrs), next_id);
        next
    }
}

const IC_MAX_POLY: usize = 4;

/// Inline-cache state machine, shared by property-access and call-site caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcState {
    Uninitialized,
    Monomorphic,
    Polymorphic,
    Megamorphic,
}

#[derive(Debug, Clone, Copy)]
pub struct IcEntry {
    pub shape_id: u32,
    pub slot: u16,
    pub is_method: bool,
}

/// One member-access inline cache (spec §4.3: "the interpreter fills
/// [inline cache slots] with `{shape, offset}`").
#[derive(Debug)]
pub struct PropIc {
    pub state: IcState,
    entries: [Option<IcEntry>; IC_MAX_POLY],
    pub hit_count: u32,
    pub miss_count: u32,
}

impl Default for PropIc {
    fn default() -> Self {
        PropIc::new()
    }
}

impl PropIc {
    pub fn new() -> Self {
        PropIc { state: IcState::Uninitialized, entries: [None; IC_MAX_POLY], hit_count: 0, miss_count: 0 }
    }

    #[inline]
    pub fn lookup(&mut self, shape_id: u32) -> Option<IcEntry> {
        match self.state {
            IcState::Monomorphic => {
                if let Some(e) = self.entries[0] {
                    if e.shape_id == shape_id {
                        self.hit_count += 1;
                        return Some(e);
                    }
                }
                self.miss_count += 1;
                None
            }
            IcState::Polymorphic => {
                for e in self.entries.iter().flatten() {
                    if e.shape_id == shape_id {
                        self.hit_count += 1;
                        return Some(*e);
                    }
                }
                self.miss_count += 1;
                None
            }
            IcState::Uninitialized | IcState::Megamorphic => {
                self.miss_count += 1;
                None
            }
        }
    }

    pub fn update(&mut self, shape_id: u32, slot: u16, is_method: bool) {
        let entry = IcEntry { shape_id, slot, is_method };
        match self.state {
            IcState::Uninitialized => {
                self.entries[0] = Some(entry);
                self.state = IcState::Monomorphic;
            }
            IcState::Monomorphic => {
                if self.entries[0].is_some_and(|e| e.shape_id == shape_id) {
                    return;
                }
                self.entries[1] = Some(entry);
                self.state = IcState::Polymorphic;
            }
            IcState::Polymorphic => {
                for slot_opt in &mut self.entries {
                    match slot_opt {
                        Some(e) if e.shape_id == shape_id => return,
                        None => {
                            *slot_opt = Some(entry);
                            return;
                        }
                        _ => {}
                    }
                }
                self.state = IcState::Megamorphic;
            }
            IcState::Megamorphic => {}
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }

    pub fn observed_shapes(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().flatten().map(|e| e.shape_id)
    }
}

/// Call-site inline cache: caches a monomorphic callee identity.
#[derive(Debug)]
pub struct CallIc {
    pub state: IcState,
    pub callee: Option<u64>,
    pub hit_count: u32,
    pub miss_count: u32,
}

impl Default for CallIc {
    fn default() -> Self {
        CallIc::new()
    }
}

impl CallIc {
    pub fn new() -> Self {
        CallIc { state: IcState::Uninitialized, callee: None, hit_count: 0, miss_count: 0 }
    }

    pub fn lookup(&mut self, callee_id: u64) -> bool {
        if self.callee == Some(callee_id) {
            self.hit_count += 1;
            true
        } else {
            self.miss_count += 1;
            false
        }
    }

    pub fn update(&mut self, callee_id: u64) {
        match self.callee {
            None => {
                self.callee = Some(callee_id);
                self.state = IcState::Monomorphic;
            }
            Some(existing) if existing != callee_id => {
                self.state = IcState::Megamorphic;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_string_and_index_share_a_key() {
        assert_eq!(PropertyKey::from_str_or_index("42"), PropertyKey::Integer(42));
        assert_eq!(PropertyKey::from_str_or_index("03"), PropertyKey::string("03"));
        assert_eq!(PropertyKey::from_str_or_index("0"), PropertyKey::Integer(0));
    }

    #[test]
    fn identical_insertion_order_shares_a_shape() {
        let registry = ShapeRegistry::new();
        let empty = registry.empty_shape();
        let a = registry.transition_add(&empty, PropertyKey::string("x"), PropertyAttribute::default());
        let a2 = registry.transition_add(&empty, PropertyKey::string("x"), PropertyAttribute::default());
        assert_eq!(a.id, a2.id);
    }

    #[test]
    fn different_insertion_order_is_a_different_shape() {
        let registry = ShapeRegistry::new();
        let empty = registry.empty_shape();
        let xy = registry.transition_add(&registry.transition_add(&empty, PropertyKey::string("x"), PropertyAttribute::default()), PropertyKey::string("y"), PropertyAttribute::default());
        let yx = registry.transition_add(&registry.transition_add(&empty, PropertyKey::string("y"), PropertyAttribute::default()), PropertyKey::string("x"), PropertyAttribute::default());
        assert_ne!(xy.id, yx.id);
    }

    #[test]
    fn prop_ic_goes_monomorphic_then_polymorphic_then_megamorphic() {
        let mut ic = PropIc::new();
        ic.update(1, 0, false);
        assert_eq!(ic.state, IcState::Monomorphic);
        ic.update(2, 0, false);
        assert_eq!(ic.state, IcState::Polymorphic);
        ic.update(3, 0, false);
        ic.update(4, 0, false);
        ic.update(5, 0, false);
        assert_eq!(ic.state, IcState::Megamorphic);
    }
}
