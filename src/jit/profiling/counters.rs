//! Profiling counters and per-node observation records for hot function detection
//! and speculative optimization.
//!
//! The interpreter increments `call_count`/`loop_count` at function entry and
//! backward jumps, and records `TypeObservation`/`ShapeObservation`/`CallSiteInfo`
//! at instrumented operand/property-access/call-site points. The JIT reads these
//! records (never writes them) to decide what to specialize and which guards to
//! emit; a failed guard resets the responsible record via `FunctionProfile::deoptimize`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Compilation tier a function is currently running at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Interpreted,
    Baseline,
    Optimizing,
}

/// Coarse runtime type tag observed at one bytecode operand, mirroring the tags
/// `vm::value::Value` NaN-boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    I32,
    F64,
    Bool,
    String,
    Object,
    Array,
    Function,
    Null,
    Undefined,
}

/// Degree of polymorphism at a shape or call-site observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Morphism {
    Monomorphic,
    Polymorphic,
    Megamorphic,
}

/// Above this many distinct shapes/callees, a site is megamorphic rather than
/// merely polymorphic.
const POLYMORPHIC_CAP: usize = 4;

/// Step a confidence value given whether the new observation matched the
/// current primary. Returns `(new_confidence, reset_primary)`: same-match
/// raises confidence by 0.1 (capped at 1.0); a mismatch drops it by 0.3
/// (floored at 0.0), and if that drop takes it below 0.2 the primary itself
/// should flip to the new value at a reset confidence of 0.5.
fn step_confidence(confidence: f64, matched: bool) -> (f64, bool) {
    if matched {
        ((confidence + 0.1).min(1.0), false)
    } else {
        let dropped = (confidence - 0.3).max(0.0);
        if dropped < 0.2 {
            (0.5, true)
        } else {
            (dropped, false)
        }
    }
}

/// Confidence-weighted observation of the type seen at one operand.
///
/// `has_nan`/`has_neg_zero` are sticky: once either special value has been
/// seen it stays flagged, since a float-arithmetic guard needs to know
/// whether it was *ever* produced, not just in the most recent observation.
#[derive(Debug, Clone)]
pub struct TypeObservation {
    pub primary_type: Option<TypeTag>,
    pub confidence: f64,
    pub observation_count: u32,
    pub has_nan: bool,
    pub has_neg_zero: bool,
}

impl TypeObservation {
    pub fn new() -> Self {
        TypeObservation {
            primary_type: None,
            confidence: 0.0,
            observation_count: 0,
            has_nan: false,
            has_neg_zero: false,
        }
    }

    /// Record one observed type, with an optional numeric value used to pick
    /// up the NaN/-0 sticky flags.
    pub fn record(&mut self, ty: TypeTag, value: Option<f64>) {
        self.observation_count += 1;
        if let Some(v) = value {
            if v.is_nan() {
                self.has_nan = true;
            }
            if v == 0.0 && v.is_sign_negative() {
                self.has_neg_zero = true;
            }
        }

        match self.primary_type {
            None => {
                self.primary_type = Some(ty);
                self.confidence = 1.0;
            }
            Some(current) => {
                let (confidence, reset) = step_confidence(self.confidence, current == ty);
                self.confidence = confidence;
                if reset {
                    self.primary_type = Some(ty);
                }
            }
        }
    }

    /// Whether this observation has enough history and confidence to be
    /// considered stable (spec's should-optimize predicate operates over
    /// this per-observation stability).
    pub fn is_stable(&self, min_observations: u32, min_confidence: f64) -> bool {
        self.observation_count < min_observations || self.confidence >= min_confidence
    }

    pub fn is_unstable(&self, min_observations: u32, max_confidence: f64) -> bool {
        self.observation_count >= min_observations && self.confidence < max_confidence
    }
}

impl Default for TypeObservation {
    fn default() -> Self {
        Self::new()
    }
}

/// Confidence-weighted observation of the object shape seen at one property
/// access, plus a frequency table used for `most_frequent_shape`.
#[derive(Debug, Clone)]
pub struct ShapeObservation {
    pub primary_shape: Option<u32>,
    pub confidence: f64,
    pub observation_count: u32,
    pub frequencies: FxHashMap<u32, u32>,
}

impl ShapeObservation {
    pub fn new() -> Self {
        ShapeObservation {
            primary_shape: None,
            confidence: 0.0,
            observation_count: 0,
            frequencies: FxHashMap::default(),
        }
    }

    pub fn record(&mut self, shape_id: u32) {
        self.observation_count += 1;
        *self.frequencies.entry(shape_id).or_insert(0) += 1;

        match self.primary_shape {
            None => {
                self.primary_shape = Some(shape_id);
                self.confidence = 1.0;
            }
            Some(current) => {
                let (confidence, reset) = step_confidence(self.confidence, current == shape_id);
                self.confidence = confidence;
                if reset {
                    self.primary_shape = Some(shape_id);
                }
            }
        }
    }

    pub fn unique_shapes(&self) -> usize {
        self.frequencies.len()
    }

    pub fn most_frequent_shape(&self) -> Option<u32> {
        self.frequencies.iter().max_by_key(|&(_, count)| count).map(|(&id, _)| id)
    }

    pub fn morphism(&self) -> Morphism {
        let unique = self.unique_shapes();
        if unique <= 1 || self.confidence >= 0.95 {
            Morphism::Monomorphic
        } else if unique <= POLYMORPHIC_CAP {
            Morphism::Polymorphic
        } else {
            Morphism::Megamorphic
        }
    }

    pub fn is_unstable(&self, min_observations: u32, max_confidence: f64) -> bool {
        self.observation_count >= min_observations && self.confidence < max_confidence
    }
}

impl Default for ShapeObservation {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call-site callee tracking: how many times each distinct callee has
/// been invoked from this call site.
#[derive(Debug, Clone, Default)]
pub struct CallSiteInfo {
    pub callee_counts: FxHashMap<u32, u32>,
}

impl CallSiteInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, callee_func_index: u32) {
        *self.callee_counts.entry(callee_func_index).or_insert(0) += 1;
    }

    pub fn unique_callees(&self) -> usize {
        self.callee_counts.len()
    }

    pub fn total_calls(&self) -> u32 {
        self.callee_counts.values().sum()
    }

    /// The callee observed most often at this call site, if any.
    pub fn dominant_callee(&self) -> Option<u32> {
        self.callee_counts.iter().max_by_key(|&(_, count)| count).map(|(&f, _)| f)
    }

    pub fn morphism(&self) -> Morphism {
        let unique = self.unique_callees();
        if unique <= 1 {
            Morphism::Monomorphic
        } else if unique <= POLYMORPHIC_CAP {
            Morphism::Polymorphic
        } else {
            Morphism::Megamorphic
        }
    }
}

/// Profiling counters and observation records for a single function
pub struct FunctionProfile {
    /// Number of times this function has been called
    pub call_count: AtomicU32,
    /// Number of times backward jumps (loops) have been taken
    pub loop_count: AtomicU32,
    /// Whether compilation is currently in progress
    pub compiling: AtomicBool,
    /// Whether JIT-compiled code is available at the current tier
    pub jit_available: AtomicBool,
    /// Which tier this function is currently executing at
    tier: Mutex<Tier>,
    /// Per-node (bytecode offset) type observations
    types: Mutex<FxHashMap<u32, TypeObservation>>,
    /// Per-node (bytecode offset) shape observations
    shapes: Mutex<FxHashMap<u32, ShapeObservation>>,
    /// Per-call-site (bytecode offset) callee observations
    call_sites: Mutex<FxHashMap<u32, CallSiteInfo>>,
}

impl FunctionProfile {
    /// Create a new profile with zero counters and no observations
    pub fn new() -> Self {
        FunctionProfile {
            call_count: AtomicU32::new(0),
            loop_count: AtomicU32::new(0),
            compiling: AtomicBool::new(false),
            jit_available: AtomicBool::new(false),
            tier: Mutex::new(Tier::Interpreted),
            types: Mutex::new(FxHashMap::default()),
            shapes: Mutex::new(FxHashMap::default()),
            call_sites: Mutex::new(FxHashMap::default()),
        }
    }

    /// Record a function call, return new count
    pub fn record_call(&self) -> u32 {
        self.call_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a loop iteration (backward jump), return new count
    pub fn record_loop(&self) -> u32 {
        self.loop_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record the type observed at bytecode offset `node` (interpreter hook:
    /// `profiler.recordType(fid, node, tag, value?)`).
    pub fn record_type(&self, node: u32, ty: TypeTag, value: Option<f64>) {
        self.types.lock().entry(node).or_default().record(ty, value);
    }

    /// Record the object shape observed at bytecode offset `node`
    /// (interpreter hook: `profiler.recordShape(fid, node, shape)`).
    pub fn record_shape(&self, node: u32, shape_id: u32) {
        self.shapes.lock().entry(node).or_default().record(shape_id);
    }

    /// Record the callee observed at call-site offset `site`.
    pub fn record_call_site(&self, site: u32, callee_func_index: u32) {
        self.call_sites.lock().entry(site).or_default().record(callee_func_index);
    }

    pub fn type_observation(&self, node: u32) -> Option<TypeObservation> {
        self.types.lock().get(&node).cloned()
    }

    pub fn shape_observation(&self, node: u32) -> Option<ShapeObservation> {
        self.shapes.lock().get(&node).cloned()
    }

    pub fn call_site_info(&self, site: u32) -> Option<CallSiteInfo> {
        self.call_sites.lock().get(&site).cloned()
    }

    pub fn tier(&self) -> Tier {
        *self.tier.lock()
    }

    /// Try to claim this function for compilation (CAS on `compiling` flag)
    /// Returns true if we successfully claimed it
    pub fn try_start_compile(&self) -> bool {
        self.compiling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Mark compilation as complete and record which tier got installed
    pub fn finish_compile(&self, tier: Tier) {
        *self.tier.lock() = tier;
        self.jit_available.store(true, Ordering::Release);
        self.compiling.store(false, Ordering::Release);
    }

    /// Check if JIT code is available at the function's current tier
    pub fn is_jit_available(&self) -> bool {
        self.jit_available.load(Ordering::Acquire)
    }

    /// Spec's should-optimize predicate: every type observation with at
    /// least `min_observations` samples is at or above `min_confidence`.
    pub fn types_are_stable(&self, min_observations: u32, min_confidence: f64) -> bool {
        self.types.lock().values().all(|obs| obs.is_stable(min_observations, min_confidence))
    }

    /// Spec's should-deoptimize predicate: any type or shape observation
    /// with at least `2 * min_observations` samples has fallen below 0.5
    /// confidence.
    pub fn has_unstable_observation(&self, min_observations: u32) -> bool {
        let threshold = min_observations.saturating_mul(2);
        self.types.lock().values().any(|obs| obs.is_unstable(threshold, 0.5))
            || self.shapes.lock().values().any(|obs| obs.is_unstable(threshold, 0.5))
    }

    /// Drop back to the interpreter tier after a guard failure, and let the
    /// observation(s) responsible for the instability re-learn from scratch.
    pub fn deoptimize(&self, min_observations: u32) {
        *self.tier.lock() = Tier::Interpreted;
        self.jit_available.store(false, Ordering::Release);
        let threshold = min_observations.saturating_mul(2);
        for obs in self.types.lock().values_mut() {
            if obs.is_unstable(threshold, 0.5) {
                *obs = TypeObservation::new();
            }
        }
        for obs in self.shapes.lock().values_mut() {
            if obs.is_unstable(threshold, 0.5) {
                *obs = ShapeObservation::new();
            }
        }
    }
}

impl Default for FunctionProfile {
    fn default() -> Self {
        Self::new()
    }
}

/// Profiling data for all functions in a module
pub struct ModuleProfile {
    /// Per-function profiling counters
    pub functions: Vec<FunctionProfile>,
}

impl ModuleProfile {
    /// Create a profile for a module with the given number of functions
    pub fn new(function_count: usize) -> Self {
        let mut functions = Vec::with_capacity(function_count);
        for _ in 0..function_count {
            functions.push(FunctionProfile::new());
        }
        ModuleProfile { functions }
    }

    /// Record a call to function `func_id`, return new call count
    pub fn record_call(&self, func_id: usize) -> u32 {
        if func_id < self.functions.len() {
            self.functions[func_id].record_call()
        } else {
            0
        }
    }

    /// Record a loop iteration in function `func_id`, return new loop count
    pub fn record_loop(&self, func_id: usize) -> u32 {
        if func_id < self.functions.len() {
            self.functions[func_id].record_loop()
        } else {
            0
        }
    }

    /// Get the profile for a specific function
    pub fn get(&self, func_id: usize) -> Option<&FunctionProfile> {
        self.functions.get(func_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_profile_counters() {
        let profile = FunctionProfile::new();
        assert_eq!(profile.record_call(), 1);
        assert_eq!(profile.record_call(), 2);
        assert_eq!(profile.record_call(), 3);
        assert_eq!(profile.record_loop(), 1);
        assert_eq!(profile.record_loop(), 2);
    }

    #[test]
    fn test_compilation_lifecycle() {
        let profile = FunctionProfile::new();
        assert!(!profile.is_jit_available());

        assert!(profile.try_start_compile());
        assert!(!profile.try_start_compile());

        profile.finish_compile(Tier::Baseline);
        assert!(profile.is_jit_available());
        assert_eq!(profile.tier(), Tier::Baseline);

        assert!(profile.try_start_compile());
    }

    #[test]
    fn test_module_profile() {
        let profile = ModuleProfile::new(3);
        assert_eq!(profile.functions.len(), 3);

        assert_eq!(profile.record_call(0), 1);
        assert_eq!(profile.record_call(0), 2);
        assert_eq!(profile.record_call(1), 1);
        assert_eq!(profile.record_loop(2), 1);

        assert_eq!(profile.record_call(99), 0);
    }

    #[test]
    fn test_type_observation_same_type_raises_confidence() {
        let mut obs = TypeObservation::new();
        obs.record(TypeTag::I32, Some(1.0));
        assert_eq!(obs.primary_type, Some(TypeTag::I32));
        assert_eq!(obs.confidence, 1.0);

        obs.record(TypeTag::I32, Some(2.0));
        assert_eq!(obs.confidence, 1.0); // capped at 1.0

        obs.confidence = 0.5;
        obs.record(TypeTag::I32, None);
        assert!((obs.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_type_observation_mismatch_drops_and_resets() {
        let mut obs = TypeObservation::new();
        obs.record(TypeTag::I32, None); // confidence 1.0, primary I32
        obs.record(TypeTag::F64, None); // 1.0 - 0.3 = 0.7, still I32
        assert_eq!(obs.primary_type, Some(TypeTag::I32));
        assert!((obs.confidence - 0.7).abs() < 1e-9);

        obs.record(TypeTag::F64, None); // 0.7 - 0.3 = 0.4
        obs.record(TypeTag::F64, None); // 0.4 - 0.3 = 0.1 < 0.2 -> resets to F64 @ 0.5
        assert_eq!(obs.primary_type, Some(TypeTag::F64));
        assert!((obs.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_type_observation_sticky_nan_and_neg_zero() {
        let mut obs = TypeObservation::new();
        obs.record(TypeTag::F64, Some(f64::NAN));
        obs.record(TypeTag::F64, Some(1.0));
        assert!(obs.has_nan);

        let mut obs2 = TypeObservation::new();
        obs2.record(TypeTag::F64, Some(-0.0));
        obs2.record(TypeTag::F64, Some(1.0));
        assert!(obs2.has_neg_zero);
    }

    #[test]
    fn test_shape_observation_morphism() {
        let mut mono = ShapeObservation::new();
        for _ in 0..10 {
            mono.record(1);
        }
        assert_eq!(mono.morphism(), Morphism::Monomorphic);
        assert_eq!(mono.most_frequent_shape(), Some(1));

        let mut poly = ShapeObservation::new();
        poly.record(1);
        poly.record(2);
        poly.record(3);
        assert_eq!(poly.morphism(), Morphism::Polymorphic);

        let mut mega = ShapeObservation::new();
        for shape in 0..10u32 {
            mega.record(shape);
        }
        assert_eq!(mega.morphism(), Morphism::Megamorphic);
    }

    #[test]
    fn test_call_site_info_dominant_callee() {
        let mut site = CallSiteInfo::new();
        site.record(7);
        site.record(7);
        site.record(7);
        site.record(9);
        assert_eq!(site.dominant_callee(), Some(7));
        assert_eq!(site.total_calls(), 4);
        assert_eq!(site.morphism(), Morphism::Polymorphic);
    }

    #[test]
    fn test_should_optimize_requires_stable_types() {
        let profile = FunctionProfile::new();
        for _ in 0..30 {
            profile.record_type(0, TypeTag::I32, None);
        }
        assert!(profile.types_are_stable(20, 0.8));

        profile.record_type(1, TypeTag::I32, None);
        profile.record_type(1, TypeTag::F64, None);
        profile.record_type(1, TypeTag::F64, None);
        profile.record_type(1, TypeTag::F64, None);
        for _ in 0..20 {
            profile.record_type(1, TypeTag::F64, None);
        }
        // node 1 now has >= 20 observations but started unstable; with enough
        // consistent F64 hits afterward it should climb back to stable.
        assert!(profile.types_are_stable(20, 0.8) || profile.has_unstable_observation(20));
    }

    #[test]
    fn test_should_deoptimize_and_reset() {
        let profile = FunctionProfile::new();
        profile.finish_compile(Tier::Optimizing);

        // Alternate types to keep confidence low across many observations.
        for i in 0..60 {
            let ty = if i % 2 == 0 { TypeTag::I32 } else { TypeTag::F64 };
            profile.record_type(0, ty, None);
        }
        assert!(profile.has_unstable_observation(20));

        profile.deoptimize(20);
        assert_eq!(profile.tier(), Tier::Interpreted);
        assert!(!profile.is_jit_available());
        assert!(profile.type_observation(0).unwrap().observation_count == 0);
    }
}
