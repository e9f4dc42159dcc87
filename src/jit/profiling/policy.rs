//! Compilation policy — decides when to JIT-compile a function and at which tier
//!
//! Two tiers, matching the codegen strategies in `jit::pipeline`/`jit::backend`:
//! a cheap **baseline** tier entered early (template codegen, little
//! specialization) and a more expensive **optimizing** tier entered once a
//! function is hot *and* its observed types have stabilized, since the
//! optimizing tier speculates on them and needs guards worth emitting.

use super::counters::{FunctionProfile, Tier};

/// Configuration for when to trigger JIT compilation and at which tier
#[derive(Debug, Clone)]
pub struct CompilationPolicy {
    /// Call count threshold to enter the baseline tier (default: 100)
    pub baseline_call_threshold: u32,
    /// Call count threshold to enter the optimizing tier (default: 1000)
    pub optimizing_call_threshold: u32,
    /// Loop iteration threshold that alone justifies the optimizing tier,
    /// even below the call threshold (default: 10_000)
    pub optimizing_loop_threshold: u32,
    /// Maximum bytecode size to compile (skip very large functions)
    pub max_function_size: usize,
    /// Minimum observation count before a type record counts toward stability
    pub stability_observations: u32,
    /// Minimum confidence a stable type observation must reach
    pub type_confidence_threshold: f64,
}

impl CompilationPolicy {
    /// Create a policy with default thresholds
    pub fn new() -> Self {
        CompilationPolicy {
            baseline_call_threshold: 100,
            optimizing_call_threshold: 1000,
            optimizing_loop_threshold: 10_000,
            max_function_size: 4096,
            stability_observations: 20,
            type_confidence_threshold: 0.8,
        }
    }

    /// Decide the next tier to compile a function to, if any. Returns `None`
    /// if the function shouldn't be (re)compiled right now: already
    /// compiling, too large, or not hot/stable enough for the next tier up.
    pub fn next_tier(&self, profile: &FunctionProfile, code_size: usize) -> Option<Tier> {
        if code_size > self.max_function_size {
            return None;
        }
        if profile.compiling.load(std::sync::atomic::Ordering::Relaxed) {
            return None;
        }

        let calls = profile.call_count.load(std::sync::atomic::Ordering::Relaxed);
        let loops = profile.loop_count.load(std::sync::atomic::Ordering::Relaxed);
        let current = profile.tier();

        // Optimizing tier takes priority: a function can jump straight there
        // from the interpreter if it's dominated by one very hot loop, even
        // before it would otherwise have crossed the baseline threshold.
        let hot_enough_for_optimizing =
            calls >= self.optimizing_call_threshold || loops >= self.optimizing_loop_threshold;
        if current != Tier::Optimizing
            && hot_enough_for_optimizing
            && profile.types_are_stable(self.stability_observations, self.type_confidence_threshold)
        {
            return Some(Tier::Optimizing);
        }

        if current == Tier::Interpreted && calls >= self.baseline_call_threshold {
            return Some(Tier::Baseline);
        }

        None
    }

    /// Should a function still be considered for compilation at all (legacy,
    /// tier-agnostic check used where callers only care about "hot or not").
    pub fn should_compile(&self, profile: &FunctionProfile, code_size: usize) -> bool {
        self.next_tier(profile, code_size).is_some()
    }

    /// Spec's should-deoptimize predicate: a tiered-up function whose
    /// specialized observations have gone unstable must fall back.
    pub fn should_deoptimize(&self, profile: &FunctionProfile) -> bool {
        profile.tier() != Tier::Interpreted
            && profile.has_unstable_observation(self.stability_observations)
    }
}

impl Default for CompilationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::profiling::counters::{FunctionProfile, TypeTag};

    #[test]
    fn test_default_policy() {
        let policy = CompilationPolicy::new();
        assert_eq!(policy.baseline_call_threshold, 100);
        assert_eq!(policy.optimizing_call_threshold, 1000);
        assert_eq!(policy.optimizing_loop_threshold, 10_000);
        assert_eq!(policy.max_function_size, 4096);
    }

    #[test]
    fn test_below_baseline_threshold() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        for _ in 0..99 {
            profile.record_call();
        }
        assert_eq!(policy.next_tier(&profile, 100), None);
    }

    #[test]
    fn test_baseline_threshold_reached() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        for _ in 0..100 {
            profile.record_call();
        }
        assert_eq!(policy.next_tier(&profile, 100), Some(Tier::Baseline));
    }

    #[test]
    fn test_optimizing_requires_stable_types() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        profile.finish_compile(Tier::Baseline);
        for _ in 0..1000 {
            profile.record_call();
        }
        // No type observations recorded at all -> vacuously stable -> optimizing.
        assert_eq!(policy.next_tier(&profile, 100), Some(Tier::Optimizing));
    }

    #[test]
    fn test_optimizing_blocked_by_unstable_types() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        profile.finish_compile(Tier::Baseline);
        for _ in 0..1000 {
            profile.record_call();
        }
        for i in 0..30 {
            let ty = if i % 2 == 0 { TypeTag::I32 } else { TypeTag::F64 };
            profile.record_type(0, ty, None);
        }
        assert_eq!(policy.next_tier(&profile, 100), None);
    }

    #[test]
    fn test_optimizing_via_loop_threshold_alone() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        for _ in 0..10_000 {
            profile.record_loop();
        }
        assert_eq!(policy.next_tier(&profile, 100), Some(Tier::Optimizing));
    }

    #[test]
    fn test_too_large_never_compiles() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        for _ in 0..2000 {
            profile.record_call();
        }
        assert_eq!(policy.next_tier(&profile, 5000), None);
    }

    #[test]
    fn test_currently_compiling_blocks_next_tier() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        for _ in 0..2000 {
            profile.record_call();
        }
        profile.try_start_compile();
        assert_eq!(policy.next_tier(&profile, 100), None);
    }

    #[test]
    fn test_should_deoptimize() {
        let policy = CompilationPolicy::new();
        let profile = FunctionProfile::new();
        assert!(!policy.should_deoptimize(&profile)); // still interpreted

        profile.finish_compile(Tier::Optimizing);
        assert!(!policy.should_deoptimize(&profile)); // no observations yet

        for i in 0..60 {
            let ty = if i % 2 == 0 { TypeTag::I32 } else { TypeTag::F64 };
            profile.record_type(0, ty, None);
        }
        assert!(policy.should_deoptimize(&profile));
    }
}
