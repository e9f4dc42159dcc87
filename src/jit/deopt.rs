//! Deoptimization: fall back from compiled code to the interpreter
//!
//! When a guard emitted by the Cranelift backend fails at runtime, the
//! compiled function's `deoptimize` runtime-helper call lands here (via
//! `RuntimeHelperTable::deoptimize`, see `jit::runtime::trampoline`). This
//! module reconstructs the interpreter-resumable state from the `DeoptInfo`
//! the backend recorded for the failing guard, invalidates the optimized
//! entry so future calls go back through the interpreter/baseline tier, and
//! resets the profiling state responsible for the bad speculation so it can
//! be relearned.

use crate::jit::backend::traits::{DeoptInfo, PointerLocation};
use crate::jit::profiling::counters::{FunctionProfile, Tier};
use crate::jit::runtime::code_cache::CodeCache;

/// A restored local variable slot, ready to be written back into the
/// interpreter's frame before resuming execution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoredLocal {
    pub slot: u16,
    pub value: u64,
}

/// Interpreter-resumable state reconstructed from a failed guard.
#[derive(Debug, Clone)]
pub struct DeoptimizedFrame {
    /// Bytecode offset the interpreter should resume at
    pub bytecode_offset: usize,
    /// Local slots to restore before resuming, in `DeoptInfo.register_map` order
    pub locals: Vec<RestoredLocal>,
}

/// Coordinates deoptimization: reconstructing interpreter state, invalidating
/// the optimized entry, and resetting the profile that mis-speculated.
pub struct Deoptimizer<'a> {
    code_cache: &'a CodeCache,
}

impl<'a> Deoptimizer<'a> {
    pub fn new(code_cache: &'a CodeCache) -> Self {
        Deoptimizer { code_cache }
    }

    /// Handle a guard failure: invalidate the optimized entry, reset the
    /// function's profile to interpreted tier, and reconstruct the frame
    /// state the interpreter needs to resume at `deopt.bytecode_offset`.
    ///
    /// `locals` is the JIT function's locals buffer (`locals_ptr` from the
    /// trampoline ABI) at the moment of the trap; guard lowering spills every
    /// live register into it before calling the deoptimize helper, so the
    /// values named by `deopt.register_map` are already sitting there.
    pub fn deoptimize(
        &self,
        module_id: u64,
        func_index: u32,
        profile: &FunctionProfile,
        stability_observations: u32,
        deopt: &DeoptInfo,
        locals: &[u64],
    ) -> DeoptimizedFrame {
        self.code_cache.invalidate(module_id, func_index);
        profile.deoptimize(stability_observations);

        let restored = deopt
            .register_map
            .iter()
            .map(|(location, slot)| RestoredLocal {
                slot: *slot,
                value: read_local(location, locals),
            })
            .collect();

        DeoptimizedFrame {
            bytecode_offset: deopt.bytecode_offset,
            locals: restored,
        }
    }
}

/// Read a spilled value back out of the locals buffer. Guard lowering only
/// ever emits `StackOffset` locations (byte offsets into `locals_ptr`); a
/// `Register` location would mean a backend kept a guard's value live in a
/// machine register across the trap, which nothing in this codebase does.
fn read_local(location: &PointerLocation, locals: &[u64]) -> u64 {
    match location {
        PointerLocation::StackOffset(byte_offset) => {
            let index = (*byte_offset as usize) / 8;
            locals.get(index).copied().unwrap_or(0)
        }
        PointerLocation::Register(_) => 0,
    }
}

/// Decide whether a tier-compiled function has deoptimized often enough that
/// it isn't worth recompiling again right away. Mirrors the profile's own
/// stability bookkeeping: a function whose types just went unstable (and
/// were reset by `FunctionProfile::deoptimize`) needs fresh observations
/// before `CompilationPolicy::next_tier` will offer the optimizing tier again.
pub fn tier_after_deopt(profile: &FunctionProfile) -> Tier {
    profile.tier()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jit::backend::traits::{DeoptInfo, PointerLocation};
    use crate::jit::ir::instr::DeoptReason;
    use crate::jit::profiling::counters::TypeTag;

    fn make_deopt_info(bytecode_offset: usize, slots: &[u16]) -> DeoptInfo {
        DeoptInfo {
            code_offset: 0,
            bytecode_offset,
            register_map: slots
                .iter()
                .map(|&slot| (PointerLocation::StackOffset((slot as i32) * 8), slot))
                .collect(),
            reason: DeoptReason::TypeGuardFailed,
        }
    }

    #[test]
    fn test_deoptimize_restores_locals_and_invalidates() {
        let cache = CodeCache::new(1024 * 1024);
        let module_id = cache.allocate_module_id();
        let profile = FunctionProfile::new();
        profile.finish_compile(Tier::Optimizing);

        let deopt_info = make_deopt_info(42, &[0, 2]);
        let locals = vec![10u64, 999, 20u64];

        let deoptimizer = Deoptimizer::new(&cache);
        let frame = deoptimizer.deoptimize(module_id, 7, &profile, 20, &deopt_info, &locals);

        assert_eq!(frame.bytecode_offset, 42);
        assert_eq!(
            frame.locals,
            vec![
                RestoredLocal { slot: 0, value: 10 },
                RestoredLocal { slot: 2, value: 20 },
            ]
        );
        assert_eq!(profile.tier(), Tier::Interpreted);
    }

    #[test]
    fn test_deoptimize_invalidates_code_cache_entry() {
        let cache = CodeCache::new(1024 * 1024);
        let module_id = cache.allocate_module_id();
        let exe = crate::jit::backend::traits::ExecutableCode {
            code_ptr: std::ptr::null(),
            code_size: 0,
            entry_offset: 0,
            stack_maps: vec![],
            deopt_info: vec![],
        };
        cache.insert(module_id, 3, exe);
        assert!(cache.contains(module_id, 3));

        let profile = FunctionProfile::new();
        let deopt_info = make_deopt_info(0, &[]);
        let deoptimizer = Deoptimizer::new(&cache);
        deoptimizer.deoptimize(module_id, 3, &profile, 20, &deopt_info, &[]);

        assert!(!cache.contains(module_id, 3));
    }

    #[test]
    fn test_deoptimize_resets_unstable_type_observation() {
        let cache = CodeCache::new(1024 * 1024);
        let module_id = cache.allocate_module_id();
        let profile = FunctionProfile::new();
        profile.finish_compile(Tier::Optimizing);
        for i in 0..60 {
            let ty = if i % 2 == 0 { TypeTag::I32 } else { TypeTag::F64 };
            profile.record_type(0, ty, None);
        }
        assert!(profile.has_unstable_observation(20));

        let deopt_info = make_deopt_info(0, &[]);
        let deoptimizer = Deoptimizer::new(&cache);
        deoptimizer.deoptimize(module_id, 1, &profile, 20, &deopt_info, &[]);

        assert!(!profile.has_unstable_observation(20));
    }
}
