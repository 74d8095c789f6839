//! Raw access to the x86 feature query instruction (CPUID).

#[cfg(all(target_arch = "x86", not(miri)))]
use std::arch::x86::__cpuid_count;
#[cfg(all(target_arch = "x86_64", not(miri)))]
use std::arch::x86_64::__cpuid_count;

use crate::RawRegisters;

/// Executes the feature query instruction for the given leaf and subleaf.
#[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), not(miri)))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) fn cpuid(leaf: u32, subleaf: u32) -> RawRegisters {
    #[allow(unused_unsafe, reason = "the intrinsic is safe on newer toolchains")]
    // SAFETY: The instruction is available on every processor the Rust x86 targets support.
    let result = unsafe { __cpuid_count(leaf, subleaf) };

    RawRegisters::new(result.eax, result.ebx, result.ecx, result.edx)
}

/// Without the feature query instruction, every leaf reads as all zeroes, which decodes to
/// an empty vendor string and no features.
#[cfg(not(all(any(target_arch = "x86", target_arch = "x86_64"), not(miri))))]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) fn cpuid(_leaf: u32, _subleaf: u32) -> RawRegisters {
    RawRegisters::default()
}
