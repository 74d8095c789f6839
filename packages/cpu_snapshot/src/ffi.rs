//! C-compatible surface for foreign callers.
//!
//! [`get_cpu_data()`] captures a snapshot of the current hardware into a caller-provided
//! [`CpuData`] record and [`free_cpu_data()`] releases everything it allocated. The record is a
//! flat, explicitly laid-out translation of [`Snapshot`], made once at this boundary.
//!
//! # Status codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 201 | null output pointer |
//! | 202 | failed to open/access platform system-information source |
//! | 203 | memory allocation failure |
//! | 204–207 | platform-API-specific topology-query failures |
//! | 208 | allocation failure for internal per-logical-core arrays |
//!
//! On any non-zero status the output record is left exactly as the caller provided it and no
//! memory remains allocated.

use std::ffi::{CString, c_char, c_int};
use std::ptr;

use tracing::{debug, warn};

use crate::snapshot::SnapshotParts;
use crate::{CoreClass, Error, Feature, FeatureFlags, L2Cache, Result, Snapshot, SnapshotSource};

/// The status code reported on success.
pub const STATUS_SUCCESS: c_int = 0;

/// L2 cache information of one logical core.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
#[expect(
    clippy::exhaustive_structs,
    reason = "layout is fixed by the C surface"
)]
pub struct L2CacheInfo {
    /// Size of the L2 cache instance in KiB, zero if unknown.
    pub l2cache_size: c_int,

    /// How many logical cores share the L2 cache instance, zero if unknown.
    pub shared_with_core_number: c_int,
}

/// Classification of a physical core, as a C enum.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
#[expect(
    clippy::exhaustive_enums,
    reason = "values are fixed by the C surface"
)]
pub enum CoreType {
    /// [`CoreClass::Performance`].
    Performance = 0,

    /// [`CoreClass::Efficiency`].
    Efficiency = 1,

    /// [`CoreClass::Unknown`].
    #[default]
    Unknown = 2,
}

impl From<CoreClass> for CoreType {
    fn from(class: CoreClass) -> Self {
        match class {
            CoreClass::Performance => Self::Performance,
            CoreClass::Efficiency => Self::Efficiency,
            CoreClass::Unknown => Self::Unknown,
        }
    }
}

/// One physical core and the logical cores it hosts.
#[derive(Debug)]
#[repr(C)]
#[expect(
    clippy::exhaustive_structs,
    reason = "layout is fixed by the C surface"
)]
pub struct PhysicalCoreInfo {
    /// Opaque platform identifier of the core. Cores the platform did not attribute to any
    /// topology record report -1.
    pub id: c_int,

    /// Classification of the core.
    pub core_type: CoreType,

    /// The logical core indices hosted by the core, in ascending order.
    pub logical_ids: *mut c_int,

    /// Length of `logical_ids`.
    pub logical_count: c_int,
}

/// Instruction set extension flags, one byte each, 1 if supported and 0 otherwise.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(C)]
#[expect(
    clippy::exhaustive_structs,
    reason = "layout is fixed by the C surface"
)]
#[expect(
    missing_docs,
    reason = "one flag per feature, each named after and documented by its Feature variant"
)]
pub struct CpuAlgorithms {
    pub sse: c_char,
    pub sse2: c_char,
    pub sse3: c_char,
    pub ssse3: c_char,
    pub sse4_1: c_char,
    pub sse4_2: c_char,
    pub avx: c_char,
    pub popcnt: c_char,
    pub pclmulqdq: c_char,
    pub aes: c_char,
    pub fma: c_char,
    pub f16c: c_char,
    pub xsave: c_char,
    pub osxsave: c_char,
    pub rdrand: c_char,
    pub rdseed: c_char,
    pub adx: c_char,
    pub mpx: c_char,
    pub prefetchwt1: c_char,
    pub avx2: c_char,
    pub bmi1: c_char,
    pub bmi2: c_char,
    pub avx512f: c_char,
    pub sha: c_char,
    pub sse4a: c_char,
    pub xop: c_char,
    pub fma4: c_char,
    pub three_dnow_plus: c_char,
}

impl From<FeatureFlags> for CpuAlgorithms {
    fn from(features: FeatureFlags) -> Self {
        let flag = |feature| c_char::from(features.contains(feature));

        Self {
            sse: flag(Feature::Sse),
            sse2: flag(Feature::Sse2),
            sse3: flag(Feature::Sse3),
            ssse3: flag(Feature::Ssse3),
            sse4_1: flag(Feature::Sse4_1),
            sse4_2: flag(Feature::Sse4_2),
            avx: flag(Feature::Avx),
            popcnt: flag(Feature::Popcnt),
            pclmulqdq: flag(Feature::Pclmulqdq),
            aes: flag(Feature::Aes),
            fma: flag(Feature::Fma),
            f16c: flag(Feature::F16c),
            xsave: flag(Feature::Xsave),
            osxsave: flag(Feature::Osxsave),
            rdrand: flag(Feature::Rdrand),
            rdseed: flag(Feature::Rdseed),
            adx: flag(Feature::Adx),
            mpx: flag(Feature::Mpx),
            prefetchwt1: flag(Feature::Prefetchwt1),
            avx2: flag(Feature::Avx2),
            bmi1: flag(Feature::Bmi1),
            bmi2: flag(Feature::Bmi2),
            avx512f: flag(Feature::Avx512f),
            sha: flag(Feature::Sha),
            sse4a: flag(Feature::Sse4a),
            xop: flag(Feature::Xop),
            fma4: flag(Feature::Fma4),
            three_dnow_plus: flag(Feature::ThreeDNowPlus),
        }
    }
}

/// The snapshot as a flat C record.
///
/// All pointers are owned by the record after a successful [`get_cpu_data()`] and must be
/// released with [`free_cpu_data()`], never with the C allocator.
#[derive(Debug)]
#[repr(C)]
#[expect(
    clippy::exhaustive_structs,
    reason = "layout is fixed by the C surface"
)]
pub struct CpuData {
    /// NUL-terminated brand string.
    pub cpu_name: *mut c_char,

    /// Number of logical cores, the length of `l1size`, `l2size` and `frequency`.
    pub logical_core_count: c_int,

    /// Number of physical cores, the length of `cores`.
    pub physical_core_count: c_int,

    /// The physical cores.
    pub cores: *mut PhysicalCoreInfo,

    /// L1 cache size of every logical core, in KiB.
    pub l1size: *mut c_int,

    /// L2 cache information of every logical core.
    pub l2size: *mut L2CacheInfo,

    /// Current frequency of every logical core, in MHz.
    pub frequency: *mut c_int,

    /// Size of the shared L3 cache, in KiB.
    pub l3size: c_int,

    /// Instruction set extension flags.
    pub algorithms: CpuAlgorithms,
}

impl Default for CpuData {
    /// A record with null pointers and zero counts, ready to be filled by [`get_cpu_data()`].
    fn default() -> Self {
        Self {
            cpu_name: ptr::null_mut(),
            logical_core_count: 0,
            physical_core_count: 0,
            cores: ptr::null_mut(),
            l1size: ptr::null_mut(),
            l2size: ptr::null_mut(),
            frequency: ptr::null_mut(),
            l3size: 0,
            algorithms: CpuAlgorithms::default(),
        }
    }
}

impl CpuData {
    /// Translates a snapshot into a C record.
    ///
    /// Every allocation happens before any memory is handed over to raw pointers, so a failure
    /// drops everything allocated so far.
    fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let SnapshotParts {
            brand,
            logical_core_count,
            physical_cores,
            l1_kib,
            l2,
            frequency_mhz,
            l3_kib,
            features,
        } = snapshot.into_parts();

        // `release()` rebuilds every array from these counts, so they must be exact.
        let logical_core_count = c_length(logical_core_count, "the logical core count")?;
        let physical_core_count = c_length(physical_cores.len(), "the physical core count")?;

        let cpu_name = c_string(brand)?;
        let l1size = to_c_ints(&l1_kib)?;
        let frequency = to_c_ints(&frequency_mhz)?;

        let mut l2size = Vec::new();
        l2size
            .try_reserve_exact(l2.len())
            .map_err(|e| Error::allocation("translating L2 cache information", e))?;
        l2size.extend(l2.into_iter().map(l2_cache_info));

        let mut member_lists = Vec::new();
        member_lists
            .try_reserve_exact(physical_cores.len())
            .map_err(|e| Error::allocation("translating physical cores", e))?;

        for core in physical_cores {
            let (id, class, logical_core_indices) = core.into_parts();
            member_lists.push((
                c_int::from_ne_bytes(id.to_ne_bytes()),
                CoreType::from(class),
                c_length(logical_core_indices.len(), "a physical core member count")?,
                to_c_ints(&logical_core_indices)?,
            ));
        }

        let mut cores = Vec::new();
        cores
            .try_reserve_exact(member_lists.len())
            .map_err(|e| Error::allocation("allocating the physical core list", e))?;

        // Nothing below can fail, so handing ownership to raw pointers cannot leak.
        cores.extend(
            member_lists
                .into_iter()
                .map(|(id, core_type, logical_count, logical_ids)| PhysicalCoreInfo {
                    id,
                    core_type,
                    logical_ids: into_raw_slice(logical_ids),
                    logical_count,
                }),
        );

        Ok(Self {
            cpu_name: cpu_name.into_raw(),
            logical_core_count,
            physical_core_count,
            cores: into_raw_slice(cores),
            l1size: into_raw_slice(l1size),
            l2size: into_raw_slice(l2size),
            frequency: into_raw_slice(frequency),
            l3size: saturating_c_int(l3_kib),
            algorithms: CpuAlgorithms::from(features),
        })
    }

    /// Releases everything the record owns and resets it to [`CpuData::default()`].
    ///
    /// # Safety
    ///
    /// Every pointer must be null or have been produced by [`get_cpu_data()`], with the counts
    /// unchanged since.
    unsafe fn release(&mut self) {
        if !self.cpu_name.is_null() {
            // SAFETY: Produced by `CString::into_raw()`, as guaranteed by the caller.
            drop(unsafe { CString::from_raw(self.cpu_name) });
        }

        if !self.cores.is_null() {
            let len = usize::try_from(self.physical_core_count).unwrap_or_default();

            // SAFETY: Produced by `into_raw_slice()` with this length, as guaranteed by the caller.
            let cores = unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(self.cores, len)) };

            for core in &cores {
                // SAFETY: Produced by `into_raw_slice()` with this length, as guaranteed by the
                // caller.
                unsafe { drop_raw_slice(core.logical_ids, core.logical_count) };
            }
        }

        // SAFETY: Produced by `into_raw_slice()` with this length, as guaranteed by the caller.
        unsafe { drop_raw_slice(self.l1size, self.logical_core_count) };
        // SAFETY: Produced by `into_raw_slice()` with this length, as guaranteed by the caller.
        unsafe { drop_raw_slice(self.l2size, self.logical_core_count) };
        // SAFETY: Produced by `into_raw_slice()` with this length, as guaranteed by the caller.
        unsafe { drop_raw_slice(self.frequency, self.logical_core_count) };

        *self = Self::default();
    }
}

/// Captures a snapshot of the current hardware into `out`.
///
/// Returns [`STATUS_SUCCESS`] or one of the status codes listed in the [module
/// documentation][self]. On failure `out` is left untouched.
///
/// # Safety
///
/// `out` must be null or valid for writes of one [`CpuData`]. Any pointers already in `*out`
/// are overwritten without being released.
#[unsafe(no_mangle)]
#[must_use]
pub unsafe extern "C" fn get_cpu_data(out: *mut CpuData) -> c_int {
    // SAFETY: Forwarding the safety requirements to the caller.
    unsafe { capture_into(&SnapshotSource::current(), out) }
}

/// Releases everything [`get_cpu_data()`] allocated into `data` and resets it to
/// [`CpuData::default()`]. Does nothing if `data` is null.
///
/// # Safety
///
/// `data` must be null or point to a record filled by [`get_cpu_data()`] (or
/// [`capture_into()`]) and not modified since. Records that were never filled must hold only
/// null pointers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_cpu_data(data: *mut CpuData) {
    // SAFETY: The caller guarantees the pointer is null or valid.
    let Some(data) = (unsafe { data.as_mut() }) else {
        return;
    };

    // SAFETY: The caller guarantees the record came from `get_cpu_data()`.
    unsafe { data.release() };
}

/// Captures a snapshot from `source` into `out`, with the same contract as [`get_cpu_data()`].
///
/// This is the Rust-callable form of the C surface, which lets callers exercise it against
/// fake hardware.
///
/// # Safety
///
/// Same as [`get_cpu_data()`].
#[must_use]
pub unsafe fn capture_into(source: &SnapshotSource, out: *mut CpuData) -> c_int {
    if out.is_null() {
        let error = Error::NullOutput;
        warn!(status = error.status_code(), %error, "rejected snapshot request");
        return error.status_code();
    }

    match source.capture().and_then(CpuData::from_snapshot) {
        Ok(data) => {
            // SAFETY: The caller guarantees `out` is valid for writes.
            unsafe { out.write(data) };

            debug!(status = STATUS_SUCCESS, "wrote snapshot to C record");
            STATUS_SUCCESS
        }
        Err(error) => {
            warn!(status = error.status_code(), %error, "snapshot capture failed");
            error.status_code()
        }
    }
}

fn l2_cache_info(l2: L2Cache) -> L2CacheInfo {
    L2CacheInfo {
        l2cache_size: saturating_c_int(l2.size_kib),
        shared_with_core_number: saturating_c_int(l2.shared_with_core_number),
    }
}

fn c_string(value: String) -> Result<CString> {
    let mut bytes = value.into_bytes();

    // Decoded strings stop at the first NUL but fake brand strings may contain anything.
    bytes.retain(|&b| b != 0);

    bytes
        .try_reserve_exact(1)
        .map_err(|e| Error::allocation("terminating the brand string", e))?;

    // We just removed every NUL byte.
    Ok(CString::new(bytes).unwrap_or_default())
}

fn to_c_ints(values: &[u32]) -> Result<Vec<c_int>> {
    let mut result = Vec::new();
    result
        .try_reserve_exact(values.len())
        .map_err(|e| Error::allocation("translating a per-core array", e))?;
    result.extend(values.iter().copied().map(saturating_c_int));
    Ok(result)
}

/// Converts an array length for the C record, failing if C cannot represent it.
fn c_length(len: usize, context: &'static str) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| Error::LengthOverflow { context, len })
}

fn saturating_c_int<T>(value: T) -> c_int
where
    c_int: TryFrom<T>,
{
    c_int::try_from(value).unwrap_or(c_int::MAX)
}

fn into_raw_slice<T>(values: Vec<T>) -> *mut T {
    Box::into_raw(values.into_boxed_slice()).cast()
}

/// # Safety
///
/// `ptr` must be null or have been produced by [`into_raw_slice()`] from `len` values.
unsafe fn drop_raw_slice<T>(ptr: *mut T, len: c_int) {
    if ptr.is_null() {
        return;
    }

    let len = usize::try_from(len).unwrap_or_default();

    // SAFETY: Forwarding the safety requirements to the caller.
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)) });
}

#[allow(
    clippy::indexing_slicing,
    clippy::cast_sign_loss,
    clippy::arithmetic_side_effects,
    reason = "we need not worry in tests"
)]
