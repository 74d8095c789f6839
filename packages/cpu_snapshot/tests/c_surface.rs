//! Exercises the C surface against fake hardware: status codes, ownership of the written record
//! and the guarantee that failed captures leave the output record untouched.

use std::ffi::{CStr, c_int};
use std::ptr;
use std::slice;

use cpu_snapshot::fake::{FakeFailure, HardwareBuilder};
use cpu_snapshot::{
    AMD_VENDOR_STRING, CacheDescriptor, CacheSize, CoreClass, CoreType, CpuData, FeatureLeaves,
    RawRegisters, STATUS_SUCCESS, SnapshotSource, TopologyQueryFailure, capture_into,
    free_cpu_data,
};

fn capture(builder: HardwareBuilder) -> (c_int, CpuData) {
    let mut data = CpuData::default();

    // SAFETY: `data` is a valid local.
    let status = unsafe { capture_into(&SnapshotSource::fake(builder), &raw mut data) };

    (status, data)
}

fn assert_untouched(data: &CpuData) {
    assert!(data.cpu_name.is_null());
    assert!(data.cores.is_null());
    assert!(data.l1size.is_null());
    assert!(data.l2size.is_null());
    assert!(data.frequency.is_null());
    assert_eq!(data.logical_core_count, 0);
    assert_eq!(data.physical_core_count, 0);
    assert_eq!(data.l3size, 0);
}

#[test]
fn null_output_is_rejected() {
    // SAFETY: Null is explicitly allowed.
    let status = unsafe {
        capture_into(
            &SnapshotSource::fake(HardwareBuilder::new()),
            ptr::null_mut(),
        )
    };

    assert_eq!(status, 201);
}

#[test]
fn amd_hybrid_record_round_trips_through_free() {
    let builder = HardwareBuilder::new()
        .vendor(AMD_VENDOR_STRING)
        .brand("Fake AMD Processor")
        .physical_core(2, CoreClass::Performance)
        .physical_core(1, CoreClass::Efficiency)
        .feature_leaves(FeatureLeaves {
            basic: RawRegisters::new(0, 0, 1 << 23, 1 << 25),
            structured: RawRegisters::default(),
            extended: Some(RawRegisters::new(0, 0, 1 << 6, 1 << 31)),
        })
        .cache(CacheDescriptor::new(2, CacheSize::Kibibytes(1024), vec![0, 1, 2]))
        .cache(CacheDescriptor::new(3, CacheSize::Mebibytes(32), vec![0, 1, 2]))
        .frequency_mhz(3600)
        .core_frequency_mhz(2, 2800);

    let (status, mut data) = capture(builder);

    assert_eq!(status, STATUS_SUCCESS);
    assert_eq!(data.logical_core_count, 3);
    assert_eq!(data.physical_core_count, 2);
    assert_eq!(data.l3size, 32 * 1024);

    // SAFETY: Filled by a successful capture.
    let name = unsafe { CStr::from_ptr(data.cpu_name) };
    assert_eq!(name.to_str().unwrap(), "Fake AMD Processor");

    // SAFETY: Filled by a successful capture, with the length reported alongside.
    let cores = unsafe { slice::from_raw_parts(data.cores, 2) };
    let (first, second) = (cores.first().unwrap(), cores.last().unwrap());
    assert_eq!(first.core_type, CoreType::Performance);
    assert_eq!(first.logical_count, 2);
    assert_eq!(second.core_type, CoreType::Efficiency);
    assert_eq!(second.logical_count, 1);

    // SAFETY: Filled by a successful capture, with the length reported alongside.
    let l2 = unsafe { slice::from_raw_parts(data.l2size, 3) };
    assert!(
        l2.iter()
            .all(|info| info.l2cache_size == 1024 && info.shared_with_core_number == 3)
    );

    // SAFETY: Filled by a successful capture, with the length reported alongside.
    let frequency = unsafe { slice::from_raw_parts(data.frequency, 3) };
    assert_eq!(frequency, &[3600, 3600, 2800]);

    // General bits decode for AMD too, Intel-only bits do not.
    assert_eq!(data.algorithms.sse, 1);
    assert_eq!(data.algorithms.popcnt, 0);
    assert_eq!(data.algorithms.sse4a, 1);
    assert_eq!(data.algorithms.three_dnow_plus, 1);
    assert_eq!(data.algorithms.xop, 0);

    // SAFETY: Filled by a successful capture and not modified since.
    unsafe { free_cpu_data(&raw mut data) };

    assert_untouched(&data);

    // Freeing again is a no-op on the reset record.
    // SAFETY: The record holds only null pointers.
    unsafe { free_cpu_data(&raw mut data) };
}

#[test]
fn platform_source_unavailable_is_202() {
    let (status, data) =
        capture(HardwareBuilder::new().failure(FakeFailure::PlatformSourceUnavailable));

    assert_eq!(status, 202);
    assert_untouched(&data);
}

#[test]
fn topology_query_failures_map_to_their_codes() {
    for (failure, expected) in [
        (TopologyQueryFailure::SizeProbe, 204),
        (TopologyQueryFailure::Query, 205),
        (TopologyQueryFailure::MalformedRecord, 206),
        (TopologyQueryFailure::CacheQuery, 207),
    ] {
        let (status, data) = capture(
            HardwareBuilder::from_core_counts(2, 2).failure(FakeFailure::TopologyQuery(failure)),
        );

        assert_eq!(status, expected, "{failure}");
        assert_untouched(&data);
    }
}

#[test]
fn logical_core_count_mismatch_is_206() {
    let (status, data) =
        capture(HardwareBuilder::from_core_counts(2, 1).reported_logical_core_count(3));

    assert_eq!(status, 206);
    assert_untouched(&data);
}

#[test]
fn unallocatable_core_arrays_are_208() {
    let (status, data) = capture(HardwareBuilder::new().reported_logical_core_count(usize::MAX));

    assert_eq!(status, 208);
    assert_untouched(&data);
}

#[test]
#[cfg_attr(miri, ignore)] // Miri cannot call platform APIs.
fn current_hardware_through_exported_entry_point() {
    let mut data = CpuData::default();

    // SAFETY: `data` is a valid local.
    let status = unsafe { cpu_snapshot::get_cpu_data(&raw mut data) };

    assert_eq!(status, STATUS_SUCCESS);
    assert!(data.logical_core_count >= 1);
    assert!(data.physical_core_count >= 1);
    assert!(data.physical_core_count <= data.logical_core_count);
    assert!(!data.cpu_name.is_null());

    // SAFETY: Filled by a successful capture and not modified since.
    unsafe { free_cpu_data(&raw mut data) };
}
