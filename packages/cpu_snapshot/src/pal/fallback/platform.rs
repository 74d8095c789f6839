use std::num::NonZeroUsize;
use std::sync::OnceLock;
use std::thread;

use crate::pal::{Platform, cpuid};
use crate::{
    CacheDescriptor, CoreClass, Error, GroupingKey, LogicalCoreIndex, RawRegisters, Result,
    query_brand_string, query_vendor_string,
};

/// Fallback platform implementation for operating systems without native support.
///
/// The logical core count comes from `std::thread::available_parallelism()`. Nothing is known
/// about the topology, so every logical core is reported as a physical core of its own, without
/// any cache or frequency data. The processor identification still comes from the feature query
/// instruction where the processor has one.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform;

static LOGICAL_CORE_COUNT: OnceLock<usize> = OnceLock::new();

/// Singleton instance of `BuildTargetPlatform`, used by public API types
/// to hook up to the correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

impl Platform for BuildTargetPlatform {
    fn feature_query(&self, leaf: u32, subleaf: u32) -> RawRegisters {
        cpuid(leaf, subleaf)
    }

    fn vendor_string(&self) -> String {
        query_vendor_string(cpuid)
    }

    fn brand_string(&self) -> String {
        query_brand_string(cpuid)
    }

    #[cfg_attr(test, mutants::skip)] // Some mutations are not testable due to simulated nature of this PAL.
    fn logical_core_count(&self) -> Result<usize> {
        Ok(*LOGICAL_CORE_COUNT.get_or_init(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        }))
    }

    fn grouping_keys(&self, logical_core_count: usize) -> Result<Vec<GroupingKey>> {
        let mut keys = Vec::new();
        keys.try_reserve_exact(logical_core_count)
            .map_err(|e| Error::allocation("allocating topology grouping keys", e))?;

        keys.extend(
            (0..=LogicalCoreIndex::MAX)
                .take(logical_core_count)
                .map(|index| GroupingKey::Record { index }),
        );

        Ok(keys)
    }

    #[cfg_attr(test, mutants::skip)] // Some mutations are not testable due to simulated nature of this PAL.
    fn core_classes(&self, _logical_core_count: usize) -> Vec<CoreClass> {
        Vec::new()
    }

    #[cfg_attr(test, mutants::skip)] // Some mutations are not testable due to simulated nature of this PAL.
    fn cache_descriptors(&self, _logical_core_count: usize) -> Result<Vec<CacheDescriptor>> {
        Ok(Vec::new())
    }

    #[cfg_attr(test, mutants::skip)] // Some mutations are not testable due to simulated nature of this PAL.
    fn frequency_mhz(&self, _logical_core_index: LogicalCoreIndex) -> u32 {
        0
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::SnapshotSource;
    use crate::pal::PlatformFacade;

    #[test]
    fn one_physical_core_per_logical_core() {
        let source =
            SnapshotSource::from_platform(PlatformFacade::Fallback(&BUILD_TARGET_PLATFORM));

        let snapshot = source.capture().unwrap();

        assert!(snapshot.logical_core_count() >= 1);
        assert_eq!(
            snapshot.physical_core_count(),
            snapshot.logical_core_count()
        );
        assert!(snapshot.l1_kib().iter().all(|&kib| kib == 0));
        assert_eq!(snapshot.l3_kib(), 0);
        assert!(snapshot.frequency_mhz().iter().all(|&mhz| mhz == 0));
    }

    #[test]
    fn grouping_keys_are_distinct() {
        let keys = BUILD_TARGET_PLATFORM.grouping_keys(3).unwrap();

        assert_eq!(
            keys,
            vec![
                GroupingKey::Record { index: 0 },
                GroupingKey::Record { index: 1 },
                GroupingKey::Record { index: 2 },
            ]
        );
    }
}
