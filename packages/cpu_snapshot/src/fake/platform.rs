//! Fake hardware backend implementation.

use foldhash::HashMap;

use crate::fake::{FakeFailure, HardwareBuilder};
use crate::pal::Platform;
use crate::{
    CacheDescriptor, CoreClass, Error, GroupingKey, LogicalCoreIndex, RawRegisters, Result,
    TopologyQueryFailure,
};

/// Fake hardware platform that reports a builder-defined configuration.
#[derive(Debug)]
pub(crate) struct FakePlatform {
    vendor: String,
    brand: String,
    feature_registers: HashMap<(u32, u32), RawRegisters>,
    keys: Vec<GroupingKey>,
    classes: Vec<CoreClass>,
    caches: Vec<CacheDescriptor>,
    frequency_mhz: u32,
    core_frequencies_mhz: HashMap<LogicalCoreIndex, u32>,
    reported_logical_core_count: Option<usize>,
    failure: Option<FakeFailure>,
}

impl FakePlatform {
    /// Creates a new fake hardware backend from a builder.
    pub(crate) fn from_builder(builder: &HardwareBuilder) -> Self {
        let (keys, classes) = builder
            .build_logical_cores()
            .into_iter()
            .map(|core| (core.key, core.class))
            .unzip();

        Self {
            vendor: builder.vendor.clone(),
            brand: builder.brand.clone(),
            feature_registers: builder.feature_registers.clone(),
            keys,
            classes,
            caches: builder.caches.clone(),
            frequency_mhz: builder.frequency_mhz,
            core_frequencies_mhz: builder.core_frequencies_mhz.clone(),
            reported_logical_core_count: builder.reported_logical_core_count,
            failure: builder.failure,
        }
    }

    fn simulated_error(&self, fails_at: impl Fn(TopologyQueryFailure) -> bool) -> Option<Error> {
        match self.failure {
            Some(FakeFailure::TopologyQuery(failure)) if fails_at(failure) => Some(
                Error::topology_query(failure, "simulated failure of fake hardware"),
            ),
            _ => None,
        }
    }
}

impl Platform for FakePlatform {
    fn feature_query(&self, leaf: u32, subleaf: u32) -> RawRegisters {
        self.feature_registers
            .get(&(leaf, subleaf))
            .copied()
            .unwrap_or_default()
    }

    fn vendor_string(&self) -> String {
        self.vendor.clone()
    }

    fn brand_string(&self) -> String {
        self.brand.clone()
    }

    fn logical_core_count(&self) -> Result<usize> {
        if self.failure == Some(FakeFailure::PlatformSourceUnavailable) {
            return Err(Error::PlatformSourceUnavailable {
                problem: "simulated failure of fake hardware".to_string(),
            });
        }

        Ok(self.reported_logical_core_count.unwrap_or(self.keys.len()))
    }

    fn grouping_keys(&self, _logical_core_count: usize) -> Result<Vec<GroupingKey>> {
        if let Some(error) =
            self.simulated_error(|failure| failure != TopologyQueryFailure::CacheQuery)
        {
            return Err(error);
        }

        Ok(self.keys.clone())
    }

    fn core_classes(&self, _logical_core_count: usize) -> Vec<CoreClass> {
        self.classes.clone()
    }

    fn cache_descriptors(&self, _logical_core_count: usize) -> Result<Vec<CacheDescriptor>> {
        if let Some(error) =
            self.simulated_error(|failure| failure == TopologyQueryFailure::CacheQuery)
        {
            return Err(error);
        }

        Ok(self.caches.clone())
    }

    fn frequency_mhz(&self, logical_core_index: LogicalCoreIndex) -> u32 {
        self.core_frequencies_mhz
            .get(&logical_core_index)
            .copied()
            .unwrap_or(self.frequency_mhz)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{CacheSize, FeatureLeaves};

    #[test]
    fn reports_builder_configuration() {
        let platform = FakePlatform::from_builder(
            &HardwareBuilder::new()
                .vendor("FakeVendor00")
                .brand("Fake")
                .physical_core(2, CoreClass::Performance)
                .physical_core(1, CoreClass::Efficiency)
                .cache(CacheDescriptor::new(2, CacheSize::Kibibytes(512), vec![0, 1]))
                .frequency_mhz(1500)
                .core_frequency_mhz(2, 900),
        );

        assert_eq!(platform.vendor_string(), "FakeVendor00");
        assert_eq!(platform.brand_string(), "Fake");
        assert_eq!(platform.logical_core_count().unwrap(), 3);
        assert_eq!(
            platform.core_classes(3),
            vec![
                CoreClass::Performance,
                CoreClass::Performance,
                CoreClass::Efficiency
            ]
        );
        assert_eq!(platform.cache_descriptors(3).unwrap().len(), 1);
        assert_eq!(platform.frequency_mhz(0), 1500);
        assert_eq!(platform.frequency_mhz(2), 900);
    }

    #[test]
    fn unset_feature_queries_are_zero() {
        let platform = FakePlatform::from_builder(&HardwareBuilder::new().feature_leaves(
            FeatureLeaves {
                basic: RawRegisters::new(0, 0, 1, 0),
                structured: RawRegisters::default(),
                extended: None,
            },
        ));

        assert_eq!(platform.feature_query(1, 0), RawRegisters::new(0, 0, 1, 0));
        assert_eq!(platform.feature_query(1, 1), RawRegisters::default());
        assert_eq!(platform.feature_query(0x8000_0000, 0), RawRegisters::default());
    }

    #[test]
    fn cache_failure_only_fails_cache_query() {
        let platform = FakePlatform::from_builder(
            &HardwareBuilder::new()
                .failure(FakeFailure::TopologyQuery(TopologyQueryFailure::CacheQuery)),
        );

        assert_eq!(
            platform.cache_descriptors(1).unwrap_err().status_code(),
            207
        );
        assert!(platform.grouping_keys(1).is_ok());
    }

    #[test]
    fn topology_failure_only_fails_core_query() {
        let platform = FakePlatform::from_builder(
            &HardwareBuilder::new()
                .failure(FakeFailure::TopologyQuery(TopologyQueryFailure::SizeProbe)),
        );

        assert_eq!(platform.grouping_keys(1).unwrap_err().status_code(), 204);
        assert!(platform.cache_descriptors(1).is_ok());
    }

    #[test]
    fn source_failure_fails_count() {
        let platform = FakePlatform::from_builder(
            &HardwareBuilder::new().failure(FakeFailure::PlatformSourceUnavailable),
        );

        assert_eq!(
            platform.logical_core_count().unwrap_err().status_code(),
            202
        );
    }
}
