use std::fmt::Debug;
#[cfg(any(test, feature = "test-util"))]
use std::sync::Arc;

#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakePlatform;
#[cfg(test)]
use crate::pal::MockPlatform;
#[cfg(test)]
use crate::pal::fallback::BuildTargetPlatform as FallbackPlatform;
use crate::pal::{BUILD_TARGET_PLATFORM, BuildTargetPlatform, Platform};
use crate::{CacheDescriptor, CoreClass, GroupingKey, LogicalCoreIndex, RawRegisters, Result};

/// Hides the different platform implementations behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum PlatformFacade {
    Target(&'static BuildTargetPlatform),

    #[cfg(test)]
    Fallback(&'static FallbackPlatform),

    #[cfg(any(test, feature = "test-util"))]
    Fake(Arc<FakePlatform>),

    #[cfg(test)]
    Mock(Arc<MockPlatform>),
}

impl PlatformFacade {
    pub(crate) fn target() -> Self {
        Self::Target(&BUILD_TARGET_PLATFORM)
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn from_fake(fake: FakePlatform) -> Self {
        Self::Fake(Arc::new(fake))
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockPlatform) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Platform for PlatformFacade {
    fn feature_query(&self, leaf: u32, subleaf: u32) -> RawRegisters {
        match self {
            Self::Target(p) => p.feature_query(leaf, subleaf),
            #[cfg(test)]
            Self::Fallback(p) => p.feature_query(leaf, subleaf),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.feature_query(leaf, subleaf),
            #[cfg(test)]
            Self::Mock(p) => p.feature_query(leaf, subleaf),
        }
    }

    fn vendor_string(&self) -> String {
        match self {
            Self::Target(p) => p.vendor_string(),
            #[cfg(test)]
            Self::Fallback(p) => p.vendor_string(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.vendor_string(),
            #[cfg(test)]
            Self::Mock(p) => p.vendor_string(),
        }
    }

    fn brand_string(&self) -> String {
        match self {
            Self::Target(p) => p.brand_string(),
            #[cfg(test)]
            Self::Fallback(p) => p.brand_string(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.brand_string(),
            #[cfg(test)]
            Self::Mock(p) => p.brand_string(),
        }
    }

    fn logical_core_count(&self) -> Result<usize> {
        match self {
            Self::Target(p) => p.logical_core_count(),
            #[cfg(test)]
            Self::Fallback(p) => p.logical_core_count(),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.logical_core_count(),
            #[cfg(test)]
            Self::Mock(p) => p.logical_core_count(),
        }
    }

    fn grouping_keys(&self, logical_core_count: usize) -> Result<Vec<GroupingKey>> {
        match self {
            Self::Target(p) => p.grouping_keys(logical_core_count),
            #[cfg(test)]
            Self::Fallback(p) => p.grouping_keys(logical_core_count),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.grouping_keys(logical_core_count),
            #[cfg(test)]
            Self::Mock(p) => p.grouping_keys(logical_core_count),
        }
    }

    fn core_classes(&self, logical_core_count: usize) -> Vec<CoreClass> {
        match self {
            Self::Target(p) => p.core_classes(logical_core_count),
            #[cfg(test)]
            Self::Fallback(p) => p.core_classes(logical_core_count),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.core_classes(logical_core_count),
            #[cfg(test)]
            Self::Mock(p) => p.core_classes(logical_core_count),
        }
    }

    fn cache_descriptors(&self, logical_core_count: usize) -> Result<Vec<CacheDescriptor>> {
        match self {
            Self::Target(p) => p.cache_descriptors(logical_core_count),
            #[cfg(test)]
            Self::Fallback(p) => p.cache_descriptors(logical_core_count),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.cache_descriptors(logical_core_count),
            #[cfg(test)]
            Self::Mock(p) => p.cache_descriptors(logical_core_count),
        }
    }

    fn frequency_mhz(&self, logical_core_index: LogicalCoreIndex) -> u32 {
        match self {
            Self::Target(p) => p.frequency_mhz(logical_core_index),
            #[cfg(test)]
            Self::Fallback(p) => p.frequency_mhz(logical_core_index),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(p) => p.frequency_mhz(logical_core_index),
            #[cfg(test)]
            Self::Mock(p) => p.frequency_mhz(logical_core_index),
        }
    }
}

#[cfg(test)]
impl From<MockPlatform> for PlatformFacade {
    fn from(p: MockPlatform) -> Self {
        Self::Mock(Arc::new(p))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for PlatformFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Fallback(inner) => inner.fmt(f),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
