//! The aggregate snapshot and the aggregator that captures it from a platform.

#[cfg(any(test, feature = "test-util"))]
use std::borrow::Borrow;
use std::fmt;

use tracing::debug;

#[cfg(any(test, feature = "test-util"))]
use crate::fake::{FakePlatform, HardwareBuilder};
use crate::pal::{Platform, PlatformFacade};
use crate::{
    CacheLayout, Error, FeatureFlags, FeatureLeaves, L2Cache, PhysicalCore, Result,
    TopologyQueryFailure, build_physical_cores, classify_physical_cores, decode_features,
};

/// Allocates a per-logical-core array of default values, reporting failure as
/// [`Error::CoreArrays`].
pub(crate) fn zeroed_per_core<T: Default + Clone>(logical_core_count: usize) -> Result<Vec<T>> {
    let mut values = Vec::new();

    values
        .try_reserve_exact(logical_core_count)
        .map_err(|inner| Error::CoreArrays {
            logical_core_count,
            inner,
        })?;

    values.resize(logical_core_count, T::default());
    Ok(values)
}

/// A point-in-time record of the processor topology, cache hierarchy, clock frequencies and
/// instruction set extensions of a system.
///
/// All per-logical-core data is indexed by logical core index, in `0..logical_core_count()`.
///
/// # Example
///
/// ```
/// use cpu_snapshot::SnapshotSource;
///
/// let snapshot = SnapshotSource::current().capture()?;
///
/// println!(
///     "{} has {} logical cores in {} physical cores",
///     snapshot.brand(),
///     snapshot.logical_core_count(),
///     snapshot.physical_core_count()
/// );
/// # Ok::<(), cpu_snapshot::Error>(())
/// ```
#[derive(Clone, Eq, PartialEq)]
pub struct Snapshot {
    vendor: String,
    brand: String,
    logical_core_count: usize,
    physical_cores: Vec<PhysicalCore>,
    l1_kib: Vec<u32>,
    l2: Vec<L2Cache>,
    frequency_mhz: Vec<u32>,
    l3_kib: u32,
    features: FeatureFlags,
}

impl Snapshot {
    /// The 12-character vendor string, e.g. `GenuineIntel`. Empty on processors without the
    /// feature query instruction.
    #[must_use]
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// The processor brand string, e.g. `Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz`. Empty if the
    /// processor does not report one.
    #[must_use]
    pub fn brand(&self) -> &str {
        &self.brand
    }

    /// Number of logical cores the operating system reports as active.
    #[must_use]
    pub fn logical_core_count(&self) -> usize {
        self.logical_core_count
    }

    /// Number of distinct physical cores.
    #[must_use]
    pub fn physical_core_count(&self) -> usize {
        self.physical_cores.len()
    }

    /// The physical cores, in the order the platform first reported them.
    ///
    /// Every logical core belongs to exactly one of them.
    #[must_use]
    pub fn physical_cores(&self) -> &[PhysicalCore] {
        &self.physical_cores
    }

    /// L1 cache size of every logical core, in KiB. Zero where unknown.
    #[must_use]
    pub fn l1_kib(&self) -> &[u32] {
        &self.l1_kib
    }

    /// L2 cache size and sharing count of every logical core. Zero where unknown.
    #[must_use]
    pub fn l2(&self) -> &[L2Cache] {
        &self.l2
    }

    /// Size of the shared L3 cache in KiB. Zero if the system reports none.
    #[must_use]
    pub fn l3_kib(&self) -> u32 {
        self.l3_kib
    }

    /// Current clock frequency of every logical core, in MHz. Zero where unknown.
    #[must_use]
    pub fn frequency_mhz(&self) -> &[u32] {
        &self.frequency_mhz
    }

    /// The instruction set extensions the processor supports.
    #[must_use]
    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    pub(crate) fn into_parts(self) -> SnapshotParts {
        SnapshotParts {
            brand: self.brand,
            logical_core_count: self.logical_core_count,
            physical_cores: self.physical_cores,
            l1_kib: self.l1_kib,
            l2: self.l2,
            frequency_mhz: self.frequency_mhz,
            l3_kib: self.l3_kib,
            features: self.features,
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("vendor", &self.vendor)
            .field("brand", &self.brand)
            .field("logical_core_count", &self.logical_core_count)
            .field("physical_core_count", &self.physical_cores.len())
            .field("l3_kib", &self.l3_kib)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}

/// The owned contents of a [`Snapshot`], moved out for translation to the C surface.
#[derive(Debug)]
pub(crate) struct SnapshotParts {
    pub(crate) brand: String,
    pub(crate) logical_core_count: usize,
    pub(crate) physical_cores: Vec<PhysicalCore>,
    pub(crate) l1_kib: Vec<u32>,
    pub(crate) l2: Vec<L2Cache>,
    pub(crate) frequency_mhz: Vec<u32>,
    pub(crate) l3_kib: u32,
    pub(crate) features: FeatureFlags,
}

/// Where a [`Snapshot`] is captured from: the real hardware or (with the `test-util` feature)
/// fake hardware.
///
/// Code that wants to be testable against different hardware configurations should accept a
/// `SnapshotSource` instead of always calling [`SnapshotSource::current()`].
#[derive(Clone, Debug)]
pub struct SnapshotSource {
    platform: PlatformFacade,
}

impl SnapshotSource {
    /// The hardware the current process is running on.
    #[must_use]
    pub fn current() -> Self {
        Self::from_platform(PlatformFacade::target())
    }

    /// Fake hardware, as described by the builder.
    ///
    /// Only available when the `test-util` feature is enabled.
    ///
    /// # Example
    ///
    /// ```
    /// # #[cfg(feature = "test-util")]
    /// # {
    /// use cpu_snapshot::SnapshotSource;
    /// use cpu_snapshot::fake::HardwareBuilder;
    ///
    /// let source = SnapshotSource::fake(HardwareBuilder::from_core_counts(2, 2));
    /// let snapshot = source.capture()?;
    ///
    /// assert_eq!(snapshot.logical_core_count(), 4);
    /// assert_eq!(snapshot.physical_core_count(), 2);
    /// # }
    /// # Ok::<(), cpu_snapshot::Error>(())
    /// ```
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn fake(builder: impl Borrow<HardwareBuilder>) -> Self {
        let backend = FakePlatform::from_builder(builder.borrow());
        Self::from_platform(PlatformFacade::from_fake(backend))
    }

    pub(crate) fn from_platform(platform: PlatformFacade) -> Self {
        Self { platform }
    }

    /// Captures a snapshot.
    ///
    /// Every call queries the platform anew. Calls are independent of each other and may be
    /// made from any thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform information source cannot be read, a topology query
    /// fails or any allocation fails. Nothing captured before the failure is returned.
    pub fn capture(&self) -> Result<Snapshot> {
        let platform = &self.platform;

        let logical_core_count = platform.logical_core_count()?;
        debug!(logical_core_count, "resolved logical core count");

        let mut caches = CacheLayout::zeroed(logical_core_count)?;
        let mut frequency_mhz: Vec<u32> = zeroed_per_core(logical_core_count)?;

        let descriptors = platform.cache_descriptors(logical_core_count)?;
        debug!(count = descriptors.len(), "mapping cache descriptors");
        caches.apply(&descriptors);

        for (index, frequency) in (0..=u32::MAX).zip(frequency_mhz.iter_mut()) {
            *frequency = platform.frequency_mhz(index);
        }

        let vendor = platform.vendor_string();
        let brand = platform.brand_string();
        let leaves = FeatureLeaves::query(&vendor, |leaf, subleaf| {
            platform.feature_query(leaf, subleaf)
        });
        let features = decode_features(&vendor, &leaves);
        debug!(%vendor, %brand, ?features, "decoded processor identification");

        let keys = platform.grouping_keys(logical_core_count)?;

        if keys.len() != logical_core_count {
            return Err(Error::topology_query(
                TopologyQueryFailure::MalformedRecord,
                format!(
                    "platform reported {} grouping keys for {logical_core_count} logical cores",
                    keys.len()
                ),
            ));
        }

        let mut physical_cores = build_physical_cores(&keys)?;
        classify_physical_cores(
            &mut physical_cores,
            &platform.core_classes(logical_core_count),
        );
        debug!(
            physical_core_count = physical_cores.len(),
            "reconstructed physical cores"
        );

        let (l1_kib, l2, l3_kib) = caches.into_parts();

        Ok(Snapshot {
            vendor,
            brand,
            logical_core_count,
            physical_cores,
            l1_kib,
            l2,
            frequency_mhz,
            l3_kib,
            features,
        })
    }
}

/// Captures a snapshot of the hardware the current process is running on.
///
/// Shorthand for `SnapshotSource::current().capture()`.
///
/// # Errors
///
/// See [`SnapshotSource::capture()`].
pub fn build_snapshot() -> Result<Snapshot> {
    SnapshotSource::current().capture()
}

#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "we need not worry in tests"
)]
#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockall::predicate::eq;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::pal::MockPlatform;
    use crate::{
        CacheDescriptor, CacheSize, CoreClass, ErrorKind, Feature, GroupingKey,
        INTEL_VENDOR_STRING, RawRegisters,
    };

    assert_impl_all!(Snapshot: Send, Sync, Debug, Clone);
    assert_impl_all!(SnapshotSource: Send, Sync, Debug, Clone);

    fn key(core_id: u32) -> GroupingKey {
        GroupingKey::PackageCore {
            package_id: 0,
            core_id,
        }
    }

    /// A platform with 4 logical cores in 2 SMT-2 physical cores, an Intel vendor string,
    /// SSE2 + AVX2 and one cache of each level.
    fn typical_platform() -> MockPlatform {
        let mut platform = MockPlatform::new();

        platform.expect_logical_core_count().returning(|| Ok(4));
        platform
            .expect_vendor_string()
            .returning(|| INTEL_VENDOR_STRING.to_string());
        platform
            .expect_brand_string()
            .returning(|| "Test CPU @ 3.00GHz".to_string());
        platform
            .expect_feature_query()
            .returning(|leaf, _| match leaf {
                0 => RawRegisters::new(7, 0, 0, 0),
                1 => RawRegisters::new(0, 0, 0, 1 << 26),
                7 => RawRegisters::new(0, 1 << 5, 0, 0),
                _ => RawRegisters::default(),
            });
        platform
            .expect_cache_descriptors()
            .with(eq(4))
            .returning(|_| {
                Ok(vec![
                    CacheDescriptor::new(1, CacheSize::Kibibytes(32), vec![0, 1]),
                    CacheDescriptor::new(1, CacheSize::Kibibytes(32), vec![2, 3]),
                    CacheDescriptor::new(2, CacheSize::Kibibytes(256), vec![0, 1]),
                    CacheDescriptor::new(2, CacheSize::Kibibytes(256), vec![2, 3]),
                    CacheDescriptor::new(3, CacheSize::Mebibytes(8), vec![0, 1, 2, 3]),
                ])
            });
        platform
            .expect_frequency_mhz()
            .returning(|index| 3000 + index);
        platform
            .expect_grouping_keys()
            .with(eq(4))
            .returning(|_| Ok(vec![key(0), key(0), key(1), key(1)]));
        platform
            .expect_core_classes()
            .returning(|count| vec![CoreClass::Unknown; count]);

        platform
    }

    fn capture(platform: MockPlatform) -> Result<Snapshot> {
        SnapshotSource::from_platform(PlatformFacade::from_mock(platform)).capture()
    }

    #[test]
    fn typical_snapshot() {
        let snapshot = capture(typical_platform()).unwrap();

        assert_eq!(snapshot.vendor(), INTEL_VENDOR_STRING);
        assert_eq!(snapshot.brand(), "Test CPU @ 3.00GHz");
        assert_eq!(snapshot.logical_core_count(), 4);
        assert_eq!(snapshot.physical_core_count(), 2);
        assert_eq!(snapshot.physical_cores()[0].logical_core_indices(), &[0, 1]);
        assert_eq!(snapshot.physical_cores()[1].logical_core_indices(), &[2, 3]);
        assert_eq!(snapshot.l1_kib(), &[32; 4]);
        assert_eq!(
            snapshot.l2(),
            &[L2Cache {
                size_kib: 256,
                shared_with_core_number: 2
            }; 4]
        );
        assert_eq!(snapshot.l3_kib(), 8192);
        assert_eq!(snapshot.frequency_mhz(), &[3000, 3001, 3002, 3003]);

        let features = snapshot.features();
        assert!(features.contains(Feature::Sse2));
        assert!(features.contains(Feature::Avx2));
        assert_eq!(features.iter().count(), 2);
    }

    #[test]
    fn classification_is_applied() {
        let mut platform = MockPlatform::new();
        platform.expect_logical_core_count().returning(|| Ok(3));
        platform.expect_vendor_string().returning(String::new);
        platform.expect_brand_string().returning(String::new);
        platform
            .expect_feature_query()
            .returning(|_, _| RawRegisters::default());
        platform
            .expect_cache_descriptors()
            .returning(|_| Ok(Vec::new()));
        platform.expect_frequency_mhz().returning(|_| 0);
        platform
            .expect_grouping_keys()
            .returning(|_| Ok(vec![key(0), key(0), key(1)]));
        platform.expect_core_classes().returning(|_| {
            vec![
                CoreClass::Performance,
                CoreClass::Performance,
                CoreClass::Efficiency,
            ]
        });

        let snapshot = capture(platform).unwrap();

        assert_eq!(
            snapshot.physical_cores()[0].class(),
            CoreClass::Performance
        );
        assert_eq!(snapshot.physical_cores()[1].class(), CoreClass::Efficiency);
        assert!(snapshot.features().is_empty());
    }

    #[test]
    fn logical_core_count_failure_short_circuits() {
        let mut platform = MockPlatform::new();
        platform.expect_logical_core_count().returning(|| {
            Err(Error::PlatformSourceUnavailable {
                problem: "gone".to_string(),
            })
        });
        platform.expect_cache_descriptors().never();
        platform.expect_grouping_keys().never();
        platform.expect_feature_query().never();

        let error = capture(platform).unwrap_err();

        assert_eq!(error.status_code(), 202);
    }

    #[test]
    fn core_array_failure_is_208() {
        let mut platform = MockPlatform::new();
        platform
            .expect_logical_core_count()
            .returning(|| Ok(usize::MAX));
        platform.expect_cache_descriptors().never();
        platform.expect_grouping_keys().never();

        let error = capture(platform).unwrap_err();

        assert_eq!(error.status_code(), 208);
        assert_eq!(error.kind(), ErrorKind::AllocationFailure);
    }

    #[test]
    fn topology_failure_discards_everything_else() {
        let mut platform = MockPlatform::new();
        platform.expect_logical_core_count().returning(|| Ok(2));
        platform.expect_vendor_string().returning(String::new);
        platform.expect_brand_string().returning(String::new);
        platform
            .expect_feature_query()
            .returning(|_, _| RawRegisters::default());
        platform
            .expect_cache_descriptors()
            .returning(|_| Ok(Vec::new()));
        platform.expect_frequency_mhz().returning(|_| 0);
        platform.expect_grouping_keys().returning(|_| {
            Err(Error::topology_query(
                TopologyQueryFailure::Query,
                "simulated",
            ))
        });
        platform.expect_core_classes().never();

        let error = capture(platform).unwrap_err();

        assert_eq!(error.status_code(), 205);
    }

    #[test]
    fn cache_failure_stops_before_topology() {
        let mut platform = MockPlatform::new();
        platform.expect_logical_core_count().returning(|| Ok(2));
        platform.expect_cache_descriptors().returning(|_| {
            Err(Error::topology_query(
                TopologyQueryFailure::CacheQuery,
                "simulated",
            ))
        });
        platform.expect_grouping_keys().never();

        let error = capture(platform).unwrap_err();

        assert_eq!(error.status_code(), 207);
    }

    #[test]
    fn key_count_mismatch_is_malformed() {
        let mut platform = MockPlatform::new();
        platform.expect_logical_core_count().returning(|| Ok(3));
        platform.expect_vendor_string().returning(String::new);
        platform.expect_brand_string().returning(String::new);
        platform
            .expect_feature_query()
            .returning(|_, _| RawRegisters::default());
        platform
            .expect_cache_descriptors()
            .returning(|_| Ok(Vec::new()));
        platform.expect_frequency_mhz().returning(|_| 0);
        platform
            .expect_grouping_keys()
            .returning(|_| Ok(vec![key(0)]));

        let error = capture(platform).unwrap_err();

        assert_eq!(error.status_code(), 206);
    }

    #[test]
    fn frequency_queried_once_per_logical_core() {
        let calls = Arc::new(AtomicUsize::new(0));

        let mut platform = MockPlatform::new();
        platform.expect_logical_core_count().returning(|| Ok(5));
        platform.expect_vendor_string().returning(String::new);
        platform.expect_brand_string().returning(String::new);
        platform
            .expect_feature_query()
            .returning(|_, _| RawRegisters::default());
        platform
            .expect_cache_descriptors()
            .returning(|_| Ok(Vec::new()));
        platform.expect_frequency_mhz().returning({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
                1000
            }
        });
        platform
            .expect_grouping_keys()
            .returning(|count| Ok((0..count as u32).map(key).collect()));
        platform
            .expect_core_classes()
            .returning(|_| Vec::new());

        let snapshot = capture(platform).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 5);
        assert_eq!(snapshot.frequency_mhz(), &[1000; 5]);
        assert_eq!(snapshot.physical_core_count(), 5);
    }

    #[test]
    fn independent_captures_are_equal() {
        let first = capture(typical_platform()).unwrap();
        let second = capture(typical_platform()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn zeroed_per_core_is_zeroed() {
        let values: Vec<u32> = zeroed_per_core(3).unwrap();

        assert_eq!(values, vec![0, 0, 0]);
    }

    #[test]
    fn current_hardware_is_self_consistent() {
        let snapshot = build_snapshot().unwrap();

        assert!(snapshot.logical_core_count() >= 1);
        assert_eq!(snapshot.l1_kib().len(), snapshot.logical_core_count());
        assert_eq!(snapshot.l2().len(), snapshot.logical_core_count());
        assert_eq!(
            snapshot.frequency_mhz().len(),
            snapshot.logical_core_count()
        );

        let mut all = snapshot
            .physical_cores()
            .iter()
            .flat_map(|core| core.logical_core_indices().iter().copied())
            .collect::<Vec<_>>();
        all.sort_unstable();

        let expected = (0..snapshot.logical_core_count() as u32).collect::<Vec<_>>();
        assert_eq!(all, expected);
    }
}
