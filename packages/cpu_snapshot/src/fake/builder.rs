//! Builder for configuring fake hardware.

use std::iter;

use foldhash::{HashMap, HashMapExt};

use crate::features::{
    BASIC_FEATURES_LEAF, EXTENDED_FEATURES_LEAF, EXTENDED_MAX_LEAF, STRUCTURED_FEATURES_LEAF,
    VENDOR_LEAF,
};
use crate::{
    CacheDescriptor, CoreClass, FeatureLeaves, GroupingKey, LogicalCoreIndex, RawRegisters,
    TopologyQueryFailure,
};

/// A platform failure that fake hardware reports instead of the configured data.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum FakeFailure {
    /// The platform information source cannot be opened, so not even the logical core count is
    /// available.
    PlatformSourceUnavailable,

    /// A topology query fails at the given stage. [`TopologyQueryFailure::CacheQuery`] fails
    /// the cache query, every other stage fails the physical core query.
    TopologyQuery(TopologyQueryFailure),
}

/// One logical core of the fake hardware, ready to be used by the backend.
#[derive(Clone, Debug)]
pub(crate) struct FakeLogicalCore {
    pub(crate) key: GroupingKey,
    pub(crate) class: CoreClass,
}

/// Builder for configuring fake hardware.
///
/// A new builder describes a single logical core in a single physical core, with empty
/// identification strings, no instruction set extensions, no caches and unknown frequencies.
/// Each setter replaces or extends one part of that description.
///
/// # Physical cores
///
/// Physical cores are added with [`physical_core()`][Self::physical_core], each hosting a
/// contiguous range of logical core indices. For layouts that cannot be expressed that way,
/// such as sibling threads numbered in the second half of the index range, provide the
/// per-logical-core grouping keys directly via [`grouping_keys()`][Self::grouping_keys].
///
/// # Example
///
/// ```
/// use cpu_snapshot::fake::HardwareBuilder;
/// use cpu_snapshot::{
///     CacheDescriptor, CacheSize, CoreClass, Feature, FeatureLeaves, INTEL_VENDOR_STRING,
///     RawRegisters, SnapshotSource,
/// };
///
/// let source = SnapshotSource::fake(
///     HardwareBuilder::new()
///         .vendor(INTEL_VENDOR_STRING)
///         .brand("Fake CPU @ 2.00GHz")
///         .physical_core(2, CoreClass::Performance)
///         .physical_core(1, CoreClass::Efficiency)
///         .feature_leaves(FeatureLeaves {
///             basic: RawRegisters::new(0, 0, 0, 1 << 26),
///             structured: RawRegisters::default(),
///             extended: None,
///         })
///         .cache(CacheDescriptor::new(3, CacheSize::Mebibytes(12), vec![0, 1, 2]))
///         .frequency_mhz(2000),
/// );
///
/// let snapshot = source.capture()?;
///
/// assert_eq!(snapshot.brand(), "Fake CPU @ 2.00GHz");
/// assert_eq!(snapshot.physical_core_count(), 2);
/// assert!(snapshot.features().contains(Feature::Sse2));
/// assert_eq!(snapshot.l3_kib(), 12 * 1024);
/// assert_eq!(snapshot.frequency_mhz(), &[2000; 3]);
/// # Ok::<(), cpu_snapshot::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct HardwareBuilder {
    pub(crate) vendor: String,
    pub(crate) brand: String,
    pub(crate) feature_registers: HashMap<(u32, u32), RawRegisters>,
    pub(crate) logical_cores: Vec<FakeLogicalCore>,
    pub(crate) caches: Vec<CacheDescriptor>,
    pub(crate) frequency_mhz: u32,
    pub(crate) core_frequencies_mhz: HashMap<LogicalCoreIndex, u32>,
    pub(crate) reported_logical_core_count: Option<usize>,
    pub(crate) failure: Option<FakeFailure>,

    physical_core_count: u32,
}

impl Default for HardwareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareBuilder {
    /// Creates a builder for the default single-core fake hardware.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vendor: String::new(),
            brand: String::new(),
            feature_registers: HashMap::new(),
            logical_cores: Vec::new(),
            caches: Vec::new(),
            frequency_mhz: 0,
            core_frequencies_mhz: HashMap::new(),
            reported_logical_core_count: None,
            failure: None,
            physical_core_count: 0,
        }
    }

    /// Creates a builder with the given number of physical cores, each hosting
    /// `threads_per_core` logical cores with consecutive indices.
    ///
    /// # Panics
    ///
    /// Panics if either count is zero.
    #[must_use]
    pub fn from_core_counts(physical_core_count: usize, threads_per_core: usize) -> Self {
        assert!(
            physical_core_count > 0,
            "fake hardware must have at least one physical core"
        );

        (0..physical_core_count).fold(Self::new(), |builder, _| {
            builder.physical_core(threads_per_core, CoreClass::Unknown)
        })
    }

    /// Adds a physical core hosting `thread_count` logical cores, which take the next free
    /// logical core indices.
    ///
    /// # Panics
    ///
    /// Panics if `thread_count` is zero or if the cores were configured via
    /// [`grouping_keys()`][Self::grouping_keys].
    #[must_use]
    pub fn physical_core(mut self, thread_count: usize, class: CoreClass) -> Self {
        assert!(thread_count > 0, "a physical core must host at least one logical core");
        assert!(
            self.logical_cores.is_empty() || self.physical_core_count > 0,
            "cannot add physical cores to a builder configured with grouping_keys()"
        );

        let key = GroupingKey::PackageCore {
            package_id: 0,
            core_id: self.physical_core_count,
        };

        self.logical_cores
            .extend(iter::repeat_n(FakeLogicalCore { key, class }, thread_count));
        self.physical_core_count = self.physical_core_count.saturating_add(1);
        self
    }

    /// Sets the grouping key of every logical core, replacing any configured physical cores.
    ///
    /// `keys[i]` becomes the grouping key of logical core `i`. All cores are unclassified.
    #[must_use]
    pub fn grouping_keys(mut self, keys: impl IntoIterator<Item = GroupingKey>) -> Self {
        self.logical_cores = keys
            .into_iter()
            .map(|key| FakeLogicalCore {
                key,
                class: CoreClass::Unknown,
            })
            .collect();
        self.physical_core_count = 0;
        self
    }

    /// Sets the vendor string, e.g. [`INTEL_VENDOR_STRING`][crate::INTEL_VENDOR_STRING].
    #[must_use]
    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    /// Sets the brand string.
    #[must_use]
    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    /// Sets the result of one raw feature query. Unset queries return all zeroes.
    #[must_use]
    pub fn feature_query_result(
        mut self,
        leaf: u32,
        subleaf: u32,
        registers: RawRegisters,
    ) -> Self {
        self.feature_registers.insert((leaf, subleaf), registers);
        self
    }

    /// Sets the raw query results so that feature decoding sees exactly the given leaves.
    ///
    /// This also reports the leaves as supported, which takes care of the highest-leaf queries.
    #[must_use]
    pub fn feature_leaves(self, leaves: FeatureLeaves) -> Self {
        let builder = self
            .feature_query_result(
                VENDOR_LEAF,
                0,
                RawRegisters::new(STRUCTURED_FEATURES_LEAF, 0, 0, 0),
            )
            .feature_query_result(BASIC_FEATURES_LEAF, 0, leaves.basic)
            .feature_query_result(STRUCTURED_FEATURES_LEAF, 0, leaves.structured);

        match leaves.extended {
            Some(extended) => builder
                .feature_query_result(
                    EXTENDED_MAX_LEAF,
                    0,
                    RawRegisters::new(EXTENDED_FEATURES_LEAF, 0, 0, 0),
                )
                .feature_query_result(EXTENDED_FEATURES_LEAF, 0, extended),
            None => builder,
        }
    }

    /// Adds a cache instance.
    #[must_use]
    pub fn cache(mut self, descriptor: CacheDescriptor) -> Self {
        self.caches.push(descriptor);
        self
    }

    /// Sets the frequency of every logical core without an individual frequency.
    #[must_use]
    pub fn frequency_mhz(mut self, mhz: u32) -> Self {
        self.frequency_mhz = mhz;
        self
    }

    /// Sets the frequency of one logical core.
    #[must_use]
    pub fn core_frequency_mhz(mut self, logical_core_index: LogicalCoreIndex, mhz: u32) -> Self {
        self.core_frequencies_mhz.insert(logical_core_index, mhz);
        self
    }

    /// Overrides the logical core count the platform reports, independently of the configured
    /// cores.
    ///
    /// A count that does not match the configured cores makes the capture fail as malformed
    /// topology data. A count too large to allocate arrays for makes it fail with an allocation
    /// failure.
    #[must_use]
    pub fn reported_logical_core_count(mut self, count: usize) -> Self {
        self.reported_logical_core_count = Some(count);
        self
    }

    /// Makes the platform report the given failure.
    #[must_use]
    pub fn failure(mut self, failure: FakeFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// The configured logical cores, or a single logical core if none were configured.
    pub(crate) fn build_logical_cores(&self) -> Vec<FakeLogicalCore> {
        if self.logical_cores.is_empty() {
            return vec![FakeLogicalCore {
                key: GroupingKey::PackageCore {
                    package_id: 0,
                    core_id: 0,
                },
                class: CoreClass::Unknown,
            }];
        }

        self.logical_cores.clone()
    }
}
