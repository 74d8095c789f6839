use std::fmt::Debug;

use crate::{CacheDescriptor, CoreClass, GroupingKey, LogicalCoreIndex, RawRegisters, Result};

/// The raw queries the snapshot aggregator needs from the platform it runs on.
///
/// Implementations only gather raw data. Grouping, cache mapping and feature decoding happen
/// above this layer, so the same logic applies to every platform.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Executes the feature query instruction for the given leaf and subleaf.
    ///
    /// Returns all zeroes on processors without the instruction.
    fn feature_query(&self, leaf: u32, subleaf: u32) -> RawRegisters;

    /// The 12-character vendor string, empty if unavailable.
    fn vendor_string(&self) -> String;

    /// The brand string, up to 48 characters, empty if unavailable.
    fn brand_string(&self) -> String;

    /// Number of logical cores the operating system reports as active.
    fn logical_core_count(&self) -> Result<usize>;

    /// The grouping key of every logical core in `0..logical_core_count`, in index order.
    fn grouping_keys(&self, logical_core_count: usize) -> Result<Vec<GroupingKey>>;

    /// The classification of every logical core in `0..logical_core_count`, in index order.
    ///
    /// Platforms without heterogeneous-core data may return an empty list.
    fn core_classes(&self, logical_core_count: usize) -> Vec<CoreClass>;

    /// Every cache instance in the system, each with the logical cores that share it.
    fn cache_descriptors(&self, logical_core_count: usize) -> Result<Vec<CacheDescriptor>>;

    /// The current clock frequency of a logical core in MHz, zero if unknown.
    fn frequency_mhz(&self, logical_core_index: LogicalCoreIndex) -> u32;
}
