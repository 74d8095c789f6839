use std::mem::offset_of;

use itertools::{Itertools, MinMaxResult};
use tracing::{trace, warn};
use windows::Win32::Foundation::ERROR_INSUFFICIENT_BUFFER;
use windows::Win32::System::SystemInformation::{
    CacheInstruction, GROUP_AFFINITY, LOGICAL_PROCESSOR_RELATIONSHIP, RelationCache,
    RelationProcessorCore, SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX,
};
use windows::core::HRESULT;

use crate::pal::windows::{Bindings, BindingsFacade};
use crate::pal::{Platform, cpuid};
use crate::snapshot::zeroed_per_core;
use crate::{
    CacheDescriptor, CacheSize, CoreClass, Error, GroupingKey, LogicalCoreIndex, RawRegisters,
    Result, TopologyQueryFailure, affinity_mask_indices, keys_from_records, query_brand_string,
    query_vendor_string,
};

/// Singleton instance of `BuildTargetPlatform`, used by public API types
/// to hook up to the correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform =
    BuildTargetPlatform::new(BindingsFacade::target());

/// The platform that matches the crate's build target.
///
/// You would only use a different platform in unit tests that need to mock the platform.
/// Even then, whenever possible, unit tests should use the real platform for maximum realism.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform {
    bindings: BindingsFacade,
}

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

    fn logical_core_count(&self) -> Result<usize> {
        let count = self
            .group_active_counts()
            .fold(0_usize, |total, count| total.saturating_add(count as usize));

        if count == 0 {
            return Err(Error::PlatformSourceUnavailable {
                problem: "the operating system reported zero active processors".to_string(),
            });
        }

        Ok(count)
    }

    fn grouping_keys(&self, logical_core_count: usize) -> Result<Vec<GroupingKey>> {
        let records = self.query_records(RelationProcessorCore)?;
        let group_offsets = self.group_start_offsets();

        // Each processor core record lists the logical processors of one physical core.
        let members = processor_core_masks(&records)
            .map(|(mask, _)| group_mask_members(mask, &group_offsets).collect_vec());

        keys_from_records(logical_core_count, members)
    }

    fn core_classes(&self, logical_core_count: usize) -> Vec<CoreClass> {
        let records = match self.query_records(RelationProcessorCore) {
            Ok(records) => records,
            Err(e) => {
                warn!(%e, "unable to query efficiency classes, reporting all cores as unknown");
                return Vec::new();
            }
        };

        // The numeric values are only meaningful relative to each other. If every core has the
        // same efficiency class, the system is not heterogeneous.
        let performance_class =
            match processor_core_masks(&records).map(|(_, class)| class).minmax() {
                MinMaxResult::MinMax(min, max) if min != max => max,
                _ => return Vec::new(),
            };

        let Ok(mut classes) = zeroed_per_core::<CoreClass>(logical_core_count) else {
            warn!(
                logical_core_count,
                "unable to allocate core classes, reporting all cores as unknown"
            );
            return Vec::new();
        };

        let group_offsets = self.group_start_offsets();

        for (mask, efficiency_class) in processor_core_masks(&records) {
            let class = if efficiency_class == performance_class {
                CoreClass::Performance
            } else {
                CoreClass::Efficiency
            };

            for index in group_mask_members(mask, &group_offsets) {
                if let Some(slot) = classes.get_mut(index as usize) {
                    *slot = class;
                }
            }
        }

        classes
    }

    fn cache_descriptors(&self, _logical_core_count: usize) -> Result<Vec<CacheDescriptor>> {
        let records = self
            .query_records(RelationCache)
            .map_err(as_cache_query_error)?;
        let group_offsets = self.group_start_offsets();

        let mut descriptors = Vec::new();
        descriptors
            .try_reserve_exact(records.len())
            .map_err(|e| Error::allocation("allocating cache descriptors", e))?;

        for record in records
            .iter()
            .filter(|record| record.Relationship == RelationCache)
        {
            // SAFETY: The relationship tells us which union member the record carries.
            let cache = unsafe { record.Anonymous.Cache };

            if cache.Type == CacheInstruction {
                continue;
            }

            // SAFETY: Both union members start with the affinity of the first processor group.
            let mask = unsafe { cache.Anonymous.GroupMask };

            descriptors.push(CacheDescriptor::new(
                cache.Level,
                CacheSize::Bytes(u64::from(cache.CacheSize)),
                group_mask_members(mask, &group_offsets).collect(),
            ));
        }

        Ok(descriptors)
    }

    fn frequency_mhz(&self, logical_core_index: LogicalCoreIndex) -> u32 {
        self.bindings
            .get_processor_mhz(logical_core_index)
            .unwrap_or_else(|| {
                trace!(logical_core_index, "~MHz registry value unavailable");
                0
            })
    }
}

impl BuildTargetPlatform {
    pub(crate) const fn new(bindings: BindingsFacade) -> Self {
        Self { bindings }
    }

    fn group_active_counts(&self) -> impl Iterator<Item = u32> {
        (0..self.bindings.get_active_processor_group_count())
            .map(|group| self.bindings.get_active_processor_count(group))
    }

    /// The global index of the first logical core of each processor group.
    fn group_start_offsets(&self) -> Vec<LogicalCoreIndex> {
        self.group_active_counts()
            .scan(0, |next_offset: &mut LogicalCoreIndex, count| {
                let offset = *next_offset;
                *next_offset = next_offset.saturating_add(count);
                Some(offset)
            })
            .collect()
    }

    /// Reads every record of the given relationship type, using the usual "probe for the size,
    /// then query" sequence.
    fn query_records(
        &self,
        relationship: LOGICAL_PROCESSOR_RELATIONSHIP,
    ) -> Result<Vec<SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>> {
        let mut required_length: u32 = 0;

        // SAFETY: No buffer is passed and the length outlives the call.
        let probe_result = unsafe {
            self.bindings.get_logical_processor_information_ex(
                relationship,
                None,
                &raw mut required_length,
            )
        };

        match probe_result {
            Err(e) if e.code() == HRESULT::from_win32(ERROR_INSUFFICIENT_BUFFER.0) => {}
            Err(e) => {
                return Err(Error::topology_query(
                    TopologyQueryFailure::SizeProbe,
                    format!("relationship {} size probe failed: {e}", relationship.0),
                ));
            }
            Ok(()) => {
                return Err(Error::topology_query(
                    TopologyQueryFailure::SizeProbe,
                    format!(
                        "relationship {} size probe succeeded without a buffer",
                        relationship.0
                    ),
                ));
            }
        }

        // One spare element so that a full record can be read from any offset within the data.
        let element_count = (required_length as usize)
            .div_ceil(size_of::<SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>())
            .saturating_add(1);

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(element_count)
            .map_err(|e| Error::allocation("allocating the topology record buffer", e))?;
        buffer.resize(
            element_count,
            SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX::default(),
        );

        let mut final_length = required_length;

        // SAFETY: The buffer is valid for writes of `required_length` bytes and both pointers
        // outlive the call.
        let query_result = unsafe {
            self.bindings.get_logical_processor_information_ex(
                relationship,
                Some(buffer.as_mut_ptr()),
                &raw mut final_length,
            )
        };

        if let Err(e) = query_result {
            return Err(Error::topology_query(
                TopologyQueryFailure::Query,
                format!("relationship {} query failed: {e}", relationship.0),
            ));
        }

        if final_length > required_length {
            return Err(Error::topology_query(
                TopologyQueryFailure::MalformedRecord,
                format!(
                    "query returned {final_length} bytes into a buffer of {required_length} bytes"
                ),
            ));
        }

        parse_records(&buffer, final_length as usize)
    }
}

/// Splits the first `data_len` bytes of `buffer` into variable-size records.
fn parse_records(
    buffer: &[SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX],
    data_len: usize,
) -> Result<Vec<SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>> {
    let header_len = offset_of!(SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX, Anonymous);
    let readable_len = size_of_val(buffer);

    let mut records = Vec::new();
    let mut offset = 0_usize;

    while offset < data_len {
        let remaining = data_len.saturating_sub(offset);

        if remaining < header_len
            || offset.saturating_add(size_of::<SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>())
                > readable_len
        {
            return Err(Error::topology_query(
                TopologyQueryFailure::MalformedRecord,
                format!("truncated record at offset {offset}"),
            ));
        }

        // SAFETY: We verified above that a full record starting at `offset` is within the buffer.
        let record_ptr = unsafe { buffer.as_ptr().byte_add(offset) };

        // SAFETY: Records are packed back to back, so they are not necessarily aligned.
        let record = unsafe { record_ptr.read_unaligned() };

        let size = record.Size as usize;

        if size < header_len || size > remaining {
            return Err(Error::topology_query(
                TopologyQueryFailure::MalformedRecord,
                format!(
                    "record at offset {offset} claims {size} bytes with {remaining} bytes remaining"
                ),
            ));
        }

        records
            .try_reserve(1)
            .map_err(|e| Error::allocation("growing the topology record list", e))?;
        records.push(record);

        offset = offset.saturating_add(size);
    }

    Ok(records)
}

/// The group affinity and efficiency class of every processor core record.
fn processor_core_masks(
    records: &[SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX],
) -> impl Iterator<Item = (GROUP_AFFINITY, u8)> {
    records
        .iter()
        .filter(|record| record.Relationship == RelationProcessorCore)
        .map(|record| {
            // SAFETY: The relationship tells us which union member the record carries.
            let processor = unsafe { record.Anonymous.Processor };

            // A processor core never spans processor groups, so there is exactly one mask.
            (processor.GroupMask[0], processor.EfficiencyClass)
        })
}

/// The global logical core indices of the processors set in a group affinity mask.
fn group_mask_members(
    mask: GROUP_AFFINITY,
    group_offsets: &[LogicalCoreIndex],
) -> impl Iterator<Item = LogicalCoreIndex> {
    let first_index = group_offsets.get(usize::from(mask.Group)).copied();

    if first_index.is_none() {
        warn!(group = mask.Group, "ignoring affinity mask of unknown processor group");
    }

    first_index
        .into_iter()
        .flat_map(move |first_index| affinity_mask_indices(mask.Mask as u64, first_index))
}

fn as_cache_query_error(error: Error) -> Error {
    match error {
        Error::TopologyQuery { problem, .. } => {
            Error::topology_query(TopologyQueryFailure::CacheQuery, problem)
        }
        other => other,
    }
}

#[allow(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::indexing_slicing,
    reason = "we need not worry in tests"
)]
