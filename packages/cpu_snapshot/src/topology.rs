//! Reconstruction of physical cores from per-logical-core grouping keys.

use foldhash::{HashMap, HashMapExt};
use tracing::trace;

use crate::{CoreClass, Error, LogicalCoreIndex, PhysicalCoreId, Result};

/// Identifies which physical core a logical core belongs to.
///
/// Logical cores with equal keys belong to the same physical core.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum GroupingKey {
    /// Package (socket) and core IDs as reported by the operating system.
    PackageCore {
        /// ID of the physical package the core is in.
        package_id: u32,

        /// ID of the core within its package.
        core_id: u32,
    },

    /// Index of the platform topology record that lists the logical core as a member.
    Record {
        /// Position of the record in the platform's record stream.
        index: u32,
    },

    /// The platform did not attribute the logical core to any physical core, so the logical
    /// core forms a physical core of its own.
    Unattributed {
        /// The logical core in question.
        logical_core_index: LogicalCoreIndex,
    },
}

impl GroupingKey {
    /// The opaque platform identifier reported for a physical core with this key.
    ///
    /// Package/core pairs are packed as `package_id << 16 | core_id & 0xFFFF`, records are
    /// identified by their index and unattributed cores by `PhysicalCoreId::MAX`.
    #[must_use]
    pub const fn platform_id(self) -> PhysicalCoreId {
        match self {
            Self::PackageCore {
                package_id,
                core_id,
            } => package_id.wrapping_shl(16) | (core_id & 0xFFFF),
            Self::Record { index } => index,
            Self::Unattributed { .. } => PhysicalCoreId::MAX,
        }
    }
}

/// One physical core and the logical cores it hosts.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PhysicalCore {
    id: PhysicalCoreId,
    class: CoreClass,
    logical_core_indices: Vec<LogicalCoreIndex>,
}

impl PhysicalCore {
    /// Opaque platform-specific identifier of the core.
    #[must_use]
    pub fn id(&self) -> PhysicalCoreId {
        self.id
    }

    /// Performance/efficiency classification of the core.
    #[must_use]
    pub fn class(&self) -> CoreClass {
        self.class
    }

    /// The logical cores hosted by this physical core, in ascending order.
    #[must_use]
    pub fn logical_core_indices(&self) -> &[LogicalCoreIndex] {
        &self.logical_core_indices
    }

    pub(crate) fn into_parts(self) -> (PhysicalCoreId, CoreClass, Vec<LogicalCoreIndex>) {
        (self.id, self.class, self.logical_core_indices)
    }
}

/// Groups logical cores into physical cores.
///
/// `keys[i]` is the grouping key of logical core `i`. Physical cores are returned in the order
/// their key first occurs, each with its logical cores in ascending order. Every logical core
/// belongs to exactly one physical core. All cores are classified as [`CoreClass::Unknown`];
/// use [`classify_physical_cores()`] to apply platform classification data.
///
/// # Errors
///
/// Returns [`Error::Allocation`] if the physical core list or a member list cannot grow.
pub fn build_physical_cores(keys: &[GroupingKey]) -> Result<Vec<PhysicalCore>> {
    let mut cores: Vec<PhysicalCore> = Vec::new();
    let mut core_index_by_key = HashMap::new();

    for (logical_core_index, key) in (0..=LogicalCoreIndex::MAX).zip(keys) {
        let core_index = if let Some(&existing) = core_index_by_key.get(key) {
            existing
        } else {
            cores
                .try_reserve(1)
                .map_err(|e| Error::allocation("growing the physical core list", e))?;

            let new_index = cores.len();
            cores.push(PhysicalCore {
                id: key.platform_id(),
                class: CoreClass::Unknown,
                logical_core_indices: Vec::new(),
            });
            core_index_by_key.insert(*key, new_index);
            new_index
        };

        // The index was either just pushed or was recorded when it was pushed.
        let Some(core) = cores.get_mut(core_index) else {
            unreachable!("physical core index {core_index} was recorded but does not exist");
        };

        core.logical_core_indices
            .try_reserve(1)
            .map_err(|e| Error::allocation("growing a physical core member list", e))?;
        core.logical_core_indices.push(logical_core_index);
    }

    trace!(
        logical_cores = keys.len(),
        physical_cores = cores.len(),
        "grouped logical cores into physical cores"
    );

    Ok(cores)
}

/// Applies per-logical-core classification data to physical cores.
///
/// `classes[i]` is the classification of logical core `i`. A physical core takes the class of
/// its first logical core. Cores whose first logical core has no entry keep their class.
pub fn classify_physical_cores(cores: &mut [PhysicalCore], classes: &[CoreClass]) {
    for core in cores {
        let class = core
            .logical_core_indices
            .first()
            .and_then(|&index| usize::try_from(index).ok())
            .and_then(|index| classes.get(index));

        if let Some(&class) = class {
            core.class = class;
        }
    }
}

/// Derives per-logical-core grouping keys from a stream of topology records, each record
/// listing the logical cores of one physical core.
///
/// A logical core listed by several records belongs to the first of them. Logical cores not
/// listed by any record become [`GroupingKey::Unattributed`]. Listed indices at or beyond
/// `logical_core_count` are ignored.
///
/// # Errors
///
/// Returns [`Error::Allocation`] if the key list cannot be allocated.
pub fn keys_from_records<R>(logical_core_count: usize, records: R) -> Result<Vec<GroupingKey>>
where
    R: IntoIterator,
    R::Item: IntoIterator<Item = LogicalCoreIndex>,
{
    let mut keys: Vec<GroupingKey> = Vec::new();
    keys.try_reserve_exact(logical_core_count)
        .map_err(|e| Error::allocation("allocating topology record keys", e))?;
    keys.extend(
        (0..=LogicalCoreIndex::MAX)
            .take(logical_core_count)
            .map(|logical_core_index| GroupingKey::Unattributed { logical_core_index }),
    );

    for (record_index, members) in (0..=u32::MAX).zip(records) {
        for logical_core_index in members {
            let slot = usize::try_from(logical_core_index)
                .ok()
                .and_then(|index| keys.get_mut(index));

            match slot {
                Some(slot @ GroupingKey::Unattributed { .. }) => {
                    *slot = GroupingKey::Record {
                        index: record_index,
                    };
                }
                Some(_) => {
                    trace!(
                        logical_core_index,
                        record_index, "logical core already attributed to an earlier record"
                    );
                }
                None => {
                    trace!(
                        logical_core_index,
                        record_index, "ignoring record member beyond logical core count"
                    );
                }
            }
        }
    }

    Ok(keys)
}

/// Enumerates the logical core indices of the bits set in an affinity mask, in ascending order.
///
/// Bit `b` of the mask corresponds to logical core `first_index + b`.
pub fn affinity_mask_indices(
    mask: u64,
    first_index: LogicalCoreIndex,
) -> impl Iterator<Item = LogicalCoreIndex> {
    (0..u64::BITS)
        .filter(move |bit| mask & (1 << bit) != 0)
        .map(move |bit| first_index.saturating_add(bit))
}

#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "we need not worry in tests"
)]
#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn key(core_id: u32) -> GroupingKey {
        GroupingKey::PackageCore {
            package_id: 0,
            core_id,
        }
    }

    fn members(cores: &[PhysicalCore]) -> Vec<Vec<LogicalCoreIndex>> {
        cores
            .iter()
            .map(|core| core.logical_core_indices().to_vec())
            .collect()
    }

    #[test]
    fn repeated_keys_group_in_ascending_order() {
        let keys = [key(5), key(5), key(7), key(5)];

        let cores = build_physical_cores(&keys).unwrap();

        assert_eq!(members(&cores), vec![vec![0, 1, 3], vec![2]]);
        assert_eq!(cores[0].id(), 5);
        assert_eq!(cores[1].id(), 7);
    }

    #[test]
    fn physical_cores_in_first_occurrence_order() {
        let keys = [key(9), key(3), key(9), key(1), key(3), key(1)];

        let cores = build_physical_cores(&keys).unwrap();

        assert_eq!(
            cores.iter().map(PhysicalCore::id).collect_vec(),
            vec![9, 3, 1]
        );
        assert_eq!(members(&cores), vec![vec![0, 2], vec![1, 4], vec![3, 5]]);
    }

    #[test]
    fn every_logical_core_in_exactly_one_physical_core() {
        for logical_core_count in 1..=64_u32 {
            // Two packages, SMT-2, with the sibling threads numbered in the second half.
            let keys = (0..logical_core_count)
                .map(|index| GroupingKey::PackageCore {
                    package_id: index % 2,
                    core_id: (index / 2) % (logical_core_count.div_ceil(4).max(1)),
                })
                .collect_vec();

            let cores = build_physical_cores(&keys).unwrap();

            let all = cores
                .iter()
                .flat_map(|core| core.logical_core_indices().iter().copied())
                .sorted()
                .collect_vec();

            assert_eq!(all, (0..logical_core_count).collect_vec());

            for core in &cores {
                assert!(!core.logical_core_indices().is_empty());
                assert!(
                    core.logical_core_indices()
                        .windows(2)
                        .all(|pair| pair[0] < pair[1])
                );
            }
        }
    }

    #[test]
    fn no_keys_no_cores() {
        assert!(build_physical_cores(&[]).unwrap().is_empty());
    }

    #[test]
    fn cores_start_unknown() {
        let cores = build_physical_cores(&[key(0), key(1)]).unwrap();

        assert!(cores.iter().all(|core| core.class() == CoreClass::Unknown));
    }

    #[test]
    fn package_core_platform_id() {
        let key = GroupingKey::PackageCore {
            package_id: 1,
            core_id: 3,
        };
        assert_eq!(key.platform_id(), 0x0001_0003);

        // Only the low 16 bits of the core ID are kept.
        let key = GroupingKey::PackageCore {
            package_id: 0,
            core_id: 0x0001_0002,
        };
        assert_eq!(key.platform_id(), 2);
    }

    #[test]
    fn same_core_id_on_different_packages_is_different_core() {
        let keys = [
            GroupingKey::PackageCore {
                package_id: 0,
                core_id: 0,
            },
            GroupingKey::PackageCore {
                package_id: 1,
                core_id: 0,
            },
        ];

        let cores = build_physical_cores(&keys).unwrap();

        assert_eq!(members(&cores), vec![vec![0], vec![1]]);
    }

    #[test]
    fn classification_uses_first_member() {
        let mut cores = build_physical_cores(&[key(0), key(1), key(0), key(1)]).unwrap();

        classify_physical_cores(
            &mut cores,
            &[
                CoreClass::Performance,
                CoreClass::Efficiency,
                CoreClass::Efficiency,
                CoreClass::Performance,
            ],
        );

        assert_eq!(cores[0].class(), CoreClass::Performance);
        assert_eq!(cores[1].class(), CoreClass::Efficiency);
    }

    #[test]
    fn classification_without_data_keeps_unknown() {
        let mut cores = build_physical_cores(&[key(0), key(1)]).unwrap();

        classify_physical_cores(&mut cores, &[]);

        assert!(cores.iter().all(|core| core.class() == CoreClass::Unknown));
    }

    #[test]
    fn records_become_keys() {
        let records = [vec![0, 4], vec![1, 5], vec![2, 6], vec![3, 7]];

        let keys = keys_from_records(8, records).unwrap();
        let cores = build_physical_cores(&keys).unwrap();

        assert_eq!(
            members(&cores),
            vec![vec![0, 4], vec![1, 5], vec![2, 6], vec![3, 7]]
        );
        assert_eq!(
            cores.iter().map(PhysicalCore::id).collect_vec(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn records_missing_and_duplicate_members() {
        // Logical core 2 is in no record, logical core 1 is in two, 9 is out of range.
        let records = [vec![0, 1], vec![1, 3, 9]];

        let keys = keys_from_records(4, records).unwrap();

        assert_eq!(
            keys,
            vec![
                GroupingKey::Record { index: 0 },
                GroupingKey::Record { index: 0 },
                GroupingKey::Unattributed {
                    logical_core_index: 2
                },
                GroupingKey::Record { index: 1 },
            ]
        );

        let cores = build_physical_cores(&keys).unwrap();
        assert_eq!(members(&cores), vec![vec![0, 1], vec![2], vec![3]]);
        assert_eq!(cores[1].id(), PhysicalCoreId::MAX);
    }

    #[test]
    fn affinity_mask_enumeration() {
        assert_eq!(
            affinity_mask_indices(0b1011, 0).collect_vec(),
            vec![0, 1, 3]
        );
        assert_eq!(
            affinity_mask_indices(1 << 63 | 1, 64).collect_vec(),
            vec![64, 127]
        );
        assert_eq!(affinity_mask_indices(0, 0).count(), 0);
        assert_eq!(affinity_mask_indices(u64::MAX, 0).count(), 64);
    }
}
