//! Mapping of raw cache descriptors to per-logical-core cache sizes.

use tracing::trace;

use crate::snapshot::zeroed_per_core;
use crate::{LogicalCoreIndex, Result};

/// The size of one cache instance, in the unit the platform reported it in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CacheSize {
    /// Size in bytes. Truncated to whole KiB when mapped.
    Bytes(u64),

    /// Size in kibibytes.
    Kibibytes(u32),

    /// Size in mebibytes. Scaled by 1024 when mapped.
    Mebibytes(u32),
}

impl CacheSize {
    /// The size in whole KiB, saturating at `u32::MAX`.
    #[must_use]
    pub fn kib(self) -> u32 {
        match self {
            Self::Bytes(bytes) => u32::try_from(bytes.div_euclid(1024)).unwrap_or(u32::MAX),
            Self::Kibibytes(kib) => kib,
            Self::Mebibytes(mib) => mib.saturating_mul(1024),
        }
    }
}

/// One physical cache instance as reported by the platform.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct CacheDescriptor {
    /// Cache level. Only levels 1, 2 and 3 are mapped, anything else is ignored.
    pub level: u8,

    /// Size of the cache instance.
    pub size: CacheSize,

    /// The logical cores that share this cache instance.
    pub sharing_set: Vec<LogicalCoreIndex>,
}

impl CacheDescriptor {
    /// Creates a descriptor for a cache instance of the given level and size, shared by the
    /// listed logical cores.
    #[must_use]
    pub fn new(level: u8, size: CacheSize, sharing_set: Vec<LogicalCoreIndex>) -> Self {
        Self {
            level,
            size,
            sharing_set,
        }
    }
}

/// L2 cache information for one logical core.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "mirrors the layout exposed over the C surface"
)]
pub struct L2Cache {
    /// Size of the L2 cache instance the logical core uses, in KiB. Zero if unknown.
    pub size_kib: u32,

    /// How many logical cores share that L2 cache instance. Zero if unknown.
    pub shared_with_core_number: u32,
}

/// Cache sizes for every logical core, plus the size of the shared last level cache.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheLayout {
    l1_kib: Vec<u32>,
    l2: Vec<L2Cache>,
    l3_kib: u32,
}

impl CacheLayout {
    /// Allocates a layout where every logical core reports zero for every cache level.
    pub(crate) fn zeroed(logical_core_count: usize) -> Result<Self> {
        Ok(Self {
            l1_kib: zeroed_per_core(logical_core_count)?,
            l2: zeroed_per_core(logical_core_count)?,
            l3_kib: 0,
        })
    }

    /// Writes the sizes from each descriptor to every logical core in its sharing set.
    ///
    /// Logical cores that appear in no descriptor keep their zero values. If several L3
    /// descriptors are present, the last one wins.
    pub(crate) fn apply<'a>(&mut self, descriptors: impl IntoIterator<Item = &'a CacheDescriptor>) {
        for descriptor in descriptors {
            let size_kib = descriptor.size.kib();
            let sharing_count = u32::try_from(descriptor.sharing_set.len()).unwrap_or(u32::MAX);

            for &index in &descriptor.sharing_set {
                let Ok(index) = usize::try_from(index) else {
                    continue;
                };

                match descriptor.level {
                    1 => {
                        let Some(l1) = self.l1_kib.get_mut(index) else {
                            trace!(index, "ignoring L1 sharing entry for unknown logical core");
                            continue;
                        };

                        *l1 = size_kib;
                    }
                    2 => {
                        let Some(l2) = self.l2.get_mut(index) else {
                            trace!(index, "ignoring L2 sharing entry for unknown logical core");
                            continue;
                        };

                        *l2 = L2Cache {
                            size_kib,
                            shared_with_core_number: sharing_count,
                        };
                    }
                    3 => self.l3_kib = size_kib,
                    level => {
                        trace!(level, "ignoring cache descriptor of unmapped level");
                        break;
                    }
                }
            }
        }
    }

    /// L1 cache size of every logical core, in KiB, indexed by logical core index.
    #[must_use]
    pub fn l1_kib(&self) -> &[u32] {
        &self.l1_kib
    }

    /// L2 cache information of every logical core, indexed by logical core index.
    #[must_use]
    pub fn l2(&self) -> &[L2Cache] {
        &self.l2
    }

    /// Size of the shared L3 cache in KiB, zero if the system reports none.
    #[must_use]
    pub fn l3_kib(&self) -> u32 {
        self.l3_kib
    }

    pub(crate) fn into_parts(self) -> (Vec<u32>, Vec<L2Cache>, u32) {
        (self.l1_kib, self.l2, self.l3_kib)
    }
}

/// Maps a sequence of raw cache descriptors to per-logical-core cache sizes.
///
/// This is a pure function of its inputs. A logical core absent from every descriptor reports
/// zero, which means "cache information unavailable" and is not an error.
///
/// # Errors
///
/// Returns [`Error::CoreArrays`][crate::Error::CoreArrays] if the per-logical-core arrays
/// cannot be allocated.
pub fn map_caches<'a>(
    logical_core_count: usize,
    descriptors: impl IntoIterator<Item = &'a CacheDescriptor>,
) -> Result<CacheLayout> {
    let mut layout = CacheLayout::zeroed(logical_core_count)?;
    layout.apply(descriptors);
    Ok(layout)
}

#[allow(clippy::indexing_slicing, reason = "we need not worry in tests")]
#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn typical_descriptors() -> Vec<CacheDescriptor> {
        // 2 physical cores with 2 threads each, per-core L1 and L2, one shared L3.
        vec![
            CacheDescriptor::new(1, CacheSize::Kibibytes(48), vec![0, 1]),
            CacheDescriptor::new(1, CacheSize::Kibibytes(48), vec![2, 3]),
            CacheDescriptor::new(2, CacheSize::Kibibytes(1280), vec![0, 1]),
            CacheDescriptor::new(2, CacheSize::Kibibytes(1280), vec![2, 3]),
            CacheDescriptor::new(3, CacheSize::Mebibytes(24), vec![0, 1, 2, 3]),
        ]
    }

    #[test]
    fn typical_layout() {
        let layout = map_caches(4, &typical_descriptors()).unwrap();

        assert_eq!(layout.l1_kib(), &[48, 48, 48, 48]);
        assert_eq!(
            layout.l2(),
            &[L2Cache {
                size_kib: 1280,
                shared_with_core_number: 2
            }; 4]
        );
        assert_eq!(layout.l3_kib(), 24 * 1024);
    }

    #[test]
    fn mebibytes_are_scaled_to_kib() {
        assert_eq!(CacheSize::Mebibytes(2).kib(), 2048);
        assert_eq!(CacheSize::Kibibytes(2).kib(), 2);
        assert_eq!(CacheSize::Bytes(2 * 1024 * 1024).kib(), 2048);
        assert_eq!(CacheSize::Bytes(1023).kib(), 0);
        assert_eq!(CacheSize::Mebibytes(u32::MAX).kib(), u32::MAX);
    }

    #[test]
    fn absent_cores_report_zero() {
        let descriptors = vec![
            CacheDescriptor::new(1, CacheSize::Kibibytes(32), vec![1]),
            CacheDescriptor::new(2, CacheSize::Kibibytes(512), vec![1]),
        ];

        let layout = map_caches(3, &descriptors).unwrap();

        assert_eq!(layout.l1_kib(), &[0, 32, 0]);
        assert_eq!(layout.l2()[0], L2Cache::default());
        assert_eq!(layout.l2()[2], L2Cache::default());
        assert_eq!(layout.l3_kib(), 0);
    }

    #[test]
    fn no_descriptors_is_all_zero() {
        let layout = map_caches(2, []).unwrap();

        assert_eq!(layout.l1_kib(), &[0, 0]);
        assert_eq!(layout.l2(), &[L2Cache::default(); 2]);
        assert_eq!(layout.l3_kib(), 0);
    }

    #[test]
    fn l2_sharing_count_is_set_cardinality() {
        let descriptors = vec![CacheDescriptor::new(
            2,
            CacheSize::Mebibytes(4),
            vec![0, 1, 2, 3, 4, 5],
        )];

        let layout = map_caches(8, &descriptors).unwrap();

        for index in 0..6 {
            assert_eq!(layout.l2()[index].shared_with_core_number, 6);
            assert_eq!(layout.l2()[index].size_kib, 4096);
        }

        assert_eq!(layout.l2()[6], L2Cache::default());
        assert_eq!(layout.l2()[7], L2Cache::default());
    }

    #[test]
    fn last_l3_wins() {
        let descriptors = vec![
            CacheDescriptor::new(3, CacheSize::Mebibytes(32), vec![0, 1]),
            CacheDescriptor::new(3, CacheSize::Mebibytes(16), vec![2, 3]),
        ];

        let layout = map_caches(4, &descriptors).unwrap();

        assert_eq!(layout.l3_kib(), 16 * 1024);
    }

    #[test]
    fn l3_does_not_touch_per_core_arrays() {
        let descriptors = vec![CacheDescriptor::new(
            3,
            CacheSize::Mebibytes(8),
            vec![0, 1],
        )];

        let layout = map_caches(2, &descriptors).unwrap();

        assert_eq!(layout.l1_kib(), &[0, 0]);
        assert_eq!(layout.l2(), &[L2Cache::default(); 2]);
    }

    #[test]
    fn out_of_range_and_unknown_levels_are_ignored() {
        let descriptors = vec![
            CacheDescriptor::new(1, CacheSize::Kibibytes(32), vec![0, 7]),
            CacheDescriptor::new(2, CacheSize::Kibibytes(256), vec![9]),
            CacheDescriptor::new(4, CacheSize::Mebibytes(128), vec![0, 1]),
        ];

        let layout = map_caches(2, &descriptors).unwrap();

        assert_eq!(layout.l1_kib(), &[32, 0]);
        assert_eq!(layout.l2(), &[L2Cache::default(); 2]);
        assert_eq!(layout.l3_kib(), 0);
    }

    #[test]
    fn independent_calls_are_identical() {
        let descriptors = typical_descriptors();

        let first = map_caches(4, &descriptors).unwrap();
        let second = map_caches(4, &descriptors).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn impossible_core_count_is_core_array_error() {
        let error = map_caches(usize::MAX, []).unwrap_err();

        assert_eq!(error.status_code(), 208);
    }
}
