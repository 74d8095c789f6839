use foldhash::{HashSet, HashSetExt};
use tracing::{trace, warn};

use crate::pal::linux::{Bindings, BindingsFacade, Filesystem, FilesystemFacade};
use crate::pal::{Platform, cpuid};
use crate::snapshot::zeroed_per_core;
use crate::{
    CacheDescriptor, CacheSize, CoreClass, Error, GroupingKey, LogicalCoreIndex, RawRegisters,
    Result, query_brand_string, query_vendor_string,
};

/// Singleton instance of `BuildTargetPlatform`, used by public API types
/// to hook up to the correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform =
    BuildTargetPlatform::new(BindingsFacade::target(), FilesystemFacade::target());

/// The platform that matches the crate's build target.
///
/// Logical core indices are positions in the ascending list of online processors, so they stay
/// dense even when the operating system has taken processors offline. All sysfs paths use the
/// operating system's processor IDs and all cpulists read from sysfs are mapped back.
///
/// You would only use a different platform in unit tests that need to mock the platform.
/// Even then, whenever possible, unit tests should use the real platform for maximum realism.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform {
    bindings: BindingsFacade,
    fs: FilesystemFacade,
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
        let online = self.online_processors()?;

        if online.is_empty() {
            return Err(Error::PlatformSourceUnavailable {
                problem: "/sys/devices/system/cpu/online lists no processors".to_string(),
            });
        }

        // The two sources can only disagree if processors went on- or offline in between.
        match self.bindings.online_processor_count() {
            Ok(count) if count != online.len() => {
                warn!(
                    sysconf_count = count,
                    sysfs_count = online.len(),
                    "online processor count changed while being read, using the sysfs list"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "failed to count online processors, using the sysfs list");
            }
        }

        Ok(online.len())
    }

    fn grouping_keys(&self, logical_core_count: usize) -> Result<Vec<GroupingKey>> {
        let online = self.online_processors()?;

        let mut keys = Vec::new();
        keys.try_reserve_exact(logical_core_count)
            .map_err(|e| Error::allocation("allocating topology grouping keys", e))?;

        for &cpu_id in online.ids.iter().take(logical_core_count) {
            let package_id =
                parse_id_or_zero(self.fs.get_physical_package_id_contents(cpu_id), || {
                    trace!(cpu_id, "physical_package_id unavailable, assuming 0");
                });
            let core_id = parse_id_or_zero(self.fs.get_core_id_contents(cpu_id), || {
                trace!(cpu_id, "core_id unavailable, assuming 0");
            });

            keys.push(GroupingKey::PackageCore {
                package_id,
                core_id,
            });
        }

        Ok(keys)
    }

    fn core_classes(&self, logical_core_count: usize) -> Vec<CoreClass> {
        let Ok(online) = self.online_processors() else {
            return Vec::new();
        };

        let performance = self
            .fs
            .get_hybrid_core_cpus_contents()
            .and_then(|contents| parse_cpulist(&contents));
        let efficiency = self
            .fs
            .get_hybrid_atom_cpus_contents()
            .and_then(|contents| parse_cpulist(&contents));

        // Only hybrid systems have both PMU device directories.
        let (Some(performance), Some(efficiency)) = (performance, efficiency) else {
            return Vec::new();
        };

        let Ok(mut classes) = zeroed_per_core::<CoreClass>(logical_core_count) else {
            warn!(
                logical_core_count,
                "unable to allocate core classes, reporting all cores as unknown"
            );
            return Vec::new();
        };

        let classified = performance
            .into_iter()
            .map(|cpu_id| (cpu_id, CoreClass::Performance))
            .chain(
                efficiency
                    .into_iter()
                    .map(|cpu_id| (cpu_id, CoreClass::Efficiency)),
            );

        for (cpu_id, class) in classified {
            if let Some(slot) = online
                .logical_index(cpu_id)
                .and_then(|index| usize::try_from(index).ok())
                .and_then(|index| classes.get_mut(index))
            {
                *slot = class;
            }
        }

        classes
    }

    fn cache_descriptors(&self, logical_core_count: usize) -> Result<Vec<CacheDescriptor>> {
        let online = self.online_processors()?;

        let mut descriptors: Vec<CacheDescriptor> = Vec::new();

        // Every cache instance is listed once for each logical core that shares it.
        let mut seen = HashSet::new();

        for (logical_core_index, &cpu_id) in
            (0..=LogicalCoreIndex::MAX).zip(online.ids.iter().take(logical_core_count))
        {
            for cache_index in 0..=u32::MAX {
                let descriptor =
                    match self.cache_directory(&online, cpu_id, logical_core_index, cache_index) {
                        CacheDirectory::Absent => break,
                        CacheDirectory::Skipped => continue,
                        CacheDirectory::Cache(descriptor) => descriptor,
                    };

                if seen.contains(&descriptor) {
                    continue;
                }

                descriptors
                    .try_reserve(1)
                    .map_err(|e| Error::allocation("growing the cache descriptor list", e))?;
                descriptors.push(descriptor.clone());
                seen.insert(descriptor);
            }
        }

        Ok(descriptors)
    }

    fn frequency_mhz(&self, logical_core_index: LogicalCoreIndex) -> u32 {
        let Some(cpu_id) = self
            .online_processors()
            .ok()
            .and_then(|online| online.cpu_id(logical_core_index))
        else {
            return 0;
        };

        self.fs
            .get_scaling_cur_freq_contents(cpu_id)
            .and_then(|contents| contents.trim().parse::<u32>().ok())
            .map_or(0, |khz| khz.div_euclid(1000))
    }
}

impl BuildTargetPlatform {
    pub(crate) const fn new(bindings: BindingsFacade, fs: FilesystemFacade) -> Self {
        Self { bindings, fs }
    }

    /// Reads and parses `/sys/devices/system/cpu/online`.
    fn online_processors(&self) -> Result<OnlineProcessors> {
        let Some(contents) = self.fs.get_cpu_online_contents() else {
            return Err(Error::PlatformSourceUnavailable {
                problem: "/sys/devices/system/cpu/online is not readable".to_string(),
            });
        };

        let Some(ids) = parse_cpulist(&contents) else {
            return Err(Error::PlatformSourceUnavailable {
                problem: format!("/sys/devices/system/cpu/online is not a cpulist: {contents}"),
            });
        };

        Ok(OnlineProcessors { ids })
    }

    /// Reads one `cache/index{}` directory of one logical core.
    fn cache_directory(
        &self,
        online: &OnlineProcessors,
        cpu_id: u32,
        logical_core_index: LogicalCoreIndex,
        cache_index: u32,
    ) -> CacheDirectory {
        let Some(level) = self.fs.get_cache_level_contents(cpu_id, cache_index) else {
            return CacheDirectory::Absent;
        };

        if self
            .fs
            .get_cache_type_contents(cpu_id, cache_index)
            .is_some_and(|cache_type| cache_type.trim() == "Instruction")
        {
            return CacheDirectory::Skipped;
        }

        let Ok(level) = level.trim().parse::<u8>() else {
            warn!(cpu_id, cache_index, %level, "ignoring cache with unparseable level");
            return CacheDirectory::Skipped;
        };

        let Some(size) = self
            .fs
            .get_cache_size_contents(cpu_id, cache_index)
            .as_deref()
            .and_then(parse_cache_size)
        else {
            warn!(cpu_id, cache_index, "ignoring cache with missing or unparseable size");
            return CacheDirectory::Skipped;
        };

        let sharing_set = match self.fs.get_cache_shared_cpu_list_contents(cpu_id, cache_index) {
            Some(contents) => {
                let Some(sharing_cpu_ids) = parse_cpulist(&contents) else {
                    warn!(
                        cpu_id,
                        cache_index,
                        %contents,
                        "ignoring cache with invalid shared_cpu_list"
                    );
                    return CacheDirectory::Skipped;
                };

                // Offline processors can share the cache but have no logical core index.
                sharing_cpu_ids
                    .into_iter()
                    .filter_map(|id| online.logical_index(id))
                    .collect()
            }
            // Without a sharing list, all we know is that this logical core uses the cache.
            None => vec![logical_core_index],
        };

        CacheDirectory::Cache(CacheDescriptor::new(level, size, sharing_set))
    }
}

/// The online processors, as operating system processor IDs in ascending order without
/// duplicates, which is how `cpulist::parse()` returns them.
///
/// The position of an ID in the list is the logical core index of that processor.
#[derive(Debug)]
struct OnlineProcessors {
    ids: Vec<u32>,
}

impl OnlineProcessors {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn cpu_id(&self, logical_core_index: LogicalCoreIndex) -> Option<u32> {
        usize::try_from(logical_core_index)
            .ok()
            .and_then(|index| self.ids.get(index))
            .copied()
    }

    fn logical_index(&self, cpu_id: u32) -> Option<LogicalCoreIndex> {
        self.ids
            .binary_search(&cpu_id)
            .ok()
            .and_then(|position| LogicalCoreIndex::try_from(position).ok())
    }
}

/// The outcome of reading one `cache/index{}` directory.
enum CacheDirectory {
    /// The directory does not exist, which ends the enumeration for the logical core.
    Absent,

    /// The directory describes an instruction cache or has unreadable attributes.
    Skipped,

    Cache(CacheDescriptor),
}

fn parse_id_or_zero(contents: Option<String>, on_missing: impl FnOnce()) -> u32 {
    let id = contents.and_then(|contents| contents.trim().parse::<u32>().ok());

    id.unwrap_or_else(|| {
        on_missing();
        0
    })
}

fn parse_cpulist(contents: &str) -> Option<Vec<u32>> {
    cpulist::parse(contents.trim()).ok()
}

/// Parses a sysfs cache size such as `48K` or `30M`. A missing suffix means KiB.
fn parse_cache_size(contents: &str) -> Option<CacheSize> {
    let contents = contents.trim();

    let digits_end = contents
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(contents.len());
    let (digits, suffix) = contents.split_at_checked(digits_end)?;

    let value = digits.parse::<u32>().ok()?;

    match suffix {
        "" | "K" | "k" => Some(CacheSize::Kibibytes(value)),
        "M" | "m" => Some(CacheSize::Mebibytes(value)),
        _ => None,
    }
}

#[allow(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::indexing_slicing,
    reason = "we need not worry in tests"
)]
