use std::fmt::Debug;
use std::fs;

use crate::pal::linux::Filesystem;

/// The virtual filesystem for the real operating system that the build is targeting.
///
/// You would only use different filesystems in PAL unit tests that need to use a mock filesystem.
/// Even then, whenever possible, unit tests should use the real filesystem for maximum realism.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetFilesystem;

// Real filesystem access is excluded from coverage measurement because it is tested via the
// real platform on actual Linux and which files exist depends on the test system.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Filesystem for BuildTargetFilesystem {
    fn get_cpu_online_contents(&self) -> Option<String> {
        fs::read_to_string("/sys/devices/system/cpu/online").ok()
    }

    fn get_physical_package_id_contents(&self, cpu_index: u32) -> Option<String> {
        fs::read_to_string(format!(
            "/sys/devices/system/cpu/cpu{cpu_index}/topology/physical_package_id"
        ))
        .ok()
    }

    fn get_core_id_contents(&self, cpu_index: u32) -> Option<String> {
        fs::read_to_string(format!(
            "/sys/devices/system/cpu/cpu{cpu_index}/topology/core_id"
        ))
        .ok()
    }

    fn get_cache_level_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String> {
        fs::read_to_string(format!(
            "/sys/devices/system/cpu/cpu{cpu_index}/cache/index{cache_index}/level"
        ))
        .ok()
    }

    fn get_cache_type_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String> {
        fs::read_to_string(format!(
            "/sys/devices/system/cpu/cpu{cpu_index}/cache/index{cache_index}/type"
        ))
        .ok()
    }

    fn get_cache_size_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String> {
        fs::read_to_string(format!(
            "/sys/devices/system/cpu/cpu{cpu_index}/cache/index{cache_index}/size"
        ))
        .ok()
    }

    fn get_cache_shared_cpu_list_contents(
        &self,
        cpu_index: u32,
        cache_index: u32,
    ) -> Option<String> {
        fs::read_to_string(format!(
            "/sys/devices/system/cpu/cpu{cpu_index}/cache/index{cache_index}/shared_cpu_list"
        ))
        .ok()
    }

    fn get_scaling_cur_freq_contents(&self, cpu_index: u32) -> Option<String> {
        fs::read_to_string(format!(
            "/sys/devices/system/cpu/cpu{cpu_index}/cpufreq/scaling_cur_freq"
        ))
        .ok()
    }

    fn get_hybrid_core_cpus_contents(&self) -> Option<String> {
        fs::read_to_string("/sys/devices/cpu_core/cpus").ok()
    }

    fn get_hybrid_atom_cpus_contents(&self) -> Option<String> {
        fs::read_to_string("/sys/devices/cpu_atom/cpus").ok()
    }
}
