#![cfg_attr(
    test,
    allow(
        clippy::struct_field_names,
        reason = "false positive from automock generated code"
    )
)]

use std::fmt::Debug;

/// Linux exposes processor topology, cache and frequency information as a virtual filesystem
/// under `/sys`. This trait abstracts this virtual filesystem to allow it to be mocked.
///
/// Every file is optional. Which files exist depends on the kernel version, the kernel
/// configuration and the hardware, so absence is an expected outcome and not an error.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Filesystem: Debug + Send + Sync + 'static {
    /// Get the contents of the `/sys/devices/system/cpu/online` file.
    ///
    /// This is a cpulist format file ("0,1,2-4,5-10:2" style list).
    fn get_cpu_online_contents(&self) -> Option<String>;

    /// Get the contents of `/sys/devices/system/cpu/cpu{}/topology/physical_package_id`.
    ///
    /// This is a single line file with a decimal integer.
    fn get_physical_package_id_contents(&self, cpu_index: u32) -> Option<String>;

    /// Get the contents of `/sys/devices/system/cpu/cpu{}/topology/core_id`.
    ///
    /// This is a single line file with a decimal integer.
    fn get_core_id_contents(&self, cpu_index: u32) -> Option<String>;

    /// Get the contents of `/sys/devices/system/cpu/cpu{}/cache/index{}/level`.
    fn get_cache_level_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String>;

    /// Get the contents of `/sys/devices/system/cpu/cpu{}/cache/index{}/type`.
    ///
    /// One of `Data`, `Instruction` or `Unified`.
    fn get_cache_type_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String>;

    /// Get the contents of `/sys/devices/system/cpu/cpu{}/cache/index{}/size`.
    ///
    /// A decimal integer followed by a unit suffix, e.g. `32K` or `8M`.
    fn get_cache_size_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String>;

    /// Get the contents of `/sys/devices/system/cpu/cpu{}/cache/index{}/shared_cpu_list`.
    ///
    /// This is a cpulist format file.
    fn get_cache_shared_cpu_list_contents(
        &self,
        cpu_index: u32,
        cache_index: u32,
    ) -> Option<String>;

    /// Get the contents of `/sys/devices/system/cpu/cpu{}/cpufreq/scaling_cur_freq`.
    ///
    /// This is a single line file with the current frequency in kHz.
    fn get_scaling_cur_freq_contents(&self, cpu_index: u32) -> Option<String>;

    /// Get the contents of `/sys/devices/cpu_core/cpus`, present on hybrid systems only.
    ///
    /// This is a cpulist format file listing the performance cores.
    fn get_hybrid_core_cpus_contents(&self) -> Option<String>;

    /// Get the contents of `/sys/devices/cpu_atom/cpus`, present on hybrid systems only.
    ///
    /// This is a cpulist format file listing the efficiency cores.
    fn get_hybrid_atom_cpus_contents(&self) -> Option<String>;
}
