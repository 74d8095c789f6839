use std::fmt::Debug;

use windows::Win32::System::SystemInformation::{
    LOGICAL_PROCESSOR_RELATIONSHIP, SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX,
};
use windows::core::Result;

/// Bindings for FFI calls into the operating system.
///
/// All PAL FFI calls must go through this trait, enabling them to be mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Bindings: Debug + Send + Sync + 'static {
    fn get_active_processor_count(&self, group_number: u16) -> u32;

    fn get_active_processor_group_count(&self) -> u16;

    /// # Safety
    ///
    /// `buffer`, if present, must be valid for writes of `*returned_length` bytes and
    /// `returned_length` must be valid for reads and writes.
    unsafe fn get_logical_processor_information_ex(
        &self,
        relationship_type: LOGICAL_PROCESSOR_RELATIONSHIP,
        buffer: Option<*mut SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>,
        returned_length: *mut u32,
    ) -> Result<()>;

    // HKLM\HARDWARE\DESCRIPTION\System\CentralProcessor\<n> "~MHz"
    fn get_processor_mhz(&self, processor_index: u32) -> Option<u32>;
}
