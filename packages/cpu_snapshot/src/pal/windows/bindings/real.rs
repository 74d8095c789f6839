use std::fmt::Debug;

use windows::Win32::Foundation::ERROR_SUCCESS;
use windows::Win32::System::Registry::{HKEY_LOCAL_MACHINE, RRF_RT_REG_DWORD, RegGetValueW};
use windows::Win32::System::SystemInformation::{
    GetLogicalProcessorInformationEx, LOGICAL_PROCESSOR_RELATIONSHIP,
    SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX,
};
use windows::Win32::System::Threading::{GetActiveProcessorCount, GetActiveProcessorGroupCount};
use windows::core::{HSTRING, Result, w};

use crate::pal::windows::Bindings;

/// Size of a registry `REG_DWORD` value.
const DWORD_SIZE: u32 = 4;

/// FFI bindings that target the real operating system that the build is targeting.
///
/// You would only use different bindings in PAL unit tests that need to use mock bindings.
/// Even then, whenever possible, unit tests should use real bindings for maximum realism.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

// Real OS bindings are excluded from coverage measurement because they are only reachable on
// actual Windows and their error paths require OS-level failures.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Bindings for BuildTargetBindings {
    fn get_active_processor_count(&self, group_number: u16) -> u32 {
        // SAFETY: No safety requirements.
        unsafe { GetActiveProcessorCount(group_number) }
    }

    fn get_active_processor_group_count(&self) -> u16 {
        // SAFETY: No safety requirements.
        unsafe { GetActiveProcessorGroupCount() }
    }

    unsafe fn get_logical_processor_information_ex(
        &self,
        relationship_type: LOGICAL_PROCESSOR_RELATIONSHIP,
        buffer: Option<*mut SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>,
        returned_length: *mut u32,
    ) -> Result<()> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { GetLogicalProcessorInformationEx(relationship_type, buffer, returned_length) }
    }

    fn get_processor_mhz(&self, processor_index: u32) -> Option<u32> {
        let subkey = HSTRING::from(format!(
            r"HARDWARE\DESCRIPTION\System\CentralProcessor\{processor_index}"
        ));

        let mut mhz: u32 = 0;
        let mut size = DWORD_SIZE;

        // SAFETY: The value pointer is valid for writes of `size` bytes and both pointers
        // outlive the call.
        let status = unsafe {
            RegGetValueW(
                HKEY_LOCAL_MACHINE,
                &subkey,
                w!("~MHz"),
                RRF_RT_REG_DWORD,
                None,
                Some((&raw mut mhz).cast()),
                Some(&raw mut size),
            )
        };

        (status == ERROR_SUCCESS).then_some(mhz)
    }
}
