#![cfg_attr(coverage_nightly, coverage(off))]

use std::fmt::Debug;
#[cfg(test)]
use std::sync::Arc;

use windows::Win32::System::SystemInformation::{
    LOGICAL_PROCESSOR_RELATIONSHIP, SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX,
};
use windows::core::Result;

#[cfg(test)]
use crate::pal::windows::MockBindings;
use crate::pal::windows::{Bindings, BuildTargetBindings};

/// Enum to hide the real/mock choice behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum BindingsFacade {
    Target(&'static BuildTargetBindings),

    #[cfg(test)]
    Mock(Arc<MockBindings>),
}

impl BindingsFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetBindings)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockBindings) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Bindings for BindingsFacade {
    fn get_active_processor_count(&self, group_number: u16) -> u32 {
        match self {
            Self::Target(bindings) => bindings.get_active_processor_count(group_number),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.get_active_processor_count(group_number),
        }
    }

    fn get_active_processor_group_count(&self) -> u16 {
        match self {
            Self::Target(bindings) => bindings.get_active_processor_group_count(),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.get_active_processor_group_count(),
        }
    }

    unsafe fn get_logical_processor_information_ex(
        &self,
        relationship_type: LOGICAL_PROCESSOR_RELATIONSHIP,
        buffer: Option<*mut SYSTEM_LOGICAL_PROCESSOR_INFORMATION_EX>,
        returned_length: *mut u32,
    ) -> Result<()> {
        match self {
            // SAFETY: Forwarding safety requirements to the caller.
            Self::Target(bindings) => unsafe {
                bindings.get_logical_processor_information_ex(
                    relationship_type,
                    buffer,
                    returned_length,
                )
            },
            #[cfg(test)]
            // SAFETY: Forwarding safety requirements to the caller.
            Self::Mock(bindings) => unsafe {
                bindings.get_logical_processor_information_ex(
                    relationship_type,
                    buffer,
                    returned_length,
                )
            },
        }
    }

    fn get_processor_mhz(&self, processor_index: u32) -> Option<u32> {
        match self {
            Self::Target(bindings) => bindings.get_processor_mhz(processor_index),
            #[cfg(test)]
            Self::Mock(bindings) => bindings.get_processor_mhz(processor_index),
        }
    }
}

impl Debug for BindingsFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
