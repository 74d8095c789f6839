//! Platform Abstraction Layer (PAL). All access to the operating system and to the processor's
//! feature query instruction goes through this layer, so that everything above it can be tested
//! against mock or fake platforms.

mod abstractions;
pub(crate) use abstractions::*;

mod cpuid;
pub(crate) use cpuid::*;

mod facade;
pub(crate) use facade::*;

#[cfg(all(target_os = "linux", not(miri)))]
mod linux;
#[cfg(all(target_os = "linux", not(miri)))]
pub(crate) use linux::*;

#[cfg(all(windows, not(miri)))]
mod windows;
#[cfg(all(windows, not(miri)))]
pub(crate) use windows::*;

// The fallback module is compiled in test mode on all platforms, under Miri, and as the primary
// implementation on unsupported platforms. It is only glob-imported when it is the primary
// implementation. Elsewhere it must be accessed via the explicit path `fallback::`.
#[cfg(any(test, miri, not(any(target_os = "linux", windows))))]
pub(crate) mod fallback;

#[cfg(any(miri, not(any(target_os = "linux", windows))))]
pub(crate) use fallback::*;
