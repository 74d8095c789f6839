#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Point-in-time snapshot of the processor topology, cache hierarchy, clock frequencies and
//! instruction set extensions of the current system.
//!
//! A [`Snapshot`] tells you:
//!
//! * How many logical cores the operating system schedules on and which physical cores host
//!   them, including performance/efficiency classification on heterogeneous systems.
//! * The L1 and L2 cache size of every logical core, how many logical cores share each L2 cache
//!   instance and the size of the shared L3 cache.
//! * The current clock frequency of every logical core.
//! * The vendor and brand of the processor and which x86 instruction set extensions it supports.
//!
//! # Example
//!
//! ```
//! use cpu_snapshot::{Feature, build_snapshot};
//!
//! let snapshot = build_snapshot()?;
//!
//! println!("{}", snapshot.brand());
//!
//! for core in snapshot.physical_cores() {
//!     println!(
//!         "physical core {} ({}): logical cores {:?}",
//!         core.id(),
//!         core.class(),
//!         core.logical_core_indices()
//!     );
//! }
//!
//! if snapshot.features().contains(Feature::Avx2) {
//!     println!("AVX2 is supported");
//! }
//! # Ok::<(), cpu_snapshot::Error>(())
//! ```
//!
//! # Testing
//!
//! Code that consumes snapshots can be tested against fake hardware by accepting a
//! [`SnapshotSource`] and passing [`SnapshotSource::fake()`] in tests. This requires the
//! `test-util` Cargo feature, which exposes the [`fake`] module.
//!
//! # C surface
//!
//! The library is also built as a C dynamic library exporting [`get_cpu_data()`] and
//! [`free_cpu_data()`], which exchange a flat [`CpuData`] record and report failures as numeric
//! status codes (see [`Error::status_code()`]).
//!
//! # Platform support
//!
//! Topology, cache and frequency data is read from sysfs on Linux and from the system
//! information APIs and registry on Windows. On other platforms every logical core is reported
//! as its own physical core without cache or frequency data. Instruction set extensions are only
//! detected on x86 and x86-64.

mod cache;
mod error;
mod features;
mod ffi;
mod primitive_types;
mod snapshot;
mod topology;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub(crate) mod pal;

pub use cache::*;
pub use error::*;
pub use features::*;
pub use ffi::*;
pub use primitive_types::*;
pub use snapshot::{Snapshot, SnapshotSource, build_snapshot};
pub use topology::*;

pub(crate) use features::{query_brand_string, query_vendor_string};
