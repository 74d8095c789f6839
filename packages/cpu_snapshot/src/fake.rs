//! Fake hardware for testing code that consumes snapshots.
//!
//! Fake hardware lets tests capture snapshots of any processor configuration, including
//! configurations whose capture fails, without requiring the actual hardware.
//!
//! Only available when the `test-util` feature is enabled.
//!
//! # Basic usage
//!
//! ```
//! use cpu_snapshot::SnapshotSource;
//! use cpu_snapshot::fake::HardwareBuilder;
//!
//! let source = SnapshotSource::fake(HardwareBuilder::from_core_counts(4, 2));
//! let snapshot = source.capture()?;
//!
//! assert_eq!(snapshot.logical_core_count(), 8);
//! assert_eq!(snapshot.physical_core_count(), 4);
//! # Ok::<(), cpu_snapshot::Error>(())
//! ```
//!
//! # Designing testable code
//!
//! To make your code testable with fake hardware, accept a [`crate::SnapshotSource`] instead of
//! always calling [`crate::build_snapshot()`].
//!
//! ```
//! use cpu_snapshot::fake::HardwareBuilder;
//! use cpu_snapshot::{CoreClass, SnapshotSource};
//!
//! fn performance_core_count(source: &SnapshotSource) -> usize {
//!     source.capture().map_or(0, |snapshot| {
//!         snapshot
//!             .physical_cores()
//!             .iter()
//!             .filter(|core| core.class() == CoreClass::Performance)
//!             .count()
//!     })
//! }
//!
//! let source = SnapshotSource::fake(
//!     HardwareBuilder::new()
//!         .physical_core(2, CoreClass::Performance)
//!         .physical_core(1, CoreClass::Efficiency)
//!         .physical_core(1, CoreClass::Efficiency),
//! );
//!
//! assert_eq!(performance_core_count(&source), 1);
//! ```
//!
//! # Simulating failures
//!
//! ```
//! use cpu_snapshot::fake::{FakeFailure, HardwareBuilder};
//! use cpu_snapshot::{SnapshotSource, TopologyQueryFailure};
//!
//! let source = SnapshotSource::fake(
//!     HardwareBuilder::from_core_counts(2, 1)
//!         .failure(FakeFailure::TopologyQuery(TopologyQueryFailure::Query)),
//! );
//!
//! assert_eq!(source.capture().unwrap_err().status_code(), 205);
//! ```
//!
//! # Isolation
//!
//! Each fake hardware instance is independent, so multiple fake instances can coexist in
//! parallel tests without interference.

mod builder;
mod platform;

pub use builder::{FakeFailure, HardwareBuilder};
pub(crate) use platform::FakePlatform;
