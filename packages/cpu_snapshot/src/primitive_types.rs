use derive_more::Display;

/// Index of a logical core, as numbered by the operating system.
///
/// Logical cores are the schedulable execution contexts the operating system sees. Several of
/// them may share one physical core via hardware multithreading.
pub type LogicalCoreIndex = u32;

/// Opaque platform-specific identifier of a physical core.
///
/// On Linux this is derived from the package and core IDs exposed in sysfs. On Windows it is the
/// index of the topology record that describes the core. The value has no meaning beyond telling
/// physical cores of the same snapshot apart.
pub type PhysicalCoreId = u32;

/// Classification of a physical core on systems with heterogeneous cores.
///
/// Systems that do not report heterogeneous-core data (which is most of them) classify every
/// core as [`CoreClass::Unknown`].
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "mirroring the two-tier structure of platform APIs plus the absence of data"
)]
pub enum CoreClass {
    /// A core that is optimized for performance at the expense of energy efficiency.
    #[display("performance")]
    Performance,

    /// A core that is optimized for energy efficiency at the expense of performance.
    #[display("efficiency")]
    Efficiency,

    /// The platform did not provide heterogeneous-core classification data.
    #[default]
    #[display("unknown")]
    Unknown,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_class_is_unknown() {
        assert_eq!(CoreClass::default(), CoreClass::Unknown);
    }

    #[test]
    fn class_display() {
        assert_eq!(CoreClass::Performance.to_string(), "performance");
        assert_eq!(CoreClass::Efficiency.to_string(), "efficiency");
        assert_eq!(CoreClass::Unknown.to_string(), "unknown");
    }
}
