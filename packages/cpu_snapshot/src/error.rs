use std::collections::TryReserveError;

use derive_more::Display;
use thiserror::Error;

/// Errors that can occur when capturing a [`Snapshot`][crate::Snapshot].
///
/// Every error is terminal for the capture that produced it. Nothing is retried internally and
/// no partially populated snapshot is ever returned alongside an error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller provided a null location to write the snapshot into.
    ///
    /// Only the C surface can produce this error.
    #[error("the output location for the snapshot was null")]
    NullOutput,

    /// The operating system source of processor information could not be opened.
    #[error("platform system information source is unavailable: {problem}")]
    PlatformSourceUnavailable {
        /// A human-readable description of the problem.
        problem: String,
    },

    /// A memory allocation failed.
    #[error("memory allocation failed while {context}")]
    Allocation {
        /// What the allocation was for.
        context: &'static str,

        /// The underlying allocation failure.
        #[source]
        inner: TryReserveError,
    },

    /// An array is too long for its length to be represented over the C surface.
    #[error("{context} ({len}) does not fit in a C int")]
    LengthOverflow {
        /// What the length describes.
        context: &'static str,

        /// The length that did not fit.
        len: usize,
    },

    /// A platform topology or cache query failed or returned data in an unexpected shape.
    #[error("{failure} failed: {problem}")]
    TopologyQuery {
        /// Which stage of the query failed.
        failure: TopologyQueryFailure,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// The per-logical-core arrays could not be allocated.
    #[error("failed to allocate per-logical-core arrays for {logical_core_count} logical cores")]
    CoreArrays {
        /// The number of logical cores the arrays were sized for.
        logical_core_count: usize,

        /// The underlying allocation failure.
        #[source]
        inner: TryReserveError,
    },
}

/// The stage of a platform topology query that failed.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum TopologyQueryFailure {
    /// The buffer size probe did not report the expected "insufficient buffer" outcome.
    #[display("topology buffer size probe")]
    SizeProbe,

    /// The topology query itself failed.
    #[display("topology query")]
    Query,

    /// A topology record was truncated or otherwise malformed.
    #[display("topology record parsing")]
    MalformedRecord,

    /// The cache relationship query failed.
    #[display("cache query")]
    CacheQuery,
}

/// Broad classification of an [`Error`], independent of the specific platform details.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller supplied an invalid argument.
    InvalidArgument,

    /// The operating system topology or cache source could not be opened or returned an
    /// unexpected shape.
    PlatformQueryFailure,

    /// A heap allocation failed.
    AllocationFailure,
}

impl Error {
    pub(crate) fn allocation(context: &'static str, inner: TryReserveError) -> Self {
        Self::Allocation { context, inner }
    }

    pub(crate) fn topology_query(failure: TopologyQueryFailure, problem: impl Into<String>) -> Self {
        Self::TopologyQuery {
            failure,
            problem: problem.into(),
        }
    }

    /// The broad classification of the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NullOutput => ErrorKind::InvalidArgument,
            Self::PlatformSourceUnavailable { .. } | Self::TopologyQuery { .. } => {
                ErrorKind::PlatformQueryFailure
            }
            Self::Allocation { .. } | Self::LengthOverflow { .. } | Self::CoreArrays { .. } => {
                ErrorKind::AllocationFailure
            }
        }
    }

    /// The numeric status code that the C surface reports for this error.
    ///
    /// | Code | Meaning |
    /// |---|---|
    /// | 201 | null output pointer |
    /// | 202 | failed to open/access platform system-information source |
    /// | 203 | memory allocation failure |
    /// | 204–207 | platform-API-specific topology-query failures |
    /// | 208 | allocation failure for internal per-logical-core arrays |
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::NullOutput => 201,
            Self::PlatformSourceUnavailable { .. } => 202,
            Self::Allocation { .. } | Self::LengthOverflow { .. } => 203,
            Self::TopologyQuery { failure, .. } => match failure {
                TopologyQueryFailure::SizeProbe => 204,
                TopologyQueryFailure::Query => 205,
                TopologyQueryFailure::MalformedRecord => 206,
                TopologyQueryFailure::CacheQuery => 207,
            },
            Self::CoreArrays { .. } => 208,
        }
    }
}

/// A specialized `Result` type for snapshot operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    fn reserve_failure() -> TryReserveError {
        Vec::<u64>::new()
            .try_reserve_exact(usize::MAX)
            .expect_err("reserving usize::MAX elements of u64 can never succeed")
    }

    #[test]
    fn status_codes() {
        assert_eq!(Error::NullOutput.status_code(), 201);
        assert_eq!(
            Error::PlatformSourceUnavailable {
                problem: "gone".to_string()
            }
            .status_code(),
            202
        );
        assert_eq!(
            Error::allocation("testing", reserve_failure()).status_code(),
            203
        );
        assert_eq!(
            Error::LengthOverflow {
                context: "testing",
                len: usize::MAX
            }
            .status_code(),
            203
        );
        assert_eq!(
            Error::topology_query(TopologyQueryFailure::SizeProbe, "x").status_code(),
            204
        );
        assert_eq!(
            Error::topology_query(TopologyQueryFailure::Query, "x").status_code(),
            205
        );
        assert_eq!(
            Error::topology_query(TopologyQueryFailure::MalformedRecord, "x").status_code(),
            206
        );
        assert_eq!(
            Error::topology_query(TopologyQueryFailure::CacheQuery, "x").status_code(),
            207
        );
        assert_eq!(
            Error::CoreArrays {
                logical_core_count: 4,
                inner: reserve_failure()
            }
            .status_code(),
            208
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(Error::NullOutput.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            Error::topology_query(TopologyQueryFailure::Query, "x").kind(),
            ErrorKind::PlatformQueryFailure
        );
        assert_eq!(
            Error::CoreArrays {
                logical_core_count: 4,
                inner: reserve_failure()
            }
            .kind(),
            ErrorKind::AllocationFailure
        );
    }

    #[test]
    fn topology_query_message_names_stage() {
        let error = Error::topology_query(TopologyQueryFailure::SizeProbe, "returned 0 bytes");

        assert_eq!(
            error.to_string(),
            "topology buffer size probe failed: returned 0 bytes"
        );
    }
}
