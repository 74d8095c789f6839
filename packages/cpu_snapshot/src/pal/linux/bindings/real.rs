use std::fmt::Debug;
use std::io;

use crate::pal::linux::Bindings;

/// FFI bindings that target the real operating system that the build is targeting.
///
/// You would only use different bindings in PAL unit tests that need to use mock bindings.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

// Real OS bindings are excluded from coverage measurement because they are only reachable on
// actual Linux and their error paths require OS-level failures.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Bindings for BuildTargetBindings {
    fn online_processor_count(&self) -> Result<usize, io::Error> {
        // SAFETY: No safety requirements.
        let result = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };

        // -1 signals failure, with the reason in errno.
        usize::try_from(result).map_err(|_| io::Error::last_os_error())
    }
}
