use std::fmt::Debug;
use std::io;

/// Bindings for FFI calls into the operating system.
///
/// All PAL FFI calls must go through this trait, enabling them to be mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Bindings: Debug + Send + Sync + 'static {
    // sysconf(_SC_NPROCESSORS_ONLN)
    fn online_processor_count(&self) -> Result<usize, io::Error>;
}
