use std::fmt::Debug;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use crate::pal::linux::MockFilesystem;
use crate::pal::linux::{BuildTargetFilesystem, Filesystem};

/// Enum to hide the different filesystem implementations behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum FilesystemFacade {
    Target(&'static BuildTargetFilesystem),

    #[cfg(test)]
    Mock(Arc<MockFilesystem>),
}

impl FilesystemFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetFilesystem)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockFilesystem) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Filesystem for FilesystemFacade {
    fn get_cpu_online_contents(&self) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_cpu_online_contents(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cpu_online_contents(),
        }
    }

    fn get_physical_package_id_contents(&self, cpu_index: u32) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_physical_package_id_contents(cpu_index),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_physical_package_id_contents(cpu_index),
        }
    }

    fn get_core_id_contents(&self, cpu_index: u32) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_core_id_contents(cpu_index),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_core_id_contents(cpu_index),
        }
    }

    fn get_cache_level_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_cache_level_contents(cpu_index, cache_index),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cache_level_contents(cpu_index, cache_index),
        }
    }

    fn get_cache_type_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_cache_type_contents(cpu_index, cache_index),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cache_type_contents(cpu_index, cache_index),
        }
    }

    fn get_cache_size_contents(&self, cpu_index: u32, cache_index: u32) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_cache_size_contents(cpu_index, cache_index),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cache_size_contents(cpu_index, cache_index),
        }
    }

    fn get_cache_shared_cpu_list_contents(
        &self,
        cpu_index: u32,
        cache_index: u32,
    ) -> Option<String> {
        match self {
            Self::Target(filesystem) => {
                filesystem.get_cache_shared_cpu_list_contents(cpu_index, cache_index)
            }
            #[cfg(test)]
            Self::Mock(mock) => mock.get_cache_shared_cpu_list_contents(cpu_index, cache_index),
        }
    }

    fn get_scaling_cur_freq_contents(&self, cpu_index: u32) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_scaling_cur_freq_contents(cpu_index),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_scaling_cur_freq_contents(cpu_index),
        }
    }

    fn get_hybrid_core_cpus_contents(&self) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_hybrid_core_cpus_contents(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_hybrid_core_cpus_contents(),
        }
    }

    fn get_hybrid_atom_cpus_contents(&self) -> Option<String> {
        match self {
            Self::Target(filesystem) => filesystem.get_hybrid_atom_cpus_contents(),
            #[cfg(test)]
            Self::Mock(mock) => mock.get_hybrid_atom_cpus_contents(),
        }
    }
}

impl Debug for FilesystemFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
