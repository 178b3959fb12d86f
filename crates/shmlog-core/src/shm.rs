//! POSIX shared memory wrapper

use crate::{Error, Result};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use shared_memory::{Shmem, ShmemConf, ShmemError};

/// Shared memory region wrapper
pub struct SharedMemory {
    inner: Shmem,
    name: String,
    size: usize,
}

impl SharedMemory {
    /// Create a new shared memory region, failing if the name is taken.
    ///
    /// The returned mapping owns the name: dropping it unlinks the region.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let shmem = ShmemConf::new()
            .size(size)
            .os_id(name)
            .create()
            .map_err(|e| match e {
                ShmemError::MappingIdExists => Error::AlreadyExists(name.to_string()),
                e => Error::SharedMemory(format!("create {}: {}", name, e)),
            })?;

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            size,
        })
    }

    /// Open an existing shared memory region
    pub fn open(name: &str) -> Result<Self> {
        let shmem = ShmemConf::new()
            .os_id(name)
            .open()
            .map_err(|e| Error::SharedMemory(format!("open {}: {}", name, e)))?;

        let size = shmem.len();

        Ok(Self {
            inner: shmem,
            name: name.to_string(),
            size,
        })
    }

    /// Check whether a region with this name exists
    pub fn exists(name: &str) -> bool {
        shm_open(name, OFlag::O_RDONLY, Mode::empty()).is_ok()
    }

    /// Remove a region name. A missing name is not an error.
    pub fn unlink(name: &str) -> Result<()> {
        match shm_unlink(name) {
            Ok(()) | Err(Errno::ENOENT) => Ok(()),
            Err(e) => Err(Error::SharedMemory(format!("unlink {}: {}", name, e))),
        }
    }

    /// Get the name of the shared memory region
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of the shared memory region
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether dropping this mapping unlinks the region
    pub fn is_owner(&self) -> bool {
        self.inner.is_owner()
    }

    /// Get a raw pointer to the shared memory
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Get a mutable raw pointer to the shared memory
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.inner.as_ptr() as *mut u8
    }
}
