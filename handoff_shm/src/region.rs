//! Shared region: a fixed-capacity byte span visible to two processes.
//!
//! A region is either anonymous (inherited across `fork`) or named (a file
//! under `/dev/shm` that unrelated processes can open). Both are zero-filled
//! on creation, so the flag byte starts out `EMPTY`.
//!
//! The bytes are never exposed as Rust references: the only access path is
//! the crate-private flag/payload accessors used by the handoff channel.

use crate::error::{ShmError, ShmResult};
use crate::platform::{
    LinuxMemoryConfig, attach_segment_mmap, create_segment_mmap, map_anonymous_shared,
    unmap_anonymous,
};
use handoff::consts::{FLAG_OFFSET, PAYLOAD_OFFSET, SHM_DIR, SHM_MAX_SIZE, SHM_NAME_PREFIX};
use memmap2::MmapMut;
use std::ptr::NonNull;
use std::sync::atomic::AtomicU8;
use tracing::{debug, warn};

enum Backing {
    Anonymous,
    Named {
        mmap: MmapMut,
        name: String,
        /// Set on the creating handle, which removes the file on drop
        owner: bool,
    },
}

/// Shared memory region mapped into both processes of a handoff pair
pub struct SharedRegion {
    base: NonNull<u8>,
    capacity: usize,
    backing: Option<Backing>,
}

// SAFETY: the region is plain shared memory. Every access from this crate
// goes through the atomic flag or is gated by the flag protocol, which is
// what makes concurrent use from two threads (or processes) sound.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Acquire a zero-initialized anonymous region of `capacity` bytes
    ///
    /// The mapping is `MAP_SHARED`, so processes forked after this call see
    /// the same bytes rather than copy-on-write copies.
    pub fn acquire(capacity: usize) -> ShmResult<Self> {
        Self::acquire_with(capacity, &LinuxMemoryConfig::default())
    }

    /// Acquire with explicit mapping options
    pub fn acquire_with(capacity: usize, config: &LinuxMemoryConfig) -> ShmResult<Self> {
        validate_region_size(capacity)?;
        let base = map_anonymous_shared(capacity, config)?;
        debug!(capacity, "acquired anonymous shared region");

        Ok(Self {
            base,
            capacity,
            backing: Some(Backing::Anonymous),
        })
    }

    /// Create a named region at `/dev/shm/handoff_<name>`
    ///
    /// Fails with `AlreadyExists` if the file is present. The returned handle
    /// owns the file and removes it when dropped or released.
    pub fn create_named(name: &str, capacity: usize) -> ShmResult<Self> {
        validate_region_name(name)?;
        validate_region_size(capacity)?;
        let path = region_path(name);

        let mut mmap = create_segment_mmap(&path, capacity, &LinuxMemoryConfig::default())
            .map_err(|e| match e {
                ShmError::Io { source } if source.kind() == std::io::ErrorKind::AlreadyExists => {
                    ShmError::AlreadyExists {
                        name: name.to_string(),
                    }
                }
                other => other,
            })?;
        let base = NonNull::new(mmap.as_mut_ptr()).ok_or(ShmError::InvalidSize { size: capacity })?;
        debug!(name, capacity, "created named shared region");

        Ok(Self {
            base,
            capacity,
            backing: Some(Backing::Named {
                mmap,
                name: name.to_string(),
                owner: true,
            }),
        })
    }

    /// Open an existing named region; capacity is the file length
    pub fn open_named(name: &str) -> ShmResult<Self> {
        validate_region_name(name)?;
        let path = region_path(name);
        let mut mmap = attach_segment_mmap(&path).map_err(|e| match e {
            ShmError::Io { source } if source.kind() == std::io::ErrorKind::NotFound => {
                ShmError::NotFound {
                    name: name.to_string(),
                }
            }
            other => other,
        })?;

        let capacity = mmap.len();
        validate_region_size(capacity)?;
        let base = NonNull::new(mmap.as_mut_ptr()).ok_or(ShmError::InvalidSize { size: capacity })?;
        debug!(name, capacity, "opened named shared region");

        Ok(Self {
            base,
            capacity,
            backing: Some(Backing::Named {
                mmap,
                name: name.to_string(),
                owner: false,
            }),
        })
    }

    /// Total size in bytes, flag included
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes available after the flag
    pub fn payload_capacity(&self) -> usize {
        self.capacity - PAYLOAD_OFFSET
    }

    /// Name of a named region, `None` for anonymous ones
    pub fn name(&self) -> Option<&str> {
        match &self.backing {
            Some(Backing::Named { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Whether this region is file-backed
    pub fn is_named(&self) -> bool {
        self.name().is_some()
    }

    /// Unmap the region, reporting failures
    ///
    /// Only this process's mapping goes away; the partner keeps its own.
    pub fn release(mut self) -> ShmResult<()> {
        self.unmap()
    }

    fn unmap(&mut self) -> ShmResult<()> {
        match self.backing.take() {
            Some(Backing::Anonymous) => {
                // SAFETY: base/capacity came from map_anonymous_shared and the
                // backing is taken, so nothing maps it again.
                unsafe { unmap_anonymous(self.base, self.capacity) }
            }
            Some(Backing::Named { mmap, name, owner }) => {
                drop(mmap);
                if owner {
                    std::fs::remove_file(region_path(&name))?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// The flag byte as an atomic
    pub(crate) fn flag(&self) -> &AtomicU8 {
        // SAFETY: offset 0 is inside the live mapping (capacity >= 1), AtomicU8
        // has alignment 1, and the byte is only ever accessed atomically.
        unsafe { AtomicU8::from_ptr(self.base.as_ptr().add(FLAG_OFFSET)) }
    }

    /// Start of the payload area
    pub(crate) fn payload_ptr(&self) -> *mut u8 {
        // SAFETY: PAYLOAD_OFFSET <= capacity, so the result is in bounds or
        // one past the end for a zero-length payload area.
        unsafe { self.base.as_ptr().add(PAYLOAD_OFFSET) }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            warn!("failed to release shared region: {}", e);
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("capacity", &self.capacity)
            .field("name", &self.name())
            .finish()
    }
}

/// Validate region size constraints
pub fn validate_region_size(size: usize) -> ShmResult<()> {
    if size < PAYLOAD_OFFSET {
        return Err(ShmError::InvalidSize { size });
    }

    if size > SHM_MAX_SIZE {
        return Err(ShmError::InvalidSize { size });
    }

    Ok(())
}

/// Reject names that are not a single plain file name
pub fn validate_region_name(name: &str) -> ShmResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(ShmError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Filesystem path of a named region
pub fn region_path(name: &str) -> String {
    format!("{}/{}{}", SHM_DIR, SHM_NAME_PREFIX, name)
}
