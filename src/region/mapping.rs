//! Mapping provider seam.
//!
//! The registry never talks to the OS directly; it asks a
//! [`MappingProvider`] for named byte buffers. `SharedMemoryProvider`
//! backs them with POSIX shared memory so sibling processes see the
//! same bytes; `LocalMemoryProvider` backs them with process-local heap
//! buffers for tests and single-process deployments.

use std::{
    cell::UnsafeCell,
    collections::HashMap,
    io,
    ptr::NonNull,
    sync::{Arc, Mutex},
};

/// A mapped, fixed-size byte buffer. Unmapping happens on drop.
pub trait Mapping: Send + Sync + std::fmt::Debug {
    /// Base address of the mapped bytes. Valid for `len()` bytes for as
    /// long as the mapping is alive, and aligned to at least 8 bytes:
    /// the metadata words at the region base are accessed atomically,
    /// so every implementation must hand out word-aligned storage.
    fn base(&self) -> NonNull<u8>;

    /// Mapped length in bytes.
    fn len(&self) -> usize;
}

/// Hands out named mappings. `create` zero-fills on first creation and
/// attaches (contents preserved) when the name already exists; `open`
/// attaches to an existing name and reports its actual size.
pub trait MappingProvider: Send + Sync {
    fn create(&self, name: &str, size: usize) -> io::Result<Arc<dyn Mapping>>;
    fn open(&self, name: &str) -> io::Result<Arc<dyn Mapping>>;
}

// LocalMemoryProvider

/// Process-local provider: named heap buffers behind a mutex. The
/// in-memory counterpart of the OS-backed provider, the same way an
/// in-memory packet channel stands in for a socket.
pub struct LocalMemoryProvider {
    segments: Mutex<HashMap<String, Arc<LocalMapping>>>,
}

impl LocalMemoryProvider {
    pub fn new() -> Self {
        Self {
            segments: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for LocalMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingProvider for LocalMemoryProvider {
    fn create(&self, name: &str, size: usize) -> io::Result<Arc<dyn Mapping>> {
        let Ok(mut segments) = self.segments.lock() else {
            return Err(io::Error::new(io::ErrorKind::Other, "segment table poisoned"));
        };
        if let Some(existing) = segments.get(name) {
            if existing.len() < size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "segment '{}' exists with {} bytes, smaller than the requested {}",
                        name,
                        existing.len(),
                        size
                    ),
                ));
            }
            return Ok(existing.clone() as Arc<dyn Mapping>);
        }
        let mapping = Arc::new(LocalMapping::zeroed(size));
        segments.insert(name.to_string(), mapping.clone());
        Ok(mapping)
    }

    fn open(&self, name: &str) -> io::Result<Arc<dyn Mapping>> {
        let Ok(segments) = self.segments.lock() else {
            return Err(io::Error::new(io::ErrorKind::Other, "segment table poisoned"));
        };
        segments
            .get(name)
            .map(|mapping| mapping.clone() as Arc<dyn Mapping>)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no segment named '{name}'"))
            })
    }
}

struct LocalMapping {
    // Word storage, not bytes: a heap `[u8]` allocation only guarantees
    // byte alignment, while the `Mapping` contract promises an 8-byte
    // aligned base for the atomic header words.
    words: UnsafeCell<Box<[u64]>>,
    len: usize,
}

impl std::fmt::Debug for LocalMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMapping").field("len", &self.len).finish()
    }
}

// SAFETY: the word buffer's address is stable (boxed slice behind an
// Arc) and all access goes through raw pointers with the crate's
// single-writer discipline; readers accept torn payload bytes per the
// shared-resource policy.
unsafe impl Send for LocalMapping {}
unsafe impl Sync for LocalMapping {}

impl LocalMapping {
    fn zeroed(size: usize) -> Self {
        let word_count = (size + 7) / 8;
        Self {
            words: UnsafeCell::new(vec![0u64; word_count].into_boxed_slice()),
            len: size,
        }
    }
}

impl Mapping for LocalMapping {
    fn base(&self) -> NonNull<u8> {
        // SAFETY: the boxed slice is owned by self; its base carries the
        // allocation's u64 alignment, satisfying the trait contract.
        unsafe { NonNull::new_unchecked((*self.words.get()).as_mut_ptr().cast::<u8>()) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

// SharedMemoryProvider

cfg_if! {
    if #[cfg(unix)] {
        /// POSIX shared-memory provider (`shm_open` + `mmap`). Segment
        /// names get a leading `/` as the OS requires; the kernel keeps
        /// a segment alive while any process holds it open.
        pub struct SharedMemoryProvider;

        impl SharedMemoryProvider {
            pub fn new() -> Self {
                Self
            }

            fn shm_name(name: &str) -> io::Result<std::ffi::CString> {
                if name.contains('/') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("shared memory name '{name}' must not contain '/'"),
                    ));
                }
                std::ffi::CString::new(format!("/{name}"))
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL"))
            }

            fn map_fd(fd: libc::c_int, size: usize) -> io::Result<NonNull<u8>> {
                // SAFETY: fd is a valid shm descriptor sized to at least
                // `size` bytes; a MAP_SHARED mapping outlives the fd.
                let addr = unsafe {
                    libc::mmap(
                        std::ptr::null_mut(),
                        size,
                        libc::PROT_READ | libc::PROT_WRITE,
                        libc::MAP_SHARED,
                        fd,
                        0,
                    )
                };
                if addr == libc::MAP_FAILED {
                    return Err(io::Error::last_os_error());
                }
                NonNull::new(addr as *mut u8)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))
            }
        }

        impl Default for SharedMemoryProvider {
            fn default() -> Self {
                Self::new()
            }
        }

        impl MappingProvider for SharedMemoryProvider {
            fn create(&self, name: &str, size: usize) -> io::Result<Arc<dyn Mapping>> {
                let cname = Self::shm_name(name)?;
                // SAFETY: cname is a valid NUL-terminated string.
                let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600) };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }

                // A fresh segment has length zero and must be grown; an
                // existing one keeps its contents and must already fit.
                // SAFETY: fd is valid; zeroed stat buffer is what fstat expects.
                let existing = unsafe {
                    let mut stat: libc::stat = std::mem::zeroed();
                    if libc::fstat(fd, &mut stat) == -1 {
                        let err = io::Error::last_os_error();
                        libc::close(fd);
                        return Err(err);
                    }
                    stat.st_size as usize
                };
                if existing == 0 {
                    // SAFETY: fd is valid and writable.
                    if unsafe { libc::ftruncate(fd, size as libc::off_t) } == -1 {
                        let err = io::Error::last_os_error();
                        // SAFETY: fd is valid.
                        unsafe { libc::close(fd) };
                        return Err(err);
                    }
                } else if existing < size {
                    // SAFETY: fd is valid.
                    unsafe { libc::close(fd) };
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!(
                            "segment '{name}' exists with {existing} bytes, smaller than the requested {size}"
                        ),
                    ));
                }

                let mapped = Self::map_fd(fd, size);
                // SAFETY: fd is valid; the mapping stays valid after close.
                unsafe { libc::close(fd) };
                let base = mapped?;
                Ok(Arc::new(SharedMapping { base, len: size }))
            }

            fn open(&self, name: &str) -> io::Result<Arc<dyn Mapping>> {
                let cname = Self::shm_name(name)?;
                // SAFETY: cname is a valid NUL-terminated string.
                let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0) };
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }

                // The segment's real size is recovered from the fd, so
                // attaching needs no caller-supplied size.
                // SAFETY: fd is valid; zeroed stat buffer is what fstat expects.
                let size = unsafe {
                    let mut stat: libc::stat = std::mem::zeroed();
                    if libc::fstat(fd, &mut stat) == -1 {
                        let err = io::Error::last_os_error();
                        libc::close(fd);
                        return Err(err);
                    }
                    stat.st_size as usize
                };
                if size == 0 {
                    // SAFETY: fd is valid.
                    unsafe { libc::close(fd) };
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("segment '{name}' exists but has zero size"),
                    ));
                }

                let mapped = Self::map_fd(fd, size);
                // SAFETY: fd is valid; the mapping stays valid after close.
                unsafe { libc::close(fd) };
                let base = mapped?;
                Ok(Arc::new(SharedMapping { base, len: size }))
            }
        }

        struct SharedMapping {
            base: NonNull<u8>,
            len: usize,
        }

        // SAFETY: the mapping is valid for the struct's lifetime and all
        // access goes through raw pointers; cross-thread and cross-process
        // payload races are accepted per the shared-resource policy.
        unsafe impl Send for SharedMapping {}
        unsafe impl Sync for SharedMapping {}

        impl std::fmt::Debug for SharedMapping {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct("SharedMapping").field("len", &self.len).finish()
            }
        }

        impl Mapping for SharedMapping {
            fn base(&self) -> NonNull<u8> {
                self.base
            }

            fn len(&self) -> usize {
                self.len
            }
        }

        impl Drop for SharedMapping {
            fn drop(&mut self) {
                // SAFETY: base/len describe a live mapping created by mmap.
                if unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) } == -1 {
                    log::warn!(
                        "failed to unmap shared memory segment: {}",
                        io::Error::last_os_error()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_create_zero_fills() {
        let provider = LocalMemoryProvider::new();
        let mapping = provider.create("zeros", 32).expect("create");
        let mut buf = vec![0xFFu8; 32];
        // SAFETY: the mapping is 32 bytes long.
        unsafe {
            std::ptr::copy_nonoverlapping(mapping.base().as_ptr(), buf.as_mut_ptr(), 32);
        }
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn local_create_attaches_to_existing() {
        let provider = LocalMemoryProvider::new();
        let first = provider.create("attach", 16).expect("create");
        // SAFETY: the mapping is 16 bytes long.
        unsafe { *first.base().as_ptr() = 0x5A };
        let second = provider.create("attach", 16).expect("re-create");
        // SAFETY: the mapping is 16 bytes long.
        assert_eq!(unsafe { *second.base().as_ptr() }, 0x5A);
    }

    #[test]
    fn local_open_of_unknown_name_fails() {
        let provider = LocalMemoryProvider::new();
        let err = provider.open("missing").expect_err("should not open");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn local_open_reports_actual_size() {
        let provider = LocalMemoryProvider::new();
        provider.create("sized", 48).expect("create");
        let reopened = provider.open("sized").expect("open");
        assert_eq!(reopened.len(), 48);
    }
}
