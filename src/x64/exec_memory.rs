//! Executable memory regions for generated stubs.
//!
//! Code is copied into a private anonymous mapping while it is writable, then the
//! mapping is switched to read+execute. The region is unmapped on drop.

use crate::core::TrampolineError;

pub struct ExecutableMemory {
    ptr: *mut u8,
    len: usize,
}

impl ExecutableMemory {
    /// Map a region holding a copy of `code`.
    #[cfg(unix)]
    pub fn from_code(code: &[u8]) -> Result<Self, TrampolineError> {
        if code.is_empty() {
            return Err(TrampolineError::ExecutableMemory(
                "cannot create executable region for empty code".to_string(),
            ));
        }
        let len = round_to_page(code.len());
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(TrampolineError::ExecutableMemory(format!(
                "mmap failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        // Owned from here so every error path unmaps.
        let memory = Self {
            ptr: ptr as *mut u8,
            len,
        };
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), memory.ptr, code.len());
        }
        let rc = unsafe { libc::mprotect(ptr, len, libc::PROT_READ | libc::PROT_EXEC) };
        if rc != 0 {
            return Err(TrampolineError::ExecutableMemory(format!(
                "mprotect failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        log::debug!("mapped {} bytes of code at {:p}", code.len(), memory.ptr);
        Ok(memory)
    }

    #[cfg(not(unix))]
    pub fn from_code(_code: &[u8]) -> Result<Self, TrampolineError> {
        Err(TrampolineError::UnsupportedTarget)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(unix)]
impl Drop for ExecutableMemory {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
        if rc != 0 {
            log::warn!("munmap failed: {}", std::io::Error::last_os_error());
        }
    }
}

#[cfg(unix)]
fn round_to_page(len: usize) -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page = if page > 0 { page as usize } else { 4096 };
    len.div_ceil(page) * page
}
