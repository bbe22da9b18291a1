//! Fixed-capacity slot allocator handing out small integer handles.

use crate::{ConfigError, ConfigResult};

/// Returned by [`HandleAllocator::alloc`] when every slot is taken.
pub const INVALID_HANDLE: u32 = u32::MAX;

/// Allocates handles `0..capacity`.
///
/// Fresh handles come out in ascending order; freed handles are reused
/// last-in first-out.
#[derive(Debug, Clone)]
pub struct HandleAllocator {
    capacity: u32,
    next_fresh: u32,
    free_list: Vec<u32>,
    live: Vec<bool>,
}

impl HandleAllocator {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            next_fresh: 0,
            free_list: Vec::new(),
            live: vec![false; capacity as usize],
        }
    }

    /// Take a handle, or [`INVALID_HANDLE`] when the allocator is full.
    pub fn alloc(&mut self) -> u32 {
        let handle = if let Some(handle) = self.free_list.pop() {
            handle
        } else if self.next_fresh < self.capacity {
            self.next_fresh += 1;
            self.next_fresh - 1
        } else {
            return INVALID_HANDLE;
        };
        self.live[handle as usize] = true;
        handle
    }

    /// Return a handle to the pool.
    ///
    /// Freeing a handle that was never allocated, or freeing twice, is a
    /// precondition violation and reported as an error.
    pub fn free(&mut self, handle: u32) -> ConfigResult<()> {
        if handle >= self.next_fresh {
            return Err(ConfigError::InvalidHandle { handle });
        }
        if !self.live[handle as usize] {
            return Err(ConfigError::DoubleFree { handle });
        }
        self.live[handle as usize] = false;
        self.free_list.push(handle);
        Ok(())
    }

    pub fn is_live(&self, handle: u32) -> bool {
        self.live.get(handle as usize).copied().unwrap_or(false)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of handles currently allocated.
    pub fn live_count(&self) -> usize {
        self.next_fresh as usize - self.free_list.len()
    }
}
