// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A growable, contiguous byte buffer with `get`/`put` cursors (§4.1).
//!
//! Invariant: the readable span is `[get, put)`, the writable span is
//! `[put, cap)`, and `get <= put <= cap` always holds. `peek`/`read` never
//! copy; the slices they return stay valid until the next `skip`,
//! compaction, or `reserve`.

use std::alloc::{self, Layout};
use std::io::{self, Write};
use std::ptr::{self, NonNull};

const COMPACTION_BLOCK: usize = 4096;

/// Contiguous read/write byte buffer used for each Connection's inbound and
/// outbound data (§3 Buffer).
#[derive(Debug)]
pub struct Buffer {
    ptr: NonNull<u8>,
    cap: usize,
    get: usize,
    put: usize,
}

// Safety: Buffer owns its allocation outright and is only ever accessed by
// the single worker holding the owning Connection captured (§4.1).
unsafe impl Send for Buffer {}

impl Buffer {
    /// Creates an empty buffer; the first `reserve` or `write` performs the
    /// initial allocation.
    pub fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            cap: 0,
            get: 0,
            put: 0,
        }
    }

    /// Creates a buffer pre-sized to hold at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Self::new();
        if capacity > 0 {
            buf.reserve(capacity);
        }
        buf
    }

    /// Bytes currently available to read.
    #[inline]
    pub fn len(&self) -> usize {
        self.put - self.get
    }

    /// Whether there is nothing left to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.get == self.put
    }

    /// Space available for writing without growing.
    #[inline]
    pub fn writable(&self) -> usize {
        self.cap - self.put
    }

    /// Borrows up to `n` readable bytes without consuming them.
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        let n = n.min(self.len());
        if n == 0 && self.len() == 0 {
            return None;
        }
        // Safety: `get + n <= put <= cap`, so the range lies within the
        // single allocation backing `ptr`.
        Some(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(self.get), n) })
    }

    /// Discards `n` readable bytes (or fewer, if fewer remain).
    pub fn skip(&mut self, n: usize) {
        self.get = self.put.min(self.get + n);
        self.compact();
    }

    /// Borrows up to `n` readable bytes and marks them consumed in one step.
    /// Does not compact, so the returned slice stays valid until the next
    /// `skip` or `reserve` call (the only two places compaction happens).
    pub fn read(&mut self, n: usize) -> Option<&[u8]> {
        let n = n.min(self.len());
        if n == 0 {
            return None;
        }
        let start = self.get;
        self.get += n;
        // Safety: `start + n <= put <= cap`, so the range lies within the
        // single allocation backing `ptr`.
        Some(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(start), n) })
    }

    /// Ensures at least `n` additional bytes of writable space exist,
    /// compacting first to reclaim already-consumed space, then growing in
    /// `4 KiB` blocks if compaction alone isn't enough.
    pub fn reserve(&mut self, n: usize) {
        if self.writable() >= n {
            return;
        }
        self.compact();
        if self.writable() >= n {
            return;
        }
        let needed = self.put + n;
        let blocks = (needed + COMPACTION_BLOCK - 1) / COMPACTION_BLOCK;
        let new_cap = (blocks * COMPACTION_BLOCK).max(COMPACTION_BLOCK);
        self.grow_to(new_cap);
    }

    /// Returns the writable tail as a mutable slice, for callers (e.g. a
    /// socket read) that fill it directly before calling `advance_put`.
    pub fn writable_slice(&mut self) -> &mut [u8] {
        // Safety: `[put, cap)` is writable space within the single
        // allocation; no outstanding read borrow can alias it because reads
        // only ever cover `[get, put)`.
        unsafe {
            std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(self.put), self.cap - self.put)
        }
    }

    /// Marks `n` bytes of previously-written space as readable.
    pub fn advance_put(&mut self, n: usize) {
        self.put = self.cap.min(self.put + n);
    }

    /// Appends `bytes` to the buffer, growing if necessary.
    pub fn write(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        // Safety: `reserve` guarantees `writable() >= bytes.len()`.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(self.put), bytes.len());
        }
        self.put += bytes.len();
    }

    fn grow_to(&mut self, new_cap: usize) {
        assert!(new_cap <= isize::MAX as usize);
        let new_layout = Layout::array::<u8>(new_cap).unwrap();
        let new_ptr = if self.cap == 0 {
            // Safety: layout is non-zero-sized; allocation failure is
            // handled below.
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = Layout::array::<u8>(self.cap).unwrap();
            // Safety: `self.ptr` was allocated with `old_layout`.
            unsafe { alloc::realloc(self.ptr.as_ptr(), old_layout, new_layout.size()) }
        };

        self.ptr = match NonNull::new(new_ptr) {
            Some(p) => p,
            None => alloc::handle_alloc_error(new_layout),
        };
        self.cap = new_cap;
    }

    /// Compacts the buffer by moving the readable span to the front,
    /// reclaiming space consumed by `skip`/`read`. Allowed only when
    /// `get > 0` and there is no outstanding borrow of the readable span
    /// (enforced by callers: `peek`'s result must not outlive the next
    /// mutating call).
    fn compact(&mut self) {
        if self.get == 0 {
            return;
        }
        if self.get == self.put {
            self.get = 0;
            self.put = 0;
            return;
        }
        let remaining = self.len();
        // Safety: `[get, put)` and `[0, remaining)` both lie within the
        // single allocation backing `ptr`; regions may overlap, so
        // `copy` (not `copy_nonoverlapping`) is required.
        unsafe {
            ptr::copy(
                self.ptr.as_ptr().add(self.get),
                self.ptr.as_ptr(),
                remaining,
            );
        }
        self.get = 0;
        self.put = remaining;
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.cap != 0 {
            let layout = Layout::array::<u8>(self.cap).unwrap();
            // Safety: `ptr` was allocated with this layout and never
            // shared.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) }
        }
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Buffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
