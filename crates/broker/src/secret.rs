//! In-memory credential buffer.
//!
//! Storage is allocated once at full capacity and only ever holds printable
//! ASCII, so pushes never reallocate and leave no stale copies behind. The
//! bytes are zeroed on every clear and on drop.

use std::fmt;

use zeroize::{Zeroize, Zeroizing};

pub struct SecretBuffer {
    buf: String,
    capacity: usize,
}

impl SecretBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a printable ASCII character. Returns false when the character
    /// is not accepted or the buffer is full.
    pub fn push(&mut self, ch: char) -> bool {
        if !is_secret_char(ch) || self.buf.len() >= self.capacity {
            return false;
        }
        self.buf.push(ch);
        true
    }

    pub fn pop(&mut self) -> bool {
        match self.buf.pop() {
            Some(_) => {
                // the popped byte is still in the allocation past len
                self.wipe_spare();
                true
            }
            None => false,
        }
    }

    /// Zero the contents and reset the length.
    pub fn clear(&mut self) {
        self.buf.zeroize();
        self.wipe_spare();
    }

    /// Move the contents out, leaving the buffer zeroed and empty.
    pub fn take(&mut self) -> Zeroizing<String> {
        let taken = Zeroizing::new(self.buf.clone());
        self.clear();
        taken
    }

    #[cfg(test)]
    pub fn expose(&self) -> &str {
        &self.buf
    }

    fn wipe_spare(&mut self) {
        // SAFETY: only bytes past `len` are written and zero is valid UTF-8,
        // so the string's initialised contents stay valid.
        unsafe {
            let vec = self.buf.as_mut_vec();
            let spare = vec.spare_capacity_mut();
            for byte in spare {
                byte.write(0);
            }
        }
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

pub fn is_secret_char(ch: char) -> bool {
    ch.is_ascii() && !ch.is_ascii_control()
}
