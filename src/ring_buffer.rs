use crate::error::Error;
use log::trace;
use std::fmt;
use std::io;

type WrapObserver = Box<dyn FnMut() + Send>;

/// Handle returned by [`RingBuffer::on_wrap`], used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrapObserverId(u64);

/// Fixed-capacity byte ring used as a write cursor for journal data.
///
/// Every write goes through [`RingBuffer::write_byte`]. When the byte at the last
/// offset is stored the wrap observers run, then the cursor returns to 0.
/// Multi-byte integers are written little-endian.
pub struct RingBuffer {
    buffer: Box<[u8]>,
    cursor: usize,
    observers: Vec<(WrapObserverId, WrapObserver)>,
    next_observer_id: u64,
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.buffer.len())
            .field("cursor", &self.cursor)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        Ok(Self {
            buffer: vec![0; capacity].into_boxed_slice(),
            cursor: 0,
            observers: Vec::new(),
            next_observer_id: 0,
        })
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Move the cursor so the next write lands at `value`.
    pub fn set_position(&mut self, value: usize) -> Result<(), Error> {
        if value >= self.buffer.len() {
            return Err(Error::OutOfRange {
                value,
                size: self.buffer.len(),
            });
        }
        self.cursor = value;
        Ok(())
    }

    /// Register a callback fired synchronously on every wrap, in registration order.
    pub fn on_wrap<F>(&mut self, observer: F) -> WrapObserverId
    where
        F: FnMut() + Send + 'static,
    {
        let id = WrapObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns `false` if the observer was already removed.
    pub fn remove_wrap_observer(&mut self, id: WrapObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Store one byte at the cursor and advance it. Returns `true` if the buffer wrapped.
    pub fn write_byte(&mut self, value: u8) -> bool {
        self.buffer[self.cursor] = value;

        if self.cursor == self.buffer.len() - 1 {
            trace!("ring buffer of {} bytes wrapped", self.buffer.len());
            for (_, observer) in self.observers.iter_mut() {
                observer();
            }
            self.cursor = 0;
            true
        } else {
            self.cursor += 1;
            false
        }
    }

    pub fn write_i32(&mut self, value: i32) -> bool {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> bool {
        self.write_slice(&value.to_le_bytes())
    }

    /// Write `input[offset..offset + count]`.
    ///
    /// The range is checked before anything is written, so an error leaves the
    /// buffer untouched.
    pub fn write_bytes(
        &mut self,
        input: &[u8],
        offset: usize,
        count: usize,
    ) -> Result<bool, Error> {
        let end = offset
            .checked_add(count)
            .filter(|&end| end <= input.len())
            .ok_or(Error::IndexOutOfRange {
                index: offset.saturating_add(count),
                len: input.len(),
            })?;
        Ok(self.write_slice(&input[offset..end]))
    }

    /// Write every byte of `data`. Returns `true` if any byte wrapped the buffer.
    pub fn write_slice(&mut self, data: &[u8]) -> bool {
        // No short-circuit: every byte must be written.
        data.iter().fold(false, |wrapped, &b| self.write_byte(b) | wrapped)
    }

    /// Raw positional read, independent of the cursor.
    pub fn read_at(&self, index: usize) -> Result<u8, Error> {
        self.buffer.get(index).copied().ok_or(Error::IndexOutOfRange {
            index,
            len: self.buffer.len(),
        })
    }

    /// The whole backing storage.
    pub fn as_array(&self) -> &[u8] {
        &self.buffer
    }

    /// Mutable view of the backing storage; changes are seen by later reads.
    pub fn as_array_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

impl io::Write for RingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
