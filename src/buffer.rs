use crate::host::{FrameHandle, TypeHandle};

/// Slots every record carries beyond its frames: the count slot, the dedup
/// slot, and the type slot.
pub(crate) const RECORD_OVERHEAD: usize = 3;

const INITIAL_CAPACITY: usize = 1024;

/// Append-only storage for variable-length stack records.
///
/// Records are flattened into two parallel word buffers that always share the
/// same length and the same record offsets: the frame buffer holds handle bit
/// patterns, the line buffer holds signed line numbers. Each record is encoded
/// as `[frame_count] [slot_0 .. slot_{n-1}] [dedup_slot = 0] [type]` in both
/// buffers, and record boundaries are recomputed from the counts rather than
/// stored. Growth doubles capacity until a pending append fits; it never
/// moves or reorders logically written records, so previously computed
/// offsets stay valid.
#[derive(Debug)]
pub struct SampleBuffer {
  capacity: usize,
  frames: Vec<u64>,
  lines: Vec<i64>,
  record_count: u64,
}

impl Default for SampleBuffer {
  fn default() -> Self {
    Self::new()
  }
}

impl SampleBuffer {
  /// Append one stack record. The stack is ordered innermost frame first.
  ///
  /// Growth failure aborts the process through the global allocator; a record
  /// is never observable partially written.
  pub fn append(
    &mut self,
    stack: &[(FrameHandle, i64)],
    allocated_type: TypeHandle,
  ) {
    self.ensure_capacity(stack.len() + RECORD_OVERHEAD);

    self.frames.push(stack.len() as u64);
    self.lines.push(stack.len() as i64);

    for &(frame, line) in stack {
      self.frames.push(frame.bits());
      self.lines.push(line);
    }

    // Dedup slot, reserved for in-place annotation by later passes.
    self.frames.push(0);
    self.lines.push(0);

    // The type lands in both buffers so either one can validate a walk.
    self.frames.push(allocated_type.bits());
    self.lines.push(allocated_type.bits() as i64);

    self.record_count += 1;
  }

  #[must_use]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  fn ensure_capacity(&mut self, additional: usize) {
    let needed = self.frames.len() + additional;

    if needed <= self.capacity {
      return;
    }

    while self.capacity < needed {
      self.capacity *= 2;
    }

    self.frames.reserve(self.capacity - self.frames.len());
    self.lines.reserve(self.capacity - self.lines.len());
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  /// Number of words written to each of the parallel buffers.
  #[must_use]
  pub fn len(&self) -> usize {
    debug_assert_eq!(self.frames.len(), self.lines.len());
    self.frames.len()
  }

  #[must_use]
  pub fn new() -> Self {
    Self::with_capacity(INITIAL_CAPACITY)
  }

  /// Borrow the record starting at `offset`.
  ///
  /// `offset` must be a record boundary previously observed through
  /// [`SampleBuffer::records`].
  #[must_use]
  pub fn record_at(&self, offset: usize) -> RecordView<'_> {
    let frame_count = self.frames[offset] as usize;
    let end = offset + frame_count + RECORD_OVERHEAD;

    RecordView {
      frame_words: &self.frames[offset..end],
      line_words: &self.lines[offset..end],
      offset,
    }
  }

  #[must_use]
  pub fn record_count(&self) -> u64 {
    self.record_count
  }

  /// Walk all records in append order.
  #[must_use]
  pub fn records(&self) -> Records<'_> {
    Records {
      buffer: self,
      offset: 0,
    }
  }

  #[must_use]
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      frames: Vec::new(),
      lines: Vec::new(),
      record_count: 0,
    }
  }
}

/// Borrowed view of one encoded record.
///
/// The underlying slices span the whole record including the count slot and
/// the trailing dedup and type slots.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
  pub(crate) frame_words: &'a [u64],
  pub(crate) line_words: &'a [i64],
  pub(crate) offset: usize,
}

impl<'a> RecordView<'a> {
  #[must_use]
  pub fn allocated_type(&self) -> TypeHandle {
    TypeHandle(self.frame_words[self.frame_count() + 2])
  }

  #[must_use]
  pub fn frame_count(&self) -> usize {
    self.frame_words[0] as usize
  }

  /// Iterate the `(frame, line)` pairs of this record, innermost first.
  pub fn frames(&self) -> impl Iterator<Item = (FrameHandle, i64)> + 'a {
    let frame_count = self.frame_count();

    self.frame_words[1..=frame_count]
      .iter()
      .zip(&self.line_words[1..=frame_count])
      .map(|(&bits, &line)| (FrameHandle(bits), line))
  }

  #[must_use]
  pub fn offset(&self) -> usize {
    self.offset
  }
}

/// Iterator over record boundaries, yielding one view per record.
#[derive(Debug)]
pub struct Records<'a> {
  buffer: &'a SampleBuffer,
  offset: usize,
}

impl<'a> Iterator for Records<'a> {
  type Item = RecordView<'a>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.offset >= self.buffer.len() {
      return None;
    }

    let view = self.buffer.record_at(self.offset);
    self.offset += view.frame_count() + RECORD_OVERHEAD;
    Some(view)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn stack(pairs: &[(u64, i64)]) -> Vec<(FrameHandle, i64)> {
    pairs
      .iter()
      .map(|&(bits, line)| (FrameHandle(bits), line))
      .collect()
  }

  #[test]
  fn encodes_count_dedup_and_type_slots() {
    let mut buffer = SampleBuffer::new();
    buffer.append(&stack(&[(0xa, 10), (0xb, 20)]), TypeHandle(7));

    assert_eq!(buffer.len(), 5);

    let record = buffer.record_at(0);
    assert_eq!(record.frame_count(), 2);
    assert_eq!(record.allocated_type(), TypeHandle(7));
    assert_eq!(record.frame_words, &[2, 0xa, 0xb, 0, 7]);
    assert_eq!(record.line_words, &[2, 10, 20, 0, 7]);
  }

  #[test]
  fn parallel_buffers_share_length_and_offsets() {
    let mut buffer = SampleBuffer::new();
    buffer.append(&stack(&[(0xa, 1)]), TypeHandle(1));
    buffer.append(&stack(&[(0xb, 2), (0xc, 3), (0xd, 4)]), TypeHandle(2));
    buffer.append(&[], TypeHandle(3));

    let offsets: Vec<usize> =
      buffer.records().map(|record| record.offset()).collect();
    assert_eq!(offsets, vec![0, 4, 10]);
    assert_eq!(buffer.record_count(), 3);
    assert_eq!(buffer.len(), 13);
  }

  #[test]
  fn doubling_growth_preserves_existing_records() {
    let mut buffer = SampleBuffer::with_capacity(4);
    buffer.append(&stack(&[(0x1, 1)]), TypeHandle(9));

    let before: Vec<u64> = buffer.record_at(0).frame_words.to_vec();

    // Deep enough to force several doublings.
    let deep: Vec<(FrameHandle, i64)> =
      (1..=64).map(|index| (FrameHandle(index), index as i64)).collect();
    buffer.append(&deep, TypeHandle(9));

    assert!(buffer.capacity() >= buffer.len());
    assert_eq!(buffer.record_at(0).frame_words, before.as_slice());
    assert_eq!(buffer.records().count(), 2);
  }

  #[test]
  fn records_negative_line_numbers() {
    let mut buffer = SampleBuffer::new();
    buffer.append(&stack(&[(0x5, -1)]), TypeHandle(1));

    let record = buffer.record_at(0);
    let frames: Vec<_> = record.frames().collect();
    assert_eq!(frames, vec![(FrameHandle(0x5), -1)]);
  }
}
