use std::cmp::Ordering;

use crate::buffer::SampleBuffer;
use crate::host::{FrameHandle, TypeHandle};

/// One deduplicated call stack with its occurrence count.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UniqueStack {
  pub allocated_type: TypeHandle,
  /// `(frame, line)` pairs, innermost frame first.
  pub frames: Vec<(FrameHandle, i64)>,
  pub occurrence_count: u64,
}

/// Collapse identical stack records into unique stacks with counts.
///
/// Records compare equal iff their frame counts, frame identities, line
/// numbers, and allocated types all match. The output is ordered by the sort
/// order of the comparator, not by append order, and is deterministic for a
/// given buffer content.
#[must_use]
pub fn aggregate(buffer: &SampleBuffer) -> Vec<UniqueStack> {
  let mut offsets: Vec<usize> =
    buffer.records().map(|record| record.offset()).collect();

  offsets.sort_unstable_by(|&a, &b| compare_records(buffer, a, b));

  let mut unique = Vec::new();
  let mut run: Option<(usize, u64)> = None;

  for &offset in &offsets {
    run = Some(match run {
      Some((head, count))
        if compare_records(buffer, head, offset) == Ordering::Equal =>
      {
        (head, count + 1)
      }
      Some((head, count)) => {
        unique.push(materialize(buffer, head, count));
        (offset, 1)
      }
      None => (offset, 1),
    });
  }

  if let Some((head, count)) = run {
    unique.push(materialize(buffer, head, count));
  }

  unique
}

/// Three-level total order over full record identity: frame count, then the
/// frame slice including the trailing dedup and type slots, then the line
/// slice. Depends only on record contents, never on map iteration order.
fn compare_records(buffer: &SampleBuffer, a: usize, b: usize) -> Ordering {
  let left = buffer.record_at(a);
  let right = buffer.record_at(b);

  left
    .frame_count()
    .cmp(&right.frame_count())
    .then_with(|| left.frame_words[1..].cmp(&right.frame_words[1..]))
    .then_with(|| left.line_words[1..].cmp(&right.line_words[1..]))
}

fn materialize(
  buffer: &SampleBuffer,
  offset: usize,
  occurrence_count: u64,
) -> UniqueStack {
  let record = buffer.record_at(offset);

  UniqueStack {
    allocated_type: record.allocated_type(),
    frames: record.frames().collect(),
    occurrence_count,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn append(
    buffer: &mut SampleBuffer,
    frames: &[(u64, i64)],
    allocated_type: u64,
  ) {
    let stack: Vec<(FrameHandle, i64)> = frames
      .iter()
      .map(|&(bits, line)| (FrameHandle(bits), line))
      .collect();
    buffer.append(&stack, TypeHandle(allocated_type));
  }

  #[test]
  fn merges_identical_records_regardless_of_insertion_order() {
    let mut forward = SampleBuffer::new();
    append(&mut forward, &[(0x1, 10), (0x2, 20)], 1);
    append(&mut forward, &[(0x3, 30)], 1);
    append(&mut forward, &[(0x1, 10), (0x2, 20)], 1);

    let mut reversed = SampleBuffer::new();
    append(&mut reversed, &[(0x1, 10), (0x2, 20)], 1);
    append(&mut reversed, &[(0x1, 10), (0x2, 20)], 1);
    append(&mut reversed, &[(0x3, 30)], 1);

    assert_eq!(aggregate(&forward), aggregate(&reversed));
  }

  #[test]
  fn preserves_total_record_count() {
    let mut buffer = SampleBuffer::new();
    for index in 0..20 {
      append(&mut buffer, &[(0x1, 10), (0x2, index % 3)], 1);
    }

    let unique = aggregate(&buffer);
    let total: u64 = unique.iter().map(|stack| stack.occurrence_count).sum();

    assert_eq!(total, buffer.record_count());
    assert_eq!(unique.len(), 3);
  }

  #[test]
  fn differing_fields_never_merge() {
    let mut buffer = SampleBuffer::new();
    append(&mut buffer, &[(0x1, 10)], 1);
    append(&mut buffer, &[(0x1, 11)], 1); // different line
    append(&mut buffer, &[(0x2, 10)], 1); // different frame
    append(&mut buffer, &[(0x1, 10)], 2); // different type
    append(&mut buffer, &[(0x1, 10), (0x2, 20)], 1); // different depth

    let unique = aggregate(&buffer);
    assert_eq!(unique.len(), 5);
    assert!(unique.iter().all(|stack| stack.occurrence_count == 1));
  }

  #[test]
  fn merges_three_against_one_by_line() {
    let mut buffer = SampleBuffer::new();
    for _ in 0..3 {
      append(&mut buffer, &[(0xf1, 10), (0xf2, 20)], 0xa);
    }
    append(&mut buffer, &[(0xf1, 11), (0xf2, 20)], 0xa);

    let unique = aggregate(&buffer);
    assert_eq!(unique.len(), 2);

    let three = unique
      .iter()
      .find(|stack| stack.occurrence_count == 3)
      .expect("missing merged stack");
    assert_eq!(three.allocated_type, TypeHandle(0xa));
    assert_eq!(
      three.frames,
      vec![(FrameHandle(0xf1), 10), (FrameHandle(0xf2), 20)]
    );

    let one = unique
      .iter()
      .find(|stack| stack.occurrence_count == 1)
      .expect("missing singleton stack");
    assert_eq!(
      one.frames,
      vec![(FrameHandle(0xf1), 11), (FrameHandle(0xf2), 20)]
    );
  }

  #[test]
  fn aggregation_is_deterministic() {
    let mut buffer = SampleBuffer::new();
    for index in 0..50u64 {
      append(&mut buffer, &[(index % 7 + 1, (index % 5) as i64)], index % 2);
    }

    assert_eq!(aggregate(&buffer), aggregate(&buffer));
  }

  #[test]
  fn empty_buffer_yields_no_stacks() {
    assert!(aggregate(&SampleBuffer::new()).is_empty());
  }
}
