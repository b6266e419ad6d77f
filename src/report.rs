use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, Serializer, ser::SerializeStruct};

use crate::aggregate::UniqueStack;
use crate::frames::{FrameInfo, FrameMap};
use crate::host::{FrameHandle, TypeHandle};

/// Point-in-time aggregate of everything sampled so far.
///
/// A report is a value: it holds no references into the sampler and stays
/// valid after the sampler keeps recording or is dropped.
#[derive(Debug, Clone)]
pub struct Report {
  allocation_count: u64,
  frames: FrameMap<FrameInfo>,
  interval: u64,
  overall_samples: u64,
  stacks: Vec<UniqueStack>,
}

impl Report {
  /// Total allocation events observed, sampled or not.
  #[must_use]
  pub fn allocation_count(&self) -> u64 {
    self.allocation_count
  }

  /// Resolved metadata for one handle, when it appears in any stack.
  #[must_use]
  pub fn frame(&self, handle: FrameHandle) -> Option<&FrameInfo> {
    self.frames.get(&handle)
  }

  /// Resolved metadata for every distinct frame across all stacks.
  #[must_use]
  pub fn frames(&self) -> &FrameMap<FrameInfo> {
    &self.frames
  }

  #[must_use]
  pub fn interval(&self) -> u64 {
    self.interval
  }

  /// Per-allocation-site rollup: hits by `(type, file, line)`, ordered by
  /// descending hit count.
  ///
  /// The innermost frame of each unique stack is the allocation site; stacks
  /// with no frames are skipped.
  #[must_use]
  pub fn location_counts(&self) -> Vec<LocationCount> {
    let mut hits: HashMap<(TypeHandle, FrameHandle, i64), u64> =
      HashMap::new();

    for stack in &self.stacks {
      let Some(&(handle, line)) = stack.frames.first() else {
        continue;
      };

      *hits.entry((stack.allocated_type, handle, line)).or_insert(0) +=
        stack.occurrence_count;
    }

    let mut counts: Vec<LocationCount> = hits
      .into_iter()
      .map(|((allocated_type, handle, line), hits)| LocationCount {
        allocated_type,
        file: self
          .frames
          .get(&handle)
          .map(|info| Arc::clone(&info.file))
          .unwrap_or_else(|| Arc::<str>::from("<unknown>")),
        hits,
        line,
      })
      .collect();

    counts.sort_by(|a, b| {
      b.hits
        .cmp(&a.hits)
        .then_with(|| a.allocated_type.cmp(&b.allocated_type))
        .then_with(|| a.file.cmp(&b.file))
        .then_with(|| a.line.cmp(&b.line))
    });

    counts
  }

  #[must_use]
  pub(crate) fn new(
    frames: FrameMap<FrameInfo>,
    stacks: Vec<UniqueStack>,
    interval: u64,
    allocation_count: u64,
    overall_samples: u64,
  ) -> Self {
    Self {
      allocation_count,
      frames,
      interval,
      overall_samples,
      stacks,
    }
  }

  /// Events actually recorded into the sample buffer.
  #[must_use]
  pub fn overall_samples(&self) -> u64 {
    self.overall_samples
  }

  /// Deduplicated stacks in the aggregator's sorted order.
  #[must_use]
  pub fn stacks(&self) -> &[UniqueStack] {
    &self.stacks
  }
}

/// Allocation hits attributed to one `(type, file, line)` site.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LocationCount {
  pub allocated_type: TypeHandle,
  pub file: Arc<str>,
  pub hits: u64,
  pub line: i64,
}

#[derive(Serialize)]
struct FrameExport<'a> {
  file: &'a str,
  first_line: Option<u32>,
  id: u64,
  label: &'a str,
}

#[derive(Serialize)]
struct StackFrameExport {
  frame: u64,
  line: i64,
}

impl Serialize for Report {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    let mut frames: Vec<FrameExport<'_>> = self
      .frames
      .values()
      .map(|info| FrameExport {
        file: info.file.as_ref(),
        first_line: info.first_line,
        id: info.id.bits(),
        label: info.label.as_ref(),
      })
      .collect();

    frames.sort_by_key(|frame| frame.id);

    let mut state = serializer.serialize_struct("Report", 5)?;
    state.serialize_field("interval", &self.interval)?;
    state.serialize_field("allocation_count", &self.allocation_count)?;
    state.serialize_field("overall_samples", &self.overall_samples)?;
    state.serialize_field("frames", &frames)?;
    state.serialize_field("stacks", &self.stacks)?;
    state.end()
  }
}

impl Serialize for UniqueStack {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    let frames: Vec<StackFrameExport> = self
      .frames
      .iter()
      .map(|&(frame, line)| StackFrameExport {
        frame: frame.bits(),
        line,
      })
      .collect();

    let mut state = serializer.serialize_struct("UniqueStack", 3)?;
    state.serialize_field("allocated_type", &self.allocated_type.bits())?;
    state.serialize_field("occurrence_count", &self.occurrence_count)?;
    state.serialize_field("frames", &frames)?;
    state.end()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn info(bits: u64, file: &str) -> FrameInfo {
    FrameInfo {
      file: Arc::<str>::from(file),
      first_line: Some(1),
      id: FrameHandle(bits),
      label: Arc::<str>::from(format!("frame_{bits}")),
    }
  }

  fn sample_report() -> Report {
    let mut frames = FrameMap::default();
    frames.insert(FrameHandle(0x1), info(0x1, "a.rs"));
    frames.insert(FrameHandle(0x2), info(0x2, "b.rs"));

    let stacks = vec![
      UniqueStack {
        allocated_type: TypeHandle(1),
        frames: vec![(FrameHandle(0x1), 10), (FrameHandle(0x2), 20)],
        occurrence_count: 3,
      },
      UniqueStack {
        allocated_type: TypeHandle(1),
        frames: vec![(FrameHandle(0x1), 11), (FrameHandle(0x2), 20)],
        occurrence_count: 1,
      },
      UniqueStack {
        allocated_type: TypeHandle(2),
        frames: vec![(FrameHandle(0x2), 5)],
        occurrence_count: 2,
      },
    ];

    Report::new(frames, stacks, 1, 6, 6)
  }

  #[test]
  fn rolls_up_hits_by_allocation_site() {
    let counts = sample_report().location_counts();

    assert_eq!(counts.len(), 3);
    assert_eq!(counts[0].hits, 3);
    assert_eq!(counts[0].allocated_type, TypeHandle(1));
    assert_eq!(counts[0].file.as_ref(), "a.rs");
    assert_eq!(counts[0].line, 10);
    assert_eq!(counts[1].hits, 2);
    assert_eq!(counts[1].file.as_ref(), "b.rs");
    assert_eq!(counts[2].hits, 1);
    assert_eq!(counts[2].line, 11);
  }

  #[test]
  fn serializes_to_stable_json_shape() {
    let json = serde_json::to_value(sample_report()).expect("serializable");

    assert_eq!(json["interval"], 1);
    assert_eq!(json["allocation_count"], 6);
    assert_eq!(json["overall_samples"], 6);
    assert_eq!(json["frames"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["frames"][0]["id"], 1);
    assert_eq!(json["frames"][0]["file"], "a.rs");
    assert_eq!(json["stacks"].as_array().map(Vec::len), Some(3));
    assert_eq!(json["stacks"][0]["occurrence_count"], 3);
    assert_eq!(json["stacks"][0]["frames"][0]["line"], 10);
  }
}
