use std::{collections::HashMap, sync::Arc};

use nohash_hasher::BuildNoHashHasher;

use crate::buffer::SampleBuffer;
use crate::host::{AllocationHost, FrameHandle};

/// Handle-keyed map. Handles already are word-sized identities, so hashing
/// them again buys nothing.
pub type FrameMap<V> = HashMap<FrameHandle, V, BuildNoHashHasher<FrameHandle>>;

/// Resolved metadata for one distinct frame handle.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FrameInfo {
  pub file: Arc<str>,
  /// First line of the frame's definition; absent is `None`, never zero.
  pub first_line: Option<u32>,
  pub id: FrameHandle,
  pub label: Arc<str>,
}

/// Resolve every distinct frame handle stored in `buffer` through the host.
///
/// Scans each record's frame slice under identity equality. A handle is
/// resolved at most once per call, and the zero sentinel never reaches the
/// host.
#[must_use]
pub fn resolve_frames(
  buffer: &SampleBuffer,
  host: &dyn AllocationHost,
) -> FrameMap<FrameInfo> {
  let mut resolved = FrameMap::default();

  for record in buffer.records() {
    for (handle, _line) in record.frames() {
      if handle.is_null() || resolved.contains_key(&handle) {
        continue;
      }

      let resolution = host.resolve_frame(handle);

      resolved.insert(
        handle,
        FrameInfo {
          file: Arc::<str>::from(resolution.file),
          first_line: resolution.first_line,
          id: handle,
          label: Arc::<str>::from(resolution.label),
        },
      );
    }
  }

  resolved
}
