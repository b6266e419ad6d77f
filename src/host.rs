use std::hash::{Hash, Hasher};

/// Opaque identifier for one call-stack frame, owned by the host runtime.
///
/// Handles compare by identity: two handles name the same frame iff their bit
/// patterns are equal. The all-zero pattern is reserved as a sentinel and
/// never refers to a real frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct FrameHandle(pub u64);

impl FrameHandle {
  pub const NULL: FrameHandle = FrameHandle(0);

  #[must_use]
  pub fn bits(self) -> u64 {
    self.0
  }

  #[must_use]
  pub fn is_null(self) -> bool {
    self.0 == 0
  }
}

impl Hash for FrameHandle {
  fn hash<H: Hasher>(&self, state: &mut H) {
    state.write_u64(self.0);
  }
}

impl nohash_hasher::IsEnabled for FrameHandle {}

/// Opaque identity of an allocated type, as classified by the host.
///
/// The host is expected to suppress internal or anonymous types before they
/// reach the sampler; an unclassifiable allocation simply carries no handle.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct TypeHandle(pub u64);

impl TypeHandle {
  #[must_use]
  pub fn bits(self) -> u64 {
    self.0
  }
}

impl Hash for TypeHandle {
  fn hash<H: Hasher>(&self, state: &mut H) {
    state.write_u64(self.0);
  }
}

impl nohash_hasher::IsEnabled for TypeHandle {}

/// Registration receipt for an installed allocation hook.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HookToken(pub u64);

/// Frame metadata reported by the host for one `FrameHandle`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FrameResolution {
  /// Source path of the frame, preferring an absolute path over a logical one.
  pub file: String,
  /// First line of the frame's definition, when the host knows it.
  pub first_line: Option<u32>,
  /// Human-readable frame label.
  pub label: String,
}

/// Capabilities the sampler consumes from its embedding runtime.
///
/// The sampler never interprets handles beyond identity comparison; resolution
/// and lifetime tracking stay with the host.
pub trait AllocationHost: Send + Sync {
  /// Capture the current call stack, innermost frame first, up to `max_depth`
  /// entries. Implementations push `(frame, line)` pairs into `out`; the
  /// sampler clears `out` before each capture. Truncation at `max_depth` is
  /// accepted, not an error.
  fn capture_stack(&self, max_depth: usize, out: &mut Vec<(FrameHandle, i64)>);

  /// Resolve one frame handle into human-readable metadata.
  fn resolve_frame(&self, handle: FrameHandle) -> FrameResolution;

  /// Register the per-allocation callback and hand back its registration.
  ///
  /// Hosts that dispatch events to the sampler directly can rely on the
  /// default, which registers nothing.
  fn install_allocation_hook(&self) -> HookToken {
    HookToken(0)
  }

  fn remove_allocation_hook(&self, _token: HookToken) {}

  /// Keep `handle` reachable for as long as the sampler retains it.
  ///
  /// Hosts with a moving or tracing collector treat this as root
  /// registration; hosts whose handles are plain addresses can rely on the
  /// default no-op.
  fn retain_frame(&self, _handle: FrameHandle) {}

  /// Release a previously retained handle.
  fn release_frame(&self, _handle: FrameHandle) {}
}
