//! Built-in host backed by the native call stack.
//!
//! Useful for exercising the sampler in-process without an embedding runtime:
//! frame handles are instruction pointers, and symbol resolution goes through
//! `backtrace`, cached per address since resolution is comparatively
//! expensive.

use std::os::raw::c_void;

use dashmap::DashMap;

use crate::host::{AllocationHost, FrameHandle, FrameResolution};

/// `AllocationHost` over native frames.
///
/// Native frames need no lifetime tracking, so the hook and root-registration
/// capabilities keep their default no-op behavior.
#[derive(Debug, Default)]
pub struct BacktraceHost {
  symbols: DashMap<FrameHandle, FrameResolution>,
}

impl BacktraceHost {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  fn resolve_cached(&self, handle: FrameHandle) -> FrameResolution {
    self
      .symbols
      .entry(handle)
      .or_insert_with(|| resolve_address(handle))
      .clone()
  }
}

impl AllocationHost for BacktraceHost {
  fn capture_stack(
    &self,
    max_depth: usize,
    out: &mut Vec<(FrameHandle, i64)>,
  ) {
    backtrace::trace(|frame| {
      if out.len() >= max_depth {
        return false;
      }

      let handle = FrameHandle(frame.ip() as usize as u64);

      if handle.is_null() {
        return true;
      }

      let line = self
        .resolve_cached(handle)
        .first_line
        .map_or(0, i64::from);

      out.push((handle, line));
      true
    });
  }

  fn resolve_frame(&self, handle: FrameHandle) -> FrameResolution {
    self.resolve_cached(handle)
  }
}

fn resolve_address(handle: FrameHandle) -> FrameResolution {
  let mut file = None;
  let mut first_line = None;
  let mut label = None;

  backtrace::resolve(handle.bits() as usize as *mut c_void, |symbol| {
    if file.is_none() {
      file = symbol
        .filename()
        .and_then(|path| path.to_str())
        .map(str::to_string);
    }

    if label.is_none() {
      label = symbol.name().map(|name| format!("{name}"));
    }

    if first_line.is_none() {
      first_line = symbol.lineno();
    }
  });

  FrameResolution {
    file: file.unwrap_or_else(|| "<native>".to_string()),
    first_line,
    label: label.unwrap_or_else(|| "<unknown>".to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn captures_a_bounded_native_stack() {
    let host = BacktraceHost::new();
    let mut out = Vec::new();

    host.capture_stack(4, &mut out);

    assert!(!out.is_empty());
    assert!(out.len() <= 4);
    assert!(out.iter().all(|(handle, _line)| !handle.is_null()));
  }

  #[test]
  fn resolution_is_cached_per_address() {
    let host = BacktraceHost::new();
    let mut out = Vec::new();
    host.capture_stack(1, &mut out);

    let (handle, _line) = out[0];
    let first = host.resolve_frame(handle);
    let second = host.resolve_frame(handle);

    assert_eq!(first, second);
    assert_eq!(host.symbols.len(), 1);
  }
}
