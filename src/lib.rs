//! In-process allocation-sampling profiler.
//!
//! On a configurable fraction of allocation events the sampler captures the
//! current call stack and the allocated type from its host runtime, stores
//! them in a flat append-only record buffer, and merges identical stacks into
//! a queryable call-graph on demand. The host stays behind the
//! [`AllocationHost`] boundary: it delivers events, reports stacks, resolves
//! frame metadata, and tracks the lifetime of retained frame handles.

mod aggregate;
mod buffer;
mod config;
mod error;
mod frames;
mod host;
mod native;
mod report;
mod state;

pub use {
  aggregate::UniqueStack,
  buffer::{RecordView, Records, SampleBuffer},
  config::SamplerConfig,
  error::ConfigError,
  frames::{FrameInfo, FrameMap},
  host::{
    AllocationHost, FrameHandle, FrameResolution, HookToken, TypeHandle,
  },
  native::BacktraceHost,
  report::{LocationCount, Report},
  state::{Sampler, SamplerBuilder},
};
