use std::{
  cell::Cell,
  collections::HashSet,
  sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
  },
};

use log::debug;
use nohash_hasher::BuildNoHashHasher;

use crate::aggregate;
use crate::buffer::SampleBuffer;
use crate::config::SamplerConfig;
use crate::error::ConfigError;
use crate::frames;
use crate::host::{AllocationHost, FrameHandle, HookToken, TypeHandle};
use crate::report::Report;

thread_local! {
  static IN_GATE: Cell<bool> = Cell::new(false);
}

/// Thin builder that customizes `SamplerConfig` without exposing all knobs up
/// front.
#[derive(Debug, Default)]
pub struct SamplerBuilder {
  config: SamplerConfig,
}

impl SamplerBuilder {
  /// Build the sampler against the given host.
  ///
  /// # Errors
  ///
  /// Returns `ConfigError::InvalidInterval` when the configured interval is
  /// zero.
  pub fn finish(
    self,
    host: Arc<dyn AllocationHost>,
  ) -> Result<Sampler, ConfigError> {
    Sampler::with_config(host, self.config)
  }

  #[must_use]
  pub fn interval(mut self, interval: u64) -> Self {
    self.config.interval = interval;
    self
  }

  #[must_use]
  pub fn max_stack_depth(mut self, depth: usize) -> Self {
    self.config.max_stack_depth = depth;
    self
  }

  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn start_enabled(mut self, enabled: bool) -> Self {
    self.config.start_enabled = enabled;
    self
  }

  #[must_use]
  pub fn with_config(mut self, config: SamplerConfig) -> Self {
    self.config = config;
    self
  }
}

/// Mutable sampler state behind the single exclusion domain: the record
/// buffers, the counters, and the hook registration all move together.
#[derive(Debug)]
struct Collector {
  allocation_count: u64,
  buffer: SampleBuffer,
  hook: Option<HookToken>,
  overall_samples: u64,
  retained: HashSet<FrameHandle, BuildNoHashHasher<FrameHandle>>,
  scratch: Vec<(FrameHandle, i64)>,
}

impl Collector {
  fn new() -> Self {
    Self {
      allocation_count: 0,
      buffer: SampleBuffer::new(),
      hook: None,
      overall_samples: 0,
      retained: HashSet::default(),
      scratch: Vec::new(),
    }
  }
}

struct SamplerInner {
  collector: Mutex<Collector>,
  config: SamplerConfig,
  enabled: AtomicBool,
  host: Arc<dyn AllocationHost>,
}

impl std::fmt::Debug for SamplerInner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SamplerInner")
      .field("config", &self.config)
      .field("enabled", &self.enabled)
      .finish_non_exhaustive()
  }
}

impl Drop for SamplerInner {
  fn drop(&mut self) {
    let collector = match self.collector.get_mut() {
      Ok(collector) => collector,
      Err(err) => err.into_inner(),
    };

    // Deregister before the buffers go away so no late event races the
    // teardown.
    if let Some(token) = collector.hook.take() {
      self.host.remove_allocation_hook(token);
    }

    for &handle in &collector.retained {
      self.host.release_frame(handle);
    }
  }
}

/// Entry point for observing allocation events and producing reports.
///
/// The host invokes [`Sampler::on_allocation`] synchronously for every
/// allocation event while enabled; one of every `interval` events has its
/// call stack captured and appended to the sample buffer. [`Sampler::report`]
/// deduplicates the buffer into unique stacks at any time, including while
/// sampling continues.
#[derive(Clone, Debug)]
pub struct Sampler {
  inner: Arc<SamplerInner>,
}

impl Sampler {
  /// Total allocation events observed while enabled.
  #[must_use]
  pub fn allocation_count(&self) -> u64 {
    self.lock_collector().allocation_count
  }

  #[must_use]
  pub fn builder() -> SamplerBuilder {
    SamplerBuilder::new()
  }

  #[must_use]
  pub fn config(&self) -> &SamplerConfig {
    &self.inner.config
  }

  /// Stop observing events. Idempotent; the frozen buffer stays queryable.
  pub fn disable(&self) {
    // Flip the gate first so no event outruns the deregistration.
    self.inner.enabled.store(false, Ordering::Release);

    let mut collector = self.lock_collector();

    if let Some(token) = collector.hook.take() {
      self.inner.host.remove_allocation_hook(token);
      debug!(
        "allocation sampling disabled after {} events",
        collector.allocation_count
      );
    }
  }

  /// Start observing events. Idempotent: re-enabling keeps the existing hook
  /// registration and resumes the prior counters.
  pub fn enable(&self) {
    let mut collector = self.lock_collector();

    if collector.hook.is_none() {
      collector.hook = Some(self.inner.host.install_allocation_hook());
      debug!(
        "allocation sampling enabled, interval {}",
        self.inner.config.interval
      );
    }

    self.inner.enabled.store(true, Ordering::Release);
  }

  #[must_use]
  pub fn enabled(&self) -> bool {
    self.inner.enabled.load(Ordering::Acquire)
  }

  #[must_use]
  pub fn interval(&self) -> u64 {
    self.inner.config.interval
  }

  fn lock_collector(&self) -> MutexGuard<'_, Collector> {
    match self.inner.collector.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }

  /// Construct a sampler with the default configuration, created disabled.
  ///
  /// # Errors
  ///
  /// Returns `ConfigError::InvalidInterval` when the configured interval is
  /// zero.
  pub fn new(host: Arc<dyn AllocationHost>) -> Result<Self, ConfigError> {
    Self::with_config(host, SamplerConfig::default())
  }

  /// Observe one allocation event.
  ///
  /// The decision to sample reads `allocation_count` before it is
  /// incremented, so the first event after session start is always sampled.
  /// Events without a classifiable type never reach the buffer but still
  /// count. Reentrant events raised by the sampler's own bookkeeping are
  /// dropped before the gate.
  pub fn on_allocation(&self, allocated_type: Option<TypeHandle>) {
    if !self.enabled() {
      return;
    }

    if IN_GATE.with(|flag| flag.replace(true)) {
      return;
    }

    let mut collector = self.lock_collector();

    if collector.allocation_count % self.inner.config.interval == 0 {
      if let Some(allocated_type) = allocated_type {
        self.sample(&mut collector, allocated_type);
      }
    }

    collector.allocation_count += 1;
    drop(collector);

    IN_GATE.with(|flag| flag.set(false));
  }

  /// Events actually recorded into the sample buffer.
  #[must_use]
  pub fn overall_samples(&self) -> u64 {
    self.lock_collector().overall_samples
  }

  /// Materialize a snapshot of everything sampled so far.
  ///
  /// Aggregation and frame resolution run against the buffer contents as of
  /// this call; the sampler's counters are unaffected and the call may be
  /// repeated freely, including while sampling is enabled.
  #[must_use]
  pub fn report(&self) -> Report {
    let collector = self.lock_collector();

    let stacks = aggregate::aggregate(&collector.buffer);
    let frames =
      frames::resolve_frames(&collector.buffer, self.inner.host.as_ref());

    debug!(
      "materialized report: {} unique stacks from {} records",
      stacks.len(),
      collector.buffer.record_count()
    );

    Report::new(
      frames,
      stacks,
      self.inner.config.interval,
      collector.allocation_count,
      collector.overall_samples,
    )
  }

  fn sample(&self, collector: &mut Collector, allocated_type: TypeHandle) {
    let mut scratch = std::mem::take(&mut collector.scratch);
    scratch.clear();

    self
      .inner
      .host
      .capture_stack(self.inner.config.max_stack_depth, &mut scratch);
    scratch.truncate(self.inner.config.max_stack_depth);

    // Every stored handle is retained with the host exactly once for the
    // lifetime of this sampler.
    for &(handle, _line) in &scratch {
      if !handle.is_null() && collector.retained.insert(handle) {
        self.inner.host.retain_frame(handle);
      }
    }

    collector.buffer.append(&scratch, allocated_type);
    collector.overall_samples += 1;
    collector.scratch = scratch;
  }

  /// Construct a sampler against `host` with an explicit configuration.
  ///
  /// # Errors
  ///
  /// Returns `ConfigError::InvalidInterval` when `config.interval` is zero.
  pub fn with_config(
    host: Arc<dyn AllocationHost>,
    config: SamplerConfig,
  ) -> Result<Self, ConfigError> {
    if config.interval == 0 {
      return Err(ConfigError::InvalidInterval(config.interval));
    }

    let start_enabled = config.start_enabled;

    let sampler = Self {
      inner: Arc::new(SamplerInner {
        collector: Mutex::new(Collector::new()),
        config,
        enabled: AtomicBool::new(false),
        host,
      }),
    };

    if start_enabled {
      sampler.enable();
    }

    Ok(sampler)
  }
}
