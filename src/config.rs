/// Controls how the sampler records allocation events.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
  /// Record one of every `interval` allocation events. Must be positive.
  pub interval: u64,
  /// Maximum number of frames captured per sample; deeper stacks are
  /// truncated by the host.
  pub max_stack_depth: usize,
  /// Whether to enable the sampler immediately once constructed.
  pub start_enabled: bool,
}

impl Default for SamplerConfig {
  fn default() -> Self {
    Self {
      interval: 1,
      max_stack_depth: Self::DEFAULT_MAX_STACK_DEPTH,
      start_enabled: false,
    }
  }
}

impl SamplerConfig {
  pub const DEFAULT_MAX_STACK_DEPTH: usize = 2048;

  /// Builder-style helper to adjust the sampling interval.
  #[must_use]
  pub fn with_interval(mut self, interval: u64) -> Self {
    self.interval = interval;
    self
  }

  /// Builder-style helper to adjust the maximum stack depth.
  #[must_use]
  pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
    self.max_stack_depth = depth;
    self
  }
}
