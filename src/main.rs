use std::sync::Arc;

use allocation_sampler::{BacktraceHost, Sampler, TypeHandle};

fn main() {
  env_logger::init();

  let sampler = Sampler::builder()
    .interval(2)
    .max_stack_depth(16)
    .start_enabled(true)
    .finish(Arc::new(BacktraceHost::new()))
    .expect("default configuration is valid");

  for index in 0..16u64 {
    let kind = if index % 3 == 0 { 1 } else { 2 };
    sampler.on_allocation(Some(TypeHandle(kind)));
  }

  let report = sampler.report();

  println!("=== allocation report ===");
  println!("events observed: {}", report.allocation_count());
  println!("samples recorded: {}", report.overall_samples());

  for stack in report.stacks() {
    println!(
      "type {:#x} x{} ({} frames)",
      stack.allocated_type.bits(),
      stack.occurrence_count,
      stack.frames.len()
    );
  }

  for site in report.location_counts() {
    println!("  {}:{}: {} hits", site.file, site.line, site.hits);
  }

  match serde_json::to_string_pretty(&report) {
    Ok(json) => println!("{json}"),
    Err(err) => eprintln!("failed to encode report: {err}"),
  }
}
