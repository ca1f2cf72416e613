//! `plan` command: pack a search result file into a plan file

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::plan::{Plan, read_items_from_file};
use crate::utils::convert::format_bytes;

/// Counts reported after planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub items: usize,
    pub groups: usize,
    pub remainder: usize,
}

/// Read items from `input`, pack them into groups of `capacity` bytes and
/// write the plan to `output`.
pub fn run_plan(input: &Path, output: &Path, capacity: u64) -> Result<PlanSummary> {
    let items = read_items_from_file(input)?;
    let count = items.len();
    let plan = Plan::pack(items, capacity);
    plan.write_to_file(output)?;

    let summary = PlanSummary {
        items: count,
        groups: plan.groups().len(),
        remainder: plan.remainder().len(),
    };
    info!(
        "packed {} items into {} groups of {} ({} in remainder), written to {}",
        summary.items,
        summary.groups,
        format_bytes(capacity),
        summary.remainder,
        output.display()
    );
    Ok(summary)
}
