//! Plan files
//!
//! A plan is the persisted result of packing: ordered groups of items plus
//! the remainder of items too large for any group. The text format is
//! line oriented:
//!
//! ```text
//! owner/a;git@host:owner/a.git;500;3f2a...
//! owner/c;git@host:owner/c.git;400
//!
//! owner/b;git@host:owner/b.git;600
//!
//! ---
//! owner/d;git@host:owner/d.git;1200
//! ```
//!
//! Every group is terminated by a blank line; `---` starts the remainder.
//! Search result files use the same item lines without any grouping.

use std::fmt;
use std::io::BufRead;
use std::path::Path;

use tracing::{debug, warn};

use crate::binpack::{Packing, first_fit};
use crate::error::Result;
use crate::item::Item;

/// Marker line that starts the remainder section.
pub const REMAINDER_MARKER: &str = "---";

/// Packed groups plus the unplaceable remainder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    groups: Vec<Vec<Item>>,
    remainder: Vec<Item>,
}

impl Plan {
    /// Create a plan from already packed groups.
    pub fn new(groups: Vec<Vec<Item>>, remainder: Vec<Item>) -> Self {
        Self { groups, remainder }
    }

    /// Pack `items` into groups of `capacity` bytes using first-fit.
    pub fn pack<I>(items: I, capacity: u64) -> Self
    where
        I: IntoIterator<Item = Item>,
    {
        first_fit(items, capacity).into()
    }

    /// Groups in plan order.
    pub fn groups(&self) -> &[Vec<Item>] {
        &self.groups
    }

    /// Items whose size exceeds the group capacity.
    pub fn remainder(&self) -> &[Item] {
        &self.remainder
    }

    /// Number of items selected by the inclusion flags.
    ///
    /// `only_remainder` wins over `skip_remainder` when both are set.
    pub fn total(&self, skip_remainder: bool, only_remainder: bool) -> usize {
        if only_remainder {
            return self.remainder.len();
        }

        let grouped: usize = self.groups.iter().map(Vec::len).sum();
        if skip_remainder {
            grouped
        } else {
            grouped + self.remainder.len()
        }
    }

    /// Lazily iterate `(group, is_remainder)` pairs in plan order.
    ///
    /// The remainder is yielded last as one synthetic group tagged `true`.
    pub fn iter(&self, skip_remainder: bool, only_remainder: bool) -> PlanIter<'_> {
        PlanIter {
            plan: self,
            next_group: if only_remainder { self.groups.len() } else { 0 },
            remainder_pending: only_remainder || !skip_remainder,
        }
    }

    /// Encode the plan into its text form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a plan from its text form.
    pub fn decode(text: &str) -> Result<Self> {
        Self::decode_reader(text.as_bytes())
    }

    /// Decode a plan from any buffered reader.
    ///
    /// Malformed lines abort decoding. A group that is not terminated by a
    /// blank line before `---` or the end of input is not part of the plan.
    pub fn decode_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut plan = Plan::default();
        let mut group: Vec<Item> = Vec::new();
        let mut in_remainder = false;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            let line_no = idx + 1;

            if line.is_empty() {
                if !in_remainder {
                    plan.groups.push(std::mem::take(&mut group));
                }
            } else if line == REMAINDER_MARKER {
                discard_unterminated(&mut group, line_no);
                in_remainder = true;
            } else {
                let item = Item::parse_line(line, line_no)?;
                if in_remainder {
                    plan.remainder.push(item);
                } else {
                    group.push(item);
                }
            }
        }

        discard_unterminated(&mut group, 0);

        debug!(
            "decoded plan with {} groups and {} remainder items",
            plan.groups.len(),
            plan.remainder.len()
        );

        Ok(plan)
    }

    /// Read and decode a plan file.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::decode_reader(std::io::BufReader::new(file))
    }

    /// Encode the plan and write it to `path`, replacing any existing file.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode())?;
        Ok(())
    }
}

fn discard_unterminated(group: &mut Vec<Item>, line_no: usize) {
    if group.is_empty() {
        return;
    }
    if line_no > 0 {
        warn!(
            "discarding {} item(s) of a group not closed by a blank line before line {}",
            group.len(),
            line_no
        );
    } else {
        warn!(
            "discarding {} item(s) of a group not closed by a blank line at end of plan",
            group.len()
        );
    }
    group.clear();
}

impl From<Packing<Item>> for Plan {
    fn from(packing: Packing<Item>) -> Self {
        Self {
            groups: packing.bins.into_iter().map(|bin| bin.into_items()).collect(),
            remainder: packing.remainder,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            for item in group {
                writeln!(f, "{item}")?;
            }
            writeln!(f)?;
        }

        if !self.remainder.is_empty() {
            writeln!(f, "{REMAINDER_MARKER}")?;
            for item in &self.remainder {
                writeln!(f, "{item}")?;
            }
        }

        Ok(())
    }
}

/// Iterator returned by [`Plan::iter`].
pub struct PlanIter<'a> {
    plan: &'a Plan,
    next_group: usize,
    remainder_pending: bool,
}

impl<'a> Iterator for PlanIter<'a> {
    type Item = (&'a [Item], bool);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(group) = self.plan.groups.get(self.next_group) {
            self.next_group += 1;
            return Some((group.as_slice(), false));
        }

        if self.remainder_pending {
            self.remainder_pending = false;
            return Some((self.plan.remainder.as_slice(), true));
        }

        None
    }
}

/// Read a search result file: one item per line, blank lines ignored.
pub fn read_items<R: BufRead>(reader: R) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(Item::parse_line(&line, idx + 1)?);
    }
    Ok(items)
}

/// Read a search result file from disk.
pub fn read_items_from_file(path: &Path) -> Result<Vec<Item>> {
    let file = std::fs::File::open(path)?;
    read_items(std::io::BufReader::new(file))
}
