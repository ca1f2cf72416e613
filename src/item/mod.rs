//! Item model
//!
//! An [`Item`] is one exportable repository: where to fetch it from, its
//! stable `owner/name` identifier, its size in bytes and an optional commit
//! pin. Items are read from and written to the `name;locator;size[;revision]`
//! line format shared by search result files and plan files.

use std::fmt;

use crate::binpack::Packable;
use crate::error::{PlanError, Result};

/// Separator between `owner` and `name` in an item name.
pub const NAME_SEPARATOR: char = '/';

/// Replacement for the first [`NAME_SEPARATOR`] when deriving a directory name.
pub const DIR_DELIMITER: &str = ".";

/// Field separator of the item line format.
pub const FIELD_SEPARATOR: char = ';';

/// One exportable repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    locator: String,
    name: String,
    dir_name: String,
    size: u64,
    revision: Option<String>,
}

impl Item {
    /// Create a new item without a revision pin.
    ///
    /// # Arguments
    /// * `name` - Stable identifier in `owner/name` form
    /// * `locator` - Remote fetch address (e.g. an SSH clone URL)
    /// * `size` - Packing weight in bytes
    ///
    /// # Returns
    /// * `Result<Self>` - The item, or `PlanError::InvalidName` unless the
    ///   name has exactly one separator between two non-empty parts
    pub fn new(name: impl Into<String>, locator: impl Into<String>, size: u64) -> Result<Self> {
        let name = name.into();
        let (owner, repo) = name
            .split_once(NAME_SEPARATOR)
            .ok_or_else(|| PlanError::InvalidName(name.clone()))?;
        if !is_name_part(owner) || !is_name_part(repo) {
            return Err(PlanError::InvalidName(name).into());
        }

        let dir_name = format!("{owner}{DIR_DELIMITER}{repo}");

        Ok(Self {
            locator: locator.into(),
            name,
            dir_name,
            size,
            revision: None,
        })
    }

    /// Attach a revision pin. Empty strings are treated as "no pin".
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        let revision = revision.into();
        let revision = revision.trim();
        self.revision = (!revision.is_empty()).then(|| revision.to_string());
        self
    }

    /// Parse one `name;locator;size[;revision]` line.
    ///
    /// # Arguments
    /// * `line` - Line content without the line terminator
    /// * `line_no` - 1-based line number used in error messages
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self> {
        let line = line.trim_end_matches('\r');
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() < 3 {
            return Err(PlanError::MalformedLine {
                line_no,
                line: line.to_string(),
            }
            .into());
        }

        let size = fields[2]
            .trim()
            .parse::<u64>()
            .map_err(|_| PlanError::InvalidSize {
                line_no,
                value: fields[2].to_string(),
            })?;

        let item = Self::new(fields[0], fields[1], size)?;
        Ok(match fields.get(3) {
            Some(revision) => item.with_revision(*revision),
            None => item,
        })
    }

    /// Remote fetch address.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Stable `owner/name` identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flat directory name, e.g. `owner.name`.
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Pinned revision, if any.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

/// One side of an item name: non-empty, no separator, not a relative
/// directory reference.
fn is_name_part(part: &str) -> bool {
    !part.is_empty() && !part.contains(NAME_SEPARATOR) && part != "." && part != ".."
}

impl Packable for Item {
    fn size(&self) -> u64 {
        self.size
    }
}

/// Formats the item as one line of the item line format (no terminator).
impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.name,
            self.locator,
            self.size,
            sep = FIELD_SEPARATOR
        )?;
        if let Some(revision) = &self.revision {
            write!(f, "{FIELD_SEPARATOR}{revision}")?;
        }
        Ok(())
    }
}
