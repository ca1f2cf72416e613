//! repobin library
//!
//! Packs remote repositories into groups that fit a storage budget and
//! exports the files of every repository that match a name pattern to a
//! local directory or an SFTP server. Exports are resumable: an item whose
//! directory already exists on the target is not fetched again.
//!
//! # Modules
//!
//! - `item`: the unit being packed and exported
//! - `binpack`: online first-fit grouping
//! - `plan`: plan and search file codec
//! - `backend`: local and SFTP storage
//! - `source`: repository listing API
//! - `materialize`: fetch, filter and copy one item
//! - `executor`: subcommand handlers, export coordination and cancellation
//! - `cli`: argument parsing and dispatch
//! - `config`: configuration management
//! - `error`: error types
//! - `utils`: utility functions
//!
//! # Example
//!
//! ```no_run
//! use repobin::{Item, Plan};
//!
//! let items = vec![
//!     Item::new("a/one", "git@github.com:a/one.git", 600).unwrap(),
//!     Item::new("a/two", "git@github.com:a/two.git", 500).unwrap(),
//! ];
//! let plan = Plan::pack(items, 1000);
//! println!("{} groups", plan.groups().len());
//! ```

pub mod backend;
pub mod binpack;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod item;
pub mod materialize;
pub mod plan;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{RepobinError, Result};
pub use item::Item;
pub use plan::Plan;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
