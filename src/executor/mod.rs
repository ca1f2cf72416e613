//! Command execution
//!
//! One handler per subcommand. Handlers take fully resolved options (paths
//! expanded, config and flags merged) and a shared [`CancelSignal`]:
//! - `search`: list repositories and pin their latest revision
//! - `plan`: pack a search file into a plan file
//! - `export`: materialize a plan into a local or remote backend
//! - `scan`: turn a URL list into item lines
//! - `sync`: upload a local export to the remote backend

pub mod cancel;
pub mod export;
pub mod plan;
pub mod progress;
pub mod scan;
pub mod search;
pub mod sync;

pub use cancel::CancelSignal;
pub use export::{
    ExportCoordinator, ExportOptions, ExportRequest, ExportSummary, ExportTarget, open_backend,
    run_export,
};
pub use plan::{PlanSummary, run_plan};
pub use progress::ProgressTracker;
pub use scan::{ScanOptions, ScanSummary, run_scan};
pub use search::{SearchOptions, SearchSummary, run_search};
pub use sync::{SyncOptions, SyncSummary, run_sync};
