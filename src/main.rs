//! repobin
//!
//! Packs remote repositories into capacity-bounded groups and exports the
//! files matching a pattern to local or SFTP storage.
//!
//! # Usage
//!
//! ```bash
//! repobin search --query "language:python" --out repos.txt
//! repobin plan --in repos.txt --out plan.txt --capacity 1GB
//! repobin export --file plan.txt --pattern "*.py" local --out export
//! ```

use repobin::cli::CliInterface;
use repobin::error::Result;
use repobin::executor::CancelSignal;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // An interrupt leaves finished items in place; rerunning resumes.
        if e.is_cancellation() {
            eprintln!("Interrupted");
            return;
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Install the interrupt listener and the optional deadline
/// 4. Run the subcommand
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    let signal = CancelSignal::new();
    let interrupt = signal.listen_for_interrupt();
    let deadline = cli.timeout().map(|limit| signal.arm_timeout(limit));

    let result = cli.execute(&signal).await;

    interrupt.abort();
    if let Some(deadline) = deadline {
        deadline.abort();
    }
    result
}

/// Initialize logging system based on verbosity level
///
/// Logs go to stderr so command summaries on stdout stay clean.
fn initialize_logging(cli: &CliInterface) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
