//! # Cwriter CLI
//!
//! A maintenance client for Cwriter data directories. The desktop and
//! mini-program front ends talk to `cwriterapp` directly; this binary exists
//! so a data directory can be inspected, backed up and repaired from a shell.
//!
//! ## Layering
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (crates/cwriter/src/cli/)                        │
//! │  - clap argument parsing (setup.rs)                         │
//! │  - Store wiring + dispatch (commands.rs)                    │
//! │  - One async handler per subcommand (handlers.rs)           │
//! │  - Terminal / JSON output (render.rs)                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Document Store (crates/cwriterapp/src/store/)              │
//! │  - Works, sub-documents, index sync, journal, backups       │
//! │  - No knowledge of stdout/stderr or process exits           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything below the CLI layer is UI agnostic. The CLI owns argument
//! parsing, tracing setup, the tokio runtime, rendering and exit codes.
//!
//! ## Testing Approach
//!
//! - **Store**: unit tests next to each module plus integration tests in
//!   `crates/cwriterapp/tests/`.
//! - **CLI**: render functions are tested with canned values; the binary is
//!   exercised end-to-end with `assert_cmd` against a temporary data dir.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
