//! # CLI Behavior
//!
//! This is a maintenance client for a Cwriter data directory, not the
//! writing app itself. It is the only place that knows about terminal I/O,
//! exit codes and output formatting.
//!
//! ## Store Selection
//!
//! The data directory comes from `--data-dir`, else `CWRITER_DATA_DIR`, else
//! the OS data dir. `cwriter.toml` inside it is loaded on top of the
//! environment. On a desktop the filesystem is always available, so the
//! platform defaults to `native-fs`; `--platform kv-fallback` together with
//! `CWRITER_KV_SNAPSHOT` opens a persisted key-value map instead.
//!
//! ## Users
//!
//! Every command acts on `--user`, falling back to the default user exactly
//! as the store does for a missing id.
//!
//! ## Output
//!
//! Human-readable by default. `--json` prints the underlying values as
//! pretty JSON, suitable for piping into `jq`.
//!
//! ## Module Structure
//!
//! - `setup`: Argument parsing via clap
//! - `commands`: Runtime, tracing and store wiring, then dispatch
//! - `handlers`: One function per subcommand
//! - `render`: Terminal formatting

mod commands;
mod handlers;
mod render;
pub mod setup;

pub use commands::run;
