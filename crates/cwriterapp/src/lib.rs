//! # Cwriter Storage Core
//!
//! The persistence layer of the Cwriter novel-writing app. It presents one
//! hierarchical document store (users, works, and each work's manuscript,
//! chapters, characters, settings, glossary, foreshadowing and maps) over
//! three physical substrates:
//!
//! - a native app's sandboxed filesystem ([`store::native_fs`]),
//! - a mini-program's sandboxed filesystem ([`store::mp_fs`]),
//! - a key-value store when neither filesystem is available ([`store::kv`]).
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> cwriterapp::error::Result<()> {
//! use cwriterapp::config::CwriterConfig;
//! use cwriterapp::model::NewWork;
//! use cwriterapp::platform::{FixedPlatform, Platform};
//! use cwriterapp::store::work_store::DocumentStore;
//!
//! let config = CwriterConfig::load(None)?;
//! let store = DocumentStore::open(&config, &FixedPlatform(Platform::NativeFs))?;
//! store.init().await?;
//!
//! let work = store.create_work(None, NewWork::titled("Draft One")).await?;
//! let works = store.get_user_works(None).await?;
//! assert_eq!(works[0].id, work.id);
//!
//! store.dispose().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`paths`]: logical layout and identifier validation.
//! - [`model`]: documents, inputs and reports.
//! - [`store`]: backends, the document store, index sync and the journal.
//! - [`editor`]: in-memory editing session with auto-save.
//! - [`platform`]: capability probing and backend selection.
//! - [`config`]: layered configuration.

pub mod config;
pub mod editor;
pub mod error;
pub mod ids;
pub mod merge;
pub mod model;
pub mod paths;
pub mod platform;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use error::{CwriterError, Result};
pub use model::MAX_CHAPTER_CHARS;
