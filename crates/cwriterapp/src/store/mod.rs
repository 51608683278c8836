//! # Storage Layer
//!
//! One logical document tree over three physical substrates.
//!
//! ## Layers
//!
//! 1. **Backends** ([`backend::StorageBackend`]): raw byte I/O on logical paths.
//!    [`native_fs`] and [`mp_fs`] map paths onto a directory; [`kv`] keeps every
//!    document under one key-value namespace.
//! 2. **Documents** ([`documents`]): JSON encode/decode, seeding of missing
//!    documents and regeneration of corrupt ones.
//! 3. **Store** ([`work_store::DocumentStore`]): users, works and their content.
//! 4. **Index sync** ([`sync`]): keeps the per-user work index honest.
//! 5. **Journal** ([`journal`]): operation log and backups.
//!
//! ## Hybrid Index
//!
//! Work configs are the truth; the `works` map inside each user config is a
//! cache for listing. The cache is assumed to be potentially dirty and heals
//! lazily:
//!
//! - **Orphan Adoption**: a work folder with a config but no index entry is added.
//! - **Zombie Cleanup**: an index entry whose config is gone or corrupt is removed.
//! - **Staleness Check**: listing fields that differ from the config are refreshed.
//!
//! ## Concurrency
//!
//! Read-modify-write cycles on shared documents hold a per-key async mutex from
//! [`locks::UserLocks`]. Work content files are last-write-wins.

pub mod backend;
pub mod documents;
pub mod journal;
pub mod kv;
pub mod locks;
pub mod mp_fs;
pub mod native_fs;
pub mod sync;
pub mod work_store;
