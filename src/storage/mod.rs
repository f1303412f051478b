// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persistence collaborators behind the [`NodeStore`](traits::NodeStore) seam.
//!
//! - [`memory`]: in-process store with a change journal, for tests and demos
//! - [`sql`]: SQLite / MySQL via `sqlx::AnyPool`, journaled by triggers

pub mod memory;
pub mod sql;
pub mod traits;

pub use memory::InMemoryNodeStore;
pub use sql::SqlNodeStore;
pub use traits::{ChangeEntry, ChangeOp, HousekeepingStats, JournalRetention, NodeStore, StoreError};
