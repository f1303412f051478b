// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lazily resolved tree cells and the registry that owns them.

pub mod cell;
pub mod registry;

pub use cell::{LazyTreeCell, Preorder, TreeResolver};
pub use registry::{NodeCell, NodeRegistry};
