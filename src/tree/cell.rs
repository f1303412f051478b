// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memoizing tree cell.
//!
//! A [`LazyTreeCell`] wraps one value and remembers its resolved parent and
//! children. Resolution goes through a [`TreeResolver`] handed in on each
//! access, so a cell never owns the structure it lives in.
//!
//! # Memo slots
//!
//! ```text
//! ┌──────────────── LazyTreeCell<T> ────────────────┐
//! │ data:     RwLock<Arc<T>>            replaceable │
//! │ parent:   RwLock<Option<Weak<Cell>>>   memo     │
//! │ children: RwLock<Option<Vec<Weak<Cell>>>> memo  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Each slot is replaced as a whole. A reader racing a writer sees either
//! the old or the new value, never a partial one. Memos hold `Weak`
//! references: the owner of the cells (the registry) is the only owner.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Looks up relationships for cells of type `T`.
pub trait TreeResolver<T> {
    /// The parent cell of `cell`, or `None` at the root or when the parent
    /// is not (yet) known.
    fn resolve_parent(&self, cell: &LazyTreeCell<T>) -> Option<Arc<LazyTreeCell<T>>>;

    /// Every cell whose parent is `cell`, excluding `cell` itself.
    fn resolve_children(&self, cell: &LazyTreeCell<T>) -> Vec<Arc<LazyTreeCell<T>>>;
}

/// One node of the lazily materialized tree.
pub struct LazyTreeCell<T> {
    data: RwLock<Arc<T>>,
    parent: RwLock<Option<Weak<LazyTreeCell<T>>>>,
    children: RwLock<Option<Vec<Weak<LazyTreeCell<T>>>>>,
}

impl<T> LazyTreeCell<T> {
    pub fn new(data: T) -> Self {
        Self {
            data: RwLock::new(Arc::new(data)),
            parent: RwLock::new(None),
            children: RwLock::new(None),
        }
    }

    /// Current value.
    #[must_use]
    pub fn data(&self) -> Arc<T> {
        self.data.read().clone()
    }

    /// Replace the value. Memos are left alone; clearing them is the
    /// caller's job.
    pub fn set_data(&self, data: T) {
        *self.data.write() = Arc::new(data);
    }

    /// Memoized parent, resolved on first access.
    ///
    /// A `None` resolution is not memoized so a parent that shows up later
    /// is picked up on the next call.
    pub fn parent<R>(&self, resolver: &R) -> Option<Arc<LazyTreeCell<T>>>
    where
        R: TreeResolver<T> + ?Sized,
    {
        if let Some(parent) = self.parent.read().as_ref().and_then(Weak::upgrade) {
            return Some(parent);
        }

        let parent = resolver.resolve_parent(self)?;
        *self.parent.write() = Some(Arc::downgrade(&parent));
        Some(parent)
    }

    /// Memoized children, resolved on first access.
    pub fn children<R>(&self, resolver: &R) -> Vec<Arc<LazyTreeCell<T>>>
    where
        R: TreeResolver<T> + ?Sized,
    {
        if let Some(cached) = self.children.read().as_ref() {
            return cached.iter().filter_map(Weak::upgrade).collect();
        }

        let children = resolver.resolve_children(self);
        *self.children.write() = Some(children.iter().map(Arc::downgrade).collect());
        children
    }

    pub fn clear_parent(&self) {
        *self.parent.write() = None;
    }

    pub fn clear_children(&self) {
        *self.children.write() = None;
    }

    #[must_use]
    pub fn has_cached_parent(&self) -> bool {
        self.parent.read().is_some()
    }

    #[must_use]
    pub fn has_cached_children(&self) -> bool {
        self.children.read().is_some()
    }

    /// Preorder walk starting at `self`: self, then each child's subtree.
    ///
    /// The walk is lazy; children are resolved as cells are reached. Each
    /// call starts a fresh walk.
    pub fn traverse_preorder<'r, R>(self: &Arc<Self>, resolver: &'r R) -> Preorder<'r, T, R>
    where
        R: TreeResolver<T> + ?Sized,
    {
        Preorder {
            stack: vec![self.clone()],
            seen: HashSet::new(),
            resolver,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LazyTreeCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTreeCell")
            .field("data", &self.data())
            .field("cached_parent", &self.has_cached_parent())
            .field("cached_children", &self.has_cached_children())
            .finish()
    }
}

/// Iterator returned by [`LazyTreeCell::traverse_preorder`].
pub struct Preorder<'r, T, R: ?Sized> {
    stack: Vec<Arc<LazyTreeCell<T>>>,
    // Keyed by cell address; a cell is never yielded twice even if the
    // mirror transiently holds a cycle.
    seen: HashSet<usize>,
    resolver: &'r R,
}

impl<T, R> Iterator for Preorder<'_, T, R>
where
    R: TreeResolver<T> + ?Sized,
{
    type Item = Arc<LazyTreeCell<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cell = self.stack.pop()?;
            if !self.seen.insert(Arc::as_ptr(&cell) as usize) {
                continue;
            }
            let children = cell.children(self.resolver);
            self.stack.extend(children.into_iter().rev());
            return Some(cell);
        }
    }
}
