// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to cache expression values.
//!
//! Sub-expressions shared between baselines (e.g. a station's gain, or a
//! patch's coherence) would otherwise be recomputed for every consumer. Values
//! are keyed on the expression id and the request id, so a value computed for
//! one grid can never be returned for another.

mod policy;

pub use policy::{CachePolicy, DefaultCachePolicy, ExperimentalCachePolicy, NoCachePolicy};

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::expr::{CacheTag, ExprId, RequestId, Value, ValuePtr};

/// What to remove from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// Everything; used when the evaluation grid changes.
    All,

    /// Only entries tagged [`CacheTag::Volatile`]; used when solvable
    /// parameters change.
    Volatile,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let total = self.hits + self.misses;
        let ratio = if total == 0 {
            0.0
        } else {
            100.0 * self.hits as f64 / total as f64
        };
        write!(
            f,
            "{} hits, {} misses ({ratio:.1}% hit rate), {} inserts",
            self.hits, self.misses, self.inserts
        )
    }
}

struct CacheEntry {
    tag: CacheTag,
    value: Rc<dyn Any>,
}

/// A cache of expression values.
#[derive(Default)]
pub struct Cache {
    entries: HashMap<(ExprId, RequestId), CacheEntry>,
    stats: CacheStats,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a cached value. `T` must be the value type the expression was
    /// inserted with.
    pub fn query<T: 'static>(&mut self, id: ExprId, request: RequestId) -> Option<ValuePtr<T>> {
        match self.entries.get(&(id, request)) {
            Some(entry) => {
                self.stats.hits += 1;
                let v = Rc::clone(&entry.value)
                    .downcast::<Value<T>>()
                    .expect("cached value has a different type to the expression querying it");
                Some(v)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert<T: 'static>(
        &mut self,
        id: ExprId,
        request: RequestId,
        tag: CacheTag,
        value: ValuePtr<T>,
    ) {
        assert_ne!(tag, CacheTag::None, "Cannot cache a value tagged None");
        self.stats.inserts += 1;
        let value: Rc<dyn Any> = value;
        self.entries.insert((id, request), CacheEntry { tag, value });
    }

    pub fn clear(&mut self, mode: ClearMode) {
        match mode {
            ClearMode::All => self.entries.clear(),
            ClearMode::Volatile => self
                .entries
                .retain(|_, entry| entry.tag != CacheTag::Volatile),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Get the size of the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the cache empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
