// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Policies deciding which expression nodes get cached.

use std::collections::HashMap;

use log::{debug, trace};

use crate::expr::{CacheTag, ExprBase, ExprId};

pub trait CachePolicy {
    fn name(&self) -> &'static str;

    /// Choose the tag of a single node. `parm_dependent` is true if the node
    /// (or anything below it) reads a parameter.
    fn select(&self, node: &dyn ExprBase, parm_dependent: bool) -> CacheTag;

    /// Tag every node reachable from `exprs`. Graphs are walked depth first,
    /// arguments in order, children before parents; shared nodes are visited
    /// once.
    fn apply(&self, exprs: &[&dyn ExprBase]) {
        let mut visited = HashMap::new();
        for expr in exprs {
            visit(self, *expr, &mut visited);
        }

        let mut counts: HashMap<CacheTag, usize> = HashMap::new();
        for (tag, _) in visited.values() {
            *counts.entry(*tag).or_default() += 1;
        }
        debug!(
            "Cache policy '{}' tagged {} nodes: {} volatile, {} permanent",
            self.name(),
            visited.len(),
            counts.get(&CacheTag::Volatile).unwrap_or(&0),
            counts.get(&CacheTag::Permanent).unwrap_or(&0),
        );
    }
}

/// Returns whether `node` depends on a parameter.
fn visit<P: CachePolicy + ?Sized>(
    policy: &P,
    node: &dyn ExprBase,
    visited: &mut HashMap<ExprId, (CacheTag, bool)>,
) -> bool {
    if let Some(&(_, parm_dependent)) = visited.get(&node.id()) {
        return parm_dependent;
    }

    let mut parm_dependent = node.parm_id().is_some();
    for i in 0..node.n_arguments() {
        parm_dependent |= visit(policy, node.argument(i), visited);
    }

    let tag = policy.select(node, parm_dependent);
    trace!(
        "{} #{} ({} consumers, parm dependent: {parm_dependent}) -> {tag}",
        node.name(),
        node.id(),
        node.n_consumers()
    );
    node.set_cache_policy(tag);
    visited.insert(node.id(), (tag, parm_dependent));
    parm_dependent
}

/// Caches nothing.
pub struct NoCachePolicy;

impl CachePolicy for NoCachePolicy {
    fn name(&self) -> &'static str {
        "none"
    }

    fn select(&self, _node: &dyn ExprBase, _parm_dependent: bool) -> CacheTag {
        CacheTag::None
    }
}

/// Caches every node with more than one consumer, until the solvables change.
pub struct DefaultCachePolicy;

impl CachePolicy for DefaultCachePolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn select(&self, node: &dyn ExprBase, _parm_dependent: bool) -> CacheTag {
        if node.n_consumers() > 1 {
            CacheTag::Volatile
        } else {
            CacheTag::None
        }
    }
}

/// Like [`DefaultCachePolicy`], but also caches expensive nodes, and keeps
/// nodes that can't depend on a parameter until the grid changes.
pub struct ExperimentalCachePolicy;

impl CachePolicy for ExperimentalCachePolicy {
    fn name(&self) -> &'static str {
        "experimental"
    }

    fn select(&self, node: &dyn ExprBase, parm_dependent: bool) -> CacheTag {
        if node.n_consumers() <= 1 && !node.is_expensive() {
            CacheTag::None
        } else if parm_dependent {
            CacheTag::Volatile
        } else {
            CacheTag::Permanent
        }
    }
}
