// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Expression graphs of the measurement equation.

Every node is reference counted ([`ExprRef`]) so sub-expressions can be shared
between baselines, patches and stations. Independently of `Rc`'s strong count,
each node keeps an explicit *consumer* count: the number of argument slots in
the graph pointing at it. Node constructors connect their arguments and `Drop`
disconnects them (in reverse order). [`crate::cache::CachePolicy`]
implementations use the consumer count to decide what is worth caching.

Nodes have a fixed arity (0 to 5) apart from [`MatrixSum`]. The argument types
of each node are checked at compile time; the per-node arithmetic lives in
"op" types implementing [`LeafOp`], [`UnaryOp`], ... [`QuinaryOp`].
 */

mod effects;
mod ops;
mod parm;
mod request;
mod sky;
mod value;

pub use effects::*;
pub use ops::*;
pub use parm::ParmExpr;
pub use request::{Axis, Domain, Grid, GridCell, Request, RequestId};
pub use sky::*;
pub use value::{
    combine1, combine2, combine3, combine4, combine5, sum, FlagArray, PValueKey, ParmId, Value,
    ValuePtr, Vector2, Vector3,
};

use std::cell::Cell;
use std::rc::Rc;

use crossbeam_utils::atomic::AtomicCell;
use strum_macros::Display;

use crate::{cache::Cache, Jones};

pub type ExprId = u64;

static NEXT_EXPR_ID: AtomicCell<ExprId> = AtomicCell::new(0);

/// Whether (and for how long) the value of a node is cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum CacheTag {
    /// Never cached.
    #[default]
    None,

    /// Cached until the set of solvable parameters (or their values) changes.
    Volatile,

    /// Cached until the evaluation grid changes.
    Permanent,
}

/// Bookkeeping shared by all nodes.
#[derive(Debug)]
pub struct ExprState {
    id: ExprId,
    consumers: Cell<usize>,
    tag: Cell<CacheTag>,
}

impl ExprState {
    pub fn new() -> Self {
        Self {
            id: NEXT_EXPR_ID.fetch_add(1),
            consumers: Cell::new(0),
            tag: Cell::new(CacheTag::None),
        }
    }
}

impl Default for ExprState {
    fn default() -> Self {
        Self::new()
    }
}

/// The type-erased part of an expression node; enough to walk a graph.
pub trait ExprBase {
    fn state(&self) -> &ExprState;

    /// A short name of the node type, for logging.
    fn name(&self) -> &'static str;

    fn n_arguments(&self) -> usize;

    /// Get argument `i`. Panics if `i >= self.n_arguments()`.
    fn argument(&self, i: usize) -> &dyn ExprBase;

    /// The parameter this node reads, if it's a parameter leaf.
    fn parm_id(&self) -> Option<ParmId> {
        None
    }

    /// Is this node costly enough to cache even when it has a single
    /// consumer?
    fn is_expensive(&self) -> bool {
        false
    }

    fn id(&self) -> ExprId {
        self.state().id
    }

    fn n_consumers(&self) -> usize {
        self.state().consumers.get()
    }

    fn connect(&self) {
        let c = &self.state().consumers;
        c.set(c.get() + 1);
    }

    fn disconnect(&self) {
        let c = &self.state().consumers;
        assert!(
            c.get() > 0,
            "Disconnecting expression {} ({}) which has no consumers",
            self.id(),
            self.name()
        );
        c.set(c.get() - 1);
    }

    fn cache_policy(&self) -> CacheTag {
        self.state().tag.get()
    }

    fn set_cache_policy(&self, tag: CacheTag) {
        self.state().tag.set(tag)
    }
}

/// An expression producing values with cells of type `T`.
pub trait Expr<T: 'static>: ExprBase {
    fn as_base(&self) -> &dyn ExprBase;

    /// Compute the value of this node from its arguments, bypassing the cache
    /// for this node (arguments still go through the cache).
    fn evaluate_expr(&self, request: &Request, cache: &mut Cache) -> Value<T>;

    /// Evaluate this node. The cache is consulted (and filled) only if this
    /// node's cache tag isn't [`CacheTag::None`].
    fn evaluate(&self, request: &Request, cache: &mut Cache) -> ValuePtr<T> {
        let tag = self.cache_policy();
        if tag != CacheTag::None {
            if let Some(v) = cache.query::<T>(self.id(), request.id()) {
                return v;
            }
        }

        let value = Rc::new(self.evaluate_expr(request, cache));
        if tag != CacheTag::None {
            cache.insert(self.id(), request.id(), tag, Rc::clone(&value));
        }
        value
    }
}

pub type ExprRef<T> = Rc<dyn Expr<T>>;

/// A node without arguments.
pub trait LeafOp: 'static {
    type Output: 'static;

    fn name(&self) -> &'static str;

    fn parm_id(&self) -> Option<ParmId> {
        None
    }

    fn is_expensive(&self) -> bool {
        false
    }

    fn evaluate(&self, grid: &Grid) -> Value<Self::Output>;
}

pub struct Leaf<O: LeafOp> {
    state: ExprState,
    op: O,
}

impl<O: LeafOp> Leaf<O> {
    pub fn new(op: O) -> Self {
        Self {
            state: ExprState::new(),
            op,
        }
    }

    pub fn op(&self) -> &O {
        &self.op
    }
}

impl<O: LeafOp> ExprBase for Leaf<O> {
    fn state(&self) -> &ExprState {
        &self.state
    }

    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn n_arguments(&self) -> usize {
        0
    }

    fn argument(&self, i: usize) -> &dyn ExprBase {
        panic!("{} has no arguments (asked for {i})", self.name())
    }

    fn parm_id(&self) -> Option<ParmId> {
        self.op.parm_id()
    }

    fn is_expensive(&self) -> bool {
        self.op.is_expensive()
    }
}

impl<O: LeafOp> Expr<O::Output> for Leaf<O> {
    fn as_base(&self) -> &dyn ExprBase {
        self
    }

    fn evaluate_expr(&self, request: &Request, _cache: &mut Cache) -> Value<O::Output> {
        self.op.evaluate(request.grid())
    }
}

// Generate an op trait and a node struct for a fixed arity. `$rev` lists the
// argument indices in reverse; arguments are disconnected in that order.
macro_rules! fixed_arity_node {
    (
        $(#[$meta:meta])*
        $node:ident, $op:ident, $arity:literal;
        $($idx:tt => $arg:ident: $ty:ident),+;
        rev [$($rev:tt),+]
    ) => {
        $(#[$meta])*
        pub trait $op<$($ty),+>: 'static {
            type Output: 'static;

            fn name(&self) -> &'static str;

            fn is_expensive(&self) -> bool {
                false
            }

            fn evaluate(&self, grid: &Grid, $($arg: &Value<$ty>),+) -> Value<Self::Output>;
        }

        pub struct $node<$($ty: 'static,)+ O: $op<$($ty),+>> {
            state: ExprState,
            op: O,
            args: ($(ExprRef<$ty>,)+),
        }

        impl<$($ty: 'static,)+ O: $op<$($ty),+>> $node<$($ty,)+ O> {
            pub fn new(op: O, $($arg: ExprRef<$ty>),+) -> Self {
                $(
                    $arg.connect();
                )+
                Self {
                    state: ExprState::new(),
                    op,
                    args: ($($arg,)+),
                }
            }

            pub fn op(&self) -> &O {
                &self.op
            }
        }

        impl<$($ty: 'static,)+ O: $op<$($ty),+>> Drop for $node<$($ty,)+ O> {
            fn drop(&mut self) {
                $(
                    self.args.$rev.disconnect();
                )+
            }
        }

        impl<$($ty: 'static,)+ O: $op<$($ty),+>> ExprBase for $node<$($ty,)+ O> {
            fn state(&self) -> &ExprState {
                &self.state
            }

            fn name(&self) -> &'static str {
                self.op.name()
            }

            fn n_arguments(&self) -> usize {
                $arity
            }

            fn argument(&self, i: usize) -> &dyn ExprBase {
                match i {
                    $(
                        $idx => self.args.$idx.as_base(),
                    )+
                    _ => panic!(
                        "{} takes {} arguments (asked for {i})",
                        self.name(),
                        $arity
                    ),
                }
            }

            fn is_expensive(&self) -> bool {
                self.op.is_expensive()
            }
        }

        impl<$($ty: 'static,)+ O: $op<$($ty),+>> Expr<O::Output> for $node<$($ty,)+ O> {
            fn as_base(&self) -> &dyn ExprBase {
                self
            }

            fn evaluate_expr(&self, request: &Request, cache: &mut Cache) -> Value<O::Output> {
                $(
                    let $arg = self.args.$idx.evaluate(request, cache);
                )+
                self.op.evaluate(request.grid(), $(&$arg),+)
            }
        }
    };
}

fixed_arity_node!(
    /// A node with one argument.
    Unary, UnaryOp, 1;
    0 => a0: A0;
    rev [0]
);
fixed_arity_node!(
    /// A node with two arguments.
    Binary, BinaryOp, 2;
    0 => a0: A0, 1 => a1: A1;
    rev [1, 0]
);
fixed_arity_node!(
    /// A node with three arguments.
    Ternary, TernaryOp, 3;
    0 => a0: A0, 1 => a1: A1, 2 => a2: A2;
    rev [2, 1, 0]
);
fixed_arity_node!(
    /// A node with four arguments.
    Quaternary, QuaternaryOp, 4;
    0 => a0: A0, 1 => a1: A1, 2 => a2: A2, 3 => a3: A3;
    rev [3, 2, 1, 0]
);
fixed_arity_node!(
    /// A node with five arguments.
    Quinary, QuinaryOp, 5;
    0 => a0: A0, 1 => a1: A1, 2 => a2: A2, 3 => a3: A3, 4 => a4: A4;
    rev [4, 3, 2, 1, 0]
);

/// The sum of any number of Jones-valued terms.
pub struct MatrixSum {
    state: ExprState,
    terms: Vec<ExprRef<Jones>>,
}

impl MatrixSum {
    pub fn new(terms: Vec<ExprRef<Jones>>) -> Self {
        for t in &terms {
            t.connect();
        }
        Self {
            state: ExprState::new(),
            terms,
        }
    }
}

impl Drop for MatrixSum {
    fn drop(&mut self) {
        for t in self.terms.iter().rev() {
            t.disconnect();
        }
    }
}

impl ExprBase for MatrixSum {
    fn state(&self) -> &ExprState {
        &self.state
    }

    fn name(&self) -> &'static str {
        "MatrixSum"
    }

    fn n_arguments(&self) -> usize {
        self.terms.len()
    }

    fn argument(&self, i: usize) -> &dyn ExprBase {
        match self.terms.get(i) {
            Some(t) => t.as_base(),
            None => panic!(
                "MatrixSum has {} terms (asked for {i})",
                self.terms.len()
            ),
        }
    }
}

impl Expr<Jones> for MatrixSum {
    fn as_base(&self) -> &dyn ExprBase {
        self
    }

    fn evaluate_expr(&self, request: &Request, cache: &mut Cache) -> Value<Jones> {
        let values: Vec<ValuePtr<Jones>> = self
            .terms
            .iter()
            .map(|t| t.evaluate(request, cache))
            .collect();
        sum(request.grid(), &values)
    }
}

/// Shorthand for the most common node constructor.
pub fn matrix_sum(terms: Vec<ExprRef<Jones>>) -> ExprRef<Jones> {
    Rc::new(MatrixSum::new(terms))
}
