//! The aggregation contract shared by every windowing operator, plus a small
//! library of built-in aggregators.
//!
//! Represented as a struct of cloneable function-valued fields rather than a
//! trait object per key, the same shape the reference crate uses for its
//! `Fold` combinator (see `window/aggr/sum.rs`): it composes (the [`tuple2`]
//! and [`tuple3`] combinators) without dynamic dispatch on the hot
//! accumulate path.

mod builtin;
mod tuple;

pub use builtin::{count, max, min, sum};
pub use tuple::{tuple2, tuple3};

use std::sync::Arc;

use crate::item::Data;

/// `create` / `accumulate` / `combine` / optional `deduct` / `finish`.
///
/// `accumulate` and `combine` may mutate and return their left operand;
/// `finish` must be side-effect free. When `deduct` is present it must be the
/// left inverse of `combine`: `deduct(combine(a, b), b) == a`. Whether that
/// contract actually holds is the aggregator author's responsibility, not
/// something this crate can verify; see the crate-level error documentation.
#[derive(Clone)]
pub struct Aggregator<T, A, R> {
    create: Arc<dyn Fn() -> A + Send + Sync>,
    accumulate: Arc<dyn Fn(A, &T) -> A + Send + Sync>,
    combine: Arc<dyn Fn(A, A) -> A + Send + Sync>,
    deduct: Option<Arc<dyn Fn(A, A) -> A + Send + Sync>>,
    /// Structural "key has dropped out of the window" check: whether an
    /// accumulator equals the identity produced by `create`. Modelled as a
    /// function rather than a `PartialEq` bound on `A` so non-deduct
    /// aggregators over types with no natural equality are not burdened by
    /// the bound.
    is_empty: Option<Arc<dyn Fn(&A) -> bool + Send + Sync>>,
    finish: Arc<dyn Fn(A) -> R + Send + Sync>,
}

impl<T, A, R> Aggregator<T, A, R>
where
    T: Data,
    A: Data,
    R: Data,
{
    /// Build an aggregator without a `deduct` function. The sliding combiner
    /// falls back to recompute-mode windows for this aggregator.
    pub fn new(
        create: impl Fn() -> A + Send + Sync + 'static,
        accumulate: impl Fn(A, &T) -> A + Send + Sync + 'static,
        combine: impl Fn(A, A) -> A + Send + Sync + 'static,
        finish: impl Fn(A) -> R + Send + Sync + 'static,
    ) -> Self {
        Aggregator {
            create: Arc::new(create),
            accumulate: Arc::new(accumulate),
            combine: Arc::new(combine),
            deduct: None,
            is_empty: None,
            finish: Arc::new(finish),
        }
    }

    /// Attach a `deduct` function and the matching identity check, enabling
    /// `O(1)`-amortised sliding window maintenance. `is_empty` must agree
    /// with `deduct`: it returns true exactly when an accumulator equals the
    /// value `create()` would have produced.
    pub fn with_deduct(
        mut self,
        deduct: impl Fn(A, A) -> A + Send + Sync + 'static,
        is_empty: impl Fn(&A) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.deduct = Some(Arc::new(deduct));
        self.is_empty = Some(Arc::new(is_empty));
        self
    }

    pub fn create(&self) -> A {
        (self.create)()
    }

    pub fn accumulate(&self, acc: A, item: &T) -> A {
        (self.accumulate)(acc, item)
    }

    pub fn combine(&self, a: A, b: A) -> A {
        (self.combine)(a, b)
    }

    pub fn can_deduct(&self) -> bool {
        self.deduct.is_some()
    }

    /// Panics if `with_deduct` was never called; callers must check
    /// [`Aggregator::can_deduct`] first.
    pub fn deduct(&self, a: A, b: A) -> A {
        (self
            .deduct
            .as_ref()
            .expect("deduct called on an aggregator with no deduct function"))(a, b)
    }

    /// Panics if `with_deduct` was never called; callers must check
    /// [`Aggregator::can_deduct`] first.
    pub fn is_empty(&self, acc: &A) -> bool {
        (self
            .is_empty
            .as_ref()
            .expect("is_empty called on an aggregator with no deduct function"))(acc)
    }

    pub fn finish(&self, acc: A) -> R {
        (self.finish)(acc)
    }
}
