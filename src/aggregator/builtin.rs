use std::ops::{Add, AddAssign, Sub};

use super::Aggregator;
use crate::item::Data;

/// Sum of the values extracted from each event by `extract`. Deduct-capable.
///
/// Grounded on the reference crate's `WindowSum` (`operator/window/aggr/sum.rs`),
/// generalised from a stream-combinator method into a standalone constructor.
pub fn sum<T, N>(extract: impl Fn(&T) -> N + Send + Sync + Clone + 'static) -> Aggregator<T, N, N>
where
    T: Data,
    N: Data + Default + AddAssign + Add<Output = N> + Sub<Output = N> + PartialEq,
{
    Aggregator::new(
        N::default,
        move |mut acc, item| {
            acc += extract(item);
            acc
        },
        |a, b| a + b,
        |acc| acc,
    )
    .with_deduct(|a, b| a - b, |acc| *acc == N::default())
}

/// Count of events per key. Deduct-capable.
pub fn count<T>() -> Aggregator<T, u64, u64>
where
    T: Data,
{
    Aggregator::new(
        || 0u64,
        |acc, _item| acc + 1,
        |a, b| a + b,
        |acc| acc,
    )
    .with_deduct(|a, b| a - b, |acc| *acc == 0)
}

/// Minimum of the values extracted from each event. Not deduct-capable:
/// removing the current minimum from a running minimum is not generally
/// invertible, so windows built on `min` always use the recompute path.
pub fn min<T, N>(extract: impl Fn(&T) -> N + Send + Sync + 'static) -> Aggregator<T, Option<N>, Option<N>>
where
    T: Data,
    N: Data + PartialOrd,
{
    Aggregator::new(
        || None,
        move |acc: Option<N>, item| {
            let v = extract(item);
            match acc {
                Some(cur) if cur <= v => Some(cur),
                _ => Some(v),
            }
        },
        |a, b| match (a, b) {
            (Some(a), Some(b)) => Some(if a <= b { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        },
        |acc| acc,
    )
}

/// Maximum of the values extracted from each event. Not deduct-capable, for
/// the same reason as [`min`].
pub fn max<T, N>(extract: impl Fn(&T) -> N + Send + Sync + 'static) -> Aggregator<T, Option<N>, Option<N>>
where
    T: Data,
    N: Data + PartialOrd,
{
    Aggregator::new(
        || None,
        move |acc: Option<N>, item| {
            let v = extract(item);
            match acc {
                Some(cur) if cur >= v => Some(cur),
                _ => Some(v),
            }
        },
        |a, b| match (a, b) {
            (Some(a), Some(b)) => Some(if a >= b { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        },
        |acc| acc,
    )
}
