use std::hash::Hash;

/// Event-time timestamp, monotonic within a single input stream.
pub type Timestamp = i64;

/// Marker trait for values that flow through an operator.
///
/// Mirrors the reference crate's blanket `Data` trait: anything `Clone + Send
/// + 'static` qualifies, no explicit opt-in required.
pub trait Data: Clone + Send + 'static {}
impl<T: Clone + Send + 'static> Data for T {}

/// Marker trait for grouping keys.
pub trait DataKey: Clone + Send + Hash + Eq + 'static {}
impl<T: Clone + Send + Hash + Eq + 'static> DataKey for T {}

/// One element crossing an operator boundary: either a data item or a
/// watermark, distinguished in-band the same way the reference crate tags
/// `StreamElement::Item` apart from `StreamElement::Watermark`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item<T> {
    Data(T),
    Watermark(Timestamp),
}

impl<T> Item<T> {
    pub fn is_watermark(&self) -> bool {
        matches!(self, Item::Watermark(_))
    }

    pub fn as_data(&self) -> Option<&T> {
        match self {
            Item::Data(v) => Some(v),
            Item::Watermark(_) => None,
        }
    }
}

/// A pre-aggregated frame produced by the frame grouper and consumed by the
/// sliding combiner: the partial accumulator for one key over `[seq, seq +
/// frameLength)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<K, V> {
    pub seq: Timestamp,
    pub key: K,
    pub value: V,
}

impl<K, V> Frame<K, V> {
    pub fn new(seq: Timestamp, key: K, value: V) -> Self {
        Frame { seq, key, value }
    }
}

/// A finalized, closed session emitted by the session operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session<K, R> {
    pub key: K,
    pub start: Timestamp,
    pub end: Timestamp,
    pub result: R,
}
