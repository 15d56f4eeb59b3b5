//! Event-time windowing core for a distributed data-flow engine: frame
//! grouping, sliding window combination, and session windows.
//!
//! Three operator shapes share the [`aggregator::Aggregator`] contract and
//! the [`operator::WindowOperator`] runtime contract:
//!
//! - [`operator::frame::FrameGrouper`] bins events into fixed-length frames
//!   and emits partial per-frame aggregates on eviction.
//! - [`operator::sliding::SlidingCombiner`] assembles those per-frame
//!   aggregates into overlapping sliding windows.
//! - [`operator::session::SessionOperator`] groups per-key events into
//!   variable-length sessions delimited by an idle gap.
//!
//! None of the three persist state, perform I/O, or retry on error: they are
//! pure in-memory components driven by a cooperative single-threaded host
//! (see [`operator`] for the scheduling contract).

pub mod aggregator;
pub mod error;
pub mod item;
pub mod operator;

pub use aggregator::Aggregator;
pub use error::ConfigError;
pub use item::{Data, DataKey, Frame, Item, Session, Timestamp};
pub use operator::frame::FrameGrouper;
pub use operator::session::SessionOperator;
pub use operator::sliding::SlidingCombiner;
pub use operator::{ChannelOutbox, Context, Inbox, Outbox, VecDequeInbox, WindowOperator};
