//! The frame grouper: bins events into fixed-length frames keyed by a
//! grouping function, emitting one partial aggregate per frame as it is
//! evicted from the window.

use std::collections::{BTreeMap, VecDeque};
use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use wyhash::WyHash;

use crate::aggregator::Aggregator;
use crate::error::ConfigError;
use crate::item::{Data, DataKey, Frame, Item, Timestamp};

use super::{Context, Inbox, Outbox, WindowOperator};

type KeyMap<K, A> = IndexMap<K, A, BuildHasherDefault<WyHash>>;

/// Bins events into frames of `frame_length` and emits one partial
/// accumulator per `(frame, key)` once that frame falls `bucket_count`
/// frames behind the most recent one observed.
pub struct FrameGrouper<T, K, A, R, Ts, Kf>
where
    Ts: Fn(&T) -> Timestamp + Send + 'static,
    Kf: Fn(&T) -> K + Send + 'static,
{
    frame_length: i64,
    bucket_count: i64,
    extract_timestamp: Ts,
    extract_key: Kf,
    aggregator: Aggregator<T, A, R>,

    frames: BTreeMap<Timestamp, KeyMap<K, A>>,
    current_frame_seq: Option<Timestamp>,
    frame_seq_base: Option<Timestamp>,

    pending_out: VecDeque<Item<Frame<K, R>>>,
    watermark_in_progress: bool,
    complete_in_progress: bool,

    outbox: Option<Box<dyn Outbox<Frame<K, R>> + Send>>,
}

impl<T, K, A, R, Ts, Kf> FrameGrouper<T, K, A, R, Ts, Kf>
where
    T: Data,
    K: DataKey,
    A: Data,
    R: Data,
    Ts: Fn(&T) -> Timestamp + Send + 'static,
    Kf: Fn(&T) -> K + Send + 'static,
{
    pub fn new(
        frame_length: i64,
        frames_per_window: i64,
        extract_timestamp: Ts,
        extract_key: Kf,
        aggregator: Aggregator<T, A, R>,
    ) -> Result<Self, ConfigError> {
        if frame_length <= 0 {
            return Err(ConfigError::NonPositiveFrameLength(frame_length));
        }
        if frames_per_window <= 0 {
            return Err(ConfigError::NonPositiveFramesPerWindow(frames_per_window));
        }
        Ok(FrameGrouper {
            frame_length,
            bucket_count: frames_per_window,
            extract_timestamp,
            extract_key,
            aggregator,
            frames: BTreeMap::new(),
            current_frame_seq: None,
            frame_seq_base: None,
            pending_out: VecDeque::new(),
            watermark_in_progress: false,
            complete_in_progress: false,
            outbox: None,
        })
    }

    fn floor_to_frame(&self, ts: Timestamp) -> Timestamp {
        self.frame_length * ts.div_euclid(self.frame_length)
    }

    /// Evict every populated slot with seq strictly less than `f -
    /// (bucket_count - 1) * frame_length`, staging one emitted tuple per
    /// `(seq, key)`.
    fn advance(&mut self, f: Timestamp) {
        let current = match self.current_frame_seq {
            None => {
                self.current_frame_seq = Some(f);
                self.frame_seq_base = Some(f);
                return;
            }
            Some(c) => c,
        };
        if f <= current {
            return;
        }
        let base = self.frame_seq_base.unwrap_or(current);
        // bucket_count is a frame *count*; the ring spans bucket_count - 1
        // frame_length-wide steps behind the current frame, not bucket_count
        // raw timestamp units.
        let retained_span = (self.bucket_count - 1) * self.frame_length;
        let lower = base.max(current - retained_span);
        let upper_exclusive = f - retained_span;
        let mut seq = lower;
        let mut evicted_keys = 0usize;
        while seq < upper_exclusive {
            if let Some(map) = self.frames.remove(&seq) {
                evicted_keys += map.len();
                for (key, acc) in map {
                    let value = self.aggregator.finish(acc);
                    self.pending_out
                        .push_back(Item::Data(Frame::new(seq, key, value)));
                }
            }
            seq += self.frame_length;
        }
        if evicted_keys > 0 {
            log::trace!(
                "frame grouper evicted {} keys over frames [{}, {})",
                evicted_keys,
                lower,
                upper_exclusive
            );
        }
        self.current_frame_seq = Some(f);
    }

    fn handle_event(&mut self, item: T) {
        let ts = (self.extract_timestamp)(&item);
        let f = self.floor_to_frame(ts);

        if let Some(current) = self.current_frame_seq {
            if f <= current - self.bucket_count * self.frame_length {
                log::trace!("frame grouper dropped late event at frame {}", f);
                return;
            }
        }

        self.advance(f);

        let key = (self.extract_key)(&item);
        let aggregator = &self.aggregator;
        let slot = self.frames.entry(f).or_insert_with(KeyMap::default);
        match slot.entry(key) {
            indexmap::map::Entry::Occupied(mut e) => {
                let acc = std::mem::replace(e.get_mut(), aggregator.create());
                *e.get_mut() = aggregator.accumulate(acc, &item);
            }
            indexmap::map::Entry::Vacant(e) => {
                e.insert(aggregator.accumulate(aggregator.create(), &item));
            }
        }
    }

    fn stage_watermark(&mut self, w: Timestamp) {
        if self.frame_seq_base.is_some() {
            let f = self.floor_to_frame(w - 1);
            self.advance(f);
        }
        self.pending_out.push_back(Item::Watermark(w));
    }

    fn stage_complete(&mut self) {
        let seqs: Vec<Timestamp> = self.frames.keys().copied().collect();
        for seq in seqs {
            if let Some(map) = self.frames.remove(&seq) {
                for (key, acc) in map {
                    let value = self.aggregator.finish(acc);
                    self.pending_out
                        .push_back(Item::Data(Frame::new(seq, key, value)));
                }
            }
        }
    }

    fn drain_pending(&mut self) -> bool {
        let Self {
            pending_out,
            outbox,
            ..
        } = self;
        let outbox = outbox.as_mut().expect("FrameGrouper::init was never called");
        while let Some(item) = pending_out.front() {
            if outbox.offer(item.clone()) {
                pending_out.pop_front();
            } else {
                return false;
            }
        }
        true
    }
}

impl<T, K, A, R, Ts, Kf> WindowOperator<T, Frame<K, R>> for FrameGrouper<T, K, A, R, Ts, Kf>
where
    T: Data,
    K: DataKey,
    A: Data,
    R: Data,
    Ts: Fn(&T) -> Timestamp + Send + 'static,
    Kf: Fn(&T) -> K + Send + 'static,
{
    fn init(&mut self, outbox: Box<dyn Outbox<Frame<K, R>> + Send>, _context: Context) {
        self.outbox = Some(outbox);
    }

    fn process_item(&mut self, _ordinal: usize, inbox: &mut dyn Inbox<T>) -> bool {
        loop {
            if !self.drain_pending() {
                return false;
            }
            match inbox.poll() {
                None => return true,
                Some(Item::Data(item)) => self.handle_event(item),
                Some(Item::Watermark(w)) => {
                    self.stage_watermark(w);
                }
            }
        }
    }

    fn process_watermark(&mut self, watermark: Timestamp) -> bool {
        if !self.watermark_in_progress {
            self.stage_watermark(watermark);
            self.watermark_in_progress = true;
        }
        if self.drain_pending() {
            self.watermark_in_progress = false;
            true
        } else {
            false
        }
    }

    fn complete(&mut self) -> bool {
        if !self.complete_in_progress {
            self.stage_complete();
            self.complete_in_progress = true;
        }
        self.drain_pending()
    }
}
