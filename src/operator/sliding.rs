//! The sliding window combiner: assembles per-frame accumulators produced by
//! the frame grouper into overlapping windows of `framesPerWindow` frames,
//! using constant-time deduct-based maintenance when the aggregator
//! supports it and falling back to a full recompute otherwise.
//!
//! A window ending at `e` (`e` always a multiple of `frameLength`) covers
//! event timestamps `[e - windowLength, e)`, i.e. the `framesPerWindow`
//! frames with starting seq in `[e - windowLength, e - frameLength]`. The
//! frame that most recently "entered" such a window has seq `e -
//! frameLength`; the frame that has just "left" it (relative to the
//! previous window-end, `frameLength` earlier) has seq `e - frameLength -
//! windowLength`.

use std::collections::{BTreeMap, VecDeque};
use std::hash::BuildHasherDefault;

use indexmap::IndexMap;
use wyhash::WyHash;

use crate::aggregator::Aggregator;
use crate::error::ConfigError;
use crate::item::{Data, DataKey, Frame, Item, Timestamp};

use super::{Context, Inbox, Outbox, WindowOperator};

type KeyMap<K, A> = IndexMap<K, A, BuildHasherDefault<WyHash>>;

/// Combines `(frameSeq, key, acc)` tuples from a frame grouper into
/// sliding windows of width `frameLength * framesPerWindow`.
pub struct SlidingCombiner<T, K, A, R> {
    frame_length: i64,
    frames_per_window: i64,
    window_length: i64,
    aggregator: Aggregator<T, A, R>,

    seq_to_key_to_acc: BTreeMap<Timestamp, KeyMap<K, A>>,
    sliding_window: Option<KeyMap<K, A>>,
    next_frame_seq_to_emit: Option<Timestamp>,

    pending_out: VecDeque<Item<Frame<K, R>>>,
    watermark_in_progress: bool,
    complete_in_progress: bool,

    outbox: Option<Box<dyn Outbox<Frame<K, R>> + Send>>,
}

impl<T, K, A, R> SlidingCombiner<T, K, A, R>
where
    T: Data,
    K: DataKey,
    A: Data,
    R: Data,
{
    pub fn new(
        frame_length: i64,
        frames_per_window: i64,
        aggregator: Aggregator<T, A, R>,
    ) -> Result<Self, ConfigError> {
        if frame_length <= 0 {
            return Err(ConfigError::NonPositiveFrameLength(frame_length));
        }
        if frames_per_window <= 0 {
            return Err(ConfigError::NonPositiveFramesPerWindow(frames_per_window));
        }
        let can_deduct = aggregator.can_deduct();
        Ok(SlidingCombiner {
            frame_length,
            frames_per_window,
            window_length: frame_length * frames_per_window,
            aggregator,
            seq_to_key_to_acc: BTreeMap::new(),
            sliding_window: can_deduct.then(KeyMap::default),
            next_frame_seq_to_emit: None,
            pending_out: VecDeque::new(),
            watermark_in_progress: false,
            complete_in_progress: false,
            outbox: None,
        })
    }

    fn higher_frame_boundary(&self, w: Timestamp) -> Timestamp {
        self.frame_length * (w.div_euclid(self.frame_length) + 1)
    }

    /// The frame seq that enters the window ending at `e`.
    fn entering_seq(&self, e: Timestamp) -> Timestamp {
        e - self.frame_length
    }

    /// The frame seq that left the window now ending at `e` (it was part of
    /// the window ending at `e - frameLength` but isn't part of this one).
    fn leaving_seq(&self, e: Timestamp) -> Timestamp {
        self.entering_seq(e) - self.window_length
    }

    fn ingest_frame(&mut self, frame: Frame<K, A>) {
        let Frame { seq, key, value } = frame;
        let aggregator = &self.aggregator;
        let slot = self
            .seq_to_key_to_acc
            .entry(seq)
            .or_insert_with(KeyMap::default);
        match slot.entry(key) {
            indexmap::map::Entry::Occupied(mut e) => {
                let cur = std::mem::replace(e.get_mut(), aggregator.create());
                *e.get_mut() = aggregator.combine(cur, value);
            }
            indexmap::map::Entry::Vacant(e) => {
                e.insert(value);
            }
        }
    }

    /// Recompute a window ending at `e` from scratch, combining every stored
    /// frame with seq in `[e - windowLength, e - frameLength]`.
    fn recompute_window(&self, e: Timestamp) -> KeyMap<K, A> {
        let lower = e - self.window_length;
        let upper = self.entering_seq(e);
        let mut out: KeyMap<K, A> = KeyMap::default();
        for (_seq, map) in self.seq_to_key_to_acc.range(lower..=upper) {
            for (key, value) in map {
                match out.entry(key.clone()) {
                    indexmap::map::Entry::Occupied(mut e) => {
                        let cur = std::mem::replace(e.get_mut(), self.aggregator.create());
                        *e.get_mut() = self.aggregator.combine(cur, value.clone());
                    }
                    indexmap::map::Entry::Vacant(e) => {
                        e.insert(value.clone());
                    }
                }
            }
        }
        out
    }

    fn patch_window(&mut self, e: Timestamp) {
        let leaving = self.seq_to_key_to_acc.remove(&self.leaving_seq(e));
        let entering = self.seq_to_key_to_acc.get(&self.entering_seq(e)).cloned();

        let sw = self
            .sliding_window
            .as_mut()
            .expect("patch_window called without deduct support");

        if let Some(entering) = entering {
            for (key, value) in entering {
                match sw.entry(key) {
                    indexmap::map::Entry::Occupied(mut e) => {
                        let cur = std::mem::replace(e.get_mut(), self.aggregator.create());
                        *e.get_mut() = self.aggregator.combine(cur, value);
                    }
                    indexmap::map::Entry::Vacant(e) => {
                        e.insert(value);
                    }
                }
            }
        }
        if let Some(leaving) = leaving {
            for (key, value) in leaving {
                if let indexmap::map::Entry::Occupied(mut e) = sw.entry(key.clone()) {
                    let cur = std::mem::replace(e.get_mut(), self.aggregator.create());
                    let deducted = self.aggregator.deduct(cur, value);
                    if self.aggregator.is_empty(&deducted) {
                        e.remove();
                    } else {
                        *e.get_mut() = deducted;
                    }
                }
            }
        }

        for (key, acc) in sw.iter() {
            self.pending_out.push_back(Item::Data(Frame::new(
                e,
                key.clone(),
                self.aggregator.finish(acc.clone()),
            )));
        }
    }

    fn emit_window_end(&mut self, e: Timestamp) {
        if self.aggregator.can_deduct() {
            self.patch_window(e);
        } else {
            let window = self.recompute_window(e);
            for (key, acc) in window {
                self.pending_out.push_back(Item::Data(Frame::new(
                    e,
                    key,
                    self.aggregator.finish(acc),
                )));
            }
            self.seq_to_key_to_acc.remove(&self.leaving_seq(e));
        }
    }

    fn stage_watermark(&mut self, w: Timestamp) {
        if self.next_frame_seq_to_emit.is_none() {
            let first_seq = self.seq_to_key_to_acc.keys().next().copied();
            self.next_frame_seq_to_emit = Some(match first_seq {
                Some(first) => first.min(w),
                None => w,
            });
        }
        let end_exclusive = self.higher_frame_boundary(w);
        let mut e = self.next_frame_seq_to_emit.unwrap();
        while e < end_exclusive {
            self.emit_window_end(e);
            e += self.frame_length;
        }
        self.next_frame_seq_to_emit = Some(end_exclusive);
        log::trace!("sliding combiner emitted windows up to end {}", end_exclusive);
        self.pending_out.push_back(Item::Watermark(w));
    }

    /// Keep emitting window-ends past the last watermark until every stored
    /// frame has both entered and left the live window, leaving all state
    /// empty. Bounded: each frame contributes to exactly `framesPerWindow`
    /// consecutive window-ends before draining out.
    fn stage_complete(&mut self) {
        if self.seq_to_key_to_acc.is_empty() {
            return;
        }
        if self.next_frame_seq_to_emit.is_none() {
            let first = *self.seq_to_key_to_acc.keys().next().unwrap();
            self.next_frame_seq_to_emit = Some(first);
        }
        loop {
            let stored_nonempty = !self.seq_to_key_to_acc.is_empty();
            let sw_nonempty = self
                .sliding_window
                .as_ref()
                .is_some_and(|m| !m.is_empty());
            if !stored_nonempty && !sw_nonempty {
                break;
            }
            let e = self.next_frame_seq_to_emit.unwrap();
            self.emit_window_end(e);
            self.next_frame_seq_to_emit = Some(e + self.frame_length);
        }
    }

    fn drain_pending(&mut self) -> bool {
        let Self {
            pending_out,
            outbox,
            ..
        } = self;
        let outbox = outbox
            .as_mut()
            .expect("SlidingCombiner::init was never called");
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

impl<T, K, A, R> WindowOperator<Frame<K, A>, Frame<K, R>> for SlidingCombiner<T, K, A, R>
where
    T: Data,
    K: DataKey,
    A: Data,
    R: Data,
{
    fn init(&mut self, outbox: Box<dyn Outbox<Frame<K, R>> + Send>, _context: Context) {
        self.outbox = Some(outbox);
    }

    fn process_item(&mut self, _ordinal: usize, inbox: &mut dyn Inbox<Frame<K, A>>) -> bool {
        loop {
            if !self.drain_pending() {
                return false;
            }
            match inbox.poll() {
                None => return true,
                Some(Item::Data(frame)) => self.ingest_frame(frame),
                Some(Item::Watermark(w)) => self.stage_watermark(w),
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
