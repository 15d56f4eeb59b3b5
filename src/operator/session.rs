//! The session window operator: groups per-key events into variable-length
//! sessions delimited by an idle gap of more than `maxGap`, emitting a
//! session's aggregate once a watermark passes its expiry deadline.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound::Excluded;

use indexmap::IndexSet;

use crate::aggregator::Aggregator;
use crate::error::ConfigError;
use crate::item::{Data, DataKey, Item, Session, Timestamp};

use super::{Context, Inbox, Outbox, WindowOperator};

/// `startSeq -> (endSeq, accumulator)`, one per open session for a key.
/// Entries are pairwise non-overlapping and non-adjacent at rest: the gap
/// between any two stored intervals exceeds `maxGap`.
type IntervalMap<A> = BTreeMap<Timestamp, (Timestamp, A)>;

pub struct SessionOperator<T, K, A, R, Ts, Kf>
where
    Ts: Fn(&T) -> Timestamp + Send + 'static,
    Kf: Fn(&T) -> K + Send + 'static,
{
    max_gap: i64,
    extract_timestamp: Ts,
    extract_key: Kf,
    aggregator: Aggregator<T, A, R>,

    key_to_intervals: HashMap<K, IntervalMap<A>>,
    /// `endSeq + maxGap -> {(key, startSeq)}`, the expiry index.
    deadline_to_keys: BTreeMap<Timestamp, IndexSet<(K, Timestamp)>>,

    pending_out: VecDeque<Item<Session<K, R>>>,
    watermark_in_progress: bool,
    complete_in_progress: bool,

    outbox: Option<Box<dyn Outbox<Session<K, R>> + Send>>,
}

impl<T, K, A, R, Ts, Kf> SessionOperator<T, K, A, R, Ts, Kf>
where
    T: Data,
    K: DataKey,
    A: Data,
    R: Data,
    Ts: Fn(&T) -> Timestamp + Send + 'static,
    Kf: Fn(&T) -> K + Send + 'static,
{
    pub fn new(
        max_gap: i64,
        extract_timestamp: Ts,
        extract_key: Kf,
        aggregator: Aggregator<T, A, R>,
    ) -> Result<Self, ConfigError> {
        if max_gap < 0 {
            return Err(ConfigError::NegativeMaxGap(max_gap));
        }
        Ok(SessionOperator {
            max_gap,
            extract_timestamp,
            extract_key,
            aggregator,
            key_to_intervals: HashMap::new(),
            deadline_to_keys: BTreeMap::new(),
            pending_out: VecDeque::new(),
            watermark_in_progress: false,
            complete_in_progress: false,
            outbox: None,
        })
    }

    fn deadline_of(&self, end: Timestamp) -> Timestamp {
        end + self.max_gap
    }

    fn index_insert(&mut self, key: K, start: Timestamp, end: Timestamp) {
        self.deadline_to_keys
            .entry(self.deadline_of(end))
            .or_default()
            .insert((key, start));
    }

    fn index_remove(&mut self, key: &K, start: Timestamp, end: Timestamp) {
        let deadline = self.deadline_of(end);
        if let Some(set) = self.deadline_to_keys.get_mut(&deadline) {
            set.shift_remove(&(key.clone(), start));
            if set.is_empty() {
                self.deadline_to_keys.remove(&deadline);
            }
        }
    }

    fn handle_event(&mut self, item: T) {
        let t = (self.extract_timestamp)(&item);
        let key = (self.extract_key)(&item);
        let aggregator = &self.aggregator;

        let intervals = self.key_to_intervals.entry(key.clone()).or_default();

        let left = intervals
            .range(..=t)
            .next_back()
            .filter(|(_, (end, _))| *end + self.max_gap >= t)
            .map(|(&start, &(end, _))| (start, end));
        let right = intervals
            .range((Excluded(t), std::ops::Bound::Unbounded))
            .next()
            .filter(|(&start, _)| start - self.max_gap <= t)
            .map(|(&start, &(end, _))| (start, end));

        let (new_start, new_end, acc) = match (left, right) {
            (None, None) => {
                let acc = aggregator.accumulate(aggregator.create(), &item);
                (t, t, acc)
            }
            (Some((ls, le)), None) => {
                let (_, (_, acc)) = intervals.remove_entry(&ls).unwrap();
                self.index_remove(&key, ls, le);
                let acc = aggregator.accumulate(acc, &item);
                (ls.min(t), le.max(t), acc)
            }
            (None, Some((rs, re))) => {
                let (_, (_, acc)) = intervals.remove_entry(&rs).unwrap();
                self.index_remove(&key, rs, re);
                let acc = aggregator.accumulate(acc, &item);
                (rs.min(t), re.max(t), acc)
            }
            (Some((ls, le)), Some((rs, re))) => {
                let (_, (_, left_acc)) = intervals.remove_entry(&ls).unwrap();
                let (_, (_, right_acc)) = intervals.remove_entry(&rs).unwrap();
                self.index_remove(&key, ls, le);
                self.index_remove(&key, rs, re);
                let merged = aggregator.combine(left_acc, right_acc);
                let merged = aggregator.accumulate(merged, &item);
                (ls.min(t), re.max(t), merged)
            }
        };

        log::trace!(
            "session operator extended [{}, {}] for key at event time {}",
            new_start,
            new_end,
            t
        );
        self.key_to_intervals
            .get_mut(&key)
            .unwrap()
            .insert(new_start, (new_end, acc));
        self.index_insert(key, new_start, new_end);
    }

    fn stage_expire_up_to(&mut self, limit: Timestamp) {
        loop {
            let Some((&deadline, _)) = self.deadline_to_keys.iter().next() else {
                break;
            };
            if deadline > limit {
                break;
            }
            let (_, keys) = self.deadline_to_keys.pop_first().unwrap();
            for (key, start) in keys {
                let mut drop_key = false;
                if let Some(intervals) = self.key_to_intervals.get_mut(&key) {
                    if let Some((end, acc)) = intervals.remove(&start) {
                        let result = self.aggregator.finish(acc);
                        self.pending_out.push_back(Item::Data(Session {
                            key: key.clone(),
                            start,
                            // The emitted end is the session's expiry
                            // deadline (last event timestamp + maxGap), not
                            // the raw last timestamp.
                            end: end + self.max_gap,
                            result,
                        }));
                    }
                    drop_key = intervals.is_empty();
                }
                if drop_key {
                    self.key_to_intervals.remove(&key);
                }
            }
        }
    }

    fn stage_watermark(&mut self, w: Timestamp) {
        self.stage_expire_up_to(w);
        self.pending_out.push_back(Item::Watermark(w));
    }

    fn stage_complete(&mut self) {
        self.stage_expire_up_to(Timestamp::MAX);
    }

    fn drain_pending(&mut self) -> bool {
        let Self {
            pending_out,
            outbox,
            ..
        } = self;
        let outbox = outbox
            .as_mut()
            .expect("SessionOperator::init was never called");
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

impl<T, K, A, R, Ts, Kf> WindowOperator<T, Session<K, R>> for SessionOperator<T, K, A, R, Ts, Kf>
where
    T: Data,
    K: DataKey,
    A: Data,
    R: Data,
    Ts: Fn(&T) -> Timestamp + Send + 'static,
    Kf: Fn(&T) -> K + Send + 'static,
{
    fn init(&mut self, outbox: Box<dyn Outbox<Session<K, R>> + Send>, _context: Context) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::count;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct VecOutbox<T>(Arc<Mutex<Vec<Item<T>>>>);
    impl<T> VecOutbox<T> {
        fn new() -> Self {
            VecOutbox(Arc::new(Mutex::new(Vec::new())))
        }
        fn take(&self) -> Vec<Item<T>> {
            std::mem::take(&mut self.0.lock().unwrap())
        }
    }
    impl<T: Send> Outbox<T> for VecOutbox<T> {
        fn offer(&mut self, item: Item<T>) -> bool {
            self.0.lock().unwrap().push(item);
            true
        }
    }

    fn new_op(
        max_gap: i64,
    ) -> SessionOperator<
        (&'static str, i64),
        &'static str,
        u64,
        u64,
        impl Fn(&(&'static str, i64)) -> Timestamp + Send + 'static,
        impl Fn(&(&'static str, i64)) -> &'static str + Send + 'static,
    > {
        SessionOperator::new(
            max_gap,
            |e: &(&'static str, i64)| e.1,
            |e: &(&'static str, i64)| e.0,
            count(),
        )
        .unwrap()
    }

    fn run(
        op: &mut SessionOperator<
            (&'static str, i64),
            &'static str,
            u64,
            u64,
            impl Fn(&(&'static str, i64)) -> Timestamp + Send + 'static,
            impl Fn(&(&'static str, i64)) -> &'static str + Send + 'static,
        >,
        events: &[(&'static str, i64)],
        watermark: i64,
    ) -> Vec<Session<&'static str, u64>> {
        let out = VecOutbox::new();
        op.init(Box::new(out.clone()), Context);
        let mut inbox = super::super::VecDequeInbox::new();
        for &e in events {
            inbox.push(Item::Data(e));
        }
        inbox.push(Item::Watermark(watermark));
        assert!(op.process_item(0, &mut inbox));
        out.take()
            .into_iter()
            .filter_map(|item| match item {
                Item::Data(s) => Some(s),
                Item::Watermark(_) => None,
            })
            .collect()
    }

    #[test]
    fn scenario_a_ordered_one_key() {
        let mut op = new_op(10);
        let events = [("a", 1), ("a", 6), ("a", 12), ("a", 30), ("a", 35), ("a", 40)];
        let mut sessions = run(&mut op, &events, 100);
        sessions.sort_by_key(|s| s.start);
        assert_eq!(sessions.len(), 2);
        assert_eq!((sessions[0].start, sessions[0].end, sessions[0].result), (1, 22, 3));
        assert_eq!((sessions[1].start, sessions[1].end, sessions[1].result), (30, 50, 3));
    }

    #[test]
    fn scenario_b_disordered_one_key() {
        let mut op = new_op(10);
        let events = [("a", 30), ("a", 1), ("a", 40), ("a", 6), ("a", 35), ("a", 12)];
        let mut sessions = run(&mut op, &events, 100);
        sessions.sort_by_key(|s| s.start);
        assert_eq!(sessions.len(), 2);
        assert_eq!((sessions[0].start, sessions[0].end, sessions[0].result), (1, 22, 3));
        assert_eq!((sessions[1].start, sessions[1].end, sessions[1].result), (30, 50, 3));
    }

    #[test]
    fn scenario_c_three_keys() {
        let mut op = new_op(10);
        let events = [
            ("a", 1), ("a", 6), ("a", 12), ("a", 30), ("a", 35), ("a", 40),
            ("b", 1), ("b", 6), ("b", 12), ("b", 30), ("b", 35), ("b", 40),
            ("c", 1), ("c", 6), ("c", 12), ("c", 30), ("c", 35), ("c", 40),
        ];
        let sessions = run(&mut op, &events, 100);
        assert_eq!(sessions.len(), 6);
        for key in ["a", "b", "c"] {
            let mut for_key: Vec<_> = sessions.iter().filter(|s| s.key == key).collect();
            for_key.sort_by_key(|s| s.start);
            assert_eq!(for_key.len(), 2);
            assert_eq!((for_key[0].start, for_key[0].end, for_key[0].result), (1, 22, 3));
            assert_eq!((for_key[1].start, for_key[1].end, for_key[1].result), (30, 50, 3));
        }
    }

    #[test]
    fn zero_max_gap_produces_singleton_sessions() {
        let mut op = new_op(0);
        let events = [("a", 1), ("a", 2), ("a", 3)];
        let mut sessions = run(&mut op, &events, 100);
        sessions.sort_by_key(|s| s.start);
        assert_eq!(sessions.len(), 3);
        for s in &sessions {
            assert_eq!(s.start, s.end);
            assert_eq!(s.result, 1);
        }
    }

    #[test]
    fn late_event_bridges_two_sessions() {
        let mut op = new_op(10);
        // Two sessions form first ([0,0] and [20,20]), then a bridging
        // event at t=10 is within maxGap of both and merges them.
        let events = [("a", 0), ("a", 20), ("a", 10)];
        let sessions = run(&mut op, &events, 100);
        assert_eq!(sessions.len(), 1);
        assert_eq!((sessions[0].start, sessions[0].end, sessions[0].result), (0, 30, 3));
    }

    #[test]
    fn boundary_gap_merges() {
        let mut op = new_op(10);
        let events = [("a", 0), ("a", 10)];
        let sessions = run(&mut op, &events, 100);
        assert_eq!(sessions.len(), 1);
        assert_eq!((sessions[0].start, sessions[0].end, sessions[0].result), (0, 20, 2));
    }

    /// An outbox that accepts only `budget` items before rejecting, so
    /// tests can drive genuine backpressure and check resumption.
    #[derive(Clone)]
    struct LimitedOutbox<T> {
        inner: Arc<Mutex<Vec<Item<T>>>>,
        budget: Arc<Mutex<usize>>,
    }
    impl<T> LimitedOutbox<T> {
        fn new(budget: usize) -> Self {
            LimitedOutbox {
                inner: Arc::new(Mutex::new(Vec::new())),
                budget: Arc::new(Mutex::new(budget)),
            }
        }
        fn add_budget(&self, n: usize) {
            *self.budget.lock().unwrap() += n;
        }
        fn take(&self) -> Vec<Item<T>> {
            std::mem::take(&mut self.inner.lock().unwrap())
        }
    }
    impl<T: Send> Outbox<T> for LimitedOutbox<T> {
        fn offer(&mut self, item: Item<T>) -> bool {
            let mut budget = self.budget.lock().unwrap();
            if *budget == 0 {
                return false;
            }
            *budget -= 1;
            drop(budget);
            self.inner.lock().unwrap().push(item);
            true
        }
    }

    #[test]
    fn process_watermark_resumes_after_backpressure() {
        let mut op = new_op(10);
        let out = LimitedOutbox::new(1);
        op.init(Box::new(out.clone()), Context);
        let mut inbox = super::super::VecDequeInbox::new();
        for event in [
            ("a", 1), ("a", 6), ("a", 12),
            ("b", 1), ("b", 6), ("b", 12),
        ] {
            inbox.push(Item::Data(event));
        }
        assert!(op.process_item(0, &mut inbox));

        let mut retries = 0;
        while !op.process_watermark(100) {
            out.add_budget(1);
            retries += 1;
            assert!(retries < 20, "watermark processing never converged");
        }

        let mut sessions: Vec<_> = out
            .take()
            .into_iter()
            .filter_map(|item| match item {
                Item::Data(s) => Some(s),
                Item::Watermark(_) => None,
            })
            .collect();
        sessions.sort_by_key(|s| (s.key, s.start));
        assert_eq!(sessions.len(), 2);
        for s in &sessions {
            assert_eq!((s.start, s.end, s.result), (1, 22, 3));
        }
    }
}
