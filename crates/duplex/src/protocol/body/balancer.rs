//! Merging the demand of two consumers of the same body.
//!
//! A single signed accumulator `d = consumed_left - consumed_right` is enough to derive the
//! upstream signal for every policy: a report of `n` bytes from one side only needs the value of
//! `d` *before* the report to know how much of `n` moves the minimum (or maximum) of both totals.
//!
//! When one side discards, the accumulator is replaced by a sentinel and the remaining side
//! reports straight through. In [`SplitMode::Slowest`] the upstream is granted the exact deficit
//! between the remaining side and the old minimum at that moment, so the remaining side neither
//! stalls nor receives more than it consumed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};

use tracing::trace;

use crate::protocol::body::upstream::{SharedUpstream, Upstream};

/// Demand policy of a split body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    /// Upstream sees the progress of the slower side. Bounds buffering of the lagging side.
    #[default]
    Slowest,
    /// Upstream sees the progress of the faster side. Minimizes latency.
    Fastest,
    /// Upstream sees the progress of the original (left) side only.
    First,
}

const LEFT_GONE: i64 = i64::MIN;
const RIGHT_GONE: i64 = i64::MAX;

const LEFT_DISCARDED: u8 = 0b01;
const RIGHT_DISCARDED: u8 = 0b10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn flag(self) -> u8 {
        match self {
            Side::Left => LEFT_DISCARDED,
            Side::Right => RIGHT_DISCARDED,
        }
    }

    fn gone(self) -> i64 {
        match self {
            Side::Left => LEFT_GONE,
            Side::Right => RIGHT_GONE,
        }
    }

    /// How far this side was ahead of the other one for accumulator value `d`.
    fn lead(self, d: i64) -> i64 {
        match self {
            Side::Left => d,
            Side::Right => d.saturating_neg(),
        }
    }
}

/// Shared state of both sides of a split.
pub struct UpstreamBalancer {
    upstream: SharedUpstream,
    mode: SplitMode,
    delta: AtomicI64,
    discarded: AtomicU8,
    started: AtomicBool,
}

impl UpstreamBalancer {
    /// Splits `upstream` into a left and a right demand handle.
    pub fn split(upstream: SharedUpstream, mode: SplitMode) -> (SharedUpstream, SharedUpstream) {
        let balancer = Arc::new(UpstreamBalancer {
            upstream,
            mode,
            delta: AtomicI64::new(0),
            discarded: AtomicU8::new(0),
            started: AtomicBool::new(false),
        });

        let left = BalancedSide { balancer: Arc::clone(&balancer), side: Side::Left };
        let right = BalancedSide { balancer, side: Side::Right };
        (Arc::new(left), Arc::new(right))
    }

    fn on_consumed(&self, side: Side, bytes: u64) {
        if bytes == 0 {
            return;
        }

        let amount = i64::try_from(bytes).unwrap_or(i64::MAX);
        let change = match side {
            Side::Left => amount,
            Side::Right => -amount,
        };

        let updated = self.delta.fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| {
            if d == LEFT_GONE || d == RIGHT_GONE {
                None
            } else {
                Some(d.saturating_add(change).clamp(LEFT_GONE + 1, RIGHT_GONE - 1))
            }
        });

        let signal = match updated {
            Ok(previous) => self.signal(side, previous, bytes),
            // the other side is gone: pass through
            Err(gone) if gone != side.gone() => bytes,
            Err(_) => 0,
        };

        if signal > 0 {
            trace!(?side, bytes, signal, "balanced upstream demand");
            self.upstream.on_bytes_consumed(signal);
        }
    }

    fn signal(&self, side: Side, previous: i64, bytes: u64) -> u64 {
        let lead = side.lead(previous);
        match self.mode {
            SplitMode::Slowest => {
                if lead < 0 {
                    bytes.min(lead.unsigned_abs())
                } else {
                    0
                }
            }
            SplitMode::Fastest => {
                if lead >= 0 {
                    bytes
                } else {
                    bytes - bytes.min(lead.unsigned_abs())
                }
            }
            SplitMode::First => match side {
                Side::Left => bytes,
                Side::Right => 0,
            },
        }
    }

    fn start(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            self.upstream.start();
        }
    }

    fn discard(&self, side: Side) {
        let flag = side.flag();
        let previous = self.discarded.fetch_or(flag, Ordering::AcqRel);
        if previous & flag != 0 {
            return;
        }

        if previous != 0 {
            trace!("both sides of split body discarded");
            self.upstream.discard();
            return;
        }

        let gates_upstream = match self.mode {
            SplitMode::Slowest => true,
            SplitMode::Fastest => false,
            SplitMode::First => side == Side::Left,
        };
        if !gates_upstream {
            return;
        }

        let previous = self.delta.swap(side.gone(), Ordering::AcqRel);
        if previous == LEFT_GONE || previous == RIGHT_GONE {
            return;
        }

        // the remaining side was ahead of what upstream has seen so far
        let deficit = side.lead(previous).saturating_neg();
        if deficit > 0 {
            trace!(?side, deficit, "split side discarded, releasing held demand");
            self.upstream.on_bytes_consumed(deficit.unsigned_abs());
        }
    }
}

impl std::fmt::Debug for UpstreamBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamBalancer")
            .field("mode", &self.mode)
            .field("delta", &self.delta.load(Ordering::Relaxed))
            .field("discarded", &self.discarded.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// One side of an [`UpstreamBalancer`].
#[derive(Debug)]
struct BalancedSide {
    balancer: Arc<UpstreamBalancer>,
    side: Side,
}

impl Upstream for BalancedSide {
    fn start(&self) {
        self.balancer.start();
    }

    fn on_bytes_consumed(&self, bytes: u64) {
        self.balancer.on_consumed(self.side, bytes);
    }

    fn discard(&self) {
        self.balancer.discard(self.side);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::body::upstream::MockUpstream;
    use std::sync::atomic::AtomicU64;
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        total: AtomicU64,
        starts: AtomicU64,
        discards: AtomicU64,
    }

    impl Upstream for Recorder {
        fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_bytes_consumed(&self, bytes: u64) {
            self.total.fetch_add(bytes, Ordering::SeqCst);
        }

        fn discard(&self) {
            self.discards.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Recorder {
        fn total(&self) -> u64 {
            self.total.load(Ordering::SeqCst)
        }
    }

    fn split(mode: SplitMode) -> (Arc<Recorder>, SharedUpstream, SharedUpstream) {
        let recorder = Arc::new(Recorder::default());
        let (left, right) = UpstreamBalancer::split(Arc::clone(&recorder) as SharedUpstream, mode);
        (recorder, left, right)
    }

    #[test]
    fn slowest_tracks_minimum() {
        let (recorder, left, right) = split(SplitMode::Slowest);

        left.on_bytes_consumed(5);
        assert_eq!(recorder.total(), 0);

        right.on_bytes_consumed(2);
        assert_eq!(recorder.total(), 2);

        right.on_bytes_consumed(1);
        assert_eq!(recorder.total(), 3);

        right.on_bytes_consumed(4);
        assert_eq!(recorder.total(), 5);

        left.on_bytes_consumed(3);
        assert_eq!(recorder.total(), 7);
    }

    #[test]
    fn fastest_tracks_maximum() {
        let (recorder, left, right) = split(SplitMode::Fastest);

        left.on_bytes_consumed(5);
        assert_eq!(recorder.total(), 5);

        right.on_bytes_consumed(2);
        assert_eq!(recorder.total(), 5);

        right.on_bytes_consumed(1);
        assert_eq!(recorder.total(), 5);

        right.on_bytes_consumed(4);
        assert_eq!(recorder.total(), 7);

        left.on_bytes_consumed(3);
        assert_eq!(recorder.total(), 8);
    }

    #[test]
    fn first_follows_left_only() {
        let (recorder, left, right) = split(SplitMode::First);

        right.on_bytes_consumed(10);
        assert_eq!(recorder.total(), 0);

        left.on_bytes_consumed(4);
        assert_eq!(recorder.total(), 4);
    }

    #[test]
    fn first_hands_over_to_right_when_left_discards() {
        let (recorder, left, right) = split(SplitMode::First);

        left.on_bytes_consumed(4);
        right.on_bytes_consumed(10);
        left.discard();
        assert_eq!(recorder.total(), 10);

        right.on_bytes_consumed(1);
        assert_eq!(recorder.total(), 11);
        assert_eq!(recorder.discards.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn slowest_discard_releases_exact_deficit() {
        let (recorder, left, right) = split(SplitMode::Slowest);

        left.on_bytes_consumed(3);
        right.on_bytes_consumed(8);
        assert_eq!(recorder.total(), 3);

        // right stands 5 bytes ahead of what upstream saw
        left.discard();
        assert_eq!(recorder.total(), 8);

        right.on_bytes_consumed(2);
        assert_eq!(recorder.total(), 10);

        // reports of a discarded side are ignored
        left.on_bytes_consumed(100);
        assert_eq!(recorder.total(), 10);
    }

    #[test]
    fn slowest_discard_of_leading_side_grants_nothing() {
        let (recorder, left, right) = split(SplitMode::Slowest);

        left.on_bytes_consumed(9);
        right.on_bytes_consumed(4);
        assert_eq!(recorder.total(), 4);

        left.discard();
        assert_eq!(recorder.total(), 4);

        right.on_bytes_consumed(1);
        assert_eq!(recorder.total(), 5);
    }

    #[test]
    fn upstream_discarded_once_after_both_sides() {
        let mut upstream = MockUpstream::new();
        upstream.expect_discard().times(1).return_const(());
        upstream.expect_on_bytes_consumed().returning(|_| ());

        let (left, right) = UpstreamBalancer::split(Arc::new(upstream), SplitMode::Slowest);
        left.discard();
        left.discard();
        right.discard();
        right.discard();
    }

    #[test]
    fn start_forwarded_once() {
        let (recorder, left, right) = split(SplitMode::Slowest);
        left.start();
        right.start();
        left.start();
        assert_eq!(recorder.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unlimited_demand_saturates() {
        let (recorder, left, right) = split(SplitMode::Slowest);
        left.on_bytes_consumed(u64::MAX);
        left.on_bytes_consumed(u64::MAX);
        right.on_bytes_consumed(10);
        assert_eq!(recorder.total(), 10);
    }

    #[test]
    fn concurrent_reports_settle_on_minimum() {
        let (recorder, left, right) = split(SplitMode::Slowest);

        let workers: Vec<_> = [(left, 3_u64), (right, 5_u64)]
            .into_iter()
            .map(|(side, step)| {
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        side.on_bytes_consumed(step);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(recorder.total(), 30_000);
    }
}
