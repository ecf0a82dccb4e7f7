//! Track fan-out (C1/C4): the runtime handle connecting one producer's RTP
//! packets to zero or more consumer sinks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::Mutex;
use rtp::packet::Packet;

use super::media::Codec;

/// A subscriber receives RTP packets written to the track. Implementations
/// MUST NOT block; slow consumers are expected to drop or buffer on their own
/// side (§4.4, §5).
pub trait Subscriber: Send + Sync {
    fn on_packet(&self, packet: &Packet);
}

struct SubscriberEntry {
    id: u64,
    subscriber: Arc<dyn Subscriber>,
}

/// The unit of lifetime for packet flow between one producer media and N
/// consumers. Cloning a `Track` shares the same fan-out state.
#[derive(Clone)]
pub struct Track {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    codec: Codec,
    /// Copy-on-write snapshot of the subscriber list; `write_rtp` reads this
    /// without taking a lock (§5 "Shared state discipline").
    subscribers: ArcSwap<Vec<SubscriberEntry>>,
    /// Only subscribe/unsubscribe take this lock, never `write_rtp`.
    mutation_lock: Mutex<()>,
    next_id: AtomicU64,
    refcount: AtomicU64,
}

impl Track {
    pub fn new(codec: Codec) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                codec,
                subscribers: ArcSwap::from_pointee(Vec::new()),
                mutation_lock: Mutex::new(()),
                next_id: AtomicU64::new(1),
                refcount: AtomicU64::new(0),
            }),
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> u64 {
        self.inner.refcount.load(Ordering::Acquire)
    }

    /// Register a subscriber. Returns a handle used to unsubscribe later.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionHandle {
        let _guard = self.inner.mutation_lock.lock();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut next: Vec<SubscriberEntry> = (**self.inner.subscribers.load()).iter().map(|e| SubscriberEntry { id: e.id, subscriber: e.subscriber.clone() }).collect();
        next.push(SubscriberEntry { id, subscriber });
        self.inner.subscribers.store(Arc::new(next));
        self.inner.refcount.fetch_add(1, Ordering::AcqRel);

        SubscriptionHandle {
            track: self.clone(),
            id,
        }
    }

    fn unsubscribe(&self, id: u64) {
        let _guard = self.inner.mutation_lock.lock();
        let current = self.inner.subscribers.load();
        if !current.iter().any(|e| e.id == id) {
            return;
        }
        let next: Vec<SubscriberEntry> = current
            .iter()
            .filter(|e| e.id != id)
            .map(|e| SubscriberEntry { id: e.id, subscriber: e.subscriber.clone() })
            .collect();
        self.inner.subscribers.store(Arc::new(next));
        self.inner.refcount.fetch_sub(1, Ordering::AcqRel);
    }

    /// Write one RTP packet to every active subscriber, in registration order.
    /// Never copies the payload; never blocks on a lock. Errors from
    /// subscribers are not observable here by design (§4.4) — a `Subscriber`
    /// that needs to surface failures does so out-of-band.
    pub fn write_rtp(&self, packet: &Packet) {
        let snapshot = self.inner.subscribers.load();
        for entry in snapshot.iter() {
            entry.subscriber.on_packet(packet);
        }
    }

    /// Build a standalone `Bytes` payload-preserving clone suitable for a
    /// subscriber that needs to retain the packet past the callback (the
    /// fan-out layer itself never does this).
    pub fn clone_payload(packet: &Packet) -> Bytes {
        packet.payload.clone()
    }
}

/// RAII handle returned by [`Track::subscribe`]; dropping it unsubscribes.
pub struct SubscriptionHandle {
    track: Track,
    id: u64,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.track.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::CodecName;
    use std::sync::atomic::AtomicUsize;

    struct CountingSubscriber(Arc<AtomicUsize>);

    impl Subscriber for CountingSubscriber {
        fn on_packet(&self, _packet: &Packet) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_packet() -> Packet {
        Packet {
            payload: Bytes::from_static(b"payload"),
            ..Default::default()
        }
    }

    #[test]
    fn fan_out_delivers_to_all_subscribers() {
        let track = Track::new(Codec::new(CodecName::H264, 90_000, 96));
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));

        let _h1 = track.subscribe(Arc::new(CountingSubscriber(count_a.clone())));
        let _h2 = track.subscribe(Arc::new(CountingSubscriber(count_b.clone())));

        track.write_rtp(&sample_packet());

        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
        assert_eq!(track.subscriber_count(), 2);
    }

    #[test]
    fn dropping_handle_unsubscribes_and_decrements_refcount() {
        let track = Track::new(Codec::new(CodecName::H264, 90_000, 96));
        let count = Arc::new(AtomicUsize::new(0));
        let handle = track.subscribe(Arc::new(CountingSubscriber(count.clone())));
        assert_eq!(track.subscriber_count(), 1);

        drop(handle);
        assert_eq!(track.subscriber_count(), 0);

        track.write_rtp(&sample_packet());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
