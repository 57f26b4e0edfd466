//! The sender's retransmission ledger.
//!
//! A fresh datagram moves from `send_buf` to `unacked` on its first send and
//! leaves `unacked` when acked, capped out, or wiped by recovery. A
//! retransmission is a copy pushed to the front of `send_buf`; the tracking
//! (`num_rtx`, `last_send_ts`) stays on the original `unacked` entry. There
//! is no NAK: an ACK for a later fragment is the signal that earlier
//! in-flight fragments are likely lost.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use anyhow::{bail, Result};
use tracing::{debug, warn};

use vidlink_protocol::datagram::{FragmentKey, FrameDatagram};
use vidlink_protocol::message::Ack;

use crate::rtt::RttEstimator;

/// Retransmissions per fragment before giving up on it.
pub const MAX_NUM_RTX: u32 = 3;

/// Age of the oldest unacked fragment that triggers key-frame recovery.
pub const MAX_UNACKED_US: u64 = 1_000_000;

#[derive(Default)]
pub struct RetransmitManager {
    send_buf: VecDeque<FrameDatagram>,
    unacked: BTreeMap<FragmentKey, FrameDatagram>,
    rtt: RttEstimator,
}

impl RetransmitManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_buf(&mut self) -> &mut VecDeque<FrameDatagram> {
        &mut self.send_buf
    }

    pub fn has_queued(&self) -> bool {
        !self.send_buf.is_empty()
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// Queue freshly packetized fragments behind whatever is pending.
    pub fn enqueue(&mut self, fragments: impl IntoIterator<Item = FrameDatagram>) {
        self.send_buf.extend(fragments);
    }

    /// Track a datagram that was just sent for the first time. Duplicate
    /// keys violate the ledger invariant and are fatal.
    pub fn add_unacked(&mut self, datagram: FrameDatagram) -> Result<()> {
        let key = datagram.key();
        match self.unacked.entry(key) {
            Entry::Occupied(_) => bail!("datagram {key:?} already exists in unacked"),
            Entry::Vacant(slot) => {
                let datagram = slot.insert(datagram);
                datagram.last_send_ts = datagram.send_ts;
                Ok(())
            }
        }
    }

    /// Process one ACK: sample the RTT, retransmit in-flight fragments older
    /// than the acked one, and retire the acked entry.
    ///
    /// Retransmissions jump to the front of `send_buf`; a fragment is only
    /// re-sent on its first loss signal or once per EWMA-RTT thereafter, and
    /// never more than [`MAX_NUM_RTX`] times.
    pub fn handle_ack(&mut self, ack: &Ack, now_us: u64) {
        self.rtt.add_sample(now_us.saturating_sub(ack.send_ts));

        let acked_key = FragmentKey {
            frame_id: ack.frame_id,
            frag_id: ack.frag_id,
        };
        if !self.unacked.contains_key(&acked_key) {
            // already retired; re-delivered ACKs are a no-op
            return;
        }

        // sampled just above, so always present
        let ewma_rtt_us = self.rtt.ewma_rtt_us().unwrap_or(0.0);

        for (key, datagram) in self.unacked.range_mut(..acked_key).rev() {
            if datagram.num_rtx >= MAX_NUM_RTX {
                continue;
            }

            if datagram.num_rtx == 0
                || now_us.saturating_sub(datagram.last_send_ts) as f64 > ewma_rtt_us
            {
                datagram.num_rtx += 1;
                datagram.last_send_ts = now_us;
                debug!(
                    "retransmitting frame_id={} frag_id={} rtx={}",
                    key.frame_id, key.frag_id, datagram.num_rtx
                );
                self.send_buf.push_front(datagram.clone());
            }
        }

        self.unacked.remove(&acked_key);
    }

    /// Called at each encode boundary. When the oldest in-flight fragment
    /// has aged past [`MAX_UNACKED_US`], drop all recovery state; the caller
    /// must force the next encoded frame to be a key frame.
    pub fn check_give_up(&mut self, now_us: u64) -> bool {
        let Some((key, oldest)) = self.unacked.first_key_value() else {
            return false;
        };

        let age_us = now_us.saturating_sub(oldest.send_ts);
        if age_us <= MAX_UNACKED_US {
            return false;
        }

        warn!(
            "recovery: giving up on datagram frame_id={} frag_id={} (rtx={}, {age_us} us since first send); forcing a key frame",
            key.frame_id, key.frag_id, oldest.num_rtx
        );
        self.send_buf.clear();
        self.unacked.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use vidlink_protocol::datagram::FrameType;

    fn datagram(frame_id: u32, frag_id: u16, frag_count: u16) -> FrameDatagram {
        FrameDatagram::new(
            frame_id,
            FrameType::NonKey,
            frag_id,
            frag_count,
            64,
            64,
            Bytes::from_static(b"payload"),
        )
    }

    fn ack(frame_id: u32, frag_id: u16, send_ts: u64) -> Ack {
        Ack {
            frame_id,
            frag_id,
            send_ts,
        }
    }

    /// Simulate the scheduler draining the send buffer at `now_us`.
    fn drain_wire(manager: &mut RetransmitManager, now_us: u64) -> Vec<FrameDatagram> {
        let mut sent = Vec::new();
        while let Some(mut datagram) = manager.send_buf().pop_front() {
            datagram.send_ts = now_us;
            if datagram.num_rtx == 0 {
                manager.add_unacked(datagram.clone()).unwrap();
            }
            sent.push(datagram);
        }
        sent
    }

    #[test]
    fn ack_of_a_later_fragment_retransmits_earlier_ones() {
        let mut manager = RetransmitManager::new();
        manager.enqueue((0..3).map(|i| datagram(0, i, 3)));
        drain_wire(&mut manager, 1_000);

        // fragment 1 is lost; the ACK of fragment 2 triggers its
        // retransmission (and fragment 0's, which is also still in flight)
        manager.handle_ack(&ack(0, 2, 1_000), 6_000);

        let resent = drain_wire(&mut manager, 7_000);
        let keys: Vec<(u32, u16)> = resent.iter().map(|d| (d.frame_id, d.frag_id)).collect();
        assert_eq!(keys, [(0, 0), (0, 1)]);
        assert!(resent.iter().all(|d| d.num_rtx == 1));
    }

    #[test]
    fn acked_fragments_are_retired() {
        let mut manager = RetransmitManager::new();
        manager.enqueue([datagram(0, 0, 1)]);
        drain_wire(&mut manager, 1_000);

        manager.handle_ack(&ack(0, 0, 1_000), 2_000);
        assert!(!manager.has_queued());

        // nothing left to give up on
        assert!(!manager.check_give_up(10_000_000));
    }

    #[test]
    fn redelivered_acks_are_a_no_op() {
        let mut manager = RetransmitManager::new();
        manager.enqueue((0..2).map(|i| datagram(0, i, 2)));
        drain_wire(&mut manager, 1_000);

        manager.handle_ack(&ack(0, 1, 1_000), 2_000);
        let resent = drain_wire(&mut manager, 3_000);
        assert_eq!(resent.len(), 1);

        // the same ACK again: already retired, nothing happens
        manager.handle_ack(&ack(0, 1, 1_000), 4_000);
        assert!(!manager.has_queued());
    }

    #[test]
    fn retransmissions_are_gated_on_the_ewma_rtt() {
        let mut manager = RetransmitManager::new();
        manager.enqueue((0..3).map(|i| datagram(0, i, 3)));
        drain_wire(&mut manager, 1_000);

        // EWMA becomes 5000 us; fragment 0 is retransmitted immediately
        manager.handle_ack(&ack(0, 2, 1_000), 6_000);
        assert_eq!(drain_wire(&mut manager, 6_000).len(), 2);

        // 2000 us later: less than one RTT since the last retransmission,
        // so the ACK of fragment 1 must not retransmit fragment 0 again
        manager.handle_ack(&ack(0, 1, 1_000), 8_000);
        assert!(!manager.has_queued());

        // but one RTT later it is retransmitted again on the next signal
        manager.enqueue([datagram(1, 0, 1)]);
        drain_wire(&mut manager, 20_000);
        manager.handle_ack(&ack(1, 0, 20_000), 25_000);
        let resent = drain_wire(&mut manager, 26_000);
        assert_eq!(resent.len(), 1);
        assert_eq!((resent[0].frame_id, resent[0].frag_id), (0, 0));
        assert_eq!(resent[0].num_rtx, 2);
    }

    #[test]
    fn fragments_are_never_sent_more_than_one_plus_max_rtx_times() {
        let mut manager = RetransmitManager::new();
        manager.enqueue([datagram(0, 0, 2), datagram(0, 1, 2)]);
        let mut transmissions = drain_wire(&mut manager, 0)
            .iter()
            .filter(|d| (d.frame_id, d.frag_id) == (0, 0))
            .count();

        // each ACK of fragment 1 nudges fragment 0; ACK send_ts of 0 keeps
        // the EWMA at ~0 so the gate is always open
        let mut now = 1_000_000;
        for round in 0..10u64 {
            manager.enqueue([datagram(1 + round as u32, 0, 1)]);
            drain_wire(&mut manager, now);
            manager.handle_ack(&ack(1 + round as u32, 0, now), now + 10);
            transmissions += drain_wire(&mut manager, now + 20)
                .iter()
                .filter(|d| (d.frame_id, d.frag_id) == (0, 0))
                .count();
            now += 1_000_000;
        }

        // 1 original + MAX_NUM_RTX retransmissions
        assert_eq!(transmissions, 1 + MAX_NUM_RTX as usize);
    }

    #[test]
    fn give_up_wipes_the_ledger_after_one_second() {
        let mut manager = RetransmitManager::new();
        manager.enqueue((0..3).map(|i| datagram(0, i, 3)));
        drain_wire(&mut manager, 1_000);
        manager.enqueue([datagram(1, 0, 1)]);

        // not yet stale
        assert!(!manager.check_give_up(1_000 + MAX_UNACKED_US));
        assert!(manager.has_queued());

        // past the deadline: everything is wiped and a key frame is due
        assert!(manager.check_give_up(1_001 + MAX_UNACKED_US));
        assert!(!manager.has_queued());
        assert!(!manager.check_give_up(2_000 + MAX_UNACKED_US));
    }

    #[test]
    fn duplicate_unacked_entries_are_rejected() {
        let mut manager = RetransmitManager::new();
        let mut first = datagram(0, 0, 1);
        first.send_ts = 1_000;
        manager.add_unacked(first.clone()).unwrap();
        assert!(manager.add_unacked(first).is_err());
    }
}
