//! Send-side and receive-side packet bookkeeping.
//!
//! # Sending
//!
//! The contract owns the send sequence of its bound channel. Before a packet
//! leaves, [`PacketLedger::send`] allocates the sequence and stores the
//! pending operation under it, so the state change and the packet are part
//! of the same transaction. The operation is handed back exactly once, by
//! [`PacketLedger::resolve`], when the ack or timeout arrives; later
//! resolutions of the same sequence find nothing.
//!
//! # Receiving
//!
//! The relay is at-least-once. Every acknowledgement written for an inbound
//! packet is kept as a receipt, error acks included, so that a redelivered
//! packet gets the original answer and never touches the ledger twice.

use im::OrdMap;
use mesh_messages::Acknowledgement;
use mesh_types::Sequence;
use tracing::{debug, trace};

/// Pending operations and receipts for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketLedger<Op: Clone> {
    next_sequence: Sequence,
    pending: OrdMap<Sequence, Op>,
    receipts: OrdMap<Sequence, Acknowledgement>,
}

impl<Op: Clone> Default for PacketLedger<Op> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Op: Clone> PacketLedger<Op> {
    pub fn new() -> Self {
        Self {
            next_sequence: Sequence::FIRST,
            pending: OrdMap::new(),
            receipts: OrdMap::new(),
        }
    }

    /// Allocate the next send sequence and record `op` under it.
    pub fn send(&mut self, op: Op) -> Sequence {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.next();
        self.pending.insert(sequence, op);
        trace!(%sequence, pending = self.pending.len(), "Recorded pending packet");
        sequence
    }

    /// Take the pending operation for `sequence`, if still unresolved.
    pub fn resolve(&mut self, sequence: Sequence) -> Option<Op> {
        let op = self.pending.remove(&sequence);
        if op.is_none() {
            debug!(%sequence, "Ignoring resolution of unknown or resolved packet");
        }
        op
    }

    /// Pending operation for `sequence`, without resolving it.
    pub fn pending(&self, sequence: Sequence) -> Option<&Op> {
        self.pending.get(&sequence)
    }

    /// All unresolved sends in sequence order.
    pub fn pending_iter(&self) -> impl Iterator<Item = (&Sequence, &Op)> {
        self.pending.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sequence the next send will use.
    pub fn next_sequence(&self) -> Sequence {
        self.next_sequence
    }

    /// Stored ack for an already processed inbound packet.
    pub fn receipt(&self, sequence: Sequence) -> Option<&Acknowledgement> {
        self.receipts.get(&sequence)
    }

    /// Remember the ack written for an inbound packet.
    pub fn record_receipt(&mut self, sequence: Sequence, ack: Acknowledgement) {
        self.receipts.insert(sequence, ack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_and_single_resolution() {
        let mut ledger: PacketLedger<&'static str> = PacketLedger::new();
        let a = ledger.send("stake");
        let b = ledger.send("unstake");
        assert_eq!(a, Sequence(1));
        assert_eq!(b, Sequence(2));
        assert_eq!(ledger.next_sequence(), Sequence(3));

        // Out of order resolution
        assert_eq!(ledger.resolve(b), Some("unstake"));
        assert_eq!(ledger.resolve(b), None, "second resolution must be a no-op");
        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(ledger.resolve(a), Some("stake"));
    }

    #[test]
    fn test_receipts() {
        let mut ledger: PacketLedger<()> = PacketLedger::new();
        assert!(ledger.receipt(Sequence(4)).is_none());
        ledger.record_receipt(Sequence(4), Acknowledgement::error("capacity"));
        assert_eq!(
            ledger.receipt(Sequence(4)),
            Some(&Acknowledgement::error("capacity"))
        );
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut ledger: PacketLedger<u32> = PacketLedger::new();
        ledger.send(1);
        let snapshot = ledger.clone();
        ledger.send(2);
        assert_eq!(snapshot.pending_count(), 1);
        assert_eq!(ledger.pending_count(), 2);
    }
}
