//! Outgoing command bookkeeping.
//!
//! The protocol carries no correlation ids: a command is acknowledged
//! by the status line for its reply attribute, and rejection lines name
//! no command at all. The dispatcher therefore keeps at most one
//! command of each kind in flight, queueing later same-kind commands
//! behind it, which makes reply matching unambiguous and acknowledgment
//! order FIFO per kind. The dispatcher is plain data owned by the
//! session task; it never blocks.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use azurctl_protocol::{AttrKey, Command, CommandKind, Property, PropertyValue, RejectReason};
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::error::{ClientError, ClientResult};

/// Outcome of a completed command.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    /// The device answered with the expected status line.
    Confirmed {
        /// Property the reply updated.
        property: Property,
        /// Value the device reported.
        value: PropertyValue,
    },
    /// The command was handed to the transport; this kind is never
    /// echoed by the device.
    Sent,
}

/// Completion side of a command handle.
pub type AckSender = oneshot::Sender<ClientResult<Ack>>;

struct InFlight {
    kind: CommandKind,
    expected: AttrKey,
    issued: Instant,
    tx: AckSender,
}

struct Queued {
    command: Command,
    expected: AttrKey,
    tx: AckSender,
}

/// Tracks in-flight and queued commands for one session.
pub struct Dispatcher {
    /// Dispatch order; at most one entry per kind.
    in_flight: Vec<InFlight>,
    /// Same-kind commands waiting behind an in-flight one.
    queued: HashMap<CommandKind, VecDeque<Queued>>,
    timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the given acknowledgment timeout.
    pub fn new(timeout: Duration) -> Self {
        Dispatcher {
            in_flight: Vec::new(),
            queued: HashMap::new(),
            timeout,
        }
    }

    /// Accept a command for transmission.
    ///
    /// Returns the bytes to write now, or `None` if the command was
    /// queued behind an outstanding command of the same kind. Commands
    /// the device does not echo resolve `Sent` immediately.
    pub fn dispatch(&mut self, command: Command, tx: AckSender) -> Option<Vec<u8>> {
        let kind = command.kind();

        let Some(expected) = command.expected_reply() else {
            let bytes = command.encode();
            let _ = tx.send(Ok(Ack::Sent));
            return Some(bytes);
        };

        let kind_busy = self.in_flight.iter().any(|p| p.kind == kind)
            || self.queued.get(&kind).is_some_and(|q| !q.is_empty());
        if kind_busy {
            trace!(?kind, "queued behind outstanding command");
            self.queued.entry(kind).or_default().push_back(Queued {
                command,
                expected,
                tx,
            });
            return None;
        }

        Some(self.issue(command, kind, expected, tx))
    }

    /// Feed a status line through ack correlation.
    ///
    /// Resolves the oldest in-flight command expecting this attribute,
    /// if any, and returns the bytes of a released same-kind successor
    /// to write.
    pub fn on_status(
        &mut self,
        key: AttrKey,
        property: Property,
        value: &PropertyValue,
    ) -> Option<Vec<u8>> {
        let pos = self.in_flight.iter().position(|p| p.expected == key)?;
        let pending = self.in_flight.remove(pos);
        trace!(kind = ?pending.kind, %key, "command acknowledged");
        let _ = pending.tx.send(Ok(Ack::Confirmed {
            property,
            value: value.clone(),
        }));
        self.release_next(pending.kind)
    }

    /// Handle a rejection line.
    ///
    /// Rejections carry no echo of the offending command, so this fails
    /// the oldest in-flight command overall.
    pub fn on_rejected(&mut self, reason: RejectReason) -> Option<Vec<u8>> {
        if self.in_flight.is_empty() {
            warn!(%reason, "rejection with no command in flight");
            return None;
        }
        let pending = self.in_flight.remove(0);
        warn!(kind = ?pending.kind, %reason, "command rejected");
        let _ = pending.tx.send(Err(ClientError::Rejected(reason)));
        self.release_next(pending.kind)
    }

    /// Expire in-flight commands older than the timeout.
    ///
    /// Each expiry resolves its handle with `Timeout` and may release a
    /// queued successor; the returned byte vectors must all be written.
    pub fn sweep(&mut self) -> Vec<Vec<u8>> {
        let now = Instant::now();
        let mut writes = Vec::new();

        let mut i = 0;
        while i < self.in_flight.len() {
            if now.duration_since(self.in_flight[i].issued) >= self.timeout {
                let pending = self.in_flight.remove(i);
                warn!(kind = ?pending.kind, "command timed out");
                let _ = pending.tx.send(Err(ClientError::Timeout));
                if let Some(bytes) = self.release_next(pending.kind) {
                    writes.push(bytes);
                }
            } else {
                i += 1;
            }
        }
        writes
    }

    /// Fail every in-flight and queued command with `ConnectionLost`.
    pub fn fail_all(&mut self) {
        for pending in self.in_flight.drain(..) {
            let _ = pending.tx.send(Err(ClientError::ConnectionLost));
        }
        for (_, queue) in self.queued.drain() {
            for queued in queue {
                let _ = queued.tx.send(Err(ClientError::ConnectionLost));
            }
        }
    }

    /// Number of commands awaiting acknowledgment.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn issue(
        &mut self,
        command: Command,
        kind: CommandKind,
        expected: AttrKey,
        tx: AckSender,
    ) -> Vec<u8> {
        let bytes = command.encode();
        self.in_flight.push(InFlight {
            kind,
            expected,
            issued: Instant::now(),
            tx,
        });
        bytes
    }

    /// Promote the next queued command of a kind whose slot just freed.
    fn release_next(&mut self, kind: CommandKind) -> Option<Vec<u8>> {
        let next = self.queued.get_mut(&kind)?.pop_front()?;
        trace!(?kind, "releasing queued command");
        Some(self.issue(next.command, kind, next.expected, next.tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azurctl_protocol::AudioSource;
    use tokio::sync::oneshot::Receiver;

    fn channel() -> (AckSender, Receiver<ClientResult<Ack>>) {
        oneshot::channel()
    }

    fn confirmed(rx: &mut Receiver<ClientResult<Ack>>) -> Ack {
        rx.try_recv()
            .expect("handle should be resolved")
            .expect("expected an ack")
    }

    #[test]
    fn test_unechoed_command_resolves_sent() {
        let mut dispatcher = Dispatcher::new(Duration::from_secs(2));
        let (tx, mut rx) = channel();

        let bytes = dispatcher.dispatch(Command::BassUp, tx);
        assert_eq!(bytes.as_deref(), Some(b"#1,04,\r".as_slice()));
        assert_eq!(confirmed(&mut rx), Ack::Sent);
        assert_eq!(dispatcher.in_flight_count(), 0);
    }

    #[test]
    fn test_same_kind_queues_and_acks_fifo() {
        let mut dispatcher = Dispatcher::new(Duration::from_secs(2));
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        let first = dispatcher.dispatch(Command::SelectInput(4), tx1);
        assert!(first.is_some());

        // Second select queues; nothing goes on the wire yet.
        let second = dispatcher.dispatch(Command::SelectInput(6), tx2);
        assert!(second.is_none());
        assert!(rx2.try_recv().is_err());

        // First ack resolves the first handle and releases the second
        // command.
        let released = dispatcher.on_status(
            AttrKey::new(7, 1),
            Property::SelectedInput,
            &PropertyValue::Integer(4),
        );
        assert_eq!(released.as_deref(), Some(b"#2,01,06\r".as_slice()));
        match confirmed(&mut rx1) {
            Ack::Confirmed { value, .. } => assert_eq!(value, PropertyValue::Integer(4)),
            other => panic!("expected Confirmed, got {:?}", other),
        }
        assert!(rx2.try_recv().is_err());

        let released = dispatcher.on_status(
            AttrKey::new(7, 1),
            Property::SelectedInput,
            &PropertyValue::Integer(6),
        );
        assert!(released.is_none());
        match confirmed(&mut rx2) {
            Ack::Confirmed { value, .. } => assert_eq!(value, PropertyValue::Integer(6)),
            other => panic!("expected Confirmed, got {:?}", other),
        }
    }

    #[test]
    fn test_different_kinds_run_concurrently() {
        let mut dispatcher = Dispatcher::new(Duration::from_secs(2));
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        assert!(dispatcher.dispatch(Command::SetPower(true), tx1).is_some());
        assert!(dispatcher
            .dispatch(Command::SetAudioSource(AudioSource::Hdmi), tx2)
            .is_some());
        assert_eq!(dispatcher.in_flight_count(), 2);
    }

    #[test]
    fn test_unrelated_status_matches_nothing() {
        let mut dispatcher = Dispatcher::new(Duration::from_secs(2));
        let (tx, mut rx) = channel();
        dispatcher.dispatch(Command::SetPower(true), tx);

        let released = dispatcher.on_status(
            AttrKey::new(6, 11),
            Property::Mute,
            &PropertyValue::Bool(false),
        );
        assert!(released.is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(dispatcher.in_flight_count(), 1);
    }

    #[test]
    fn test_rejection_fails_oldest() {
        let mut dispatcher = Dispatcher::new(Duration::from_secs(2));
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        dispatcher.dispatch(Command::SetPower(true), tx1);
        dispatcher.dispatch(Command::SetMute(true), tx2);

        dispatcher.on_rejected(RejectReason::InvalidData);
        match rx1.try_recv().expect("oldest should be resolved") {
            Err(ClientError::Rejected(RejectReason::InvalidData)) => {}
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_timeout_releases_queue_and_spares_other_kinds() {
        let mut dispatcher = Dispatcher::new(Duration::from_millis(50));
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        dispatcher.dispatch(Command::SelectInput(2), tx1);
        dispatcher.dispatch(Command::SelectInput(3), tx2);

        // The in-flight select expires; its queued successor is
        // released (with a fresh clock) instead of being expired with
        // it.
        std::thread::sleep(Duration::from_millis(60));
        let writes = dispatcher.sweep();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], b"#2,01,03\r");
        assert!(matches!(rx1.try_recv(), Ok(Err(ClientError::Timeout))));
        assert!(rx2.try_recv().is_err());

        // A different kind dispatched after the expiry goes straight
        // out.
        let (tx3, _rx3) = channel();
        assert!(dispatcher.dispatch(Command::SetMute(true), tx3).is_some());
    }

    #[test]
    fn test_fail_all_covers_queued() {
        let mut dispatcher = Dispatcher::new(Duration::from_secs(2));
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();

        dispatcher.dispatch(Command::SetPower(true), tx1);
        dispatcher.dispatch(Command::SetPower(false), tx2);

        dispatcher.fail_all();
        assert!(matches!(
            rx1.try_recv(),
            Ok(Err(ClientError::ConnectionLost))
        ));
        assert!(matches!(
            rx2.try_recv(),
            Ok(Err(ClientError::ConnectionLost))
        ));
        assert_eq!(dispatcher.in_flight_count(), 0);
    }
}
