use serde::Serialize;
use std::collections::HashMap;

/// Position lifecycle as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionPhase {
    Open,
    Managing,
    Closing,
    Closed,
    Aborted,
}

impl PositionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PositionPhase::Closed | PositionPhase::Aborted)
    }

    /// Allowed transitions. Abort bypasses Closing.
    pub fn can_transition(self, to: PositionPhase) -> bool {
        use PositionPhase::*;
        matches!(
            (self, to),
            (Open, Managing)
                | (Managing, Managing)
                | (Open, Closing)
                | (Managing, Closing)
                | (Closing, Closed)
                | (Open, Aborted)
                | (Managing, Aborted)
                // A close that turned out not to happen
                | (Closing, Open)
                | (Closing, Managing)
        )
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    phase: PositionPhase,
    managed: bool,
    abort_pending: bool,
}

/// Phase per ticket for one symbol
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    tickets: HashMap<u64, Tracked>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, ticket: u64) -> Option<PositionPhase> {
        self.tickets.get(&ticket).map(|t| t.phase)
    }

    /// A newly confirmed position
    pub fn opened(&mut self, ticket: u64) {
        self.tickets.insert(
            ticket,
            Tracked {
                phase: PositionPhase::Open,
                managed: false,
                abort_pending: false,
            },
        );
    }

    /// A confirmed stop change
    pub fn managed(&mut self, ticket: u64) {
        if self.transition(ticket, PositionPhase::Managing) {
            if let Some(t) = self.tickets.get_mut(&ticket) {
                t.managed = true;
            }
        }
    }

    pub fn begin_close(&mut self, ticket: u64) {
        self.transition(ticket, PositionPhase::Closing);
    }

    pub fn closed(&mut self, ticket: u64) {
        self.transition(ticket, PositionPhase::Closed);
    }

    /// Abort was sent but its outcome is unknown; resolved on the next sync
    pub fn abort_pending(&mut self, ticket: u64) {
        if let Some(t) = self.tickets.get_mut(&ticket) {
            t.abort_pending = true;
        }
    }

    pub fn aborted(&mut self, ticket: u64) {
        self.transition(ticket, PositionPhase::Aborted);
    }

    /// Return a Closing position to where it was before the close attempt
    pub fn close_failed(&mut self, ticket: u64) {
        let back = self.resting_phase(ticket);
        self.transition(ticket, back);
    }

    /// Align phases with the confirmed open tickets.
    ///
    /// Unknown open tickets start as Open. Tickets that disappeared become
    /// Closed (or Aborted if an abort was in flight). Closing tickets still
    /// present fall back to Open/Managing.
    pub fn reconcile(&mut self, open_tickets: &[u64]) {
        for ticket in open_tickets {
            if !self.tickets.contains_key(ticket) {
                self.opened(*ticket);
            }
        }

        let known: Vec<u64> = self.tickets.keys().copied().collect();
        for ticket in known {
            let Some((phase, abort_pending)) =
                self.tickets.get(&ticket).map(|t| (t.phase, t.abort_pending))
            else {
                continue;
            };
            if phase.is_terminal() {
                continue;
            }
            if open_tickets.contains(&ticket) {
                if phase == PositionPhase::Closing {
                    let back = self.resting_phase(ticket);
                    self.transition(ticket, back);
                }
                if let Some(t) = self.tickets.get_mut(&ticket) {
                    t.abort_pending = false;
                }
            } else if abort_pending {
                self.force(ticket, PositionPhase::Aborted);
            } else {
                self.force(ticket, PositionPhase::Closed);
            }
        }
    }

    /// Forget terminal tickets
    pub fn prune(&mut self) {
        self.tickets.retain(|_, t| !t.phase.is_terminal());
    }

    fn resting_phase(&self, ticket: u64) -> PositionPhase {
        match self.tickets.get(&ticket) {
            Some(t) if t.managed => PositionPhase::Managing,
            _ => PositionPhase::Open,
        }
    }

    fn transition(&mut self, ticket: u64, to: PositionPhase) -> bool {
        let Some(tracked) = self.tickets.get_mut(&ticket) else {
            return false;
        };
        if tracked.phase.can_transition(to) {
            tracked.phase = to;
            true
        } else {
            tracing::warn!(ticket, from = ?tracked.phase, to = ?to, "Ignoring invalid lifecycle transition");
            false
        }
    }

    // Broker state wins over the local state machine
    fn force(&mut self, ticket: u64, to: PositionPhase) {
        if let Some(tracked) = self.tickets.get_mut(&ticket) {
            tracked.phase = to;
        }
    }
}
