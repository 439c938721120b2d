//! Correlation of resistance changes with the commands that caused them.
//!
//! A trainer acknowledging a resistance-related command proves nothing on its
//! own; the capability is confirmed only when the resistance field reported in
//! Indoor Bike Data actually moves while that command is pending. Movement
//! with no command pending is recorded as an anomaly.

use crate::diagnosis::record::{Anomaly, CommandOutcome, ObservationRecord};
use crate::sensors::ftms::CommandKind;
use std::time::Instant;

/// Correlator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelatorState {
    /// No resistance-related command outstanding
    #[default]
    Idle,
    /// Waiting for the resistance to move after `kind`
    CommandPending { kind: CommandKind, sent_at: Instant },
}

/// What a resistance observation meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResistanceChange {
    /// First value seen; stored as baseline
    Baseline,
    /// Same as the previous value
    Unchanged,
    /// Changed while `kind` was pending
    Commanded { kind: CommandKind, from: i16, to: i16 },
    /// Changed with nothing pending
    Unexpected { from: i16, to: i16 },
}

/// Links command sends and acknowledgements to resistance deltas.
#[derive(Debug, Default)]
pub struct ResistanceCorrelator {
    last_resistance: Option<i16>,
    state: CorrelatorState,
}

impl ResistanceCorrelator {
    /// Create an idle correlator with no baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> CorrelatorState {
        self.state
    }

    /// Last resistance value observed.
    pub fn last_resistance(&self) -> Option<i16> {
        self.last_resistance
    }

    /// Command pending, if any.
    pub fn pending_command(&self) -> Option<CommandKind> {
        match self.state {
            CorrelatorState::Idle => None,
            CorrelatorState::CommandPending { kind, .. } => Some(kind),
        }
    }

    /// A command was written to the Control Point.
    ///
    /// Resistance-related commands replace whatever was pending; other
    /// commands are ignored.
    pub fn command_sent(&mut self, kind: CommandKind, at: Instant) {
        if !kind.is_resistance_related() {
            return;
        }

        if let Some(stale) = self.pending_command() {
            tracing::debug!(%stale, %kind, "Replacing pending resistance command");
        }
        tracing::debug!(%kind, "Resistance-related command sent");
        self.state = CorrelatorState::CommandPending { kind, sent_at: at };
    }

    /// A Control Point acknowledgement arrived.
    ///
    /// Acknowledgements never change the state. Only sends and observed
    /// resistance changes do.
    pub fn acknowledged(&self, outcome: &CommandOutcome) {
        if !outcome.is_success() {
            return;
        }

        if self.pending_command() == Some(outcome.kind) {
            tracing::info!(kind = %outcome.kind, "Command accepted, waiting for resistance change");
        }
    }

    /// A resistance value was reported by the trainer.
    pub fn observe(&mut self, value: i16, record: &mut ObservationRecord) -> ResistanceChange {
        let Some(previous) = self.last_resistance.replace(value) else {
            return ResistanceChange::Baseline;
        };

        if previous == value {
            return ResistanceChange::Unchanged;
        }

        match self.state {
            CorrelatorState::CommandPending { kind, sent_at } => {
                tracing::info!(
                    %kind,
                    from = previous,
                    to = value,
                    after_ms = sent_at.elapsed().as_millis() as u64,
                    "Resistance change follows command"
                );
                match kind {
                    CommandKind::SetResistanceLevel => record.resistance_control = true,
                    CommandKind::SetSimParams => record.sim_mode_support = true,
                    _ => {}
                }
                self.state = CorrelatorState::Idle;
                ResistanceChange::Commanded {
                    kind,
                    from: previous,
                    to: value,
                }
            }
            CorrelatorState::Idle => {
                record.push_anomaly(Anomaly::UnexpectedResistanceChange {
                    from: previous,
                    to: value,
                });
                ResistanceChange::Unexpected {
                    from: previous,
                    to: value,
                }
            }
        }
    }
}
