//! Optimistic actuator toggles.
//!
//! A switch flips the moment the user touches it. The write to the remote
//! control document runs in the background and comes back through
//! [`OptimisticToggleController::complete`]; a failure snaps the switch back.
//!
//! Per key the controller is either `Idle` (display equals the confirmed
//! remote value) or `PendingWrite`. Every `set` hands out a [`WriteTicket`]
//! with a fresh sequence number and only the newest ticket for a key is
//! honoured, so replies for superseded writes fall on the floor.

use crate::domain::ActuatorKey;
use crate::error::ControlError;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Idle,
    PendingWrite {
        desired: bool,
        /// what was on screen right before the `set` that started this write
        previous: bool,
        /// last remote value observed while a write for this key was in flight
        remote_seen: Option<bool>,
        seq: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Actuator {
    confirmed: bool,
    state: ToggleState,
}

impl Actuator {
    fn pending(&self) -> bool {
        match self.state {
            ToggleState::Idle => self.confirmed,
            ToggleState::PendingWrite { desired, .. } => desired,
        }
    }
}

/// Identifies one issued write. Hand it back to `complete` with the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTicket {
    pub key: ActuatorKey,
    pub value: bool,
    seq: u64,
}

/// What a write completion did to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Confirmed { key: ActuatorKey, value: bool },
    RolledBack { key: ActuatorKey, restored: bool, error: ControlError },
    /// reply for a write that a later `set` already superseded
    Stale { key: ActuatorKey },
}

/// Confirmed and displayed value of one actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    pub confirmed: bool,
    pub pending: bool,
    pub in_flight: bool,
}

#[derive(Debug, Clone)]
pub struct OptimisticToggleController {
    actuators: BTreeMap<ActuatorKey, Actuator>,
    next_seq: u64,
}

impl OptimisticToggleController {
    /// Every actuator starts idle at `default`.
    pub fn new(default: bool) -> Self {
        let actuators = ActuatorKey::ALL
            .into_iter()
            .map(|key| {
                (
                    key,
                    Actuator {
                        confirmed: default,
                        state: ToggleState::Idle,
                    },
                )
            })
            .collect();
        Self {
            actuators,
            next_seq: 0,
        }
    }

    /// Authoritative value reported by the remote store.
    ///
    /// Always updates `confirmed`. The displayed value follows only when no
    /// write is outstanding for `key`; otherwise the value is remembered as
    /// the rollback target should that write fail.
    pub fn observe_remote(&mut self, key: ActuatorKey, confirmed_value: bool) {
        let actuator = self.actuator_mut(key);
        actuator.confirmed = confirmed_value;
        if let ToggleState::PendingWrite { remote_seen, .. } = &mut actuator.state {
            *remote_seen = Some(confirmed_value);
        }
    }

    /// Show `new_value` immediately and return the ticket for the remote write.
    ///
    /// Supersedes any write already in flight for `key`.
    pub fn set(&mut self, key: ActuatorKey, new_value: bool) -> WriteTicket {
        self.next_seq += 1;
        let seq = self.next_seq;

        let actuator = self.actuator_mut(key);
        let previous = actuator.pending();
        // an echo seen during a superseded write is still the freshest remote value
        let remote_seen = match actuator.state {
            ToggleState::PendingWrite { remote_seen, .. } => remote_seen,
            ToggleState::Idle => None,
        };
        actuator.state = ToggleState::PendingWrite {
            desired: new_value,
            previous,
            remote_seen,
            seq,
        };

        WriteTicket {
            key,
            value: new_value,
            seq,
        }
    }

    /// Apply the outcome of the write identified by `ticket`.
    pub fn complete(
        &mut self,
        ticket: WriteTicket,
        result: Result<(), ControlError>,
    ) -> Completion {
        let key = ticket.key;
        let actuator = self.actuator_mut(key);

        let (previous, remote_seen) = match actuator.state {
            ToggleState::PendingWrite {
                seq,
                previous,
                remote_seen,
                ..
            } if seq == ticket.seq => (previous, remote_seen),
            _ => return Completion::Stale { key },
        };

        actuator.state = ToggleState::Idle;
        match result {
            Ok(()) => {
                actuator.confirmed = ticket.value;
                Completion::Confirmed {
                    key,
                    value: ticket.value,
                }
            }
            Err(error) => {
                let restored = match remote_seen {
                    // observe_remote already stored it in `confirmed`
                    Some(remote) => remote,
                    None => {
                        // nothing heard from the store; idle means
                        // display == confirmed until the next echo
                        actuator.confirmed = previous;
                        previous
                    }
                };
                Completion::RolledBack {
                    key,
                    restored,
                    error,
                }
            }
        }
    }

    /// Values to display, keyed by actuator.
    pub fn current_state(&self) -> BTreeMap<ActuatorKey, bool> {
        self.actuators.iter().map(|(k, a)| (*k, a.pending())).collect()
    }

    pub fn state_of(&self, key: ActuatorKey) -> ActuatorState {
        let a = self.actuators.get(&key).copied().unwrap_or(Actuator {
            confirmed: false,
            state: ToggleState::Idle,
        });
        ActuatorState {
            confirmed: a.confirmed,
            pending: a.pending(),
            in_flight: a.state != ToggleState::Idle,
        }
    }

    pub fn toggle_state(&self, key: ActuatorKey) -> ToggleState {
        self.actuators
            .get(&key)
            .map(|a| a.state)
            .unwrap_or(ToggleState::Idle)
    }

    pub fn is_in_flight(&self, key: ActuatorKey) -> bool {
        self.toggle_state(key) != ToggleState::Idle
    }

    fn actuator_mut(&mut self, key: ActuatorKey) -> &mut Actuator {
        self.actuators.entry(key).or_insert(Actuator {
            confirmed: false,
            state: ToggleState::Idle,
        })
    }
}

impl Default for OptimisticToggleController {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected() -> ControlError {
        ControlError::Rejected("permission denied".into())
    }

    fn timeout() -> ControlError {
        ControlError::Timeout(std::time::Duration::from_secs(5))
    }

    #[test]
    fn starts_at_default() {
        let ctl = OptimisticToggleController::default();
        assert!(ctl.current_state().values().all(|v| !v));
        assert_eq!(ctl.current_state().len(), ActuatorKey::ALL.len());
    }

    #[test]
    fn set_is_visible_before_completion() {
        let mut ctl = OptimisticToggleController::default();
        ctl.set(ActuatorKey::HeatLamp, true);

        assert!(ctl.current_state()[&ActuatorKey::HeatLamp]);
        let st = ctl.state_of(ActuatorKey::HeatLamp);
        assert!(st.in_flight);
        assert!(!st.confirmed);
    }

    #[test]
    fn success_confirms() {
        let mut ctl = OptimisticToggleController::default();
        let ticket = ctl.set(ActuatorKey::Led, true);

        let done = ctl.complete(ticket, Ok(()));
        assert_eq!(done, Completion::Confirmed { key: ActuatorKey::Led, value: true });
        assert_eq!(
            ctl.state_of(ActuatorKey::Led),
            ActuatorState {
                confirmed: true,
                pending: true,
                in_flight: false,
            }
        );
    }

    #[test]
    fn failure_rolls_back() {
        let mut ctl = OptimisticToggleController::default();
        let ticket = ctl.set(ActuatorKey::Fan, true);

        let done = ctl.complete(ticket, Err(rejected()));
        assert_eq!(
            done,
            Completion::RolledBack {
                key: ActuatorKey::Fan,
                restored: false,
                error: rejected(),
            }
        );
        assert!(!ctl.current_state()[&ActuatorKey::Fan]);
        assert!(!ctl.is_in_flight(ActuatorKey::Fan));
    }

    #[test]
    fn failure_only_touches_its_own_key() {
        let mut ctl = OptimisticToggleController::default();
        let lamp = ctl.set(ActuatorKey::HeatLamp, true);
        ctl.complete(lamp, Ok(()));

        let pump = ctl.set(ActuatorKey::WaterPump, true);
        ctl.complete(pump, Err(rejected()));

        let state = ctl.current_state();
        assert!(state[&ActuatorKey::HeatLamp]);
        assert!(!state[&ActuatorKey::WaterPump]);
    }

    #[test]
    fn superseded_reply_is_ignored() {
        let mut ctl = OptimisticToggleController::default();
        let first = ctl.set(ActuatorKey::WaterPump, true);
        let second = ctl.set(ActuatorKey::WaterPump, false);

        // late failure for the first write must not move anything
        assert_eq!(
            ctl.complete(first, Err(rejected())),
            Completion::Stale { key: ActuatorKey::WaterPump }
        );
        assert!(!ctl.current_state()[&ActuatorKey::WaterPump]);
        assert!(ctl.is_in_flight(ActuatorKey::WaterPump));

        assert_eq!(
            ctl.complete(second, Ok(())),
            Completion::Confirmed { key: ActuatorKey::WaterPump, value: false }
        );
    }

    #[test]
    fn superseded_success_is_ignored_too() {
        let mut ctl = OptimisticToggleController::default();
        let first = ctl.set(ActuatorKey::Led, true);
        let second = ctl.set(ActuatorKey::Led, false);

        assert_eq!(ctl.complete(first, Ok(())), Completion::Stale { key: ActuatorKey::Led });
        assert!(!ctl.state_of(ActuatorKey::Led).confirmed);
        assert!(ctl.is_in_flight(ActuatorKey::Led));
        ctl.complete(second, Ok(()));
        assert!(!ctl.is_in_flight(ActuatorKey::Led));
    }

    #[test]
    fn rollback_restores_value_before_latest_set() {
        let mut ctl = OptimisticToggleController::default();
        let _first = ctl.set(ActuatorKey::HeatLamp, true);
        let second = ctl.set(ActuatorKey::HeatLamp, false);

        let done = ctl.complete(second, Err(timeout()));
        assert!(matches!(done, Completion::RolledBack { restored: true, .. }));
        assert!(ctl.current_state()[&ActuatorKey::HeatLamp]);

        // idle again, so display and confirmed agree
        let st = ctl.state_of(ActuatorKey::HeatLamp);
        assert_eq!(st.pending, st.confirmed);
    }

    #[test]
    fn completing_twice_is_stale() {
        let mut ctl = OptimisticToggleController::default();
        let ticket = ctl.set(ActuatorKey::Fan, true);
        ctl.complete(ticket, Ok(()));
        assert_eq!(
            ctl.complete(ticket, Err(rejected())),
            Completion::Stale { key: ActuatorKey::Fan }
        );
        assert!(ctl.current_state()[&ActuatorKey::Fan]);
    }

    #[test]
    fn remote_value_applies_when_idle() {
        let mut ctl = OptimisticToggleController::default();
        ctl.observe_remote(ActuatorKey::Led, true);
        assert_eq!(
            ctl.state_of(ActuatorKey::Led),
            ActuatorState {
                confirmed: true,
                pending: true,
                in_flight: false,
            }
        );
    }

    #[test]
    fn remote_value_does_not_clobber_in_flight_write() {
        let mut ctl = OptimisticToggleController::default();
        let ticket = ctl.set(ActuatorKey::Led, true);

        ctl.observe_remote(ActuatorKey::Led, false);
        let st = ctl.state_of(ActuatorKey::Led);
        assert!(st.pending);
        assert!(!st.confirmed);

        // failure falls back to what the store reported mid-flight
        ctl.complete(ticket, Err(rejected()));
        assert!(!ctl.current_state()[&ActuatorKey::Led]);
    }

    #[test]
    fn set_after_remote_echo_rolls_back_to_echo() {
        let mut ctl = OptimisticToggleController::default();
        ctl.observe_remote(ActuatorKey::Fan, true);
        let ticket = ctl.set(ActuatorKey::Fan, false);
        ctl.complete(ticket, Err(rejected()));
        assert!(ctl.current_state()[&ActuatorKey::Fan]);
    }

    #[test]
    fn echo_during_flight_survives_timeout() {
        // the device applied the write but the ack never made it back
        let mut ctl = OptimisticToggleController::default();
        let ticket = ctl.set(ActuatorKey::Led, true);
        ctl.observe_remote(ActuatorKey::Led, true);

        let done = ctl.complete(ticket, Err(timeout()));
        assert_eq!(
            done,
            Completion::RolledBack {
                key: ActuatorKey::Led,
                restored: true,
                error: timeout(),
            }
        );
        assert_eq!(
            ctl.state_of(ActuatorKey::Led),
            ActuatorState {
                confirmed: true,
                pending: true,
                in_flight: false,
            }
        );
    }

    #[test]
    fn echo_seen_before_a_superseding_set_still_wins_rollback() {
        let mut ctl = OptimisticToggleController::default();
        let _first = ctl.set(ActuatorKey::WaterPump, true);
        ctl.observe_remote(ActuatorKey::WaterPump, true);
        let second = ctl.set(ActuatorKey::WaterPump, false);

        ctl.complete(second, Err(rejected()));
        let st = ctl.state_of(ActuatorKey::WaterPump);
        assert!(st.confirmed);
        assert!(st.pending);
        assert!(!st.in_flight);
    }
}
