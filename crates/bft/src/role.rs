//! Validator roles and simulated Byzantine behaviour.

use ledgerbft_core::Action;
use ledgerbft_types::ValidatorId;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

bitflags::bitflags! {
    /// Faults a simulated validator exhibits. Flags combine.
    pub struct ByzantineBehavior: u8 {
        /// Never take part in the protocol.
        const CRASH = 1 << 0;
        /// Hold every outbound batch for [`ByzantineBehavior::SEND_DELAY`].
        const DELAY_SEND = 1 << 1;
        /// Send to the leader only instead of broadcasting.
        const PARTIAL_SEND = 1 << 2;
        /// Emit each outbound batch in reverse order.
        const WRONG_ORDER = 1 << 3;
        /// Claim another validator's ID on outbound envelopes.
        const IMPERSONATE = 1 << 4;
    }
}

const BEHAVIOR_NAMES: [(ByzantineBehavior, &str); 5] = [
    (ByzantineBehavior::CRASH, "crash"),
    (ByzantineBehavior::DELAY_SEND, "delay_send"),
    (ByzantineBehavior::PARTIAL_SEND, "partial_send"),
    (ByzantineBehavior::WRONG_ORDER, "wrong_order"),
    (ByzantineBehavior::IMPERSONATE, "impersonate"),
];

/// Error parsing a behaviour name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown Byzantine behavior: {0}")]
pub struct UnknownBehavior(pub String);

impl ByzantineBehavior {
    /// How long a delaying validator holds its outbound batch.
    pub const SEND_DELAY: Duration = Duration::from_millis(700);

    /// Delay to apply before sending, if any.
    pub fn send_delay(&self) -> Option<Duration> {
        self.contains(ByzantineBehavior::DELAY_SEND)
            .then_some(Self::SEND_DELAY)
    }
}

impl FromStr for ByzantineBehavior {
    type Err = UnknownBehavior;

    /// Parses `"crash"`, `"delay_send|impersonate"`, `"none"` and so on.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut behavior = ByzantineBehavior::empty();
        for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let lowered = part.to_ascii_lowercase();
            if lowered == "none" {
                continue;
            }
            let flag = BEHAVIOR_NAMES
                .iter()
                .find(|(_, name)| *name == lowered)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| UnknownBehavior(part.to_string()))?;
            behavior |= flag;
        }
        Ok(behavior)
    }
}

impl fmt::Display for ByzantineBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = BEHAVIOR_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// What a validator does in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Proposes the block for the run, then votes like a regular validator.
    Proposer,
    /// Votes only.
    Regular,
    /// A faulty validator used to exercise fault tolerance.
    Simulated(ByzantineBehavior),
}

impl Role {
    pub fn is_proposer(&self) -> bool {
        matches!(self, Role::Proposer)
    }

    /// Faults exhibited by this role. Empty for honest roles.
    pub fn behavior(&self) -> ByzantineBehavior {
        match self {
            Role::Simulated(behavior) => *behavior,
            Role::Proposer | Role::Regular => ByzantineBehavior::empty(),
        }
    }

    /// Whether the validator takes part in the protocol at all.
    pub fn participates(&self) -> bool {
        !self.behavior().contains(ByzantineBehavior::CRASH)
    }

    /// Apply this role's faults to an outbound batch.
    ///
    /// Honest roles return the batch untouched. `committee` is used to pick a
    /// victim for impersonation.
    pub fn shape_outbound(
        &self,
        mut actions: Vec<Action>,
        local: ValidatorId,
        committee: &[ValidatorId],
    ) -> Vec<Action> {
        let behavior = self.behavior();
        if behavior.is_empty() {
            return actions;
        }

        if behavior.contains(ByzantineBehavior::CRASH) {
            actions.retain(|a| !a.is_send());
            return actions;
        }

        if behavior.contains(ByzantineBehavior::WRONG_ORDER) {
            actions.reverse();
        }

        if behavior.contains(ByzantineBehavior::IMPERSONATE) {
            if let Some(victim) = impersonation_target(local, committee) {
                for message in actions.iter_mut().filter_map(Action::message_mut) {
                    message.sender_id = victim;
                }
            }
        }

        if behavior.contains(ByzantineBehavior::PARTIAL_SEND) {
            actions = actions
                .into_iter()
                .map(|action| match action {
                    Action::Broadcast { message } => Action::SendToLeader { message },
                    other => other,
                })
                .collect();
        }

        actions
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Proposer => f.write_str("proposer"),
            Role::Regular => f.write_str("regular"),
            Role::Simulated(behavior) => write!(f, "simulated({behavior})"),
        }
    }
}

/// The committee member listed after `local`, wrapping around.
fn impersonation_target(local: ValidatorId, committee: &[ValidatorId]) -> Option<ValidatorId> {
    let position = committee.iter().position(|v| *v == local)?;
    let victim = committee[(position + 1) % committee.len()];
    (victim != local).then_some(victim)
}
