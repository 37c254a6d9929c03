//! Deployment settings loaded from TOML.
//!
//! ```toml
//! leader = 0
//! wallets = [0, 1, 2, 3]
//! initial_coins = 100
//! fault_delay_ms = 700
//!
//! [[validators]]
//! id = 0
//!
//! [[validators]]
//! id = 1
//! behavior = "delay_send|wrong_order"
//!
//! [mempool]
//! max_block_transactions = 64
//! ```

use ledgerbft_bft::{BrachaConfig, ByzantineBehavior, Role};
use ledgerbft_mempool::MempoolConfig;
use ledgerbft_types::{ValidatorId, WalletId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No validators configured")]
    NoValidators,

    #[error("Validator {0} is listed twice")]
    DuplicateValidator(ValidatorId),

    #[error("Leader {0} is not a configured validator")]
    UnknownLeader(ValidatorId),

    #[error("Leader {0} must not be configured with faulty behavior")]
    FaultyLeader(ValidatorId),

    #[error("{num_validators} validators cannot tolerate {max_faulty} faults")]
    TooManyFaulty {
        num_validators: usize,
        max_faulty: usize,
    },
}

/// One committee member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Validator ID.
    pub id: u64,

    /// Simulated faults, e.g. `"crash"` or `"delay_send|impersonate"`.
    #[serde(default = "honest", with = "behavior_name")]
    pub behavior: ByzantineBehavior,
}

impl ValidatorSettings {
    /// An honest validator.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            behavior: ByzantineBehavior::empty(),
        }
    }

    pub fn with_behavior(mut self, behavior: ByzantineBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn validator_id(&self) -> ValidatorId {
        ValidatorId(self.id)
    }

    pub fn is_faulty(&self) -> bool {
        !self.behavior.is_empty()
    }
}

fn honest() -> ByzantineBehavior {
    ByzantineBehavior::empty()
}

mod behavior_name {
    use ledgerbft_bft::ByzantineBehavior;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(behavior: &ByzantineBehavior, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(behavior)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ByzantineBehavior, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(D::Error::custom)
    }
}

/// Settings shared by every validator of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// ID of the proposing validator.
    pub leader: u64,

    /// The committee.
    pub validators: Vec<ValidatorSettings>,

    /// Wallets that may receive value.
    #[serde(default)]
    pub wallets: Vec<u32>,

    /// Fault bound `f`. Defaults to the number of faulty validators.
    #[serde(default)]
    pub max_faulty: Option<usize>,

    /// How long a `delay_send` validator holds each outbound batch.
    #[serde(default = "default_fault_delay_ms")]
    pub fault_delay_ms: u64,

    /// Coins each wallet is funded with at genesis.
    #[serde(default = "default_initial_coins")]
    pub initial_coins: u64,

    /// Block assembly limits for the leader's pool.
    #[serde(default)]
    pub mempool: MempoolConfig,
}

fn default_fault_delay_ms() -> u64 {
    ByzantineBehavior::SEND_DELAY.as_millis() as u64
}

fn default_initial_coins() -> u64 {
    100
}

impl NetworkSettings {
    /// `count` honest validators led by validator 0, with one wallet per
    /// validator.
    pub fn new(count: u64) -> Self {
        Self {
            leader: 0,
            validators: (0..count).map(ValidatorSettings::new).collect(),
            wallets: (0..count as u32).collect(),
            max_faulty: None,
            fault_delay_ms: default_fault_delay_ms(),
            initial_coins: default_initial_coins(),
            mempool: MempoolConfig::default(),
        }
    }

    /// Give validator `id` the given faults. Unknown IDs are ignored.
    pub fn with_behavior(mut self, id: u64, behavior: ByzantineBehavior) -> Self {
        if let Some(validator) = self.validators.iter_mut().find(|v| v.id == id) {
            validator.behavior = behavior;
        }
        self
    }

    pub fn with_max_faulty(mut self, max_faulty: usize) -> Self {
        self.max_faulty = Some(max_faulty);
        self
    }

    pub fn with_wallets(mut self, wallets: impl IntoIterator<Item = u32>) -> Self {
        self.wallets = wallets.into_iter().collect();
        self
    }

    pub fn with_fault_delay(mut self, delay: Duration) -> Self {
        self.fault_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Load and validate settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the committee is well formed and `n > 3f`.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.validators.is_empty() {
            return Err(SettingsError::NoValidators);
        }

        let mut seen = BTreeSet::new();
        for validator in &self.validators {
            if !seen.insert(validator.id) {
                return Err(SettingsError::DuplicateValidator(validator.validator_id()));
            }
        }

        let leader = self
            .validators
            .iter()
            .find(|v| v.id == self.leader)
            .ok_or(SettingsError::UnknownLeader(self.leader_id()))?;
        if leader.is_faulty() {
            return Err(SettingsError::FaultyLeader(self.leader_id()));
        }

        let num_validators = self.num_validators();
        let max_faulty = self.max_faulty();
        if num_validators <= 3 * max_faulty {
            return Err(SettingsError::TooManyFaulty {
                num_validators,
                max_faulty,
            });
        }
        Ok(())
    }

    pub fn leader_id(&self) -> ValidatorId {
        ValidatorId(self.leader)
    }

    pub fn num_validators(&self) -> usize {
        self.validators.len()
    }

    /// Validators configured with any fault.
    pub fn num_faulty_validators(&self) -> usize {
        self.validators.iter().filter(|v| v.is_faulty()).count()
    }

    /// The configured fault bound, or the number of faulty validators.
    pub fn max_faulty(&self) -> usize {
        self.max_faulty
            .unwrap_or_else(|| self.num_faulty_validators())
    }

    pub fn bracha_config(&self) -> BrachaConfig {
        BrachaConfig::new(self.num_validators(), self.max_faulty())
    }

    /// Committee in configuration order.
    pub fn committee(&self) -> Vec<ValidatorId> {
        self.validators.iter().map(ValidatorSettings::validator_id).collect()
    }

    pub fn wallet_ids(&self) -> Vec<WalletId> {
        self.wallets.iter().copied().map(WalletId).collect()
    }

    pub fn validator(&self, id: ValidatorId) -> Option<&ValidatorSettings> {
        self.validators.iter().find(|v| v.id == id.0)
    }

    /// Role of `id`: the leader proposes, faulty validators are simulated.
    pub fn role_of(&self, id: ValidatorId) -> Role {
        if id == self.leader_id() {
            return Role::Proposer;
        }
        match self.validator(id) {
            Some(v) if v.is_faulty() => Role::Simulated(v.behavior),
            _ => Role::Regular,
        }
    }

    pub fn fault_delay(&self) -> Duration {
        Duration::from_millis(self.fault_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"
        leader = 0
        wallets = [0, 1, 2, 3]
        fault_delay_ms = 50

        [[validators]]
        id = 0

        [[validators]]
        id = 1
        behavior = "crash"

        [[validators]]
        id = 2

        [[validators]]
        id = 3
        behavior = "none"

        [mempool]
        max_block_transactions = 8
    "#;

    #[test]
    fn test_parse_settings() {
        let settings = NetworkSettings::from_toml_str(SETTINGS).unwrap();

        assert_eq!(settings.leader_id(), ValidatorId(0));
        assert_eq!(settings.num_validators(), 4);
        assert_eq!(settings.num_faulty_validators(), 1);
        assert_eq!(settings.bracha_config(), BrachaConfig::new(4, 1));
        assert_eq!(settings.wallet_ids().len(), 4);
        assert_eq!(settings.fault_delay(), Duration::from_millis(50));
        assert_eq!(settings.initial_coins, 100);
        assert_eq!(settings.mempool.max_block_transactions, 8);

        assert_eq!(settings.role_of(ValidatorId(0)), Role::Proposer);
        assert_eq!(
            settings.role_of(ValidatorId(1)),
            Role::Simulated(ByzantineBehavior::CRASH)
        );
        assert_eq!(settings.role_of(ValidatorId(3)), Role::Regular);
    }

    #[test]
    fn test_unknown_behavior_is_a_parse_error() {
        let text = r#"
            leader = 0
            [[validators]]
            id = 0
            behavior = "teleport"
        "#;
        assert!(matches!(
            NetworkSettings::from_toml_str(text),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            NetworkSettings::new(4).with_max_faulty(2).validate(),
            Err(SettingsError::TooManyFaulty {
                num_validators: 4,
                max_faulty: 2
            })
        ));

        let mut settings = NetworkSettings::new(3);
        settings.leader = 7;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::UnknownLeader(ValidatorId(7)))
        ));

        let settings = NetworkSettings::new(4).with_behavior(0, ByzantineBehavior::CRASH);
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::FaultyLeader(ValidatorId(0)))
        ));

        let mut settings = NetworkSettings::new(2);
        settings.validators[1].id = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::DuplicateValidator(ValidatorId(0)))
        ));

        assert!(matches!(
            NetworkSettings::new(0).validate(),
            Err(SettingsError::NoValidators)
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let settings = NetworkSettings::new(4)
            .with_behavior(2, ByzantineBehavior::DELAY_SEND | ByzantineBehavior::WRONG_ORDER);
        let text = toml::to_string(&settings).unwrap();
        assert!(text.contains("delay_send|wrong_order"));
        assert_eq!(NetworkSettings::from_toml_str(&text).unwrap(), settings);
    }
}
