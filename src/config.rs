//! Wallet configuration and its TOML or JSON sources.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{WalletError, WalletResult};

/*
Example config file:

account = "default"
chain_type = "floonet"
data_dir = "/home/user/.slatewallet"
node_api_addr = "http://127.0.0.1:13413"
password = "..."

minimum_confirmations = 10
max_outputs = 500
num_change_outputs = 1
base_fee = 1_000_000

*/

/// Network the wallet talks to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Production network.
    Mainnet,
    /// Public test network.
    Floonet,
    /// Local development network.
    Usernet,
}

/// Configuration of one wallet instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Account name within the wallet.
    #[serde(default = "WalletConfig::default_account")]
    pub account: String,

    /// Network type.
    pub chain_type: ChainType,

    /// Directory holding `wallet_data/` and `slates/`.
    pub data_dir: PathBuf,

    /// Base URL of the chain node API.
    #[serde(default)]
    pub node_api_addr: String,

    /// Password protecting the seed.
    pub password: String,

    /// Confirmations required before an output is spendable.
    #[serde(default = "WalletConfig::default_minimum_confirmations")]
    pub minimum_confirmations: u64,

    /// Maximum number of inputs a single transaction may spend.
    #[serde(default = "WalletConfig::default_max_outputs")]
    pub max_outputs: usize,

    /// Number of change outputs to split the change into.
    #[serde(default = "WalletConfig::default_num_change_outputs")]
    pub num_change_outputs: usize,

    /// Fee per weight unit.
    #[serde(default = "WalletConfig::default_base_fee")]
    pub base_fee: u64,
}

impl WalletConfig {
    /// Creates a config with default policy values.
    pub fn new(chain_type: ChainType, data_dir: impl Into<PathBuf>, password: &str) -> Self {
        WalletConfig {
            account: Self::default_account(),
            chain_type,
            data_dir: data_dir.into(),
            node_api_addr: String::new(),
            password: password.to_string(),
            minimum_confirmations: Self::default_minimum_confirmations(),
            max_outputs: Self::default_max_outputs(),
            num_change_outputs: Self::default_num_change_outputs(),
            base_fee: Self::default_base_fee(),
        }
    }

    /// Parses the JSON config document handed over by bridge callers.
    pub fn from_json_str(json: &str) -> WalletResult<Self> {
        let config: WalletConfig =
            serde_json::from_str(json).map_err(|e| WalletError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> WalletResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: WalletConfig =
            toml::from_str(&text).map_err(|e| WalletError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> WalletResult<()> {
        if self.max_outputs == 0 {
            return Err(WalletError::Config("max_outputs must be positive".into()));
        }
        if self.num_change_outputs == 0 {
            return Err(WalletError::Config(
                "num_change_outputs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Directory with the seed and the wallet state.
    pub fn wallet_data_dir(&self) -> PathBuf {
        self.data_dir.join("wallet_data")
    }

    /// Directory where slate files are exchanged.
    pub fn slates_dir(&self) -> PathBuf {
        self.data_dir.join("slates")
    }

    /// Default account name.
    pub fn default_account() -> String {
        "default".to_string()
    }

    /// Outputs become spendable after this many confirmations.
    pub fn default_minimum_confirmations() -> u64 {
        10
    }

    /// Default cap on inputs per transaction.
    pub fn default_max_outputs() -> usize {
        500
    }

    /// Change goes into a single output by default.
    pub fn default_num_change_outputs() -> usize {
        1
    }

    /// Default fee per weight unit.
    pub fn default_base_fee() -> u64 {
        1_000_000
    }

    /// Returns a documentation for the config file.
    pub fn documentation() -> &'static str {
        r##"
    account = "default"                      # account name within the wallet
    chain_type = "floonet"                   # one of "mainnet", "floonet", "usernet"
    data_dir = "/path/to/wallet"             # holds wallet_data/ and slates/
    node_api_addr = "http://127.0.0.1:13413" # chain node API
    password = "..."                         # password protecting the seed

    minimum_confirmations = 10               # confirmations before an output is spendable
    max_outputs = 500                        # maximum inputs per transaction
    num_change_outputs = 1                   # number of outputs the change is split into
    base_fee = 1_000_000                     # fee per weight unit
"##
    }
}
