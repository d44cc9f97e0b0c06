mod node;

use anyhow::Result;
use log::info;
use serde::Deserialize;

use eth2_network::Networked as _;
use transition_functions::genesis;
use types::config::MinimalConfig;
use types::primitives::{Gwei, UnixSeconds, H256};

use crate::node::Node;

#[derive(Deserialize)]
struct NodeConfig {
    validator_count: usize,
    #[serde(default)]
    eth1_timestamp: UnixSeconds,
    #[serde(default = "default_deposit_amount")]
    deposit_amount: Gwei,
}

fn default_deposit_amount() -> Gwei {
    32_000_000_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            validator_count: 16,
            eth1_timestamp: 0,
            deposit_amount: default_deposit_amount(),
        }
    }
}

fn main() -> Result<()> {
    simple_logger::init()?;

    let config = match std::env::args().nth(1) {
        Some(path) => serde_yaml::from_slice(&std::fs::read(path)?)?,
        None => NodeConfig::default(),
    };

    // Until a deposit contract feed is wired in, the node boots from a
    // deterministic local genesis.
    let keypairs = genesis::interop_keypairs(config.validator_count);
    let deposits =
        genesis::interop_deposits::<MinimalConfig>(&keypairs, config.deposit_amount);
    let genesis_state = genesis::initialize_beacon_state_from_eth1::<MinimalConfig>(
        H256::zero(),
        config.eth1_timestamp,
        &deposits,
    )?;

    if !genesis::is_valid_genesis_state(&genesis_state) {
        log::warn!("the configured deposits do not satisfy the genesis preconditions");
    }

    let node = Node::new(genesis_state)?;
    let status = node.get_status();
    info!(
        "node initialized (head slot: {}, head root: {:?}, finalized epoch: {})",
        status.head_slot, status.head_root, status.finalized_epoch,
    );

    Ok(())
}
