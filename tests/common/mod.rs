#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use keytree::{Keychain, Seed};
use slatewallet::*;

/// 24-word phrase of the funded wallet.
pub const PHRASE: &str = "survey write again earth song palace wreck adjust genre upper arctic episode wonder resource actress eye aspect few element fiscal announce note sword early";

pub const BASE_FEE: u64 = 1_000_000;

pub fn config(dir: &Path) -> WalletConfig {
    WalletConfig::new(ChainType::Usernet, dir, "password")
}

pub fn backend(dir: &Path) -> Box<dyn WalletBackend> {
    Box::new(FileBackend::new(config(dir).wallet_data_dir()).with_kdf(KdfParams {
        m_cost: 64,
        t_cost: 1,
        p_cost: 1,
    }))
}

pub fn client(chain: &Arc<InMemoryChain>) -> Arc<dyn NodeClient> {
    chain.clone()
}

/// Puts outputs owned by `phrase` on chain at derivation indices 1..=n, then mines
/// enough blocks for them to be spendable.
pub fn fund(chain: &InMemoryChain, phrase: &str, values: &[u64]) -> Vec<Commitment> {
    let keychain = Keychain::from_seed(&Seed::from_mnemonic(phrase).unwrap());
    let commitments = values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let (c, proof) = build_output(&keychain, i as u64 + 1, *value).unwrap();
            chain.push_output(c, proof).unwrap();
            c
        })
        .collect();
    chain.mine(10).unwrap();
    commitments
}

/// Outputs owned by nobody we know.
pub fn noise(chain: &InMemoryChain, count: u64) {
    let keychain = Keychain::from_seed(&Seed::from_bytes(&[0xee; 32]).unwrap());
    for i in 1..=count {
        let (c, proof) = build_output(&keychain, i, 777).unwrap();
        chain.push_output(c, proof).unwrap();
    }
}

/// Recovers the wallet of `phrase` into `dir` and restores it from the chain.
pub fn recovered(chain: &Arc<InMemoryChain>, dir: &Path, phrase: &str) -> Wallet {
    let wallet = Wallet::recover(config(dir), backend(dir), client(chain), phrase).unwrap();
    wallet.restore_all(1000).unwrap();
    wallet.refresh().unwrap();
    wallet
}

/// A new, empty wallet in `dir`.
pub fn fresh(chain: &Arc<InMemoryChain>, dir: &Path) -> Wallet {
    Wallet::init(config(dir), backend(dir), client(chain)).unwrap().0
}

/// Mines blocks and refreshes every wallet.
pub fn settle(chain: &InMemoryChain, wallets: &[&Wallet]) {
    chain.mine(10).unwrap();
    for w in wallets {
        w.refresh().unwrap();
    }
}
