//! Persistence of the seed and the wallet state.
//!
//! The seed is kept encrypted under a key derived from the wallet password. The state is
//! a single bincode document, replaced atomically on every save.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use keytree::Seed;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

use crate::errors::{WalletError, WalletResult};
use crate::state::WalletState;

const SEED_FILE: &str = "wallet.seed";
const STATE_FILE: &str = "wallet.bincode";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Where the wallet keeps its seed and state.
pub trait WalletBackend: Send + Sync {
    /// Whether a seed has been stored.
    fn exists(&self) -> bool;

    /// Encrypts and stores the seed, replacing any previous one.
    fn store_seed(&self, seed: &Seed, password: &str) -> WalletResult<()>;

    /// Decrypts the stored seed. A wrong password yields `InvalidPassword`.
    fn load_seed(&self, password: &str) -> WalletResult<Seed>;

    /// Reads the persisted state, `None` when nothing was saved yet.
    fn load_state(&self) -> WalletResult<Option<WalletState>>;

    /// Persists the state. Either the whole state is written or nothing is.
    fn save_state(&self, state: &WalletState) -> WalletResult<()>;
}

/// Argon2id cost of turning the password into the seed key. Stored with the seed, so a
/// seed always opens with the cost it was sealed with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB.
    pub m_cost: u32,
    /// Passes over memory.
    pub t_cost: u32,
    /// Lanes.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    fn cipher(&self, password: &str, salt: &[u8]) -> WalletResult<ChaCha20Poly1305> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(32))
            .map_err(|e| WalletError::storage(format!("invalid key derivation parameters: {}", e)))?;
        let mut key = Zeroizing::new([0u8; 32]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password.as_bytes(), salt, &mut key[..])
            .map_err(|e| WalletError::storage(format!("key derivation failed: {}", e)))?;
        ChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|_| WalletError::storage("invalid encryption key"))
    }
}

/// Encrypted seed as stored on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSeed {
    kdf: KdfParams,
    #[serde(with = "aggsig::serialization::bytes")]
    salt: Vec<u8>,
    #[serde(with = "aggsig::serialization::bytes")]
    nonce: Vec<u8>,
    #[serde(with = "aggsig::serialization::bytes")]
    ciphertext: Vec<u8>,
}

impl EncryptedSeed {
    /// Encrypts the seed entropy under `password` with a fresh salt and nonce.
    pub fn seal(seed: &Seed, password: &str, kdf: KdfParams) -> WalletResult<Self> {
        let mut rng = rand::thread_rng();
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut nonce = vec![0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let ciphertext = kdf
            .cipher(password, &salt)?
            .encrypt(Nonce::from_slice(&nonce), seed.as_bytes())
            .map_err(|_| WalletError::storage("seed encryption failed"))?;
        Ok(EncryptedSeed {
            kdf,
            salt,
            nonce,
            ciphertext,
        })
    }

    /// Decrypts the seed. Authentication failure means the password is wrong.
    pub fn open(&self, password: &str) -> WalletResult<Seed> {
        if self.nonce.len() != NONCE_LEN {
            return Err(WalletError::storage("seed file has a bad nonce"));
        }
        let plaintext = Zeroizing::new(
            self.kdf
                .cipher(password, &self.salt)?
                .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
                .map_err(|_| WalletError::InvalidPassword)?,
        );
        Ok(Seed::from_bytes(&plaintext)?)
    }

    /// Cost the seed was sealed with.
    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }
}

/// Stores the wallet under `<data_dir>/wallet_data`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    kdf: KdfParams,
}

impl FileBackend {
    /// Backend rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileBackend {
            dir: dir.into(),
            kdf: KdfParams::default(),
        }
    }

    /// Seals new seeds with `kdf` instead of the default cost.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Path to the seed file.
    pub fn seed_path(&self) -> PathBuf {
        self.dir.join(SEED_FILE)
    }

    /// Path to the state file.
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> WalletResult<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl WalletBackend for FileBackend {
    fn exists(&self) -> bool {
        self.seed_path().exists()
    }

    fn store_seed(&self, seed: &Seed, password: &str) -> WalletResult<()> {
        let sealed = EncryptedSeed::seal(seed, password, self.kdf)?;
        let json = serde_json::to_vec_pretty(&sealed)?;
        self.write_atomic(&self.seed_path(), &json)?;
        debug!(path = %self.seed_path().display(), "seed stored");
        Ok(())
    }

    fn load_seed(&self, password: &str) -> WalletResult<Seed> {
        let path = self.seed_path();
        if !path.exists() {
            return Err(WalletError::WalletNotInitialized);
        }
        let bytes = fs::read(&path)?;
        let sealed: EncryptedSeed = serde_json::from_slice(&bytes)
            .map_err(|e| WalletError::storage(format!("seed file is unreadable: {}", e)))?;
        sealed.open(password)
    }

    fn load_state(&self) -> WalletResult<Option<WalletState>> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        bincode::deserialize_from(file)
            .map(Some)
            .map_err(|e| WalletError::storage(format!("wallet state is unreadable: {}", e)))
    }

    fn save_state(&self, state: &WalletState) -> WalletResult<()> {
        let bytes = bincode::serialize(state)
            .map_err(|e| WalletError::storage(format!("cannot encode wallet state: {}", e)))?;
        self.write_atomic(&self.state_path(), &bytes)
    }
}

/// Keeps everything in memory, encoded the same way as on disk.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    kdf: KdfParams,
    seed: Mutex<Option<EncryptedSeed>>,
    state: Mutex<Option<Vec<u8>>>,
}

impl MemoryBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seals new seeds with `kdf` instead of the default cost.
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

fn poisoned<T>(_: T) -> WalletError {
    WalletError::storage("backend lock poisoned")
}

impl WalletBackend for MemoryBackend {
    fn exists(&self) -> bool {
        self.seed.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn store_seed(&self, seed: &Seed, password: &str) -> WalletResult<()> {
        let sealed = EncryptedSeed::seal(seed, password, self.kdf)?;
        *self.seed.lock().map_err(poisoned)? = Some(sealed);
        Ok(())
    }

    fn load_seed(&self, password: &str) -> WalletResult<Seed> {
        match &*self.seed.lock().map_err(poisoned)? {
            Some(sealed) => sealed.open(password),
            None => Err(WalletError::WalletNotInitialized),
        }
    }

    fn load_state(&self) -> WalletResult<Option<WalletState>> {
        match &*self.state.lock().map_err(poisoned)? {
            Some(bytes) => bincode::deserialize(bytes)
                .map(Some)
                .map_err(|e| WalletError::storage(format!("wallet state is unreadable: {}", e))),
            None => Ok(None),
        }
    }

    fn save_state(&self, state: &WalletState) -> WalletResult<()> {
        let bytes = bincode::serialize(state)
            .map_err(|e| WalletError::storage(format!("cannot encode wallet state: {}", e)))?;
        *self.state.lock().map_err(poisoned)? = Some(bytes);
        Ok(())
    }
}
