use std::collections::HashMap;
use std::path::Path;

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use once_cell::sync::Lazy;
use password_hash::{PasswordHash, SaltString};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use super::principal::{Identity, Role};
use crate::config::HashingConfig;
use crate::error::AuthError;

/// Address pre-filled by the login page's demo wallet button.
pub const DEMO_WALLET_ADDRESS: &str = "0x742d35Cc6438C4532EbB3df0f662e8b6E86D7abC";

static WALLET_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("static wallet address pattern"));

/// Validates email/password pairs and wallet addresses, producing identities.
pub trait CredentialVerifier: Send + Sync {
    fn verify_password(&self, email: &str, password: &str) -> Option<Identity>;
    fn verify_wallet(&self, address: &str, signature: Option<&str>) -> Option<Identity>;
}

/// One entry of the credential table as supplied at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSeed {
    pub email: String,
    pub password: String,
    pub identity: Identity,
}

impl CredentialSeed {
    pub fn new(password: &str, identity: Identity) -> Self {
        Self { email: identity.email.clone(), password: password.to_string(), identity }
    }
}

/// The four demo accounts, one per role.
pub fn demo_seeds() -> Vec<CredentialSeed> {
    vec![
        CredentialSeed::new("admin123", Identity::new("1", "admin@hackathon.app", Role::Admin, "Admin User")),
        CredentialSeed::new(
            "participant123",
            Identity::new("2", "participant@hackathon.app", Role::Participant, "Participant User"),
        ),
        CredentialSeed::new("sponsor123", Identity::new("3", "sponsor@hackathon.app", Role::Sponsor, "Sponsor User")),
        CredentialSeed::new("judge123", Identity::new("4", "judge@hackathon.app", Role::Judge, "Judge User")),
    ]
}

#[derive(Debug, Clone)]
struct CredentialRecord {
    phc: String,
    identity: Identity,
}

/// Fixed, read-only credential table with Argon2id-hashed secrets.
#[derive(Debug, Clone)]
pub struct LocalVerifier {
    records: HashMap<String, CredentialRecord>,
    /// Verified against for unknown emails so both failure paths cost the same.
    dummy_phc: String,
}

fn argon2_for(cfg: &HashingConfig) -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(cfg.m_cost_kib, cfg.t_cost, cfg.p_cost, None)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn hash_password(argon2: &Argon2<'_>, password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .to_string();
    Ok(phc)
}

fn verify_phc(phc: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(phc) {
        // Cost parameters come from the PHC string itself.
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

impl LocalVerifier {
    /// Build the table, hashing every seed secret. Later seeds replace earlier ones
    /// with the same email.
    pub fn new(seeds: Vec<CredentialSeed>, hashing: &HashingConfig) -> Result<Self, AuthError> {
        let argon2 = argon2_for(hashing)?;
        let mut records = HashMap::with_capacity(seeds.len());
        for seed in seeds {
            let phc = hash_password(&argon2, &seed.password)?;
            if seed.identity.email != seed.email {
                warn!(target: "hackchain::auth", email = %seed.email, "seed identity email differs from login email");
            }
            records.insert(seed.email, CredentialRecord { phc, identity: seed.identity });
        }
        let dummy_phc = hash_password(&argon2, "unused-dummy-secret")?;
        debug!(target: "hackchain::auth", count = records.len(), "credential table ready");
        Ok(Self { records, dummy_phc })
    }

    pub fn demo(hashing: &HashingConfig) -> Result<Self, AuthError> {
        Self::new(demo_seeds(), hashing)
    }

    /// Load seeds from a JSON array of `{email, password, identity}` objects.
    pub fn from_seed_file(path: &Path, hashing: &HashingConfig) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read credential seeds {}: {}", path.display(), e))?;
        let seeds: Vec<CredentialSeed> = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("invalid credential seeds {}: {}", path.display(), e))?;
        Ok(Self::new(seeds, hashing)?)
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

impl CredentialVerifier for LocalVerifier {
    /// Exact, case-sensitive match on both fields.
    fn verify_password(&self, email: &str, password: &str) -> Option<Identity> {
        match self.records.get(email) {
            Some(rec) if verify_phc(&rec.phc, password) => Some(rec.identity.clone()),
            Some(_) => None,
            None => {
                let _ = verify_phc(&self.dummy_phc, password);
                None
            }
        }
    }

    /// Any well-formed address is accepted. The signature is not checked.
    fn verify_wallet(&self, address: &str, signature: Option<&str>) -> Option<Identity> {
        if validate_wallet_address(address).is_err() {
            return None;
        }
        if signature.is_some() {
            debug!(target: "hackchain::auth", "wallet signature supplied but not verified");
        }
        Some(wallet_identity(address))
    }
}

/// `0x` followed by exactly 40 hex digits, either case.
pub fn validate_wallet_address(address: &str) -> Result<(), AuthError> {
    if WALLET_ADDRESS_RE.is_match(address) { Ok(()) } else { Err(AuthError::MalformedWalletAddress) }
}

/// Both fields must be non-empty before a login is attempted.
pub fn validate_login_input(email: &str, password: &str) -> Result<(), AuthError> {
    if email.is_empty() || password.is_empty() { Err(AuthError::MissingCredentials) } else { Ok(()) }
}

/// Deterministic participant identity derived from the address prefix.
/// Callers must have validated the address (ASCII, at least 8 characters).
fn wallet_identity(address: &str) -> Identity {
    let prefix = &address[..8];
    let mut identity = Identity::new(
        format!("wallet_{}", prefix),
        format!("{}@wallet.eth", prefix),
        Role::Participant,
        format!("User {}", prefix),
    );
    identity.wallet_address = Some(address.to_string());
    identity
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod provider_tests;
