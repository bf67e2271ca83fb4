//! Identity, session persistence and authentication state for the dashboard.
//! Keep the public surface thin and split implementation across sub-modules.

mod adapters;
mod authorizer;
mod context;
mod principal;
mod provider;
mod session;

pub use adapters::ProfileRow;
pub use authorizer::{check_role_allowed, RoleSet};
pub use context::{AuthContext, AuthPhase, AuthState};
pub use principal::{Identity, Role, UnknownRole};
pub use provider::{
    demo_seeds, validate_login_input, validate_wallet_address, CredentialSeed, CredentialVerifier, LocalVerifier,
    DEMO_WALLET_ADDRESS,
};
pub use session::{
    gen_token, is_well_formed_token, FileBackend, MemoryBackend, SessionBackend, SessionStore, SESSION_KEY,
};
