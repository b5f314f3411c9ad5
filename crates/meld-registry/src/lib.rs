//! # meld-registry — Public-Key Registry
//!
//! One contract, [`KeyRegistry`], with interchangeable backends:
//!
//! - [`CentralizedRegistry`]: HTTP client for a registry service.
//! - [`BlockchainRegistry`]: defined extension point, not implemented.
//! - [`P2PRegistry`]: content-addressed records gossiped over a
//!   [`meld_discovery::DiscoveryNode`].
//! - [`MemoryRegistry`]: in-process store backing the HTTP service.
//!
//! [`RegistryContext`] owns the offline cache and applies the policy:
//! register P2P first with centralized fallback; look up cache, then P2P,
//! then centralized.

pub mod backend;
pub mod blockchain;
pub mod centralized;
pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod p2p;
pub(crate) mod retry;

pub use backend::{BackendKind, KeyRegistry};
pub use blockchain::BlockchainRegistry;
pub use centralized::{CentralizedRegistry, LookupResponse, RegisterRequest, RegisterResponse};
pub use config::{ConfigError, RegistryClientConfig};
pub use context::{KeySource, RegistrationReceipt, RegistryContext, RegistryContextBuilder, ResolvedKey};
pub use error::RegistryError;
pub use memory::{MemoryRegistry, RegisteredKey};
pub use p2p::P2PRegistry;
