//! # meld-core — Foundational Types for MELD Node Identity
//!
//! Every other crate in the workspace depends on `meld-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `ChipUid`, `DeviceId` and `Did`
//!    are validated at construction. No bare strings cross crate boundaries.
//!
//! 2. **`CanonicalBytes` newtype.** Every content hash and every record
//!    signature is computed over `CanonicalBytes::new()`. A record hashed at
//!    creation and re-hashed at verification therefore sees the same bytes.
//!
//! 3. **UTC-only, millisecond timestamps.** `Timestamp` renders as
//!    `YYYY-MM-DDTHH:MM:SS.mmmZ` so canonical serialization is stable.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `meld-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{CanonicalizationError, CryptoError, MeldError, ValidationError};
pub use identity::{ChipUid, DeviceId, Did};
pub use temporal::Timestamp;
