//! # Challenges and the Nonce Ledger
//!
//! A challenge is the string
//!
//! ```text
//! meld:v1:<unix-millis>:<32 hex nonce>[:<context>]
//! ```
//!
//! Challenges issued by this node are recorded in a [`NonceLedger`] with an
//! expiry of `issued_at + window`. A challenge is accepted for
//! authentication exactly once, and only before it expires. Unknown,
//! expired and already-consumed challenges are refused alike, which closes
//! the replay window for a captured signature.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use meld_core::{Timestamp, ValidationError};
use parking_lot::Mutex;
use rand::RngCore;

const PREFIX: &str = "meld";
const VERSION: &str = "v1";
const NONCE_LEN: usize = 16;

/// Maximum length of the optional context suffix.
pub const MAX_CONTEXT_LEN: usize = 128;

/// A parsed challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    issued_at: Timestamp,
    nonce: [u8; NONCE_LEN],
    context: Option<String>,
}

impl Challenge {
    /// A fresh challenge stamped now with a random nonce.
    pub fn generate(context: Option<&str>) -> Result<Self, ValidationError> {
        let context = context.map(validate_context).transpose()?;
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        Ok(Self {
            issued_at: Timestamp::now(),
            nonce,
            context,
        })
    }

    /// Parse a challenge string.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let malformed = |why: &str| ValidationError::Challenge(format!("{why}: {s:?}"));
        let mut parts = s.splitn(5, ':');
        if parts.next() != Some(PREFIX) || parts.next() != Some(VERSION) {
            return Err(malformed("unrecognized challenge prefix"));
        }
        let millis: i64 = parts
            .next()
            .and_then(|m| m.parse().ok())
            .ok_or_else(|| malformed("bad timestamp"))?;
        let issued_at = Timestamp::from_epoch_millis(millis)?;
        let nonce_hex = parts.next().ok_or_else(|| malformed("missing nonce"))?;
        let nonce = decode_nonce(nonce_hex).ok_or_else(|| malformed("bad nonce"))?;
        let context = parts.next().map(validate_context).transpose()?;
        Ok(Self {
            issued_at,
            nonce,
            context,
        })
    }

    pub fn issued_at(&self) -> Timestamp {
        self.issued_at
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// When this challenge stops being accepted.
    pub fn expires_at(&self, window: Duration) -> Timestamp {
        self.issued_at.plus(window)
    }
}

impl std::fmt::Display for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{PREFIX}:{VERSION}:{}:", self.issued_at.epoch_millis())?;
        for b in &self.nonce {
            write!(f, "{b:02x}")?;
        }
        if let Some(ctx) = &self.context {
            write!(f, ":{ctx}")?;
        }
        Ok(())
    }
}

fn validate_context(ctx: &str) -> Result<String, ValidationError> {
    if ctx.is_empty() || ctx.len() > MAX_CONTEXT_LEN || ctx.chars().any(char::is_control) {
        return Err(ValidationError::Challenge(format!("invalid context {ctx:?}")));
    }
    Ok(ctx.to_string())
}

fn decode_nonce(hex: &str) -> Option<[u8; NONCE_LEN]> {
    if hex.len() != NONCE_LEN * 2 || !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return None;
    }
    let mut out = [0u8; NONCE_LEN];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[derive(Debug, Default)]
struct Outstanding {
    by_challenge: HashMap<String, Timestamp>,
    /// Expiry index over `by_challenge`, soonest first.
    by_expiry: BTreeSet<(Timestamp, String)>,
}

impl Outstanding {
    fn remove(&mut self, challenge: &str) -> Option<Timestamp> {
        let expires_at = self.by_challenge.remove(challenge)?;
        self.by_expiry.remove(&(expires_at, challenge.to_string()));
        Some(expires_at)
    }

    fn pop_soonest(&mut self) -> Option<(Timestamp, String)> {
        let (expires_at, challenge) = self.by_expiry.pop_first()?;
        self.by_challenge.remove(&challenge);
        Some((expires_at, challenge))
    }
}

/// Outstanding challenges and their expiry.
#[derive(Debug)]
pub struct NonceLedger {
    window: Duration,
    capacity: usize,
    outstanding: Mutex<Outstanding>,
}

impl NonceLedger {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            outstanding: Mutex::new(Outstanding::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `challenge` as outstanding. Returns its expiry.
    ///
    /// Expired entries are dropped first; if the ledger is still full the
    /// entry closest to expiry is evicted.
    pub fn issue(&self, challenge: &Challenge) -> Timestamp {
        self.issue_at(challenge, Timestamp::now())
    }

    pub fn issue_at(&self, challenge: &Challenge, now: Timestamp) -> Timestamp {
        let expires_at = challenge.expires_at(self.window);
        let key = challenge.to_string();
        let mut outstanding = self.outstanding.lock();
        outstanding.remove(&key);
        while outstanding
            .by_expiry
            .first()
            .is_some_and(|(exp, _)| *exp <= now)
        {
            outstanding.pop_soonest();
        }
        while outstanding.by_challenge.len() >= self.capacity {
            if outstanding.pop_soonest().is_none() {
                break;
            }
            tracing::debug!("nonce ledger full, evicted oldest challenge");
        }
        outstanding.by_expiry.insert((expires_at, key.clone()));
        outstanding.by_challenge.insert(key, expires_at);
        expires_at
    }

    /// Consume `challenge`. `true` only the first time, and only before expiry.
    pub fn consume(&self, challenge: &str) -> bool {
        self.consume_at(challenge, Timestamp::now())
    }

    pub fn consume_at(&self, challenge: &str, now: Timestamp) -> bool {
        match self.outstanding.lock().remove(challenge) {
            Some(expires_at) => now <= expires_at,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.outstanding.lock().by_challenge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.lock().by_challenge.is_empty()
    }
}
