//! Invite gate
//!
//! Raw invite codes are published in base64 so they can be shown and typed
//! without handing out the raw secret verbatim. A presented token must decode
//! and must appear, still encoded, in the accepted set.

use std::collections::HashSet;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;

use crate::error::InviteError;

/// Whether an accepted code may be presented again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvitePolicy {
    /// Codes stay valid after use
    #[default]
    Reusable,
    /// A code is consumed by its first successful check
    SingleUse,
}

impl From<bool> for InvitePolicy {
    fn from(single_use: bool) -> Self {
        if single_use {
            InvitePolicy::SingleUse
        } else {
            InvitePolicy::Reusable
        }
    }
}

/// Validates presented invite tokens against a fixed set of accepted codes
#[derive(Debug)]
pub struct InviteGate {
    /// Encoded codes, computed once at startup
    accepted: HashSet<String>,
    policy: InvitePolicy,
    /// Encoded codes already consumed (only touched under `SingleUse`)
    used: Mutex<HashSet<String>>,
}

impl InviteGate {
    /// Build a gate from raw codes, encoding each one
    pub fn from_raw_codes<I, S>(raw_codes: I, policy: InvitePolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accepted = raw_codes
            .into_iter()
            .map(|code| encode(code.as_ref()))
            .collect();

        Self {
            accepted,
            policy,
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Build a gate from `count` random raw codes of the form `NNN-NNN`
    pub fn generate(count: usize, policy: InvitePolicy) -> Self {
        let mut rng = rand::thread_rng();
        let mut raw = HashSet::with_capacity(count);
        while raw.len() < count {
            raw.insert(format!(
                "{}-{}",
                rng.gen_range(100..=999),
                rng.gen_range(100..=999)
            ));
        }
        Self::from_raw_codes(raw, policy)
    }

    pub fn policy(&self) -> InvitePolicy {
        self.policy
    }

    /// Encoded codes in a stable order, for display to the operator
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.accepted.iter().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Check a presented token
    ///
    /// On success returns the decoded raw code. Under `SingleUse` a successful
    /// check consumes the code.
    pub fn validate(&self, presented: &str) -> Result<String, InviteError> {
        let token = presented.trim();
        let decoded = decode(token)?;

        if !self.accepted.contains(token) {
            return Err(InviteError::NotAccepted);
        }

        if self.policy == InvitePolicy::SingleUse {
            let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
            if !used.insert(token.to_string()) {
                return Err(InviteError::AlreadyUsed);
            }
        }

        Ok(decoded)
    }
}

/// Apply the public encoding to a raw code
pub fn encode(raw: &str) -> String {
    STANDARD.encode(raw.as_bytes())
}

/// Reverse the public encoding
pub fn decode(token: &str) -> Result<String, InviteError> {
    let bytes = STANDARD.decode(token).map_err(|_| InviteError::Malformed)?;
    String::from_utf8(bytes).map_err(|_| InviteError::Malformed)
}
