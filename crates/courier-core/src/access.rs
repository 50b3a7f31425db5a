//! Sender access control
//!
//! An optional allow-list of user ids. When the list is disabled every real
//! user passes; senders that are not individual users never pass.

use std::collections::HashSet;

use tracing::warn;

use crate::errors::{CourierError, Result};
use crate::types::UserId;

/// Fixed reply sent to senders the gate rejects
pub const NOT_AUTHORIZED_NOTICE: &str = "You are not authorized to use this bot.";

// ----------------------------------------------------------------------------
// Allow List
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    enabled: bool,
    ids: HashSet<UserId>,
}

impl AllowList {
    /// Allow-list that lets every user through
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_ids<I: IntoIterator<Item = UserId>>(ids: I) -> Self {
        Self {
            enabled: true,
            ids: ids.into_iter().collect(),
        }
    }

    /// Parse a comma-separated list of user ids
    ///
    /// Blank entries between commas are skipped; a list with no ids at all
    /// (blank, or only separators) disables the gate.
    pub fn parse(csv: &str) -> Result<Self> {
        let mut ids = HashSet::new();
        for token in csv.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let id = token.parse::<i64>().map_err(|_| {
                CourierError::config_error(format!("invalid user id in allow-list: {token:?}"))
            })?;
            ids.insert(UserId(id));
        }

        if ids.is_empty() {
            return Ok(Self::disabled());
        }
        Ok(Self { enabled: true, ids })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.ids.contains(&user_id)
    }
}

// ----------------------------------------------------------------------------
// Access Gate
// ----------------------------------------------------------------------------

/// Filters inbound events by sender identity
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    allow_list: AllowList,
    denied: u64,
}

impl AccessGate {
    pub fn new(allow_list: AllowList) -> Self {
        Self {
            allow_list,
            denied: 0,
        }
    }

    /// Whether `user_id` may trigger any further processing
    pub fn is_allowed(&mut self, user_id: UserId) -> bool {
        let allowed = if !user_id.is_user() {
            false
        } else if !self.allow_list.is_enabled() {
            true
        } else {
            self.allow_list.contains(user_id)
        };

        if !allowed {
            self.denied += 1;
            warn!(user_id = user_id.0, "sender denied by access gate");
        }
        allowed
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Number of denials since creation
    pub fn denied_count(&self) -> u64 {
        self.denied
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
