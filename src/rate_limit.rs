//! Fixed-window rate limiting with exponential-backoff blocking.
//!
//! Counters are keyed by (identifier, category) in a sharded concurrent
//! map; the whole window/threshold/backoff decision runs while holding the
//! entry's exclusive guard, so concurrent requests for the same key cannot
//! both observe "under limit". IP identifiers are hashed before use and
//! repeat offenders are auto-blacklisted.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashSet, net::IpAddr, time::Duration};
use tracing::warn;

/// Counters idle longer than this are dropped by the sweep.
const STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitCategory {
    /// Login and refresh attempts
    Auth,
    /// General API traffic
    Api,
    /// Admin and account-mutating routes
    Sensitive,
    /// Media and import uploads
    Upload,
}

impl RateLimitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitCategory::Auth => "auth",
            RateLimitCategory::Api => "api",
            RateLimitCategory::Sensitive => "sensitive",
            RateLimitCategory::Upload => "upload",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// First-violation block duration; doubles per subsequent violation
    pub base_block_secs: u64,
    /// Backoff cap
    pub max_block_secs: u64,
    /// Violations before an IP identifier is auto-blacklisted
    pub auto_blacklist_threshold: u32,
    /// Blacklist entry lifetime; `None` keeps entries until manually removed
    pub blacklist_ttl_hours: Option<u64>,
    /// Identifiers that bypass limiting entirely (IPs or raw identifiers)
    #[serde(default)]
    pub whitelist: Vec<String>,
    pub auth: CategoryLimit,
    pub api: CategoryLimit,
    pub sensitive: CategoryLimit,
    pub upload: CategoryLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_block_secs: 1800,
            max_block_secs: 86_400,
            auto_blacklist_threshold: 5,
            blacklist_ttl_hours: Some(24),
            whitelist: Vec::new(),
            auth: CategoryLimit {
                max_requests: 5,
                window_secs: 900,
            },
            api: CategoryLimit {
                max_requests: 100,
                window_secs: 60,
            },
            sensitive: CategoryLimit {
                max_requests: 10,
                window_secs: 60,
            },
            upload: CategoryLimit {
                max_requests: 5,
                window_secs: 60,
            },
        }
    }
}

impl RateLimitConfig {
    pub fn limit_for(&self, category: RateLimitCategory) -> CategoryLimit {
        match category {
            RateLimitCategory::Auth => self.auth,
            RateLimitCategory::Api => self.api,
            RateLimitCategory::Sensitive => self.sensitive,
            RateLimitCategory::Upload => self.upload,
        }
    }
}

/// Outcome of a rate-limit check. `remaining == None` means unlimited
/// (whitelisted or limiting disabled). Callers surface these fields as
/// response headers and 429 bodies.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: Option<u32>,
    pub reset_at: DateTime<Utc>,
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    fn unlimited(now: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            remaining: None,
            reset_at: now,
            retry_after: None,
        }
    }

    fn denied_until(now: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        let retry_after = (until - now).to_std().unwrap_or_default();
        Self {
            allowed: false,
            remaining: Some(0),
            reset_at: until,
            retry_after: Some(retry_after),
        }
    }
}

#[derive(Debug, Clone)]
struct CounterState {
    window_start: DateTime<Utc>,
    count: u32,
    violation_count: u32,
    blocked_until: Option<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

impl CounterState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count: 0,
            violation_count: 0,
            blocked_until: None,
            last_seen: now,
        }
    }
}

/// Hash an IP address into a stable rate-limit identifier. Raw addresses
/// never become map keys or audit payloads.
pub fn ip_identifier(ip: IpAddr) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn user_identifier(user_id: i32) -> String {
    format!("user:{user_id}")
}

/// Rate limiting service
pub struct RateLimitService {
    config: RateLimitConfig,
    counters: DashMap<(String, RateLimitCategory), CounterState>,
    blacklist: DashMap<String, DateTime<Utc>>,
    whitelist: HashSet<String>,
}

impl RateLimitService {
    pub fn new(config: RateLimitConfig) -> Self {
        let whitelist = config
            .whitelist
            .iter()
            .map(|entry| match entry.parse::<IpAddr>() {
                Ok(ip) => ip_identifier(ip),
                Err(_) => entry.clone(),
            })
            .collect();

        Self {
            config,
            counters: DashMap::new(),
            blacklist: DashMap::new(),
            whitelist,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and count one request for (identifier, category).
    pub fn check(
        &self,
        identifier: &str,
        category: RateLimitCategory,
        is_ip_based: bool,
    ) -> RateLimitDecision {
        let now = Utc::now();

        if !self.config.enabled {
            return RateLimitDecision::unlimited(now);
        }

        if self.whitelist.contains(identifier) {
            return RateLimitDecision::unlimited(now);
        }

        if let Some(until) = self.blacklisted_until(identifier, now) {
            return RateLimitDecision::denied_until(now, until);
        }

        let limit = self.config.limit_for(category);
        let window = ChronoDuration::seconds(limit.window_secs as i64);

        let key = (identifier.to_string(), category);
        let mut state = self
            .counters
            .entry(key)
            .or_insert_with(|| CounterState::new(now));
        state.last_seen = now;

        if let Some(blocked_until) = state.blocked_until {
            if now < blocked_until {
                return RateLimitDecision::denied_until(now, blocked_until);
            }
            state.blocked_until = None;
        }

        if now - state.window_start >= window {
            state.count = 0;
            state.window_start = now;
        }

        state.count += 1;

        if state.count > limit.max_requests {
            state.violation_count += 1;
            let exponent = state.violation_count.saturating_sub(1).min(20);
            let block_secs = self
                .config
                .base_block_secs
                .saturating_mul(1u64 << exponent)
                .min(self.config.max_block_secs);
            let blocked_until = now + ChronoDuration::seconds(block_secs as i64);
            state.blocked_until = Some(blocked_until);

            counter!("rate_limit_violations_total", "category" => category.as_str()).increment(1);
            warn!(
                identifier = %identifier,
                category = category.as_str(),
                violations = state.violation_count,
                block_secs,
                "Rate limit exceeded"
            );

            if is_ip_based && state.violation_count >= self.config.auto_blacklist_threshold {
                self.blacklist.insert(identifier.to_string(), now);
                counter!("rate_limit_auto_blacklist_total").increment(1);
                warn!(identifier = %identifier, "Identifier auto-blacklisted");
            }

            return RateLimitDecision::denied_until(now, blocked_until);
        }

        RateLimitDecision {
            allowed: true,
            remaining: Some(limit.max_requests - state.count),
            reset_at: state.window_start + window,
            retry_after: None,
        }
    }

    fn blacklisted_until(&self, identifier: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let listed_at = self.blacklist.get(identifier).map(|entry| *entry.value())?;

        match self.config.blacklist_ttl_hours {
            None => Some(DateTime::<Utc>::MAX_UTC),
            Some(hours) => {
                let until = listed_at + ChronoDuration::hours(hours as i64);
                if now < until {
                    Some(until)
                } else {
                    self.blacklist.remove(identifier);
                    None
                }
            }
        }
    }

    pub fn blacklist_add(&self, identifier: &str) {
        self.blacklist.insert(identifier.to_string(), Utc::now());
    }

    pub fn blacklist_remove(&self, identifier: &str) -> bool {
        self.blacklist.remove(identifier).is_some()
    }

    pub fn is_blacklisted(&self, identifier: &str) -> bool {
        self.blacklisted_until(identifier, Utc::now()).is_some()
    }

    /// Drop counters whose block has expired and whose window has been idle
    /// beyond the staleness horizon, plus expired blacklist entries.
    /// Bounds memory; runs on its own timer and never blocks `check`
    /// beyond individual shard guards.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let stale_after = ChronoDuration::hours(STALE_AFTER_HOURS);

        let counters_before = self.counters.len();
        self.counters.retain(|_, state| {
            let block_active = state.blocked_until.is_some_and(|until| until > now);
            block_active || now - state.last_seen < stale_after
        });
        let mut removed = counters_before - self.counters.len();

        if let Some(hours) = self.config.blacklist_ttl_hours {
            let ttl = ChronoDuration::hours(hours as i64);
            let blacklist_before = self.blacklist.len();
            self.blacklist.retain(|_, listed_at| now - *listed_at < ttl);
            removed += blacklist_before - self.blacklist.len();
        }

        removed
    }

    #[cfg(test)]
    fn counter_len(&self) -> usize {
        self.counters.len()
    }
}
