use crate::core::models::AdUnitType;
use dashmap::DashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Opaque single use handle to a prefetched value. Random, so
/// holders cannot guess the tokens of other callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(Uuid);

impl Token {
    fn generate() -> Self {
        Token(Uuid::new_v4())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Longest life a token can get from `TokenValue::expiring_in`
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct TokenValue<T> {
    pub payload: T,
    pub ad_unit_type: AdUnitType,
    pub expires_at: Instant,
}

impl<T> TokenValue<T> {
    pub fn new(payload: T, ad_unit_type: AdUnitType, expires_at: Instant) -> Self {
        Self {
            payload,
            ad_unit_type,
            expires_at,
        }
    }

    /// Value living `ttl` from now, capped at `MAX_TOKEN_TTL`
    pub fn expiring_in(payload: T, ad_unit_type: AdUnitType, ttl: Duration) -> Self {
        Self::new(payload, ad_unit_type, Instant::now() + ttl.min(MAX_TOKEN_TTL))
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Hands out prefetched values exactly once in exchange for a token
pub struct TokenStore<T> {
    tokens: DashMap<Token, TokenValue<T>>,
}

impl<T> Default for TokenStore<T> {
    fn default() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }
}

impl<T> TokenStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the value under a fresh token
    pub fn publish(&self, value: TokenValue<T>) -> Token {
        let token = Token::generate();
        self.tokens.insert(token, value);

        token
    }

    /// Redeem a token. Look-up and removal happen under the same entry
    /// lock, so concurrent consumers of one token see a single winner.
    ///
    /// # Behavior
    /// - expired values are removed and reported absent
    /// - a value of another ad unit type is reported absent but left in
    ///   place for a caller holding the right type
    pub fn consume(&self, token: &Token, expected: AdUnitType) -> Option<TokenValue<T>> {
        let now = Instant::now();

        let (_, value) = self.tokens.remove_if(token, |_, value| {
            value.is_expired_at(now) || value.ad_unit_type == expected
        })?;

        if value.is_expired_at(now) {
            debug!("Token {} expired before being consumed", token);
            return None;
        }

        Some(value)
    }

    /// Drops every expired value, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, value| !value.is_expired_at(now));

        before.saturating_sub(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
