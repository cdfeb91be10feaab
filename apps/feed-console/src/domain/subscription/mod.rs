//! Subscription Types
//!
//! Symbols and the per-subscription symbol set. A subscription is created
//! for exactly one event type; symbols are added to it over its lifetime
//! and replayed whenever the underlying connection is re-established.

use std::fmt;

use super::events::EventType;

// =============================================================================
// Symbol
// =============================================================================

/// Errors produced when validating symbols.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Symbol was empty after trimming.
    #[error("symbol cannot be empty")]
    Empty,
}

/// An instrument symbol as understood by the feed (e.g. `ETH/USD:GDAX`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::Empty` if nothing is left after trimming.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SymbolError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Parse a comma separated list, skipping blank entries and duplicates.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::Empty` if the list holds no symbol at all.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, SymbolError> {
        let mut symbols: Vec<Self> = Vec::new();
        for part in raw.split(',') {
            if let Ok(symbol) = Self::new(part)
                && !symbols.contains(&symbol)
            {
                symbols.push(symbol);
            }
        }

        if symbols.is_empty() {
            Err(SymbolError::Empty)
        } else {
            Ok(symbols)
        }
    }

    /// Borrow the symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Subscription State
// =============================================================================

/// Symbols subscribed for one event type, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionState {
    event_type: EventType,
    symbols: Vec<Symbol>,
}

impl SubscriptionState {
    /// Create an empty subscription for the given event type.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            symbols: Vec::new(),
        }
    }

    /// Event type of this subscription.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Add a symbol. Returns `false` if it was already subscribed.
    pub fn add(&mut self, symbol: &Symbol) -> bool {
        if self.symbols.contains(symbol) {
            return false;
        }
        self.symbols.push(symbol.clone());
        true
    }

    /// Check whether a symbol is subscribed.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s.as_str() == symbol)
    }

    /// Subscribed symbols.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Check if there are no subscribed symbols.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
