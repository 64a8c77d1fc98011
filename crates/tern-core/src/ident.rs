//! Module identifiers and routing rules.
//!
//! Every participant on the bus is addressed by a [`ModuleIdentifier`], a
//! `(main, sub)` pair such as `IRC:libera` or `Module:Ping`. The sub part
//! may be the wildcard `*` when the identifier is used as a message
//! *target*; it never names a registered module.
//!
//! ```rust
//! use tern_core::{ModuleIdentifier, RouteMatch};
//!
//! let target = ModuleIdentifier::new("IRC", "*");
//! let module = ModuleIdentifier::new("IRC", "libera");
//!
//! assert_eq!(module.compare(&target), RouteMatch::Full);
//! assert!(target.routes_to(&module));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The wildcard sub identifier.
pub const WILDCARD: &str = "*";

/// Identity of a module on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleIdentifier {
    /// Family of the module (`IRC`, `Terminal`, `Module`, ...).
    pub main: String,
    /// Instance within the family, or `*` when used as a target.
    pub sub: String,
}

/// Result of comparing a module identifier against a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RouteMatch {
    /// Main identifiers differ.
    NoMatch,
    /// Main identifiers match but sub identifiers do not.
    MainOnly,
    /// Main identifiers match and the sub identifier matches or the target is a wildcard.
    Full,
}

impl ModuleIdentifier {
    /// Creates a new identifier.
    pub fn new(main: impl Into<String>, sub: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            sub: sub.into(),
        }
    }

    /// Creates a wildcard target addressing every module of a family.
    pub fn wildcard(main: impl Into<String>) -> Self {
        Self::new(main, WILDCARD)
    }

    /// Returns `true` if the sub identifier is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.sub == WILDCARD
    }

    /// Compares this (module) identifier against a message target.
    pub fn compare(&self, target: &ModuleIdentifier) -> RouteMatch {
        if self.main != target.main {
            RouteMatch::NoMatch
        } else if target.is_wildcard() || self.sub == target.sub {
            RouteMatch::Full
        } else {
            RouteMatch::MainOnly
        }
    }

    /// Returns `true` if a message targeted at `self` should be delivered to `module`.
    pub fn routes_to(&self, module: &ModuleIdentifier) -> bool {
        module.compare(self) == RouteMatch::Full
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.main, self.sub)
    }
}

/// Error returned when a `main:sub` string cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid module identifier '{input}': expected 'main:sub'")]
pub struct IdentParseError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for ModuleIdentifier {
    type Err = IdentParseError;

    /// Splits at the first `:`; everything after it is the sub identifier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((main, sub)) if !main.is_empty() => Ok(Self::new(main, sub)),
            _ => Err(IdentParseError {
                input: s.to_string(),
            }),
        }
    }
}
