use std::str::FromStr;

use crate::error::DebugError;

/// How many hits a breakpoint needs before it takes effect.
///
/// Accepted forms: `5` or `== 5`, `>= 3`, `> 3`, `% 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCondition {
    Equal(u64),
    AtLeast(u64),
    GreaterThan(u64),
    Multiple(u64),
}

impl HitCondition {
    /// `count` is the 1-based hit number, already including the current hit.
    pub fn matches(&self, count: u64) -> bool {
        match *self {
            HitCondition::Equal(n) => count == n,
            HitCondition::AtLeast(n) => count >= n,
            HitCondition::GreaterThan(n) => count > n,
            HitCondition::Multiple(n) => count % n == 0,
        }
    }
}

impl FromStr for HitCondition {
    type Err = DebugError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || DebugError::InvalidHitCondition(text.to_string());
        let trimmed = text.trim();

        let (ctor, rest): (fn(u64) -> HitCondition, &str) =
            if let Some(rest) = trimmed.strip_prefix("==") {
                (HitCondition::Equal, rest)
            } else if let Some(rest) = trimmed.strip_prefix(">=") {
                (HitCondition::AtLeast, rest)
            } else if let Some(rest) = trimmed.strip_prefix('>') {
                (HitCondition::GreaterThan, rest)
            } else if let Some(rest) = trimmed.strip_prefix('%') {
                (HitCondition::Multiple, rest)
            } else {
                (HitCondition::Equal, trimmed)
            };

        let n: u64 = rest.trim().parse().map_err(|_| invalid())?;
        let condition = ctor(n);
        if condition == HitCondition::Multiple(0) {
            return Err(invalid());
        }
        Ok(condition)
    }
}

impl std::fmt::Display for HitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HitCondition::Equal(n) => write!(f, "== {n}"),
            HitCondition::AtLeast(n) => write!(f, ">= {n}"),
            HitCondition::GreaterThan(n) => write!(f, "> {n}"),
            HitCondition::Multiple(n) => write!(f, "% {n}"),
        }
    }
}
