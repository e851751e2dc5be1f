use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use itertools::Itertools;
use serde::Serialize;
use serde_with::{DisplayFromStr, serde_as};
use thiserror::Error;

use crate::cards::Card;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("card '{token}' must be exactly two characters (rank + suit)")]
    CardLength { token: String },

    #[error("invalid rank '{rank}' in card '{token}'")]
    InvalidRank { token: String, rank: char },

    #[error("invalid suit '{suit}' in card '{token}'")]
    InvalidSuit { token: String, suit: char },

    #[error("expected {expected} cards in '{token}', found {found}")]
    CardCount {
        token: String,
        expected: usize,
        found: usize,
    },

    #[error("'{token}' cannot be split into two-character cards")]
    UnevenCards { token: String },

    #[error("'{value}' is not a whole number (digits only)")]
    NotDigits { value: String },

    #[error("'{value}' is too large")]
    OutOfRange { value: String },

    #[error("no position tokens in '{value}'")]
    NoPositions { value: String },
}

/// A field that is populated before the street it belongs to has opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreetViolation {
    pub field: &'static str,
    pub requires: &'static str,
}

impl Display for StreetViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} requires {}", self.field, self.requires)
    }
}

/// A present field whose value could not be read.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidValue {
    pub field: &'static str,
    #[serde_as(as = "DisplayFromStr")]
    pub error: FormatError,
}

impl Display for InvalidValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

/// Everything wrong with one set of hand fields, collected in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub missing_fields: BTreeSet<&'static str>,
    pub invalid_values: Vec<InvalidValue>,
    pub street_violations: Vec<StreetViolation>,
    pub duplicate_cards: Vec<Card>,
}

impl ValidationError {
    pub fn missing(fields: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            missing_fields: fields.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing_fields.is_empty()
            && self.invalid_values.is_empty()
            && self.street_violations.is_empty()
            && self.duplicate_cards.is_empty()
    }

    /// Every field the caller should re-prompt for.
    pub fn offending_fields(&self) -> BTreeSet<&'static str> {
        self.missing_fields
            .iter()
            .copied()
            .chain(self.invalid_values.iter().map(|v| v.field))
            .chain(self.street_violations.iter().map(|v| v.field))
            .collect()
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.missing_fields.is_empty() {
            parts.push(format!("missing fields: {}", self.missing_fields.iter().join(", ")));
        }
        if !self.invalid_values.is_empty() {
            parts.push(format!("invalid values: {}", self.invalid_values.iter().join("; ")));
        }
        if !self.street_violations.is_empty() {
            parts.push(format!(
                "street order violated: {}",
                self.street_violations.iter().join("; ")
            ));
        }
        if !self.duplicate_cards.is_empty() {
            parts.push(format!(
                "duplicate cards: {}",
                self.duplicate_cards.iter().join(", ")
            ));
        }
        write!(f, "invalid hand state ({})", parts.join(" | "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no fenced block found")]
    NoFencedBlock,

    #[error("malformed structured data: {detail}")]
    Malformed { raw: String, detail: String },
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("solver invocation failed: {cause:#}")]
    Invocation { cause: anyhow::Error },

    #[error("solver output is missing '{key}'")]
    MissingKey { key: &'static str },

    #[error("solver output has an incompatible '{key}': {reason}")]
    IncompatibleShape { key: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("explanation model call failed: {cause:#}")]
    Model { cause: anyhow::Error },

    #[error("could not extract the explanation: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to encode the report for the prompt: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} did not finish within {}s", .budget.as_secs_f32())]
pub struct TimeoutError {
    pub operation: &'static str,
    pub budget: Duration,
}
