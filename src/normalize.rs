//! Reduces manual form fields, model-extracted fields and configured
//! defaults to one validated [`HandState`].

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::cards::{Card, Delimiter, parse_card_sequence};
use crate::error::{FormatError, InvalidValue, StreetViolation, ValidationError};
use crate::game::{AnalysisMode, HandState};

pub const EFFECTIVE_STACK: &str = "effective_stack";
pub const HOLE_CARDS: &str = "hole_cards";
pub const POT_BEFORE_FLOP: &str = "pot_before_flop";
pub const PREFLOP_ACTION: &str = "preflop_action";
pub const FLOP_CARDS: &str = "flop_cards";
pub const FLOP_BET: &str = "flop_bet";
pub const TURN_CARD: &str = "turn_card";
pub const TURN_BET: &str = "turn_bet";
pub const RIVER_CARD: &str = "river_card";
pub const RIVER_BET: &str = "river_bet";
pub const FINAL_POT: &str = "final_pot";
pub const IMAGE: &str = "image";

/// The ten fields a manually entered hand must carry.
pub const GAME_FIELDS: [&str; 10] = [
    EFFECTIVE_STACK,
    HOLE_CARDS,
    POT_BEFORE_FLOP,
    PREFLOP_ACTION,
    FLOP_CARDS,
    FLOP_BET,
    TURN_CARD,
    TURN_BET,
    RIVER_CARD,
    RIVER_BET,
];

const THROUGH_FLOP_FIELDS: [&str; 4] = [EFFECTIVE_STACK, POT_BEFORE_FLOP, PREFLOP_ACTION, FLOP_CARDS];

/// Fields holding one or more cards.
const CARD_FIELDS: [&str; 4] = [HOLE_CARDS, FLOP_CARDS, TURN_CARD, RIVER_CARD];

/// Each street's bet and later card needs the card that opens it.
const STREET_GATES: [(&str, &str); 3] = [(TURN_BET, TURN_CARD), (RIVER_CARD, TURN_CARD), (RIVER_BET, RIVER_CARD)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredFields {
    /// All ten hand fields.
    Complete,
    /// Stack, pot, preflop action and flop; later streets are optional.
    ThroughFlop,
}

impl RequiredFields {
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            RequiredFields::Complete => &GAME_FIELDS,
            RequiredFields::ThroughFlop => &THROUGH_FLOP_FIELDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOrigin {
    Manual,
    Extracted,
    Default,
}

impl FieldOrigin {
    fn delimiter(self) -> Delimiter {
        match self {
            FieldOrigin::Extracted => Delimiter::FixedWidth,
            FieldOrigin::Manual | FieldOrigin::Default => Delimiter::Comma,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RawValue<'a> {
    text: &'a str,
    origin: FieldOrigin,
}

/// The three input layers, highest precedence first.
#[derive(Debug, Clone, Copy)]
pub struct FieldSources<'a> {
    pub manual: &'a BTreeMap<String, String>,
    pub extracted: Option<&'a BTreeMap<String, String>>,
    pub defaults: &'a BTreeMap<String, String>,
}

impl<'a> FieldSources<'a> {
    fn lookup(&self, name: &str) -> Option<RawValue<'a>> {
        let present = |map: &'a BTreeMap<String, String>| {
            map.get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };
        present(self.manual)
            .map(|text| RawValue {
                text,
                origin: FieldOrigin::Manual,
            })
            .or_else(|| {
                self.extracted.and_then(present).map(|text| RawValue {
                    text,
                    origin: FieldOrigin::Extracted,
                })
            })
            .or_else(|| {
                present(self.defaults).map(|text| RawValue {
                    text,
                    origin: FieldOrigin::Default,
                })
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Ready(HandState),
    /// GTO requests: the state still has to be read off the image.
    Deferred { image_ref: String },
}

#[derive(Debug, Clone, Default)]
pub struct GameStateNormalizer {
    defaults: BTreeMap<String, String>,
}

impl GameStateNormalizer {
    pub fn new(defaults: BTreeMap<String, String>) -> Self {
        Self { defaults }
    }

    pub fn normalize(
        &self,
        fields: &BTreeMap<String, String>,
        mode: AnalysisMode,
    ) -> Result<Normalized, ValidationError> {
        match mode {
            AnalysisMode::Game => self.normalize_manual(fields, mode).map(Normalized::Ready),
            AnalysisMode::Gto => {
                let image_ref = fields
                    .get(IMAGE)
                    .map(|value| value.trim())
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| ValidationError::missing([IMAGE]))?;
                Ok(Normalized::Deferred {
                    image_ref: image_ref.to_string(),
                })
            }
        }
    }

    /// Manually entered hands: every one of [`GAME_FIELDS`] must be present.
    pub fn normalize_manual(
        &self,
        fields: &BTreeMap<String, String>,
        mode: AnalysisMode,
    ) -> Result<HandState, ValidationError> {
        let sources = FieldSources {
            manual: fields,
            extracted: None,
            defaults: &self.defaults,
        };
        self.normalize_sources(&sources, mode, RequiredFields::Complete)
    }

    /// Merges manual fields over fields read from an image.
    pub fn normalize_extracted(
        &self,
        manual: &BTreeMap<String, String>,
        extracted: &BTreeMap<String, String>,
        mode: AnalysisMode,
    ) -> Result<HandState, ValidationError> {
        let sources = FieldSources {
            manual,
            extracted: Some(extracted),
            defaults: &self.defaults,
        };
        self.normalize_sources(&sources, mode, RequiredFields::ThroughFlop)
    }

    pub fn normalize_sources(
        &self,
        sources: &FieldSources<'_>,
        mode: AnalysisMode,
        required: RequiredFields,
    ) -> Result<HandState, ValidationError> {
        let mut problems = ValidationError::missing(
            required
                .fields()
                .iter()
                .copied()
                .filter(|name| sources.lookup(name).is_none()),
        );
        for (field, gate) in STREET_GATES {
            if sources.lookup(field).is_some() && sources.lookup(gate).is_none() {
                problems.street_violations.push(StreetViolation {
                    field,
                    requires: gate,
                });
            }
        }

        let mut reader = FieldReader {
            sources,
            invalid: Vec::new(),
        };
        let effective_stack = reader.amount(EFFECTIVE_STACK);
        let pot_before_flop = reader.amount(POT_BEFORE_FLOP);
        let hole_cards = reader.cards::<2>(HOLE_CARDS);
        let preflop_action = reader.preflop_action();
        let flop_cards = reader.cards::<3>(FLOP_CARDS);
        let flop_bet = reader.amount(FLOP_BET);
        let turn_card = reader.cards::<1>(TURN_CARD).map(|[card]| card);
        let turn_bet = reader.amount(TURN_BET);
        let river_card = reader.cards::<1>(RIVER_CARD).map(|[card]| card);
        let river_bet = reader.amount(RIVER_BET);
        let final_pot = reader.amount(FINAL_POT);
        problems.invalid_values = reader.invalid;

        // Both policies require these four, so a gap here is already recorded.
        let (Some(effective_stack), Some(pot_before_flop), Some(preflop_action), Some(flop_cards)) =
            (effective_stack, pot_before_flop, preflop_action, flop_cards)
        else {
            debug!(%problems, "hand fields rejected");
            return Err(problems);
        };

        let state = HandState {
            mode,
            effective_stack,
            pot_before_flop,
            hole_cards,
            preflop_action,
            flop_cards,
            flop_bet,
            turn_card,
            turn_bet,
            river_card,
            river_bet,
            final_pot,
        };

        problems.duplicate_cards = duplicate_cards(&state);
        if !problems.is_empty() {
            debug!(%problems, "hand fields rejected");
            return Err(problems);
        }
        Ok(state)
    }
}

pub fn parse_amount(text: &str) -> Result<u32, FormatError> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FormatError::NotDigits {
            value: text.to_string(),
        });
    }
    text.parse().map_err(|_| FormatError::OutOfRange {
        value: text.to_string(),
    })
}

/// Reads typed values off the merged sources. Unreadable values are recorded
/// and read as absent so every bad field surfaces in one report.
struct FieldReader<'s, 'a> {
    sources: &'s FieldSources<'a>,
    invalid: Vec<InvalidValue>,
}

impl FieldReader<'_, '_> {
    fn record<T>(&mut self, field: &'static str, parsed: Result<T, FormatError>) -> Option<T> {
        parsed
            .map_err(|error| self.invalid.push(InvalidValue { field, error }))
            .ok()
    }

    fn amount(&mut self, field: &'static str) -> Option<u32> {
        let raw = self.sources.lookup(field)?;
        self.record(field, parse_amount(raw.text))
    }

    fn cards<const N: usize>(&mut self, field: &'static str) -> Option<[Card; N]> {
        let raw = self.sources.lookup(field)?;
        let cards = self.record(
            field,
            parse_card_sequence(raw.text, N, raw.origin.delimiter()),
        )?;
        cards.try_into().ok()
    }

    fn preflop_action(&mut self) -> Option<Vec<String>> {
        let raw = self.sources.lookup(PREFLOP_ACTION)?;
        let tokens: Vec<String> = raw
            .text
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_ascii_uppercase)
            .collect();
        if tokens.is_empty() {
            return self.record(
                PREFLOP_ACTION,
                Err(FormatError::NoPositions {
                    value: raw.text.to_string(),
                }),
            );
        }
        Some(tokens)
    }
}

fn duplicate_cards(state: &HandState) -> Vec<Card> {
    let mut seen = BTreeSet::new();
    let mut duplicates = Vec::new();
    let hole = state.hole_cards.iter().flatten().copied();
    for card in hole.chain(state.board()) {
        if !seen.insert(card) && !duplicates.contains(&card) {
            duplicates.push(card);
        }
    }
    duplicates
}

/// Flattens a decoded extraction object into string fields. Integers keep
/// their digits, floats keep their decimal point (and are later rejected),
/// `null` means absent and arrays are joined the way the field is laid out
/// when machine-produced.
pub fn fields_from_extraction(object: &Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter_map(|(key, value)| {
            let separator = if CARD_FIELDS.contains(&key.as_str()) {
                ""
            } else {
                ","
            };
            scalar_text(value, separator).map(|text| (key.clone(), text))
        })
        .collect()
}

fn scalar_text(value: &Value, separator: &str) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| scalar_text(item, separator))
                .collect();
            Some(parts.join(separator))
        }
        other => Some(other.to_string()),
    }
}
