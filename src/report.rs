use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SolveError;

pub const HERO: &str = "Hero";
pub const VILLAIN: &str = "Villain";
pub const HERO_EQUITY_BUCKETS: &str = "Hero Equity Buckets";
pub const VILLAIN_EQUITY_BUCKETS: &str = "Villain Equity Buckets";
pub const LEGAL_ACTIONS: &str = "Legal Actions";

pub const SOLVER_KEYS: [&str; 5] = [
    HERO,
    VILLAIN,
    HERO_EQUITY_BUCKETS,
    VILLAIN_EQUITY_BUCKETS,
    LEGAL_ACTIONS,
];

/// Share of the range (in percent) whose equity falls in each band.
pub const EQUITY_BUCKET_LABELS: [&str; 7] = [
    "<25%", "25-50%", "50-60%", "60-70%", "70-80%", "80-90%", "90%+",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Hero,
    Villain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComboStats {
    #[serde(rename = "EV")]
    pub ev: f64,
    #[serde(rename = "Equity")]
    pub equity: f64,
    #[serde(rename = "EQR")]
    pub eqr: f64,
    /// Frequencies aligned with `StrategyReport::legal_actions`.
    #[serde(
        rename = "Actions Probabilities",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub action_frequencies: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    #[serde(rename = "Hero")]
    pub hero: BTreeMap<String, ComboStats>,
    #[serde(rename = "Villain")]
    pub villain: BTreeMap<String, ComboStats>,
    #[serde(rename = "Hero Equity Buckets")]
    pub hero_equity_buckets: [f64; 7],
    #[serde(rename = "Villain Equity Buckets")]
    pub villain_equity_buckets: [f64; 7],
    /// Action labels in solver order, without repeats.
    #[serde(rename = "Legal Actions", skip_serializing_if = "Option::is_none")]
    pub legal_actions: Option<Vec<String>>,
}

impl StrategyReport {
    pub fn from_solver_output(output: &Map<String, Value>) -> Result<Self, SolveError> {
        if let Some(key) = SOLVER_KEYS.into_iter().find(|key| !output.contains_key(*key)) {
            return Err(SolveError::MissingKey { key });
        }

        Ok(Self {
            hero: combos(output, HERO)?,
            villain: combos(output, VILLAIN)?,
            hero_equity_buckets: buckets(output, HERO_EQUITY_BUCKETS)?,
            villain_equity_buckets: buckets(output, VILLAIN_EQUITY_BUCKETS)?,
            legal_actions: legal_actions(&output[LEGAL_ACTIONS])?,
        })
    }

    pub fn side(&self, side: Side) -> &BTreeMap<String, ComboStats> {
        match side {
            Side::Hero => &self.hero,
            Side::Villain => &self.villain,
        }
    }

    /// Unweighted mean equity across the side's combos.
    pub fn range_equity(&self, side: Side) -> Option<f64> {
        let combos = self.side(side);
        if combos.is_empty() {
            return None;
        }
        Some(combos.values().map(|stats| stats.equity).sum::<f64>() / combos.len() as f64)
    }

    pub fn top_combos(&self, side: Side, count: usize) -> Vec<(&str, &ComboStats)> {
        let mut ranked: Vec<(&str, &ComboStats)> = self
            .side(side)
            .iter()
            .map(|(combo, stats)| (combo.as_str(), stats))
            .collect();
        ranked.sort_by(|a, b| b.1.ev.total_cmp(&a.1.ev));
        ranked.truncate(count);
        ranked
    }
}

fn incompatible(key: &str, reason: impl Into<String>) -> SolveError {
    SolveError::IncompatibleShape {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn combos(output: &Map<String, Value>, key: &str) -> Result<BTreeMap<String, ComboStats>, SolveError> {
    let combos: BTreeMap<String, ComboStats> = serde_json::from_value(output[key].clone())
        .map_err(|err| incompatible(key, err.to_string()))?;

    for (combo, stats) in &combos {
        if combo.trim().is_empty() {
            return Err(incompatible(key, "empty combo label"));
        }
        if !(0.0..=1.0).contains(&stats.equity) {
            return Err(incompatible(
                key,
                format!("equity {} for {combo} is not a probability", stats.equity),
            ));
        }
    }
    Ok(combos)
}

fn buckets(output: &Map<String, Value>, key: &str) -> Result<[f64; 7], SolveError> {
    let values: Vec<f64> = serde_json::from_value(output[key].clone())
        .map_err(|err| incompatible(key, err.to_string()))?;
    let found = values.len();
    values.try_into().map_err(|_| {
        incompatible(
            key,
            format!("expected {} buckets, found {found}", EQUITY_BUCKET_LABELS.len()),
        )
    })
}

/// Accepts a list of labels or an index -> label mapping.
fn legal_actions(value: &Value) -> Result<Option<Vec<String>>, SolveError> {
    let labels: Vec<String> = match value {
        Value::Null => return Ok(None),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| incompatible(LEGAL_ACTIONS, "action labels must be strings"))
            })
            .collect::<Result<_, _>>()?,
        Value::Object(indexed) => {
            let mut entries = indexed
                .iter()
                .map(|(index, label)| {
                    let index: usize = index
                        .parse()
                        .map_err(|_| incompatible(LEGAL_ACTIONS, format!("'{index}' is not an index")))?;
                    let label = label
                        .as_str()
                        .ok_or_else(|| incompatible(LEGAL_ACTIONS, "action labels must be strings"))?;
                    Ok((index, label.to_string()))
                })
                .collect::<Result<Vec<_>, SolveError>>()?;
            entries.sort_by_key(|(index, _)| *index);
            entries.into_iter().map(|(_, label)| label).collect()
        }
        _ => {
            return Err(incompatible(
                LEGAL_ACTIONS,
                "expected a list or an index mapping",
            ));
        }
    };

    let mut unique: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        if !unique.contains(&label) {
            unique.push(label);
        }
    }
    Ok(Some(unique))
}
