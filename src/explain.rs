use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CompositionError;
use crate::game::{HandState, HeadsUpSeats};
use crate::report::{EQUITY_BUCKET_LABELS, StrategyReport};
use crate::response::{extract_block, parse_structured};

const SAMPLE_RESPONSE: &str = r#"```json
{
  "Summary": "One or two sentences on what the solver wants here.",
  "Hero Range": {
    "Strongest Combos": "Which combos carry the most EV and why.",
    "Equity Distribution": "How the equity buckets are shaped.",
    "Equity Realization": "Which hands over- or under-realize."
  },
  "Villain Range": {
    "Strongest Combos": "...",
    "Equity Distribution": "..."
  },
  "Recommended Line": {
    "Action": "The preferred legal action.",
    "Reasoning": "Why it beats the alternatives."
  }
}
```"#;

/// Nested label -> text/number tree produced by the explanation model.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplanationNode {
    Text(String),
    Number(f64),
    Branch(Vec<(String, ExplanationNode)>),
}

impl ExplanationNode {
    pub fn from_object(object: Map<String, Value>) -> Self {
        ExplanationNode::Branch(
            object
                .into_iter()
                .map(|(label, value)| (label, ExplanationNode::from(value)))
                .collect(),
        )
    }

    pub fn get(&self, label: &str) -> Option<&ExplanationNode> {
        match self {
            ExplanationNode::Branch(children) => children
                .iter()
                .find(|(child, _)| child == label)
                .map(|(_, node)| node),
            _ => None,
        }
    }

    pub fn flatten(&self) -> Vec<ExplanationLine> {
        let mut lines = Vec::new();
        if let ExplanationNode::Branch(children) = self {
            flatten_into(children, 0, &mut lines);
        }
        lines
    }

    pub fn render_plain(&self) -> String {
        self.flatten()
            .iter()
            .map(|line| {
                let indent = "  ".repeat(line.depth);
                match &line.value {
                    Some(value) => format!("{indent}{}: {value}", line.label),
                    None => format!("{indent}{}:", line.label),
                }
            })
            .join("\n")
    }
}

fn flatten_into(children: &[(String, ExplanationNode)], depth: usize, lines: &mut Vec<ExplanationLine>) {
    for (label, node) in children {
        match node {
            ExplanationNode::Branch(grandchildren) => {
                lines.push(ExplanationLine {
                    depth,
                    label: label.clone(),
                    value: None,
                });
                flatten_into(grandchildren, depth + 1, lines);
            }
            ExplanationNode::Text(text) => lines.push(ExplanationLine {
                depth,
                label: label.clone(),
                value: Some(text.clone()),
            }),
            ExplanationNode::Number(number) => lines.push(ExplanationLine {
                depth,
                label: label.clone(),
                value: Some(number.to_string()),
            }),
        }
    }
}

impl From<Value> for ExplanationNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(object) => ExplanationNode::from_object(object),
            Value::Array(items) => ExplanationNode::Branch(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| ((index + 1).to_string(), ExplanationNode::from(item)))
                    .collect(),
            ),
            Value::String(text) => ExplanationNode::Text(text),
            Value::Number(number) => number
                .as_f64()
                .map(ExplanationNode::Number)
                .unwrap_or_else(|| ExplanationNode::Text(number.to_string())),
            Value::Bool(flag) => ExplanationNode::Text(flag.to_string()),
            Value::Null => ExplanationNode::Text(String::new()),
        }
    }
}

impl Serialize for ExplanationNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExplanationNode::Text(text) => serializer.serialize_str(text),
            ExplanationNode::Number(number) => serializer.serialize_f64(*number),
            ExplanationNode::Branch(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (label, node) in children {
                    map.serialize_entry(label, node)?;
                }
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplanationLine {
    pub depth: usize,
    pub label: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExplanationContext {
    pub spot: Option<String>,
    pub seats: Option<HeadsUpSeats>,
}

impl From<&HandState> for ExplanationContext {
    fn from(state: &HandState) -> Self {
        Self {
            spot: Some(state.describe()),
            seats: state.heads_up_seats(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    Plain,
    /// Adds a sample response so the model copies the expected shape.
    WithTemplate,
}

#[async_trait]
pub trait ExplanationModel: Send + Sync {
    async fn explain(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct ExplanationComposer {
    model: Arc<dyn ExplanationModel>,
}

impl ExplanationComposer {
    pub fn new(model: Arc<dyn ExplanationModel>) -> Self {
        Self { model }
    }

    pub async fn compose(
        &self,
        report: &StrategyReport,
        context: &ExplanationContext,
        style: PromptStyle,
    ) -> Result<ExplanationNode, CompositionError> {
        let prompt = build_prompt(report, context, style)?;
        debug!(?style, prompt_len = prompt.len(), "requesting explanation");
        let text = self
            .model
            .explain(&prompt)
            .await
            .map_err(|cause| CompositionError::Model { cause })?;
        parse_explanation(&text)
    }
}

/// The parsing half of [`ExplanationComposer::compose`].
pub fn parse_explanation(text: &str) -> Result<ExplanationNode, CompositionError> {
    let block = extract_block(text, Some("json"))?;
    let object = parse_structured(&block)?;
    Ok(ExplanationNode::from_object(object))
}

pub fn build_prompt(
    report: &StrategyReport,
    context: &ExplanationContext,
    style: PromptStyle,
) -> Result<String, CompositionError> {
    let serialized = serde_json::to_string_pretty(report)?;
    let mut prompt = String::from(
        "You are a poker coach explaining a game-theory-optimal solver result to a student.\n",
    );
    if let Some(spot) = &context.spot {
        prompt.push_str(&format!("Spot: {spot}.\n"));
    }
    if let Some(seats) = &context.seats {
        prompt.push_str(&format!(
            "Hero is {} (out of position), Villain is {} (in position).\n",
            seats.out_of_position, seats.in_position
        ));
    }
    if let Some(actions) = &report.legal_actions {
        prompt.push_str(&format!(
            "Legal actions at this node, in order: {}.\n",
            actions.join(", ")
        ));
    }
    prompt.push_str(&format!(
        "Each combo maps to EV, Equity (0-1) and EQR (equity realization). \
         Equity buckets give the percentage of each range in the bands {}.\n\n",
        EQUITY_BUCKET_LABELS.join(", ")
    ));
    prompt.push_str(&format!("```json\n{serialized}\n```\n\n"));
    prompt.push_str(
        "Explain what the solver is doing and why. Respond with exactly one ```json fenced block \
         holding a nested object: keys are section titles, values are text or further nested objects.",
    );
    if style == PromptStyle::WithTemplate {
        prompt.push_str("\n\nFollow this shape exactly:\n");
        prompt.push_str(SAMPLE_RESPONSE);
    }
    Ok(prompt)
}
