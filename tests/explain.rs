use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use gto_explainer::error::{CompositionError, ParseError};
use gto_explainer::explain::{
    ExplanationComposer, ExplanationContext, ExplanationModel, ExplanationNode, PromptStyle,
    build_prompt, parse_explanation,
};
use gto_explainer::game::{HeadsUpSeats, Position};
use gto_explainer::report::StrategyReport;
use gto_explainer::response::extract_block;
use serde_json::json;

/// Answers with the report it was shown, wrapped in chatter.
#[derive(Default)]
struct Echo {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ExplanationModel for Echo {
    async fn explain(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let Ok(block) = extract_block(prompt, Some("json")) else {
            bail!("prompt carried no report");
        };
        Ok(format!("Sure, here it is:\n```json\n{block}\n```\nGood luck!"))
    }
}

struct Chatty;

#[async_trait]
impl ExplanationModel for Chatty {
    async fn explain(&self, _prompt: &str) -> Result<String> {
        Ok("The solver likes betting here because of range advantage.".to_string())
    }
}

fn report() -> StrategyReport {
    let output = json!({
        "Hero": {
            "AhKd": {"EV": 4.25, "Equity": 0.81, "EQR": 1.05, "Actions Probabilities": [0.75, 0.25]}
        },
        "Villain": {
            "KcQc": {"EV": 2.0, "Equity": 0.5, "EQR": 0.95, "Actions Probabilities": [1.0, 0.0]}
        },
        "Hero Equity Buckets": [10.0, 20.0, 15.0, 15.0, 10.0, 10.0, 20.0],
        "Villain Equity Buckets": [15.0, 25.0, 20.0, 10.0, 10.0, 10.0, 10.0],
        "Legal Actions": ["CHECK", "BET 4"]
    });
    StrategyReport::from_solver_output(output.as_object().unwrap()).unwrap()
}

fn context() -> ExplanationContext {
    ExplanationContext {
        spot: Some("100bb effective, board Kh 7s 2d".to_string()),
        seats: Some(HeadsUpSeats {
            out_of_position: Position::BB,
            in_position: Position::BTN,
        }),
    }
}

#[tokio::test]
async fn echoed_report_round_trips() {
    let report = report();
    let composer = ExplanationComposer::new(Arc::new(Echo::default()));

    let node = composer
        .compose(&report, &context(), PromptStyle::Plain)
        .await
        .expect("echo is parseable");

    let expected = ExplanationNode::from(serde_json::to_value(&report).unwrap());
    assert_eq!(node, expected);

    let hero = node.get("Hero").and_then(|side| side.get("AhKd")).unwrap();
    assert_eq!(hero.get("EV"), Some(&ExplanationNode::Number(4.25)));
}

#[tokio::test]
async fn prose_without_a_block_fails_to_compose() {
    let composer = ExplanationComposer::new(Arc::new(Chatty));
    let err = composer
        .compose(&report(), &context(), PromptStyle::WithTemplate)
        .await
        .unwrap_err();
    assert!(matches!(err, CompositionError::Parse(ParseError::NoFencedBlock)));
}

#[test]
fn prompt_names_the_seats_and_actions() {
    let prompt = build_prompt(&report(), &context(), PromptStyle::Plain).unwrap();
    assert!(prompt.contains("Hero is BB (out of position), Villain is BTN (in position)."));
    assert!(prompt.contains("Legal actions at this node, in order: CHECK, BET 4."));
    assert!(!prompt.contains("Follow this shape exactly"));

    let templated = build_prompt(&report(), &context(), PromptStyle::WithTemplate).unwrap();
    assert!(templated.starts_with(&prompt));
    assert!(templated.contains("Follow this shape exactly"));
}

#[test]
fn nested_explanations_render_as_indented_lines() {
    let text = r#"Here you go:
```json
{
  "Summary": "Bet small.",
  "Hero Range": {"Strongest Combos": "Sets.", "EV": 4.5},
  "Steps": ["check", "bet"]
}
```"#;
    let node = parse_explanation(text).unwrap();
    insta::assert_snapshot!(node.render_plain(), @r"
    Summary: Bet small.
    Hero Range:
      Strongest Combos: Sets.
      EV: 4.5
    Steps:
      1: check
      2: bet
    ");
}

#[test]
fn explanations_serialize_back_to_nested_objects() {
    let node = ExplanationNode::from(json!({"Plan": {"Flop": "check", "Turn": null}}));
    assert_eq!(
        serde_json::to_value(&node).unwrap(),
        json!({"Plan": {"Flop": "check", "Turn": ""}})
    );
}
