use std::collections::BTreeMap;

use gto_explainer::explain::ExplanationNode;
use gto_explainer::game::AnalysisMode;
use gto_explainer::normalize::GameStateNormalizer;
use gto_explainer::pipeline::PipelineOutput;
use gto_explainer::render::Renderer;
use gto_explainer::report::StrategyReport;
use serde_json::json;

fn output(explained: bool) -> PipelineOutput {
    let fields: BTreeMap<String, String> = [
        ("effective_stack", "100"),
        ("pot_before_flop", "6"),
        ("preflop_action", "BTN,BB"),
        ("flop_cards", "Td9d6h"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect();
    let state = GameStateNormalizer::default()
        .normalize_extracted(&BTreeMap::new(), &fields, AnalysisMode::Game)
        .unwrap();
    let report = StrategyReport::from_solver_output(
        json!({
            "Hero": {
                "AhKd": {"EV": 4.2, "Equity": 0.8, "EQR": 1.05},
                "QsJs": {"EV": 0.5, "Equity": 0.4, "EQR": 0.7}
            },
            "Villain": {},
            "Hero Equity Buckets": [10.0, 20.0, 15.0, 15.0, 10.0, 10.0, 20.0],
            "Villain Equity Buckets": [15.0, 25.0, 20.0, 10.0, 10.0, 10.0, 10.0],
            "Legal Actions": ["CHECK", "BET 4"]
        })
        .as_object()
        .unwrap(),
    )
    .unwrap();

    if explained {
        PipelineOutput::Explained {
            state,
            report,
            explanation: ExplanationNode::from(json!({"Summary": "Check back."})),
        }
    } else {
        PipelineOutput::Report { state, report }
    }
}

#[test]
fn plain_report_lists_ranges_buckets_and_actions() {
    let text = Renderer::new(true).output(&output(false));
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(
        lines[0],
        "Spot flop | Hero -- | Board T♦ 9♦ 6♥ | Pot 6bb | Stack 100bb | Preflop BTN > BB"
    );
    assert!(text.contains("Hero 2 combos, range equity 60.0%"));
    assert!(text.contains("Villain 0 combos, range equity --"));
    assert!(text.contains("  <25%    Hero  10.0  Villain  15.0"));
    assert!(text.ends_with("Actions CHECK, BET 4"));
    assert!(!text.contains('\u{1b}'));
}

#[test]
fn explained_output_shows_the_explanation_instead() {
    let text = Renderer::new(true).output(&output(true));
    assert!(text.ends_with("Summary: Check back."));
    assert!(!text.contains("Buckets"));

    let colored = Renderer::new(false).output(&output(true));
    assert!(colored.contains('\u{1b}'));
}
