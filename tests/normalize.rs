use std::collections::{BTreeMap, BTreeSet};

use gto_explainer::cards::{Card, Rank, Suit};
use gto_explainer::error::{FormatError, InvalidValue, StreetViolation};
use gto_explainer::game::{AnalysisMode, Position, Street};
use gto_explainer::normalize::{
    GAME_FIELDS, GameStateNormalizer, Normalized, fields_from_extraction, parse_amount,
};
use serde_json::json;

fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn full_hand() -> BTreeMap<String, String> {
    fields(&[
        ("effective_stack", "100"),
        ("hole_cards", "As,Td"),
        ("pot_before_flop", "50"),
        ("preflop_action", "UTG,CO,UTG"),
        ("flop_cards", "Kh,7s,2d"),
        ("flop_bet", "25"),
        ("turn_card", "5c"),
        ("turn_bet", "50"),
        ("river_card", "Qd"),
        ("river_bet", "75"),
    ])
}

#[test]
fn manual_hand_normalizes() {
    let normalizer = GameStateNormalizer::default();
    let Normalized::Ready(state) = normalizer
        .normalize(&full_hand(), AnalysisMode::Game)
        .expect("valid hand")
    else {
        panic!("game mode never defers");
    };

    assert_eq!(
        state.flop_cards,
        [
            Card::new(Rank::King, Suit::Hearts),
            Card::new(Rank::Seven, Suit::Spades),
            Card::new(Rank::Two, Suit::Diamonds),
        ]
    );
    assert_eq!(state.effective_stack, 100);
    assert_eq!(state.river_bet, Some(75));
    assert_eq!(state.street(), Street::River);
    assert_eq!(state.flop_compact(), "Kh7s2d");

    let seats = state.heads_up_seats().expect("6-max seats");
    assert_eq!(seats.out_of_position, Position::UTG);
    assert_eq!(seats.in_position, Position::CO);
}

#[test]
fn missing_flop_bet_is_reported_exactly() {
    let mut hand = full_hand();
    hand.remove("flop_bet");

    let err = GameStateNormalizer::default()
        .normalize(&hand, AnalysisMode::Game)
        .unwrap_err();
    assert_eq!(err.missing_fields, BTreeSet::from(["flop_bet"]));
    assert!(err.street_violations.is_empty());
}

#[test]
fn every_absent_field_is_listed() {
    let normalizer = GameStateNormalizer::default();
    for name in GAME_FIELDS {
        let mut hand = full_hand();
        hand.insert(name.to_string(), "   ".to_string());
        let err = normalizer.normalize(&hand, AnalysisMode::Game).unwrap_err();
        assert_eq!(err.missing_fields, BTreeSet::from([name]), "blanked {name}");
    }

    let err = normalizer
        .normalize(&BTreeMap::new(), AnalysisMode::Game)
        .unwrap_err();
    assert_eq!(
        err.missing_fields,
        GAME_FIELDS.into_iter().collect::<BTreeSet<_>>()
    );
}

#[test]
fn amounts_must_be_plain_digits() {
    for bad in ["25.5", "-3", "1e3", "twenty", "12bb"] {
        let mut hand = full_hand();
        hand.insert("flop_bet".to_string(), bad.to_string());
        let err = GameStateNormalizer::default()
            .normalize(&hand, AnalysisMode::Game)
            .unwrap_err();
        assert!(
            matches!(
                err.invalid_values.as_slice(),
                [InvalidValue {
                    field: "flop_bet",
                    error: FormatError::NotDigits { .. }
                }]
            ),
            "{bad} gave {err:?}"
        );
    }

    assert_eq!(parse_amount(" 40 "), Ok(40));
    assert!(matches!(
        parse_amount("99999999999"),
        Err(FormatError::OutOfRange { .. })
    ));
}

#[test]
fn bad_card_names_the_field() {
    let mut hand = full_hand();
    hand.insert("turn_card".to_string(), "5x".to_string());
    let err = GameStateNormalizer::default()
        .normalize(&hand, AnalysisMode::Game)
        .unwrap_err();
    assert_eq!(err.offending_fields(), BTreeSet::from(["turn_card"]));
    assert!(err.to_string().contains("turn_card: invalid suit"), "{err}");
}

#[test]
fn all_malformed_fields_are_reported_together() {
    let mut hand = full_hand();
    hand.insert("flop_bet".to_string(), "abc".to_string());
    hand.insert("turn_bet".to_string(), "x".to_string());
    hand.insert("river_card".to_string(), "Zz".to_string());
    hand.remove("hole_cards");

    let err = GameStateNormalizer::default()
        .normalize(&hand, AnalysisMode::Game)
        .unwrap_err();

    let invalid: Vec<&str> = err.invalid_values.iter().map(|v| v.field).collect();
    assert_eq!(invalid, ["flop_bet", "turn_bet", "river_card"]);
    assert_eq!(err.missing_fields, BTreeSet::from(["hole_cards"]));
    assert_eq!(
        err.offending_fields(),
        BTreeSet::from(["flop_bet", "hole_cards", "river_card", "turn_bet"])
    );
}

#[test]
fn unreadable_flop_still_lists_the_other_problems() {
    let mut hand = full_hand();
    hand.insert("flop_cards".to_string(), "Kh,7s".to_string());
    hand.insert("effective_stack".to_string(), "lots".to_string());
    hand.remove("river_card");

    let err = GameStateNormalizer::default()
        .normalize(&hand, AnalysisMode::Game)
        .unwrap_err();

    let invalid: Vec<&str> = err.invalid_values.iter().map(|v| v.field).collect();
    assert_eq!(invalid, ["effective_stack", "flop_cards"]);
    assert_eq!(err.missing_fields, BTreeSet::from(["river_card"]));
    assert_eq!(
        err.street_violations,
        vec![StreetViolation {
            field: "river_bet",
            requires: "river_card",
        }]
    );
}

#[test]
fn repeated_cards_are_rejected() {
    let mut hand = full_hand();
    hand.insert("river_card".to_string(), "Kh".to_string());
    let err = GameStateNormalizer::default()
        .normalize(&hand, AnalysisMode::Game)
        .unwrap_err();
    assert_eq!(err.duplicate_cards, vec![Card::new(Rank::King, Suit::Hearts)]);
    assert!(err.missing_fields.is_empty());
}

#[test]
fn unknown_keys_are_ignored() {
    let mut hand = full_hand();
    hand.insert("flop_action".to_string(), "c,15,45,c".to_string());
    hand.insert("notes".to_string(), "villain is a reg".to_string());
    assert!(
        GameStateNormalizer::default()
            .normalize(&hand, AnalysisMode::Game)
            .is_ok()
    );
}

#[test]
fn defaults_fill_gaps_but_never_override() {
    let defaults = fields(&[("effective_stack", "200"), ("flop_bet", "10")]);
    let normalizer = GameStateNormalizer::new(defaults);

    let mut hand = full_hand();
    hand.remove("effective_stack");
    let Normalized::Ready(state) = normalizer.normalize(&hand, AnalysisMode::Game).unwrap() else {
        panic!("game mode never defers");
    };
    assert_eq!(state.effective_stack, 200);
    assert_eq!(state.flop_bet, Some(25));
}

#[test]
fn gto_mode_defers_to_the_image() {
    let normalizer = GameStateNormalizer::default();

    let deferred = normalizer
        .normalize(&fields(&[("image", "spot.png")]), AnalysisMode::Gto)
        .unwrap();
    assert_eq!(
        deferred,
        Normalized::Deferred {
            image_ref: "spot.png".to_string()
        }
    );

    let err = normalizer
        .normalize(&full_hand(), AnalysisMode::Gto)
        .unwrap_err();
    assert_eq!(err.missing_fields, BTreeSet::from(["image"]));
}

#[test]
fn extracted_fields_only_need_the_flop() {
    let extracted = fields(&[
        ("effective_stack", "100"),
        ("pot_before_flop", "6"),
        ("preflop_action", "BTN,BB"),
        ("flop_cards", "Td9d6h"),
    ]);
    let state = GameStateNormalizer::default()
        .normalize_extracted(&BTreeMap::new(), &extracted, AnalysisMode::Gto)
        .unwrap();
    assert_eq!(state.street(), Street::Flop);
    assert_eq!(state.hole_cards, None);
    assert_eq!(state.flop_compact(), "Td9d6h");
}

#[test]
fn manual_fields_win_over_extraction() {
    let extracted = fields(&[
        ("effective_stack", "100"),
        ("pot_before_flop", "6"),
        ("preflop_action", "BTN,BB"),
        ("flop_cards", "Td9d6h"),
    ]);
    let manual = fields(&[("effective_stack", "40")]);
    let state = GameStateNormalizer::default()
        .normalize_extracted(&manual, &extracted, AnalysisMode::Game)
        .unwrap();
    assert_eq!(state.effective_stack, 40);
}

#[test]
fn later_streets_need_their_opening_card() {
    let extracted = fields(&[
        ("effective_stack", "100"),
        ("pot_before_flop", "6"),
        ("preflop_action", "BTN,BB"),
        ("flop_cards", "Td9d6h"),
        ("turn_bet", "9"),
        ("river_bet", "20"),
    ]);
    let err = GameStateNormalizer::default()
        .normalize_extracted(&BTreeMap::new(), &extracted, AnalysisMode::Gto)
        .unwrap_err();
    assert_eq!(
        err.street_violations,
        vec![
            StreetViolation {
                field: "turn_bet",
                requires: "turn_card",
            },
            StreetViolation {
                field: "river_bet",
                requires: "river_card",
            },
        ]
    );
    assert_eq!(
        err.offending_fields(),
        BTreeSet::from(["river_bet", "turn_bet"])
    );
}

#[test]
fn absent_bets_mean_the_street_checked_through() {
    let extracted = fields(&[
        ("effective_stack", "100"),
        ("pot_before_flop", "6"),
        ("preflop_action", "BTN,BB"),
        ("flop_cards", "Td9d6h"),
        ("turn_card", "2c"),
        ("river_card", "Ks"),
    ]);
    let state = GameStateNormalizer::default()
        .normalize_extracted(&BTreeMap::new(), &extracted, AnalysisMode::Gto)
        .unwrap();
    assert_eq!(state.street(), Street::River);
    assert_eq!(state.flop_bet, None);
    assert_eq!(state.turn_bet, None);
}

#[test]
fn extraction_objects_flatten_to_text() {
    let object = json!({
        "effective_stack": 100,
        "flop_cards": ["Td", "9d", "6h"],
        "preflop_action": ["BTN", "BB"],
        "turn_card": null,
        "flop_bet": "3"
    });
    let flat = fields_from_extraction(object.as_object().unwrap());
    assert_eq!(
        flat,
        fields(&[
            ("effective_stack", "100"),
            ("flop_bet", "3"),
            ("flop_cards", "Td9d6h"),
            ("preflop_action", "BTN,BB"),
        ])
    );
}
