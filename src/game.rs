use std::fmt::{Display, Formatter};
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::cards::Card;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Display for Street {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Street::Preflop => "preflop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        })
    }
}

/// What the request is about: a hand from a live table, or a solver screen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Game,
    #[serde(alias = "GTO")]
    Gto,
}

impl Display for AnalysisMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AnalysisMode::Game => "game",
            AnalysisMode::Gto => "gto",
        })
    }
}

/// 6-max seats, declared in postflop acting order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Position {
    SB,
    BB,
    UTG,
    HJ,
    CO,
    BTN,
}

impl Position {
    pub fn label(self) -> &'static str {
        match self {
            Position::SB => "SB",
            Position::BB => "BB",
            Position::UTG => "UTG",
            Position::HJ => "HJ",
            Position::CO => "CO",
            Position::BTN => "BTN",
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SB" => Ok(Position::SB),
            "BB" => Ok(Position::BB),
            "UTG" => Ok(Position::UTG),
            "HJ" | "MP" => Ok(Position::HJ),
            "CO" => Ok(Position::CO),
            "BTN" | "BU" => Ok(Position::BTN),
            _ => Err(format!("Unknown position '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct HeadsUpSeats {
    pub out_of_position: Position,
    pub in_position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandState {
    pub mode: AnalysisMode,
    pub effective_stack: u32,
    pub pot_before_flop: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hole_cards: Option<[Card; 2]>,
    pub preflop_action: Vec<String>,
    pub flop_cards: [Card; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flop_bet: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_card: Option<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_bet: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub river_card: Option<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub river_bet: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_pot: Option<u32>,
}

impl HandState {
    /// Latest street whose card is known.
    pub fn street(&self) -> Street {
        if self.river_card.is_some() {
            Street::River
        } else if self.turn_card.is_some() {
            Street::Turn
        } else {
            Street::Flop
        }
    }

    pub fn board(&self) -> Vec<Card> {
        self.flop_cards
            .iter()
            .chain(self.turn_card.iter())
            .chain(self.river_card.iter())
            .copied()
            .collect()
    }

    pub fn flop_compact(&self) -> String {
        self.flop_cards.iter().join("")
    }

    /// The two players who closed the preflop action, ordered by who acts
    /// first after the flop. `None` when either seat is not a 6-max label.
    pub fn heads_up_seats(&self) -> Option<HeadsUpSeats> {
        let (first, second) = self.preflop_action.iter().rev().take(2).collect_tuple()?;
        let first: Position = first.parse().ok()?;
        let second: Position = second.parse().ok()?;
        if first == second {
            return None;
        }
        Some(HeadsUpSeats {
            out_of_position: first.min(second),
            in_position: first.max(second),
        })
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("{}bb effective", self.effective_stack),
            format!("{}bb pot before the flop", self.pot_before_flop),
            format!("preflop {}", self.preflop_action.join(" ")),
        ];
        if let Some(hole) = &self.hole_cards {
            parts.push(format!("hero holds {}", hole.iter().join("")));
        }
        parts.push(format!("board {}", self.board().iter().join(" ")));
        for (street, bet) in [
            (Street::Flop, self.flop_bet),
            (Street::Turn, self.turn_bet),
            (Street::River, self.river_bet),
        ] {
            if let Some(bet) = bet {
                parts.push(format!("{street} bet {bet}"));
            }
        }
        parts.join(", ")
    }
}
