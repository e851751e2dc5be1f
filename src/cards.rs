use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub fn symbol(self) -> &'static str {
        match self {
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Hearts => "♥",
            Suit::Spades => "♠",
        }
    }

    pub fn letter(self) -> char {
        match self {
            Suit::Clubs => 'c',
            Suit::Diamonds => 'd',
            Suit::Hearts => 'h',
            Suit::Spades => 's',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'c' | '♣' => Some(Suit::Clubs),
            'd' | '♦' => Some(Suit::Diamonds),
            'h' | '♥' => Some(Suit::Hearts),
            's' | '♠' => Some(Suit::Spades),
            _ => None,
        }
    }
}

impl Display for Suit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub fn short_label(self) -> char {
        match self {
            Rank::Two => '2',
            Rank::Three => '3',
            Rank::Four => '4',
            Rank::Five => '5',
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => 'T',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
            Rank::Ace => 'A',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            '2' => Some(Rank::Two),
            '3' => Some(Rank::Three),
            '4' => Some(Rank::Four),
            '5' => Some(Rank::Five),
            '6' => Some(Rank::Six),
            '7' => Some(Rank::Seven),
            '8' => Some(Rank::Eight),
            '9' => Some(Rank::Nine),
            'T' => Some(Rank::Ten),
            'J' => Some(Rank::Jack),
            'Q' => Some(Rank::Queen),
            'K' => Some(Rank::King),
            'A' => Some(Rank::Ace),
            _ => None,
        }
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Rank followed by the suit glyph, for terminal output.
    pub fn pretty(&self) -> String {
        format!("{}{}", self.rank.short_label(), self.suit.symbol())
    }
}

impl Display for Card {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

impl FromStr for Card {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_card(s)
    }
}

impl Serialize for Card {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Card {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        parse_card(&token).map_err(serde::de::Error::custom)
    }
}

/// How a multi-card field is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// "Kh,7s,2d", as typed into the form.
    Comma,
    /// "Td9d6h", as produced by extraction and consumed by the solver.
    FixedWidth,
}

pub fn parse_card(token: &str) -> Result<Card, FormatError> {
    let chars: Vec<char> = token.trim().chars().collect();
    let &[rank, suit] = chars.as_slice() else {
        return Err(FormatError::CardLength {
            token: token.to_string(),
        });
    };
    let rank = Rank::from_char(rank).ok_or_else(|| FormatError::InvalidRank {
        token: token.to_string(),
        rank,
    })?;
    let suit = Suit::from_char(suit).ok_or_else(|| FormatError::InvalidSuit {
        token: token.to_string(),
        suit,
    })?;
    Ok(Card::new(rank, suit))
}

pub fn parse_card_sequence(
    token: &str,
    expected_count: usize,
    delimiter: Delimiter,
) -> Result<Vec<Card>, FormatError> {
    let cards = match delimiter {
        Delimiter::Comma => token
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(parse_card)
            .collect::<Result<Vec<_>, _>>()?,
        Delimiter::FixedWidth => {
            let compact: Vec<char> = token.chars().filter(|c| !c.is_whitespace()).collect();
            if compact.len() % 2 != 0 {
                return Err(FormatError::UnevenCards {
                    token: token.to_string(),
                });
            }
            compact
                .chunks(2)
                .map(|pair| parse_card(&pair.iter().collect::<String>()))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if cards.len() != expected_count {
        return Err(FormatError::CardCount {
            token: token.to_string(),
            expected: expected_count,
            found: cards.len(),
        });
    }
    Ok(cards)
}
