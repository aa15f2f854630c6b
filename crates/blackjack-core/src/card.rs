use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// A single playing card. `value` is one of `A, 2..10, J, Q, K`; `suit` is one of `H, D, C, S`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub value: String,
    pub suit: String,
}

const VALUES: [&str; 13] = [
    "A", "2", "3", "4", "5", "6", "7", "8", "9", "10", "J", "Q", "K",
];
const SUITS: [&str; 4] = ["H", "D", "C", "S"];
const DECK_COPIES: usize = 4;

impl Card {
    /// Blackjack point value before any soft-Ace adjustment (Ace counts as 11 here).
    fn raw_points(&self) -> i64 {
        match self.value.as_str() {
            "A" => 11,
            "K" | "Q" | "J" => 10,
            n => n.parse().unwrap_or(0),
        }
    }

    fn is_ace(&self) -> bool {
        self.value == "A"
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.suit)
    }
}

/// Parses a card from its concatenated wire form, e.g. `"AS"` or `"10H"`.
pub fn parse_card(s: &str) -> Option<Card> {
    if s.len() < 2 {
        return None;
    }
    let suit = &s[s.len() - 1..];
    let value = &s[..s.len() - 1];
    if !SUITS.contains(&suit) {
        return None;
    }
    Some(Card {
        value: value.to_string(),
        suit: suit.to_string(),
    })
}

/// Serializes a hand as comma-joined card strings, or `"nil"` for an empty hand.
pub fn serialize_hand(hand: &[Card]) -> String {
    if hand.is_empty() {
        return "nil".to_string();
    }
    hand.iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses a comma-joined hand string, treating `"nil"`/`""` as empty.
pub fn parse_hand(s: &str) -> Vec<Card> {
    if s == "nil" || s.is_empty() {
        return Vec::new();
    }
    s.split(',').filter_map(parse_card).collect()
}

/// Serializes the remaining deck the same way a hand is serialized.
pub fn serialize_deck(deck: &[Card]) -> String {
    if deck.is_empty() {
        return String::new();
    }
    deck.iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_deck(s: &str) -> Vec<Card> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').filter_map(parse_card).collect()
}

/// Builds four standard 52-card decks and shuffles them with a uniform random permutation.
pub fn new_shuffled_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(52 * DECK_COPIES);
    for _ in 0..DECK_COPIES {
        for suit in SUITS {
            for value in VALUES {
                deck.push(Card {
                    value: value.to_string(),
                    suit: suit.to_string(),
                });
            }
        }
    }
    deck.shuffle(&mut rand::rng());
    deck
}

/// Computes the Blackjack score of a hand, softening Aces from 11 to 1 while the total exceeds 21.
pub fn score_hand(hand: &[Card]) -> i64 {
    let mut score: i64 = 0;
    let mut aces = 0;
    for card in hand {
        score += card.raw_points();
        if card.is_ace() {
            aces += 1;
        }
    }
    while score > 21 && aces > 0 {
        score -= 10;
        aces -= 1;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hand_scores_zero() {
        assert_eq!(score_hand(&[]), 0);
    }

    #[test]
    fn soft_ace_demotes_under_bust() {
        let hand = vec![
            Card { value: "A".into(), suit: "H".into() },
            Card { value: "K".into(), suit: "S".into() },
            Card { value: "5".into(), suit: "D".into() },
        ];
        assert_eq!(score_hand(&hand), 16);
    }

    #[test]
    fn two_aces_only_demote_as_needed() {
        let hand = vec![
            Card { value: "A".into(), suit: "H".into() },
            Card { value: "A".into(), suit: "S".into() },
        ];
        assert_eq!(score_hand(&hand), 12);
    }

    #[test]
    fn score_is_permutation_invariant() {
        let a = vec![
            Card { value: "K".into(), suit: "H".into() },
            Card { value: "A".into(), suit: "S".into() },
            Card { value: "9".into(), suit: "D".into() },
        ];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(score_hand(&a), score_hand(&b));
    }

    #[test]
    fn round_trips_through_wire_encoding() {
        let hand = new_shuffled_deck()[..2].to_vec();
        let encoded = serialize_hand(&hand);
        assert_eq!(parse_hand(&encoded), hand);
    }

    #[test]
    fn fresh_deck_has_four_copies_of_each_card() {
        let deck = new_shuffled_deck();
        assert_eq!(deck.len(), 52 * DECK_COPIES);
        let count = deck
            .iter()
            .filter(|c| c.value == "A" && c.suit == "S")
            .count();
        assert_eq!(count, DECK_COPIES);
    }
}
