//! Static odds table: bet types, their multipliers and winning predicates.
//!
//! The layout is the standard 12x3 table over 1-36. Pocket 0 is the zero and,
//! on a double-zero wheel, pocket 37 stands for `00`. Zeros lose every bet
//! except an inside bet that covers them.

use roulette_core::{Result, RouletteError, DOUBLE_ZERO_WHEEL};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pocket index used for `00` on a double-zero wheel.
pub const DOUBLE_ZERO: u8 = 37;

const RED_NUMBERS: [u8; 18] = [1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetType {
    Straight { number: u8 },
    Split { first: u8, second: u8 },
    /// Row 1-12 of the layout.
    Street { row: u8 },
    /// Top-left number of a 2x2 block.
    Corner { top_left: u8 },
    /// First of two adjacent rows, 1-11.
    Line { first_row: u8 },
    Dozen { dozen: u8 },
    Column { column: u8 },
    Color { color: Color },
    Parity { parity: Parity },
    Half { half: Half },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BetKind {
    Straight,
    Split,
    Street,
    Corner,
    Line,
    Dozen,
    Column,
    Color,
    Parity,
    Half,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OddsEntry {
    pub kind: BetKind,
    /// Gross multiplier, stake included.
    pub multiplier: u64,
    /// How many of the 36 layout numbers the bet covers.
    pub coverage: u8,
}

pub const ODDS_TABLE: [OddsEntry; 10] = [
    OddsEntry { kind: BetKind::Straight, multiplier: 36, coverage: 1 },
    OddsEntry { kind: BetKind::Split, multiplier: 18, coverage: 2 },
    OddsEntry { kind: BetKind::Street, multiplier: 12, coverage: 3 },
    OddsEntry { kind: BetKind::Corner, multiplier: 9, coverage: 4 },
    OddsEntry { kind: BetKind::Line, multiplier: 6, coverage: 6 },
    OddsEntry { kind: BetKind::Dozen, multiplier: 3, coverage: 12 },
    OddsEntry { kind: BetKind::Column, multiplier: 3, coverage: 12 },
    OddsEntry { kind: BetKind::Color, multiplier: 2, coverage: 18 },
    OddsEntry { kind: BetKind::Parity, multiplier: 2, coverage: 18 },
    OddsEntry { kind: BetKind::Half, multiplier: 2, coverage: 18 },
];

impl BetKind {
    pub fn odds(self) -> &'static OddsEntry {
        &ODDS_TABLE[self as usize]
    }

    pub fn multiplier(self) -> u64 {
        self.odds().multiplier
    }
}

fn is_zero(pocket: u8) -> bool {
    pocket == 0 || pocket == DOUBLE_ZERO
}

fn is_red(number: u8) -> bool {
    RED_NUMBERS.contains(&number)
}

/// 1-based row of a layout number.
fn row_of(number: u8) -> u8 {
    (number - 1) / 3 + 1
}

fn is_layout_number(number: u8) -> bool {
    (1..=36).contains(&number)
}

impl BetType {
    pub fn kind(&self) -> BetKind {
        match self {
            BetType::Straight { .. } => BetKind::Straight,
            BetType::Split { .. } => BetKind::Split,
            BetType::Street { .. } => BetKind::Street,
            BetType::Corner { .. } => BetKind::Corner,
            BetType::Line { .. } => BetKind::Line,
            BetType::Dozen { .. } => BetKind::Dozen,
            BetType::Column { .. } => BetKind::Column,
            BetType::Color { .. } => BetKind::Color,
            BetType::Parity { .. } => BetKind::Parity,
            BetType::Half { .. } => BetKind::Half,
        }
    }

    pub fn multiplier(&self) -> u64 {
        self.kind().multiplier()
    }

    /// Winning predicate over the outcome pocket.
    pub fn covers(&self, outcome: u8) -> bool {
        match *self {
            BetType::Straight { number } => outcome == number,
            BetType::Split { first, second } => outcome == first || outcome == second,
            _ if is_zero(outcome) => false,
            BetType::Street { row } => row_of(outcome) == row,
            BetType::Corner { top_left } => [
                top_left,
                top_left.saturating_add(1),
                top_left.saturating_add(3),
                top_left.saturating_add(4),
            ]
            .contains(&outcome),
            BetType::Line { first_row } => {
                let row = row_of(outcome);
                row == first_row || row == first_row.saturating_add(1)
            }
            BetType::Dozen { dozen } => (outcome - 1) / 12 + 1 == dozen,
            BetType::Column { column } => (outcome - 1) % 3 + 1 == column,
            BetType::Color { color } => is_red(outcome) == (color == Color::Red),
            BetType::Parity { parity } => (outcome % 2 == 0) == (parity == Parity::Even),
            BetType::Half { half } => match half {
                Half::Low => outcome <= 18,
                Half::High => outcome >= 19,
            },
        }
    }

    /// Check the bet is well formed for a wheel with `wheel_size` pockets.
    pub fn validate(&self, wheel_size: u8) -> Result<()> {
        let valid = match *self {
            BetType::Straight { number } => number < wheel_size,
            BetType::Split { first, second } => is_valid_split(first, second, wheel_size),
            BetType::Street { row } => (1..=12).contains(&row),
            BetType::Corner { top_left } => (1..=32).contains(&top_left) && top_left % 3 != 0,
            BetType::Line { first_row } => (1..=11).contains(&first_row),
            BetType::Dozen { dozen } => (1..=3).contains(&dozen),
            BetType::Column { column } => (1..=3).contains(&column),
            BetType::Color { .. } | BetType::Parity { .. } | BetType::Half { .. } => true,
        };

        if valid {
            Ok(())
        } else {
            Err(RouletteError::invalid_bet_type(format!(
                "{} is not a valid bet on a {}-pocket wheel",
                self, wheel_size
            )))
        }
    }
}

fn is_valid_split(first: u8, second: u8, wheel_size: u8) -> bool {
    let (low, high) = (first.min(second), first.max(second));
    if low == high || high >= wheel_size {
        return false;
    }

    if is_layout_number(low) && is_layout_number(high) {
        let horizontal = high == low + 1 && low % 3 != 0;
        let vertical = high == low + 3;
        return horizontal || vertical;
    }

    match (low, high) {
        (0, 1..=3) => true,
        (2, DOUBLE_ZERO) | (3, DOUBLE_ZERO) => wheel_size == DOUBLE_ZERO_WHEEL,
        _ => false,
    }
}

fn pocket_label(pocket: u8) -> String {
    if pocket == DOUBLE_ZERO {
        "00".to_string()
    } else {
        pocket.to_string()
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Straight { number } => write!(f, "straight:{}", pocket_label(*number)),
            BetType::Split { first, second } => {
                write!(f, "split:{}-{}", pocket_label(*first), pocket_label(*second))
            }
            BetType::Street { row } => write!(f, "street:{}", row),
            BetType::Corner { top_left } => write!(f, "corner:{}", top_left),
            BetType::Line { first_row } => write!(f, "line:{}", first_row),
            BetType::Dozen { dozen } => write!(f, "dozen:{}", dozen),
            BetType::Column { column } => write!(f, "column:{}", column),
            BetType::Color { color: Color::Red } => write!(f, "red"),
            BetType::Color { color: Color::Black } => write!(f, "black"),
            BetType::Parity { parity: Parity::Odd } => write!(f, "odd"),
            BetType::Parity { parity: Parity::Even } => write!(f, "even"),
            BetType::Half { half: Half::Low } => write!(f, "low"),
            BetType::Half { half: Half::High } => write!(f, "high"),
        }
    }
}

fn parse_pocket(s: &str) -> Result<u8> {
    if s == "00" {
        return Ok(DOUBLE_ZERO);
    }
    s.parse::<u8>()
        .map_err(|_| RouletteError::invalid_bet_type(format!("'{}' is not a pocket number", s)))
}

/// Parses the textual form produced by `Display`, e.g. `straight:7`,
/// `split:7-8`, `dozen:2`, `red`.
impl FromStr for BetType {
    type Err = RouletteError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s.as_str(), None),
        };

        let need_arg = || {
            arg.ok_or_else(|| {
                RouletteError::invalid_bet_type(format!("'{}' needs an argument", name))
            })
        };

        let bet = match name {
            "straight" => BetType::Straight {
                number: parse_pocket(need_arg()?)?,
            },
            "split" => {
                let (first, second) = need_arg()?.split_once('-').ok_or_else(|| {
                    RouletteError::invalid_bet_type("split takes two numbers, e.g. split:7-8")
                })?;
                BetType::Split {
                    first: parse_pocket(first)?,
                    second: parse_pocket(second)?,
                }
            }
            "street" => BetType::Street {
                row: parse_pocket(need_arg()?)?,
            },
            "corner" => BetType::Corner {
                top_left: parse_pocket(need_arg()?)?,
            },
            "line" => BetType::Line {
                first_row: parse_pocket(need_arg()?)?,
            },
            "dozen" => BetType::Dozen {
                dozen: parse_pocket(need_arg()?)?,
            },
            "column" => BetType::Column {
                column: parse_pocket(need_arg()?)?,
            },
            "red" => BetType::Color { color: Color::Red },
            "black" => BetType::Color { color: Color::Black },
            "odd" => BetType::Parity { parity: Parity::Odd },
            "even" => BetType::Parity { parity: Parity::Even },
            "low" => BetType::Half { half: Half::Low },
            "high" => BetType::Half { half: Half::High },
            other => {
                return Err(RouletteError::invalid_bet_type(format!(
                    "unknown bet type '{}'",
                    other
                )))
            }
        };

        Ok(bet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roulette_core::SINGLE_ZERO_WHEEL;

    fn winners(bet: BetType, wheel_size: u8) -> Vec<u8> {
        (0..wheel_size).filter(|n| bet.covers(*n)).collect()
    }

    #[test]
    fn test_odds_table_is_fair_before_zeros() {
        for (i, entry) in ODDS_TABLE.iter().enumerate() {
            assert_eq!(entry.kind as usize, i);
            assert_eq!(entry.multiplier * entry.coverage as u64, 36);
        }
    }

    #[test]
    fn test_coverage_matches_table() {
        let bets = [
            BetType::Straight { number: 17 },
            BetType::Split { first: 17, second: 20 },
            BetType::Street { row: 4 },
            BetType::Corner { top_left: 17 },
            BetType::Line { first_row: 11 },
            BetType::Dozen { dozen: 2 },
            BetType::Column { column: 3 },
            BetType::Color { color: Color::Black },
            BetType::Parity { parity: Parity::Odd },
            BetType::Half { half: Half::High },
        ];

        for bet in bets {
            bet.validate(SINGLE_ZERO_WHEEL).unwrap();
            assert_eq!(
                winners(bet, SINGLE_ZERO_WHEEL).len(),
                bet.kind().odds().coverage as usize,
                "{}",
                bet
            );
        }
    }

    #[test]
    fn test_zero_loses_outside_bets() {
        let outside = [
            BetType::Color { color: Color::Red },
            BetType::Color { color: Color::Black },
            BetType::Parity { parity: Parity::Even },
            BetType::Half { half: Half::Low },
            BetType::Dozen { dozen: 1 },
            BetType::Column { column: 3 },
        ];
        for bet in outside {
            assert!(!bet.covers(0));
            assert!(!bet.covers(DOUBLE_ZERO));
        }
        assert!(BetType::Straight { number: 0 }.covers(0));
        assert!(BetType::Split { first: 0, second: 2 }.covers(0));
    }

    #[test]
    fn test_known_layout_positions() {
        assert!(BetType::Color { color: Color::Red }.covers(7));
        assert!(BetType::Color { color: Color::Black }.covers(8));
        assert_eq!(winners(BetType::Street { row: 1 }, 37), vec![1, 2, 3]);
        assert_eq!(winners(BetType::Corner { top_left: 1 }, 37), vec![1, 2, 4, 5]);
        assert_eq!(winners(BetType::Line { first_row: 1 }, 37), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(
            winners(BetType::Column { column: 1 }, 37),
            vec![1, 4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34]
        );
        assert_eq!(winners(BetType::Dozen { dozen: 3 }, 37).first(), Some(&25));
    }

    #[test]
    fn test_validation_rejects_malformed_bets() {
        let bad = [
            BetType::Straight { number: 37 },
            BetType::Split { first: 3, second: 4 }, // wraps across rows
            BetType::Split { first: 5, second: 5 },
            BetType::Split { first: 1, second: 5 },
            BetType::Street { row: 0 },
            BetType::Street { row: 13 },
            BetType::Corner { top_left: 3 },
            BetType::Corner { top_left: 34 },
            BetType::Line { first_row: 12 },
            BetType::Dozen { dozen: 0 },
            BetType::Column { column: 4 },
            BetType::Split { first: 2, second: DOUBLE_ZERO },
        ];
        for bet in bad {
            let err = bet.validate(SINGLE_ZERO_WHEEL).unwrap_err();
            assert!(matches!(err, RouletteError::InvalidBetType(_)), "{}", bet);
        }
    }

    #[test]
    fn test_double_zero_wheel() {
        let wheel = DOUBLE_ZERO_WHEEL;
        BetType::Straight { number: DOUBLE_ZERO }.validate(wheel).unwrap();
        BetType::Split { first: DOUBLE_ZERO, second: 3 }.validate(wheel).unwrap();
        assert!(BetType::Split { first: 0, second: DOUBLE_ZERO }.validate(wheel).is_err());
        assert!(BetType::Split { first: 1, second: DOUBLE_ZERO }.validate(wheel).is_err());
        assert_eq!(winners(BetType::Straight { number: DOUBLE_ZERO }, wheel), vec![37]);
    }

    #[test]
    fn test_parse_and_display() {
        let cases = [
            "straight:7",
            "split:7-8",
            "street:3",
            "corner:1",
            "line:2",
            "dozen:1",
            "column:2",
            "red",
            "even",
            "high",
            "straight:00",
        ];
        for case in cases {
            let bet: BetType = case.parse().unwrap();
            assert_eq!(bet.to_string(), case);
        }
        assert!("banana".parse::<BetType>().is_err());
        assert!("split:7".parse::<BetType>().is_err());
        assert!("straight".parse::<BetType>().is_err());
    }
}
