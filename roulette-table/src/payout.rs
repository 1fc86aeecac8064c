//! Pure payout computation. Nothing here reads state beyond its arguments,
//! so any observer holding the outcome and the bet set gets the same numbers.

use crate::ledger::Bet;
use crate::odds::BetType;
use roulette_core::Payout;

/// Gross amount owed on `bet` for `outcome`; zero when the bet loses.
pub fn payout(outcome: u8, bet: &Bet) -> u64 {
    if bet.bet_type.covers(outcome) {
        // admission already proved amount * multiplier fits
        bet.amount.saturating_mul(bet.bet_type.multiplier())
    } else {
        0
    }
}

/// Worst-case obligation of a bet, or `None` on overflow.
pub fn worst_case(bet_type: &BetType, amount: u64) -> Option<u64> {
    amount.checked_mul(bet_type.multiplier())
}

pub fn compute_payouts<'a, I>(outcome: u8, bets: I) -> Vec<Payout>
where
    I: IntoIterator<Item = &'a Bet>,
{
    bets.into_iter()
        .map(|bet| Payout {
            bet_id: bet.id,
            participant: bet.participant,
            amount: payout(outcome, bet),
        })
        .collect()
}

pub fn total_paid(payouts: &[Payout]) -> u64 {
    payouts.iter().map(|p| p.amount).sum()
}
