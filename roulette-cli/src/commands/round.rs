use super::{confirm, resolve_participant, short_id, Session};
use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use roulette_core::{Result, RoundId, RouletteError, SINGLE_ZERO_WHEEL};
use roulette_table::{Bet, BetStatus, BetType, CancelReason, Commitment, Round, RoundParams};

#[derive(Subcommand)]
pub enum RoundCommands {
    /// Open a new betting round
    Open {
        /// Maximum summed worst-case payout the round may carry
        max_exposure: u64,
        /// Wheel size: 37 (single zero) or 38 (double zero)
        #[arg(short, long, default_value_t = SINGLE_ZERO_WHEEL)]
        wheel: u8,
        /// Seconds until betting closes
        #[arg(short, long, default_value_t = 300)]
        close_in: i64,
        /// Reveal timeout in seconds (defaults to the engine config)
        #[arg(short, long)]
        reveal_timeout: Option<u64>,
    },
    /// Place a bet, e.g. `straight:17`, `split:0-2`, `dozen:3`, `red`
    Bet {
        /// Round ID
        round: u64,
        /// Participant name or ID
        participant: String,
        /// Bet type
        bet: String,
        /// Amount in units
        amount: u64,
    },
    /// Stop accepting bets
    Close {
        /// Round ID
        round: u64,
    },
    /// Commit to a seed (hash and nonce in hex, see `roulette secret new`)
    Commit {
        /// Round ID
        round: u64,
        /// SHA-256(seed || nonce), hex
        hash: String,
        /// Nonce, hex
        nonce: String,
    },
    /// Reveal the committed seed and settle the round
    Reveal {
        /// Round ID
        round: u64,
        /// Seed, hex
        seed: String,
    },
    /// Cancel a round and refund every bet
    Cancel {
        /// Round ID
        round: u64,
        /// Reason recorded in the audit log
        #[arg(short, long, default_value = "operator request")]
        reason: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Show round details
    Status {
        /// Round ID
        round: u64,
    },
    /// List bets of a round
    Bets {
        /// Round ID
        round: u64,
    },
    /// List all rounds
    List,
    /// Close overdue rounds and cancel missed reveals
    Sweep,
}

pub async fn handle_round_command(cmd: RoundCommands, session: &Session) -> Result<()> {
    let engine = session.engine();

    match cmd {
        RoundCommands::Open {
            max_exposure,
            wheel,
            close_in,
            reveal_timeout,
        } => {
            let deadline = close_deadline(Utc::now(), close_in)?;
            let mut params = RoundParams::new(wheel, deadline, max_exposure);
            if let Some(secs) = reveal_timeout {
                params = params.with_reveal_timeout(std::time::Duration::from_secs(secs));
            }

            let round_id = engine.open_round(params).await?;
            let round = engine.round_status(round_id).await?;

            println!("Round {} is open for bets", round_id);
            println!("  Wheel: {} pockets", round.wheel_size);
            println!("  Max exposure: {} units", round.max_exposure);
            println!(
                "  Closes: {}",
                round.close_deadline.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        RoundCommands::Bet {
            round,
            participant,
            bet,
            amount,
        } => {
            let id = resolve_participant(engine, &participant)?;
            let bet_type: BetType = bet.parse()?;
            let bet_id = engine.place_bet(RoundId(round), id, bet_type, amount).await?;

            println!("Bet {} accepted on round {}", bet_id, round);
            println!(
                "  {} x {} units (pays {} if it wins)",
                bet_type,
                amount,
                amount.saturating_mul(bet_type.multiplier())
            );
        }

        RoundCommands::Close { round } => {
            engine.close_round(RoundId(round)).await?;
            let bets = engine.bets_for_round(RoundId(round)).await?;
            println!("Round {} closed with {} bets", round, bets.len());
        }

        RoundCommands::Commit { round, hash, nonce } => {
            let commitment = Commitment::from_hex(&hash, &nonce)?;
            engine.commit_seed(RoundId(round), commitment).await?;

            let status = engine.round_status(RoundId(round)).await?;
            println!("Commitment stored for round {}", round);
            if let Some(deadline) = status.reveal_deadline {
                println!(
                    "Reveal before: {}",
                    deadline.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }

        RoundCommands::Reveal { round, seed } => {
            let seed = hex::decode(seed.trim())
                .map_err(|e| RouletteError::validation(format!("Invalid seed hex: {}", e)))?;
            let outcome = engine.reveal_seed(RoundId(round), &seed).await?;
            let status = engine.round_status(RoundId(round)).await?;

            println!("------ ROUND {} SETTLED ------", round);
            println!("Outcome: {}", pocket_label(outcome));
            println!("Total staked: {} units", status.total_bet_amount);
            println!("Total paid: {} units", status.total_payout);
            println!();
            print_bets(session, RoundId(round)).await?;
        }

        RoundCommands::Cancel {
            round,
            reason,
            force,
        } => {
            let prompt = format!("Cancel round {} and refund every bet?", round);
            if !confirm(&prompt, force)? {
                println!("Nothing changed.");
                return Ok(());
            }

            let refunds = engine
                .cancel_round(RoundId(round), CancelReason::Operator(reason))
                .await?;
            let total: u64 = refunds.iter().map(|r| r.amount).sum();
            println!("Round {} cancelled", round);
            println!("Refunded {} units across {} bets", total, refunds.len());
        }

        RoundCommands::Status { round } => {
            let status = engine.round_status(RoundId(round)).await?;
            print_round(&status);
        }

        RoundCommands::Bets { round } => {
            print_bets(session, RoundId(round)).await?;
        }

        RoundCommands::List => {
            let rounds = engine.rounds().await;

            if rounds.is_empty() {
                println!("No rounds yet.");
                println!("Open one with: roulette round open <max-exposure>");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec![
                "Round", "State", "Wheel", "Staked", "Paid", "Outcome", "Max Exposure",
            ]);

            for round in rounds {
                table.add_row(vec![
                    round.id.to_string(),
                    round.state.to_string(),
                    round.wheel_size.to_string(),
                    round.total_bet_amount.to_string(),
                    round.total_payout.to_string(),
                    round.outcome.map(pocket_label).unwrap_or_else(|| "-".to_string()),
                    round.max_exposure.to_string(),
                ]);
            }

            println!("Rounds:");
            println!("{}", table);
        }

        RoundCommands::Sweep => {
            let sweep = engine.check_timeouts().await?;
            if sweep.closed.is_empty() && sweep.cancelled.is_empty() {
                println!("No overdue rounds.");
            }
            for id in sweep.closed {
                println!("Closed round {} (betting deadline passed)", id);
            }
            for id in sweep.cancelled {
                println!("Cancelled round {} (reveal deadline passed)", id);
            }
        }
    }

    Ok(())
}

fn close_deadline(now: DateTime<Utc>, close_in: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(close_in)
        .and_then(|window| now.checked_add_signed(window))
        .ok_or_else(|| RouletteError::config(format!("--close-in {}s is out of range", close_in)))
}

fn pocket_label(pocket: u8) -> String {
    if pocket == roulette_table::odds::DOUBLE_ZERO {
        "00".to_string()
    } else {
        pocket.to_string()
    }
}

fn print_round(round: &Round) {
    println!("Round Status: {}", round.id);
    println!("═══════════════════════════════════");
    println!("State: {}", round.state);
    println!("Wheel: {} pockets", round.wheel_size);
    println!("Max Exposure: {} units", round.max_exposure);
    println!("Total Staked: {} units", round.total_bet_amount);
    println!(
        "Close Deadline: {}",
        round.close_deadline.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(commitment) = &round.commitment {
        println!("Commitment: {}", commitment.hash_hex());
    }
    if let Some(deadline) = round.reveal_deadline {
        println!("Reveal Deadline: {}", deadline.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(external) = round.external_entropy {
        println!("External Entropy: {}", hex::encode(external));
    }
    if let Some(seed) = &round.revealed_seed {
        println!("Revealed Seed: {}", hex::encode(seed));
    }
    if let Some(outcome) = round.outcome {
        println!("Outcome: {}", pocket_label(outcome));
        println!("Total Paid: {} units", round.total_payout);
    }
    if let Some(reason) = &round.cancel_reason {
        println!("Cancelled: {}", reason);
    }
    if round.audit_review {
        println!("Flagged for audit review");
    }
}

async fn print_bets(session: &Session, round_id: RoundId) -> Result<()> {
    let engine = session.engine();
    let bets: Vec<Bet> = engine.bets_for_round(round_id).await?.collect();

    if bets.is_empty() {
        println!("No bets on round {}.", round_id);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Bet", "Participant", "Type", "Amount", "Status", "Payout"]);

    for bet in bets {
        let owner = engine
            .participant(bet.participant)
            .map(|p| p.name)
            .unwrap_or_else(|_| short_id(&bet.participant));
        let (status, payout) = match bet.status {
            BetStatus::Pending => ("pending", "-".to_string()),
            BetStatus::Settled { payout } => ("settled", payout.to_string()),
            BetStatus::Refunded => ("refunded", bet.amount.to_string()),
        };

        table.add_row(vec![
            bet.id.to_string(),
            owner,
            bet.bet_type.to_string(),
            bet.amount.to_string(),
            status.to_string(),
            payout,
        ]);
    }

    println!("{}", table);
    Ok(())
}
