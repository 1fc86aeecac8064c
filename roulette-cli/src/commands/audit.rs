use super::Session;
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use roulette_core::{Result, RoundId};
use roulette_table::audit::load_entries;
use roulette_table::{verify_round, VerifiedStatus};

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Replay a round from the stored log and check every recorded value
    Verify {
        /// Round ID
        round: u64,
    },
    /// Print stored audit entries
    Log {
        /// Only entries for this round
        #[arg(short, long)]
        round: Option<u64>,
    },
}

pub async fn handle_audit_command(cmd: AuditCommands, session: &Session) -> Result<()> {
    // entries recorded by this invocation (e.g. the restore sweep) go first
    session.engine().audit_log().persist(session.storage()).await?;

    match cmd {
        AuditCommands::Verify { round } => {
            let round_id = RoundId(round);
            let entries = load_entries(session.storage(), Some(round_id)).await?;
            let verified = verify_round(&entries, round_id)?;

            println!("Audit verification passed for round {}", round);
            println!("  Entries checked: {}", entries.len());
            println!("  Wheel: {} pockets", verified.wheel_size);
            println!("  Bets: {} ({} units staked)", verified.bet_count, verified.total_staked);
            match verified.status {
                VerifiedStatus::InProgress => println!("  Status: in progress"),
                VerifiedStatus::Settled => {
                    if let (Some(outcome), Some(paid)) = (verified.outcome, verified.total_payout) {
                        println!("  Status: settled on {}, {} units paid", outcome, paid);
                    }
                }
                VerifiedStatus::Cancelled(reason) => println!("  Status: cancelled ({})", reason),
            }
        }

        AuditCommands::Log { round } => {
            let entries = load_entries(session.storage(), round.map(RoundId)).await?;

            if entries.is_empty() {
                println!("No audit entries.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Seq", "Round", "Event", "Recorded"]);

            for entry in entries {
                table.add_row(vec![
                    entry.seq.to_string(),
                    entry
                        .round_id
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    entry.event.kind().to_string(),
                    entry.recorded_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                ]);
            }

            println!("{}", table);
        }
    }

    Ok(())
}
