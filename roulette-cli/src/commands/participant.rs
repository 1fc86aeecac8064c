use super::{confirm, resolve_participant, Session};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use roulette_core::Result;

#[derive(Subcommand)]
pub enum ParticipantCommands {
    /// Register a participant
    Add {
        /// Display name
        name: String,
        /// Opening balance
        #[arg(short, long, default_value_t = 0)]
        balance: u64,
    },
    /// Credit a participant's balance
    Deposit {
        /// Participant name or ID
        participant: String,
        /// Amount in units
        amount: u64,
    },
    /// Debit a participant's balance
    Withdraw {
        /// Participant name or ID
        participant: String,
        /// Amount in units
        amount: u64,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// List participants
    List,
}

pub async fn handle_participant_command(cmd: ParticipantCommands, session: &Session) -> Result<()> {
    let engine = session.engine();

    match cmd {
        ParticipantCommands::Add { name, balance } => {
            let id = engine.register_participant(&name, balance)?;
            println!("Participant registered!");
            println!("  Name: {}", name);
            println!("  ID: {}", id);
            println!("  Balance: {} units", balance);
        }

        ParticipantCommands::Deposit {
            participant,
            amount,
        } => {
            let id = resolve_participant(engine, &participant)?;
            let balance = engine.credit_participant(id, amount)?;
            println!("Credited {} units to {}", amount, participant);
            println!("New balance: {} units", balance);
        }

        ParticipantCommands::Withdraw {
            participant,
            amount,
            force,
        } => {
            let id = resolve_participant(engine, &participant)?;
            let prompt = format!("Withdraw {} units from {}?", amount, participant);
            if !confirm(&prompt, force)? {
                println!("Withdrawal cancelled.");
                return Ok(());
            }

            let balance = engine.debit_participant(id, amount)?;
            println!("Debited {} units from {}", amount, participant);
            println!("Remaining balance: {} units", balance);
        }

        ParticipantCommands::List => {
            let participants = engine.participants();

            if participants.is_empty() {
                println!("No participants registered.");
                println!("Add one with: roulette participant add <name> --balance <units>");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec![
                "Name", "ID", "Balance", "Bets", "Wagered", "Won", "Joined",
            ]);

            for p in participants {
                table.add_row(vec![
                    p.name.clone(),
                    p.id.to_string(),
                    p.balance.to_string(),
                    p.bets_placed.to_string(),
                    p.amount_wagered.to_string(),
                    p.amount_won.to_string(),
                    p.created_at.format("%Y-%m-%d %H:%M").to_string(),
                ]);
            }

            println!("{}", table);
        }
    }

    Ok(())
}
