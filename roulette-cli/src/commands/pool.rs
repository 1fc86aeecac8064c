use super::{confirm, Session};
use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use roulette_core::Result;

#[derive(Subcommand)]
pub enum PoolCommands {
    /// Add liquidity to the house reserve
    Deposit {
        /// Amount in units
        amount: u64,
    },
    /// Remove liquidity not backing any open obligation
    Withdraw {
        /// Amount in units
        amount: u64,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Show reserve, escrow and exposure
    Status,
}

pub async fn handle_pool_command(cmd: PoolCommands, session: &Session) -> Result<()> {
    let engine = session.engine();

    match cmd {
        PoolCommands::Deposit { amount } => {
            let reserve = engine.deposit_reserve(amount)?;
            println!("Deposited {} units", amount);
            println!("Reserve: {} units", reserve);
        }

        PoolCommands::Withdraw { amount, force } => {
            let available = engine.pool_status().await.available;
            let prompt = format!(
                "Withdraw {} units from the reserve ({} uncommitted)?",
                amount, available
            );
            if !confirm(&prompt, force)? {
                println!("Withdrawal cancelled.");
                return Ok(());
            }

            let reserve = engine.withdraw_reserve(amount)?;
            println!("Withdrew {} units", amount);
            println!("Reserve: {} units", reserve);
        }

        PoolCommands::Status => {
            let status = engine.pool_status().await;

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Metric", "Value"]);
            table.add_row(vec!["Reserve".to_string(), status.reserve.to_string()]);
            table.add_row(vec!["Escrowed stakes".to_string(), status.locked.to_string()]);
            table.add_row(vec!["Committed exposure".to_string(), status.committed.to_string()]);
            table.add_row(vec!["Available".to_string(), status.available.to_string()]);
            table.add_row(vec!["House edge".to_string(), status.house_edge.to_string()]);
            table.add_row(vec!["Active rounds".to_string(), status.open_rounds.to_string()]);

            println!("Fund Pool");
            println!("{}", table);
        }
    }

    Ok(())
}
