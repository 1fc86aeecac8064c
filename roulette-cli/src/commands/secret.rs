use clap::Subcommand;
use roulette_core::Result;
use roulette_table::{commitment_hash, generate_nonce, generate_secret};

#[derive(Subcommand)]
pub enum SecretCommands {
    /// Generate a seed and nonce and print the commitment hash
    New,
}

pub fn handle_secret_command(cmd: SecretCommands) -> Result<()> {
    match cmd {
        SecretCommands::New => {
            let seed = generate_secret();
            let nonce = generate_nonce();
            let hash = commitment_hash(&seed, &nonce);

            println!("IMPORTANT: Keep the seed private until the reveal!");
            println!();
            println!("Seed:  {}", hex::encode(&seed));
            println!("Nonce: {}", hex::encode(&nonce));
            println!("Hash:  {}", hex::encode(hash));
            println!();
            println!(
                "Commit with: roulette round commit <round> {} {}",
                hex::encode(hash),
                hex::encode(&nonce)
            );
            println!(
                "Reveal with: roulette round reveal <round> {}",
                hex::encode(&seed)
            );
        }
    }

    Ok(())
}
