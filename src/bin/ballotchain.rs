#![forbid(unsafe_code)]
//! Command-line front end for the vote ledger

use ballotchain::config::{load_config, load_config_from};
use ballotchain::crypto::short_digest;
use ballotchain::miner::expected_attempts;
use ballotchain::{LedgerHandle, LoadOutcome, Payload, VoteEvent};
use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a ballotchain.toml (defaults to the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Records a vote, refusing voters already on the ledger
    Cast {
        #[arg(long)]
        voter: String,
        #[arg(long)]
        candidate: String,
        #[arg(long)]
        election: String,
    },
    /// Checks linkage and digests of every entry
    Verify,
    /// Shows vote counts, overall or for one election
    Tally {
        #[arg(long)]
        election: Option<String>,
    },
    /// Lists ledger entries
    Show {
        /// Only show the last N entries
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Removes every vote, keeping the origin entry
    Clear {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Prints storage and chain summary
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let ledger = LedgerHandle::open(&config)?;

    match cli.command {
        Commands::Cast {
            voter,
            candidate,
            election,
        } => cast(&ledger, VoteEvent::new(voter, candidate, election))?,
        Commands::Verify => verify(&ledger),
        Commands::Tally { election } => tally(&ledger, election.as_deref()),
        Commands::Show { limit } => show(&ledger, limit),
        Commands::Clear { yes } => clear(&ledger, yes)?,
        Commands::Status => status(&ledger, &config.storage.path),
    }

    Ok(())
}

fn cast(ledger: &LedgerHandle, event: VoteEvent) -> Result<(), Box<dyn std::error::Error>> {
    if ledger.has_voted(&event.voter_id) {
        eprintln!("{}", "❌ This voter has already voted.".red().bold());
        return Err("duplicate vote refused".into());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!(
        "Sealing vote (difficulty {}, ~{} attempts)...",
        ledger.difficulty(),
        expected_attempts(ledger.difficulty())
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let result = ledger.append(&event);
    spinner.finish_and_clear();
    let entry = result?;
    let elapsed = humantime::format_duration(Duration::from_millis(started.elapsed().as_millis() as u64));

    println!("{}", "✅ Vote recorded".bright_green().bold());
    println!("  Position:  {}", entry.position.to_string().bright_white());
    println!("  Digest:    {}", entry.digest.bright_yellow());
    println!("  Nonce:     {}", entry.nonce);
    println!("  Sealed in: {}", elapsed);
    Ok(())
}

fn verify(ledger: &LedgerHandle) {
    match ledger.with_ledger(|l| l.validate()) {
        Ok(()) => println!(
            "{} ({} entries)",
            "✅ Ledger is valid".bright_green().bold(),
            ledger.len()
        ),
        Err(violation) => println!(
            "{} {}",
            "❌ Ledger integrity broken:".red().bold(),
            violation
        ),
    }
}

fn tally(ledger: &LedgerHandle, election: Option<&str>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match election {
        Some(election_id) => {
            let results = ledger.election_results(election_id);
            println!(
                "{} {} ({} votes)",
                "📊 Results for".bright_cyan(),
                election_id.bright_white(),
                results.total_votes
            );
            table.set_header(vec![
                Cell::new("Candidate").add_attribute(Attribute::Bold),
                Cell::new("Votes").add_attribute(Attribute::Bold),
                Cell::new("Share").add_attribute(Attribute::Bold),
            ]);
            for row in &results.results {
                table.add_row(vec![
                    Cell::new(&row.candidate_id),
                    Cell::new(row.vote_count),
                    Cell::new(format!("{:.2}%", row.percentage)),
                ]);
            }
        }
        None => {
            println!("{}", "📊 Vote counts (all elections)".bright_cyan());
            let mut counts: Vec<_> = ledger.vote_counts().into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            table.set_header(vec![
                Cell::new("Candidate").add_attribute(Attribute::Bold),
                Cell::new("Votes").add_attribute(Attribute::Bold),
            ]);
            for (candidate, count) in counts {
                table.add_row(vec![Cell::new(candidate), Cell::new(count)]);
            }
        }
    }

    println!("{table}");
}

fn show(ledger: &LedgerHandle, limit: Option<usize>) {
    let chain = ledger.chain();
    let skip = limit.map_or(0, |n| chain.len().saturating_sub(n));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Timestamp", "Election", "Candidate", "Digest", "Nonce"]);

    for entry in chain.iter().skip(skip) {
        let when = chrono::DateTime::from_timestamp_millis(entry.timestamp as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        let (election, candidate) = match &entry.payload {
            Payload::Origin => ("origin".to_string(), "-".to_string()),
            Payload::Vote(vote) => (vote.election_id.clone(), vote.candidate_id.clone()),
        };
        table.add_row(vec![
            entry.position.to_string(),
            when,
            election,
            candidate,
            short_digest(&entry.digest, 16),
            entry.nonce.to_string(),
        ]);
    }

    println!("{table}");
}

fn clear(ledger: &LedgerHandle, confirmed: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !confirmed {
        eprintln!(
            "{}",
            "Refusing to clear the ledger without --yes. This discards every vote.".yellow()
        );
        return Err("clear not confirmed".into());
    }

    let discarded = ledger.len() - 1;
    ledger.clear()?;
    println!(
        "{} ({} votes discarded)",
        "🧹 Ledger reset to origin entry".bright_green().bold(),
        discarded
    );
    Ok(())
}

fn status(ledger: &LedgerHandle, storage_path: &str) {
    println!("{}", "BallotChain status".bright_cyan().bold());
    println!("  Storage:    {}", storage_path);
    match ledger.load_outcome() {
        LoadOutcome::Restored { entries } => println!("  Loaded:     {} entries from snapshot", entries),
        LoadOutcome::Fresh { reason } => println!("  Loaded:     {} ({})", "fresh ledger".yellow(), reason),
    }
    println!("  Entries:    {}", ledger.len());
    println!("  Difficulty: {}", ledger.difficulty());
    println!("  Tail:       {}", ledger.tail().digest);
    let validity = if ledger.is_valid() {
        "valid".bright_green()
    } else {
        "INVALID".red().bold()
    };
    println!("  Integrity:  {}", validity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotchain::persistence::{InMemoryPersistence, Persistence};
    use ballotchain::Ledger;

    #[test]
    fn test_show_survives_tampered_digest() {
        let mut ledger = Ledger::new(1);
        ledger.append(&VoteEvent::new("V1", "C1", "E1"));
        ledger.append(&VoteEvent::new("V2", "C2", "E1"));
        let mut entries = ledger.chain().to_vec();
        entries[1].digest = "€€€€€€€€€€".to_string();

        let store = InMemoryPersistence::new();
        store.save_chain(&entries).unwrap();
        let handle = LedgerHandle::open_with(Box::new(store), 1).unwrap();
        assert!(!handle.is_valid());

        show(&handle, None);
        show(&handle, Some(2));
        verify(&handle);
    }
}
