mod backup;
mod demo;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use shroud_config::ShroudConfig;
use shroud_core::{NoteStatus, NoteStore};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let (config_path, rest) = split_global_flags(&args[1..]);

    let Some(cmd) = rest.first() else {
        print_usage();
        return;
    };

    let result = match cmd.as_str() {
        "balance" => with_store(config_path.as_deref(), |store| async move {
            balance(&store).await
        })
        .await,
        "notes" => with_store(config_path.as_deref(), |store| async move {
            list_notes(&store).await
        })
        .await,
        "export" => match rest.get(1) {
            Some(file) => {
                let file = PathBuf::from(file);
                with_store(config_path.as_deref(), |store| async move {
                    backup::export(&store, &file).await
                })
                .await
            }
            None => {
                println!("Usage: export <file>");
                return;
            }
        },
        "import" => match rest.get(1) {
            Some(file) => {
                let file = PathBuf::from(file);
                with_store(config_path.as_deref(), |store| async move {
                    backup::import(&store, &file).await
                })
                .await
            }
            None => {
                println!("Usage: import <file>");
                return;
            }
        },
        "demo" => {
            let amount = match rest.get(1).map(|s| s.parse::<u128>()) {
                None => 100,
                Some(Ok(amount)) => amount,
                Some(Err(_)) => {
                    eprintln!("❌ Error: Amount must be a valid number");
                    std::process::exit(1);
                }
            };
            demo::run(amount).await
        }
        "config-sample" => {
            print!("{}", ShroudConfig::generate_sample());
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => {
            println!("❌ Unknown command: {}", cmd);
            println!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Shroud CLI - shielded note wallet tools");
    println!();
    println!("USAGE:");
    println!("  shroud [--config <file>] <command> [args]");
    println!();
    println!("NOTE STORE COMMANDS:");
    println!("  balance                    Spendable and pending balance");
    println!("  notes                      List stored notes");
    println!("  export <file>              Write a backup of every note (contains secrets)");
    println!("  import <file>              Merge notes from a backup file");
    println!();
    println!("OTHER COMMANDS:");
    println!("  demo [amount]              Deposit, sync and withdraw against an in-process ledger");
    println!("  config-sample              Print a sample config.toml");
    println!("  help                       Show this help message");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  SHROUD_CONFIG        Config file path");
    println!("  SHROUD_DB_PATH       Note store path");
    println!("  RUST_LOG             Log level (debug/info/warn/error)");
}

/// Pull `--config <file>` out of the argument list
fn split_global_flags(args: &[String]) -> (Option<PathBuf>, Vec<String>) {
    let mut config = None;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.get(i + 1) {
                    config = Some(PathBuf::from(path));
                    i += 1;
                }
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    (config, rest)
}

fn load_config(path: Option<&Path>) -> Result<ShroudConfig> {
    match path {
        Some(path) => ShroudConfig::load_from(path),
        None => ShroudConfig::load(),
    }
}

async fn with_store<F, Fut>(config_path: Option<&Path>, f: F) -> Result<()>
where
    F: FnOnce(NoteStore) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let config = load_config(config_path)?;
    let store = NoteStore::open(&config.database.path)
        .with_context(|| format!("failed to open note store at {}", config.database.path))?;
    f(store).await
}

async fn balance(store: &NoteStore) -> Result<()> {
    println!("Spendable: {}", store.balance().await?);
    println!("Pending:   {}", store.pending_balance().await?);
    Ok(())
}

async fn list_notes(store: &NoteStore) -> Result<()> {
    let notes = store.notes().await;
    if notes.is_empty() {
        println!("No notes stored.");
        return Ok(());
    }

    println!("{:<66} {:>20} {:<9} {:>8}", "COMMITMENT", "AMOUNT", "STATUS", "INDEX");
    for stored in notes {
        let status = match stored.status {
            NoteStatus::Pending => "pending",
            NoteStatus::Anchored => "anchored",
            NoteStatus::Spent => "spent",
            NoteStatus::Orphaned => "orphaned",
        };
        let index = stored
            .merkle_index()
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        println!(
            "{:<66} {:>20} {:<9} {:>8}",
            stored.commitment(),
            stored.amount(),
            status,
            index
        );
    }
    Ok(())
}
