use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use quick_notes::auth::{generate_recovery_code, hash_secret};
use quick_notes::db::UserStore;
use quick_notes::models::UserDocument;
use quick_notes::{ApiError, Settings};

#[derive(Parser)]
#[command(name = "quick_notes_admin")]
#[command(about = "Manage Quick Notes user files")]
struct Cli {
    /// Path to the server configuration file
    #[arg(long, env = "QUICKNOTES_CONFIG", default_value = quick_notes::config::DEFAULT_CONFIG_FILE)]
    config: String,

    /// Notes directory (overrides the configuration)
    #[arg(long)]
    notes_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all users
    List,
    /// Clear a user's password and issue a new recovery code
    Reset {
        /// Username
        username: String,
    },
    /// Delete a user and all their notes
    Delete {
        /// Username
        username: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match Settings::load(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let store = UserStore::new(cli.notes_dir.unwrap_or(settings.server.notes_dir.clone()));

    let result = match cli.command {
        Command::List => list_users(&store),
        Command::Reset { username } => reset_password(&store, &username, settings.server.bcrypt_cost),
        Command::Delete { username, yes } => delete_user(&store, &username, yes),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn find_user(store: &UserStore, username: &str) -> Result<Option<UserDocument>, ApiError> {
    let doc = store.load(username)?;
    if doc.is_none() {
        println!("Error: User '{username}' not found.");
    }
    Ok(doc)
}

fn list_users(store: &UserStore) -> Result<bool, ApiError> {
    let docs = store.list()?;
    if docs.is_empty() {
        println!("No users found.");
        return Ok(true);
    }

    println!();
    println!("{:<20}{:<10}{:<27}Has Password", "Username", "Notes", "Created");
    println!("{}", "-".repeat(70));
    for doc in docs {
        println!(
            "{:<20}{:<10}{:<27}{}",
            doc.user.login,
            doc.notes.len(),
            doc.user.created_at,
            if doc.user.has_password() { "Yes" } else { "No" }
        );
    }
    println!();
    Ok(true)
}

fn reset_password(store: &UserStore, username: &str, cost: u32) -> Result<bool, ApiError> {
    let Some(mut doc) = find_user(store, username)? else {
        return Ok(false);
    };

    let code = generate_recovery_code();
    doc.user.password_hash = None;
    doc.user.recovery_code = Some(hash_secret(&code, cost)?);
    store.save(&doc)?;

    println!();
    println!("Password reset for user: {}", doc.user.login);
    println!("New recovery code: {code}");
    println!();
    println!("The user will be prompted to create a new password on next login.");
    println!("Give them this recovery code if they need to recover their account.");
    println!();
    Ok(true)
}

fn delete_user(store: &UserStore, username: &str, yes: bool) -> Result<bool, ApiError> {
    let Some(doc) = find_user(store, username)? else {
        return Ok(false);
    };
    let login = &doc.user.login;

    if !yes {
        print!(
            "Are you sure you want to delete user '{login}' and their {} notes? (yes/no): ",
            doc.notes.len()
        );
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("yes") {
            println!("Cancelled.");
            return Ok(false);
        }
    }

    store.delete(username)?;
    println!("User '{login}' and all their notes have been deleted.");
    Ok(true)
}
