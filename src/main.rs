use std::io::IsTerminal;

use clap::{Args, Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Password, Select};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use agentbar::clock::now_ms;
use agentbar::error::{Error, Result};
use agentbar::http::reqwest_fetch;
use agentbar::paths::AppPaths;
use agentbar::providers::Endpoints;
use agentbar::render::{account_lines, to_json, usage_lines};
use agentbar::resolver::{ProfilePicker, Selector};
use agentbar::services::{self, AppContext};
use agentbar::settings::{SettingKey, SettingValues};
use agentbar::store::{AuthProfile, Provider};

#[derive(Debug, Parser)]
#[command(name = "agentbar", version, about = "Switch between Codex and Copilot accounts and check their usage")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List stored accounts
    Accounts {
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long)]
        json: bool,
    },
    /// Show usage for every stored account
    Usage {
        #[arg(long)]
        provider: Option<Provider>,
        /// Ignore cached results
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        json: bool,
    },
    /// Import the credentials a provider's CLI is currently using
    Save {
        #[command(subcommand)]
        target: SaveTarget,
    },
    /// Store a new account from a provider token
    Login {
        #[command(subcommand)]
        target: LoginTarget,
    },
    /// Point a provider's CLI at a stored account
    Switch {
        #[command(subcommand)]
        target: SwitchTarget,
    },
    /// Remove a stored account
    Delete {
        provider: Provider,
        #[command(flatten)]
        selector: SelectorArgs,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
    /// Attach or remove a free-form note on an account
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },
    /// Read and change usage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
struct SelectorArgs {
    /// Account email; prompts for a choice when omitted in a terminal
    email: Option<String>,
    /// Narrow matches to one plan type
    #[arg(long)]
    plan: Option<String>,
}

impl SelectorArgs {
    fn selector(&self) -> Selector {
        Selector::new(self.email.clone(), self.plan.clone())
    }
}

#[derive(Debug, Subcommand)]
enum SaveTarget {
    Codex {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum LoginTarget {
    Copilot {
        /// GitHub OAuth token with Copilot access. Without it the token is
        /// prompted for in a terminal, or read from piped stdin.
        #[arg(long, env = "AGENTBAR_GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SwitchTarget {
    Codex {
        #[command(flatten)]
        selector: SelectorArgs,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum NoteAction {
    Set {
        provider: Provider,
        #[command(flatten)]
        selector: SelectorArgs,
        #[arg(long, short = 'm')]
        text: String,
        #[arg(long)]
        json: bool,
    },
    Clear {
        provider: Provider,
        #[command(flatten)]
        selector: SelectorArgs,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    List {
        #[arg(long)]
        json: bool,
    },
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
    },
    Unset {
        key: String,
    },
}

/// Menu picker, only offered when stdin is a terminal.
struct TerminalPicker;

static TERMINAL_PICKER: TerminalPicker = TerminalPicker;

impl ProfilePicker for TerminalPicker {
    fn pick(&self, provider: Provider, candidates: &[&AuthProfile]) -> Result<String> {
        let items: Vec<String> = candidates
            .iter()
            .map(|profile| {
                format!(
                    "{} ({}){}",
                    profile.email,
                    profile.plan_type.as_deref().unwrap_or("-"),
                    profile
                        .note
                        .as_deref()
                        .map(|note| format!(" # {}", note))
                        .unwrap_or_default()
                )
            })
            .collect();
        let index = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Select {} account", provider))
            .items(&items)
            .default(0)
            .interact()
            .map_err(|err| Error::Selection(format!("selection error: {}", err)))?;
        candidates
            .get(index)
            .map(|profile| profile.id.clone())
            .ok_or_else(|| Error::Selection("selection cancelled".to_string()))
    }
}

fn interactive() -> bool {
    std::io::stdin().is_terminal()
}

fn picker() -> Option<&'static dyn ProfilePicker> {
    interactive().then_some(&TERMINAL_PICKER as &dyn ProfilePicker)
}

fn confirm_delete(yes: bool, profile: &AuthProfile) -> Result<()> {
    if yes {
        return Ok(());
    }
    if !interactive() {
        return Err(Error::Usage(
            "refusing to delete without --yes (non-interactive mode)".to_string(),
        ));
    }
    let accepted = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Delete {} profile {} ({})?",
            profile.provider,
            profile.email,
            profile.plan_type.as_deref().unwrap_or("-")
        ))
        .default(false)
        .interact()
        .unwrap_or(false);
    if accepted {
        Ok(())
    } else {
        Err(Error::Selection("delete cancelled".to_string()))
    }
}

fn github_token(flag: Option<String>) -> Result<String> {
    if let Some(token) = flag {
        return Ok(token);
    }
    if interactive() {
        return Password::with_theme(&ColorfulTheme::default())
            .with_prompt("GitHub token")
            .interact()
            .map_err(|err| Error::Usage(format!("failed to read token: {}", err)));
    }
    services::read_token(std::io::stdin().lock())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T, what: &'static str) -> Result<()> {
    println!("{}", to_json(value, what)?);
    Ok(())
}

fn print_settings(values: &SettingValues, json: bool) -> Result<()> {
    if json {
        let map: Map<String, Value> = values
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), Value::from(*value)))
            .collect();
        return print_json(&map, "settings");
    }
    for (key, value) in values {
        println!("{} = {}", key, value);
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("AGENTBAR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("agentbar: {}", err);
        std::process::exit(err.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = AppContext::new(AppPaths::from_env(), Endpoints::from_env(), reqwest_fetch()?);

    match cli.command {
        Command::Accounts { provider, json } => {
            let rows = services::list_accounts(&ctx.store, provider);
            if json {
                return print_json(&rows, "accounts");
            }
            if rows.is_empty() {
                println!("no accounts stored");
            }
            for line in account_lines(&rows) {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Usage {
            provider,
            refresh,
            json,
        } => {
            let rows = services::collect_usage(&ctx, provider, refresh, None)?;
            if json {
                return print_json(&rows, "usage rows");
            }
            for line in usage_lines(&rows, now_ms()) {
                println!("{}", line);
            }
            Ok(())
        }
        Command::Save {
            target: SaveTarget::Codex { json },
        } => {
            let saved = services::save_codex(&ctx)?;
            if json {
                return print_json(&saved, "saved profile");
            }
            println!(
                "{} codex profile: {} ({})",
                if saved.created { "Saved" } else { "Updated" },
                saved.email,
                saved.plan_type.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Command::Login {
            target: LoginTarget::Copilot { token, json },
        } => {
            let saved = services::login_copilot(&ctx, &github_token(token)?)?;
            if json {
                return print_json(&saved, "saved profile");
            }
            println!(
                "Saved copilot profile: {} ({})",
                saved.email,
                saved.plan_type.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Command::Switch {
            target: SwitchTarget::Codex { selector, json },
        } => {
            let result = services::switch_codex(&ctx, &selector.selector(), picker())?;
            if json {
                return print_json(&result, "switch result");
            }
            println!(
                "Switched codex: {} ({}) -> {}",
                result.email,
                result.plan_type.as_deref().unwrap_or("-"),
                result.auth_path.display()
            );
            Ok(())
        }
        Command::Delete {
            provider,
            selector,
            yes,
            json,
        } => {
            let deleted = services::delete_profile(&ctx, provider, &selector.selector(), picker(), |profile| {
                confirm_delete(yes, profile)
            })?;
            if json {
                return print_json(&deleted, "deleted profile");
            }
            println!(
                "Deleted {}: {} ({}){}",
                deleted.provider,
                deleted.email,
                deleted.plan_type.as_deref().unwrap_or("-"),
                if deleted.was_active { ", no active account left" } else { "" }
            );
            Ok(())
        }
        Command::Note { action } => {
            let (update, json) = match action {
                NoteAction::Set {
                    provider,
                    selector,
                    text,
                    json,
                } => (
                    services::set_note(&ctx, provider, &selector.selector(), picker(), &text)?,
                    json,
                ),
                NoteAction::Clear {
                    provider,
                    selector,
                    json,
                } => (
                    services::clear_note(&ctx, provider, &selector.selector(), picker())?,
                    json,
                ),
            };
            if json {
                return print_json(&update, "note update");
            }
            match &update.note {
                Some(note) => println!("Saved note for {}: {}", update.email, note),
                None => println!("Cleared note for {}", update.email),
            }
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::List { json } => print_settings(&ctx.settings.list(), json),
            ConfigAction::Get { key } => {
                let key: SettingKey = key.parse()?;
                println!("{}", ctx.settings.get(key));
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                let key: SettingKey = key.parse()?;
                print_settings(&ctx.settings.set(key, &value)?, false)
            }
            ConfigAction::Unset { key } => {
                let key: SettingKey = key.parse()?;
                print_settings(&ctx.settings.unset(key)?, false)
            }
        },
    }
}
