use std::path::PathBuf;

use clap::{Parser, Subcommand};
use piidash_core::{Dashboard, DashboardConfig};
use piidash_types::{Lookup, SortColumn, User};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "piidash")]
struct Cli {
    /// YAML config file. Falls back to PIIDASH_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Read users from a JSON file instead of the users endpoint.
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    #[arg(long, global = true)]
    url: Option<String>,
    /// Keep UI state in this file between invocations.
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply filter/sort changes, then print the rows and stats.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long = "pii")]
        pii: Vec<String>,
        #[arg(long = "drop-pii")]
        drop_pii: Vec<String>,
        #[arg(long)]
        sort: Option<SortColumn>,
        /// Clear filters before applying the others.
        #[arg(long)]
        clear: bool,
    },
    Show {
        id: String,
    },
    PiiTypes,
    State,
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PIIDASH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("PIIDASH_CONFIG").map(PathBuf::from));
    let mut config = DashboardConfig::load(config_path.as_deref())?;
    if let Some(file) = cli.file {
        config.users_file = Some(file);
    }
    if let Some(url) = cli.url {
        config.users_url = url;
        // An explicit URL beats a users file from config or env.
        config.users_file = None;
    }
    if let Some(session) = cli.session_file {
        config.session_file = Some(session);
    }
    debug!(?config, "effective config");

    let dash = Dashboard::from_config(&config);
    match cli.command {
        Command::List {
            search,
            pii,
            drop_pii,
            sort,
            clear,
        } => {
            if clear {
                dash.view.on_clear_filters();
            }
            if let Some(text) = search {
                dash.ui.set_search(Some(&text));
            }
            for name in &pii {
                dash.view.on_toggle_pii_type(name, true);
            }
            for name in &drop_pii {
                dash.view.on_toggle_pii_type(name, false);
            }
            if let Some(column) = sort {
                dash.view.on_sort(column);
            }

            dash.load().await?;
            let rows = dash.view.filtered();
            for user in rows.iter() {
                print_row(user);
            }
            let stats = dash.view.stats();
            println!(
                "users: {}  pii items: {}  avg data sources: {:.2}",
                stats.total_users, stats.total_pii_items, stats.avg_data_sources_per_user
            );
        }
        Command::Show { id } => {
            let detail = dash.detail(&id);
            dash.load().await?;
            match detail.person() {
                Lookup::Found(user) => {
                    println!("{} {}", user.id, user.name.as_deref().unwrap_or("-"));
                    println!("PII:");
                    for (category, values) in detail.pii_entries() {
                        println!("  {category}: {}", values.join(", "));
                    }
                    println!("Data sources:");
                    for (group, items) in detail.data_source_groups() {
                        println!("  {group}: {}", items.join(", "));
                    }
                }
                Lookup::Missing | Lookup::Pending => println!("user {id} not found"),
            }
        }
        Command::PiiTypes => {
            dash.load().await?;
            for name in dash.users.pii_types().get() {
                println!("{name}");
            }
        }
        Command::State => {
            println!("{}", serde_json::to_string_pretty(&dash.ui.snapshot())?);
        }
        Command::Reset => {
            dash.view.on_clear_filters();
            println!("filters cleared");
        }
    }

    Ok(())
}

fn print_row(user: &User) {
    let pii: Vec<&str> = user
        .pii
        .as_ref()
        .map(|pii| pii.keys().collect())
        .unwrap_or_default();
    println!(
        "{:>6}  {:<24}  {:<32}  {}",
        user.id,
        user.name.as_deref().unwrap_or("-"),
        pii.join(","),
        user.data_sources_count
    );
}
