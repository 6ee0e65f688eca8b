//! Binary entrypoint for the Wayfarer CLI.
//!
//! Commands:
//! - `console` - run the bot against stdin/stdout (`<user_id> <message>` per line)
//! - `init` - create a starter `config.toml`
//! - `import-cities [<path>]` - validate a city seed file and print per-letter counts
//! - `admin-passwd` - interactively set the `/clear` password (argon2 hashed)
//! - `status` - print store and catalog statistics
//!
//! See the library crate docs for module-level details: `wayfarer::`.
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};

use wayfarer::bot::{Collaborators, ConversationMachine};
use wayfarer::catalog::SeedCatalog;
use wayfarer::config::Config;
use wayfarer::hotels::{CityLookup, HotelSearchClient, UnconfiguredClient};
use wayfarer::storage::SledPlayerStore;

const DB_DIR: &str = "wayfarer.db";

#[derive(Parser)]
#[command(name = "wayfarer")]
#[command(about = "Hotel search wizard and city game chat bot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot on the console transport
    Console,
    /// Initialize a new configuration file
    Init,
    /// Load a city seed file and report what it contains
    ImportCities {
        /// Seed file (defaults to storage.cities_seed)
        file: Option<String>,
    },
    /// Set or update the administrator password used by /clear
    AdminPasswd,
    /// Show store and catalog statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Console => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting Wayfarer v{}", env!("CARGO_PKG_VERSION"));
            let max_idle = chrono::Duration::minutes(config.bot.session_timeout.max(1) as i64);
            let machine = Arc::new(build_machine(&config)?);
            wayfarer::console::run(machine, max_idle).await?;
        }
        Commands::Init => {
            info!("Initializing new configuration");
            Config::create_default(&cli.config).await?;
            let cfg = Config::default();
            info!("Configuration file created at {}", cli.config);
            tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
            println!(
                "Wrote {}. Put the city seed at {} and run `wayfarer import-cities`.",
                cli.config, cfg.storage.cities_seed
            );
        }
        Commands::ImportCities { file } => {
            let config = pre_config.unwrap_or_default();
            let path = file.unwrap_or_else(|| config.storage.cities_seed.clone());
            let catalog = SeedCatalog::load_json(&path)?;
            println!("{}: {} cities", path, catalog.len());
            for (letter, count) in catalog.letter_counts() {
                println!("  {}  {}", letter, count);
            }
        }
        Commands::AdminPasswd => {
            let mut config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            match config.bot.admin_id {
                Some(id) => println!("Setting the /clear password for admin user {}.", id),
                None => println!("Warning: bot.admin_id is not set; /clear stays disabled until it is."),
            }
            let pass1 = rpassword::prompt_password("New password: ")?;
            if pass1.len() < 8 {
                println!("Error: password too short (min 8).");
                return Ok(());
            }
            if pass1.len() > 128 {
                println!("Error: password too long.");
                return Ok(());
            }
            let pass2 = rpassword::prompt_password("Confirm password: ")?;
            if pass1 != pass2 {
                println!("Error: passwords do not match.");
                return Ok(());
            }
            let hash = match wayfarer::bot::admin::hash_password(&pass1) {
                Ok(h) => h,
                Err(e) => {
                    println!("Hash error: {e}");
                    return Ok(());
                }
            };
            config.bot.admin_password_hash = Some(hash);
            let serialized = toml::to_string_pretty(&config)?;
            tokio::fs::write(&cli.config, serialized).await?;
            println!("Admin password updated successfully.");
        }
        Commands::Status => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let store = SledPlayerStore::open(Path::new(&config.storage.data_dir).join(DB_DIR))?;
            println!("Wayfarer v{}", env!("CARGO_PKG_VERSION"));
            println!("Players: {}", store.player_count());
            match SeedCatalog::load_json(&config.storage.cities_seed) {
                Ok(catalog) => println!("Cities: {}", catalog.len()),
                Err(e) => println!("Cities: unavailable ({})", e),
            }
            println!(
                "Hotel search: {}",
                if config.search.api_key.is_empty() { "not configured" } else { "configured" }
            );
        }
    }

    Ok(())
}

fn build_machine(config: &Config) -> Result<ConversationMachine> {
    let store = Arc::new(SledPlayerStore::open(
        Path::new(&config.storage.data_dir).join(DB_DIR),
    )?);
    let catalog = Arc::new(SeedCatalog::load_json(&config.storage.cities_seed)?);
    let (lookup, hotels) = search_clients(config);
    Ok(ConversationMachine::new(
        Collaborators {
            players: store.clone(),
            history: store,
            catalog,
            lookup,
            hotels,
        },
        config,
    ))
}

#[cfg(feature = "rapidapi")]
fn search_clients(config: &Config) -> (Arc<dyn CityLookup>, Arc<dyn HotelSearchClient>) {
    let client = wayfarer::hotels::rapidapi::RapidApiClient::new(config.search.clone());
    if !client.is_configured() {
        warn!("search.api_key is empty and RAPID_API_KEY is not set; hotel search disabled");
        return (Arc::new(UnconfiguredClient), Arc::new(UnconfiguredClient));
    }
    let client = Arc::new(client);
    (client.clone(), client)
}

#[cfg(not(feature = "rapidapi"))]
fn search_clients(_config: &Config) -> (Arc<dyn CityLookup>, Arc<dyn HotelSearchClient>) {
    warn!("built without the 'rapidapi' feature; hotel search disabled");
    (Arc::new(UnconfiguredClient), Arc::new(UnconfiguredClient))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());

    match file {
        Some(f) => {
            let write_mutex = Arc::new(std::sync::Mutex::new(f));
            // Console output only in the foreground; redirected stdout would duplicate the file.
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
