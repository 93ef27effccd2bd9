use clap::{Parser, Subcommand};
use dotenv::dotenv;
use env_logger::Env;
use log::{error, info};
use std::path::Path;
use std::process;

use dealflow_auth_guard::cli;
use dealflow_auth_guard::config::{self, Config};
use dealflow_auth_guard::AuthSecurityManager;

/// Exit code for input that failed validation or a refused attempt
const EXIT_REJECTED: i32 = 2;

/// DealFlow Auth Guard - sign-up validation and login rate limiting
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Sets the configuration file (defaults to $AUTHGUARD_CONFIG or authguard.toml)
    #[clap(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Turn debugging information on
    #[clap(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Print results as JSON
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a password (prompts when not given)
    Password {
        #[clap(short, long)]
        password: Option<String>,
    },

    /// Validate an email address
    Email {
        email: String,
    },

    /// Validate and format a phone number
    Phone {
        number: String,
    },

    /// Sanitize free text
    Sanitize {
        text: String,
    },

    /// Authentication rate limiting
    RateLimit {
        #[clap(subcommand)]
        command: RateLimitCommands,
    },

    /// Security event log
    Audit {
        #[clap(subcommand)]
        command: AuditCommands,
    },

    /// Configuration file management
    Config {
        #[clap(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum RateLimitCommands {
    /// Check whether an identifier may attempt authentication
    Check {
        #[clap(long)]
        id: String,
    },

    /// Record a failed attempt
    Fail {
        #[clap(long)]
        id: String,
    },

    /// Record a successful attempt, clearing the identifier
    Success {
        #[clap(long)]
        id: String,
    },

    /// Remove entries idle for longer than the reset window
    Cleanup {},

    /// Keep sweeping stale entries at the configured interval
    Sweep {},
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Show security events for a day
    Show {
        /// Date in YYYY-MM-DD format (defaults to today)
        #[clap(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[clap(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show {},
}

fn main() {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.debug {
        0 => log::set_max_level(log::LevelFilter::Info),
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config_path = config::resolve_config_path(cli.config.as_deref());

    if let Commands::Config { command: ConfigCommands::Init { force } } = &cli.command {
        if Path::new(&config_path).exists() && !force {
            error!("{} already exists, use --force to overwrite", config_path);
            process::exit(1);
        }
        if let Err(err) = config::save_config(&config_path, &Config::default()) {
            error!("Failed to write configuration: {:#}", err);
            process::exit(1);
        }
        info!("Default configuration written to {}", config_path);
        return;
    }

    let config = match config::load_config(&config_path) {
        Ok(config) => {
            info!("Configuration loaded from {}", config_path);
            config
        }
        Err(err) => {
            error!("Failed to load configuration: {:#}", err);
            process::exit(1);
        }
    };

    match run(&cli, &config) {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_REJECTED),
        Err(err) => {
            error!("{:#}", err);
            process::exit(1);
        }
    }
}

/// Dispatch a command; `Ok(false)` means the input was rejected
fn run(args: &Cli, config: &Config) -> anyhow::Result<bool> {
    let json = args.json;

    match &args.command {
        Commands::Password { password } => {
            let manager = AuthSecurityManager::new(config)?;
            cli::validate::check_password(&manager, password.as_deref(), json)
        }
        Commands::Email { email } => {
            let manager = AuthSecurityManager::new(config)?;
            cli::validate::check_email(&manager, email, json)
        }
        Commands::Phone { number } => {
            let manager = AuthSecurityManager::new(config)?;
            cli::validate::check_phone(&manager, number, json)
        }
        Commands::Sanitize { text } => {
            let manager = AuthSecurityManager::new(config)?;
            cli::validate::sanitize(&manager, text, json)?;
            Ok(true)
        }
        Commands::RateLimit { command } => {
            let manager = AuthSecurityManager::persistent(config)?;
            match command {
                RateLimitCommands::Check { id } => cli::rate_limit::check(&manager, id, json),
                RateLimitCommands::Fail { id } => cli::rate_limit::record(&manager, id, false, json),
                RateLimitCommands::Success { id } => cli::rate_limit::record(&manager, id, true, json),
                RateLimitCommands::Cleanup {} => {
                    cli::rate_limit::cleanup(&manager, json)?;
                    Ok(true)
                }
                RateLimitCommands::Sweep {} => {
                    cli::rate_limit::sweep(&manager)?;
                    Ok(true)
                }
            }
        }
        Commands::Audit { command } => match command {
            AuditCommands::Show { date } => {
                cli::audit::show(config, date.as_deref(), json)?;
                Ok(true)
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show {} => {
                if json {
                    cli::utils::print_json(config)?;
                } else {
                    println!("{}", toml::to_string_pretty(config)?);
                }
                Ok(true)
            }
            // Handled before the configuration is loaded
            ConfigCommands::Init { .. } => Ok(true),
        },
    }
}
