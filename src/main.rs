use clap::Parser;
use color_eyre::Result;
use taskboard::{Config, Profile, TaskCollection, cli::{self, Cli, Commands}, utils};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // --dev switches to a separate config and data directory
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config_path = match cli.config {
        Some(ref path) => utils::expand_path(path),
        None => Config::get_config_path(profile)?,
    };
    let mut config = Config::load_from(&config_path, profile)?;

    init_logging(&config.log_level);

    let mut stdout = std::io::stdout();
    match cli.command {
        Commands::Login { user_id, email } => {
            cli::handle_login(&mut config, &config_path, user_id, email, &mut stdout)?;
        }
        Commands::Logout => {
            cli::handle_logout(&mut config, &config_path, &mut stdout)?;
        }
        Commands::Whoami => {
            cli::handle_whoami(&config, &mut stdout)?;
        }
        Commands::Task(command) => {
            let mut collection =
                TaskCollection::for_session(&config.session())?.with_cooldown(config.cooldown());
            let mut store = cli::open_store(&config)?;
            collection.load(&mut store)?;
            cli::run_task_command(command, &mut collection, &mut store, cli::local_now(), &mut stdout)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so command output on stdout stays clean.
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
}
