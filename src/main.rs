use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use hearth::{
    Config, api::create_signed_cookie, create_app_with_database, database::Database,
    login::session_cookie_header, photos::sanitize_identity, startup_checks,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Global options that apply to all commands
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server (default if no command specified)
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        host: Option<String>,

        /// Automatically quit after specified number of seconds (useful for testing)
        #[arg(long)]
        quit_after: Option<u64>,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// List all users
    List,
    /// Add a new user
    Add {
        /// Username (will be converted to lowercase)
        username: String,
        /// Email address
        email: String,
    },
    /// Remove a user who owns no photos
    Remove {
        /// Username to remove
        username: String,
    },
    /// Print a signed session cookie for a user
    Session {
        /// Username to issue the session for
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set up logging first
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::User(user_cmd)) => handle_user_command(&config, user_cmd).await,
        Some(Commands::Serve {
            port,
            host,
            quit_after,
        }) => run_server(config, port, host, quit_after).await,
        None => {
            // Default to serve command if no subcommand specified
            run_server(config, None, None, None).await
        }
    }
}

fn load_config(config_path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if config_path.exists() {
        let config_content = std::fs::read_to_string(config_path)?;
        let config = toml_edit::de::from_str::<Config>(&config_content)?;
        info!("Configuration loaded from: {:?}", config_path);
        Ok(config)
    } else {
        info!("Config file not found at {:?}, using defaults", config_path);
        Ok(Config::default())
    }
}

async fn handle_user_command(
    config: &Config,
    cmd: UserCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(&config.database.path).await?;

    match cmd {
        UserCommands::List => {
            let users = db.list_users().await?;
            if users.is_empty() {
                println!("No users in database");
            } else {
                println!("Users in database:");
                for user in users {
                    println!("  {} <{}>", user.username, user.email);
                }
            }
        }
        UserCommands::Add { username, email } => {
            let username = username.trim().to_lowercase();
            // The username doubles as the storage directory name
            if sanitize_identity(&username).as_deref() != Some(username.as_str()) {
                eprintln!("Error: '{}' is not a valid username", username);
                std::process::exit(1);
            }

            if db.get_user(&username).await?.is_some() {
                eprintln!("Error: User '{}' already exists", username);
                std::process::exit(1);
            }

            db.add_user(&username, email.trim()).await?;
            println!("Added user '{}' with email '{}'", username, email.trim());
        }
        UserCommands::Remove { username } => {
            let username = username.trim().to_lowercase();
            let Some(user) = db.get_user(&username).await? else {
                eprintln!("Error: User '{}' not found", username);
                std::process::exit(1);
            };

            let owned = db.count_photos_for_user(user.id).await?;
            if owned > 0 {
                eprintln!(
                    "Error: User '{}' still owns {} photos; delete them first",
                    username, owned
                );
                std::process::exit(1);
            }

            db.remove_user(&username).await?;
            println!("Removed user '{}'", username);
        }
        UserCommands::Session { username } => {
            let username = username.trim().to_lowercase();
            if db.get_user(&username).await?.is_none() {
                eprintln!("Error: User '{}' not found", username);
                std::process::exit(1);
            }

            let signed_value = create_signed_cookie(&config.app.session_secret, &username)?;
            println!(
                "Set-Cookie: {}",
                session_cookie_header(
                    &config.app.session_cookie,
                    &signed_value,
                    config.app.session_max_age_secs
                )
            );
        }
    }

    Ok(())
}

async fn run_server(
    config: Config,
    port: Option<u16>,
    host: Option<String>,
    quit_after: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = host.unwrap_or(config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info!("Starting {} server", config.app.name);
    info!("Storage root: {:?}", config.storage.root_directory);
    info!("Database: {:?}", config.database.path);

    // Perform startup checks
    if let Err(errors) = startup_checks::perform_startup_checks(&config).await {
        for error in &errors {
            tracing::error!("Startup check failed: {}", error);
        }

        if errors.iter().any(|e| e.is_critical()) {
            tracing::error!("Critical startup check failed, exiting");
            return Err("Critical startup check failed".into());
        } else {
            tracing::warn!("Non-critical startup checks failed, continuing");
        }
    }

    let db = Database::open(&config.database.path).await?;
    let app = create_app_with_database(config, db);

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Set up graceful shutdown
    let server = axum::serve(listener, app);
    let graceful = server.with_graceful_shutdown(shutdown_signal(quit_after));

    if let Err(e) = graceful.await {
        tracing::error!("Server error: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(quit_after: Option<u64>) {
    use tokio::signal;
    use tokio::time::{Duration, sleep};

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let quit_timer = async {
        if let Some(seconds) = quit_after {
            info!(
                "Server will automatically shut down after {} seconds",
                seconds
            );
            sleep(Duration::from_secs(seconds)).await;
            info!("Quit timer expired, shutting down");
        } else {
            std::future::pending::<()>().await
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        },
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        },
        _ = quit_timer => {},
    }
}
