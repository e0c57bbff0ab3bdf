use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use recipe_identity::types::Username;
use recipe_identity::{AppConfig, TokenCodec, TokenConfig, create_router, create_state};

#[derive(Parser)]
#[command(name = "recipe-identity")]
#[command(about = "Identity and access service for the recipe catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Overrides SURREALDB_URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Initialize the database schema
    Init {
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Mint a token for an existing user (operator tool)
    IssueToken {
        username: String,
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Verify a token and print its claims
    VerifyToken { token: String },
}

fn load_config(db_url: Option<String>) -> Result<AppConfig> {
    let mut config = AppConfig::from_env()?;
    if let Some(url) = db_url {
        config.database.url = url;
    }
    info!("Using database url: {}", config.database.url);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("recipe_identity=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, db_url } => {
            let config = load_config(db_url)?;
            let app = create_router(create_state(&config).await?);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Listening on http://{}", bind);

            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
        Commands::Init { db_url } => {
            let config = load_config(db_url)?;

            info!("Initializing database...");
            let db = recipe_identity::create_connection(config.database).await?;
            recipe_identity::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::IssueToken { username, db_url } => {
            let config = load_config(db_url)?;
            let state = create_state(&config).await?;

            let issued = state.service.issue_for(&Username::new(username)).await?;
            println!("{}", serde_json::to_string_pretty(&issued)?);
        }
        Commands::VerifyToken { token } => {
            let codec = TokenCodec::new(&TokenConfig::from_env()?)?;
            match codec.parse(token.trim()) {
                Ok(claims) => println!("{}", serde_json::to_string_pretty(&claims)?),
                Err(e) => {
                    println!("Rejected ({}): {}", e.code(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
