use clap::Parser;
use reel_core::ReelConfig;
use reel_ingest::SessionStore;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "reel.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match ReelConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    if config.admin.uses_default_password() {
        tracing::warn!(
            "Admin password not set (BASIC_AUTH_PASS / admin.password), using the default password"
        );
    }

    // Connect to DB
    let pool = match reel_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.database.url, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match reel_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ SQLite {} at {}", v, config.database.url),
            Err(e) => {
                println!("❌ SQLite health check failed: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tracing::info!(
        "Admin interface: http://localhost:{} (database {})",
        config.http.port,
        config.database.url
    );

    let store = SessionStore::new(pool.clone());
    reel_server::http::start_http_server(store, config, tx.subscribe()).await?;

    pool.close().await;
    Ok(())
}
