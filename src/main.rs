use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use client_store::{config, db, Config, StoreError};

/// Walk a client through create, search, phone, update and delete
#[derive(Debug, Parser)]
#[command(name = "client_store", version)]
struct Args {
    /// Connection string (postgres:// URL or libpq key=value pairs)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Pool size; 1 keeps a single dedicated connection
    #[arg(long)]
    max_connections: Option<u32>,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = match args.database_url {
        Some(url) => Config::from_database_url(url),
        None => config::init()?,
    };
    if let Some(max_connections) = args.max_connections {
        config.max_connections = max_connections;
    }

    if let Err(err) = run(&config).await {
        eprintln!("Error ({}): {}", err.kind(), err.message());
        eprintln!("Statement: {}", err.statement());
        std::process::exit(1);
    }

    Ok(())
}

async fn run(config: &Config) -> Result<(), StoreError> {
    let store = db::init(config).await?;

    store.add_client("Ivan", "Ivanov", "ivan.ivanov@mail.ru").await?;

    let clients = store.find_client("Ivan").await?;
    for client in &clients {
        println!(
            "Found client: {} {} {}",
            client.first_name.as_deref().unwrap_or_default(),
            client.last_name.as_deref().unwrap_or_default(),
            client.email.as_deref().unwrap_or_default(),
        );
    }

    let Some(client) = clients.first() else {
        return Ok(());
    };

    let phone_id = store.add_phone(client.id, "123-456-7890").await?;
    println!("Added phone {phone_id} for client {}", client.id);

    store
        .update_client(client.id, "Ivan", "Smith", "ivan.smith@mail.ru")
        .await?;

    store.delete_phone(phone_id).await?;
    store.delete_client(client.id).await?;
    println!("Removed client {}", client.id);

    Ok(())
}
