use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sundai_bot::config::Config;
use sundai_bot::db::Database;
use sundai_bot::docs;
use sundai_bot::generate::{Platform, PostType};
use sundai_bot::service::ContentService;
use sundai_bot::web;
use sundai_bot::workflow::{self, CycleResult};

#[derive(Debug, Parser)]
#[command(name = "sundai-bot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Generate one post and send it for review
    Post {
        #[arg(long, default_value = "thought_leadership", value_parser = parse_post_type)]
        post_type: PostType,
        #[arg(long, default_value = "mastodon", value_parser = parse_platform)]
        platform: Platform,
        #[arg(long)]
        with_image: bool,
    },
    /// Search for conversations and draft replies
    Engage {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long)]
        min_relevance: Option<u8>,
    },
    /// List the company documents that would be used as context
    Docs,
}

fn parse_post_type(s: &str) -> Result<PostType, String> {
    PostType::from_str(s).ok_or_else(|| {
        let known: Vec<_> = PostType::ALL.iter().map(PostType::as_str).collect();
        format!("unknown post type {s} (expected one of {})", known.join(", "))
    })
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    Platform::from_str(s).ok_or_else(|| format!("unknown platform {s}"))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(company = %config.company_name, model = %config.llm_model, "Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let db = open_database(&config).await?;
            web::serve(config, db, shutdown_signal()).await?;
        }
        Command::Post {
            post_type,
            platform,
            with_image,
        } => {
            let db = open_database(&config).await?;
            let service = ContentService::from_config(&config, db)?;
            let (post, result) =
                workflow::run_post_cycle(&service, post_type, platform, with_image).await?;
            println!("{}\n", post.content);
            report(&format!("post {}", post.id), &result, post.external_url.as_deref());
        }
        Command::Engage {
            query,
            limit,
            min_relevance,
        } => {
            let min_relevance = min_relevance.unwrap_or(config.min_relevance);
            let db = open_database(&config).await?;
            let service = ContentService::from_config(&config, db)?;
            let results =
                workflow::run_engagement_cycle(&service, &query, limit, min_relevance).await?;
            if results.is_empty() {
                println!("No replies drafted for {query}");
            }
            for (reply, result) in &results {
                println!(
                    "[{}/10] reply to {}: {}",
                    reply.relevance_score, reply.target_post_id, reply.content
                );
                report(
                    &format!("reply {}", reply.id),
                    result,
                    reply.external_url.as_deref(),
                );
            }
        }
        Command::Docs => {
            let source = docs::source_from_config(&config)?;
            let documents = source.load_documents().await?;
            info!(source = source.name(), count = documents.len(), "Documents loaded");
            for name in documents.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

async fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");
    Ok(db)
}

fn report(label: &str, result: &CycleResult, url: Option<&str>) {
    match result {
        CycleResult::Drafted => println!("{label} is pending approval"),
        CycleResult::Published => {
            println!("{label} published: {}", url.unwrap_or("(no URL)"));
        }
        CycleResult::Rejected(Some(reason)) => println!("{label} rejected: {reason}"),
        CycleResult::Rejected(None) => println!("{label} rejected"),
        CycleResult::TimedOut => println!("{label} timed out waiting for approval"),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sundai_bot=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down...");
}
