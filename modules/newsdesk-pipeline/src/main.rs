use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use image_client::{CatboxClient, PollinationsClient, MODEL_FALLBACK};
use llm_client::GroqClient;
use newsdesk_common::{ArticleStatus, Config};
use newsdesk_store::{ArticleStore, MemoryStore, PgStore, SubscriberStore};
use telegram_client::TelegramClient;

use newsdesk_pipeline::orchestrator::Orchestrator;
use newsdesk_pipeline::scheduler::{listen_for_shutdown, Scheduler};
use newsdesk_pipeline::sources::{GNewsClient, HttpTextExtractor, NewsApiClient, NewsSource};
use newsdesk_pipeline::stages::broadcast::BroadcastExecutor;
use newsdesk_pipeline::stages::curation::CurationExecutor;
use newsdesk_pipeline::stages::fetch::FetchExecutor;
use newsdesk_pipeline::stages::image::ImageExecutor;
use newsdesk_pipeline::stages::ranking::RankingExecutor;
use newsdesk_pipeline::ShutdownFlag;

#[derive(Parser)]
#[command(name = "newsdesk", about = "Scheduled AI news content pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline on a fixed interval until interrupted.
    Run {
        /// Seconds between ticks; overrides TICK_INTERVAL_SECS.
        #[arg(long)]
        interval: Option<u64>,
        /// Wait a full interval before the first tick.
        #[arg(long)]
        no_initial_run: bool,
    },
    /// Run a single full tick and exit.
    Once,
    /// Run one stage in isolation (fetch, ranking, curation, image, broadcast).
    Stage { name: String },
    /// Move an errored article back into the pipeline.
    Requeue {
        id: Uuid,
        /// Target status: raw or curated.
        #[arg(long, default_value = "raw")]
        to: String,
    },
    /// Print article counts per status.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let (articles, subscribers): (Arc<dyn ArticleStore>, Arc<dyn SubscriberStore>) =
        match &config.database_url {
            Some(url) => {
                let store = Arc::new(PgStore::connect(url).await?);
                store.migrate().await?;
                (store.clone(), store)
            }
            None => {
                warn!("DATABASE_URL not set, using the in-memory store");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    match cli.command {
        Command::Run {
            interval,
            no_initial_run,
        } => {
            let orchestrator = Arc::new(build_orchestrator(&config, articles, subscribers));
            let interval = interval
                .map(Duration::from_secs)
                .unwrap_or(config.tick_interval);
            let shutdown = ShutdownFlag::new();
            listen_for_shutdown(shutdown.clone());
            Scheduler::new(orchestrator, interval, config.run_on_start && !no_initial_run)
                .run(&shutdown)
                .await;
        }
        Command::Once => {
            let orchestrator = build_orchestrator(&config, articles, subscribers);
            let report = orchestrator.tick(&ShutdownFlag::new()).await;
            println!("{report}");
        }
        Command::Stage { name } => {
            let orchestrator = build_orchestrator(&config, articles, subscribers);
            let stage = orchestrator.run_stage(&name, &ShutdownFlag::new()).await?;
            match stage.fault {
                Some(fault) => anyhow::bail!("{name} faulted: {fault}"),
                None => println!("{name}: {}", stage.metrics),
            }
        }
        Command::Requeue { id, to } => {
            let target = ArticleStatus::parse(&to)
                .ok_or_else(|| anyhow::anyhow!("unknown status {to:?}"))?;
            let article = articles.requeue(id, target).await?;
            info!(%id, status = %article.status, "article requeued");
            println!("{id} -> {}", article.status);
        }
        Command::Stats => {
            let counts = articles.count_by_status().await?;
            for status in ArticleStatus::ALL {
                println!("{:<18} {}", status.to_string(), counts[&status]);
            }
        }
    }
    Ok(())
}

fn build_orchestrator(
    config: &Config,
    articles: Arc<dyn ArticleStore>,
    subscribers: Arc<dyn SubscriberStore>,
) -> Orchestrator {
    let llm = Arc::new(GroqClient::new(
        &config.groq_api_key,
        &config.groq_base_url,
        &config.groq_model,
        config.http_timeout,
    ));

    let mut sources: Vec<Arc<dyn NewsSource>> = Vec::new();
    if let Some(key) = &config.newsapi_key {
        sources.push(Arc::new(NewsApiClient::new(key, config.http_timeout)));
    }
    if let Some(key) = &config.gnews_key {
        sources.push(Arc::new(GNewsClient::new(key, config.http_timeout)));
    }
    let fetch = if sources.is_empty() {
        None
    } else {
        Some(FetchExecutor::new(
            articles.clone(),
            sources,
            Arc::new(HttpTextExtractor::new(config.http_timeout)),
            config.categories.clone(),
            config.headlines_per_category,
        ))
    };

    let ranking = RankingExecutor::new(
        articles.clone(),
        llm.clone(),
        config.ranking_enabled,
        config.ranking_top_n,
        config.batch_size,
    );
    let curation = CurationExecutor::new(
        articles.clone(),
        llm.clone(),
        config.ranking_enabled,
        config.max_content_chars,
        config.llm_call_delay,
        config.batch_size,
    );
    let image = ImageExecutor::new(
        articles.clone(),
        llm,
        Arc::new(PollinationsClient::new(
            &config.image_base_url,
            config.image_timeout,
        )),
        Arc::new(CatboxClient::new(&config.image_host_url, config.http_timeout)),
        MODEL_FALLBACK.iter().map(|m| m.to_string()).collect(),
        config.image_max_retries,
        config.image_backoff_base,
        config.image_resume_grace,
        config.batch_size,
    );
    let broadcast = BroadcastExecutor::new(
        articles.clone(),
        subscribers,
        Arc::new(TelegramClient::new(
            &config.telegram_bot_token,
            config.http_timeout,
        )),
        config.batch_size,
    );

    Orchestrator::new(
        fetch,
        ranking,
        curation,
        image,
        broadcast,
        articles,
        Some(PathBuf::from(&config.data_dir)),
    )
}
