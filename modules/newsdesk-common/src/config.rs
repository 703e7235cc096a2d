use std::env;
use std::time::Duration;

/// Process configuration, read once at startup and threaded explicitly into
/// whatever needs it. No globals.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Absent means the in-memory store (dev and
    /// single-shot runs only; nothing survives the process).
    pub database_url: Option<String>,

    pub groq_api_key: String,
    pub groq_base_url: String,
    pub groq_model: String,

    pub newsapi_key: Option<String>,
    pub gnews_key: Option<String>,

    pub telegram_bot_token: String,

    pub image_base_url: String,
    pub image_host_url: String,

    /// News categories fetched each tick.
    pub categories: Vec<String>,
    pub headlines_per_category: usize,

    pub ranking_enabled: bool,
    /// How many ranked articles survive a ranking pass.
    pub ranking_top_n: usize,

    /// Article text is truncated to this many chars before prompting.
    pub max_content_chars: usize,
    /// Pause between consecutive completion calls for one article.
    pub llm_call_delay: Duration,

    /// Transient image failures tolerated per article before it errors.
    pub image_max_retries: u32,
    pub image_backoff_base: Duration,
    /// How long a generating_images article must sit untouched before a run
    /// will resume it.
    pub image_resume_grace: Duration,

    pub tick_interval: Duration,
    pub run_on_start: bool,
    /// Max articles a stage claims per tick.
    pub batch_size: usize,

    /// Directory run reports are written into.
    pub data_dir: String,

    pub http_timeout: Duration,
    pub image_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            database_url: env::var("DATABASE_URL").ok(),
            groq_api_key: required_env("GROQ_API_KEY"),
            groq_base_url: env_or("GROQ_BASE_URL", "https://api.groq.com/openai/v1"),
            groq_model: env_or("GROQ_MODEL", "llama-3.3-70b-versatile"),
            newsapi_key: env::var("NEWSAPI_KEY").ok(),
            gnews_key: env::var("GNEWS_KEY").ok(),
            telegram_bot_token: required_env("TELEGRAM_BOT_TOKEN"),
            image_base_url: env_or("IMAGE_BASE_URL", "https://image.pollinations.ai"),
            image_host_url: env_or("IMAGE_HOST_URL", "https://catbox.moe/user/api.php"),
            categories: env_or("NEWS_CATEGORIES", "technology,business,science")
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            headlines_per_category: env_parse("HEADLINES_PER_CATEGORY", 5),
            ranking_enabled: env_parse("RANKING_ENABLED", true),
            ranking_top_n: env_parse("RANKING_TOP_N", 1),
            max_content_chars: env_parse("MAX_CONTENT_CHARS", 7000),
            llm_call_delay: Duration::from_secs(env_parse("LLM_CALL_DELAY_SECS", 2)),
            image_max_retries: env_parse("IMAGE_MAX_RETRIES", 3),
            image_backoff_base: Duration::from_secs(env_parse("IMAGE_BACKOFF_BASE_SECS", 2)),
            image_resume_grace: Duration::from_secs(env_parse("IMAGE_RESUME_GRACE_SECS", 600)),
            tick_interval: Duration::from_secs(env_parse("TICK_INTERVAL_SECS", 1800)),
            run_on_start: env_parse("RUN_ON_START", true),
            batch_size: env_parse("BATCH_SIZE", 10),
            data_dir: env_or("DATA_DIR", "data/runs"),
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30)),
            image_timeout: Duration::from_secs(env_parse("IMAGE_TIMEOUT_SECS", 60)),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} must be set"))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
