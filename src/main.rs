use anyhow::Result;
use tracing_subscriber::EnvFilter;

use tutorbot::openai::OpenAiClient;
use tutorbot::tutor::TutorService;
use tutorbot::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    if config.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; POST endpoints will answer 500 until it is");
    }

    let openai = OpenAiClient::new(
        config.openai_base_url.clone(),
        config.api_key.clone().unwrap_or_default(),
        config.retry,
    );
    let tutor = TutorService::new(config.clone(), openai);

    run_server(config, tutor).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
