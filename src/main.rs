use anyhow::Context;
use chatterbox::{setup_tracing, Api, Cognito, Configuration, Session, Shell};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loads the .env file located in the environment's current directory or its parents in sequence.
    // .env used only for development, so we discard error in all other cases.
    dotenv::dotenv().ok();

    // Tries to load tracing config from environment (RUST_LOG) or uses "chatterbox=info".
    setup_tracing();

    // Parse configuration from the environment.
    tracing::debug!("Initializing configuration");
    let cfg = Configuration::from_env()?;

    // Initialize the identity provider and the shared session.
    let cognito = Cognito::new(cfg.cognito_url(), cfg.cognito_client_id.clone());
    let session = Session::new(cognito);

    let api = Api::new(cfg.api_base_url.clone());
    tracing::info!("Using chatbot API at {}", api.base_url());

    let shell = Shell::new(api, session, cfg.reveal_interval);
    shell
        .run(BufReader::new(tokio::io::stdin()))
        .await
        .context("Shell stopped unexpectedly")
}
