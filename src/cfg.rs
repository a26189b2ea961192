use anyhow::{Context, Result};
use std::{env::var, sync::Arc, time::Duration};

pub type Config = Arc<Configuration>;

const DEFAULT_COGNITO_REGION: &str = "ap-southeast-1";
const DEFAULT_REVEAL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Configuration {
    /// Base URL of the chatbot API, e.g. `http://127.0.0.1:8000/api/v1`.
    pub api_base_url: String,

    pub cognito_client_id: String,
    pub cognito_region: String,
    // Overrides the regional Cognito endpoint, used against local stand-ins.
    pub cognito_endpoint: Option<String>,

    /// Delay between revealed words of a bot reply. Zero disables the animation.
    pub reveal_interval: Duration,
}

impl Configuration {
    pub fn from_env() -> Result<Config> {
        let api_base_url = var("API_BASE_URL").context("Missing API_BASE_URL environment variable")?;
        let cognito_client_id =
            var("COGNITO_CLIENT_ID").context("Missing COGNITO_CLIENT_ID environment variable")?;
        let cognito_region =
            var("COGNITO_REGION").unwrap_or_else(|_| DEFAULT_COGNITO_REGION.to_string());
        let cognito_endpoint = var("COGNITO_ENDPOINT").ok().filter(|x| !x.is_empty());

        let reveal_interval = match var("CHAT_REVEAL_INTERVAL_MS") {
            Ok(value) => value.parse::<u64>().context(
                "Unable to parse the value of the CHAT_REVEAL_INTERVAL_MS environment variable. Please make sure it is a valid number of milliseconds",
            )?,
            Err(_) => DEFAULT_REVEAL_INTERVAL_MS,
        };

        Ok(Arc::new(Configuration {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            cognito_client_id,
            cognito_region,
            cognito_endpoint,
            reveal_interval: Duration::from_millis(reveal_interval),
        }))
    }

    /// Endpoint of the Cognito identity provider API.
    pub fn cognito_url(&self) -> String {
        match &self.cognito_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://cognito-idp.{}.amazonaws.com/", self.cognito_region),
        }
    }
}
