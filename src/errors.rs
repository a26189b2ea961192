use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {body}")]
    Status { status: StatusCode, body: String },
    #[error("Rate limit reached")]
    RateLimited,
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("User not authenticated")]
    NotAuthenticated,
    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Validation(String),
}

impl ClientError {
    /// Short string shown inline on a view. Details only go to the log.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http(_) => "Could not reach the server.".to_string(),
            ClientError::Status { status, .. } => match *status {
                StatusCode::NOT_FOUND => "Not found.".to_string(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    "You are not allowed to do that.".to_string()
                }
                _ => "Request failed.".to_string(),
            },
            ClientError::RateLimited => "Limit has been reached. Please wait for awhile.".to_string(),
            ClientError::Decode(_) => "Unexpected API response format.".to_string(),
            ClientError::NotAuthenticated => "User not authenticated.".to_string(),
            ClientError::Identity(err) => err.user_message(),
            ClientError::Io(err) => format!("Could not read file: {}", err),
            ClientError::Validation(msg) => msg.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{kind}: {message}")]
    Rejected { kind: String, message: String },
    #[error("Unexpected identity provider response: {0}")]
    Unexpected(String),
}

impl IdentityError {
    pub fn user_message(&self) -> String {
        match self {
            IdentityError::Http(_) => "Could not reach the identity provider.".to_string(),
            IdentityError::Rejected { message, .. } if !message.is_empty() => message.clone(),
            IdentityError::Rejected { kind, .. } => kind.clone(),
            IdentityError::Unexpected(_) => "An error occurred during sign in".to_string(),
        }
    }
}
