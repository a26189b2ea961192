use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::{
    errors::IdentityError,
    session::{IdentityProvider, NextStep, SignIn, SignUp},
};

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";
// Tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Identity provider backed by the Cognito user pool JSON API.
pub struct Cognito {
    client: Client,
    endpoint: String,
    client_id: String,
    tokens: Mutex<Option<Tokens>>,
}

#[derive(Debug, Clone)]
struct Tokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResp {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpResp {
    user_confirmed: bool,
}

#[derive(Deserialize)]
struct ServiceError {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AttributeType<'a> {
    name: &'a str,
    value: &'a str,
}

impl Cognito {
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            tokens: Mutex::new(None),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        body: serde_json::Value,
    ) -> Result<T, IdentityError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, action))
            .body(body.to_string())
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(match serde_json::from_slice::<ServiceError>(&bytes) {
                Ok(err) => IdentityError::Rejected {
                    kind: short_kind(&err.kind).to_string(),
                    message: err.message,
                },
                Err(_) => IdentityError::Unexpected(format!("{} returned {}", action, status)),
            });
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| IdentityError::Unexpected(format!("{}: {}", action, err)))
    }

    async fn store(&self, result: AuthenticationResult) {
        let mut tokens = self.tokens.lock().await;
        // Refresh flows do not return a new refresh token.
        let refresh_token = result
            .refresh_token
            .or_else(|| tokens.as_ref().and_then(|x| x.refresh_token.clone()));
        *tokens = Some(Tokens {
            access_token: result.access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(result.expires_in),
        });
    }

    async fn refresh_tokens(&self, refresh_token: String) -> Result<Option<String>, IdentityError> {
        tracing::debug!("Refreshing access token");
        let resp = self
            .call::<InitiateAuthResp>(
                "InitiateAuth",
                json!({
                    "AuthFlow": "REFRESH_TOKEN_AUTH",
                    "ClientId": self.client_id,
                    "AuthParameters": { "REFRESH_TOKEN": refresh_token },
                }),
            )
            .await;
        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!("Token refresh failed: {}", err);
                // A rejected refresh token will not work next time either.
                if matches!(err, IdentityError::Rejected { .. }) {
                    *self.tokens.lock().await = None;
                }
                return Err(err);
            }
        };
        match resp.authentication_result {
            Some(result) => {
                let access_token = result.access_token.clone();
                self.store(result).await;
                Ok(Some(access_token))
            }
            None => Ok(None),
        }
    }
}

// Cognito error types sometimes come namespaced, e.g. `com.amazonaws...#NotAuthorizedException`.
fn short_kind(kind: &str) -> &str {
    kind.rsplit('#').next().unwrap_or(kind)
}

fn challenge_step(name: &str) -> Option<NextStep> {
    match name {
        "SMS_MFA" => Some(NextStep::ConfirmWithSmsCode),
        "SOFTWARE_TOKEN_MFA" => Some(NextStep::ConfirmWithTotpCode),
        "NEW_PASSWORD_REQUIRED" => Some(NextStep::NewPasswordRequired),
        _ => None,
    }
}

impl IdentityProvider for Cognito {
    async fn sign_in(&self, username: &str, password: &str) -> Result<SignIn, IdentityError> {
        let resp = self
            .call::<InitiateAuthResp>(
                "InitiateAuth",
                json!({
                    "AuthFlow": "USER_PASSWORD_AUTH",
                    "ClientId": self.client_id,
                    "AuthParameters": { "USERNAME": username, "PASSWORD": password },
                }),
            )
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(IdentityError::Rejected { kind, .. }) if kind == "UserNotConfirmedException" => {
                return Ok(SignIn::Next(NextStep::ConfirmSignUp));
            }
            Err(err) => return Err(err),
        };

        if let Some(result) = resp.authentication_result {
            self.store(result).await;
            return Ok(SignIn::SignedIn);
        }
        let challenge = resp.challenge_name.unwrap_or_default();
        challenge_step(&challenge)
            .map(SignIn::Next)
            .ok_or_else(|| IdentityError::Unexpected(format!("Unsupported challenge '{}'", challenge)))
    }

    async fn sign_up(
        &self,
        username: &str,
        password: &str,
        email: &str,
    ) -> Result<SignUp, IdentityError> {
        let resp: SignUpResp = self
            .call(
                "SignUp",
                json!({
                    "ClientId": self.client_id,
                    "Username": username,
                    "Password": password,
                    "UserAttributes": [AttributeType { name: "email", value: email }],
                }),
            )
            .await?;
        Ok(if resp.user_confirmed {
            SignUp::Complete
        } else {
            SignUp::ConfirmSignUp
        })
    }

    async fn confirm_sign_up(&self, username: &str, code: &str) -> Result<bool, IdentityError> {
        let _: serde_json::Value = self
            .call(
                "ConfirmSignUp",
                json!({
                    "ClientId": self.client_id,
                    "Username": username,
                    "ConfirmationCode": code,
                }),
            )
            .await?;
        Ok(true)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let tokens = self.tokens.lock().await.take();
        let Some(tokens) = tokens else {
            return Ok(());
        };
        let _: serde_json::Value = self
            .call("GlobalSignOut", json!({ "AccessToken": tokens.access_token }))
            .await?;
        Ok(())
    }

    async fn fetch_session(&self) -> Result<Option<String>, IdentityError> {
        let cached = self.tokens.lock().await.clone();
        let Some(tokens) = cached else {
            return Ok(None);
        };
        if tokens.expires_at - Utc::now() > Duration::seconds(EXPIRY_SKEW_SECS) {
            return Ok(Some(tokens.access_token));
        }
        match tokens.refresh_token {
            Some(refresh_token) => self.refresh_tokens(refresh_token).await,
            None => {
                *self.tokens.lock().await = None;
                Ok(None)
            }
        }
    }
}
