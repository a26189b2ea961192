use crate::{
    errors::ClientError,
    pages::{Effect, Route, ViewResult},
    session::{IdentityProvider, NextStep, Session, SignIn, SignUp},
};

pub async fn login<P: IdentityProvider>(
    session: &Session<P>,
    email: &str,
    password: &str,
) -> ViewResult {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err("Please fill all fields".to_string());
    }

    match session.sign_in(email, password).await {
        Ok(SignIn::SignedIn) => {
            if session.token().await.is_none() {
                tracing::error!("Signed in but no access token was issued");
                return Err("An error occurred during sign in".to_string());
            }
            tracing::info!("Signed in as {}", email);
            Ok(Effect::navigate(Route::Home))
        }
        Ok(SignIn::Next(step)) => Err(next_step_message(step).to_string()),
        Err(err) => {
            tracing::error!("Error signing in: {}", err);
            Err(ClientError::from(err).user_message())
        }
    }
}

fn next_step_message(step: NextStep) -> &'static str {
    match step {
        NextStep::ConfirmWithSmsCode | NextStep::ConfirmWithTotpCode => {
            "MFA confirmation required. This client doesn't handle MFA yet."
        }
        NextStep::NewPasswordRequired => {
            "A new password is required. Please reset your password before signing in."
        }
        NextStep::ConfirmSignUp => "Please verify your email before signing in.",
    }
}

pub async fn signup<P: IdentityProvider>(
    session: &Session<P>,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> ViewResult {
    let email = email.trim();
    if email.is_empty() || password.is_empty() || confirm_password.is_empty() {
        return Err("Please fill all fields".to_string());
    }
    if password != confirm_password {
        return Err("Passwords do not match".to_string());
    }

    match session.provider().sign_up(email, password, email).await {
        Ok(SignUp::ConfirmSignUp) => Ok(Effect::navigate(Route::Verify {
            email: email.to_string(),
        })),
        Ok(SignUp::Complete) => {
            Ok(Effect::navigate(Route::Login).with_notice("Account created successfully!"))
        }
        Err(err) => {
            tracing::error!("Error signing up: {}", err);
            Err(ClientError::from(err).user_message())
        }
    }
}

pub async fn verify<P: IdentityProvider>(
    session: &Session<P>,
    email: &str,
    code: &str,
) -> ViewResult {
    let code = code.trim();
    if code.is_empty() {
        return Err("Please enter verification code".to_string());
    }
    if email.is_empty() {
        return Err("Email is missing. Please go back to sign up page.".to_string());
    }

    match session.provider().confirm_sign_up(email, code).await {
        Ok(true) => Ok(Effect::navigate(Route::Login)
            .with_notice("Account verified successfully! Redirecting to login...")),
        Ok(false) => Ok(Effect::notice("Verification is not complete yet.")),
        Err(err) => {
            tracing::error!("Error verifying code: {}", err);
            Err(ClientError::from(err).user_message())
        }
    }
}

pub async fn logout<P: IdentityProvider>(session: &Session<P>) -> ViewResult {
    match session.sign_out().await {
        Ok(()) => {
            tracing::info!("User logged out");
            Ok(Effect::navigate(Route::Login))
        }
        Err(err) => {
            tracing::error!("Error logging out: {}", err);
            Err(ClientError::from(err).user_message())
        }
    }
}
