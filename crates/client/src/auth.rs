//! Login, second-factor verification and the other session transitions that
//! need the backend.

use shared::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginData, LoginRequest, User, VerifyOtpRequest,
};

use crate::error::{ApiError, AppError, AppResult, ErrorKind};
use crate::http::{require_data, ApiClient};
use crate::session::Phase;

pub const OTP_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(User),
    NeedsSecondFactor,
    Rejected(String),
}

/// What a login-shaped response grants
enum Grant {
    Session(User, String),
    Challenge(String),
}

fn interpret(data: LoginData) -> Result<Grant, ApiError> {
    if data.requires_2fa {
        return match data.user_id {
            Some(id) if !id.is_empty() => Ok(Grant::Challenge(id)),
            _ => Err(ApiError::unexpected_response(None)),
        };
    }
    match (data.user, data.access_token) {
        (Some(user), Some(token)) if !token.is_empty() => Ok(Grant::Session(user, token)),
        _ => Err(ApiError::unexpected_response(None)),
    }
}

pub fn is_valid_otp(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Password login. A server-side refusal is a `Rejected` outcome; only
    /// local validation and transport failures are errors.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        require(email, "Email")?;
        require(password, "Password")?;

        tracing::info!(email = %email, "Logging in");
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };

        let session = self.api.session();
        let grant = match self.api.post_public::<LoginData, _>(&["auth", "login"], &request).await {
            Ok(envelope) => require_data(envelope).and_then(interpret),
            Err(e) => Err(e),
        };

        match grant {
            Ok(Grant::Session(user, token)) => {
                session.establish(user.clone(), token);
                Ok(LoginOutcome::Authenticated(user))
            }
            Ok(Grant::Challenge(challenge)) => {
                tracing::info!("Second factor required");
                session.begin_challenge(challenge);
                Ok(LoginOutcome::NeedsSecondFactor)
            }
            Err(e) if e.kind == ErrorKind::ServerError => {
                tracing::info!(status = ?e.status, "Login rejected: {}", e.message);
                session.abandon_challenge();
                Ok(LoginOutcome::Rejected(e.message))
            }
            Err(e) => Err(AppError::Api(e)),
        }
    }

    /// Submit the one-time code for the pending challenge. `Ok(false)` means
    /// the server refused the code; the challenge is kept so the caller can retry.
    pub async fn verify_second_factor(&self, code: &str) -> AppResult<bool> {
        let session = self.api.session();
        let challenge = session.pending_challenge().ok_or_else(|| {
            AppError::InvalidState("No second-factor challenge is pending".to_string())
        })?;

        let code = code.trim();
        if !is_valid_otp(code) {
            return Err(AppError::Validation(format!(
                "The code must be exactly {} digits",
                OTP_LENGTH
            )));
        }

        let request = VerifyOtpRequest {
            user_id: challenge,
            otp_code: code.to_string(),
        };
        let result = match self.api.post_public::<LoginData, _>(&["auth", "verify-otp"], &request).await {
            Ok(envelope) => require_data(envelope).and_then(interpret),
            Err(e) => Err(e),
        };

        match result {
            Ok(Grant::Session(user, token)) => {
                if session.phase() != Phase::AwaitingSecondFactor {
                    tracing::warn!("Challenge was abandoned while verifying, ignoring grant");
                    return Err(AppError::InvalidState(
                        "The second-factor challenge is no longer pending".to_string(),
                    ));
                }
                session.establish(user, token);
                Ok(true)
            }
            Ok(Grant::Challenge(_)) => {
                tracing::warn!("Verification answered with another challenge");
                Ok(false)
            }
            Err(e) if e.kind == ErrorKind::ServerError => {
                tracing::info!(status = ?e.status, "Second factor rejected: {}", e.message);
                Ok(false)
            }
            Err(e) => Err(AppError::Api(e)),
        }
    }

    /// Exchange the current token for a fresh one and replace the user record
    pub async fn refresh_session(&self) -> AppResult<User> {
        let session = self.api.session();
        if !session.is_authenticated() {
            return Err(AppError::InvalidState("Not logged in".to_string()));
        }

        let data: LoginData = require_data(self.api.post_empty(&["auth", "refresh-token"]).await?)?;
        match interpret(data)? {
            Grant::Session(user, token) => {
                session.establish(user.clone(), token);
                Ok(user)
            }
            Grant::Challenge(_) => Err(ApiError::unexpected_response(None).into()),
        }
    }

    pub fn logout(&self) {
        self.api.session().logout();
    }

    /// Returns the backend's confirmation message
    pub async fn change_password(&self, current: &str, new: &str) -> AppResult<String> {
        require(current, "Current password")?;
        require(new, "New password")?;
        if !self.api.session().is_authenticated() {
            return Err(AppError::InvalidState("Not logged in".to_string()));
        }

        let request = ChangePasswordRequest {
            current_password: current.to_string(),
            new_password: new.to_string(),
        };
        let envelope = self
            .api
            .post::<serde_json::Value, _>(&["auth", "change-password"], &request)
            .await?;
        Ok(envelope.message.unwrap_or_else(|| "Password changed".to_string()))
    }

    /// Returns the backend's confirmation message
    pub async fn forgot_password(&self, email: &str) -> AppResult<String> {
        require(email, "Email")?;

        let request = ForgotPasswordRequest {
            email: email.trim().to_string(),
        };
        let envelope = self
            .api
            .post_public::<serde_json::Value, _>(&["auth", "forgot-password"], &request)
            .await?;
        Ok(envelope
            .message
            .unwrap_or_else(|| "Check your email for reset instructions".to_string()))
    }
}
