//! Outbound request construction for the GymMaster backend.
//!
//! Every backend call goes through [`ApiClient`]: it attaches the bearer token
//! held by the session, decodes the response envelope and reduces any failure
//! to an [`ApiError`]. A 401 on a request that carried a token clears the
//! session before the error is returned.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{ApiEnvelope, ErrorBody};

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> ApiResult<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| ApiError::unknown(format!("Invalid base URL {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::unknown(format!("Invalid base URL {}", config.base_url)));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::unknown(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for `segments` below the base URL; each segment is encoded
    pub fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::unknown("Base URL cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> ApiResult<(RequestBuilder, Option<String>)> {
        self.request_with(method, segments, self.session.token())
    }

    fn request_with(
        &self,
        method: Method,
        segments: &[&str],
        token: Option<String>,
    ) -> ApiResult<(RequestBuilder, Option<String>)> {
        let url = self.endpoint(segments)?;
        tracing::debug!(method = %method, url = %url, has_token = token.is_some(), "API request");

        let mut builder = self.http.request(method, url);
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        Ok((builder, token))
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> ApiResult<ApiEnvelope<T>> {
        let (builder, token) = self.request(Method::GET, segments)?;
        self.dispatch(builder, token).await
    }

    pub async fn get_with_query<T, Q>(&self, segments: &[&str], query: &Q) -> ApiResult<ApiEnvelope<T>>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let (builder, token) = self.request(Method::GET, segments)?;
        self.dispatch(builder.query(query), token).await
    }

    pub async fn post<T, B>(&self, segments: &[&str], body: &B) -> ApiResult<ApiEnvelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let (builder, token) = self.request(Method::POST, segments)?;
        self.dispatch(builder.json(body), token).await
    }

    /// POST without the bearer token. A 401 here is about the submitted
    /// credentials and never touches the session.
    pub async fn post_public<T, B>(&self, segments: &[&str], body: &B) -> ApiResult<ApiEnvelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let (builder, token) = self.request_with(Method::POST, segments, None)?;
        self.dispatch(builder.json(body), token).await
    }

    /// POST without a request body
    pub async fn post_empty<T: DeserializeOwned>(&self, segments: &[&str]) -> ApiResult<ApiEnvelope<T>> {
        let (builder, token) = self.request(Method::POST, segments)?;
        self.dispatch(builder, token).await
    }

    pub async fn put<T, B>(&self, segments: &[&str], body: &B) -> ApiResult<ApiEnvelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let (builder, token) = self.request(Method::PUT, segments)?;
        self.dispatch(builder.json(body), token).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, segments: &[&str]) -> ApiResult<ApiEnvelope<T>> {
        let (builder, token) = self.request(Method::DELETE, segments)?;
        self.dispatch(builder, token).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        token: Option<String>,
    ) -> ApiResult<ApiEnvelope<T>> {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Request failed without a response: {}", e);
                return Err(ApiError::from(e));
            }
        };

        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await.map_err(|e| {
            tracing::warn!(url = %url, status = status.as_u16(), "Failed to read response body: {}", e);
            ApiError::network()
        })?;

        if status == StatusCode::UNAUTHORIZED {
            if let Some(token) = &token {
                self.session.expire(token);
            }
        }

        if !status.is_success() {
            let err = ApiError::from_response(Some(status.as_u16()), body_message(&body));
            tracing::warn!(url = %url, status = status.as_u16(), message = %err.message, "API error response");
            return Err(err);
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(url = %url, status = status.as_u16(), "Response did not match schema: {}", e);
            ApiError::unexpected_response(Some(status.as_u16()))
        })?;

        if !envelope.success {
            let err = ApiError::from_response(
                Some(status.as_u16()),
                envelope.message.clone().or_else(|| envelope.error.clone()),
            );
            tracing::warn!(url = %url, status = status.as_u16(), message = %err.message, "API reported failure");
            return Err(err);
        }

        tracing::debug!(url = %url, status = status.as_u16(), "API response");
        Ok(envelope)
    }

    /// Probe the backend's health endpoint
    pub async fn health(&self) -> ApiResult<()> {
        let url = self.endpoint(&["health"])?;
        let response = self.http.get(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::from_response(Some(response.status().as_u16()), None))
        }
    }
}

fn body_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.trim().is_empty())
}

/// Extract the required `data` of a successful envelope
pub fn require_data<T>(envelope: ApiEnvelope<T>) -> ApiResult<T> {
    envelope.data.ok_or_else(|| ApiError::unexpected_response(None))
}
