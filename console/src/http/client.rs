//! HTTP client implementation

use openapi_client::ErrorBody;
use reqwest::{header, multipart, Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::errors::ConsoleError;

/// HTTP client for control-plane communication
pub struct HttpClient {
    client: Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, api_token: Option<SecretString>) -> Result<Self, ConsoleError> {
        let client = Client::builder()
            .user_agent(concat!("persephone/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ConsoleError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);

        let request = self.authorize(self.client.get(&url).query(query));
        let response = request.send().await?;
        Self::handle_response("GET", &url, response).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ConsoleError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} {:?}", url, query);

        let request = self.authorize(self.client.post(&url).query(query));
        let response = request.send().await?;
        Self::handle_response("POST", &url, response).await
    }

    /// Make a multipart POST carrying a single file field
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        file_name: String,
        contents: Vec<u8>,
    ) -> Result<T, ConsoleError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} (multipart, {} bytes)", url, contents.len());

        let part = multipart::Part::bytes(contents).file_name(file_name);
        let form = multipart::Form::new().part(field.to_string(), part);

        let request = self.authorize(self.client.post(&url).multipart(form));
        let response = request.send().await?;
        Self::handle_response("POST", &url, response).await
    }

    /// Apply the error convention: any non-success status becomes
    /// `ConsoleError::Api` with the body's message or a generic one.
    async fn handle_response<T: DeserializeOwned>(
        method: &str,
        url: &str,
        response: Response,
    ) -> Result<T, ConsoleError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(ErrorBody::into_message);
            error!(
                "HTTP {} {} failed: {} - {}",
                method,
                url,
                status,
                String::from_utf8_lossy(&body)
            );
            return Err(ConsoleError::api(status.as_u16(), message));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}
