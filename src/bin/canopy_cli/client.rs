#![deny(clippy::all, clippy::pedantic)]

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {status} {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
        hint: Option<String>,
    },
    #[error("unexpected response body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("could not render output: {0}")]
    Render(#[source] serde_json::Error),
    #[error("could not write output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    hint: Option<String>,
}

/// Thin wrapper binding a reqwest client to the service root.
#[derive(Clone, Debug)]
pub struct Ctx {
    client: Client,
    base: Url,
}

impl Ctx {
    pub fn new(base_url: &str) -> Result<Self, CliError> {
        let base = Url::parse(base_url)?.join("/")?;
        let client = Client::builder()
            .user_agent(concat!("canopy-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, CliError> {
        let mut url = self.base.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CliError> {
        let url = self.endpoint(path, query)?;
        decode(self.client.get(url)).await
    }

    pub async fn send<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, CliError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path, &[])?;
        decode(self.client.request(method, url).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), CliError> {
        let url = self.endpoint(path, &[])?;
        let response = self.client.delete(url).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        Err(api_error(status, &response.bytes().await?))
    }
}

async fn decode<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CliError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(api_error(status, &body));
    }
    serde_json::from_slice(&body).map_err(CliError::Decode)
}

fn api_error(status: StatusCode, body: &[u8]) -> CliError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => CliError::Api {
            status,
            code: error.code,
            message: error.message,
            hint: error.hint,
        },
        Err(_) => CliError::Api {
            status,
            code: "unknown".to_string(),
            message: String::from_utf8_lossy(body).trim().to_string(),
            hint: None,
        },
    }
}
