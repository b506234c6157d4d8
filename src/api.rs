use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use url::Url;

pub const CATEGORIES_BASE: &str = "https://api.n-sfw.com";
pub const IMAGES_BASE: &str = "https://api-random.n-sfw.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    #[default]
    Sfw,
    Nsfw,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Sfw => "sfw",
            Classification::Nsfw => "nsfw",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Classification::Sfw => "SFW",
            Classification::Nsfw => "NSFW",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Classification::Sfw => Classification::Nsfw,
            Classification::Nsfw => Classification::Sfw,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sfw" => Ok(Classification::Sfw),
            "nsfw" => Ok(Classification::Nsfw),
            other => bail!("unknown classification {other:?} (expected sfw or nsfw)"),
        }
    }
}

/// Categories known to the remote service, one ordered list per classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySet {
    #[serde(default)]
    pub sfw: Vec<String>,
    #[serde(default)]
    pub nsfw: Vec<String>,
}

impl CategorySet {
    pub fn is_empty(&self) -> bool {
        self.sfw.is_empty() && self.nsfw.is_empty()
    }

    pub fn total(&self) -> usize {
        self.sfw.len() + self.nsfw.len()
    }

    pub fn list(&self, classification: Classification) -> &[String] {
        match classification {
            Classification::Sfw => &self.sfw,
            Classification::Nsfw => &self.nsfw,
        }
    }

    /// Maps an index into `sfw ++ nsfw` back to the list it came from.
    pub fn entry(&self, index: usize) -> Option<(Classification, &str)> {
        if let Some(name) = self.sfw.get(index) {
            return Some((Classification::Sfw, name.as_str()));
        }
        self.nsfw
            .get(index.checked_sub(self.sfw.len())?)
            .map(|name| (Classification::Nsfw, name.as_str()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sfw.iter().chain(self.nsfw.iter()).any(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub url: String,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Deserialize)]
struct RawImage {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CategoryError {
    #[error("could not reach category service: {0}")]
    Network(String),
    #[error("category request failed with status {0}")]
    Status(u16),
    #[error("category list was not understood: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Categories are still loading. Please wait a moment and try again.")]
    CategoriesUnavailable,
    #[error("could not reach image service: {0}")]
    Network(String),
    #[error("image request failed with status {0}")]
    Status(u16),
    #[error("invalid data format: {0}")]
    InvalidFormat(String),
    #[error("could not display image: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub categories_base: String,
    pub images_base: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    categories_base: Url,
    images_base: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api client user agent required");
        }

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()
                .context("build api http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            categories_base: parse_base(&config.categories_base)
                .context("parse categories base url")?,
            images_base: parse_base(&config.images_base).context("parse images base url")?,
        })
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn categories_url(&self) -> Url {
        join_segments(&self.categories_base, &["endpoints"])
    }

    pub fn image_url(&self, classification: Classification, category: &str) -> Url {
        join_segments(&self.images_base, &[classification.as_str(), category])
    }

    pub fn categories(&self) -> std::result::Result<CategorySet, CategoryError> {
        let url = self.categories_url();
        tracing::debug!(%url, "requesting categories");
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|err| CategoryError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CategoryError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .map_err(|err| CategoryError::Network(err.to_string()))?;
        serde_json::from_slice(&body).map_err(|err| CategoryError::Parse(err.to_string()))
    }

    pub fn random_image(
        &self,
        classification: Classification,
        category: &str,
    ) -> std::result::Result<ImageDescriptor, FetchError> {
        let url = self.image_url(classification, category);
        tracing::debug!(%url, "requesting random image");
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|err| FetchError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        parse_image(&body)
    }
}

fn parse_image(body: &[u8]) -> std::result::Result<ImageDescriptor, FetchError> {
    let raw: RawImage = serde_json::from_slice(body)
        .map_err(|_| FetchError::InvalidFormat("expected a JSON object".into()))?;
    match raw.url {
        Some(url) if !url.trim().is_empty() => Ok(ImageDescriptor {
            url,
            file: raw.file.filter(|f| !f.is_empty()),
        }),
        _ => Err(FetchError::InvalidFormat("response has no url".into())),
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid base url {raw:?}"))?;
    if url.cannot_be_a_base() {
        bail!("{raw:?} cannot be used as a base url");
    }
    Ok(url)
}

fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
