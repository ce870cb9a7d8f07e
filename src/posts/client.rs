use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::cache::QueryError;
use crate::config::ApiConfig;
use crate::posts::types::{NewPost, Post};

const READ_ERROR: &str = "Error fetching data";
const CREATE_ERROR: &str = "Error creating post";

/// Client for the posts REST service
#[derive(Debug, Clone)]
pub struct PostClient {
  http: Client,
  base: Url,
}

impl PostClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let mut base = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API URL {}: {}", config.base_url, e))?;
    // Relative joins replace the last path segment unless it ends in '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let mut builder = Client::builder().user_agent(Self::user_agent());
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  pub fn user_agent() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
  }

  /// Host shown in the header
  pub fn host(&self) -> &str {
    self.base.host_str().unwrap_or("localhost")
  }

  fn url(&self, path: &str) -> Result<Url, QueryError> {
    self
      .base
      .join(path)
      .map_err(|e| QueryError::Transport(e.to_string()))
  }

  /// `GET /posts`
  pub async fn list_posts(&self) -> Result<Vec<Post>, QueryError> {
    let url = self.url("posts")?;
    debug!(%url, "listing posts");
    let resp = self.http.get(url).send().await.map_err(transport)?;
    read_json(resp, READ_ERROR).await
  }

  /// `GET /posts/{id}`
  pub async fn get_post(&self, id: u64) -> Result<Post, QueryError> {
    let url = self.url(&format!("posts/{}", id))?;
    debug!(%url, "getting post");
    let resp = self.http.get(url).send().await.map_err(transport)?;
    read_json(resp, READ_ERROR).await
  }

  /// `POST /posts`
  pub async fn create_post(&self, post: &NewPost) -> Result<Post, QueryError> {
    let url = self.url("posts")?;
    debug!(%url, title = %post.title, "creating post");
    let resp = self
      .http
      .post(url)
      .json(post)
      .send()
      .await
      .map_err(transport)?;
    read_json(resp, CREATE_ERROR).await
  }
}

fn transport(err: reqwest::Error) -> QueryError {
  QueryError::Transport(err.to_string())
}

/// Any 2xx decodes as `T`; everything else becomes `message` with the status.
async fn read_json<T: DeserializeOwned>(resp: Response, message: &str) -> Result<T, QueryError> {
  let status = resp.status();
  if !status.is_success() {
    warn!(%status, url = %resp.url(), "request failed");
    return Err(QueryError::status(status.as_u16(), message));
  }
  resp.json::<T>().await.map_err(transport)
}
