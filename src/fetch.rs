//! HTTP plumbing shared by the feed loader and the item processor.
//!
//! One [`reqwest::Client`] is built per run with a fixed user agent and a
//! per-request timeout. There is no retry here: a failed download is
//! recorded against the artifact and the pipeline moves on.

use futures::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(StatusCode),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    Transport(String),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout(err.to_string());
        }
        if let Some(status) = err.status() {
            return FetchError::Status(status);
        }
        FetchError::Transport(err.to_string())
    }
}

/// Build the shared client: fixed user agent, `Accept: */*`, request timeout.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(FetchError::from)
}

async fn get_ok(client: &Client, url: &str) -> Result<reqwest::Response, FetchError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }
    Ok(response)
}

/// GET `url` and return the body as text. Non-2xx statuses are errors.
#[instrument(level = "debug", skip(client))]
pub async fn download_html(client: &Client, url: &str) -> Result<String, FetchError> {
    let body = get_ok(client, url).await?.text().await?;
    debug!(bytes = body.len(), "Downloaded HTML");
    Ok(body)
}

/// Stream `url` into `path` chunk by chunk and return the byte count.
///
/// The file is only created once the server has answered 2xx. If the body
/// fails midway the partial file is removed.
#[instrument(level = "debug", skip(client), fields(path = %path.display()))]
pub async fn download_to_file(client: &Client, url: &str, path: &Path) -> Result<u64, FetchError> {
    let response = get_ok(client, url).await?;

    let write_err = |source: io::Error| FetchError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;

    let result: Result<u64, FetchError> = async {
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;
        Ok(written)
    }
    .await;

    match result {
        Ok(written) => {
            debug!(bytes = written, "Saved download");
            Ok(written)
        }
        Err(e) => {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(path).await {
                warn!(error = %rm, "Could not remove partial download");
            }
            Err(e)
        }
    }
}
