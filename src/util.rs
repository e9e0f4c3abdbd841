use std::{ffi::OsString, path::Path, sync::Arc};

use reqwest::{header, StatusCode};
use reqwest_cookie_store::CookieStoreMutex;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    config::Site,
    retry::Transient,
    session::{Session, SessionError},
};

/// Transport-level retries done by the middleware before an error reaches
/// the caller.
pub const DEFAULT_HTTP_RETRIES: u32 = 3;

pub struct HttpClient {
    pub client: ClientWithMiddleware,
    pub cookies: Arc<CookieStoreMutex>,
    site: Site,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("invalid response from {url}: {source}")]
    JsonError {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("not logged in, {0} refused the session")]
    Unauthorized(String),
    #[error("HTTP {status} from {url}")]
    StatusError { url: String, status: StatusCode },
    #[error("video source unavailable: {0}")]
    Rejected(String),
    #[error("session error: {0}")]
    SessionError(#[from] SessionError),
}

fn is_transient_reqwest(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::ReqwestError(e) => is_transient_reqwest(e),
            FetchError::ReqwestMiddlewareError(reqwest_middleware::Error::Reqwest(e)) => {
                is_transient_reqwest(e)
            }
            FetchError::ReqwestMiddlewareError(reqwest_middleware::Error::Middleware(_)) => true,
            FetchError::StatusError { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::Rejected(_) => true,
            FetchError::IoError(_)
            | FetchError::JsonError { .. }
            | FetchError::Unauthorized(_)
            | FetchError::SessionError(_) => false,
        }
    }
}

impl HttpClient {
    pub fn new(site: Site, session: &Session, max_retries: u32) -> Result<HttpClient, FetchError> {
        let cookies = Arc::new(CookieStoreMutex::default());
        session.install(&cookies, &site.home)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(HttpClient {
            client,
            cookies,
            site,
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Sends an authenticated GET and rejects responses that are not a
    /// success or that landed on the login page.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(header::REFERER, self.site.referer())
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::StatusError {
                url: url.to_string(),
                status,
            });
        }
        if self.site.is_on_site(resp.url().as_str()) && self.site.is_login_url(resp.url().as_str())
        {
            return Err(FetchError::Unauthorized(url.to_string()));
        }

        Ok(resp)
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.get(url).await?.text().await.map_err(|e| e.into())
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let body = self.fetch_text(url).await?;
        serde_json::from_str(&body).map_err(|source| FetchError::JsonError {
            url: url.to_string(),
            source,
        })
    }

    /// Streams `url` into `path`, replacing whatever is there. Returns the
    /// number of bytes written.
    pub async fn download_file(&self, url: &str, path: &Path) -> Result<u64, FetchError> {
        let mut resp = self.get(url).await?;

        let mut temp_path = OsString::from(path.as_os_str());
        temp_path.push(".tmp");

        let written = async {
            let mut file = File::create(&temp_path).await?;
            let mut size = 0;

            while let Some(chunk) = resp.chunk().await? {
                file.write_all(&chunk).await?;
                size += chunk.len() as u64;
            }

            file.flush().await?;
            drop(file);
            tokio::fs::rename(&temp_path, path).await?;
            Ok::<_, FetchError>(size)
        }
        .await;

        match written {
            Ok(size) => {
                trace!("Wrote {} bytes to {}", size, path.display());
                Ok(size)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&temp_path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove {:?}: {}", temp_path, rm);
                    }
                }
                Err(e)
            }
        }
    }
}
