use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest_cookie_store::CookieStoreMutex;
use serde::{Deserialize, Serialize};

/// Name fragment of the cookie the site sets once a user is logged in.
pub const AUTH_COOKIE: &str = "wordpress_logged_in";

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("invalid session file: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("session is not logged in (no {AUTH_COOKIE} cookie)")]
    NotAuthenticated,
    #[error("invalid site url: {0}")]
    InvalidUrl(String),
    #[error("cookie rejected: {0}")]
    CookieError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Authenticated cookie set, serialized as `name=value;name=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    cookies: String,
}

impl Session {
    pub fn new(cookies: impl Into<String>) -> Self {
        Self {
            cookies: cookies.into(),
        }
    }

    pub fn from_cookies(cookies: &[Cookie]) -> Self {
        let cookies = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join(";");
        Self { cookies }
    }

    pub fn as_str(&self) -> &str {
        &self.cookies
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .map(|(name, value)| (name.trim(), value.trim()))
            .filter(|(name, _)| !name.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.pairs().any(|(name, _)| name.contains(AUTH_COOKIE))
    }

    /// Stores every cookie of the session in `store` so that requests to
    /// `home` and its subdomains carry them.
    pub fn install(&self, store: &CookieStoreMutex, home: &str) -> Result<(), SessionError> {
        let url = Url::parse(home).map_err(|_| SessionError::InvalidUrl(home.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| SessionError::InvalidUrl(home.to_string()))?;

        // Hosts without a registrable domain only get host-only cookies.
        let domain = if host.contains('.') && host.parse::<std::net::IpAddr>().is_err() {
            Some(host.strip_prefix("www.").unwrap_or(host).to_string())
        } else {
            None
        };
        debug!("Installing session cookies for {}", host);

        let mut store = store
            .lock()
            .map_err(|_| SessionError::CookieError("cookie store poisoned".to_string()))?;
        for (name, value) in self.pairs() {
            let raw = match &domain {
                Some(domain) => format!("{}={}; Domain={}; Path=/", name, value, domain),
                None => format!("{}={}; Path=/", name, value),
            };
            if let Err(e) = store.parse(&raw, &url) {
                warn!("Skipping cookie {}: {}", name, e);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    cookies: Session,
    saved_at: DateTime<Utc>,
}

/// A session saved on disk, reused while younger than `max_age`.
pub struct SessionCache {
    path: PathBuf,
    max_age: Duration,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub async fn load(&self) -> Result<Option<Session>, SessionError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&self.path).await?;
        let cached: CachedSession = serde_json::from_str(&json)?;
        let expired = (Utc::now() - cached.saved_at)
            .to_std()
            .map(|age| age > self.max_age)
            .unwrap_or(false);

        if expired {
            info!("Cached session in {} has expired", self.path.display());
            return Ok(None);
        }

        Ok(Some(cached.cookies))
    }

    pub async fn store(&self, session: &Session) -> Result<(), SessionError> {
        let cached = CachedSession {
            cookies: session.clone(),
            saved_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&cached)?).await?;
        debug!("Saved session to {}", self.path.display());

        Ok(())
    }
}
