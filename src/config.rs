use std::{fmt, path::PathBuf, sync::OnceLock, time::Duration};

use regex::Regex;
use reqwest::Url;

/// Default number of lessons downloaded at the same time.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Default delay between two attempts of a failing network operation.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Mp4,
    Webm,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Mp4 => "mp4",
            Format::Webm => "webm",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Resolution {
    Low,
    Medium,
    High,
}

impl Resolution {
    /// Vertical resolution requested from the video source endpoint.
    pub fn lines(&self) -> u32 {
        match self {
            Resolution::Low => 360,
            Resolution::Medium => 720,
            Resolution::High => 1080,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Low => f.write_str("low"),
            Resolution::Medium => f.write_str("medium"),
            Resolution::High => f.write_str("high"),
        }
    }
}

/// Base URLs of the course website. Overridable so the client can be pointed
/// at another host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub home: String,
    pub api: String,
    pub assets: String,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            home: "https://frontendmasters.com".to_string(),
            api: "https://api.frontendmasters.com".to_string(),
            assets: "https://static.frontendmasters.com/assets".to_string(),
        }
    }
}

fn login_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"login/?$").expect("valid login regex"))
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

impl Site {
    /// Creates a site whose pages, API and assets are all served from `base`.
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            home: base.to_string(),
            api: base.to_string(),
            assets: format!("{}/assets", base),
        }
    }

    pub fn home_url(&self) -> Option<Url> {
        Url::parse(&self.home).ok()
    }

    pub fn login_url(&self) -> String {
        format!("{}/login/", self.home)
    }

    pub fn courses_url(&self) -> String {
        format!("{}/courses/", self.home)
    }

    pub fn course_url(&self, course_id: &str) -> String {
        format!("{}/v1/kabuki/courses/{}", self.api, course_id)
    }

    pub fn subtitle_url(&self, date_published: &str, course_id: &str, index: u32, slug: &str) -> String {
        format!(
            "{}/courses/{}-{}/{}-{}.vtt",
            self.assets, date_published, course_id, index, slug
        )
    }

    pub fn referer(&self) -> String {
        format!("{}/", self.home)
    }

    /// Whether `url` points at the site's home host, with or without `www.`.
    pub fn is_on_site(&self, url: &str) -> bool {
        let (Some(home), Ok(url)) = (self.home_url(), Url::parse(url)) else {
            return false;
        };
        match (home.host_str(), url.host_str()) {
            (Some(a), Some(b)) => strip_www(a) == strip_www(b) && home.port() == url.port(),
            _ => false,
        }
    }

    pub fn is_login_url(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(url) => login_path_regex().is_match(url.path()),
            Err(_) => login_path_regex().is_match(url),
        }
    }
}

/// Everything the download worker needs to know about what to fetch and where
/// to put it.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub format: Format,
    pub resolution: Resolution,
    /// Root directory; each course gets its own subdirectory.
    pub root: PathBuf,
    /// Upper bound on lesson downloads in flight.
    pub concurrency: usize,
    pub retry_delay: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: Format::Mp4,
            resolution: Resolution::Medium,
            root: PathBuf::from("."),
            concurrency: DEFAULT_CONCURRENCY,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}
