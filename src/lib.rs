//! # femdown
//!
//! This crate downloads the lessons of purchased Frontend Masters courses:
//! every lesson video, plus its WebVTT subtitle track when the course has one.
//!
//! ## Usage
//!
//! You need the cookies of a logged-in browser session. The lesson listing and
//! video source resolution go through [`util::HttpClient`], the videos
//! themselves are handed to `yt-dlp`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use femdown::{
//!     config::{DownloadOptions, Site},
//!     course::CourseId,
//!     session::Session,
//!     stats::DownloadStatistics,
//!     util::{self, HttpClient},
//!     worker,
//!     ytdl::{self, YtdlDownloader},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     // Cookies copied from a browser that is logged in
//!     let session = Session::new("wordpress_logged_in_...=...");
//!
//!     // HttpClient wraps reqwest::Client with the session cookies and a
//!     // middleware for retrying transient errors
//!     let client = Arc::new(
//!         HttpClient::new(Site::default(), &session, util::DEFAULT_HTTP_RETRIES).unwrap(),
//!     );
//!     let downloader = YtdlDownloader::new(client.clone(), ytdl::DEFAULT_PROGRAM);
//!
//!     // Download a course into ./react-v8
//!     let courses: Vec<CourseId> = vec!["react-v8".parse().unwrap()];
//!     let stats = DownloadStatistics::new(courses.len());
//!     worker::start(&*client, &downloader, &courses, &DownloadOptions::default(), &stats)
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! Network failures are retried forever with a fixed delay, see
//! [`retry::retry_forever`]. Anything else (a refused session, an unknown
//! course) stops the run.

#![forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod config;
pub mod course;
pub mod download;
pub mod login;
pub mod retry;
pub mod session;
pub mod stats;
pub mod util;
pub mod worker;
pub mod ytdl;
