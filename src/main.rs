use std::{path::PathBuf, process, sync::Arc, time::Duration};

use clap::Parser;
use log::{error, info, warn};

use femdown::{
    config::{DownloadOptions, Format, Resolution, Site, DEFAULT_CONCURRENCY},
    course::{Catalog, CourseId, InvalidCourseId},
    download::{HttpDownloader, MediaDownloader},
    retry::retry_forever,
    session::{Session, SessionCache, SessionError},
    stats::DownloadStatistics,
    util::{FetchError, HttpClient, DEFAULT_HTTP_RETRIES},
    worker::{self, WorkerError},
    ytdl::{YtdlDownloader, DEFAULT_PROGRAM},
};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Backend {
    /// Hand videos to yt-dlp
    Ytdl,
    /// Stream videos directly over HTTP
    Direct,
}

/// Downloads purchased Frontend Masters courses
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Course ids or course page URLs
    courses: Vec<String>,
    /// Download every course listed on the courses page
    #[arg(short, long)]
    all: bool,
    #[arg(short, long, value_enum, default_value_t = Format::Mp4)]
    format: Format,
    #[arg(short, long, value_enum, default_value_t = Resolution::Medium)]
    resolution: Resolution,
    /// Directory to save courses in
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
    /// Maximum number of lessons downloaded at once
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
    /// Seconds to wait before retrying a failed download
    #[arg(long, default_value_t = 5)]
    retry_delay: u64,
    /// Cookies of a logged-in browser session (`name=value;name=value`)
    #[arg(long, env = "FEMDOWN_COOKIES", hide_env_values = true)]
    cookies: Option<String>,
    /// File to cache the session in between runs
    #[arg(long, env = "FEMDOWN_SESSION_FILE")]
    session_file: Option<PathBuf>,
    /// Seconds a cached session stays valid
    #[arg(long, default_value_t = 3600)]
    session_max_age: u64,
    #[arg(long, value_enum, default_value_t = Backend::Ytdl)]
    downloader: Backend,
    /// External program used to download videos
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    ytdl_program: String,
    /// Transport retries per HTTP request
    #[arg(long, default_value_t = DEFAULT_HTTP_RETRIES)]
    http_retries: u32,
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    InvalidCourseId(#[from] InvalidCourseId),
    #[error("no courses given, pass course ids or --all")]
    NoCourses,
    #[error("no session, pass --cookies or a fresh --session-file")]
    NoSession,
    #[error("could not create {path}: {source}")]
    InvalidDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    SessionError(#[from] SessionError),
    #[error(transparent)]
    FetchError(#[from] FetchError),
    #[error(transparent)]
    WorkerError(#[from] WorkerError),
}

async fn load_session(args: &Args) -> Result<Session, CliError> {
    let cache = args
        .session_file
        .as_ref()
        .map(|path| SessionCache::new(path, Duration::from_secs(args.session_max_age)));

    let session = match (&args.cookies, &cache) {
        (Some(cookies), _) => Session::new(cookies.as_str()),
        (None, Some(cache)) => cache.load().await?.ok_or(CliError::NoSession)?,
        (None, None) => return Err(CliError::NoSession),
    };

    if !session.is_authenticated() {
        return Err(SessionError::NotAuthenticated.into());
    }
    if let (Some(_), Some(cache)) = (&args.cookies, &cache) {
        cache.store(&session).await?;
    }

    Ok(session)
}

/// Course ids given on the command line. Empty under `--all`, where the
/// positional arguments are ignored.
fn requested_courses(args: &Args) -> Result<Vec<CourseId>, CliError> {
    if args.all {
        if !args.courses.is_empty() {
            warn!("--all given, ignoring {} course arguments", args.courses.len());
        }
        return Ok(Vec::new());
    }

    let courses = args
        .courses
        .iter()
        .map(|s| s.parse::<CourseId>())
        .collect::<Result<Vec<_>, _>>()?;
    if courses.is_empty() {
        return Err(CliError::NoCourses);
    }

    Ok(courses)
}

async fn run(args: Args) -> Result<(), CliError> {
    let courses = requested_courses(&args)?;

    tokio::fs::create_dir_all(&args.dir)
        .await
        .map_err(|source| CliError::InvalidDir {
            path: args.dir.clone(),
            source,
        })?;

    let session = load_session(&args).await?;
    let client = Arc::new(HttpClient::new(Site::default(), &session, args.http_retries)?);
    let retry_delay = Duration::from_secs(args.retry_delay);

    let courses = if args.all {
        let catalog: &HttpClient = &client;
        retry_forever(retry_delay, "listing courses", move || catalog.course_ids()).await?
    } else {
        courses
    };

    let downloader: Box<dyn MediaDownloader> = match args.downloader {
        Backend::Ytdl => Box::new(YtdlDownloader::new(client.clone(), args.ytdl_program.as_str())),
        Backend::Direct => Box::new(HttpDownloader::new(client.clone())),
    };

    let options = DownloadOptions {
        format: args.format,
        resolution: args.resolution,
        root: args.dir.clone(),
        concurrency: args.concurrency,
        retry_delay,
    };
    info!(
        "Downloading {} courses as {} ({}) into {}",
        courses.len(),
        options.format,
        options.resolution,
        options.root.display()
    );

    let stats = DownloadStatistics::new(courses.len());
    let res = worker::start(&*client, &*downloader, &courses, &options, &stats).await;
    stats.finish();
    res?;

    info!("Download complete!");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(args).await {
        error!("{}", err);
        process::exit(1);
    }
}
