use std::path::Path;

use futures::future::try_join_all;
use tokio::{sync::Semaphore, try_join};

use crate::{
    config::DownloadOptions,
    course::{Catalog, CourseId, Lesson},
    download::{DownloadError, MediaDownloader},
    retry::retry_forever,
    stats::DownloadStatistics,
    util::FetchError,
};

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("could not list lessons: {0}")]
    FetchError(#[from] FetchError),
    #[error("could not download lesson: {0}")]
    DownloadError(#[from] DownloadError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("download limiter closed")]
    LimiterClosed(#[from] tokio::sync::AcquireError),
}

/// Downloads every lesson of `courses` into `options.root`, one course at a
/// time, with at most `options.concurrency` downloads in flight.
///
/// Transient failures are retried forever; the first fatal error aborts the
/// whole run.
pub async fn start<C, D>(
    catalog: &C,
    downloader: &D,
    courses: &[CourseId],
    options: &DownloadOptions,
    stats: &DownloadStatistics,
) -> Result<(), WorkerError>
where
    C: Catalog + ?Sized,
    D: MediaDownloader + ?Sized,
{
    let limit = Semaphore::new(options.concurrency.max(1));
    stats.print();

    for course in courses {
        let dir = options.root.join(course.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let lessons = retry_forever(
            options.retry_delay,
            &format!("listing lessons of {}", course),
            move || catalog.lessons(course),
        )
        .await?;
        info!("{}: {} lessons", course, lessons.len());

        try_join_all(
            lessons
                .iter()
                .map(|lesson| download_lesson(catalog, downloader, &limit, &dir, lesson, options, stats)),
        )
        .await?;

        stats.course_done();
    }

    Ok(())
}

async fn download_lesson<C, D>(
    catalog: &C,
    downloader: &D,
    limit: &Semaphore,
    dir: &Path,
    lesson: &Lesson,
    options: &DownloadOptions,
    stats: &DownloadStatistics,
) -> Result<(), WorkerError>
where
    C: Catalog + ?Sized,
    D: MediaDownloader + ?Sized,
{
    let (format, resolution) = (options.format, options.resolution);
    let video_dest = &dir.join(lesson.file_name(format.extension()));
    let subtitle_dest = &dir.join(lesson.file_name("vtt"));

    let video = async {
        let _permit = limit.acquire().await?;
        retry_forever(
            options.retry_delay,
            &format!("downloading video {}", lesson.slug),
            move || async move {
                let url = catalog
                    .video_url(lesson, format, resolution)
                    .await
                    .map_err(DownloadError::from)?;
                downloader.download_video(&url, video_dest).await
            },
        )
        .await?;

        stats.video_done();
        Ok::<_, WorkerError>(())
    };

    let subtitle = async {
        let Some(vtt) = lesson.vtt.as_deref() else {
            return Ok(());
        };

        let _permit = limit.acquire().await?;
        let res = retry_forever(
            options.retry_delay,
            &format!("downloading subtitle {}", lesson.slug),
            move || downloader.download_subtitle(vtt, subtitle_dest),
        )
        .await;

        // Some lessons of a course with subtitles have no track of their own.
        match res {
            Err(DownloadError::FetchError(FetchError::StatusError { status, .. }))
                if status.is_client_error() =>
            {
                warn!("Skipping subtitle of {}: HTTP {}", lesson.slug, status);
            }
            res => res?,
        }

        Ok::<_, WorkerError>(())
    };

    try_join!(video, subtitle)?;
    debug!("Finished lesson {}", lesson.slug);

    Ok(())
}
