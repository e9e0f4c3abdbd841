use std::{
    io::Write,
    sync::atomic::{AtomicUsize, Ordering},
};

pub struct DownloadStatistics {
    courses_total: usize,
    courses_downloaded: AtomicUsize,
    videos_downloaded: AtomicUsize,
    visible: bool,
}

impl DownloadStatistics {
    pub fn new(courses_total: usize) -> Self {
        Self {
            courses_total,
            courses_downloaded: AtomicUsize::new(0),
            videos_downloaded: AtomicUsize::new(0),
            visible: true,
        }
    }

    /// Counts without printing anything.
    pub fn hidden(courses_total: usize) -> Self {
        Self {
            visible: false,
            ..Self::new(courses_total)
        }
    }

    pub fn courses_total(&self) -> usize {
        self.courses_total
    }

    pub fn courses_downloaded(&self) -> usize {
        self.courses_downloaded.load(Ordering::Relaxed)
    }

    pub fn videos_downloaded(&self) -> usize {
        self.videos_downloaded.load(Ordering::Relaxed)
    }

    pub fn video_done(&self) {
        self.videos_downloaded.fetch_add(1, Ordering::Relaxed);
        self.print();
    }

    pub fn course_done(&self) {
        self.courses_downloaded.fetch_add(1, Ordering::Relaxed);
        self.print();
    }

    pub fn print(&self) {
        if !self.visible {
            return;
        }
        print!(
            "\x1b[2K\rdownloading.. [{}/{}, videos: {}]",
            self.courses_downloaded(),
            self.courses_total,
            self.videos_downloaded()
        );
        let _ = std::io::stdout().lock().flush();
    }

    /// Ends the status line.
    pub fn finish(&self) {
        if self.visible {
            println!();
        }
    }
}
