use std::{collections::HashMap, fmt, str::FromStr, sync::OnceLock};

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_aux::prelude::*;

use crate::{
    config::{Format, Resolution, Site},
    util::{FetchError, HttpClient},
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("invalid course id: {0:?}")]
pub struct InvalidCourseId(pub String);

/// Short key of a course, the last path segment of its page URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseId(String);

fn course_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|/)([a-z0-9][a-z0-9-]*)/?$").expect("valid course id regex"))
}

impl CourseId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Accepts either a bare id (`react-v8`) or a course URL
/// (`https://frontendmasters.com/courses/react-v8/`).
impl FromStr for CourseId {
    type Err = InvalidCourseId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        course_id_regex()
            .captures(s.trim())
            .and_then(|c| c.get(1))
            .map(|m| CourseId(m.as_str().to_string()))
            .ok_or_else(|| InvalidCourseId(s.to_string()))
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One video (and optional subtitle) within a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lesson {
    /// Base URL of the lesson's video source endpoint.
    pub src: String,
    pub slug: String,
    pub index: u32,
    pub vtt: Option<String>,
}

impl Lesson {
    /// `<index>_<slug>.<extension>`, with the index zero-padded so files sort
    /// in lesson order.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{:03}_{}.{}", self.index, self.slug, extension)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseResponse {
    lesson_data: LessonData,
    #[serde(deserialize_with = "deserialize_string_from_number")]
    date_published: String,
    #[serde(default, rename = "hasWebVTT")]
    has_web_vtt: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LessonData {
    Keyed(HashMap<String, RawLesson>),
    Listed(Vec<RawLesson>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLesson {
    source_base: String,
    slug: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    index: u32,
}

#[derive(Debug, Deserialize)]
struct VideoSource {
    url: Option<String>,
    message: Option<String>,
}

/// Parses the lesson metadata of `course_id` into descriptors sorted by index.
pub fn parse_lessons(site: &Site, course_id: &CourseId, json: &str) -> Result<Vec<Lesson>, serde_json::Error> {
    let resp: CourseResponse = serde_json::from_str(json)?;
    Ok(lessons_from_response(site, course_id, resp))
}

fn lessons_from_response(site: &Site, course_id: &CourseId, resp: CourseResponse) -> Vec<Lesson> {
    let mut raw = match resp.lesson_data {
        LessonData::Keyed(map) => map.into_values().collect::<Vec<_>>(),
        LessonData::Listed(list) => list,
    };
    raw.sort_by_key(|l| l.index);

    raw.into_iter()
        .map(|l| Lesson {
            vtt: resp.has_web_vtt.then(|| {
                site.subtitle_url(&resp.date_published, course_id.as_str(), l.index, &l.slug)
            }),
            src: l.source_base,
            slug: l.slug,
            index: l.index,
        })
        .collect()
}

/// Returns the ids of the courses listed on the courses page, in page order.
pub fn parse_course_ids(html: &str) -> Vec<CourseId> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(".MediaItem").expect("valid selector");

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("id"))
        .filter_map(|id| match id.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Skipping course: {}", e);
                None
            }
        })
        .collect()
}

pub fn video_source_url(lesson: &Lesson, format: Format, resolution: Resolution) -> String {
    format!(
        "{}/source?r={}&f={}",
        lesson.src.trim_end_matches('/'),
        resolution.lines(),
        format.extension()
    )
}

/// Where course and lesson metadata come from.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn course_ids(&self) -> Result<Vec<CourseId>, FetchError>;

    /// Lessons of a course in ascending `index` order.
    async fn lessons(&self, course_id: &CourseId) -> Result<Vec<Lesson>, FetchError>;

    /// Resolves the downloadable URL of a lesson video.
    async fn video_url(
        &self,
        lesson: &Lesson,
        format: Format,
        resolution: Resolution,
    ) -> Result<String, FetchError>;
}

#[async_trait]
impl Catalog for HttpClient {
    async fn course_ids(&self) -> Result<Vec<CourseId>, FetchError> {
        let html = self.fetch_text(&self.site().courses_url()).await?;
        let ids = parse_course_ids(&html);
        info!("Found {} courses", ids.len());
        Ok(ids)
    }

    async fn lessons(&self, course_id: &CourseId) -> Result<Vec<Lesson>, FetchError> {
        let resp: CourseResponse = self
            .fetch_json(&self.site().course_url(course_id.as_str()))
            .await?;
        Ok(lessons_from_response(self.site(), course_id, resp))
    }

    async fn video_url(
        &self,
        lesson: &Lesson,
        format: Format,
        resolution: Resolution,
    ) -> Result<String, FetchError> {
        let source: VideoSource = self
            .fetch_json(&video_source_url(lesson, format, resolution))
            .await?;

        match source {
            VideoSource {
                message: Some(message),
                ..
            } => Err(FetchError::Rejected(message)),
            VideoSource { url: Some(url), .. } => Ok(url),
            VideoSource { .. } => Err(FetchError::Rejected(format!(
                "no url for lesson {}",
                lesson.slug
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_file(fname: &str) -> String {
        let mut d = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("resources/test/");
        d.push(fname);
        std::fs::read_to_string(d).expect(format!("Could not read {}", fname).as_str())
    }

    #[test]
    fn course_id_from_input() {
        let id: CourseId = "https://frontendmasters.com/courses/intermediate-gatsby/"
            .parse()
            .unwrap();
        assert_eq!(id.as_str(), "intermediate-gatsby");

        let id: CourseId = "client-graphql-react".parse().unwrap();
        assert_eq!(id.as_str(), "client-graphql-react");

        let id: CourseId = "/react-v8".parse().unwrap();
        assert_eq!(id.as_str(), "react-v8");

        assert!("Not A Course".parse::<CourseId>().is_err());
        assert!("https://frontendmasters.com/courses/React/".parse::<CourseId>().is_err());
        assert!("".parse::<CourseId>().is_err());
    }

    #[test]
    fn lessons_sorted_by_index() {
        let site = Site::default();
        let id: CourseId = "client-graphql-react".parse().unwrap();
        let lessons = parse_lessons(&site, &id, &get_test_file("course.json"))
            .expect("Could not parse lessons");

        assert_eq!(lessons.len(), 4, "Lesson count is not correct");
        assert_eq!(
            lessons.iter().map(|l| l.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 10],
            "Lessons are not in index order"
        );
        assert_eq!(lessons[0].slug, "introduction");
        assert_eq!(
            lessons[0].src,
            "https://api.frontendmasters.com/v1/kabuki/video/vCrTmVpgni"
        );
        assert_eq!(
            lessons[2].vtt.as_deref(),
            Some("https://static.frontendmasters.com/assets/courses/2019-09-10-client-graphql-react/2-queries.vtt")
        );
    }

    #[test]
    fn lessons_without_subtitles() {
        let site = Site::default();
        let id: CourseId = "react".parse().unwrap();
        let lessons = parse_lessons(&site, &id, &get_test_file("course_no_vtt.json"))
            .expect("Could not parse lessons");

        assert_eq!(lessons.len(), 2);
        assert_eq!(lessons[0].index, 1, "Index given as string was not parsed");
        assert!(lessons.iter().all(|l| l.vtt.is_none()), "Subtitle found");
    }

    #[test]
    fn course_ids_from_page() {
        let ids = parse_course_ids(&get_test_file("courses.html"));
        assert_eq!(
            ids.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
            vec!["react", "vue", "intermediate-gatsby"]
        );
    }

    #[test]
    fn lesson_file_name() {
        let lesson = Lesson {
            src: "https://example.com/video/abc".to_string(),
            slug: "introduction".to_string(),
            index: 7,
            vtt: None,
        };
        assert_eq!(lesson.file_name("webm"), "007_introduction.webm");
        assert_eq!(
            video_source_url(&lesson, Format::Webm, Resolution::High),
            "https://example.com/video/abc/source?r=1080&f=webm"
        );
    }
}
