use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::placeholder::{placeholder_course, placeholder_lesson};
use crate::relations::{CourseLink, LessonLink};
use crate::setup::FeedDefaults;
use crate::store::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Quiz,
    Question,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Quiz => "quiz",
            ContentType::Question => "question",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizRecord {
    /// Row position in the fetch, counting rows that failed to decode.
    pub position: usize,
    pub id: String,
    pub title: String,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lesson_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRecord {
    pub position: usize,
    pub id: String,
    pub question_text: String,
    pub rsl_video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub quiz_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedContentEntry {
    pub id: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    pub title_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
    pub video_url: String,
    pub description: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub course_title: String,
    pub lesson_title: String,
    pub is_published: bool,
}

fn row_str(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn row_opt_str(row: &Row, key: &str) -> Option<String> {
    row_str(row, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// SQLite hands booleans back as 0/1.
fn row_bool(row: &Row, key: &str) -> Option<bool> {
    match row.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite CURRENT_TIMESTAMP format.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|n| n.and_utc())
}

fn row_time(row: &Row, key: &str) -> Option<DateTime<Utc>> {
    row_str(row, key).as_deref().and_then(parse_timestamp)
}

impl QuizRecord {
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "is_published",
        "lesson_id",
        "created_at",
        "updated_at",
    ];

    pub fn from_row(position: usize, row: &Row) -> Option<Self> {
        let created_at = row_time(row, "created_at")?;
        Some(Self {
            position,
            id: row_opt_str(row, "id")?,
            title: row_str(row, "title")?,
            is_published: row_bool(row, "is_published").unwrap_or(false),
            created_at,
            updated_at: row_time(row, "updated_at").unwrap_or(created_at),
            lesson_id: row_opt_str(row, "lesson_id"),
        })
    }
}

impl QuestionRecord {
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
        "quiz_id",
        "question_text",
        "rsl_video_url",
        "created_at",
    ];

    pub fn from_row(position: usize, row: &Row) -> Option<Self> {
        Some(Self {
            position,
            id: row_opt_str(row, "id")?,
            question_text: row_str(row, "question_text")?,
            rsl_video_url: row_opt_str(row, "rsl_video_url"),
            created_at: row_time(row, "created_at")?,
            quiz_id: row_opt_str(row, "quiz_id")?,
        })
    }
}

/// Decodes raw rows, dropping (and logging) the ones that cannot be read.
pub fn decode_rows<T>(
    table: &str,
    rows: &[Row],
    decode: fn(usize, &Row) -> Option<T>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        match decode(position, row) {
            Some(v) => out.push(v),
            None => {
                let id = row.get("id").and_then(|v| v.as_str()).unwrap_or("?");
                warn!(table, id, position, "skipping malformed record");
            }
        }
    }
    out
}

/// Cuts `text` to at most `max_chars` characters, appending `...` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    let keep = out.trim_end().len();
    out.truncate(keep);
    out.push_str("...");
    out
}

fn relation_titles(
    kind: ContentType,
    index: usize,
    lesson_id: Option<&str>,
    lessons: &HashMap<String, LessonLink>,
    courses: &HashMap<String, CourseLink>,
) -> (String, String) {
    let lesson = lesson_id.and_then(|id| lessons.get(id));
    let course = lesson
        .and_then(|l| l.course_id.as_deref())
        .and_then(|id| courses.get(id));
    let course_title = course
        .map(|c| c.title.clone())
        .unwrap_or_else(|| placeholder_course(kind, index).to_string());
    let lesson_title = lesson
        .map(|l| l.title.clone())
        .unwrap_or_else(|| placeholder_lesson(kind, index).to_string());
    (course_title, lesson_title)
}

/// Published quizzes become feed entries. Placeholders are picked by each
/// record's fetch position, so unpublished and malformed rows still count.
pub fn normalize_quizzes(
    records: &[QuizRecord],
    lessons: &HashMap<String, LessonLink>,
    courses: &HashMap<String, CourseLink>,
    defaults: &FeedDefaults,
) -> Vec<UnifiedContentEntry> {
    records
        .iter()
        .filter(|q| q.is_published)
        .map(|q| {
            let (course_title, lesson_title) = relation_titles(
                ContentType::Quiz,
                q.position,
                q.lesson_id.as_deref(),
                lessons,
                courses,
            );
            UnifiedContentEntry {
                id: format!("{}-{}", ContentType::Quiz.as_str(), q.id),
                content_type: ContentType::Quiz,
                quiz_id: Some(q.id.clone()),
                question_id: None,
                title_text: q.title.clone(),
                secondary_text: None,
                video_url: defaults.default_video_url.clone(),
                description: format!("Sign-language walkthrough for the quiz \"{}\"", q.title),
                enabled: true,
                created_at: q.created_at,
                updated_at: q.updated_at,
                course_title,
                lesson_title,
                is_published: true,
            }
        })
        .collect()
}

/// Questions with their own video whose parent quiz is published. Relations
/// come from the parent quiz's lesson.
pub fn normalize_questions(
    records: &[QuestionRecord],
    quizzes: &HashMap<String, QuizRecord>,
    lessons: &HashMap<String, LessonLink>,
    courses: &HashMap<String, CourseLink>,
    defaults: &FeedDefaults,
) -> Vec<UnifiedContentEntry> {
    let mut out = Vec::new();
    for q in records {
        let Some(video_url) = q.rsl_video_url.as_ref() else {
            continue;
        };
        let Some(quiz) = quizzes.get(&q.quiz_id).filter(|quiz| quiz.is_published) else {
            continue;
        };
        let (course_title, lesson_title) = relation_titles(
            ContentType::Question,
            q.position,
            quiz.lesson_id.as_deref(),
            lessons,
            courses,
        );
        out.push(UnifiedContentEntry {
            id: format!("{}-{}", ContentType::Question.as_str(), q.id),
            content_type: ContentType::Question,
            quiz_id: Some(quiz.id.clone()),
            question_id: Some(q.id.clone()),
            title_text: q.question_text.clone(),
            secondary_text: Some(quiz.title.clone()),
            video_url: video_url.clone(),
            description: excerpt(&q.question_text, defaults.description_max_chars),
            enabled: true,
            created_at: q.created_at,
            updated_at: q.created_at,
            course_title,
            lesson_title,
            is_published: quiz.is_published,
        });
    }
    out
}
