use serde::Serialize;
use std::collections::HashMap;

use crate::content::{ContentType, UnifiedContentEntry};

/// Newest first. `sort_by` is stable, so entries sharing a timestamp keep
/// their input order (quizzes before questions).
pub fn build_feed(
    quiz_entries: Vec<UnifiedContentEntry>,
    question_entries: Vec<UnifiedContentEntry>,
) -> Vec<UnifiedContentEntry> {
    let mut feed = quiz_entries;
    feed.extend(question_entries);
    feed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    feed
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// 1-indexed. Out-of-range pages clamp to the first or last page.
pub fn paginate<T: Clone>(items: &[T], page: i64, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size).max(1);
    let page = page.clamp(1, total_pages as i64) as usize;
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(total_items);
    Page {
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
        page,
        page_size,
        total_pages,
        total_items,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageStats {
    pub total_quiz_entries: u64,
    pub total_question_entries: u64,
    pub total_quizzes: u64,
    pub published_quizzes: u64,
    pub coverage_percent: u32,
}

pub fn compute_coverage(
    published_quiz_count: u64,
    quiz_entry_count: u64,
    question_entry_count: u64,
    total_quiz_count: u64,
) -> CoverageStats {
    let coverage_percent = if total_quiz_count == 0 {
        0
    } else {
        (quiz_entry_count as f64 / total_quiz_count as f64 * 100.0).round() as u32
    };
    CoverageStats {
        total_quiz_entries: quiz_entry_count,
        total_question_entries: question_entry_count,
        total_quizzes: total_quiz_count,
        published_quizzes: published_quiz_count,
        coverage_percent,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEngagement {
    pub course_title: String,
    pub quiz_entries: u64,
    pub question_entries: u64,
    pub score: u64,
}

/// Courses ranked by how much sign-language content they carry. The score is
/// purely count-derived so the ranking is reproducible.
pub fn rank_course_engagement(
    feed: &[UnifiedContentEntry],
    limit: usize,
) -> Vec<CourseEngagement> {
    let mut by_course: HashMap<&str, (u64, u64)> = HashMap::new();
    for e in feed {
        let counts = by_course.entry(e.course_title.as_str()).or_default();
        match e.content_type {
            ContentType::Quiz => counts.0 += 1,
            ContentType::Question => counts.1 += 1,
        }
    }
    let mut ranked: Vec<CourseEngagement> = by_course
        .into_iter()
        .map(|(title, (quizzes, questions))| CourseEngagement {
            course_title: title.to_string(),
            quiz_entries: quizzes,
            question_entries: questions,
            score: quizzes + questions,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.course_title.cmp(&b.course_title))
    });
    ranked.truncate(limit);
    ranked
}
