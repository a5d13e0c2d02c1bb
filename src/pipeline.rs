//! Stage orchestration for the feed.
//!
//! Independent fetches run concurrently on scoped threads. Every stage owns
//! its output and hands it back to the caller; nothing is shared or cached
//! between invocations. A failing stage is logged and contributes an empty
//! value, so one broken source never blanks the whole feed.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::thread::{self, ScopedJoinHandle};
use tracing::warn;

use crate::accessibility::{self, AccessibilitySettings};
use crate::content::{self, QuestionRecord, QuizRecord, UnifiedContentEntry};
use crate::feed::{self, CoverageStats};
use crate::relations::{self, RelationLinks};
use crate::setup::FeedDefaults;
use crate::store::{Filter, RecordStore, Select, StoreError};

pub const QUIZZES_TABLE: &str = "quizzes";
pub const QUESTIONS_TABLE: &str = "quiz_questions";

/// Stage output on success, or the stage's empty value after logging.
fn degrade<T: Default>(stage: &str, result: Result<T, StoreError>) -> T {
    result.unwrap_or_else(|e| {
        warn!(stage, error = %e, "source unavailable; continuing with empty result");
        T::default()
    })
}

fn join_stage<T: Default>(stage: &str, handle: ScopedJoinHandle<'_, T>) -> T {
    handle.join().unwrap_or_else(|_| {
        warn!(stage, "stage panicked; continuing with empty result");
        T::default()
    })
}

fn fetch_quizzes(store: &dyn RecordStore) -> Vec<QuizRecord> {
    let rows = degrade(
        "quizzes",
        store.select(
            &Select::from(QUIZZES_TABLE, QuizRecord::COLUMNS).order_by("created_at", true),
        ),
    );
    content::decode_rows(QUIZZES_TABLE, &rows, QuizRecord::from_row)
}

fn fetch_questions(store: &dyn RecordStore) -> Vec<QuestionRecord> {
    let rows = degrade(
        "questions",
        store.select(
            &Select::from(QUESTIONS_TABLE, QuestionRecord::COLUMNS)
                .not_null("rsl_video_url")
                .order_by("created_at", true),
        ),
    );
    content::decode_rows(QUESTIONS_TABLE, &rows, QuestionRecord::from_row)
}

fn count_quizzes(store: &dyn RecordStore, published_only: bool) -> u64 {
    let filters = if published_only {
        vec![Filter::Eq("is_published", Value::Bool(true))]
    } else {
        Vec::new()
    };
    let stage = if published_only {
        "published_quiz_count"
    } else {
        "quiz_count"
    };
    degrade(stage, store.count(QUIZZES_TABLE, &filters))
}

/// Everything one aggregation pass produced.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub feed: Vec<UnifiedContentEntry>,
    pub quiz_entry_count: u64,
    pub question_entry_count: u64,
    pub published_quiz_count: u64,
    pub total_quiz_count: u64,
}

impl FeedSnapshot {
    pub fn coverage(&self) -> CoverageStats {
        feed::compute_coverage(
            self.published_quiz_count,
            self.quiz_entry_count,
            self.question_entry_count,
            self.total_quiz_count,
        )
    }
}

pub fn load_feed(store: &dyn RecordStore, defaults: &FeedDefaults) -> FeedSnapshot {
    let (quizzes, questions, total_quiz_count, published_quiz_count) = thread::scope(|s| {
        let quizzes = s.spawn(|| fetch_quizzes(store));
        let questions = s.spawn(|| fetch_questions(store));
        let total = s.spawn(|| count_quizzes(store, false));
        let published = s.spawn(|| count_quizzes(store, true));
        (
            join_stage("quizzes", quizzes),
            join_stage("questions", questions),
            join_stage("quiz_count", total),
            join_stage("published_quiz_count", published),
        )
    });

    let quiz_map: HashMap<String, QuizRecord> = quizzes
        .iter()
        .map(|q| (q.id.clone(), q.clone()))
        .collect();

    let quiz_lesson_ids: BTreeSet<String> = quizzes
        .iter()
        .filter(|q| q.is_published)
        .filter_map(|q| q.lesson_id.clone())
        .collect();
    let question_lesson_ids: BTreeSet<String> = questions
        .iter()
        .filter(|q| q.rsl_video_url.is_some())
        .filter_map(|q| quiz_map.get(&q.quiz_id))
        .filter(|quiz| quiz.is_published)
        .filter_map(|quiz| quiz.lesson_id.clone())
        .collect();

    let (quiz_links, question_links) = thread::scope(|s| {
        let quiz_links = s.spawn(|| relations::resolve_links(store, &quiz_lesson_ids));
        let question_links = s.spawn(|| relations::resolve_links(store, &question_lesson_ids));
        (
            join_stage::<RelationLinks>("quiz_relations", quiz_links),
            join_stage::<RelationLinks>("question_relations", question_links),
        )
    });

    let quiz_entries = content::normalize_quizzes(
        &quizzes,
        &quiz_links.lessons,
        &quiz_links.courses,
        defaults,
    );
    let question_entries = content::normalize_questions(
        &questions,
        &quiz_map,
        &question_links.lessons,
        &question_links.courses,
        defaults,
    );

    let quiz_entry_count = quiz_entries.len() as u64;
    let question_entry_count = question_entries.len() as u64;
    FeedSnapshot {
        feed: feed::build_feed(quiz_entries, question_entries),
        quiz_entry_count,
        question_entry_count,
        published_quiz_count,
        total_quiz_count,
    }
}

#[derive(Debug, Clone)]
pub struct FeedView {
    pub settings: Option<AccessibilitySettings>,
    pub snapshot: FeedSnapshot,
}

/// The feed plus, when a user is given, their presentation preferences,
/// fetched side by side.
pub fn open_feed(
    store: &dyn RecordStore,
    user_id: Option<&str>,
    defaults: &FeedDefaults,
) -> FeedView {
    thread::scope(|s| {
        let settings = user_id.map(|uid| s.spawn(move || accessibility::resolve(store, uid)));
        let snapshot = load_feed(store, defaults);
        let settings = settings.map(|h| {
            h.join().unwrap_or_else(|_| {
                warn!(stage = "settings", "stage panicked; using default settings");
                AccessibilitySettings::default()
            })
        });
        FeedView { settings, snapshot }
    })
}
