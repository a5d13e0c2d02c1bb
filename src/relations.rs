use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::store::{RecordStore, Row, Select};

/// Where one generation of an entity lives and what its columns are called.
#[derive(Debug, Clone, Copy)]
pub struct SchemaTable {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub title_column: &'static str,
}

pub const CURRENT_LESSONS: SchemaTable = SchemaTable {
    table: "lessons",
    columns: &["id", "title", "course_id"],
    title_column: "title",
};
pub const LEGACY_LESSONS: SchemaTable = SchemaTable {
    table: "legacy_lessons",
    columns: &["id", "name", "course_id"],
    title_column: "name",
};
pub const CURRENT_COURSES: SchemaTable = SchemaTable {
    table: "courses",
    columns: &["id", "title"],
    title_column: "title",
};
pub const LEGACY_COURSES: SchemaTable = SchemaTable {
    table: "legacy_courses",
    columns: &["id", "name"],
    title_column: "name",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    Current,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonLink {
    pub title: String,
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseLink {
    pub title: String,
}

/// Links resolved for one id set. `source` is `None` when neither generation
/// answered. Ids missing from `links` are unresolved, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<T> {
    pub source: Option<SchemaSource>,
    pub links: HashMap<String, T>,
}

impl<T> Default for Resolution<T> {
    fn default() -> Self {
        Self {
            source: None,
            links: HashMap::new(),
        }
    }
}

fn non_blank_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn query_table(
    store: &dyn RecordStore,
    table: &SchemaTable,
    ids: &BTreeSet<String>,
) -> Result<Vec<Row>, crate::store::StoreError> {
    store.select(&Select::from(table.table, table.columns).in_list("id", ids.iter().cloned()))
}

/// Current generation first; the legacy table is consulted only when the
/// current one yields no rows at all, and its rows are then used exclusively.
fn resolve_with_fallback<T>(
    store: &dyn RecordStore,
    ids: &BTreeSet<String>,
    current: &SchemaTable,
    legacy: &SchemaTable,
    decode: fn(&Row, &SchemaTable) -> Option<T>,
) -> Resolution<T> {
    if ids.is_empty() {
        return Resolution::default();
    }

    let (source, rows) = match query_table(store, current, ids) {
        Ok(rows) if !rows.is_empty() => (SchemaSource::Current, rows),
        outcome => {
            if let Err(e) = outcome {
                warn!(
                    table = current.table,
                    error = %e,
                    "current schema query failed; trying legacy"
                );
            }
            match query_table(store, legacy, ids) {
                Ok(rows) => (SchemaSource::Legacy, rows),
                Err(e) => {
                    warn!(table = legacy.table, error = %e, "legacy schema query failed");
                    return Resolution::default();
                }
            }
        }
    };
    if rows.is_empty() {
        return Resolution::default();
    }

    let table = match source {
        SchemaSource::Current => current,
        SchemaSource::Legacy => legacy,
    };
    let mut links = HashMap::with_capacity(rows.len());
    for row in &rows {
        let Some(id) = non_blank_str(row, "id") else {
            continue;
        };
        if let Some(link) = decode(row, table) {
            links.insert(id.to_string(), link);
        }
    }
    debug!(
        table = table.table,
        requested = ids.len(),
        resolved = links.len(),
        "resolved relation links"
    );
    Resolution {
        source: Some(source),
        links,
    }
}

fn decode_lesson(row: &Row, table: &SchemaTable) -> Option<LessonLink> {
    Some(LessonLink {
        title: non_blank_str(row, table.title_column)?.to_string(),
        course_id: non_blank_str(row, "course_id").map(str::to_string),
    })
}

fn decode_course(row: &Row, table: &SchemaTable) -> Option<CourseLink> {
    Some(CourseLink {
        title: non_blank_str(row, table.title_column)?.to_string(),
    })
}

pub fn resolve_lessons(store: &dyn RecordStore, ids: &BTreeSet<String>) -> Resolution<LessonLink> {
    resolve_with_fallback(store, ids, &CURRENT_LESSONS, &LEGACY_LESSONS, decode_lesson)
}

pub fn resolve_courses(store: &dyn RecordStore, ids: &BTreeSet<String>) -> Resolution<CourseLink> {
    resolve_with_fallback(store, ids, &CURRENT_COURSES, &LEGACY_COURSES, decode_course)
}

/// Lesson and course links for one content kind.
#[derive(Debug, Clone, Default)]
pub struct RelationLinks {
    pub lessons: HashMap<String, LessonLink>,
    pub courses: HashMap<String, CourseLink>,
}

/// Resolves lessons for `lesson_ids`, then the courses those lessons point at.
pub fn resolve_links(store: &dyn RecordStore, lesson_ids: &BTreeSet<String>) -> RelationLinks {
    let lessons = resolve_lessons(store, lesson_ids);
    let course_ids: BTreeSet<String> = lessons
        .links
        .values()
        .filter_map(|l| l.course_id.clone())
        .collect();
    let courses = resolve_courses(store, &course_ids);
    debug!(
        lessons_from = ?lessons.source,
        courses_from = ?courses.source,
        "relation sources"
    );
    RelationLinks {
        lessons: lessons.links,
        courses: courses.links,
    }
}
