//! Stand-in relation labels for entries whose lesson or course link is
//! missing. Selection is positional (`index mod len`) so the same feed always
//! shows the same labels.

use crate::content::ContentType;

const QUIZ_COURSES: &[&str] = &[
    "RSL Foundations",
    "Everyday Signing",
    "Fingerspelling Workshop",
    "Conversational RSL",
    "Signing for Travel",
];

const QUIZ_LESSONS: &[&str] = &[
    "Greetings and Introductions",
    "Numbers and Counting",
    "Family Members",
    "Colors and Shapes",
    "Days of the Week",
    "Food and Drink",
];

const QUESTION_COURSES: &[&str] = &[
    "RSL Vocabulary Builder",
    "Grammar in Motion",
    "Deaf Culture and History",
    "Signing in the Classroom",
];

const QUESTION_LESSONS: &[&str] = &[
    "Question Words",
    "Emotions and Feelings",
    "Weather and Seasons",
    "At the Doctor",
    "Shopping",
    "Directions",
    "Time and Dates",
];

pub fn course_pool(kind: ContentType) -> &'static [&'static str] {
    match kind {
        ContentType::Quiz => QUIZ_COURSES,
        ContentType::Question => QUESTION_COURSES,
    }
}

pub fn lesson_pool(kind: ContentType) -> &'static [&'static str] {
    match kind {
        ContentType::Quiz => QUIZ_LESSONS,
        ContentType::Question => QUESTION_LESSONS,
    }
}

pub fn placeholder_course(kind: ContentType, index: usize) -> &'static str {
    let pool = course_pool(kind);
    pool[index % pool.len()]
}

pub fn placeholder_lesson(kind: ContentType, index: usize) -> &'static str {
    let pool = lesson_pool(kind);
    pool[index % pool.len()]
}
