use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "rslfeed.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accessibility_settings(
            user_id TEXT PRIMARY KEY,
            settings TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Current-generation relation tables.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            course_id TEXT,
            title TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_course ON lessons(course_id)",
        [],
    )?;

    // Legacy-generation relation tables. Read-only from this process; older
    // workspaces may only have rows here.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS legacy_courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS legacy_lessons(
            id TEXT PRIMARY KEY,
            course_id TEXT,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            lesson_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Existing workspaces may predate these columns.
    ensure_quizzes_lesson_id(&conn)?;
    ensure_quizzes_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_created ON quizzes(created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quiz_questions(
            id TEXT PRIMARY KEY,
            quiz_id TEXT NOT NULL,
            question_text TEXT NOT NULL,
            rsl_video_url TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(quiz_id) REFERENCES quizzes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quiz_questions_quiz ON quiz_questions(quiz_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quiz_questions_created ON quiz_questions(created_at)",
        [],
    )?;

    Ok(conn)
}

fn ensure_quizzes_lesson_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "quizzes", "lesson_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE quizzes ADD COLUMN lesson_id TEXT", [])?;
    Ok(())
}

fn ensure_quizzes_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "quizzes", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE quizzes ADD COLUMN updated_at TEXT", [])?;
    // Best-effort backfill: an untouched quiz was last updated when created.
    conn.execute(
        "UPDATE quizzes SET updated_at = created_at WHERE updated_at IS NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
