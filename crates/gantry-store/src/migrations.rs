//! Idempotent schema creation for the workflow tables.
//!
//! Every statement is `IF NOT EXISTS`, so [`run_migrations`] can run on
//! every startup and on every in-memory test database. Enum-valued columns
//! carry CHECK constraints matching the Rust enums' SQL representations.

use rusqlite::Connection;
use tracing::debug;

use crate::errors::Result;

/// Create all tables and indexes if they don't exist.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id                  TEXT PRIMARY KEY CHECK (length(id) <= 64),
            name                TEXT NOT NULL,
            description         TEXT,
            workspace_path      TEXT,
            remote_url          TEXT,
            telegram_topic_id   INTEGER,
            has_build_step      INTEGER NOT NULL DEFAULT 1,
            has_deploy_step     INTEGER NOT NULL DEFAULT 1,
            state               TEXT NOT NULL DEFAULT 'planning'
                CHECK (state IN ('planning','active','paused','complete','archived')),
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS project_links (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            label       TEXT NOT NULL,
            url         TEXT NOT NULL,
            category    TEXT NOT NULL DEFAULT 'other'
                CHECK (category IN ('dev','prod','docs','admin','api','other')),
            created_at  TEXT NOT NULL,
            UNIQUE (project_id, label)
        );
        CREATE INDEX IF NOT EXISTS idx_links_project ON project_links(project_id);

        CREATE TABLE IF NOT EXISTS project_commands (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id      TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            label           TEXT NOT NULL,
            command         TEXT NOT NULL,
            category        TEXT NOT NULL DEFAULT 'other'
                CHECK (category IN ('dev','build','test','deploy','lint','db','other')),
            run_mode        TEXT NOT NULL DEFAULT 'exec'
                CHECK (run_mode IN ('exec','task')),
            task_runner_id  TEXT,
            locked          INTEGER NOT NULL DEFAULT 0,
            locked_by       TEXT,
            locked_at       TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE (project_id, label)
        );
        CREATE INDEX IF NOT EXISTS idx_commands_project ON project_commands(project_id);

        CREATE TABLE IF NOT EXISTS project_tasks (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id              TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title                   TEXT NOT NULL,
            description             TEXT,
            task_type               TEXT NOT NULL DEFAULT 'feature'
                CHECK (task_type IN ('feature','bugfix','iteration','hotfix','chore')),
            status                  TEXT NOT NULL DEFAULT 'requirements'
                CHECK (status IN ('requirements','implementing','review_requested',
                                  'changes_requested','approved','merging','merge_conflict',
                                  'building','deploying','done','blocked','cancelled')),
            status_before_blocked   TEXT
                CHECK (status_before_blocked IS NULL
                       OR status_before_blocked IN ('requirements','implementing',
                          'review_requested','changes_requested','approved','merging',
                          'merge_conflict','building','deploying')),
            requires_branching      INTEGER NOT NULL DEFAULT 1,
            requires_human_review   INTEGER NOT NULL DEFAULT 1,
            priority                INTEGER NOT NULL DEFAULT 0,
            phase                   TEXT,
            assigned_model          TEXT,
            git_branch              TEXT,
            worktree_path           TEXT,
            dev_server_url          TEXT,
            review_notes            TEXT,
            review_feedback         TEXT,
            block_reason            TEXT,
            completed_at            TEXT,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON project_tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_next
            ON project_tasks(project_id, status, priority, created_at, id);

        CREATE TABLE IF NOT EXISTS project_task_dependencies (
            task_id         INTEGER NOT NULL REFERENCES project_tasks(id) ON DELETE CASCADE,
            depends_on_id   INTEGER NOT NULL REFERENCES project_tasks(id) ON DELETE CASCADE,
            created_at      TEXT NOT NULL,
            PRIMARY KEY (task_id, depends_on_id)
        );
        CREATE INDEX IF NOT EXISTS idx_deps_parent
            ON project_task_dependencies(depends_on_id);

        CREATE TABLE IF NOT EXISTS task_status_history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id     INTEGER NOT NULL REFERENCES project_tasks(id) ON DELETE CASCADE,
            from_status TEXT,
            to_status   TEXT NOT NULL,
            actor       TEXT,
            reason      TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_task ON task_status_history(task_id);

        CREATE TABLE IF NOT EXISTS task_attempts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id     INTEGER NOT NULL REFERENCES project_tasks(id) ON DELETE CASCADE,
            session_key TEXT,
            model       TEXT,
            summary     TEXT,
            outcome     TEXT NOT NULL
                CHECK (outcome IN ('success','partial','failed','abandoned')),
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_attempts_task ON task_attempts(task_id);

        CREATE TABLE IF NOT EXISTS project_memory (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            category    TEXT NOT NULL
                CHECK (category IN ('mistake','learning','convention','gotcha','decision')),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memory_project ON project_memory(project_id);
        ",
    )?;
    debug!("workflow schema migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = setup();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn project_delete_cascades_to_owned_rows() {
        let conn = setup();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, created_at, updated_at)
             VALUES ('p1', 'P1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO project_tasks (project_id, title, created_at, updated_at)
             VALUES ('p1', 't1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let task_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO task_status_history (task_id, to_status, created_at)
             VALUES (?1, 'requirements', '2024-01-01T00:00:00Z')",
            [task_id],
        )
        .unwrap();

        conn.execute("DELETE FROM projects WHERE id = 'p1'", []).unwrap();

        let tasks: i64 = conn
            .query_row("SELECT COUNT(*) FROM project_tasks", [], |r| r.get(0))
            .unwrap();
        let history: i64 = conn
            .query_row("SELECT COUNT(*) FROM task_status_history", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tasks, 0);
        assert_eq!(history, 0);
    }

    #[test]
    fn status_check_constraint_rejects_unknown_values() {
        let conn = setup();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, created_at, updated_at)
             VALUES ('p1', 'P1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let err = conn.execute(
            "INSERT INTO project_tasks (project_id, title, status, created_at, updated_at)
             VALUES ('p1', 't1', 'bogus', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn link_labels_are_unique_per_project() {
        let conn = setup();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO projects (id, name, created_at, updated_at)
             VALUES ('p1', 'P1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO project_links (project_id, label, url, created_at)
                      VALUES ('p1', 'home', 'https://example.com', '2024-01-01T00:00:00Z')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
