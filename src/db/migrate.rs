use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration query failed: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    tracing::info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" SERIAL PRIMARY KEY,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TIMESTAMP NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> =
        sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
            .fetch_all(pool)
            .await?;

    let migrations = [(
        "001_init_schema",
        include_str!("../../sql/001_init_schema.sql"),
    )];

    for (name, sql) in migrations {
        if applied.iter().any(|entry| entry == name) {
            continue;
        }

        tracing::info!(migration = name, "applying migration");

        let mut tx = pool.begin().await?;
        for statement in split_statements(sql) {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// Splits a migration file on top-level semicolons. Comment lines are
/// dropped before splitting so a `;` inside a comment never breaks a
/// statement. Good enough for the schema files in sql/ (no functions, no
/// dollar quoting).
fn split_statements(sql: &str) -> Vec<String> {
    let without_comments = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::split_statements;

    #[test]
    fn splits_and_strips_comments() {
        let statements = split_statements(
            "-- comment\nCREATE TABLE a (x INT);\n\n-- another\nCREATE INDEX i ON a(x);\n",
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE"));
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn semicolon_inside_comment_does_not_split() {
        let statements = split_statements(
            "-- one table; another follows below\nCREATE TABLE a (x INT);\nCREATE TABLE b (\n    -- key; unique\n    y INT\n);\n",
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(statements[1].starts_with("CREATE TABLE b"));
        assert!(!statements.iter().any(|s| s.contains("--")));
    }

    #[test]
    fn shipped_schema_splits_into_clean_statements() {
        let statements = split_statements(include_str!("../../sql/001_init_schema.sql"));
        assert!(!statements.is_empty());
        for statement in &statements {
            assert!(
                statement.starts_with("CREATE"),
                "unexpected statement start: {statement}"
            );
        }
    }
}
