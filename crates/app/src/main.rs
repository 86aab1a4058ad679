use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use course_core::model::{CourseId, StudentId};
use services::{AppServices, Clock, InputEvent, TrackingError};

mod cli;
mod logging;
mod seed;

use cli::{Cli, Command};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turn a bare path into an absolute `sqlite://` URL; full URLs pass through.
fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its parent directory if missing.
fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(rest) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

async fn ingest(app: &AppServices) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (mut handled, mut failed) = (0_u32, 0_u32);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let result = match InputEvent::from_json(&line) {
            Ok(event) => app.events().handle(event).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(outcome) => {
                handled += 1;
                println!("{}", json!({ "ok": true, "outcome": outcome }));
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(code = e.code(), error = %e, "event rejected");
                println!(
                    "{}",
                    json!({ "ok": false, "error": { "code": e.code(), "message": e.to_string() } })
                );
            }
        }
    }

    tracing::info!(handled, failed, "ingest finished");
    Ok(())
}

/// Progress snapshot plus certificate state; `null` only when not enrolled.
async fn progress_report(
    app: &AppServices,
    student: StudentId,
    course: CourseId,
) -> Result<serde_json::Value, TrackingError> {
    let snapshot = app.calculator().snapshot(student, course).await?;
    let eligibility = match app
        .propagator()
        .certificate_eligibility(student, course)
        .await
    {
        Ok(eligibility) => Some(eligibility),
        Err(TrackingError::NotEnrolled { .. }) => None,
        Err(e) => return Err(e),
    };
    Ok(json!({ "progress": snapshot, "certificate": eligibility }))
}

async fn run(app: &AppServices, clock: Clock, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Seed => print_json(&seed::run(app, clock).await?),
        Command::CompleteLesson { student, lesson } => {
            let outcome = app
                .events()
                .handle(InputEvent::LessonCompleted {
                    student_id: student,
                    lesson_id: lesson,
                })
                .await?;
            print_json(&outcome)
        }
        Command::SubmitQuiz {
            student,
            quiz,
            answers,
        } => {
            let submission = app
                .grader()
                .submit(student, quiz, answers.into_iter().collect())
                .await?;
            print_json(&submission)
        }
        Command::Progress { student, course } => {
            print_json(&progress_report(app, student, course).await?)
        }
        Command::Notifications { student, limit } => {
            let notes = app.notifications().list_for_user(student, limit).await?;
            print_json(&notes)
        }
        Command::Ingest => ingest(app).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    let db_url = normalize_sqlite_url(&cli.db);
    prepare_sqlite_file(&db_url)?;
    let clock = Clock::System;
    let app = AppServices::new_sqlite(&db_url, clock)
        .await
        .with_context(|| format!("opening {db_url}"))?;

    run(&app, clock, cli.command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use course_core::model::{Course, Enrollment, Lesson, LessonId, NewNotification};
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::{CompletionWrite, EnrollmentRepository, Storage, StorageError};

    struct BrokenEnrollments;

    #[async_trait::async_trait]
    impl EnrollmentRepository for BrokenEnrollments {
        async fn enroll(&self, _enrollment: &Enrollment) -> Result<(), StorageError> {
            Err(StorageError::Connection("database is locked".into()))
        }

        async fn get_enrollment(
            &self,
            _student_id: StudentId,
            _course_id: CourseId,
        ) -> Result<Option<Enrollment>, StorageError> {
            Err(StorageError::Connection("database is locked".into()))
        }

        async fn complete_if_finished(
            &self,
            _student_id: StudentId,
            _course_id: CourseId,
            _at: DateTime<Utc>,
            _notification: NewNotification,
        ) -> Result<CompletionWrite, StorageError> {
            Err(StorageError::Connection("database is locked".into()))
        }
    }

    async fn one_lesson_course(storage: &Storage) {
        let course = Course::new(CourseId::new(1), "Rust").unwrap();
        storage.catalog.upsert_course(&course).await.unwrap();
        let lesson = Lesson::new(LessonId::new(1), course.id(), "Ownership", 0).unwrap();
        storage.catalog.upsert_lesson(&lesson).await.unwrap();
    }

    #[tokio::test]
    async fn progress_report_has_no_certificate_without_enrollment() {
        let app = AppServices::in_memory(fixed_clock());
        one_lesson_course(app.storage()).await;

        let report = progress_report(&app, StudentId::new(1), CourseId::new(1))
            .await
            .unwrap();
        assert!(report["certificate"].is_null());
        assert_eq!(report["progress"]["percentage"], 0);
    }

    #[tokio::test]
    async fn progress_report_reports_certificate_for_enrolled_student() {
        let app = AppServices::in_memory(fixed_clock());
        one_lesson_course(app.storage()).await;
        app.storage()
            .enrollments
            .enroll(&Enrollment::new(StudentId::new(1), CourseId::new(1), fixed_now()))
            .await
            .unwrap();

        let report = progress_report(&app, StudentId::new(1), CourseId::new(1))
            .await
            .unwrap();
        assert_eq!(report["certificate"]["eligible"], false);
    }

    #[tokio::test]
    async fn progress_report_propagates_storage_failures() {
        let healthy = Storage::in_memory();
        one_lesson_course(&healthy).await;
        let storage = Storage {
            enrollments: Arc::new(BrokenEnrollments),
            ..healthy
        };
        let app = AppServices::new(storage, fixed_clock());

        let err = progress_report(&app, StudentId::new(1), CourseId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Storage(StorageError::Connection(_))));
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn urls_pass_through_and_paths_become_absolute() {
        assert_eq!(
            normalize_sqlite_url("sqlite://data/x.sqlite3"),
            "sqlite://data/x.sqlite3"
        );
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");

        let url = normalize_sqlite_url("sqlite:local.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("local.sqlite3"));
    }

    #[test]
    fn prepare_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite3");
        prepare_sqlite_file(&format!("sqlite://{}?mode=rwc", path.display())).unwrap();
        assert!(path.exists());
        assert!(prepare_sqlite_file("sqlite://").is_err());
    }
}
