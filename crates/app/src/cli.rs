use clap::{Parser, Subcommand};

use course_core::model::{CourseId, LessonId, QuestionId, QuizId, StudentId};

#[derive(Debug, Parser)]
#[command(name = "coursetrack")]
#[command(about = "Lesson progress, quiz grading and course completion tracking")]
#[command(version)]
pub struct Cli {
    /// `SQLite` database URL or path.
    #[arg(
        long,
        global = true,
        env = "COURSETRACK_DB_URL",
        default_value = "sqlite://coursetrack.sqlite3"
    )]
    pub db: String,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, env = "COURSETRACK_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Create a demo course with lessons, a quiz and an enrolled student")]
    Seed,

    #[command(about = "Mark a lesson completed and propagate course completion")]
    CompleteLesson {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        lesson: LessonId,
    },

    #[command(about = "Grade and record one quiz attempt")]
    SubmitQuiz {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        quiz: QuizId,
        /// Repeatable `<questionId>=<option>` pair.
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(QuestionId, String)>,
    },

    #[command(about = "Show the progress snapshot for a student in a course")]
    Progress {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        course: CourseId,
    },

    #[command(about = "List a student's notifications, newest first")]
    Notifications {
        #[arg(long)]
        student: StudentId,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    #[command(about = "Process newline-delimited JSON events from stdin")]
    Ingest,
}

fn parse_answer(raw: &str) -> Result<(QuestionId, String), String> {
    let (question, option) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <questionId>=<option>, got {raw:?}"))?;
    let question = question.parse::<QuestionId>().map_err(|e| e.to_string())?;
    Ok((question, option.trim().to_owned()))
}
