//! Routing of the two inbound events: lesson completed and quiz submitted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use course_core::model::{
    AnswerSheet, CourseId, LessonId, LessonProgress, QuestionId, QuizId, StudentId,
};

use crate::completion::{CompletionEvaluation, CompletionPropagator};
use crate::error::TrackingError;
use crate::progress_ledger::ProgressLedger;
use crate::quiz_grader::{QuizGrader, QuizSubmission};

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    LessonCompleted {
        student_id: StudentId,
        lesson_id: LessonId,
    },
    QuizSubmitted {
        student_id: StudentId,
        quiz_id: QuizId,
        answers: AnswerSheet,
    },
}

/// Wire shape, before the answer map is checked.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum WireEvent {
    LessonCompleted {
        student_id: StudentId,
        lesson_id: LessonId,
    },
    QuizSubmitted {
        student_id: StudentId,
        quiz_id: QuizId,
        answers: Map<String, Value>,
    },
}

impl InputEvent {
    /// Parse one JSON event.
    ///
    /// Answer keys that are not question ids are dropped, since they can never
    /// match a question. A `null` answer counts as unanswered.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::InvalidInput` for malformed JSON, an unknown
    /// `type`, missing fields, or an answer value that is not a string.
    pub fn from_json(raw: &str) -> Result<Self, TrackingError> {
        let wire: WireEvent =
            serde_json::from_str(raw).map_err(|e| TrackingError::InvalidInput(e.to_string()))?;
        match wire {
            WireEvent::LessonCompleted {
                student_id,
                lesson_id,
            } => Ok(InputEvent::LessonCompleted {
                student_id,
                lesson_id,
            }),
            WireEvent::QuizSubmitted {
                student_id,
                quiz_id,
                answers,
            } => Ok(InputEvent::QuizSubmitted {
                student_id,
                quiz_id,
                answers: answer_sheet(answers)?,
            }),
        }
    }
}

fn answer_sheet(raw: Map<String, Value>) -> Result<AnswerSheet, TrackingError> {
    let mut sheet = AnswerSheet::new();
    for (key, value) in raw {
        let Ok(question_id) = key.parse::<QuestionId>() else {
            tracing::debug!(key, "ignoring answer for non-numeric question key");
            continue;
        };
        match value {
            Value::String(option) => {
                sheet.insert(question_id, option);
            }
            Value::Null => {}
            other => {
                return Err(TrackingError::InvalidInput(format!(
                    "answer for question {question_id} must be a string, got {other}"
                )));
            }
        }
    }
    Ok(sheet)
}

/// What handling an event produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EventOutcome {
    LessonCompleted {
        course_id: CourseId,
        lesson: LessonProgress,
        evaluation: CompletionEvaluation,
    },
    QuizGraded {
        submission: QuizSubmission,
    },
}

/// Runs the ledger, grader and propagator in the order each event requires.
#[derive(Clone)]
pub struct EventProcessor {
    ledger: ProgressLedger,
    grader: QuizGrader,
    propagator: CompletionPropagator,
}

impl EventProcessor {
    #[must_use]
    pub fn new(
        ledger: ProgressLedger,
        grader: QuizGrader,
        propagator: CompletionPropagator,
    ) -> Self {
        Self {
            ledger,
            grader,
            propagator,
        }
    }

    /// Handle a typed event.
    ///
    /// # Errors
    ///
    /// Propagates the `TrackingError` of whichever step failed.
    pub async fn handle(&self, event: InputEvent) -> Result<EventOutcome, TrackingError> {
        match event {
            InputEvent::LessonCompleted {
                student_id,
                lesson_id,
            } => {
                let (course_id, lesson) = self.ledger.record(student_id, lesson_id).await?;
                let evaluation = self.propagator.evaluate(student_id, course_id).await?;
                Ok(EventOutcome::LessonCompleted {
                    course_id,
                    lesson,
                    evaluation,
                })
            }
            InputEvent::QuizSubmitted {
                student_id,
                quiz_id,
                answers,
            } => {
                let submission = self.grader.submit(student_id, quiz_id, answers).await?;
                Ok(EventOutcome::QuizGraded { submission })
            }
        }
    }

    /// Parse and handle one JSON event.
    ///
    /// # Errors
    ///
    /// Returns `TrackingError::InvalidInput` before any write if the event
    /// does not parse; otherwise as `handle`.
    pub async fn handle_json(&self, raw: &str) -> Result<EventOutcome, TrackingError> {
        let event = InputEvent::from_json(raw).inspect_err(|e| {
            tracing::warn!(error = %e, "rejected malformed event");
        })?;
        self.handle(event).await
    }
}
