#![forbid(unsafe_code)]

pub mod app_services;
pub mod completion;
pub mod error;
pub mod events;
pub mod progress_calculator;
pub mod progress_ledger;
pub mod quiz_grader;

pub use course_core::Clock;

pub use app_services::AppServices;
pub use completion::{CertificateEligibility, CompletionEvaluation, CompletionPropagator};
pub use error::{AppServicesError, TrackingError};
pub use events::{EventOutcome, EventProcessor, InputEvent};
pub use progress_calculator::CourseProgressCalculator;
pub use progress_ledger::ProgressLedger;
pub use quiz_grader::{QuizGrader, QuizSubmission};
