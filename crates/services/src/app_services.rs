use std::sync::Arc;

use storage::repository::{NotificationRepository, Storage};

use crate::Clock;
use crate::completion::CompletionPropagator;
use crate::error::AppServicesError;
use crate::events::EventProcessor;
use crate::progress_calculator::CourseProgressCalculator;
use crate::progress_ledger::ProgressLedger;
use crate::quiz_grader::QuizGrader;

/// Assembles the tracking services over one `Storage`.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    ledger: ProgressLedger,
    calculator: CourseProgressCalculator,
    grader: QuizGrader,
    propagator: CompletionPropagator,
    events: EventProcessor,
}

impl AppServices {
    #[must_use]
    pub fn new(storage: Storage, clock: Clock) -> Self {
        let ledger = ProgressLedger::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.progress),
        );
        let calculator = CourseProgressCalculator::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.progress),
        );
        let grader = QuizGrader::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
            Arc::clone(&storage.quiz_results),
        );
        let propagator = CompletionPropagator::new(
            clock,
            calculator.clone(),
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.enrollments),
        );
        let events = EventProcessor::new(ledger.clone(), grader.clone(), propagator.clone());

        Self {
            storage,
            ledger,
            calculator,
            grader,
            propagator,
            events,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(storage, clock))
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    #[must_use]
    pub fn calculator(&self) -> &CourseProgressCalculator {
        &self.calculator
    }

    #[must_use]
    pub fn grader(&self) -> &QuizGrader {
        &self.grader
    }

    #[must_use]
    pub fn propagator(&self) -> &CompletionPropagator {
        &self.propagator
    }

    #[must_use]
    pub fn events(&self) -> &EventProcessor {
        &self.events
    }

    #[must_use]
    pub fn notifications(&self) -> Arc<dyn NotificationRepository> {
        Arc::clone(&self.storage.notifications)
    }
}
