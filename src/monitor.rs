//! One stock check: observe, reconcile, alert, persist.

use crate::notify::Notifier;
use crate::reconcile::{Reconciliation, TargetSet, reconcile};
use crate::source::{ObservationSource, SourceError};
use crate::state::{StateStore, StockState};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{Instrument, Span};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to set store preferences: {0}")]
    Context(#[source] SourceError),

    #[error("failed to observe products: {0}")]
    Observation(#[source] SourceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Products were observed and reconciled.
    Completed,
    /// Nothing usable was observed; targets were assumed unavailable.
    Degraded,
    /// The delivery region could not be selected; state was left untouched.
    Aborted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Degraded => "degraded",
            RunOutcome::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub observed: usize,
    pub alerts: usize,
    pub delivered: usize,
    pub persisted: bool,
}

pub struct Monitor {
    pincode: String,
    targets: TargetSet,
    store: Box<dyn StateStore>,
    notifier: Option<Box<dyn Notifier>>,
    span: Span,
}

impl Monitor {
    pub fn new(pincode: impl Into<String>, targets: TargetSet, store: Box<dyn StateStore>) -> Self {
        let pincode = pincode.into();
        let span = tracing::info_span!("stock_check", pincode = %pincode);
        Self {
            pincode,
            targets,
            store,
            notifier: None,
            span,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Span that every event of the run is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Perform exactly one check. Never fails; the report says what happened.
    pub async fn run(&self, source: &mut dyn ObservationSource) -> RunReport {
        self.run_once(source).instrument(self.span.clone()).await
    }

    async fn run_once(&self, source: &mut dyn ObservationSource) -> RunReport {
        let started_at = Utc::now();
        tracing::info!("Starting stock check for pincode {}", self.pincode);

        let previous = self.store.load().await;
        let checked = self.check(source, &previous).await;
        source.shutdown().await;

        let mut report = RunReport {
            started_at,
            finished_at: started_at,
            outcome: RunOutcome::Completed,
            observed: 0,
            alerts: 0,
            delivered: 0,
            persisted: false,
        };

        let reconciliation = match checked {
            Ok((observed, reconciliation)) => {
                if observed == 0 {
                    report.outcome = RunOutcome::Degraded;
                }
                report.observed = observed;
                reconciliation
            }
            Err(e @ RunError::Context(_)) => {
                tracing::error!(error = %e, "Aborting check");
                report.outcome = RunOutcome::Aborted;
                report.finished_at = Utc::now();
                return report;
            }
            Err(e @ RunError::Observation(_)) => {
                tracing::error!(error = %e, "Stock check failed; assuming targets unavailable");
                report.outcome = RunOutcome::Degraded;
                reconcile(&previous, &[], &self.targets)
            }
        };

        if !reconciliation.unseen_targets.is_empty() {
            tracing::info!(
                missing = ?reconciliation.unseen_targets,
                "Target products not listed; marking unavailable"
            );
        }

        report.alerts = reconciliation.events.len();
        report.delivered = self.alert(&reconciliation).await;
        report.persisted = self.persist(&reconciliation.next).await;
        report.finished_at = Utc::now();
        report
    }

    async fn check(
        &self,
        source: &mut dyn ObservationSource,
        previous: &StockState,
    ) -> Result<(usize, Reconciliation), RunError> {
        source
            .establish_context(&self.pincode)
            .await
            .map_err(RunError::Context)?;

        let observations = source
            .fetch(&self.pincode)
            .await
            .map_err(RunError::Observation)?;

        if observations.is_empty() {
            tracing::warn!("No products found in this check.");
        }
        for product in &observations {
            tracing::debug!(%product, "Observed");
        }

        Ok((
            observations.len(),
            reconcile(previous, &observations, &self.targets),
        ))
    }

    /// Returns how many alerts were delivered.
    async fn alert(&self, reconciliation: &Reconciliation) -> usize {
        let mut delivered = 0;
        for event in &reconciliation.events {
            tracing::info!("{}", event.title());
            tracing::info!("{}", event.message());
            tracing::info!("URL: {}", event.url());

            let Some(notifier) = &self.notifier else {
                continue;
            };
            match notifier.notify(event).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::info!(destination = %notifier.destination(), "Sent notification");
                }
                Err(e) => {
                    tracing::error!(destination = %notifier.destination(), error = %e, "Failed to send notification");
                }
            }
        }
        delivered
    }

    async fn persist(&self, state: &StockState) -> bool {
        match self.store.save(state).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to save stock status");
                false
            }
        }
    }
}
