//! Top-level runner for the two ingestion streams.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::StreamKind;
use crate::error::PipelineError;
use crate::pipeline::{HeightPipeline, RunSummary};
use crate::producer::{EventsProducer, TransactionsProducer};

/// One or both streams stopped with an error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{}", describe(.0))]
    Streams(Vec<(StreamKind, PipelineError)>),
}

fn describe(errors: &[(StreamKind, PipelineError)]) -> String {
    errors
        .iter()
        .map(|(stream, e)| format!("{stream} stream failed: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-stream results of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppSummary {
    pub transactions: RunSummary,
    pub events: RunSummary,
}

/// Runs the transactions and events pipelines side by side.
pub struct App {
    transactions: HeightPipeline<TransactionsProducer>,
    events: HeightPipeline<EventsProducer>,
}

impl App {
    pub fn new(
        transactions: HeightPipeline<TransactionsProducer>,
        events: HeightPipeline<EventsProducer>,
    ) -> Self {
        Self {
            transactions,
            events,
        }
    }

    /// Run both streams until `token` is cancelled or one of them fails.
    ///
    /// A failing stream cancels its sibling, and the errors of both are
    /// returned together.
    pub async fn run(&self, token: CancellationToken) -> Result<AppSummary, AppError> {
        let streams = token.child_token();

        let (txs, events) = tokio::join!(
            Self::supervise(self.transactions.run(streams.clone()), &streams),
            Self::supervise(self.events.run(streams.clone()), &streams),
        );

        let mut errors = Vec::new();
        let mut summary = AppSummary::default();
        match txs {
            Ok(s) => summary.transactions = s,
            Err(e) => errors.push((StreamKind::Transactions, e)),
        }
        match events {
            Ok(s) => summary.events = s,
            Err(e) => errors.push((StreamKind::Events, e)),
        }

        if errors.is_empty() {
            Ok(summary)
        } else {
            Err(AppError::Streams(errors))
        }
    }

    async fn supervise(
        run: impl std::future::Future<Output = Result<RunSummary, PipelineError>>,
        streams: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let res = run.await;
        if let Err(e) = &res {
            tracing::error!(error = %e, "stream stopped, shutting down the other one");
            streams.cancel();
        }
        res
    }
}
