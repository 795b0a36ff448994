//! The instant pre-ranking pipeline: per-solution orchestration.
//!
//! Ordered, fast-fail: fetch the solution body, run the cheap constraint
//! checks, simulate, run the result-dependent checks, extract features.
//! The pipeline never propagates an error to the coordinator; every path
//! ends in a pass or fail outcome, which the owning intent task records.

use crate::{
    features::extract_features,
    validate::{validate_post_simulation, validate_pre_simulation},
};
use preranker_types::{
    DryRunStatus, FailReason, FailedRecord, Intent, PassedRecord, SolutionSubmittedEvent,
    ValidationError,
};
use preranker_upstream::{BlobFetch, DryRunner};
use std::{sync::Arc, time::Duration};


/// The services and deadlines a pipeline invocation runs with.
#[derive(Clone)]
pub(crate) struct PipelineServices {
    pub blob: Arc<dyn BlobFetch>,
    pub simulator: Arc<dyn DryRunner>,
    pub fetch_timeout: Duration,
    pub simulator_timeout: Duration,
}

/// Terminal outcome of one pipeline invocation.
#[derive(Debug)]
pub(crate) enum PipelineOutcome {
    Passed(PassedRecord),
    Failed(FailedRecord),
}

fn failed(
    solution_id: &str,
    reason: FailReason,
    errors: Vec<ValidationError>,
    error_msg: Option<String>,
) -> PipelineOutcome {
    PipelineOutcome::Failed(FailedRecord {
        solution_id: solution_id.to_string(),
        reason,
        errors,
        error_msg,
        failed_at_ms: crate::now_ms(),
    })
}

/// Run one solution through the pipeline.
#[tracing::instrument(
    skip_all,
    fields(intent_id = %event.intent_id, solution_id = %event.solution_id)
)]
pub(crate) async fn prerank_solution(
    services: &PipelineServices,
    intent: &Intent,
    event: &SolutionSubmittedEvent,
) -> PipelineOutcome {
    let solution_id = event.solution_id.as_str();

    let fetched = tokio::time::timeout(
        services.fetch_timeout,
        services.blob.fetch_solution(&event.blob_id),
    )
    .await;
    let solution = match fetched {
        Ok(Ok(solution)) => solution,
        Ok(Err(err)) => {
            tracing::debug!(%err, "solution fetch failed");
            return failed(
                solution_id,
                FailReason::FetchFailed,
                vec![],
                Some(err.to_string()),
            );
        }
        Err(_) => {
            tracing::debug!("solution fetch timed out");
            return failed(
                solution_id,
                FailReason::FetchFailed,
                vec![],
                Some("fetch timed out".to_string()),
            );
        }
    };

    let report = validate_pre_simulation(
        intent,
        &solution,
        solution.submitted_at_ms,
        intent.window_end_ms,
    );
    if !report.ok() {
        return failed(
            solution_id,
            FailReason::ConstraintValidationFailed,
            report.errors,
            None,
        );
    }

    let dry_run = match tokio::time::timeout(
        services.simulator_timeout,
        services.simulator.dry_run(&solution.transaction_bytes),
    )
    .await
    {
        Ok(Ok(dry_run)) => dry_run,
        Ok(Err(err)) => {
            tracing::debug!(%err, "dry run call failed");
            return failed(
                solution_id,
                FailReason::DryRunFailed,
                vec![],
                Some(err.to_string()),
            );
        }
        Err(_) => {
            tracing::debug!("dry run timed out");
            return failed(
                solution_id,
                FailReason::DryRunFailed,
                vec![],
                Some("dry run timed out".to_string()),
            );
        }
    };
    if dry_run.status == DryRunStatus::Fail {
        return failed(
            solution_id,
            FailReason::DryRunFailed,
            vec![],
            dry_run.error_msg.clone(),
        );
    }

    let report = validate_post_simulation(intent, &dry_run);
    if !report.ok() {
        return failed(
            solution_id,
            FailReason::ComplexValidationFailed,
            report.errors,
            None,
        );
    }

    let features = extract_features(intent, &solution, &dry_run);
    PipelineOutcome::Passed(PassedRecord {
        solution_id: solution_id.to_string(),
        solution,
        features,
        dry_run,
        passed_at_ms: crate::now_ms(),
    })
}
