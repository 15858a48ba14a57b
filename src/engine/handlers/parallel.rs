//! Parallel step handler
//!
//! Each branch runs as its own task on a `JoinSet`. Join policies:
//! - `all`: wait for every branch; the step succeeds whatever the branches did
//! - `any`: resolve on the first successful branch; fail only if none succeed
//! - `first`: resolve on the first branch to settle, success or failure
//!
//! Branches still running when `any` or `first` resolves are aborted and
//! reported as skipped.

use futures::FutureExt;
use serde_json::json;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};

use crate::engine::error::StepError;
use crate::engine::execution::BranchResult;
use crate::engine::executor::{NestedOutcome, StepContext, StepExecutor, StepOutput};
use crate::workflow::{Step, WaitFor};

pub async fn run_parallel(
    executor: &StepExecutor,
    step: &Step,
    ctx: StepContext,
) -> Result<StepOutput, StepError> {
    let fan_out = step.parallel_config.clone().unwrap_or_default();
    let mut results: BTreeMap<String, BranchResult> = BTreeMap::new();
    let mut nested = Vec::new();
    let mut tasks = JoinSet::new();

    for branch_id in &fan_out.branches {
        let Some(branch) = ctx.definition.step(branch_id).cloned() else {
            let error = StepError::StepNotFound(branch_id.clone()).to_string();
            nested.push(NestedOutcome::failed(branch_id, error.clone()));
            results.insert(branch_id.clone(), BranchResult::failed(error));
            continue;
        };

        let branch_executor = executor.clone();
        let branch_ctx = ctx.clone();
        let id = branch_id.clone();
        tasks.spawn(async move {
            let outcome = AssertUnwindSafe(branch_executor.execute(&branch, branch_ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(StepError::ActionFailed("branch panicked".to_string())));
            (id, outcome)
        });
    }

    info!(
        "Parallel {} started {} branch(es), waiting for {:?}",
        step.id,
        tasks.len(),
        fan_out.wait_for
    );

    let mut succeeded = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let Some(settled_ok) = settle(step, joined, &mut results, &mut nested) else {
            continue;
        };
        if settled_ok {
            succeeded += 1;
        }

        let resolved = match fan_out.wait_for {
            WaitFor::All => false,
            WaitFor::Any => settled_ok,
            WaitFor::First => true,
        };
        if resolved {
            break;
        }
    }

    // Branches that finished before the join resolved keep their outcome
    while let Some(joined) = tasks.try_join_next() {
        if settle(step, joined, &mut results, &mut nested) == Some(true) {
            succeeded += 1;
        }
    }

    if !tasks.is_empty() {
        tasks.shutdown().await;
        for branch_id in &fan_out.branches {
            if !results.contains_key(branch_id) {
                nested.push(NestedOutcome::skipped(branch_id));
            }
        }
    }

    if fan_out.wait_for == WaitFor::Any && succeeded == 0 && !fan_out.branches.is_empty() {
        return Err(StepError::NoBranchSucceeded {
            branch_results: results,
        });
    }

    let failed = results.values().filter(|r| !r.success).count();
    let output = json!({
        "parallel": true,
        "waitFor": fan_out.wait_for,
        "results": results
            .iter()
            .map(|(id, r)| (id.clone(), r.result.clone()))
            .collect::<serde_json::Map<_, _>>(),
        "succeeded": succeeded,
        "failed": failed,
    });

    Ok(StepOutput {
        output,
        branch_results: Some(results),
        nested,
        ..StepOutput::default()
    })
}

type Joined = Result<(String, Result<StepOutput, StepError>), JoinError>;

/// Record one joined branch; `Some(success)` unless the task itself was lost
fn settle(
    step: &Step,
    joined: Joined,
    results: &mut BTreeMap<String, BranchResult>,
    nested: &mut Vec<NestedOutcome>,
) -> Option<bool> {
    let (branch_id, outcome) = match joined {
        Ok(settled) => settled,
        Err(e) => {
            warn!("Branch task of {} did not complete: {}", step.id, e);
            return None;
        }
    };

    match outcome {
        Ok(out) => {
            results.insert(branch_id.clone(), BranchResult::succeeded(out.output.clone()));
            nested.push(NestedOutcome::completed(&branch_id, out.output));
            nested.extend(out.nested);
            Some(true)
        }
        Err(e) => {
            warn!("Branch {} of {} failed: {}", branch_id, step.id, e);
            results.insert(branch_id.clone(), BranchResult::failed(e.to_string()));
            nested.push(NestedOutcome::failed(&branch_id, e.to_string()));
            Some(false)
        }
    }
}
