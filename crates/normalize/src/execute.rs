//! Concurrent execution of normalize plans over a bounded connection pool.

use crate::{plan::Plan, Error};
use futures::StreamExt;
use itertools::Itertools;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Run `plans` with at most `parallel` statements in flight, each on its
/// own destination connection. The pool is seeded with the invocation-
/// shared connection (the coordinator has yielded for the duration); the
/// rest are opened fresh and released when the pool drains. The first plan
/// error cancels the run: no further plan starts, in-flight statements
/// finish, and the error surfaces once everything has settled.
pub async fn execute_plans(
    destination: &dyn destination::Destination,
    flow_job_name: &str,
    window: (i64, i64),
    plans: Vec<Plan>,
    parallel: u32,
    token: &CancellationToken,
) -> Result<(), Error> {
    if plans.is_empty() {
        return Ok(());
    }

    // Wider than the distinct table count cannot help: per (table, part)
    // there is exactly one plan per invocation.
    let distinct_tables = plans
        .iter()
        .map(|p| p.destination_table.as_str())
        .unique()
        .count() as u32;
    let width = parallel.clamp(1, distinct_tables) as usize;

    let mut connections = vec![destination.shared()];
    for _ in 1..width {
        connections.push(
            destination
                .connect()
                .await
                .map_err(|source| Error::Destination {
                    flow_job_name: flow_job_name.to_string(),
                    source,
                })?,
        );
    }
    let pool = Arc::new(Mutex::new(connections));

    let cancelled = token.child_token();

    let mut outcomes = futures::stream::iter(plans.into_iter().map(|plan| {
        let pool = pool.clone();
        let cancelled = cancelled.clone();
        async move {
            if cancelled.is_cancelled() {
                return (plan, None);
            }
            let connection = pool.lock().unwrap().pop();
            let Some(connection) = connection else {
                // The pool is sized to the stream width, so this is only
                // reachable if the buffering invariant breaks.
                return (
                    plan,
                    Some(Err(anyhow::anyhow!("normalize connection pool exhausted"))),
                );
            };

            let started = Instant::now();
            let result = connection
                .execute(&plan.sql)
                .await
                .map(|()| started.elapsed());
            pool.lock().unwrap().push(connection);
            (plan, Some(result))
        }
    }))
    .buffer_unordered(width);

    let mut first_error: Option<Error> = None;
    while let Some((plan, outcome)) = outcomes.next().await {
        match outcome {
            // Dropped unexecuted after cancellation.
            None => {}
            Some(Ok(elapsed)) => {
                tracing::info!(
                    flow_job_name,
                    table = plan.destination_table,
                    part = plan.part,
                    parts = plan.parts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "normalized table part"
                );
            }
            Some(Err(source)) => {
                tracing::error!(
                    flow_job_name,
                    table = plan.destination_table,
                    part = plan.part,
                    error = %source,
                    "normalize plan failed"
                );
                if first_error.is_none() {
                    first_error = Some(Error::Plan {
                        flow_job_name: flow_job_name.to_string(),
                        table: plan.destination_table.clone(),
                        start: window.0,
                        end: window.1,
                        source,
                    });
                }
                cancelled.cancel();
            }
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }
    if token.is_cancelled() {
        return Err(Error::Cancelled {
            flow_job_name: flow_job_name.to_string(),
        });
    }
    Ok(())
}
