// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Write-conflict retry combinator.

use super::error::StoreError;
use super::snapshot::OperationContext;

/// Runs `f` until it succeeds or exhausts `max_attempts`.
///
/// Only [`StoreError::Conflict`] is retried: the context's snapshot is
/// abandoned first so the retry re-reads fresh state (and may re-select a
/// view). Every other error surfaces immediately; the last conflict
/// surfaces once attempts run out.
pub fn with_write_conflict_retry<T, F>(
    ctx: &mut OperationContext,
    max_attempts: u32,
    mut f: F,
) -> Result<T, StoreError>
where
    F: FnMut(&mut OperationContext) -> Result<T, StoreError>,
{
    let mut attempt = 0u32;
    loop {
        match f(ctx) {
            Ok(value) => return Ok(value),
            Err(StoreError::Conflict(msg)) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(StoreError::Conflict(msg));
                }
                tracing::debug!(attempt, conflict = %msg, "write conflict, retrying from a fresh snapshot");
                ctx.abandon_snapshot();
            }
            Err(err) => return Err(err),
        }
    }
}
