//! `actions/cache`
//!
//! Looks the key up in the dependency cache, restores an exact or partial
//! match into `path` and, unless the primary key hit exactly, registers a
//! post-run save. Backend failures never fail the step: they are reported
//! and treated as a miss.

use super::{ActionContext, ActionError, ActionOutcome, PostAction, bool_input, input, multiline_input};
use crate::cache::{CacheBackend, CacheKey, CacheLookup};
use std::path::PathBuf;
use stepwise_events::{
    emit_cache_hit, emit_cache_miss, emit_cache_restored, emit_cache_saved, emit_cache_unavailable,
};

const ACTION: &str = "actions/cache";

pub(super) async fn run(
    inputs: &indexmap::IndexMap<String, String>,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let primary = input(inputs, "key").ok_or(ActionError::MissingInput {
        action: ACTION,
        input: "key",
    })?;
    let key = CacheKey::new(primary, multiline_input(inputs, "restore-keys"));
    let lookup_only = bool_input(ACTION, inputs, "lookup-only")?;
    let fail_on_miss = bool_input(ACTION, inputs, "fail-on-cache-miss")?;

    let mut outcome = ActionOutcome::default()
        .with_output("cache-hit", "false")
        .with_output("cache-primary-key", key.primary.clone());

    let paths: Vec<PathBuf> = multiline_input(inputs, "path")
        .iter()
        .map(|raw| ctx.resolve_path(raw))
        .collect();
    if paths.is_empty() {
        // Usually an unresolved `${{ env.X }}`
        emit_cache_unavailable!(key.primary, "path resolved to an empty value, nothing to cache");
        return Ok(outcome);
    }

    let lookup = match (&ctx.cache, ctx.cache_policy.allows_read()) {
        (Some(backend), true) => lookup(backend.as_ref(), &key).await,
        _ => {
            tracing::debug!(policy = %ctx.cache_policy, "Cache reads disabled");
            CacheLookup::Miss
        }
    };

    let exact = match &lookup {
        CacheLookup::Exact(entry) => {
            let restored = lookup_only || restore(ctx, entry, &paths).await?;
            if restored {
                emit_cache_hit!(entry.key);
            }
            restored
        }
        CacheLookup::Partial { entry, .. } => {
            if lookup_only || restore(ctx, entry, &paths).await? {
                emit_cache_restored!(key.primary, entry.key);
                outcome = outcome.with_output("cache-matched-key", entry.key.clone());
            }
            false
        }
        CacheLookup::Miss => false,
    };

    if exact {
        outcome = outcome
            .with_output("cache-hit", "true")
            .with_output("cache-matched-key", key.primary.clone());
        return Ok(outcome);
    }

    if !outcome.outputs.contains_key("cache-matched-key") {
        emit_cache_miss!(key.primary);
        if fail_on_miss {
            return Err(ActionError::CacheMiss { key: key.primary });
        }
    }

    if ctx.cache.is_some() && ctx.cache_policy.allows_write() {
        outcome.post = Some(PostAction::SaveCache {
            key: key.primary,
            paths,
        });
    }
    Ok(outcome)
}

async fn lookup(backend: &dyn CacheBackend, key: &CacheKey) -> CacheLookup {
    match backend.lookup(key).await {
        Ok(lookup) => lookup,
        Err(error) => {
            emit_cache_unavailable!(key.primary, error);
            CacheLookup::Miss
        }
    }
}

/// Restore `entry`; `false` when a degradable backend error turned it into a
/// miss.
async fn restore(
    ctx: &ActionContext<'_>,
    entry: &crate::cache::CacheEntry,
    paths: &[PathBuf],
) -> Result<bool, ActionError> {
    let Some(backend) = &ctx.cache else {
        return Ok(false);
    };
    match backend.restore(entry, paths).await {
        Ok(bytes) => {
            tracing::info!(key = %entry.key, bytes, "Cache restored from key");
            Ok(true)
        }
        Err(error) if error.is_gracefully_degradable() => {
            emit_cache_unavailable!(entry.key, error);
            Ok(false)
        }
        Err(error) => Err(error.into()),
    }
}

/// Run a post-run cache save. Failures are reported, never raised.
pub async fn save(backend: &dyn CacheBackend, key: &str, paths: &[PathBuf]) -> bool {
    match backend.save(key, paths).await {
        Ok(entry) => {
            emit_cache_saved!(entry.key, entry.size_bytes);
            true
        }
        Err(error) => {
            emit_cache_unavailable!(key, error);
            false
        }
    }
}
