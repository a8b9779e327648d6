//! Source-image retrieval with retry and temporal fallback.
//!
//! Transport lives behind the [`SourceFetcher`] trait so the scheduler and
//! the fallback search can be exercised against stub upstreams. The walk in
//! [`fetch_with_fallback`] owns everything above transport: body
//! validation, fingerprinting, the registry consult, and the
//! duplicate-exhausted downgrade.

mod http;

pub use http::HttpFetcher;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sunlapse_config::FetchConfig;
use sunlapse_model::{FetchResult, Fingerprint, SourceSpec, TargetInstant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::{DuplicateRegistry, Offer};

/// Transport-level failure of a single request.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Invalid bodies are worth probing neighboring instants for; hard
    /// unavailability (outage, timeout) is not, since it affects the
    /// neighbors equally and walking offsets only multiplies load on an
    /// already-failing upstream.
    fn advances_fallback(&self) -> bool {
        matches!(self, FetchError::InvalidImage(_))
    }
}

/// Retrieves one source image at one instant. Implementations do transport
/// only; validation and dedup live in the walk.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_at(
        &self,
        spec: &SourceSpec,
        time: DateTime<Utc>,
    ) -> Result<Vec<u8>, FetchError>;
}

/// What one source contributed to a frame attempt.
#[derive(Debug)]
pub struct SourceFetchReport {
    pub outcome: Result<FetchResult, FetchError>,
    /// Transport attempts made; feeds the frame record's attempt counter.
    pub attempts: u32,
    /// Offsets rejected as duplicates before the walk settled.
    pub duplicates_hit: u32,
}

/// Walk the source's fallback offsets in declared order until an offset
/// yields a valid body the registry accepts.
///
/// Per offset, up to `attempts_per_offset` transport attempts are made with
/// linearly increasing delay. If every offset produced a duplicate, the
/// last duplicate-rejected body is returned as a best effort carrying the
/// `duplicate_of` marker.
pub async fn fetch_with_fallback(
    fetcher: &dyn SourceFetcher,
    registry: &DuplicateRegistry,
    target: &TargetInstant,
    spec: &SourceSpec,
    config: &FetchConfig,
    cancel: &CancellationToken,
) -> SourceFetchReport {
    let mut attempts = 0u32;
    let mut duplicates_hit = 0u32;
    let mut last_duplicate: Option<FetchResult> = None;
    let mut last_error: Option<FetchError> = None;

    'offsets: for &offset in &spec.fallback_offsets {
        let time = target.time + chrono::Duration::minutes(i64::from(offset));

        for attempt in 1..=config.attempts_per_offset {
            if cancel.is_cancelled() {
                break 'offsets;
            }
            attempts += 1;

            match fetcher.fetch_at(spec, time).await {
                Ok(bytes) => {
                    if (bytes.len() as u64) < config.min_body_bytes {
                        let err = FetchError::InvalidImage(format!(
                            "{} byte body below {} byte floor",
                            bytes.len(),
                            config.min_body_bytes
                        ));
                        last_error = Some(err);
                        if attempt < config.attempts_per_offset {
                            tokio::time::sleep(config.retry_delay(attempt))
                                .await;
                        }
                        continue;
                    }

                    let fingerprint = Fingerprint::of(&bytes);
                    match registry.offer(spec.kind, fingerprint, target.index)
                    {
                        Offer::Accepted => {
                            if offset != 0 {
                                debug!(
                                    kind = %spec.kind,
                                    frame = %target.key(),
                                    offset,
                                    "accepted fallback offset"
                                );
                            }
                            return SourceFetchReport {
                                outcome: Ok(FetchResult {
                                    bytes,
                                    fingerprint,
                                    actual_time: time,
                                    offset_applied: offset,
                                    kind: spec.kind,
                                    duplicate_of: None,
                                }),
                                attempts,
                                duplicates_hit,
                            };
                        }
                        Offer::DuplicateOf(prev) => {
                            duplicates_hit += 1;
                            debug!(
                                kind = %spec.kind,
                                frame = %target.key(),
                                offset,
                                prev,
                                "fingerprint already bound, trying next offset"
                            );
                            last_duplicate = Some(FetchResult {
                                bytes,
                                fingerprint,
                                actual_time: time,
                                offset_applied: offset,
                                kind: spec.kind,
                                duplicate_of: Some(prev),
                            });
                            // Refetching the same instant cannot change the
                            // fingerprint; move on.
                            continue 'offsets;
                        }
                    }
                }
                Err(err) => {
                    let exhausted = attempt == config.attempts_per_offset;
                    if !exhausted {
                        tokio::time::sleep(config.retry_delay(attempt)).await;
                        last_error = Some(err);
                        continue;
                    }

                    if err.advances_fallback() {
                        last_error = Some(err);
                        continue 'offsets;
                    }

                    warn!(
                        kind = %spec.kind,
                        frame = %target.key(),
                        offset,
                        error = %err,
                        "source unavailable after retry budget"
                    );
                    return SourceFetchReport {
                        outcome: Err(err),
                        attempts,
                        duplicates_hit,
                    };
                }
            }
        }
    }

    if let Some(duplicate) = last_duplicate {
        // Every offset produced a known image. Keeping the best-effort body
        // beats a hole in the window; the record carries the marker.
        warn!(
            kind = %spec.kind,
            frame = %target.key(),
            "fallback offsets exhausted by duplicates, keeping best effort"
        );
        return SourceFetchReport {
            outcome: Ok(duplicate),
            attempts,
            duplicates_hit,
        };
    }

    let error = last_error.unwrap_or_else(|| {
        FetchError::Unavailable("cancelled before first attempt".to_string())
    });
    SourceFetchReport {
        outcome: Err(error),
        attempts,
        duplicates_hit,
    }
}
