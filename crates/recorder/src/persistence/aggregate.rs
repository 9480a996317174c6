#![forbid(unsafe_code)]

use crate::domain::SessionId;
use crate::error::Error;
use crate::persistence::ChunkStore;
use metrics::{AggregatorSettings, Calibration, RollingAggregator};
use tracing::{debug, info};

/// Rebuilds a session's aggregates from its durable chunks alone.
///
/// Chunks are folded in sequence order from zero up to `expected` (or up to
/// the highest stored sequence when the count is unknown). A gap or an
/// unreadable chunk fails with [`Error::IncompleteAggregation`] naming it.
pub async fn aggregate_all_chunks(
    store: &dyn ChunkStore,
    session: SessionId,
    expected: Option<u32>,
    settings: AggregatorSettings,
    calibration: Calibration,
) -> Result<RollingAggregator, Error> {
    let expected = match expected {
        Some(count) => count,
        None => store
            .sequences(session)
            .await?
            .last()
            .map_or(0, |last| last + 1),
    };

    let mut aggregator = RollingAggregator::new(settings, calibration);
    let mut folded = 0usize;
    for sequence in 0..expected {
        let chunk = match store.read(session, sequence).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                return Err(Error::IncompleteAggregation {
                    sequence,
                    reason: "chunk is missing".into(),
                });
            }
            Err(err) => {
                return Err(Error::IncompleteAggregation {
                    sequence,
                    reason: err.to_string(),
                });
            }
        };
        for point in &chunk.samples {
            aggregator
                .apply(chunk.metric, point.v, point.t, point.m)
                .map_err(|err| Error::IncompleteAggregation {
                    sequence,
                    reason: err.to_string(),
                })?;
        }
        folded += chunk.samples.len();
        debug!(%session, sequence, metric = %chunk.metric, samples = chunk.samples.len(), "chunk folded");
    }

    info!(%session, chunks = expected, samples = folded, "session re-aggregated from chunks");
    Ok(aggregator)
}
