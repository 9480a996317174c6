#![forbid(unsafe_code)]

use crate::error::Error;
use metrics::MetricKind;
use serde::{Deserialize, Serialize};

pub const CHUNK_SCHEMA_VERSION: u32 = 1;

/// One persisted sample: timestamp, value and, when the sample was taken
/// while moving, the moving time it fell on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkPoint {
    pub t: u64,
    pub v: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<u64>,
}

/// Immutable batch of samples for a single metric. Sequence numbers are
/// contiguous per session and start at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub sequence: u32,
    pub metric: MetricKind,
    pub samples: Vec<ChunkPoint>,
}

impl StreamChunk {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(sequence: u32, bytes: &[u8]) -> Result<Self, Error> {
        let chunk: Self = serde_json::from_slice(bytes).map_err(|err| Error::CorruptChunk {
            sequence,
            reason: err.to_string(),
        })?;
        if chunk.sequence != sequence {
            return Err(Error::CorruptChunk {
                sequence,
                reason: format!("payload carries sequence {}", chunk.sequence),
            });
        }
        Ok(chunk)
    }
}
