#![forbid(unsafe_code)]

mod aggregate;
mod buffer;
mod chunk;
mod store;
mod writer;

pub use aggregate::aggregate_all_chunks;
pub use buffer::StreamBuffer;
pub use chunk::{CHUNK_SCHEMA_VERSION, ChunkPoint, StreamChunk};
pub use store::{ChunkStore, MemoryChunkStore, SqliteChunkStore};
pub use writer::{ChunkWriter, WritePolicy, WriterReport, write_with_retry};
