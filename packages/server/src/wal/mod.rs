//! Append-only commit log: framed writer and recovery replay.

mod recovery;
mod writer;

pub use recovery::{replay, REPLAY_BATCH_SIZE};
pub use writer::LogWriter;
