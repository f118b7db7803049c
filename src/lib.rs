//! Word and paragraph embeddings trained with shallow networks (CBOW,
//! skip-gram, PV-DM, PV-DBOW), using hierarchical softmax and/or negative
//! sampling, on many threads that update shared weights without locks.

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

/// Lines longer than this are trained as several segments.
pub const MAX_SENTENCE_LENGTH: usize = 1000;

pub mod config;
pub mod context;
pub mod corpus;
pub mod huffman;
pub mod layer;
pub mod linalg;
pub mod logging;
pub mod model;
pub mod negative;
pub mod rng;
pub mod schedule;
pub mod sigmoid;
pub mod table;
pub mod train;
pub mod vocab;

pub use config::{ModelKind, TrainConfig};
pub use corpus::Corpus;
pub use model::Model;
pub use table::{EmbeddingTable, Role};
pub use train::{TrainStats, Trainer};
pub use vocab::{EntryKind, VocabEntry, Vocabulary};
