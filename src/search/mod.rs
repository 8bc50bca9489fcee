pub mod chunker;
pub mod embedder;
pub mod indexer;
pub mod retriever;
pub mod store;

pub use chunker::{Chunker, Heading, HeadingRule};
pub use embedder::{create_embedder, Embedder, HashEmbedder};
pub use indexer::{IndexResult, Indexer};
pub use retriever::{Passage, Retriever};
pub use store::{
    Chunk, Collection, EmbeddingRecord, ParquetStore, SearchResult, StoreMetadata, StoreStats,
};
