pub mod elasticsearch;
pub mod memory;
pub mod traits;

pub use elasticsearch::{AuthMethod, ElasticsearchBackend};
pub use memory::MemoryBackend;
pub use traits::{ContinuationToken, ResultPage, SearchBackend};
