pub mod audio_service;
pub mod codec;
pub mod dsp;
pub mod extractor;
pub mod probe;
pub mod retrieval_service;
pub mod search_cache;
pub mod thumbnail;
pub mod worker_pool;
