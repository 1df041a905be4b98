/// Engine-wide tuning knobs, applied to every collection a database opens.
#[derive(Debug, Clone)]
pub struct Config {
    /// N-gram window length for full-text indexes.
    pub ngram_size: usize,
    /// Capacity of the clean-node read cache kept per index.
    pub node_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ngram_size: 3,
            node_cache_capacity: 256,
        }
    }
}
