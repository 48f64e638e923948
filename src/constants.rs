/// Constants used by bin generation and validation.
pub mod bins {
    /// Offset subtracted from the first low bound and added to the last high bound.
    pub const EDGE_MARGIN: f64 = 0.1;
    /// Bin bounds are kept at one decimal place.
    pub const DECIMAL_SCALE: f64 = 10.0;
    /// Tolerance used when comparing rounded bounds.
    pub const BOUND_EPSILON: f64 = 1e-9;
    /// Minimum number of ranges a caller-supplied bin set must contain.
    pub const MIN_BIN_COUNT: usize = 2;
}

/// Constants used by quota sampling and fold generation.
pub mod sampling {
    /// Fixed seed used to reseed every shuffle.
    pub const DEFAULT_SEED: u64 = 42;
    /// Largest shrink a test-set draw may apply before failing.
    pub const TEST_SET_MAX_SHRINK: f64 = 0.5;
    /// Largest shrink a fold draw may apply before failing.
    pub const FOLD_MAX_SHRINK: f64 = 0.1;
    /// Share of requested folds that must be generated for a dataset to be accepted.
    pub const MIN_FOLD_COMPLETION: f64 = 0.75;
    /// Slack subtracted before rounding quotas up, so `40.000000001` stays `40`.
    pub const QUOTA_EPSILON: f64 = 1e-9;
    /// Dataset name used for the main training folds.
    pub const TRAINING_DATASET: &str = "training";
    /// Dataset name used for the grid-search folds.
    pub const GRID_SEARCH_DATASET: &str = "grid_search";
    /// Target name used for the held-out test draw.
    pub const TEST_SET_TARGET: &str = "test set";
}

/// Constants used by corpus queries and label lookup.
pub mod corpus {
    /// Default cursor batch size for corpus queries.
    pub const DEFAULT_CURSOR_BATCH_SIZE: usize = 50;
    /// Nested sub-document holding achievement labels.
    pub const ACHIEVEMENT_PROGRESS_FIELD: &str = "achievement_progress";
    /// Factor applied to percentage-kind labels before any transform.
    pub const PERCENTAGE_SCALE: f64 = 100.0;
    /// Identifier reported by corpora loaded from JSON-lines files.
    pub const JSONL_CORPUS_ID: &str = "jsonl";
}
