pub mod core;
pub mod operations;

pub use self::core::{HNSWConfig, HNSWError, HNSWIndex, HNSWNode};

pub use self::operations::{BatchReport, GraphStats};
