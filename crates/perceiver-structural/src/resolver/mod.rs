//! Mapping between accessibility backend ids and scanner candidates.

pub mod correlate;

pub use correlate::{build_correlation_map, CorrelationMap};
