//! Accessibility tree construction and node-level grounding primitives.

pub mod api;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod model;
pub mod policy;
pub mod ports;
pub mod resolver;
pub mod structural;
pub mod tree;

pub use api::StructuralPerceiver;
pub use errors::PerceiverError;
pub use model::{AccessibilityNode, AccessibilityTree, AxProperty, AxValue, RawAxNode};
pub use policy::TreeOptions;
pub use ports::{AccessibilityPort, AdapterPort};
pub use resolver::{build_correlation_map, CorrelationMap};
pub use structural::StructuralPerceiverImpl;
pub use tree::{build_tree, decorate_scrollables, is_structural, render_simplified};
