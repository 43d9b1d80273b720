//! Spatial text reconstruction for the text-oriented extraction strategy.
//!
//! Measured word boxes become [`TextAnnotation`]s, duplicates reported by nested candidates are
//! dropped with [`dedup`], and [`reconstruct`] renders what is left as monospace text that keeps
//! the page's visual arrangement.

pub mod dedup;
pub mod errors;
pub mod model;
pub mod probe;
pub mod reconstruct;

pub use dedup::dedup;
pub use errors::LayoutError;
pub use model::{ContainerBox, Point, TextAnnotation, WordBox};
pub use probe::{CdpLayoutProbe, LayoutProbe, ProbeCapture};
pub use reconstruct::{reconstruct, LayoutOptions};

/// Anchor every measured word against `container` and drop spatial duplicates.
pub fn annotate(
    words: &[WordBox],
    container: &ContainerBox,
    options: &LayoutOptions,
) -> Vec<TextAnnotation> {
    let annotations: Vec<TextAnnotation> = words
        .iter()
        .filter(|word| !word.text.trim().is_empty())
        .map(|word| TextAnnotation::from_word_box(word, container))
        .collect();
    dedup(&annotations, options.dedup_distance)
}
