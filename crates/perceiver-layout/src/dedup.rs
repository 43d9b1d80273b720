use std::collections::HashMap;

use crate::model::{Point, TextAnnotation};

/// Drop annotations that repeat the text of an already kept annotation less than `max_distance`
/// away. Nested candidates report the same visible word once per ancestor; this keeps the first.
///
/// Input order is preserved, and the output is a fixed point: every kept pair with the same text
/// is at least `max_distance` apart.
pub fn dedup(annotations: &[TextAnnotation], max_distance: f64) -> Vec<TextAnnotation> {
    let mut kept_by_text: HashMap<&str, Vec<Point>> = HashMap::new();
    let mut kept = Vec::with_capacity(annotations.len());

    for annotation in annotations {
        let anchors = kept_by_text.entry(annotation.text.as_str()).or_default();
        let duplicate = anchors
            .iter()
            .any(|anchor| anchor.distance(&annotation.bottom_left) < max_distance);
        if duplicate {
            continue;
        }
        anchors.push(annotation.bottom_left);
        kept.push(annotation.clone());
    }
    kept
}
