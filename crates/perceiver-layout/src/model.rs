use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Page-absolute box of the measured scope (the whole page or one element).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One measured word as reported by the probe: page-absolute top-left corner plus size.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A visible text token anchored at its lower-left corner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub text: String,
    pub bottom_left: Point,
    /// `bottom_left` relative to the container, in `0..=1` for tokens inside it.
    pub bottom_left_normalized: Point,
    pub width: f64,
    pub height: f64,
}

impl TextAnnotation {
    pub fn from_word_box(word: &WordBox, container: &ContainerBox) -> Self {
        let bottom_left = Point::new(word.x, word.y + word.height);
        let normalized = Point::new(
            normalize(bottom_left.x - container.x, container.width),
            normalize(bottom_left.y - container.y, container.height),
        );
        Self {
            text: word.text.clone(),
            bottom_left,
            bottom_left_normalized: normalized,
            width: word.width,
            height: word.height,
        }
    }

    /// Average width of one character of this token.
    pub fn char_width(&self) -> f64 {
        let chars = self.text.chars().count();
        if chars == 0 {
            return 0.0;
        }
        self.width / chars as f64
    }
}

fn normalize(offset: f64, extent: f64) -> f64 {
    if extent > 0.0 {
        offset / extent
    } else {
        0.0
    }
}
