//! Approximate monospace rendering of measured page text.
//!
//! Tokens are clustered into lines by their vertical anchor, merged into phrases when they touch
//! horizontally, and laid onto a character grid whose column width is the average glyph width of
//! the page. Vertical gaps become blank rows.

use serde::{Deserialize, Serialize};

use crate::model::TextAnnotation;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Max vertical distance from a line's first anchor for a token to join that line.
    pub line_threshold: f64,
    /// Same-text annotations closer than this are duplicates.
    pub dedup_distance: f64,
    pub height_tolerance: f64,
    /// Horizontal gap allowed between grouped tokens, in character widths.
    pub char_padding: f64,
    /// Median group height above which a phrase is rendered as `**emphasis**`.
    pub emphasis_height: f64,
    /// Nominal line height used to turn vertical gaps into blank rows.
    pub row_height: f64,
    pub border_width: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            line_threshold: 10.0,
            dedup_distance: 15.0,
            height_tolerance: 4.0,
            char_padding: 1.0,
            emphasis_height: 25.0,
            row_height: 20.0,
            border_width: 80,
        }
    }
}

/// Token in container-relative pixel space.
#[derive(Clone, Debug)]
struct Placed<'a> {
    text: &'a str,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    char_width: f64,
}

#[derive(Debug)]
struct Group {
    text: String,
    x: f64,
}

pub fn reconstruct(
    annotations: &[TextAnnotation],
    container_width: f64,
    container_height: f64,
    options: &LayoutOptions,
) -> String {
    let border = "-".repeat(options.border_width);
    let mut placed: Vec<Placed<'_>> = annotations
        .iter()
        .filter(|annotation| !annotation.text.trim().is_empty())
        .map(|annotation| Placed {
            text: annotation.text.as_str(),
            x: annotation.bottom_left_normalized.x * container_width,
            y: annotation.bottom_left_normalized.y * container_height,
            width: annotation.width,
            height: annotation.height,
            char_width: annotation.char_width(),
        })
        .collect();
    if placed.is_empty() {
        return format!("{border}\n{border}");
    }

    let char_width = grid_char_width(&placed);
    placed.sort_by(|a, b| a.y.total_cmp(&b.y));
    let lines = cluster_lines(placed, options.line_threshold);

    let grid_width = ((container_width / char_width).ceil() as usize).max(1);
    let max_blank_rows = (container_height / options.row_height.max(1.0)).ceil().max(0.0) as usize;

    let mut rows: Vec<String> = Vec::new();
    let mut previous_y: Option<f64> = None;
    for (anchor_y, mut line) in lines {
        if let Some(previous) = previous_y {
            let gap = anchor_y - previous;
            let blanks = ((gap / options.row_height).round() as i64 - 1).max(0) as usize;
            rows.extend(std::iter::repeat(String::new()).take(blanks.min(max_blank_rows)));
        }
        previous_y = Some(anchor_y);

        line.sort_by(|a, b| a.x.total_cmp(&b.x));
        let groups = group_line(&line, options);
        rows.push(lay_out_row(&groups, char_width, grid_width));
    }

    let body = rows
        .iter()
        .map(|row| row.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    format!("{border}\n{body}\n{border}")
}

fn grid_char_width(placed: &[Placed<'_>]) -> f64 {
    let widths: Vec<f64> = placed
        .iter()
        .map(|token| token.char_width)
        .filter(|width| *width > 0.0 && width.is_finite())
        .collect();
    if widths.is_empty() {
        return 1.0;
    }
    (widths.iter().sum::<f64>() / widths.len() as f64).max(1.0)
}

/// Tokens must already be sorted by `y`. Each line is keyed by its first token's anchor.
fn cluster_lines(sorted: Vec<Placed<'_>>, threshold: f64) -> Vec<(f64, Vec<Placed<'_>>)> {
    let mut lines: Vec<(f64, Vec<Placed<'_>>)> = Vec::new();
    for token in sorted {
        match lines.last_mut() {
            Some((anchor, members)) if (token.y - *anchor).abs() <= threshold => {
                members.push(token);
            }
            _ => lines.push((token.y, vec![token])),
        }
    }
    lines
}

/// Tokens must already be sorted by `x`.
fn group_line(line: &[Placed<'_>], options: &LayoutOptions) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut current: Vec<&Placed<'_>> = Vec::new();

    for token in line {
        if let Some(last) = current.last() {
            let gap = token.x - (last.x + last.width);
            let touching = gap <= last.char_width * options.char_padding;
            let similar = (token.height - last.height).abs() <= options.height_tolerance;
            if !(touching && similar) {
                groups.push(finish_group(&current, options));
                current.clear();
            }
        }
        current.push(token);
    }
    if !current.is_empty() {
        groups.push(finish_group(&current, options));
    }
    groups
}

fn finish_group(members: &[&Placed<'_>], options: &LayoutOptions) -> Group {
    let mut text = String::new();
    for member in members {
        let token = member.text.trim();
        if !text.is_empty() && !is_punctuation(token) {
            text.push(' ');
        }
        text.push_str(token);
    }

    let mut heights: Vec<f64> = members.iter().map(|member| member.height).collect();
    heights.sort_by(|a, b| a.total_cmp(b));
    let median = if heights.len() % 2 == 1 {
        heights[heights.len() / 2]
    } else {
        (heights[heights.len() / 2 - 1] + heights[heights.len() / 2]) / 2.0
    };
    if median > options.emphasis_height && text.chars().any(char::is_alphanumeric) {
        text = format!("**{text}**");
    }

    Group {
        text,
        x: members.first().map(|member| member.x).unwrap_or_default(),
    }
}

fn is_punctuation(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|ch| matches!(ch, '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '%'))
}

fn lay_out_row(groups: &[Group], char_width: f64, grid_width: usize) -> String {
    let mut row: Vec<char> = vec![' '; grid_width];
    let mut cursor = 0usize;
    for (position, group) in groups.iter().enumerate() {
        let desired = (group.x.max(0.0) / char_width).floor() as usize;
        let column = if position == 0 {
            desired
        } else {
            desired.max(cursor + 1)
        };
        let chars: Vec<char> = group.text.chars().collect();
        let end = column + chars.len();
        if end > row.len() {
            row.resize(end, ' ');
        }
        row[column..end].copy_from_slice(&chars);
        cursor = end;
    }
    row.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::dedup;
    use crate::model::Point;

    const W: f64 = 1024.0;
    const H: f64 = 512.0;

    fn token(text: &str, x: f64, y: f64, height: f64) -> TextAnnotation {
        TextAnnotation {
            text: text.into(),
            bottom_left: Point::new(x, y),
            bottom_left_normalized: Point::new(x / W, y / H),
            width: 10.0 * text.chars().count() as f64,
            height,
        }
    }

    fn body(rendered: &str) -> Vec<&str> {
        let lines: Vec<&str> = rendered.lines().collect();
        lines[1..lines.len() - 1].to_vec()
    }

    #[test]
    fn nested_submit_renders_once() {
        let annotations = vec![
            token("Submit", 100.0, 40.0, 16.0),
            token("Submit", 101.0, 41.5, 16.0),
        ];
        let options = LayoutOptions::default();
        let kept = dedup(&annotations, options.dedup_distance);
        let rendered = reconstruct(&kept, W, H, &options);
        assert_eq!(rendered.matches("Submit").count(), 1);
    }

    #[test]
    fn touching_tokens_group_and_lines_cluster() {
        let annotations = vec![
            token("world", 60.0, 22.0, 16.0),
            token("Hello", 0.0, 20.0, 16.0),
            token("!", 110.0, 21.0, 16.0),
            token("Total", 0.0, 60.0, 16.0),
            token("42", 300.0, 60.0, 16.0),
        ];
        let rendered = reconstruct(&annotations, W, H, &LayoutOptions::default());
        let rows = body(&rendered);
        assert_eq!(rows[0], "Hello world!");
        assert_eq!(rows[1], "");
        assert_eq!(rows[2], format!("Total{}42", " ".repeat(25)));
        assert!(rendered.starts_with(&"-".repeat(80)));
        assert!(rendered.ends_with(&"-".repeat(80)));
    }

    #[test]
    fn tall_text_is_emphasized() {
        let annotations = vec![
            token("Welcome", 0.0, 40.0, 32.0),
            token("back", 80.0, 40.0, 32.0),
            token("---", 0.0, 100.0, 32.0),
        ];
        let rows = reconstruct(&annotations, W, H, &LayoutOptions::default());
        let rows = body(&rows);
        assert_eq!(rows[0], "**Welcome back**");
        assert_eq!(rows.last().copied(), Some("---"));
    }

    #[test]
    fn height_mismatch_splits_groups() {
        let annotations = vec![token("Big", 0.0, 30.0, 30.0), token("small", 40.0, 30.0, 12.0)];
        let rendered = reconstruct(&annotations, W, H, &LayoutOptions::default());
        assert_eq!(body(&rendered)[0], "**Big** small");
    }

    #[test]
    fn overflowing_rows_widen_the_grid() {
        let mut wide = token("overflowing-token", 1020.0, 10.0, 16.0);
        wide.width = 170.0;
        let rendered = reconstruct(&[wide], W, H, &LayoutOptions::default());
        assert!(body(&rendered)[0].ends_with("overflowing-token"));
    }

    #[test]
    fn blank_rows_are_bounded_by_container() {
        let annotations = vec![
            token("top", 0.0, 0.0, 16.0),
            TextAnnotation {
                bottom_left_normalized: Point::new(0.0, 1_000.0),
                ..token("bottom", 0.0, 0.0, 16.0)
            },
        ];
        let rendered = reconstruct(&annotations, W, H, &LayoutOptions::default());
        // 512 / 20 rounds up to 26 rows of container height.
        assert_eq!(body(&rendered).len(), 2 + 26);
    }

    #[test]
    fn empty_input_renders_bare_border() {
        let rendered = reconstruct(&[], W, H, &LayoutOptions::default());
        assert_eq!(rendered, format!("{}\n{}", "-".repeat(80), "-".repeat(80)));
    }
}
