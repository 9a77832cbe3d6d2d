//! Gradient sampling
//!
//! Turns a [Gradient] into a per-pixel sequence of hex colours. Sampling is pure and
//! deterministic: identical inputs always produce identical outputs.

use crate::models::{sort_stops, to_hex, Color, Gradient, GradientStop};

/// Gamma exponent used for strip rendering
pub const DEFAULT_GAMMA: f64 = 2.2;

/// Sample `gradient` into `pixel_count` 6-digit hex colours
///
/// Pixel `i` is sampled at `i / (pixel_count - 1)`, so the first and last pixels land exactly on
/// the ends of `[0, 1]`. An empty gradient renders black.
pub fn sample(gradient: &Gradient, pixel_count: usize, gamma: f64) -> Vec<String> {
    sample_colors(gradient, pixel_count, gamma)
        .into_iter()
        .map(to_hex)
        .collect()
}

/// Same as [sample], without the hex encoding
pub fn sample_colors(gradient: &Gradient, pixel_count: usize, gamma: f64) -> Vec<Color> {
    if pixel_count == 0 {
        return Vec::new();
    }

    let stops = gradient.sorted_stops();

    match stops.as_slice() {
        [] => vec![Color::new(0, 0, 0); pixel_count],
        [single] => vec![single.color; pixel_count],
        _ => {
            let last = (pixel_count - 1).max(1) as f64;
            (0..pixel_count)
                .map(|i| sample_sorted(&stops, i as f64 / last, gamma))
                .collect()
        }
    }
}

/// Colour of the gradient at `position`, interpolated linearly in sRGB space
///
/// `stops` need not be sorted.
pub fn sample_color(position: f64, stops: &[GradientStop]) -> Color {
    sample_color_with_gamma(position, stops, 1.0)
}

/// Colour of the gradient at `position`, interpolated in gamma-decoded space
pub fn sample_color_with_gamma(position: f64, stops: &[GradientStop], gamma: f64) -> Color {
    sample_sorted(&sort_stops(stops), position, gamma)
}

fn sample_sorted(stops: &[GradientStop], position: f64, gamma: f64) -> Color {
    let (first, last) = match (stops.first(), stops.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Color::new(0, 0, 0),
    };

    if position <= first.position {
        return first.color;
    }
    if position >= last.position {
        return last.color;
    }

    // First stop strictly past the position; the one before it brackets from below
    let upper = stops
        .iter()
        .position(|stop| stop.position > position)
        .unwrap_or(stops.len() - 1);
    let (a, b) = (&stops[upper - 1], &stops[upper]);

    let span = b.position - a.position;
    if span <= f64::EPSILON {
        return b.color;
    }

    lerp_color(a.color, b.color, (position - a.position) / span, gamma)
}

/// Interpolate two colours channel by channel in gamma-decoded space
pub fn lerp_color(a: Color, b: Color, t: f64, gamma: f64) -> Color {
    let gamma = if gamma > 0.0 { gamma } else { 1.0 };
    let t = t.clamp(0.0, 1.0);

    let channel = |a: u8, b: u8| -> u8 {
        let a = (f64::from(a) / 255.0).powf(gamma);
        let b = (f64::from(b) / 255.0).powf(gamma);
        let mixed = a + (b - a) * t;
        (mixed.powf(1.0 / gamma) * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Color::new(
        channel(a.red, b.red),
        channel(a.green, b.green),
        channel(a.blue, b.blue),
    )
}
