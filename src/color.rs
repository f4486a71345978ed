use palette::{Hsl, IntoColor, Srgb};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues,
/// returned as `#rrggbb`.
pub fn generate_palette(n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            to_hex(Hsl::new(hue, 0.75, 0.55))
        })
        .collect()
}

fn to_hex(hsl: Hsl) -> String {
    let rgb: Srgb = hsl.into_color();
    format!(
        "#{:02x}{:02x}{:02x}",
        (rgb.red.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0).round() as u8,
    )
}

// ---------------------------------------------------------------------------
// Sequential ramp: weight → colour
// ---------------------------------------------------------------------------

/// Maps a numeric weight range onto a blue → green → yellow → red ramp,
/// as used for heatmap legends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColorRamp {
    pub min: f64,
    pub max: f64,
}

/// One legend swatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub value: f64,
    pub color: String,
}

const BLUE_HUE: f32 = 240.0;

impl ColorRamp {
    /// Build a ramp spanning the finite values in `values`.
    pub fn spanning<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        (min <= max).then_some(ColorRamp { min, max })
    }

    /// Position of `value` in `[0, 1]`.
    pub fn fraction(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range.abs() < f64::EPSILON {
            return 1.0;
        }
        ((value - self.min) / range).clamp(0.0, 1.0)
    }

    /// Look up the colour for a weight.
    pub fn color_for(&self, value: f64) -> String {
        let hue = BLUE_HUE * (1.0 - self.fraction(value) as f32);
        to_hex(Hsl::new(hue, 0.85, 0.5))
    }

    /// Return `steps` evenly spaced legend entries from min to max.
    pub fn legend_entries(&self, steps: usize) -> Vec<LegendEntry> {
        let steps = steps.max(2);
        (0..steps)
            .map(|i| {
                let value = self.min + (self.max - self.min) * i as f64 / (steps - 1) as f64;
                LegendEntry {
                    value,
                    color: self.color_for(value),
                }
            })
            .collect()
    }
}
