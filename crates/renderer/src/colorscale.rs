//! Named colour scales.
//!
//! A scale maps a normalised value in [0, 1] to RGBA by linear interpolation
//! between stops. Every base scale also exists reversed under `<name>_r`.

use crate::style::hex_to_rgb;

/// Names accepted by [`ColorScale::named`].
pub const KNOWN_SCALES: &[&str] = &[
    "rdylbu",
    "rdylbu_r",
    "rdylgn",
    "rdylgn_r",
    "ylgnbu",
    "ylgnbu_r",
    "greys",
    "greys_r",
    "viridis",
    "viridis_r",
    "weather_precip",
    "weather_precip_r",
    "weather_wind",
    "weather_wind_r",
];

const RDYLBU: &[&str] = &[
    "#a50026", "#d73027", "#f46d43", "#fdae61", "#fee090", "#ffffbf", "#e0f3f8", "#abd9e9",
    "#74add1", "#4575b4", "#313695",
];

const RDYLGN: &[&str] = &[
    "#a50026", "#d73027", "#f46d43", "#fdae61", "#fee08b", "#ffffbf", "#d9ef8b", "#a6d96a",
    "#66bd63", "#1a9850", "#006837",
];

const YLGNBU: &[&str] = &[
    "#ffffd9", "#edf8b1", "#c7e9b4", "#7fcdbb", "#41b6c4", "#1d91c0", "#225ea8", "#253494",
    "#081d58",
];

const GREYS: &[&str] = &[
    "#ffffff", "#f0f0f0", "#d9d9d9", "#bdbdbd", "#969696", "#737373", "#525252", "#252525",
    "#000000",
];

const VIRIDIS: &[&str] = &[
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58",
    "#b5de2b", "#fde725",
];

// Dry cells stay transparent so the map face shows through.
const WEATHER_PRECIP: &[(f32, &str)] = &[
    (0.0, "transparent"),
    (0.02, "#c0e0ff"),
    (0.1, "#4080ff"),
    (0.3, "#40ff40"),
    (0.5, "#ffff40"),
    (0.7, "#ff8040"),
    (0.85, "#ff4040"),
    (1.0, "#ff40ff"),
];

const WEATHER_WIND: &[(f32, &str)] = &[
    (0.0, "#4040ff"),
    (0.3, "#40ff40"),
    (0.6, "#ffff40"),
    (0.85, "#ff8040"),
    (1.0, "#ff4040"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    /// Position in [0, 1]
    pub position: f32,
    pub color: [u8; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    pub name: String,
    stops: Vec<ColorStop>,
}

impl ColorScale {
    /// Look up a scale by name, None for unknown names.
    pub fn named(name: &str) -> Option<Self> {
        let (base, reversed) = match name.strip_suffix("_r") {
            Some(base) => (base, true),
            None => (name, false),
        };

        let stops = match base {
            "rdylbu" => evenly_spaced(RDYLBU),
            "rdylgn" => evenly_spaced(RDYLGN),
            "ylgnbu" => evenly_spaced(YLGNBU),
            "greys" => evenly_spaced(GREYS),
            "viridis" => evenly_spaced(VIRIDIS),
            "weather_precip" => positioned(WEATHER_PRECIP),
            "weather_wind" => positioned(WEATHER_WIND),
            _ => return None,
        };

        let stops = if reversed {
            stops
                .into_iter()
                .rev()
                .map(|s| ColorStop {
                    position: 1.0 - s.position,
                    color: s.color,
                })
                .collect()
        } else {
            stops
        };

        Some(Self {
            name: name.to_string(),
            stops,
        })
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Colour for a normalised value; None for NaN. Values outside [0, 1]
    /// take the end colours.
    pub fn color_at(&self, t: f32) -> Option<[u8; 4]> {
        if t.is_nan() {
            return None;
        }
        let t = t.clamp(0.0, 1.0);
        let first = self.stops.first()?;
        if t <= first.position {
            return Some(first.color);
        }

        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if t <= hi.position {
                let span = hi.position - lo.position;
                let f = if span > 0.0 { (t - lo.position) / span } else { 1.0 };
                return Some(lerp(lo.color, hi.color, f));
            }
        }
        self.stops.last().map(|s| s.color)
    }
}

fn lerp(a: [u8; 4], b: [u8; 4], f: f32) -> [u8; 4] {
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = (a[i] as f32 + (b[i] as f32 - a[i] as f32) * f).round() as u8;
    }
    out
}

fn parse_color(text: &str) -> [u8; 4] {
    if text == "transparent" {
        return [0, 0, 0, 0];
    }
    // stop tables are constants, a bad entry renders grey
    let (r, g, b) = hex_to_rgb(text).unwrap_or((128, 128, 128));
    [r, g, b, 255]
}

fn evenly_spaced(colors: &[&str]) -> Vec<ColorStop> {
    let last = (colors.len() - 1).max(1) as f32;
    colors
        .iter()
        .enumerate()
        .map(|(i, c)| ColorStop {
            position: i as f32 / last,
            color: parse_color(c),
        })
        .collect()
}

fn positioned(stops: &[(f32, &str)]) -> Vec<ColorStop> {
    stops
        .iter()
        .map(|&(position, c)| ColorStop {
            position,
            color: parse_color(c),
        })
        .collect()
}
