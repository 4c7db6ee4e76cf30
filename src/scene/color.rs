use crate::foundation::core::Rgba8Premul;
use serde::{Deserialize, Serialize};

/// Straight-alpha color in normalized `[0, 1]` channels.
///
/// Accepts `"#RRGGBB"`, `"#RRGGBBAA"`, `{r,g,b,a?}` and `[r,g,b(,a)]`. Always serializes as the
/// object form, which keeps the canonical scene form independent of the spelling used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct ColorDef {
    pub(crate) r: f64,
    pub(crate) g: f64,
    pub(crate) b: f64,
    pub(crate) a: f64,
}

impl ColorDef {
    pub(crate) fn rgba(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub(crate) fn black() -> Self {
        Self::rgba(0.0, 0.0, 0.0, 1.0)
    }

    pub(crate) fn white() -> Self {
        Self::rgba(1.0, 1.0, 1.0, 1.0)
    }

    pub(crate) fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }

    pub(crate) fn to_rgba8_premul(self) -> Rgba8Premul {
        fn to_u8(x: f64) -> u8 {
            (x.clamp(0.0, 1.0) * 255.0).round() as u8
        }

        let a = self.a.clamp(0.0, 1.0);
        let r = (self.r.clamp(0.0, 1.0) * a).clamp(0.0, 1.0);
        let g = (self.g.clamp(0.0, 1.0) * a).clamp(0.0, 1.0);
        let b = (self.b.clamp(0.0, 1.0) * a).clamp(0.0, 1.0);

        Rgba8Premul {
            r: to_u8(r),
            g: to_u8(g),
            b: to_u8(b),
            a: to_u8(a),
        }
    }
}

impl<'de> Deserialize<'de> for ColorDef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            RgbaObj {
                r: f64,
                g: f64,
                b: f64,
                #[serde(default = "one")]
                a: f64,
            },
            Arr(Vec<f64>),
        }

        fn one() -> f64 {
            1.0
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(s) => parse_hex(&s).map_err(serde::de::Error::custom),
            Repr::RgbaObj { r, g, b, a } => Ok(Self::rgba(r, g, b, a)),
            Repr::Arr(v) => match v.as_slice() {
                [r, g, b] => Ok(Self::rgba(*r, *g, *b, 1.0)),
                [r, g, b, a] => Ok(Self::rgba(*r, *g, *b, *a)),
                _ => Err(serde::de::Error::custom(
                    "rgba array must have len 3 ([r,g,b]) or 4 ([r,g,b,a])",
                )),
            },
        }
    }
}

fn parse_hex(s: &str) -> Result<ColorDef, String> {
    let s = s.trim();
    let s = s.strip_prefix('#').unwrap_or(s);

    fn hex_byte(pair: &str) -> Result<u8, String> {
        u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte \"{pair}\""))
    }

    if !s.is_ascii() {
        return Err("hex color must be ASCII".to_owned());
    }

    let (r, g, b, a) = match s.len() {
        6 => (
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
            255,
        ),
        8 => (
            hex_byte(&s[0..2])?,
            hex_byte(&s[2..4])?,
            hex_byte(&s[4..6])?,
            hex_byte(&s[6..8])?,
        ),
        _ => {
            return Err("hex color must be #RRGGBB or #RRGGBBAA (case-insensitive)".to_owned());
        }
    };

    Ok(ColorDef::rgba(
        f64::from(r) / 255.0,
        f64::from(g) / 255.0,
        f64::from(b) / 255.0,
        f64::from(a) / 255.0,
    ))
}
