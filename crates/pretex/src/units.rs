//! Unit constants and number formatting.
//!
//! TeX reports lengths in TeX points (1/72.27 in) and scaled points (1/65536 of a TeX point).
//! Everything downstream works in big points (1/72 in, the PDF/CSS "pt") and CSS pixels
//! (1/96 in).

/// TeX point to big point: `72 / 72.27`.
pub const TEX_PT_TO_BP: f64 = 800.0 / 803.0;

/// CSS pixels per big point.
pub const PX_PER_BP: f64 = 96.0 / 72.0;

/// Scaled points per TeX point.
pub const SP_PER_PT: f64 = 65536.0;

/// Ambient font size (big points) assumed when the measurement log does not report one.
pub const DEFAULT_FONT_SIZE: f64 = 12.0;

/// Tolerance used when recognizing special matrices.
pub const ALMOST_ZERO: f64 = 1e-4;

/// Maximum error accepted when shortening a transform coefficient.
pub const COEFFICIENT_TOLERANCE: f64 = 1e-7;

const COEFFICIENT_MAX_DECIMALS: usize = 8;

pub fn almost_zero(v: f64) -> bool {
    v.abs() < ALMOST_ZERO
}

/// Formats a length for CSS or a `viewBox`: five decimals, trailing zeros dropped.
pub fn fmt_num(v: f64) -> String {
    let mut out = format!("{v:.5}");
    if out.contains('.') {
        while out.ends_with('0') {
            out.pop();
        }
        if out.ends_with('.') {
            out.pop();
        }
    }
    if out == "-0" {
        out = "0".to_string();
    }
    out
}

/// Formats a transform coefficient with the fewest decimals that stay within
/// [`COEFFICIENT_TOLERANCE`] of the true value.
pub fn fmt_coefficient(v: f64) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    for decimals in 0..=COEFFICIENT_MAX_DECIMALS {
        let p = 10_f64.powi(decimals as i32);
        let rounded = (v * p).round() / p;
        if (rounded - v).abs() < COEFFICIENT_TOLERANCE {
            let out = format!("{rounded:.decimals$}");
            return if out.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
                out.trim_start_matches('-').to_string()
            } else {
                out
            };
        }
    }
    format!("{v}")
}

/// Parses the leading decimal number of a CSS length (`"11.955px"` -> `11.955`).
pub fn parse_leading_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}
