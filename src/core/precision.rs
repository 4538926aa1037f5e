//! Numeric helpers shared by the wire codecs.

use crate::core::errors::ExchangeError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round `value` to `sig_figs` significant figures.
///
/// `68123.456` → `68123`, `0.0001234567` → `0.00012346`.
pub fn round_to_sig_figs(value: f64, sig_figs: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }

    let digits = value.abs().log10().ceil() as i32;
    let power = sig_figs - digits;

    // multiply/divide by an exact power of ten on both sides of the point
    if power >= 0 {
        let magnitude = 10f64.powi(power);
        (value * magnitude).round() / magnitude
    } else {
        let magnitude = 10f64.powi(-power);
        (value / magnitude).round() * magnitude
    }
}

/// Shortest decimal representation, never in exponent form.
pub fn format_decimal(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// Quantize to a multiple of `step`.
///
/// Rounds half away from zero, or toward zero when `round_down` is set.
pub fn quantize(value: f64, step: f64, round_down: bool) -> Result<Decimal, ExchangeError> {
    let value = to_decimal(value)?;
    if step <= 0.0 {
        return Ok(value.normalize());
    }
    let step = to_decimal(step)?;

    let strategy = if round_down {
        RoundingStrategy::ToZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    let units = (value / step).round_dp_with_strategy(0, strategy);
    Ok((units * step).normalize())
}

/// Order size rounded down to `step`, refused when nothing tradable is left.
///
/// A result of zero or below `min_qty` fails with `InvalidParameters`.
pub fn quantize_qty(qty: f64, step: f64, min_qty: f64) -> Result<Decimal, ExchangeError> {
    let size = if qty.is_finite() {
        quantize(qty, step, true)?
    } else {
        Decimal::ZERO
    };
    if size <= Decimal::ZERO || size < to_decimal(min_qty)? {
        return Err(ExchangeError::InvalidParameters(format!(
            "order quantity {} is below the minimum {} (step {})",
            format_decimal(qty),
            format_decimal(min_qty),
            format_decimal(step)
        )));
    }
    Ok(size)
}

// via the shortest decimal string so 0.015 stays 0.015 and not 0.01499..
fn to_decimal(value: f64) -> Result<Decimal, ExchangeError> {
    format_decimal(value)
        .parse::<Decimal>()
        .map_err(|e| ExchangeError::InvalidParameters(format!("{}: {}", value, e)))
}

/// Parse a decimal string field into a float.
pub fn parse_f64(raw: &str, field: &str) -> Result<f64, ExchangeError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| ExchangeError::decode(field, format!("{:?}: {}", raw, e)))
}

/// Parse a fixed-point big-integer string scaled by `10^decimals`.
pub fn parse_fixed_point(raw: &str, decimals: u32, field: &str) -> Result<f64, ExchangeError> {
    let raw = raw.trim();
    let unsigned = raw.strip_prefix('-').unwrap_or(raw);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ExchangeError::decode(
            field,
            format!("{:?} is not an integer", raw),
        ));
    }
    let mantissa = parse_f64(raw, field)?;
    Ok(mantissa / 10f64.powi(decimals as i32))
}

/// Parse a `0x` prefixed hex integer scaled by `10^decimals`.
pub fn parse_hex_scaled(raw: &str, decimals: u32, field: &str) -> Result<f64, ExchangeError> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| ExchangeError::decode(field, format!("{:?} is not hex", raw)))?;
    let value = u128::from_str_radix(digits, 16)
        .map_err(|e| ExchangeError::decode(field, format!("{:?}: {}", raw, e)))?;
    Ok(value as f64 / 10f64.powi(decimals as i32))
}
