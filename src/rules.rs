use crate::error::{MetricError, Result};
use log::warn;
use serde::Deserialize;

/// One threshold rule: value matches when `from < value <= to`. Empty
/// boundary strings stand for -inf (from) and +inf (to). Order in the rule
/// list is significant: the first matching rule wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeRule {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub color: String,
}

/// 24-bit display color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Parse a rule boundary. Empty means unbounded on that side; anything else
/// must parse as a float. A bad boundary is a configuration error and
/// propagates.
pub fn parse_boundary(raw: &str, lower: bool) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(if lower {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| MetricError::Format(format!("invalid rule boundary {raw:?}")))
}

/// Parse `RRGGBB` or `#RRGGBB` into an [`Rgb`].
pub fn parse_color(raw: &str) -> Result<Rgb> {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(MetricError::Format(format!("invalid color {raw:?}")));
    }
    Ok(Rgb {
        r: u8::from_str_radix(&hex[0..2], 16).unwrap_or(0),
        g: u8::from_str_radix(&hex[2..4], 16).unwrap_or(0),
        b: u8::from_str_radix(&hex[4..6], 16).unwrap_or(0),
    })
}

/// Map a metric value onto a color via an ordered rule list.
///
/// A missing value yields no color regardless of rules. A matched rule with
/// a blank color yields no color and stops (matched but suppressed). A
/// matched rule whose color fails to parse is skipped with a warning and
/// evaluation continues with the next rule; a boundary that fails to parse
/// aborts the whole call.
pub fn evaluate(value: Option<f64>, rules: &[RangeRule]) -> Result<Option<Rgb>> {
    let Some(value) = value else {
        return Ok(None);
    };
    for rule in rules {
        let from = parse_boundary(&rule.from, true)?;
        let to = parse_boundary(&rule.to, false)?;
        if from < value && value <= to {
            if rule.color.trim().is_empty() {
                return Ok(None);
            }
            match parse_color(&rule.color) {
                Ok(color) => return Ok(Some(color)),
                Err(err) => {
                    warn!("skipping rule [{};{}]: {err}", rule.from, rule.to);
                    continue;
                }
            }
        }
    }
    Ok(None)
}
