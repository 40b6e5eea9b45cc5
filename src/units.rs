//! Unit normalisation across jobs.
//!
//! Units consist of an optional SI prefix followed by a base unit, e.g. `MFLOP/s` or `KB/s`.
//! When several series with differently prefixed units are displayed together they are all
//! converted to the largest prefix present.

use lazy_static::lazy_static;
use regex::Regex;

/// SI prefixes ordered by rank.
pub const SI_PREFIXES: [&str; 6] = ["", "K", "M", "G", "T", "P"];

lazy_static! {
    static ref UNIT_RE: Regex = Regex::new(r"^([KMGTP]?)([A-Za-z/]+)$").unwrap();
}

/// A unit split into prefix rank and base unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedUnit {
    /// Index of the prefix in [SI_PREFIXES]
    pub rank: usize,
    /// Unit without prefix
    pub base: String,
}

impl ParsedUnit {
    pub fn prefix(&self) -> &'static str {
        SI_PREFIXES[self.rank]
    }
}

/// Split a unit into prefix rank and base.
///
/// Units which do not carry a recognised prefix are reported with rank 0 and the whole string
/// as the base. A lone prefix letter such as `M` is treated as a base unit.
pub fn parse(unit: &str) -> ParsedUnit {
    match UNIT_RE.captures(unit) {
        Some(caps) => {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            let rank = SI_PREFIXES.iter().position(|p| *p == prefix).unwrap_or(0);
            ParsedUnit {
                rank,
                base: caps[2].to_string(),
            }
        }
        None => ParsedUnit {
            rank: 0,
            base: unit.to_string(),
        },
    }
}

/// Target unit of a set of series.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnifiedUnit {
    pub rank: usize,
    pub base: String,
}

impl UnifiedUnit {
    /// The unit string, prefix followed by base.
    pub fn unit(&self) -> String {
        format!("{}{}", SI_PREFIXES[self.rank], self.base)
    }

    /// The unit a series given in `unit` is shown in: this prefix with the series' own base.
    pub fn unit_for(&self, unit: &str) -> String {
        format!("{}{}", SI_PREFIXES[self.rank], parse(unit).base)
    }

    /// Factor converting values given in `unit` into this unit.
    pub fn factor_from(&self, unit: &str) -> f64 {
        scale_factor(parse(unit).rank, self.rank)
    }

    /// Convert an unprefixed peak value into this unit.
    ///
    /// Byte based units use binary multiples, everything else decimal ones.
    pub fn convert_peak(&self, value: f64) -> f64 {
        let base: f64 = if self.base.starts_with('B') {
            1024.0
        } else {
            1000.0
        };
        value / base.powi(self.rank as i32)
    }
}

/// Determine the target unit for a set of units.
///
/// The base unit is taken from the first unit; the rank is the maximum rank present. Returns
/// `None` for an empty input.
pub fn unify<'a, I>(units: I) -> Option<UnifiedUnit>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut unified: Option<UnifiedUnit> = None;
    for unit in units {
        let parsed = parse(unit);
        match unified.as_mut() {
            None => {
                unified = Some(UnifiedUnit {
                    rank: parsed.rank,
                    base: parsed.base,
                })
            }
            Some(target) => {
                if parsed.base != target.base {
                    tracing::warn!(
                        "unit {} does not share base unit {}, scaling it to the common prefix",
                        unit,
                        target.base
                    );
                }
                target.rank = target.rank.max(parsed.rank);
            }
        }
    }
    unified
}

/// Factor converting a value from prefix rank `source` into prefix rank `target`.
pub fn scale_factor(source: usize, target: usize) -> f64 {
    1000f64.powi(source as i32 - target as i32)
}
