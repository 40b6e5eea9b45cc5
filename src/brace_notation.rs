//! Compact range notation for sets of like-named entities, e.g. `node[01-03,05]`.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;

lazy_static! {
    static ref VALID_RE: Regex = {
        let item = r"(?:[0-9]+-[0-9]+|[A-Za-z0-9]+(?:\[[0-9,\-]+\])?|\[[0-9,\-]+\])";
        Regex::new(&format!(r"^{item}(?:\s*[,;]\s*{item})*$")).unwrap()
    };
    static ref BARE_RANGE_RE: Regex = Regex::new(r"^[0-9]+-[0-9]+$").unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"[0-9]+").unwrap();
    static ref TRAILING_NUMBER_RE: Regex = Regex::new(r"^(.*?)([0-9]+)$").unwrap();
}

/// Returns true if `input` is well-formed brace notation.
pub fn is_valid(input: &str) -> bool {
    VALID_RE.is_match(input.trim())
}

/// Returns the first run of digits in `input` as a number.
pub fn extract_number(input: &str) -> Option<u64> {
    NUMBER_RE.find(input)?.as_str().parse().ok()
}

/// Returns true if a number is written with leading zeros.
fn is_padded(number: &str) -> bool {
    number.len() > 1 && number.starts_with('0')
}

/// Split on commas and semicolons that are not enclosed in brackets.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' | ';' if depth == 0 => {
                entries.push(&input[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    entries.push(&input[start..]);
    entries
        .into_iter()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect()
}

/// Expand a single `lo-hi` range, appending `base{n}suffix` for each n.
///
/// Returns false if the range is not numeric.
fn expand_range(range: &str, base: &str, suffix: &str, out: &mut Vec<String>) -> bool {
    let Some((lo_text, hi_text)) = range.split_once('-') else {
        return false;
    };
    let (lo_text, hi_text) = (lo_text.trim(), hi_text.trim());
    let (Ok(mut lo), Ok(mut hi)) = (lo_text.parse::<u64>(), hi_text.parse::<u64>()) else {
        return false;
    };
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    let width = if is_padded(lo_text) {
        lo_text.len().max(hi_text.len())
    } else {
        0
    };
    for n in lo..=hi {
        out.push(format!("{base}{n:0width$}{suffix}"));
    }
    true
}

/// Expand brace notation into the list of names it denotes.
///
/// Entries are separated by `,` or `;` outside of brackets. Zero padding of a range's lower bound
/// is preserved, descending ranges are treated as ascending and tokens without brackets pass
/// through unchanged. The result contains no duplicates. With `sort`, the names of each entry are
/// ordered by their numeric suffix.
///
/// # Arguments
///
/// * `input`: Brace notation, e.g. `node[01-03,05]`
/// * `sort`: Order each entry numerically
pub fn decode(input: &str, sort: bool) -> Vec<String> {
    let mut result = Vec::new();
    for entry in split_top_level(input) {
        let mut expanded = Vec::new();
        let mut base_len = 0;
        match (entry.find('['), entry.rfind(']')) {
            (Some(open), Some(close)) if close > open => {
                let base = &entry[..open];
                let suffix = &entry[close + 1..];
                base_len = base.len();
                for part in entry[open + 1..close].split(',').map(str::trim) {
                    if part.is_empty() {
                        continue;
                    }
                    if part.contains('-') {
                        if !expand_range(part, base, suffix, &mut expanded) {
                            tracing::debug!("ignoring malformed range {} in {}", part, entry);
                        }
                    } else {
                        expanded.push(format!("{base}{part}{suffix}"));
                    }
                }
            }
            _ if BARE_RANGE_RE.is_match(entry) => {
                expand_range(entry, "", "", &mut expanded);
            }
            _ => expanded.push(entry.to_string()),
        }
        if sort {
            expanded.sort_by_key(|name| {
                extract_number(name.get(base_len..).unwrap_or(name.as_str()))
            });
        }
        result.extend(expanded);
    }
    dedup(result)
}

/// Numbers denoted by brace notation, held as inclusive ranges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumberRanges {
    ranges: Vec<RangeInclusive<u64>>,
}

impl NumberRanges {
    /// Returns true if `number` falls in one of the ranges.
    pub fn contains(&self, number: u64) -> bool {
        self.ranges.iter().any(|range| range.contains(&number))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    fn push(&mut self, first: Option<u64>, last: Option<u64>) {
        if let (Some(first), Some(last)) = (first, last) {
            self.ranges.push(first.min(last)..=first.max(last));
        }
    }

    /// Add the numbers of `base{n}suffix` for each n in `lo..=hi`.
    ///
    /// Within a run of equally wide n the extracted numbers are contiguous, so each run is
    /// stored as its two end points.
    fn push_range(&mut self, range: &str, base: &str, suffix: &str) -> bool {
        let Some((lo_text, hi_text)) = range.split_once('-') else {
            return false;
        };
        let (lo_text, hi_text) = (lo_text.trim(), hi_text.trim());
        let (Ok(lo), Ok(hi)) = (lo_text.parse::<u64>(), hi_text.parse::<u64>()) else {
            return false;
        };
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        let width = if is_padded(lo_text) {
            lo_text.len().max(hi_text.len())
        } else {
            0
        };
        let number = |n: u64| extract_number(&format!("{base}{n:0width$}{suffix}"));
        let mut start = lo;
        loop {
            let digits = (start.checked_ilog10().unwrap_or(0) + 1).max(width as u32);
            let end = 10u64
                .checked_pow(digits)
                .map_or(u64::MAX, |limit| limit - 1)
                .min(hi);
            self.push(number(start), number(end));
            if end >= hi {
                break;
            }
            start = end + 1;
        }
        true
    }
}

/// Decode brace notation into the numbers its names carry, without enumerating them.
///
/// Matches `extract_number` applied to each name of `decode(input)`, so arbitrarily wide
/// ranges cost no more than narrow ones.
///
/// # Arguments
///
/// * `input`: Brace notation, e.g. `[0-3,8]`
pub fn decode_numbers(input: &str) -> NumberRanges {
    let mut numbers = NumberRanges::default();
    for entry in split_top_level(input) {
        match (entry.find('['), entry.rfind(']')) {
            (Some(open), Some(close)) if close > open => {
                let base = &entry[..open];
                let suffix = &entry[close + 1..];
                for part in entry[open + 1..close].split(',').map(str::trim) {
                    if part.is_empty() {
                        continue;
                    }
                    if part.contains('-') {
                        if !numbers.push_range(part, base, suffix) {
                            tracing::debug!("ignoring malformed range {} in {}", part, entry);
                        }
                    } else {
                        let number = extract_number(&format!("{base}{part}{suffix}"));
                        numbers.push(number, number);
                    }
                }
            }
            _ if BARE_RANGE_RE.is_match(entry) => {
                numbers.push_range(entry, "", "");
            }
            _ => {
                let number = extract_number(entry);
                numbers.push(number, number);
            }
        }
    }
    numbers
}

/// Remove duplicates, keeping the first occurrence.
fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

/// Collapse consecutive numbers into `a-b` ranges.
///
/// Numbers must be sorted. A run only continues while the padding of its members stays
/// compatible with how [decode] pads a range.
fn collapse(numbers: &[&str]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < numbers.len() {
        let start = numbers[i];
        let mut end = i;
        while end + 1 < numbers.len() {
            let (prev, next) = (numbers[end], numbers[end + 1]);
            let consecutive = match (prev.parse::<u64>(), next.parse::<u64>()) {
                (Ok(p), Ok(n)) => p.checked_add(1) == Some(n),
                _ => false,
            };
            let compatible = if is_padded(start) {
                next.len() == start.len()
            } else {
                !is_padded(next)
            };
            if !(consecutive && compatible) {
                break;
            }
            end += 1;
        }
        if end == i {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, numbers[end]));
        }
        i = end + 1;
    }
    parts
}

/// Compress a list of names into brace notation.
///
/// Names sharing a prefix are grouped and their numeric suffixes collapsed into ranges. Groups
/// are ordered by prefix. Names without a trailing number are appended unchanged.
pub fn encode<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let names = dedup(names.iter().map(|n| n.as_ref().to_string()).collect());
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut plain = Vec::new();
    for name in &names {
        match TRAILING_NUMBER_RE.captures(name) {
            Some(caps) => {
                let (prefix, number) = (caps.get(1), caps.get(2));
                if let (Some(prefix), Some(number)) = (prefix, number) {
                    groups
                        .entry(prefix.as_str())
                        .or_default()
                        .push(number.as_str());
                }
            }
            None => plain.push(name.clone()),
        }
    }

    let mut result = Vec::new();
    for (prefix, mut numbers) in groups {
        numbers.sort_by(|a, b| {
            let (x, y) = (a.parse::<u64>().ok(), b.parse::<u64>().ok());
            x.cmp(&y).then_with(|| a.cmp(b))
        });
        let parts = collapse(&numbers);
        if prefix.is_empty() {
            result.push(parts.join(","));
        } else if numbers.len() == 1 {
            result.push(format!("{}{}", prefix, numbers[0]));
        } else {
            result.push(format!("{}[{}]", prefix, parts.join(",")));
        }
    }
    result.extend(plain);
    result
}
