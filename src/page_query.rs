use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use regex::Regex;

/// Upper bound for any page number produced by a range segment.
pub const MAX_PAGE_NUMBER: u32 = 100_000;

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*-\s*(\d+)").expect("range pattern"));
static SINGLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").expect("page pattern"));
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d$").expect("digit pattern"));

/// Inclusive page bound handed to the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageQuery {
    /// No filter: every page of the document.
    All,
    /// Non-empty set of 1-based page numbers.
    Pages(BTreeSet<u32>),
}

impl PageQuery {
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// `true` for every page when no filter is active.
    pub fn contains(&self, page: u32) -> bool {
        match self {
            Self::All => true,
            Self::Pages(pages) => pages.contains(&page),
        }
    }

    pub fn pages(&self) -> Vec<u32> {
        match self {
            Self::All => Vec::new(),
            Self::Pages(pages) => pages.iter().copied().collect(),
        }
    }

    pub fn page_range_hint(&self) -> Option<PageRange> {
        let Self::Pages(pages) = self else {
            return None;
        };
        let start = *pages.first()?;
        let end = *pages.last()?;
        Some(PageRange { start, end })
    }
}

impl Display for PageQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => Ok(()),
            Self::Pages(pages) => {
                let rendered = pages.iter().map(u32::to_string).collect::<Vec<_>>();
                write!(f, "{}", rendered.join(", "))
            }
        }
    }
}

/// Parses free-form page selections such as `"150-160"`, `"page 5"` or
/// `"pages 1, 3, 5"`.
///
/// Segments are split on commas; a segment contributes either a whole range
/// or the first integer it contains, and is skipped otherwise. A range whose
/// start exceeds its end contributes nothing. Input that yields no page at all
/// means "no filter" rather than an empty selection. Digits from any script
/// count, so `"page \u{0665}"` selects page 5.
pub fn parse_page_query(query: &str) -> PageQuery {
    let lowered = query.trim().to_lowercase();
    if lowered.is_empty() {
        return PageQuery::All;
    }

    let mut pages = BTreeSet::new();
    for segment in lowered.split(',').map(str::trim) {
        if let Some(capture) = RANGE_RE.captures(segment) {
            let start = capture.get(1).map_or(u64::MAX, |value| number(value.as_str()));
            let end = capture.get(2).map_or(0, |value| number(value.as_str()));
            if start <= u64::from(MAX_PAGE_NUMBER) {
                let end = u32::try_from(end)
                    .unwrap_or(MAX_PAGE_NUMBER)
                    .min(MAX_PAGE_NUMBER);
                let start = u32::try_from(start).unwrap_or(MAX_PAGE_NUMBER);
                pages.extend(start.max(1)..=end);
            }
            continue;
        }

        if let Some(page) = SINGLE_RE
            .captures(segment)
            .and_then(|capture| capture.get(1))
            .and_then(|value| u32::try_from(number(value.as_str())).ok())
            .filter(|page| *page > 0)
        {
            pages.insert(page);
        }
    }

    if pages.is_empty() {
        PageQuery::All
    } else {
        PageQuery::Pages(pages)
    }
}

/// Value of a run of decimal digits from any script, saturating at
/// `u64::MAX`.
fn number(digits: &str) -> u64 {
    digits.chars().fold(0_u64, |total, digit| {
        total
            .saturating_mul(10)
            .saturating_add(u64::from(digit_value(digit)))
    })
}

/// Decimal digits are encoded as contiguous runs of ten starting at zero, so
/// a digit's value is its distance from the start of its run, modulo ten.
fn digit_value(digit: char) -> u32 {
    if let Some(value) = digit.to_digit(10) {
        return value;
    }

    let mut distance = 0_u32;
    let mut code = u32::from(digit);
    while let Some(previous) = code.checked_sub(1).and_then(char::from_u32) {
        let mut buffer = [0_u8; 4];
        if !DIGIT_RE.is_match(previous.encode_utf8(&mut buffer)) {
            break;
        }
        distance += 1;
        code -= 1;
    }
    distance % 10
}
