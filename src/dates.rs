use std::cmp::Ordering;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::model::{GuestBlock, GuestInput};

/// Placeholder the spreadsheet uses for "no date".
pub const NO_DATE: &str = "00-01-00";

/// Tried in order; the first match wins.
static PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{4})").expect("valid regex"),
        Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{2})").expect("valid regex"),
        Regex::new(r"(\d{1,2})[/-](\d{1,2})").expect("valid regex"),
    ]
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateParts {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

/// Pull day, month and optional year out of free text. Two-digit years are
/// 2000-based. No match yields all `None`.
pub fn extract_components(text: &str) -> DateParts {
    let text = text.trim();
    for re in PATTERNS.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = caps.get(3).and_then(|m| {
            let value: i32 = m.as_str().parse().ok()?;
            match m.as_str().len() {
                2 => Some(2000 + value),
                4 => Some(value),
                _ => None,
            }
        });
        return DateParts {
            day: num(1),
            month: num(2),
            year,
        };
    }
    DateParts::default()
}

fn is_blank(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == NO_DATE
}

/// Resolve `raw` to a calendar date.
///
/// A missing year defaults to `current_year`. When the year was missing and
/// `reference` (the other end of the stay) resolves to a real day/month, the
/// month-day tuples are compared: a leading date later than its reference
/// moves to the previous year, a trailing date earlier than its reference
/// moves to the next year. An explicit year is taken as written.
///
/// Malformed or impossible dates resolve to `None`. An unusable reference
/// leaves the provisional date unchanged.
pub fn infer_date(raw: &str, reference: &str, leading: bool, current_year: i32) -> Option<NaiveDate> {
    if is_blank(raw) {
        return None;
    }
    let parts = extract_components(raw);
    let (day, month) = (parts.day?, parts.month?);
    let provisional = NaiveDate::from_ymd_opt(parts.year.unwrap_or(current_year), month, day)?;

    if parts.year.is_some() || is_blank(reference) {
        return Some(provisional);
    }

    let other = extract_components(reference);
    let (Some(ref_day), Some(ref_month)) = (other.day, other.month) else {
        return Some(provisional);
    };
    if NaiveDate::from_ymd_opt(other.year.unwrap_or(current_year), ref_month, ref_day).is_none() {
        return Some(provisional);
    }

    let shift = match (leading, (month, day).cmp(&(ref_month, ref_day))) {
        (true, Ordering::Greater) => -1,
        (false, Ordering::Less) => 1,
        _ => return Some(provisional),
    };
    // Feb 29 may not exist in the neighbouring year.
    NaiveDate::from_ymd_opt(provisional.year() + shift, month, day)
}

/// Resolve a check-in/check-out pair, each side inferred against the other.
pub fn resolve_stay(
    check_in: &str,
    check_out: &str,
    current_year: i32,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    (
        infer_date(check_in, check_out, true, current_year),
        infer_date(check_out, check_in, false, current_year),
    )
}

/// Party size from free text: digits only, 0 when nothing usable remains.
pub fn parse_pax(text: &str) -> u32 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

pub fn resolve_guest(input: &GuestInput, current_year: i32) -> GuestBlock {
    let (check_in, check_out) = resolve_stay(&input.check_in, &input.check_out, current_year);
    GuestBlock {
        name: input.name.trim().to_string(),
        check_in,
        check_out,
        pax: parse_pax(&input.pax),
    }
}

/// `dd-mm-yy`, the way the front desk writes dates. Empty for no date.
pub fn format_display(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d-%m-%y").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn components_four_digit_year() {
        assert_eq!(
            extract_components("28-12-2025"),
            DateParts { day: Some(28), month: Some(12), year: Some(2025) }
        );
        assert_eq!(
            extract_components("3/1/2026"),
            DateParts { day: Some(3), month: Some(1), year: Some(2026) }
        );
    }

    #[test]
    fn components_two_digit_year() {
        assert_eq!(
            extract_components("05-07-25"),
            DateParts { day: Some(5), month: Some(7), year: Some(2025) }
        );
    }

    #[test]
    fn components_no_year() {
        assert_eq!(
            extract_components(" 28/12 "),
            DateParts { day: Some(28), month: Some(12), year: None }
        );
    }

    #[test]
    fn components_malformed() {
        assert_eq!(extract_components("tomorrow"), DateParts::default());
        assert_eq!(extract_components(""), DateParts::default());
        assert_eq!(extract_components("2812"), DateParts::default());
    }

    #[test]
    fn blank_and_placeholder_are_no_date() {
        assert_eq!(infer_date("", "03-01", true, 2026), None);
        assert_eq!(infer_date("   ", "", false, 2026), None);
        assert_eq!(infer_date(NO_DATE, "03-01", true, 2026), None);
    }

    #[test]
    fn missing_year_defaults_to_current() {
        assert_eq!(infer_date("14-02", "", true, 2026), Some(ymd(2026, 2, 14)));
    }

    #[test]
    fn leading_date_rolls_back_across_new_year() {
        assert_eq!(infer_date("28-12", "03-01", true, 2026), Some(ymd(2025, 12, 28)));
    }

    #[test]
    fn trailing_date_rolls_forward_across_new_year() {
        assert_eq!(infer_date("03-01", "28-12", false, 2025), Some(ymd(2026, 1, 3)));
    }

    #[test]
    fn same_year_stay_untouched() {
        assert_eq!(infer_date("10-03", "14-03", true, 2026), Some(ymd(2026, 3, 10)));
        assert_eq!(infer_date("14-03", "10-03", false, 2026), Some(ymd(2026, 3, 14)));
        // Same day on both sides.
        assert_eq!(infer_date("10-03", "10-03", true, 2026), Some(ymd(2026, 3, 10)));
    }

    #[test]
    fn explicit_year_is_authoritative() {
        assert_eq!(infer_date("28-12-2025", "03-01-2026", true, 2026), Some(ymd(2025, 12, 28)));
        assert_eq!(infer_date("03-01-26", "28-12-25", false, 2026), Some(ymd(2026, 1, 3)));
    }

    #[test]
    fn unresolvable_reference_keeps_provisional() {
        assert_eq!(infer_date("28-12", "soon", true, 2026), Some(ymd(2026, 12, 28)));
        assert_eq!(infer_date("28-12", "31-02", true, 2026), Some(ymd(2026, 12, 28)));
    }

    #[test]
    fn impossible_date_is_none() {
        assert_eq!(infer_date("31-02", "", true, 2026), None);
        assert_eq!(infer_date("00-13", "", true, 2026), None);
    }

    #[test]
    fn leap_day_without_neighbour_is_none() {
        // 29-02 in 2028 is real, but rolling forward to 2029 is not.
        assert_eq!(infer_date("29-02", "01-03", false, 2028), None);
        assert_eq!(infer_date("29-02", "01-03", true, 2028), Some(ymd(2028, 2, 29)));
    }

    #[test]
    fn stay_pair_resolves_both_sides() {
        assert_eq!(
            resolve_stay("30-12", "02-01", 2026),
            (Some(ymd(2025, 12, 30)), Some(ymd(2026, 1, 2)))
        );
    }

    #[test]
    fn pax_parsing() {
        assert_eq!(parse_pax("2"), 2);
        assert_eq!(parse_pax(" 3 pax"), 3);
        assert_eq!(parse_pax(""), 0);
        assert_eq!(parse_pax("n/a"), 0);
        assert_eq!(parse_pax("99999999999"), 0);
    }

    #[test]
    fn guest_resolution_trims_name() {
        let input = GuestInput {
            name: "  Le Van A ".into(),
            check_in: "28-12".into(),
            check_out: "03-01".into(),
            pax: "2".into(),
        };
        let guest = resolve_guest(&input, 2026);
        assert_eq!(guest.name, "Le Van A");
        assert_eq!(guest.check_in, Some(ymd(2025, 12, 28)));
        assert_eq!(guest.check_out, Some(ymd(2026, 1, 3)));
        assert_eq!(guest.pax, 2);
    }

    #[test]
    fn display_format() {
        assert_eq!(format_display(Some(ymd(2026, 1, 3))), "03-01-26");
        assert_eq!(format_display(None), "");
    }
}
