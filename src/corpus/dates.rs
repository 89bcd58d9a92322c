use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const MONTHS: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})[-/](\d{1,2})[-/](\d{1,2})\b").expect("valid regex"));

static DAY_FIRST_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex"));

static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b", MONTHS))
        .expect("valid regex")
});

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+{}\.?,?\s+(\d{{4}})\b", MONTHS))
        .expect("valid regex")
});

/// Extracts the calendar dates mentioned in `content` and `filename`.
///
/// Dates are normalized to `YYYY-MM-DD`, returned in order of appearance (content first,
/// then filename) and deduplicated. Impossible dates such as `2021-02-30` are ignored.
///
/// # Arguments
/// * `content` - Document body
/// * `filename` - Source filename, which often carries the publication date
///
/// # Returns
/// * `Vec<String>` - Possibly empty list of ISO dates
pub fn extract_dates(content: &str, filename: &str) -> Vec<String> {
    let mut dates: Vec<String> = Vec::new();

    // Underscores are word characters and would defeat the \b anchors.
    let filename = filename.replace('_', " ");

    for text in [content, filename.as_str()] {
        for date in dates_in_text(text) {
            if !dates.contains(&date) {
                dates.push(date);
            }
        }
    }

    dates
}

fn dates_in_text(text: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    collect(&mut found, &ISO_DATE, text, |c| {
        ymd(num(c, 1)?, num(c, 2)?, num(c, 3)?)
    });
    collect(&mut found, &DAY_FIRST_NUMERIC, text, |c| {
        ymd(num(c, 3)?, num(c, 2)?, num(c, 1)?)
    });
    collect(&mut found, &MONTH_DAY_YEAR, text, |c| {
        ymd(num(c, 3)?, month(c, 1)?, num(c, 2)?)
    });
    collect(&mut found, &DAY_MONTH_YEAR, text, |c| {
        ymd(num(c, 3)?, month(c, 2)?, num(c, 1)?)
    });

    found.sort_by_key(|(position, _)| *position);
    found.into_iter().map(|(_, date)| date).collect()
}

fn collect<F>(found: &mut Vec<(usize, String)>, pattern: &Regex, text: &str, to_date: F)
where
    F: Fn(&Captures) -> Option<NaiveDate>,
{
    for captures in pattern.captures_iter(text) {
        if let (Some(whole), Some(date)) = (captures.get(0), to_date(&captures)) {
            found.push((whole.start(), date.format("%Y-%m-%d").to_string()));
        }
    }
}

fn num(captures: &Captures, index: usize) -> Option<u32> {
    captures.get(index)?.as_str().parse().ok()
}

fn month(captures: &Captures, index: usize) -> Option<u32> {
    let name = captures.get(index)?.as_str().to_lowercase();
    let position = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|prefix| name.starts_with(prefix))?;
    Some(position as u32 + 1)
}

fn ymd(year: u32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}
