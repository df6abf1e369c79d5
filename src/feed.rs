use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::limits::*;
use crate::model::GuestInput;

const ROOM_TYPE_COLUMN: usize = 11;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum FeedError {
    Transport(String),
    Status(u16),
    Decode(String),
    /// The response carried no grid at all.
    NoData,
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Transport(e) => write!(f, "feed request failed: {e}"),
            FeedError::Status(code) => write!(f, "feed returned HTTP {code}"),
            FeedError::Decode(e) => write!(f, "feed response unreadable: {e}"),
            FeedError::NoData => write!(f, "feed returned no data"),
        }
    }
}

impl std::error::Error for FeedError {}

/// Where full-resync rows come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// The whole grid, header row included.
    async fn fetch(&self) -> Result<Vec<Vec<String>>, FeedError>;
}

/// Google Sheets v4 `values` endpoint, read with an API key.
pub struct SheetsFeed {
    client: reqwest::Client,
    url: Url,
}

impl SheetsFeed {
    pub fn new(api_key: &str, spreadsheet_id: &str, range: &str) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let mut url = Url::parse("https://sheets.googleapis.com/v4/spreadsheets/")
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| FeedError::Transport("base url cannot take a path".into()))?
            .pop_if_empty()
            .extend([spreadsheet_id, "values", range]);
        url.query_pairs_mut().append_pair("key", api_key);

        Ok(Self { client, url })
    }
}

#[async_trait]
impl FeedSource for SheetsFeed {
    async fn fetch(&self) -> Result<Vec<Vec<String>>, FeedError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;
        grid_from_json(&body)
    }
}

/// Pull the `values` grid out of a Sheets response. Numeric cells are
/// rendered as text; anything else becomes an empty cell.
pub fn grid_from_json(body: &serde_json::Value) -> Result<Vec<Vec<String>>, FeedError> {
    let rows = body
        .get("values")
        .and_then(serde_json::Value::as_array)
        .ok_or(FeedError::NoData)?;

    Ok(rows
        .iter()
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(cell_text).collect())
                .unwrap_or_default()
        })
        .collect())
}

fn cell_text(cell: &serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// A fixed grid, for tests and for running without a spreadsheet.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    rows: Vec<Vec<String>>,
}

impl StaticFeed {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Build from string slices, header row first.
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(&self) -> Result<Vec<Vec<String>>, FeedError> {
        Ok(self.rows.clone())
    }
}

/// One data row, split into raw fields. Nothing is normalized yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRow {
    pub number: String,
    pub status: String,
    pub arrival: String,
    pub current: GuestInput,
    pub next: GuestInput,
    pub room_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    NumberTooLong(usize),
    NumberControlChars,
    TextTooLong(&'static str),
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::NumberTooLong(len) => {
                write!(f, "room number of {len} chars exceeds {MAX_ROOM_NUMBER_LEN}")
            }
            RowError::NumberControlChars => write!(f, "room number contains control characters"),
            RowError::TextTooLong(field) => write!(f, "{field} exceeds {MAX_TEXT_LEN} chars"),
        }
    }
}

impl std::error::Error for RowError {}

/// Split one data row. A blank room number yields `Ok(None)`: the row is
/// skipped without complaint.
///
/// Columns: 0 room number, 1 status, 2 arrival flag, 3-6 current guest
/// (name, check-in, check-out, pax), 7-10 next guest, 11 room type.
pub fn parse_row(row: &[String]) -> Result<Option<FeedRow>, RowError> {
    let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");

    let number = cell(0).trim();
    if number.is_empty() {
        return Ok(None);
    }
    if number.chars().count() > MAX_ROOM_NUMBER_LEN {
        return Err(RowError::NumberTooLong(number.chars().count()));
    }
    if number.chars().any(char::is_control) {
        return Err(RowError::NumberControlChars);
    }

    let guest = |base: usize| GuestInput {
        name: cell(base).to_string(),
        check_in: cell(base + 1).to_string(),
        check_out: cell(base + 2).to_string(),
        pax: cell(base + 3).to_string(),
    };
    let parsed = FeedRow {
        number: number.to_string(),
        status: cell(1).to_string(),
        arrival: cell(2).to_string(),
        current: guest(3),
        next: guest(7),
        room_type: cell(ROOM_TYPE_COLUMN).trim().to_string(),
    };

    check_len("current guest name", &parsed.current.name)?;
    check_len("next guest name", &parsed.next.name)?;
    check_len("room type", &parsed.room_type)?;
    Ok(Some(parsed))
}

fn check_len(field: &'static str, value: &str) -> Result<(), RowError> {
    if value.chars().count() > MAX_TEXT_LEN {
        Err(RowError::TextTooLong(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn short_row_padded() {
        let parsed = parse_row(&row(&["101", "VD"])).unwrap().unwrap();
        assert_eq!(parsed.number, "101");
        assert_eq!(parsed.status, "VD");
        assert_eq!(parsed.arrival, "");
        assert_eq!(parsed.current, GuestInput::default());
        assert_eq!(parsed.next, GuestInput::default());
        assert_eq!(parsed.room_type, "");
    }

    #[test]
    fn full_row_columns() {
        let parsed = parse_row(&row(&[
            " 205 ", "VD", "ARR", "Le", "20-12", "28-12", "2", "Tran", "28-12", "03-01", "3",
            "DLX",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(parsed.number, "205");
        assert_eq!(parsed.arrival, "ARR");
        assert_eq!(parsed.current.name, "Le");
        assert_eq!(parsed.current.check_out, "28-12");
        assert_eq!(parsed.next.name, "Tran");
        assert_eq!(parsed.next.check_out, "03-01");
        assert_eq!(parsed.next.pax, "3");
        assert_eq!(parsed.room_type, "DLX");
    }

    #[test]
    fn blank_number_skipped_silently() {
        assert_eq!(parse_row(&row(&["  ", "VD"])), Ok(None));
        assert_eq!(parse_row(&[]), Ok(None));
    }

    #[test]
    fn malformed_numbers_rejected() {
        assert_eq!(
            parse_row(&row(&["12345678901234567", "VD"])),
            Err(RowError::NumberTooLong(17))
        );
        assert_eq!(
            parse_row(&row(&["1\u{7}01", "VD"])),
            Err(RowError::NumberControlChars)
        );
    }

    #[test]
    fn oversized_text_rejected() {
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        let r = row(&["101", "OD", "", &long]);
        assert_eq!(parse_row(&r), Err(RowError::TextTooLong("current guest name")));
    }

    #[test]
    fn grid_from_sheets_json() {
        let body = serde_json::json!({
            "range": "Sheet1!A1:L3",
            "majorDimension": "ROWS",
            "values": [
                ["Room", "Status"],
                ["101", "VD", "", "", "", "", 2],
                []
            ]
        });
        let grid = grid_from_json(&body).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[1][6], "2");
        assert!(grid[2].is_empty());
    }

    #[test]
    fn grid_missing_values_is_no_data() {
        let body = serde_json::json!({ "range": "Sheet1!A1:L3" });
        assert!(matches!(grid_from_json(&body), Err(FeedError::NoData)));
    }

    #[test]
    fn sheets_url_shape() {
        let feed = SheetsFeed::new("k3y", "sheet-id", "A1:L200").unwrap();
        assert_eq!(
            feed.url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/A1:L200?key=k3y"
        );
    }

    #[tokio::test]
    async fn static_feed_returns_grid() {
        let feed = StaticFeed::from_rows(&[&["Room"], &["101", "VC"]]);
        let grid = feed.fetch().await.unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1], vec!["101".to_string(), "VC".to_string()]);
    }
}
