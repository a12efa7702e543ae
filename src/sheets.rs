//! Access to the quiz spreadsheet through the Google Sheets values API.
//!
//! Rows and columns are 1-indexed and addressed the way the sheet displays
//! them: numeric row ranges like `3:1000` and column letters like `Q`. The
//! [`SheetStore`] trait is the seam the grading run depends on; the service
//! client and the in-memory test double both implement it.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::{columns, config::SheetConfig};

/// Read and write access to one spreadsheet.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Reads a single row, returning its cell values in column order.
    async fn read_row(&self, row: u32) -> Result<Vec<String>>;

    /// Reads the rows `start..=end`, stopping at the last row that has any
    /// values.
    async fn read_range(&self, start: u32, end: u32) -> Result<Vec<Vec<String>>>;

    /// Writes a single cell addressed by row and column letter.
    async fn write_cell(&self, row: u32, col: &str, value: &str) -> Result<()>;

    /// Reads a single cell by A1 address, returning `None` when the response
    /// carries no values.
    async fn read_cell(&self, address: &str) -> Result<Option<String>>;
}

/// Response body of the values endpoint.
#[derive(Debug, Deserialize)]
struct ValueRange {
    /// Cell values, row-major; absent when the range is empty.
    values: Option<Vec<Vec<String>>>,
}

/// Client for the Google Sheets values API backing the quiz.
pub struct SheetsClient {
    /// Shared HTTP client.
    client: Client,
    /// Spreadsheet id, endpoint, and token.
    config: SheetConfig,
}

impl SheetsClient {
    /// Creates a client for the configured spreadsheet.
    pub fn new(config: SheetConfig, client: Client) -> Self {
        Self { client, config }
    }

    /// Returns the values-endpoint URL for `range`.
    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.spreadsheet_id,
            range
        )
    }

    /// Fetches `range` and returns the decoded value grid.
    async fn get_values(&self, range: &str) -> Result<ValueRange> {
        self.client
            .get(self.values_url(range))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .with_context(|| format!("Could not read range {range}"))?
            .error_for_status()
            .with_context(|| format!("Sheets API rejected read of range {range}"))?
            .json::<ValueRange>()
            .await
            .with_context(|| format!("Could not parse values response for range {range}"))
    }
}

#[async_trait]
impl SheetStore for SheetsClient {
    async fn read_row(&self, row: u32) -> Result<Vec<String>> {
        let values = self.get_values(&format!("{row}:{row}")).await?;
        Ok(values
            .values
            .unwrap_or_default()
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    async fn read_range(&self, start: u32, end: u32) -> Result<Vec<Vec<String>>> {
        let values = self.get_values(&format!("{start}:{end}")).await?;
        Ok(values.values.unwrap_or_default())
    }

    async fn write_cell(&self, row: u32, col: &str, value: &str) -> Result<()> {
        let range = format!("{col}{row}");
        self.client
            .put(self.values_url(&range))
            .bearer_auth(&self.config.token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": [[value]] }))
            .send()
            .await
            .with_context(|| format!("Could not write cell {range}"))?
            .error_for_status()
            .with_context(|| format!("Sheets API rejected write of cell {range}"))?;

        Ok(())
    }

    async fn read_cell(&self, address: &str) -> Result<Option<String>> {
        let values = self.get_values(address).await?;
        Ok(values
            .values
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.into_iter().next()))
    }
}

/// Backing state of an [`InMemorySheet`].
#[derive(Default)]
struct SheetState {
    /// Row-major grid; index 0 is sheet row 1.
    rows:        Vec<Vec<String>>,
    /// Number of cell writes performed so far.
    writes:      u32,
    /// When set, every write fails with a transport-shaped error.
    fail_writes: bool,
}

/// In-memory implementation of [`SheetStore`] for tests.
///
/// Clones share the same grid, so a test can hand one clone to the grading
/// run and inspect the other afterwards.
#[derive(Clone, Default)]
pub struct InMemorySheet {
    /// Shared grid and write counters.
    inner: Arc<Mutex<SheetState>>,
}

impl InMemorySheet {
    /// Creates an empty sheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sheet pre-populated with `rows`, the first of which becomes
    /// sheet row 1.
    pub fn with_rows<R, C, V>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let sheet = Self::new();
        sheet.inner.lock().expect("sheet state poisoned").rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        sheet
    }

    /// Makes every subsequent write fail when `fail` is set.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().expect("sheet state poisoned").fail_writes = fail;
    }

    /// Returns the cell at `row` and column letter `col`, or an empty string.
    pub fn cell(&self, row: u32, col: &str) -> String {
        let index = columns::index(col).expect("valid column letter");
        let state = self.inner.lock().expect("sheet state poisoned");
        state
            .rows
            .get(row as usize - 1)
            .map(|cells| columns::cell(cells, index))
            .unwrap_or_default()
    }

    /// Returns the number of cell writes performed so far.
    pub fn writes(&self) -> u32 {
        self.inner.lock().expect("sheet state poisoned").writes
    }
}

#[async_trait]
impl SheetStore for InMemorySheet {
    async fn read_row(&self, row: u32) -> Result<Vec<String>> {
        let state = self.inner.lock().expect("sheet state poisoned");
        Ok(state
            .rows
            .get(row as usize - 1)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_range(&self, start: u32, end: u32) -> Result<Vec<Vec<String>>> {
        let state = self.inner.lock().expect("sheet state poisoned");
        let last = state.rows.len().min(end as usize);
        let first = (start as usize).saturating_sub(1).min(last);
        Ok(state.rows[first..last].to_vec())
    }

    async fn write_cell(&self, row: u32, col: &str, value: &str) -> Result<()> {
        let index = columns::index(col)?;
        let mut state = self.inner.lock().expect("sheet state poisoned");
        if state.fail_writes {
            bail!("write to {col}{row} refused");
        }

        let row = row as usize - 1;
        if state.rows.len() <= row {
            state.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut state.rows[row];
        if cells.len() <= index {
            cells.resize_with(index + 1, String::new);
        }
        cells[index] = value.to_string();
        state.writes += 1;

        Ok(())
    }

    async fn read_cell(&self, address: &str) -> Result<Option<String>> {
        let (letters, row) = columns::split_a1(address)?;
        let value = self.cell(row, &letters);
        Ok(if value.is_empty() { None } else { Some(value) })
    }
}
