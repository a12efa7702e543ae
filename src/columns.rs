use anyhow::{Context, Result, ensure};

/// Returns the 0-based index for a spreadsheet column letter, so `"A"` is 0
/// and `"AB"` is 27.
pub fn index(letters: &str) -> Result<usize> {
    ensure!(!letters.is_empty(), "Column letter is empty");

    let mut index = 0usize;
    for c in letters.chars() {
        let c = c.to_ascii_uppercase();
        ensure!(c.is_ascii_uppercase(), "Invalid column letter: {letters}");
        index = index * 26 + (c as usize - 'A' as usize + 1);
    }

    Ok(index - 1)
}

/// Returns the column letter for a 0-based index, so 0 is `"A"` and 27 is
/// `"AB"`.
pub fn letter(index: usize) -> String {
    let mut remaining = index + 1;
    let mut letters = Vec::new();

    while remaining > 0 {
        remaining -= 1;
        letters.push(b'A' + (remaining % 26) as u8);
        remaining /= 26;
    }

    letters.reverse();
    String::from_utf8(letters).expect("column letters are ASCII")
}

/// Returns the cell at `index`, or an empty string when the row is shorter.
pub fn cell(row: &[String], index: usize) -> String {
    row.get(index).cloned().unwrap_or_default()
}

/// Returns the inclusive `from..=to` slice of `row`, padding missing
/// trailing cells with empty strings so the result always has the full
/// width of the range.
pub fn cells(row: &[String], from: usize, to: usize) -> Vec<String> {
    (from..=to).map(|i| cell(row, i)).collect()
}

/// Splits an A1-style cell address into its column letters and 1-indexed
/// row, so `"B12"` becomes `("B", 12)`.
pub fn split_a1(address: &str) -> Result<(String, u32)> {
    let digits = address
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("Cell address has no row: {address}"))?;

    let (letters, row) = address.split_at(digits);
    ensure!(!letters.is_empty(), "Cell address has no column: {address}");
    let row = row
        .parse::<u32>()
        .with_context(|| format!("Invalid row in cell address: {address}"))?;

    Ok((letters.to_string(), row))
}
