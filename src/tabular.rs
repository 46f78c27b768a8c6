/// Parse raw delimited text into rows of cell strings.
///
/// Handles quoted fields containing commas and newlines, doubled-quote
/// escaping, `\r\n` and `\n` endings, and a trailing line without a
/// terminator. A leading UTF-8 byte-order mark is stripped. Rows whose cells
/// are all empty after trim are dropped; downstream the first surviving row is
/// the header and data rows are numbered from 2.
pub fn parse_rows(text: &str) -> anyhow::Result<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        rows.push(cells);
    }
    Ok(rows)
}
