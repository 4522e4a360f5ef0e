//! Tesseract TSV output parsing.

use crate::types::{BoundingBox, OcrResult, OcrResultElement};

/// TSV row level of a page
pub const TSV_PAGE_LEVEL: u32 = 1;
/// TSV row level of a single word
pub const TSV_WORD_LEVEL: u32 = 5;
/// Columns in a complete TSV row
pub const TSV_MIN_FIELDS: usize = 12;

/// Build an [`OcrResult`] from Tesseract's TSV format.
///
/// Columns are `level page_num block_num par_num line_num word_num left top
/// width height conf text`. The page row supplies the page bounds; word rows
/// with a confidence below `min_confidence` or no text are skipped. Words are
/// numbered into lines by their (block, paragraph, line) triple.
pub fn parse_tsv(tsv_data: &str, language_code: &str, min_confidence: f64) -> OcrResult {
    let mut page_bounds = BoundingBox::default();
    let mut elements = Vec::new();
    let mut last_line_key: Option<(u32, u32, u32)> = None;
    let mut line_index = 0u32;

    for (line_num, line) in tsv_data.lines().enumerate() {
        if line_num == 0 && line.starts_with("level") {
            continue;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < TSV_MIN_FIELDS - 1 {
            continue;
        }

        let level = fields[0].parse::<u32>().unwrap_or(0);
        let bounds = BoundingBox::new(
            fields[6].parse().unwrap_or(0),
            fields[7].parse().unwrap_or(0),
            fields[8].parse().unwrap_or(0),
            fields[9].parse().unwrap_or(0),
        );

        if level == TSV_PAGE_LEVEL {
            page_bounds = bounds;
            continue;
        }
        if level != TSV_WORD_LEVEL || fields.len() < TSV_MIN_FIELDS {
            continue;
        }

        let conf = fields[10].parse::<f64>().unwrap_or(-1.0);
        if conf < min_confidence {
            continue;
        }

        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        let line_key = (
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        match last_line_key {
            Some(previous) if previous != line_key => line_index += 1,
            _ => {}
        }
        last_line_key = Some(line_key);

        elements.push(OcrResultElement {
            text: text.to_string(),
            language_code: language_code.to_string(),
            right_to_left: false,
            bounds,
            confidence: conf,
            line: line_index,
        });
    }

    OcrResult::new(page_bounds, elements, false)
}
