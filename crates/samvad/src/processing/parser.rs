//! Per-type text extraction for uploaded sources and web pages.
//!
//! Each adapter extracts text deterministically, then applies a lossy
//! per-type normalization: line breaks collapse to spaces and structural
//! formatting is discarded in favor of flat prose suitable for similarity
//! search. Unsupported extensions are skipped (mixed batches are normal);
//! unreadable files fail with an ingestion error naming the source.

use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub struct DocumentParser {
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl DocumentParser {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            fetch_timeout,
        }
    }

    /// Extract and normalize text from one file, dispatching on extension.
    /// Returns `Ok(None)` for unsupported extensions.
    pub fn parse_file(&self, path: &Path) -> Result<Option<String>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let text = match extension.as_str() {
            "pdf" => self.parse_pdf(path)?,
            "csv" => self.parse_csv(path)?,
            "txt" => self.parse_txt(path)?,
            "xls" | "xlsx" => self.parse_spreadsheet(path)?,
            "json" => self.parse_json(path)?,
            other => {
                tracing::debug!(source = %path.display(), extension = other, "skipping unsupported file type");
                return Ok(None);
            }
        };

        Ok(Some(text))
    }

    /// Concatenate normalized text from every supported file plus an optional
    /// URL, preserving source order. Empty output means nothing to index.
    pub async fn ingest(&self, paths: &[std::path::PathBuf], url: Option<&str>) -> Result<String> {
        let mut segments = Vec::new();

        for path in paths {
            if let Some(text) = self.parse_file(path)? {
                if !text.is_empty() {
                    segments.push(text);
                }
            }
        }

        if let Some(url) = url {
            let text = self.fetch_url(url).await?;
            if !text.is_empty() {
                segments.push(text);
            }
        }

        tracing::info!(files = paths.len(), segments = segments.len(), "ingestion complete");
        Ok(segments.join("\n"))
    }

    fn parse_pdf(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| ingestion(path, e))?;
        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ingestion(path, e))?;

        // Page text arrives newline-heavy; flatten to prose.
        Ok(collapse_whitespace(&text))
    }

    fn parse_csv(&self, path: &Path) -> Result<String> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| ingestion(path, e))?;
        let mut lines = Vec::new();

        let headers = reader.headers().map_err(|e| ingestion(path, e))?.clone();
        if !headers.is_empty() {
            lines.push(headers.iter().collect::<Vec<_>>().join(" | "));
        }
        for record in reader.records() {
            let record = record.map_err(|e| ingestion(path, e))?;
            lines.push(record.iter().collect::<Vec<_>>().join(" | "));
        }

        Ok(lines.join(" "))
    }

    fn parse_txt(&self, path: &Path) -> Result<String> {
        let raw = std::fs::read_to_string(path).map_err(|e| ingestion(path, e))?;
        // CRLF first, so a Windows line break becomes one space, not two.
        Ok(raw.replace("\r\n", " ").replace(['\n', '\r'], " "))
    }

    fn parse_spreadsheet(&self, path: &Path) -> Result<String> {
        let mut workbook = open_workbook_auto(path).map_err(|e| ingestion(path, e))?;
        let mut lines = Vec::new();

        for (_name, range) in workbook.worksheets() {
            for row in range.rows() {
                let cells: Vec<String> = row.iter().map(cell_to_string).collect();
                lines.push(cells.join(" | "));
            }
        }

        Ok(lines.join(" "))
    }

    fn parse_json(&self, path: &Path) -> Result<String> {
        let raw = std::fs::read_to_string(path).map_err(|e| ingestion(path, e))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ingestion(path, e))?;
        let pretty = serde_json::to_string_pretty(&value)?;

        // Flatten and drop the bracket scaffolding; key/value prose remains.
        let flat = pretty.replace(['\n', '\r'], " ");
        Ok(flat
            .chars()
            .filter(|c| !matches!(c, '{' | '}' | '[' | ']'))
            .collect())
    }

    /// Fetch a web page and strip it down to visible text. The timeout
    /// bounds the whole exchange, body read included.
    pub async fn fetch_url(&self, url: &str) -> Result<String> {
        let exchange = async {
            let response = self.http.get(url).send().await.map_err(|e| Error::Ingestion {
                source_name: url.to_string(),
                reason: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::Ingestion {
                    source_name: url.to_string(),
                    reason: format!("HTTP {}", status),
                });
            }

            response.text().await.map_err(|e| Error::Ingestion {
                source_name: url.to_string(),
                reason: e.to_string(),
            })
        };

        let body = tokio::time::timeout(self.fetch_timeout, exchange)
            .await
            .map_err(|_| Error::UpstreamTimeout(self.fetch_timeout))??;

        Ok(collapse_whitespace(&strip_html_tags(&body)))
    }
}

fn ingestion(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Ingestion {
        source_name: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Collapse all whitespace runs (including line breaks) to single spaces.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convert a calamine cell to a clean string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                format!("{:.4}", f)
                    .trim_end_matches('0')
                    .trim_end_matches('.')
                    .to_string()
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#ERR:{:?}", e),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// Strip HTML tags and skip script/style blocks, returning visible text.
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len() / 2);
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        result.push_str(&rest[..open]);
        rest = &rest[open..];

        let lower_prefix: String = rest.chars().take(8).collect::<String>().to_lowercase();
        let closer = if lower_prefix.starts_with("<script") {
            Some("</script>")
        } else if lower_prefix.starts_with("<style") {
            Some("</style>")
        } else {
            None
        };

        if let Some(closer) = closer {
            // Drop the whole element, content included. The closer must be
            // located case-insensitively in the original string: offsets
            // from a lowercased copy shift on chars whose byte length
            // changes under lowercasing.
            match find_ignore_ascii_case(rest, closer) {
                Some(end) => rest = &rest[end + closer.len()..],
                None => return result,
            }
            continue;
        }

        match rest.find('>') {
            Some(end) => {
                // Tag boundaries separate words in the rendered page.
                result.push(' ');
                rest = &rest[end + 1..];
            }
            None => return result,
        }
    }

    result.push_str(rest);
    result
}

/// Byte-wise case-insensitive substring search. The needle is ASCII, so a
/// match position is always a char boundary in the haystack.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parser() -> DocumentParser {
        DocumentParser::new(Duration::from_secs(5))
    }

    #[test]
    fn txt_line_breaks_collapse_to_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "first line\nsecond line\r\nthird").unwrap();

        let text = parser().parse_file(&path).unwrap().unwrap();
        assert_eq!(text, "first line second line third");
    }

    #[test]
    fn csv_rows_render_in_order_with_delimiters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "client,amount").unwrap();
        writeln!(file, "Jane Doe,120").unwrap();
        writeln!(file, "John Roe,75").unwrap();
        drop(file);

        let text = parser().parse_file(&path).unwrap().unwrap();
        assert_eq!(text, "client | amount Jane Doe | 120 John Roe | 75");
    }

    #[test]
    fn json_is_flattened_without_brackets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(&path, r#"{"client":"Jane","items":[1,2]}"#).unwrap();

        let text = parser().parse_file(&path).unwrap().unwrap();
        assert!(text.contains("\"client\": \"Jane\""));
        assert!(!text.contains('{'));
        assert!(!text.contains('['));
    }

    #[test]
    fn unsupported_extension_is_skipped_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.zip");
        std::fs::write(&path, b"PK").unwrap();

        assert!(parser().parse_file(&path).unwrap().is_none());
    }

    #[test]
    fn missing_file_names_the_offending_source() {
        let err = parser()
            .parse_file(Path::new("/definitely/missing.txt"))
            .unwrap_err();
        match err {
            Error::Ingestion { source_name, .. } => {
                assert!(source_name.contains("missing.txt"));
            }
            other => panic!("expected Ingestion error, got {other:?}"),
        }
    }

    #[test]
    fn html_stripping_keeps_visible_text_only() {
        let html = "<html><head><style>p{color:red}</style>\
                    <script>var x=1;</script></head>\
                    <body><p>Hello <b>world</b></p></body></html>";
        let text = collapse_whitespace(&strip_html_tags(html));
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn multibyte_text_inside_skipped_blocks_does_not_panic() {
        // İ grows from 2 to 3 bytes under lowercasing, which used to shift
        // the closer offset into the middle of a character.
        let html = "<p>Héllo</p><SCRIPT>var İ = \"İstanbul\";</SCRIPT>\
                    <style>İ{}</style><p>wörld</p>é";
        let text = collapse_whitespace(&strip_html_tags(html));
        assert_eq!(text, "Héllo wörld é");
    }

    #[tokio::test]
    async fn ingest_mixes_types_and_skips_unknown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.bin"), [0u8; 4]).unwrap();
        std::fs::write(dir.path().join("c.txt"), "gamma").unwrap();

        let paths = vec![
            dir.path().join("a.txt"),
            dir.path().join("b.bin"),
            dir.path().join("c.txt"),
        ];
        let text = parser().ingest(&paths, None).await.unwrap();
        assert_eq!(text, "alpha\ngamma");
    }
}
