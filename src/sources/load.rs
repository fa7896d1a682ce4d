//! Reference-asset loading: reads the data directory (txt/json/csv/xlsx)
//! into immutable in-memory sources, and optionally pulls the scraped
//! catalog pages over HTTP. The rest of the pipeline never touches files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info, warn};

use super::types::{ReferenceSource, Row, SourceBody, SourceKind};
use super::ReferenceLibrary;
use crate::cite::resolve::{source_url, SCRAPED_SOURCES};

/// Load the whole library: directory assets first (blocking I/O moved off
/// the async runtime), then fetched catalog pages when enabled.
pub async fn load_library(
    data_dir: &Path,
    row_cap: usize,
    fetch_catalog: bool,
) -> Result<ReferenceLibrary> {
    let dir = data_dir.to_path_buf();
    let mut sources =
        tokio::task::spawn_blocking(move || load_dir(&dir, row_cap))
            .await
            .context("reference load task failed")??;

    if fetch_catalog {
        sources.extend(fetch_catalog_sources().await);
    }

    info!(count = sources.len(), "reference library loaded");
    Ok(ReferenceLibrary::new(sources))
}

fn make_source(name: String, kind: SourceKind, raw: &[u8], body: SourceBody) -> ReferenceSource {
    let url = source_url(&name).map(String::from);
    ReferenceSource {
        id: blake3::hash(raw).to_hex().to_string(),
        label: name.clone(),
        name,
        url,
        kind,
        body,
        loaded_at: chrono::Utc::now().timestamp(),
    }
}

fn load_dir(dir: &Path, row_cap: usize) -> Result<Vec<ReferenceSource>> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "data directory missing; starting with no local sources");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read data dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    // Fixed load order keeps source ordering (and tie-breaks downstream)
    // deterministic across runs.
    paths.sort();

    let mut sources = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let loaded = match ext.as_str() {
            "txt" => load_text(&path, &name, SourceKind::Text).map(|s| vec![s]),
            "json" => load_text(&path, &name, SourceKind::Json).map(|s| vec![s]),
            "csv" => load_csv(&path, &name, row_cap).map(|s| vec![s]),
            "xlsx" | "xls" => load_workbook(&path, &name, row_cap),
            _ => {
                debug!(file = %name, "skipping unsupported asset");
                continue;
            }
        };

        match loaded {
            Ok(mut loaded) => {
                for s in &loaded {
                    debug!(source = %s.name, kind = ?s.kind, id = %s.id, "source loaded");
                }
                sources.append(&mut loaded);
            }
            Err(e) => warn!(file = %name, error = %e, "failed to load asset; skipping"),
        }
    }
    Ok(sources)
}

fn load_text(path: &Path, name: &str, kind: SourceKind) -> Result<ReferenceSource> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let text = String::from_utf8_lossy(&raw).to_string();
    Ok(make_source(name.to_string(), kind, &raw, SourceBody::Text(text)))
}

/// Best-effort typing for CSV cells so numbers compare like numbers once
/// rows are JSON-rendered into the context block.
fn cell_value(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return serde_json::Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return serde_json::Value::Number(n);
        }
    }
    serde_json::Value::String(raw.to_string())
}

fn load_csv(path: &Path, name: &str, row_cap: usize) -> Result<ReferenceSource> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_slice());
    let headers: Vec<String> = reader
        .headers()
        .context("csv headers")?
        .iter()
        .map(String::from)
        .collect();

    let mut rows: Vec<Row> = Vec::new();
    for record in reader.records() {
        let record = record.context("csv record")?;
        let mut row = Row::new();
        for (i, field) in record.iter().enumerate() {
            let key = headers
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("column_{}", i + 1));
            row.insert(key, cell_value(field));
        }
        rows.push(row);
        if rows.len() >= row_cap {
            break;
        }
    }

    Ok(make_source(
        name.to_string(),
        SourceKind::Table,
        &raw,
        SourceBody::Rows(rows),
    ))
}

fn sheet_cell_value(cell: &Data) -> serde_json::Value {
    match cell {
        Data::Empty => serde_json::Value::String(String::new()),
        Data::String(s) => serde_json::Value::String(s.clone()),
        Data::Int(i) => serde_json::Value::from(*i),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                serde_json::Value::from(*f as i64)
            } else {
                serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(f.to_string()))
            }
        }
        Data::Bool(b) => serde_json::Value::Bool(*b),
        other => serde_json::Value::String(other.to_string()),
    }
}

/// One table source per sheet, labeled `"<file> / <sheet>"`, rows capped.
/// The first sheet row is taken as the header row.
fn load_workbook(path: &Path, name: &str, row_cap: usize) -> Result<Vec<ReferenceSource>> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("open workbook {}", path.display()))?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    let mut sources = Vec::new();
    for sheet_name in &sheet_names {
        let range = match workbook.worksheet_range(sheet_name) {
            Ok(range) => range,
            Err(e) => {
                warn!(sheet = %sheet_name, error = %e, "unreadable sheet; skipping");
                continue;
            }
        };
        let mut rows_iter = range.rows();
        let Some(header_row) = rows_iter.next() else {
            continue;
        };
        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let h = cell.to_string().trim().to_string();
                if h.is_empty() {
                    format!("column_{}", i + 1)
                } else {
                    h
                }
            })
            .collect();

        let mut rows: Vec<Row> = Vec::new();
        for data_row in rows_iter {
            let mut row = Row::new();
            for (i, cell) in data_row.iter().enumerate() {
                let key = headers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                row.insert(key, sheet_cell_value(cell));
            }
            rows.push(row);
            if rows.len() >= row_cap {
                break;
            }
        }
        if rows.is_empty() {
            continue;
        }

        let label = format!("{} / {}", name, sheet_name);
        let mut source = make_source(label.clone(), SourceKind::Table, &raw, SourceBody::Rows(rows));
        // The hash alone would collide across sheets of one workbook.
        source.id = blake3::hash(format!("{}:{}", source.id, sheet_name).as_bytes())
            .to_hex()
            .to_string();
        sources.push(source);
    }
    Ok(sources)
}

/// Fetch the scraped-catalog pages and keep them as prose sources. Any
/// failure skips that page; grounding degrades instead of blocking startup.
async fn fetch_catalog_sources() -> Vec<ReferenceSource> {
    let client = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(20))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "catalog fetch client unavailable");
            return Vec::new();
        }
    };

    let mut sources = Vec::new();
    for (label, url) in SCRAPED_SOURCES {
        match fetch_page(&client, url).await {
            Ok(text) => {
                let raw = text.as_bytes().to_vec();
                let mut source = make_source(
                    label.to_string(),
                    SourceKind::Text,
                    &raw,
                    SourceBody::Text(text),
                );
                source.url = Some(url.to_string());
                info!(source = %label, bytes = raw.len(), "catalog page fetched");
                sources.push(source);
            }
            Err(e) => warn!(source = %label, error = %e, "catalog page fetch failed; skipping"),
        }
    }
    sources
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client.get(url).send().await.context("fetch catalog page")?;
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let body = resp.bytes().await.context("read catalog page body")?;

    let text = if content_type.contains("html") {
        html2text::from_read(&body[..], 120)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string())
    } else {
        String::from_utf8_lossy(&body).to_string()
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("terah-load-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_dir_reads_text_json_and_csv() {
        let dir = temp_dir("mixed");
        std::fs::write(dir.join("ATO.txt"), "Pension guidance.\n\nSecond paragraph.").unwrap();
        std::fs::write(dir.join("Leaving_The_Workforce.json"), r#"{"k": "v"}"#).unwrap();
        std::fs::write(
            dir.join("DSS_Demographics.csv"),
            "payment,count\nAge Pension,120\nJobSeeker,80\n",
        )
        .unwrap();

        let library = load_library(&dir, 100, false).await.unwrap();
        assert_eq!(library.len(), 3);

        let csv = library
            .sources()
            .iter()
            .find(|s| s.name.ends_with(".csv"))
            .unwrap();
        assert_eq!(csv.kind, SourceKind::Table);
        let SourceBody::Rows(rows) = &csv.body else {
            panic!("csv should load as rows");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["payment"], serde_json::json!("Age Pension"));
        assert_eq!(rows[0]["count"], serde_json::json!(120));
        assert!(csv.url.is_some());

        let txt = library
            .sources()
            .iter()
            .find(|s| s.name == "ATO.txt")
            .unwrap();
        assert_eq!(txt.kind, SourceKind::Text);
        assert_eq!(txt.url.as_deref(), Some("https://www.ato.gov.au/"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_row_cap_applies_at_load() {
        let dir = temp_dir("cap");
        let mut csv = String::from("n\n");
        for i in 0..50 {
            csv.push_str(&format!("{}\n", i));
        }
        std::fs::write(dir.join("big.csv"), csv).unwrap();

        let library = load_library(&dir, 10, false).await.unwrap();
        let SourceBody::Rows(rows) = &library.sources()[0].body else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty_not_error() {
        let dir = std::env::temp_dir().join("terah-definitely-missing-dir");
        let library = load_library(&dir, 10, false).await.unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn test_cell_value_dynamic_typing() {
        assert_eq!(cell_value("42"), serde_json::json!(42));
        assert_eq!(cell_value("4.5"), serde_json::json!(4.5));
        assert_eq!(cell_value("abc"), serde_json::json!("abc"));
    }
}
