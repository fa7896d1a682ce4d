use serde::{Deserialize, Serialize};

/// Content-addressed source ID (blake3 hex hash of the raw asset).
pub type SourceId = String;

/// One parsed table row: column name -> cell value.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Text,
    Table,
    Json,
}

/// Body of a reference source: prose for text/json assets, ordered rows for
/// tabular assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceBody {
    Text(String),
    Rows(Vec<Row>),
}

/// A locally held document or table used to ground model answers and provide
/// citation targets. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSource {
    pub id: SourceId,
    /// Asset name, e.g. "ATO.txt" or "ABS_Retirement_Comparison.xlsx / Sheet1"
    pub name: String,
    /// Header label used in assembled context blocks; usually equals `name`.
    pub label: String,
    /// Canonical citation target, when the asset maps to a public page.
    pub url: Option<String>,
    pub kind: SourceKind,
    pub body: SourceBody,
    pub loaded_at: i64,
}

impl ReferenceSource {
    pub fn is_tabular(&self) -> bool {
        matches!(self.body, SourceBody::Rows(_))
    }

    /// The source content as one text blob. Rows are rendered one JSON
    /// object per line, the same shape they take inside a context block.
    pub fn body_text(&self) -> String {
        match &self.body {
            SourceBody::Text(t) => t.clone(),
            SourceBody::Rows(rows) => rows
                .iter()
                .map(|r| serde_json::to_string(r).unwrap_or_default())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_body_text_renders_rows_as_json_lines() {
        let source = ReferenceSource {
            id: "abc".into(),
            name: "t.csv".into(),
            label: "t.csv".into(),
            url: None,
            kind: SourceKind::Table,
            body: SourceBody::Rows(vec![
                row(&[("age", serde_json::json!(67))]),
                row(&[("age", serde_json::json!(65))]),
            ]),
            loaded_at: 0,
        };
        assert_eq!(source.body_text(), "{\"age\":67}\n{\"age\":65}");
    }
}
