//! Tabular query results.
//!
//! A `ResultSet` keeps column order stable and owns its rows for the
//! lifetime of one request. Cells that came from DATE/DATETIME/TIMESTAMP
//! columns are parsed into `Value::Timestamp` and travel as ISO-8601 strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value as JsonValue};

/// One cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Real(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Real(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Literal rendering used in digests and tables. Whole reals keep a
    /// trailing `.0` so they stay distinguishable from integers.
    pub fn literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Real(f) if f.is_nan() => "null".to_string(),
            Value::Real(f) if f.fract() == 0.0 && f.abs() < 1e16 => format!("{:.1}", f),
            Value::Real(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Integer(n) => JsonValue::from(*n),
            // from_f64 yields None for NaN/inf
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Timestamp(ts) => JsonValue::String(iso_format(ts)),
        }
    }
}

/// `2024-03-01T10:15:00`, with fractional seconds only when present.
pub fn iso_format(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse the date/time spellings found in procurement tables.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// How a column's cells are rendered, decided once per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Temporal,
    Numeric,
    Text,
}

impl ColumnKind {
    /// A name containing "date" wins; otherwise a column is numeric when it
    /// has at least one value and every non-null value is a number.
    pub fn detect<'a>(name: &str, mut values: impl Iterator<Item = &'a Value>) -> Self {
        if name.to_lowercase().contains("date") {
            return ColumnKind::Temporal;
        }
        let mut seen = false;
        let numeric = values.all(|v| match v {
            Value::Null => true,
            Value::Integer(_) | Value::Real(_) => {
                seen = true;
                true
            }
            _ => false,
        });
        if numeric && seen {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows:    Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(idx))
    }

    pub fn column_kinds(&self) -> Vec<ColumnKind> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnKind::detect(name, self.column_values(i)))
            .collect()
    }

    /// Rows as ordered JSON objects, the transport shape of `data`.
    pub fn to_records(&self) -> Vec<Map<String, JsonValue>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, val)| (col.clone(), val.to_json()))
                    .collect()
            })
            .collect()
    }

    /// Markdown pipe table of the first `limit` rows.
    pub fn to_markdown(&self, limit: usize) -> String {
        let escape = |s: String| s.replace('|', "\\|").replace('\n', " ");
        let mut out = String::new();
        out.push_str("| ");
        out.push_str(&self.columns.iter().map(|c| escape(c.clone())).collect::<Vec<_>>().join(" | "));
        out.push_str(" |\n|");
        out.push_str(&self.columns.iter().map(|_| "---|").collect::<String>());
        for row in self.rows.iter().take(limit) {
            out.push_str("\n| ");
            out.push_str(
                &row.iter().map(|v| escape(v.literal())).collect::<Vec<_>>().join(" | "),
            );
            out.push_str(" |");
        }
        out
    }

    /// Box-drawn table for terminal output, capped at `max_rows`.
    pub fn render_table(&self, max_rows: usize) -> String {
        const MAX_CELL: usize = 60;

        if self.rows.is_empty() {
            return "(no results)".to_string();
        }

        let clip = |v: String| -> String {
            if v.chars().count() > MAX_CELL {
                format!("{}…", v.chars().take(MAX_CELL - 1).collect::<String>())
            } else {
                v
            }
        };

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in self.rows.iter().take(max_rows) {
            for (i, val) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(val.literal().chars().count().min(MAX_CELL));
                }
            }
        }

        let pad = |s: &str, w: usize| format!("{}{}", s, " ".repeat(w.saturating_sub(s.chars().count())));

        let header: String = self.columns.iter().enumerate()
            .map(|(i, c)| pad(c.as_str(), widths[i]))
            .collect::<Vec<_>>().join(" │ ");
        let rule = "─".repeat(header.chars().count());

        let mut lines = vec![
            format!("┌─{}─┐", rule),
            format!("│ {} │", header),
            format!("├─{}─┤", rule),
        ];
        for row in self.rows.iter().take(max_rows) {
            let line: String = row.iter().enumerate()
                .map(|(i, v)| pad(clip(v.literal()).as_str(), widths.get(i).copied().unwrap_or(10)))
                .collect::<Vec<_>>().join(" │ ");
            lines.push(format!("│ {} │", line));
        }
        lines.push(format!("└─{}─┘", rule));

        if self.rows.len() > max_rows {
            lines.push(format!("  … {} more rows", self.rows.len() - max_rows));
        }
        lines.push(format!("  {} row(s)", self.rows.len()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn parses_common_date_spellings() {
        assert_eq!(ts("2024-03-01").format("%Y-%m-%d").to_string(), "2024-03-01");
        assert_eq!(ts("01-03-2024").format("%Y-%m-%d").to_string(), "2024-03-01");
        assert_eq!(ts("2024-03-01 10:15:00").format("%H:%M").to_string(), "10:15");
        assert_eq!(ts("2024-03-01T10:15:00Z").format("%H:%M").to_string(), "10:15");
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn timestamps_serialize_as_iso() {
        let v = Value::Timestamp(ts("2024-03-01 10:15:00"));
        assert_eq!(v.to_json(), JsonValue::String("2024-03-01T10:15:00".into()));
    }

    #[test]
    fn records_preserve_column_order() {
        let rs = ResultSet::new(
            vec!["zeta".into(), "alpha".into()],
            vec![vec![Value::Integer(1), Value::Text("x".into())]],
        );
        let records = rs.to_records();
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn column_kind_detection() {
        let nums = [Value::Integer(1), Value::Null, Value::Real(2.5)];
        assert_eq!(ColumnKind::detect("po_amount", nums.iter()), ColumnKind::Numeric);
        assert_eq!(ColumnKind::detect("created_date", nums.iter()), ColumnKind::Temporal);

        let mixed = [Value::Integer(1), Value::Text("a".into())];
        assert_eq!(ColumnKind::detect("ref", mixed.iter()), ColumnKind::Text);

        let nulls = [Value::Null, Value::Null];
        assert_eq!(ColumnKind::detect("remarks", nulls.iter()), ColumnKind::Text);
    }

    #[test]
    fn literal_keeps_float_marker() {
        assert_eq!(Value::Real(3.0).literal(), "3.0");
        assert_eq!(Value::Real(3.25).literal(), "3.25");
        assert_eq!(Value::Real(f64::NAN).literal(), "null");
        assert!(Value::Real(f64::NAN).is_null());
    }

    #[test]
    fn markdown_preview_respects_limit() {
        let rows = (0..5).map(|i| vec![Value::Integer(i)]).collect();
        let rs = ResultSet::new(vec!["n".into()], rows);
        let md = rs.to_markdown(2);
        assert_eq!(md, "| n |\n|---|\n| 0 |\n| 1 |");
    }

    #[test]
    fn box_table_reports_overflow() {
        let rows = (0..3).map(|i| vec![Value::Integer(i)]).collect();
        let rs = ResultSet::new(vec!["n".into()], rows);
        let table = rs.render_table(2);
        assert!(table.contains("… 1 more rows"));
        assert!(table.ends_with("3 row(s)"));
        assert_eq!(ResultSet::default().render_table(10), "(no results)");
    }
}
