//! Deterministic digest of a result set, stored as the next turn's context.
//!
//! No model call is involved: the same `ResultSet` always renders to the
//! same text. Rows are grouped per purchase order when an identifier column
//! is present, otherwise listed individually; either way at most
//! [`MAX_ENTITIES`] entries are rendered.

use std::collections::HashSet;

use crate::result_set::{parse_timestamp, ColumnKind, ResultSet, Value};

pub const MAX_ENTITIES: usize = 50;

/// Identifier columns, in order of preference.
pub const ID_COLUMNS: &[&str] = &["po_id", "purchase_order_id"];

pub fn generate_context_summary(rs: &ResultSet) -> String {
    if rs.is_empty() {
        return String::new();
    }

    let kinds = rs.column_kinds();
    let labels: Vec<String> = rs.columns.iter().map(|c| column_label(c)).collect();
    let mut parts = vec![format!("Total records: {}", rs.len())];

    match identifier_column(rs) {
        Some(id_idx) => {
            for row in first_row_per_id(rs, id_idx) {
                let mut block = vec![format!("For Purchase Order ID: {}", row[id_idx].literal())];
                block.extend(
                    row.iter()
                        .zip(kinds.iter().zip(labels.iter()))
                        .map(|(v, (kind, label))| format!("  {}: {}", label, format_cell(v, *kind))),
                );
                parts.push(block.join("\n"));
            }
        }
        None => {
            for (i, row) in rs.rows.iter().take(MAX_ENTITIES).enumerate() {
                let cells: Vec<String> = row.iter()
                    .zip(kinds.iter().zip(labels.iter()))
                    .map(|(v, (kind, label))| format!("{}: {}", label, format_cell(v, *kind)))
                    .collect();
                parts.push(format!("Row {}: {}", i + 1, cells.join(", ")));
            }
            if rs.len() > MAX_ENTITIES {
                parts.push(format!("... (showing first {} of {} rows)", MAX_ENTITIES, rs.len()));
            }
        }
    }

    parts.join("\n")
}

/// Digest used when no result digest exists (empty result or failed turn).
pub fn fallback_summary(question: &str, rs: Option<&ResultSet>, narrative: Option<&str>) -> String {
    let po_ids: Vec<String> = rs
        .and_then(|rs| rs.column_index("po_id").map(|idx| (rs, idx)))
        .map(|(rs, idx)| rs.column_values(idx).map(Value::literal).collect())
        .unwrap_or_default();
    let po_ids = if po_ids.is_empty() { "None".to_string() } else { po_ids.join(", ") };

    format!(
        "Query: {}\nPO IDs: {}\nResult: {}",
        question,
        po_ids,
        narrative.unwrap_or("No result")
    )
}

pub fn identifier_column(rs: &ResultSet) -> Option<usize> {
    ID_COLUMNS.iter().find_map(|name| rs.column_index(name))
}

/// `po_price_total` → `Po Price Total`.
pub fn column_label(column: &str) -> String {
    let spaced = column.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut prev_alpha = false;
    for c in spaced.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Two decimals with `,` thousands separators: `1234567.5` → `1,234,567.50`.
pub fn format_number(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*d);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, frac_part)
}

fn format_cell(value: &Value, kind: ColumnKind) -> String {
    if value.is_null() {
        return "null".to_string();
    }
    match kind {
        ColumnKind::Temporal => match value {
            Value::Timestamp(ts) => ts.format("%Y-%m-%d").to_string(),
            Value::Text(s) => parse_timestamp(s)
                .map(|ts| ts.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| s.clone()),
            other => other.literal(),
        },
        ColumnKind::Numeric => value.as_f64().map(format_number).unwrap_or_else(|| value.literal()),
        ColumnKind::Text => value.literal(),
    }
}

/// First row of each distinct identifier, in row order, capped at
/// [`MAX_ENTITIES`] identifiers. Null identifiers share one group.
fn first_row_per_id(rs: &ResultSet, id_idx: usize) -> Vec<&Vec<Value>> {
    let mut seen = HashSet::new();
    let mut picked = Vec::new();
    for row in &rs.rows {
        if picked.len() == MAX_ENTITIES {
            break;
        }
        let key = row.get(id_idx).map(Value::literal).unwrap_or_default();
        if seen.insert(key) {
            picked.push(row);
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn orders() -> ResultSet {
        ResultSet::new(
            vec!["po_id".into(), "po_amount".into(), "created_date".into(), "buyer_name".into()],
            vec![
                vec![text("PO-1"), Value::Real(150000.5), text("2024-03-01"), text("Asha")],
                vec![text("PO-2"), Value::Integer(250000), text("05-04-2024"), Value::Null],
                vec![text("PO-3"), Value::Null, Value::Null, text("Ravi")],
            ],
        )
    }

    #[test]
    fn empty_result_gives_empty_digest() {
        assert_eq!(generate_context_summary(&ResultSet::default()), "");
    }

    #[test]
    fn groups_by_purchase_order() {
        let digest = generate_context_summary(&orders());
        assert_eq!(digest.matches("For Purchase Order ID:").count(), 3);
        assert_eq!(
            digest,
            "Total records: 3\n\
             For Purchase Order ID: PO-1\n  Po Id: PO-1\n  Po Amount: 150,000.50\n  Created Date: 2024-03-01\n  Buyer Name: Asha\n\
             For Purchase Order ID: PO-2\n  Po Id: PO-2\n  Po Amount: 250,000.00\n  Created Date: 2024-04-05\n  Buyer Name: null\n\
             For Purchase Order ID: PO-3\n  Po Id: PO-3\n  Po Amount: null\n  Created Date: null\n  Buyer Name: Ravi"
        );
    }

    #[test]
    fn duplicate_ids_keep_first_row() {
        let rs = ResultSet::new(
            vec!["purchase_order_id".into(), "item_id".into()],
            vec![
                vec![text("A"), Value::Integer(1)],
                vec![text("A"), Value::Integer(2)],
                vec![text("B"), Value::Integer(3)],
            ],
        );
        let digest = generate_context_summary(&rs);
        assert_eq!(digest.matches("For Purchase Order ID:").count(), 2);
        assert!(digest.contains("  Item Id: 1.00"));
        assert!(!digest.contains("  Item Id: 2.00"));
    }

    #[test]
    fn po_id_preferred_over_purchase_order_id() {
        let rs = ResultSet::new(
            vec!["purchase_order_id".into(), "po_id".into()],
            vec![vec![text("X"), text("Y")]],
        );
        assert!(generate_context_summary(&rs).contains("For Purchase Order ID: Y"));
    }

    #[test]
    fn identifier_groups_capped() {
        let rows = (0..60).map(|i| vec![Value::Integer(i)]).collect();
        let rs = ResultSet::new(vec!["po_id".into()], rows);
        let digest = generate_context_summary(&rs);
        assert!(digest.starts_with("Total records: 60\n"));
        assert_eq!(digest.matches("For Purchase Order ID:").count(), MAX_ENTITIES);
    }

    #[test]
    fn rows_listed_without_identifier() {
        let rows = (0..52).map(|i| vec![text("Acme"), Value::Integer(i * 1000)]).collect();
        let rs = ResultSet::new(vec!["vendor_name".into(), "total_value".into()], rows);
        let digest = generate_context_summary(&rs);
        assert!(digest.contains("Row 1: Vendor Name: Acme, Total Value: 0.00"));
        assert!(digest.contains("Row 50: Vendor Name: Acme, Total Value: 49,000.00"));
        assert!(!digest.contains("Row 51:"));
        assert!(digest.ends_with("... (showing first 50 of 52 rows)"));
    }

    #[test]
    fn digest_is_deterministic() {
        let rs = orders();
        assert_eq!(generate_context_summary(&rs), generate_context_summary(&rs));
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(column_label("po_price_total"), "Po Price Total");
        assert_eq!(column_label("BUYER_NAME"), "Buyer Name");
        assert_eq!(column_label("gst2rate"), "Gst2Rate");
    }

    #[test]
    fn numbers_grouped_in_thousands() {
        assert_eq!(format_number(0.0), "0.00");
        assert_eq!(format_number(999.999), "1,000.00");
        assert_eq!(format_number(1234567.5), "1,234,567.50");
        assert_eq!(format_number(-98765.432), "-98,765.43");
        assert_eq!(format_number(-0.001), "0.00");
    }

    #[test]
    fn unparseable_dates_fall_back_to_literal() {
        let rs = ResultSet::new(vec!["delivery_date".into()], vec![vec![text("TBD")]]);
        assert_eq!(generate_context_summary(&rs), "Total records: 1\nRow 1: Delivery Date: TBD");
    }

    #[test]
    fn fallback_lists_po_ids_when_available() {
        let rs = orders();
        assert_eq!(
            fallback_summary("show orders", Some(&rs), Some("- 3 orders")),
            "Query: show orders\nPO IDs: PO-1, PO-2, PO-3\nResult: - 3 orders"
        );
        assert_eq!(
            fallback_summary("show orders", None, None),
            "Query: show orders\nPO IDs: None\nResult: No result"
        );
    }
}
