//! Query Result - rows as returned by the store, labelled with the store's column names

use crate::error::Result;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::io::Write;

/// Ordered rows from one executed statement.
///
/// Rows are kept positional; [`ResultSet::records`] zips each one against `columns`, so
/// every record carries exactly the store's labels in the store's order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<serde_json::Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as column → value maps
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows.iter().map(|row| self.record(row)).collect()
    }

    fn record(&self, row: &[serde_json::Value]) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect()
    }

    /// `{"result": [...]}`, the shape handed to the summarizer
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "result": self.records() })
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(&self.columns)
            .map_err(|e| crate::error::AskError::Io(e.into()))?;
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(render_cell).collect();
            csv_writer
                .write_record(&fields)
                .map_err(|e| crate::error::AskError::Io(e.into()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Plain aligned text table for terminals
    pub fn to_table(&self) -> String {
        if self.columns.is_empty() {
            return "(no rows)".to_string();
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(render_cell).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                cells
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let format_line = |values: &[String]| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{:<width$}", value, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut lines = vec![format_line(&self.columns[..])];
        lines.push(
            widths
                .iter()
                .map(|width| "-".repeat(*width))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        lines.extend(cells.iter().map(|row| format_line(&row[..])));
        lines.push(format!("({} rows)", self.rows.len()));
        lines.join("\n")
    }
}

fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A list of records on the wire, positional rows in memory
impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&self.record(row))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ResultSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let records = Vec::<serde_json::Map<String, serde_json::Value>>::deserialize(deserializer)?;
        let columns: Vec<String> = records
            .first()
            .map(|record| record.keys().cloned().collect())
            .unwrap_or_default();
        let rows = records
            .into_iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(serde_json::Value::Null))
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }
}
