//! Output formatting for query results.
//!
//! Every rendering walks the rows once through `records`, so the three
//! formats always agree on column order, nulls and truncation markers.

use crate::models::ResultSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON array of row objects
    Json,
    /// One JSON object per line (default)
    #[default]
    #[serde(rename = "jsonl", alias = "jsonlines")]
    JsonLines,
    /// Markdown table
    #[serde(alias = "md")]
    Markdown,
}

/// Render a result set in the requested format.
pub fn render(result: &ResultSet, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => JsonValue::Array(
            records(result).map(JsonValue::Object).collect(),
        )
        .to_string(),
        OutputFormat::JsonLines => records(result)
            .map(|record| JsonValue::Object(record).to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Markdown => render_markdown(result),
    }
}

/// Row objects keyed by column name, in column order.
fn records(result: &ResultSet) -> impl Iterator<Item = Map<String, JsonValue>> + '_ {
    result.rows.iter().map(|row| {
        result
            .columns
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .collect()
    })
}

/// Markdown cell text for SQL NULL.
pub const NULL_CELL: &str = "NULL";

/// Text of a single markdown cell.
///
/// Backslashes in strings are doubled and a string equal to `NULL` is written
/// `\NULL`, so no string value renders the same as SQL NULL.
pub fn format_value(value: &JsonValue) -> String {
    let text = match value {
        JsonValue::Null => NULL_CELL.to_string(),
        JsonValue::String(s) if s == NULL_CELL => format!("\\{}", NULL_CELL),
        JsonValue::String(s) => s.replace('\\', "\\\\"),
        other => other.to_string(),
    };
    text.replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>")
}

fn render_markdown(result: &ResultSet) -> String {
    if result.columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let header: Vec<String> = result
        .columns
        .iter()
        .map(|c| format_value(&JsonValue::String(c.clone())))
        .collect();
    let cells: Vec<Vec<String>> = records(result)
        .map(|record| record.values().map(format_value).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.width().max(3)).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let mut output = String::new();
    output.push_str(&markdown_line(&header, &widths));
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&markdown_line(&separator, &widths));
    for row in &cells {
        output.push_str(&markdown_line(row, &widths));
    }
    output.truncate(output.trim_end().len());
    output
}

fn markdown_line(cells: &[String], widths: &[usize]) -> String {
    let mut line: String = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| {
            // Pad by display width; format! pads by char count
            let padding = w.saturating_sub(cell.width());
            format!("| {}{} ", cell, " ".repeat(padding))
        })
        .collect();
    line.push_str("|\n");
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ResultSet {
        ResultSet::new(
            vec!["id".into(), "name".into(), "note".into()],
            vec![
                vec![json!(1), json!("Ada"), JsonValue::Null],
                vec![json!(2), json!("a|b\nc"), json!("ok")],
            ],
        )
    }

    #[test]
    fn test_format_deserializes_from_names() {
        let f: OutputFormat = serde_json::from_str("\"jsonl\"").unwrap();
        assert_eq!(f, OutputFormat::JsonLines);
        let f: OutputFormat = serde_json::from_str("\"markdown\"").unwrap();
        assert_eq!(f, OutputFormat::Markdown);
        assert_eq!(OutputFormat::default(), OutputFormat::JsonLines);
    }

    #[test]
    fn test_json_keeps_column_order_and_nulls() {
        let out = render(&sample(), OutputFormat::Json);
        assert!(out.starts_with(r#"[{"id":1,"name":"Ada","note":null}"#));
    }

    #[test]
    fn test_jsonl_lines_match_json_array() {
        let result = sample();
        let array: Vec<JsonValue> =
            serde_json::from_str(&render(&result, OutputFormat::Json)).unwrap();
        let lines: Vec<JsonValue> = render(&result, OutputFormat::JsonLines)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(array, lines);
    }

    #[test]
    fn test_markdown_escapes_and_pads() {
        let out = render(&sample(), OutputFormat::Markdown);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "| id  | name      | note |");
        assert_eq!(lines[1], "| --- | --------- | ---- |");
        assert_eq!(lines[2], "| 1   | Ada       | NULL |");
        assert_eq!(lines[3], "| 2   | a\\|b<br>c | ok   |");
    }

    #[test]
    fn test_markdown_null_differs_from_null_text() {
        let result = ResultSet::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![JsonValue::Null, json!("NULL"), json!("\\NULL")]],
        );
        let out = render(&result, OutputFormat::Markdown);
        let row = out.lines().nth(2).unwrap();
        assert_eq!(row, "| NULL | \\NULL | \\\\NULL |");
    }

    #[test]
    fn test_markdown_pads_wide_characters_by_display_width() {
        let result = ResultSet::new(vec!["w".into()], vec![vec![json!("日本")], vec![json!("x")]]);
        let out = render(&result, OutputFormat::Markdown);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[2], "| 日本 |");
        assert_eq!(lines[3], "| x    |");
    }

    #[test]
    fn test_empty_results() {
        let empty = ResultSet::default();
        assert_eq!(render(&empty, OutputFormat::Json), "[]");
        assert_eq!(render(&empty, OutputFormat::JsonLines), "");
        assert_eq!(render(&empty, OutputFormat::Markdown), "*Empty set*");

        let header_only = ResultSet::new(vec!["x".into()], Vec::new());
        assert_eq!(
            render(&header_only, OutputFormat::Markdown),
            "| x   |\n| --- |"
        );
    }
}
