//! MCP rename tables: `fields.csv`, `methods.csv` and `packages.csv`.
//!
//! Only the key and value columns are read; they are located by header name, so extra
//! columns (`side`, `desc`) are ignored. Quoted fields may contain commas and line breaks.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;

/// `searge` to `name` from a member table.
pub fn read_member_names(content: &str) -> Result<HashMap<String, String>> {
    read_columns(content, "searge", "name")
}

/// Simple class name to package from `packages.csv`.
pub fn read_packages(content: &str) -> Result<HashMap<String, String>> {
    read_columns(content, "class", "package")
}

fn read_columns(content: &str, key: &str, value: &str) -> Result<HashMap<String, String>> {
    let mut records = split_records(content).into_iter();
    let (_, header) = records.next().context("empty CSV file")?;
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("CSV header has no '{name}' column"))
    };
    let key_column = column(key)?;
    let value_column = column(value)?;

    let mut table = HashMap::new();
    for (line, record) in records {
        let (Some(k), Some(v)) = (record.get(key_column), record.get(value_column)) else {
            bail!("CSV record on line {line} has too few columns: {}", record.join(","));
        };
        table.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok(table)
}

/// Records with the line each starts on. Quoted fields may span lines; blank lines are skipped.
fn split_records(content: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut line = 1;
    let mut start = 1;
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            '\r' if !quoted && chars.peek() == Some(&'\n') => {}
            '\n' if !quoted => {
                fields.push(std::mem::take(&mut current));
                push_record(&mut records, start, std::mem::take(&mut fields));
                line += 1;
                start = line;
            }
            '\n' => {
                current.push(c);
                line += 1;
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    push_record(&mut records, start, fields);
    records
}

fn push_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    if !(fields.len() == 1 && fields[0].trim().is_empty()) {
        records.push((line, fields));
    }
}
