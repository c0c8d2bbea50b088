use serde_json::Value;

/// CSV assembly for `export`. Text cells are always quoted with inner
/// quotes doubled, so commas and newlines inside notes survive;
/// numeric and boolean cells stay bare and null cells stay empty.
pub fn to_csv(headers: &[String], rows: &[Vec<Value>]) -> String {
    let mut out = String::new();
    out.push_str(&headers.join(","));
    out.push('\n');

    for row in rows {
        let line: Vec<String> = row.iter().map(csv_cell).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }

    out
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => quote(text),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => quote(&other.to_string()),
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Suggested download name, stamped with the export date.
pub fn export_filename(today: chrono::NaiveDate) -> String {
    format!("my_tasks_{}.csv", today.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{Value, json};

    use super::{export_filename, to_csv};

    #[test]
    fn strings_are_quoted_and_numbers_bare() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec![json!("x,y"), json!(1)]];
        assert_eq!(to_csv(&headers, &rows), "a,b\n\"x,y\",1\n");
    }

    #[test]
    fn inner_quotes_are_doubled() {
        let headers = vec!["note".to_string()];
        let rows = vec![vec![json!(r#"say "hi""#)]];
        assert_eq!(to_csv(&headers, &rows), "note\n\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn nulls_render_empty() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec![Value::Null, json!("x")]];
        assert_eq!(to_csv(&headers, &rows), "a,b\n,\"x\"\n");
    }

    #[test]
    fn filename_carries_export_date() {
        let today = NaiveDate::from_ymd_opt(2025, 7, 22).unwrap();
        assert_eq!(export_filename(today), "my_tasks_2025-07-22.csv");
    }
}
