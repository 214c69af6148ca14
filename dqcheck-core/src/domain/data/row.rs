// dqcheck-core/src/domain/data/row.rs

use std::sync::Arc;

use super::value::Value;

/// One record of a tabular source. Column names are shared across a batch.
#[derive(Debug, Clone)]
pub struct Row {
    index: u64,
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(index: u64, columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self {
            index,
            columns,
            values,
        }
    }

    /// 0-based position of the record in the source.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Spreadsheet-style row number: header is row 1, first record is row 2.
    pub fn display_number(&self) -> u64 {
        self.index + 2
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        resolve_column(&self.columns, column).and_then(|i| self.values.get(i))
    }

    /// Missing columns read as NULL.
    pub fn value(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.get(column).unwrap_or(&NULL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Exact match first, then case-insensitive.
pub fn resolve_column(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c == name).or_else(|| {
        columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let columns: Arc<[String]> = vec!["Email".to_string(), "score".to_string()].into();
        Row::new(3, columns, vec![Value::from("a@b.com"), Value::Int(7)])
    }

    #[test]
    fn test_lookup_is_case_insensitive_fallback() {
        let r = row();
        assert_eq!(r.get("Email"), Some(&Value::from("a@b.com")));
        assert_eq!(r.get("email"), Some(&Value::from("a@b.com")));
        assert_eq!(r.get("missing"), None);
        assert!(r.value("missing").is_null());
    }

    #[test]
    fn test_display_number_counts_header() {
        assert_eq!(row().display_number(), 5);
    }
}
