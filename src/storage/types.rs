//! Column types, schemas and scalar values
//!
//! A [`Schema`] is an ordered list of named, typed columns. It is written into
//! the columnar file header and validated again on every scan.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};

/// Physical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// IEEE 754 double
    Float64,
    /// Signed 64-bit integer
    Int64,
    /// UTF-8 text
    Utf8,
}

impl ColumnType {
    /// On-disk tag for this type
    pub fn tag(&self) -> u8 {
        match self {
            ColumnType::Float64 => 1,
            ColumnType::Int64 => 2,
            ColumnType::Utf8 => 3,
        }
    }

    /// Decodes an on-disk tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ColumnType::Float64),
            2 => Some(ColumnType::Int64),
            3 => Some(ColumnType::Utf8),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Float64 => "float64",
            ColumnType::Int64 => "int64",
            ColumnType::Utf8 => "utf8",
        }
    }

    /// Returns true if values of this type coerce to f64
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Float64 | ColumnType::Int64)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered set of uniquely named columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnSchema>", into = "Vec<ColumnSchema>")]
pub struct Schema {
    columns: Vec<ColumnSchema>,
}

impl Schema {
    /// Creates a schema, rejecting empty and duplicate column names.
    pub fn new(columns: Vec<ColumnSchema>) -> StorageResult<Self> {
        for (i, column) in columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(StorageError::schema_mismatch(format!(
                    "Column {} has an empty name",
                    i
                )));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(StorageError::schema_mismatch(format!(
                    "Duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// The patient schema consumed by the cohort query.
    ///
    /// Age is stored as a float so fractional ages survive conversion.
    pub fn patient() -> Self {
        Self {
            columns: vec![
                ColumnSchema::new("BMI", ColumnType::Float64),
                ColumnSchema::new("Glucose", ColumnType::Float64),
                ColumnSchema::new("Age", ColumnType::Float64),
            ],
        }
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the position of a column by exact name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Resolves a column that must exist with one of the accepted types.
    pub fn require(&self, name: &str, accepted: &[ColumnType]) -> StorageResult<usize> {
        let index = self
            .index_of(name)
            .ok_or_else(|| StorageError::missing_column(name))?;
        let actual = self.columns[index].column_type;
        if !accepted.contains(&actual) {
            let expected: Vec<&str> = accepted.iter().map(|t| t.as_str()).collect();
            return Err(StorageError::schema_mismatch(format!(
                "Column '{}' has type {}, expected one of [{}]",
                name,
                actual,
                expected.join(", ")
            )));
        }
        Ok(index)
    }

    /// Returns the sub-schema for the given column names, in the given order.
    pub fn project(&self, names: &[String]) -> StorageResult<(Schema, Vec<usize>)> {
        let mut indices = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let index = self
                .index_of(name)
                .ok_or_else(|| StorageError::missing_column(name))?;
            indices.push(index);
            columns.push(self.columns[index].clone());
        }
        Ok((Schema::new(columns)?, indices))
    }
}

impl TryFrom<Vec<ColumnSchema>> for Schema {
    type Error = StorageError;

    fn try_from(columns: Vec<ColumnSchema>) -> Result<Self, Self::Error> {
        Schema::new(columns)
    }
}

impl From<Schema> for Vec<ColumnSchema> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

/// A single cell value, used for row-wise appends
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Float(f64),
    Int(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_roundtrip() {
        for ty in [ColumnType::Float64, ColumnType::Int64, ColumnType::Utf8] {
            assert_eq!(ColumnType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ColumnType::from_tag(0), None);
        assert_eq!(ColumnType::from_tag(9), None);
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = Schema::new(vec![
            ColumnSchema::new("BMI", ColumnType::Float64),
            ColumnSchema::new("BMI", ColumnType::Int64),
        ]);
        assert!(result.unwrap_err().is_schema_mismatch());
    }

    #[test]
    fn test_require_accepts_listed_types() {
        let schema = Schema::patient();
        assert_eq!(
            schema
                .require("Age", &[ColumnType::Int64, ColumnType::Float64])
                .unwrap(),
            2
        );
    }

    #[test]
    fn test_require_rejects_wrong_type() {
        let schema = Schema::new(vec![ColumnSchema::new("BMI", ColumnType::Utf8)]).unwrap();
        let err = schema.require("BMI", &[ColumnType::Float64]).unwrap_err();
        assert!(err.is_schema_mismatch());
        assert!(err.message().contains("utf8"));
    }

    #[test]
    fn test_require_missing_column() {
        let err = Schema::patient()
            .require("Insulin", &[ColumnType::Float64])
            .unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_project_preserves_requested_order() {
        let schema = Schema::patient();
        let (projected, indices) = schema
            .project(&["Age".to_string(), "BMI".to_string()])
            .unwrap();
        assert_eq!(indices, vec![2, 0]);
        assert_eq!(projected.columns()[0].name, "Age");
    }

    #[test]
    fn test_schema_serde_validates() {
        let json = r#"[{"name":"BMI","type":"float64"},{"name":"BMI","type":"int64"}]"#;
        assert!(serde_json::from_str::<Schema>(json).is_err());

        let json = r#"[{"name":"BMI","type":"float64"}]"#;
        let schema: Schema = serde_json::from_str(json).unwrap();
        assert_eq!(schema.len(), 1);
    }
}
