//! Collection schema definitions.
//!
//! A schema names the columns of a collection and splits them into key
//! columns (identity) followed by value columns. A column whose declared
//! name starts with `@` is the destination address of a channel.

use crate::error::{Error, Result};
use crate::tuple::Tuple;
use crate::value::Value;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Column layout of a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    /// Collection name.
    name: String,
    /// Column names, keys first.
    columns: Vec<String>,
    /// Number of leading key columns.
    key_count: usize,
    /// Position of the `@` address column, if any.
    address: Option<usize>,
}

impl Schema {
    /// Creates a schema from key and value column names.
    ///
    /// A schema without value columns treats every column as part of the key.
    pub fn new(name: impl Into<String>, keys: &[&str], values: &[&str]) -> Result<Self> {
        let mut builder = SchemaBuilder::new(name)?;
        for k in keys {
            builder = builder.add_key(k)?;
        }
        for v in values {
            builder = builder.add_value(v)?;
        }
        builder.build()
    }

    /// Returns the collection name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column names.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    #[inline]
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Returns the positions of the key columns.
    pub fn key_columns(&self) -> Vec<usize> {
        (0..self.key_count).collect()
    }

    /// Returns the number of key columns.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Returns the address column position, if any.
    #[inline]
    pub fn address(&self) -> Option<usize> {
        self.address
    }

    /// Gets a column index by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Gets a column index by name, failing with `ColumnNotFound`.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    /// Extracts the key of a tuple laid out by this schema.
    pub fn key_of(&self, tuple: &Tuple) -> Vec<Value> {
        tuple.values().iter().take(self.key_count).cloned().collect()
    }

    /// Returns the schema with the address column removed, as stored by a channel.
    pub fn without_address(&self) -> Schema {
        match self.address {
            None => self.clone(),
            Some(pos) => {
                let columns: Vec<String> = self
                    .columns
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != pos)
                    .map(|(_, c)| c.clone())
                    .collect();
                let key_count = if pos < self.key_count {
                    self.key_count - 1
                } else {
                    self.key_count
                };
                let key_count = if key_count == 0 { columns.len() } else { key_count };
                Schema {
                    name: self.name.clone(),
                    columns,
                    key_count,
                    address: None,
                }
            }
        }
    }

    /// Returns a copy of this schema under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Schema {
        Schema {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Builder for creating schemas.
pub struct SchemaBuilder {
    name: String,
    keys: Vec<String>,
    values: Vec<String>,
    address: Option<String>,
}

impl SchemaBuilder {
    /// Creates a new schema builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            keys: Vec::new(),
            values: Vec::new(),
            address: None,
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let first = match name.chars().next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    fn accept_column(&mut self, name: &str) -> Result<String> {
        let (stripped, is_address) = match name.strip_prefix('@') {
            Some(rest) => (rest, true),
            None => (name, false),
        };
        Self::check_naming_rules(stripped)?;
        if self.keys.iter().chain(self.values.iter()).any(|c| c == stripped) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                stripped
            )));
        }
        if is_address {
            if self.address.is_some() {
                return Err(Error::invalid_schema(format!(
                    "Multiple address columns in {}",
                    self.name
                )));
            }
            self.address = Some(stripped.to_string());
        }
        Ok(stripped.to_string())
    }

    /// Adds a key column.
    pub fn add_key(mut self, name: &str) -> Result<Self> {
        let col = self.accept_column(name)?;
        self.keys.push(col);
        Ok(self)
    }

    /// Adds a value column.
    pub fn add_value(mut self, name: &str) -> Result<Self> {
        let col = self.accept_column(name)?;
        self.values.push(col);
        Ok(self)
    }

    /// Builds the schema.
    pub fn build(self) -> Result<Schema> {
        let key_count = self.keys.len();
        let mut columns = self.keys;
        columns.extend(self.values);
        let address = match &self.address {
            Some(a) => columns.iter().position(|c| c == a),
            None => None,
        };
        // all-value schemas key on everything
        let key_count = if key_count == 0 { columns.len() } else { key_count };
        Ok(Schema {
            name: self.name,
            columns,
            key_count,
            address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_keys_and_values() {
        let s = Schema::new("link", &["from", "to"], &["cost"]).unwrap();
        assert_eq!(s.arity(), 3);
        assert_eq!(s.key_columns(), alloc::vec![0, 1]);
        assert_eq!(s.column_index("cost"), Some(2));
        assert!(s.require_column("nope").is_err());
    }

    #[test]
    fn test_schema_all_key() {
        let s = Schema::new("path", &["from", "to", "nxt", "cost"], &[]).unwrap();
        assert_eq!(s.key_count(), 4);
    }

    #[test]
    fn test_schema_address_column() {
        let s = Schema::new("chn", &["@addr", "k"], &["v"]).unwrap();
        assert_eq!(s.address(), Some(0));
        assert_eq!(s.columns()[0], "addr");
        let stored = s.without_address();
        assert_eq!(stored.columns(), &["k".to_string(), "v".to_string()]);
        assert_eq!(stored.key_count(), 1);
        assert_eq!(stored.address(), None);
    }

    #[test]
    fn test_schema_rejects_bad_names() {
        assert!(Schema::new("1bad", &["a"], &[]).is_err());
        assert!(Schema::new("t", &["a", "a"], &[]).is_err());
        assert!(Schema::new("t", &["a-b"], &[]).is_err());
    }

    #[test]
    fn test_key_of() {
        let s = Schema::new("t", &["id", "name"], &["amount"]).unwrap();
        let t = crate::tuple![1, "x", 10];
        assert_eq!(s.key_of(&t), alloc::vec![Value::Int64(1), Value::from("x")]);
    }
}
