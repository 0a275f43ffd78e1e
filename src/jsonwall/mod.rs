// src/jsonwall/mod.rs

//! Append-only sorted JSON-lines store
//!
//! A jsonwall document is a UTF-8 text: one header line followed by JSON
//! records, one per line, sorted lexicographically by their serialized form.
//! Sorting makes the document diff-stable and allows record lookup by
//! serialized prefix, which is how readers iterate over one record kind.
//!
//! Header: `{"jsonwall":"1.0","schema":"<schema>","count":N}` where N counts
//! every line of the document including the header itself.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};

const VERSION: &str = "1.0";

#[derive(Serialize, Deserialize)]
struct Header {
    jsonwall: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

/// Options for creating a [`DbWriter`]
#[derive(Debug, Default, Clone)]
pub struct DbWriterOptions {
    /// Schema version recorded in the header, chosen by the application
    pub schema: String,
}

/// Accumulates records and emits the sorted document
pub struct DbWriter {
    schema: String,
    entries: Vec<String>,
}

impl DbWriter {
    pub fn new(options: DbWriterOptions) -> Self {
        Self {
            schema: options.schema,
            entries: Vec::new(),
        }
    }

    /// Buffer one record
    ///
    /// Records may be added in any order; they are sorted at emit time.
    pub fn add<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.entries.push(line);
        Ok(())
    }

    /// Sort, deduplicate, and write the document
    pub fn write_to<W: Write>(mut self, writer: &mut W) -> Result<()> {
        self.entries.sort();
        self.entries.dedup();

        let header = Header {
            jsonwall: VERSION.to_string(),
            schema: if self.schema.is_empty() {
                None
            } else {
                Some(self.schema.clone())
            },
            count: Some(self.entries.len() + 1),
        };
        let header = serde_json::to_string(&header)?;
        writeln!(writer, "{header}")?;
        for entry in &self.entries {
            writeln!(writer, "{entry}")?;
        }
        Ok(())
    }
}

/// A parsed jsonwall document supporting prefix lookup
pub struct Db {
    schema: String,
    lines: Vec<String>,
}

impl Db {
    /// Read and validate a document
    pub fn read<R: Read>(reader: R) -> Result<Db> {
        let mut lines = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            if !line.is_empty() {
                lines.push(line);
            }
        }
        if lines.is_empty() {
            return Err(Error::Jsonwall("invalid jsonwall header".to_string()));
        }
        let header: Header = serde_json::from_str(&lines[0])
            .map_err(|_| Error::Jsonwall("invalid jsonwall header".to_string()))?;
        if !header.jsonwall.starts_with("1.") {
            return Err(Error::Jsonwall(format!(
                "unsupported jsonwall version: {}",
                header.jsonwall
            )));
        }
        lines.remove(0);
        Ok(Db {
            schema: header.schema.unwrap_or_default(),
            lines,
        })
    }

    /// Schema version declared by the writer
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Decode every record whose serialized form starts with the query
    ///
    /// The query is a partial record, typically `{"kind": "..."}`. Its own
    /// serialization minus the closing brace is the search prefix; because
    /// lines are sorted the matching range is located by binary search.
    pub fn iterate<Q: Serialize, T: DeserializeOwned>(&self, query: &Q) -> Result<Vec<T>> {
        let mut prefix = serde_json::to_string(query)?;
        if prefix.ends_with('}') {
            prefix.pop();
        }
        let start = self.lines.partition_point(|l| l.as_str() < prefix.as_str());
        let mut records = Vec::new();
        for line in &self.lines[start..] {
            if !line.starts_with(&prefix) {
                break;
            }
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
    struct Record {
        kind: String,
        name: String,
    }

    fn record(kind: &str, name: &str) -> Record {
        Record {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_write_sorts_and_counts() {
        let mut writer = DbWriter::new(DbWriterOptions {
            schema: "1.0".to_string(),
        });
        writer.add(&record("b", "beta")).unwrap();
        writer.add(&record("a", "alpha")).unwrap();
        writer.add(&record("a", "alpha")).unwrap();

        let mut output = Vec::new();
        writer.write_to(&mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], r#"{"jsonwall":"1.0","schema":"1.0","count":3}"#);
        assert_eq!(lines[1], r#"{"kind":"a","name":"alpha"}"#);
        assert_eq!(lines[2], r#"{"kind":"b","name":"beta"}"#);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_read_round_trip() {
        let mut writer = DbWriter::new(DbWriterOptions {
            schema: "2.3".to_string(),
        });
        for name in ["one", "two", "three"] {
            writer.add(&record("slice", name)).unwrap();
        }
        writer.add(&record("package", "pkg")).unwrap();

        let mut output = Vec::new();
        writer.write_to(&mut output).unwrap();

        let db = Db::read(&output[..]).unwrap();
        assert_eq!(db.schema(), "2.3");

        let slices: Vec<Record> = db
            .iterate(&serde_json::json!({"kind": "slice"}))
            .unwrap();
        assert_eq!(
            slices,
            vec![record("slice", "one"), record("slice", "three"), record("slice", "two")]
        );

        let packages: Vec<Record> = db
            .iterate(&serde_json::json!({"kind": "package"}))
            .unwrap();
        assert_eq!(packages, vec![record("package", "pkg")]);

        let none: Vec<Record> = db.iterate(&serde_json::json!({"kind": "pkg"})).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_read_rejects_bad_header() {
        assert!(Db::read(&b""[..]).is_err());
        assert!(Db::read(&b"not json\n"[..]).is_err());
        assert!(Db::read(&br#"{"jsonwall":"2.0","count":1}"#[..]).is_err());
    }

    #[test]
    fn test_prefix_is_not_fooled_by_similar_kinds() {
        let input = concat!(
            "{\"jsonwall\":\"1.0\",\"count\":3}\n",
            "{\"kind\":\"path\",\"name\":\"a\"}\n",
            "{\"kind\":\"pathx\",\"name\":\"b\"}\n",
        );
        let db = Db::read(input.as_bytes()).unwrap();
        let paths: Vec<Record> = db.iterate(&serde_json::json!({"kind": "path"})).unwrap();
        assert_eq!(paths, vec![record("path", "a")]);
    }
}
