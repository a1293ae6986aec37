//! `.build.info` parser
//!
//! A pipe-delimited table with a typed header line:
//!
//! ```text
//! Branch!STRING:0|Active!DEC:1|Build Key!HEX:16
//! eu|1|da20cf2b7e65e2f2352397b6295e10c0
//! ```
//!
//! Every column is `Name!TYPE:LENGTH` with `TYPE` one of `STRING`, `DEC`
//! or `HEX`. Values are kept as strings; the type annotations describe the
//! producer's intent, not a conversion this parser performs.

use crate::{Error, Result};

/// Column value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Dec,
    Hex,
}

impl FieldKind {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "STRING" => Ok(Self::String),
            "DEC" => Ok(Self::Dec),
            "HEX" => Ok(Self::Hex),
            other => Err(Error::ConfigSyntax(format!("unknown field type {other:?}"))),
        }
    }
}

/// One typed column of the header line.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub length: usize,
}

/// A parsed `.build.info` document.
#[derive(Debug)]
pub struct BuildInfo {
    fields: Vec<Field>,
    rows: Vec<Vec<String>>,
}

/// One row, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    info: &'a BuildInfo,
    index: usize,
}

impl BuildInfo {
    /// Parse a complete document.
    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines();

        let header = lines
            .next()
            .ok_or_else(|| Error::ConfigSyntax("empty build info".to_string()))?;

        let fields = header
            .split('|')
            .map(Self::parse_field)
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::new();
        for line in lines {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let values: Vec<String> = line.split('|').map(str::to_string).collect();
            if values.len() != fields.len() {
                return Err(Error::ConfigSyntax(format!(
                    "row has {} values for {} columns",
                    values.len(),
                    fields.len()
                )));
            }
            rows.push(values);
        }

        Ok(Self { fields, rows })
    }

    fn parse_field(column: &str) -> Result<Field> {
        let (name, type_spec) = column
            .split_once('!')
            .ok_or_else(|| Error::ConfigSyntax(format!("column {column:?} lacks a type")))?;

        let (kind, length) = type_spec
            .split_once(':')
            .ok_or_else(|| Error::ConfigSyntax(format!("column {column:?} lacks a length")))?;

        Ok(Field {
            name: name.trim().to_string(),
            kind: FieldKind::parse(kind)?,
            length: length
                .trim()
                .parse()
                .map_err(|_| Error::ConfigSyntax(format!("bad length in column {column:?}")))?,
        })
    }

    /// The typed columns, in file order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Row by index.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows.len()).then_some(Row { info: self, index })
    }

    /// The row marked `Active`, falling back to the first row.
    pub fn active_row(&self) -> Option<Row<'_>> {
        let active = (0..self.rows.len())
            .find(|&i| self.value(i, "Active") == Some("1"))
            .unwrap_or(0);
        self.row(active)
    }

    fn value(&self, row: usize, field: &str) -> Option<&str> {
        let column = self.fields.iter().position(|f| f.name == field)?;
        self.rows.get(row)?.get(column).map(String::as_str)
    }
}

impl<'a> Row<'a> {
    /// Value of the named column.
    pub fn get(&self, field: &str) -> Option<&'a str> {
        self.info.value(self.index, field)
    }

    /// Value of the named column, as an error if absent or empty.
    pub fn require(&self, field: &str) -> Result<&'a str> {
        match self.get(field) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(Error::ConfigTypeMismatch(field.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Branch!STRING:0|Active!DEC:1|Build Key!HEX:16|CDN Key!HEX:16|Version!STRING:0
eu|1|da20cf2b7e65e2f2352397b6295e10c0|ca5f15e0f8e6becbb4d86f441aba3d19|6.1.0.19678
";

    #[test]
    fn parses_header_and_rows() {
        let info = BuildInfo::parse(SAMPLE).unwrap();

        assert_eq!(info.fields().len(), 5);
        assert_eq!(info.fields()[0].name, "Branch");
        assert_eq!(info.fields()[1].kind, FieldKind::Dec);
        assert_eq!(info.fields()[2].kind, FieldKind::Hex);
        assert_eq!(info.fields()[2].length, 16);

        let row = info.row(0).unwrap();
        assert_eq!(row.get("Branch"), Some("eu"));
        assert_eq!(row.get("Active"), Some("1"));
        assert_eq!(
            row.get("Build Key"),
            Some("da20cf2b7e65e2f2352397b6295e10c0")
        );
    }

    #[test]
    fn active_row_prefers_marked_row() {
        let content = "\
Branch!STRING:0|Active!DEC:1|Build Key!HEX:16
us|0|aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
eu|1|bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb
";
        let info = BuildInfo::parse(content).unwrap();
        let row = info.active_row().unwrap();
        assert_eq!(row.get("Branch"), Some("eu"));
    }

    #[test]
    fn active_row_falls_back_to_first() {
        let content = "\
Branch!STRING:0|Build Key!HEX:16
us|aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
";
        let info = BuildInfo::parse(content).unwrap();
        assert_eq!(info.active_row().unwrap().get("Branch"), Some("us"));
    }

    #[test]
    fn rejects_untyped_header() {
        assert!(BuildInfo::parse("Branch|Active\nus|1\n").is_err());
    }

    #[test]
    fn rejects_short_rows() {
        let content = "Branch!STRING:0|Active!DEC:1\nus\n";
        assert!(BuildInfo::parse(content).is_err());
    }

    #[test]
    fn require_rejects_empty_values() {
        let content = "Branch!STRING:0|Tags!STRING:0\nus|\n";
        let info = BuildInfo::parse(content).unwrap();
        let row = info.row(0).unwrap();
        assert_eq!(row.get("Tags"), Some(""));
        assert!(row.require("Tags").is_err());
    }
}
