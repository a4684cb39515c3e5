//! Column type grammar and per-response schemas.
//!
//! Column types arrive as declaration strings in the schema header of a
//! streamed response (e.g. `ARRAY<MAP<STRING, STRUCT<A BIGINT>>>`). They are
//! parsed once per column into a [`ColumnType`] tree that drives row
//! decoding for the rest of that response.
//!
//! Separators inside compound declarations are only honored at bracket
//! depth zero: a struct field of type `MAP<STRING, INT>` contains a comma
//! that must not be treated as a field separator. Splitting therefore
//! tracks `<`/`>` and `(`/`)` depth while scanning.

use crate::error::KsqlError;
use std::collections::HashMap;
use std::sync::Arc;

/// Parsed representation of a column type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// `STRING` / `VARCHAR`
    String,
    /// `INTEGER` / `INT`
    Integer,
    /// `BIGINT`
    Bigint,
    /// `DOUBLE`
    Double,
    /// `DECIMAL` (precision/scale arguments are accepted and ignored)
    Decimal,
    /// `BOOLEAN`
    Boolean,
    /// `ARRAY<T>`
    Array(Box<ColumnType>),
    /// `MAP<K, V>` - keys are always decoded as strings, only the value
    /// type matters
    Map(Box<ColumnType>),
    /// `STRUCT<name TYPE, ...>` with fields in declaration order
    Struct(Vec<(String, ColumnType)>),
}

impl ColumnType {
    /// Parses a type declaration string.
    ///
    /// The leading keyword (up to the first `<` or `(`) selects the variant,
    /// case-insensitively. Anything unrecognized or malformed fails with
    /// [`KsqlError::UnsupportedType`] naming the offending fragment.
    pub fn parse(declaration: &str) -> Result<ColumnType, KsqlError> {
        let declaration = declaration.trim();
        let keyword = primary_keyword(declaration);

        match keyword.to_ascii_uppercase().as_str() {
            "STRING" | "VARCHAR" => Ok(ColumnType::String),
            "INTEGER" | "INT" => Ok(ColumnType::Integer),
            "BIGINT" => Ok(ColumnType::Bigint),
            "DOUBLE" => Ok(ColumnType::Double),
            "DECIMAL" => Ok(ColumnType::Decimal),
            "BOOLEAN" => Ok(ColumnType::Boolean),
            "ARRAY" => {
                let inner = angle_bracket_contents(declaration)?;
                Ok(ColumnType::Array(Box::new(ColumnType::parse(inner)?)))
            }
            "MAP" => {
                let inner = angle_bracket_contents(declaration)?;
                let mut parts = split_top_level(inner, ',');
                let value_decl = match (parts.next(), parts.next(), parts.next()) {
                    (Some(_key), Some(value), None) => value,
                    _ => return Err(unsupported(declaration)),
                };
                Ok(ColumnType::Map(Box::new(ColumnType::parse(value_decl)?)))
            }
            "STRUCT" => {
                let inner = angle_bracket_contents(declaration)?;
                let mut fields = Vec::new();
                for field_decl in split_top_level(inner, ',') {
                    let field_decl = field_decl.trim();
                    // Backtick-quoted field names may contain spaces.
                    let (name, type_decl) = if let Some(rest) = field_decl.strip_prefix('`') {
                        let close = rest.find('`').ok_or_else(|| unsupported(field_decl))?;
                        (&rest[..close], rest[close + 1..].trim_start())
                    } else {
                        let space = top_level_position(field_decl, ' ')
                            .ok_or_else(|| unsupported(field_decl))?;
                        (&field_decl[..space], field_decl[space + 1..].trim_start())
                    };
                    if name.is_empty() || type_decl.is_empty() {
                        return Err(unsupported(field_decl));
                    }
                    let field_type = ColumnType::parse(type_decl)?;
                    fields.push((name.to_string(), field_type));
                }
                if fields.is_empty() {
                    return Err(unsupported(declaration));
                }
                Ok(ColumnType::Struct(fields))
            }
            _ => Err(unsupported(declaration)),
        }
    }
}

fn unsupported(fragment: &str) -> KsqlError {
    KsqlError::UnsupportedType {
        fragment: fragment.trim().to_string(),
    }
}

/// The leading keyword: everything before the first `<` or `(`.
fn primary_keyword(declaration: &str) -> &str {
    declaration
        .find(['<', '('])
        .map_or(declaration, |i| &declaration[..i])
        .trim()
}

/// The text between the outermost matching angle brackets.
fn angle_bracket_contents(declaration: &str) -> Result<&str, KsqlError> {
    let open = declaration.find('<').ok_or_else(|| unsupported(declaration))?;
    let mut depth = 0usize;
    for (i, c) in declaration.char_indices().skip(open) {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    if declaration[i + 1..].trim().is_empty() {
                        return Ok(declaration[open + 1..i].trim());
                    }
                    // Trailing garbage after the closing bracket
                    return Err(unsupported(declaration));
                }
            }
            _ => {}
        }
    }
    Err(unsupported(declaration))
}

/// Index of the first `separator` occurring at bracket depth zero.
fn top_level_position(s: &str, separator: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits at every `separator` occurring at bracket depth zero.
fn split_top_level(s: &str, separator: char) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match top_level_position(rest, separator) {
            Some(i) => {
                let part = &rest[..i];
                rest = &rest[i + 1..];
                Some(part)
            }
            None => {
                let part = rest;
                rest = "";
                Some(part)
            }
        }
    })
}

/// A named column in a result schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// Ordered column schema of one streamed response.
///
/// Built once from the schema header and shared read-only (via `Arc`) with
/// every row of that response.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    columns: Vec<Column>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnSchema {
    /// Builds a schema from declaration-ordered `(name, type)` pairs.
    /// Duplicate names indicate a malformed header and fail.
    pub fn new(columns: Vec<Column>) -> Result<Self, KsqlError> {
        let mut name_to_index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            if name_to_index.insert(column.name.clone(), i).is_some() {
                return Err(KsqlError::protocol(format!(
                    "Duplicate column name in schema header: {}",
                    column.name
                )));
            }
        }
        Ok(ColumnSchema {
            columns,
            name_to_index,
        })
    }

    /// Builds a schema by parsing each declaration in `types`.
    pub fn from_names_and_types(
        names: &[String],
        types: &[String],
    ) -> Result<Arc<Self>, KsqlError> {
        if names.len() != types.len() {
            return Err(KsqlError::protocol(format!(
                "Schema header has {} column names but {} column types",
                names.len(),
                types.len()
            )));
        }
        let columns = names
            .iter()
            .zip(types)
            .map(|(name, decl)| {
                Ok(Column {
                    name: name.clone(),
                    column_type: ColumnType::parse(decl)?,
                })
            })
            .collect::<Result<Vec<_>, KsqlError>>()?;
        Ok(Arc::new(ColumnSchema::new(columns)?))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Zero-based position of `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }
}
