//! Row filter expressions
//!
//! A filter expression is a comma-separated list of `key=value` clauses,
//! all of which must hold for a row to match. The key's suffix selects the
//! operator:
//!
//! | Key                 | Matches when                                   |
//! |---------------------|------------------------------------------------|
//! | `field`             | the cell equals the value                      |
//! | `field_contains`    | the cell contains the value, ignoring case     |
//! | `field_in`          | the cell equals one of the pipe-separated values |
//! | `field_after_date`  | the cell is a `YYYY-MM-DD` date on or after it |
//! | `field_before_date` | the cell is a `YYYY-MM-DD` date on or before it |
//!
//! An empty member of an `_in` set (`status_in=ACTIVE|`) matches empty
//! cells; a set with no non-empty member is rejected.
//!
//! Values may be double-quoted to include commas or surrounding whitespace;
//! inside quotes `\"` and `\\` are escapes.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{Result, SheetsError};
use crate::model::Row;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SUFFIX_AFTER_DATE: &str = "_after_date";
const SUFFIX_BEFORE_DATE: &str = "_before_date";
const SUFFIX_CONTAINS: &str = "_contains";
const SUFFIX_IN: &str = "_in";

/// One predicate over a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterClause {
    /// Exact string equality
    Equals { field: String, value: String },
    /// Case-insensitive substring match
    Contains { field: String, needle: String },
    /// Equality with any member of a set
    InSet { field: String, values: Vec<String> },
    /// Date on or after the bound
    DateAfter { field: String, date: NaiveDate },
    /// Date on or before the bound
    DateBefore { field: String, date: NaiveDate },
}

impl FilterClause {
    /// Column this clause inspects
    pub fn field(&self) -> &str {
        match self {
            FilterClause::Equals { field, .. }
            | FilterClause::Contains { field, .. }
            | FilterClause::InSet { field, .. }
            | FilterClause::DateAfter { field, .. }
            | FilterClause::DateBefore { field, .. } => field,
        }
    }

    /// Evaluate the clause against a row
    ///
    /// A row without the clause's column never matches.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(cell) = row.get(self.field()) else {
            return false;
        };

        match self {
            FilterClause::Equals { value, .. } => cell == value,
            FilterClause::Contains { needle, .. } => {
                cell.to_lowercase().contains(&needle.to_lowercase())
            }
            FilterClause::InSet { values, .. } => values.iter().any(|v| v == cell),
            FilterClause::DateAfter { date, .. } => {
                parse_cell_date(cell).is_some_and(|d| d >= *date)
            }
            FilterClause::DateBefore { date, .. } => {
                parse_cell_date(cell).is_some_and(|d| d <= *date)
            }
        }
    }

    fn from_pair(key: &str, value: &str) -> Result<Self> {
        if let Some(field) = key.strip_suffix(SUFFIX_AFTER_DATE) {
            Ok(FilterClause::DateAfter {
                field: operator_field(field, key)?,
                date: parse_bound_date(key, value)?,
            })
        } else if let Some(field) = key.strip_suffix(SUFFIX_BEFORE_DATE) {
            Ok(FilterClause::DateBefore {
                field: operator_field(field, key)?,
                date: parse_bound_date(key, value)?,
            })
        } else if let Some(field) = key.strip_suffix(SUFFIX_CONTAINS) {
            Ok(FilterClause::Contains {
                field: operator_field(field, key)?,
                needle: value.to_string(),
            })
        } else if let Some(field) = key.strip_suffix(SUFFIX_IN) {
            let values: Vec<String> = value
                .split('|')
                .map(|v| v.trim().to_string())
                .collect();
            if values.iter().all(String::is_empty) {
                return Err(SheetsError::Config(format!(
                    "Filter '{}' needs at least one value",
                    key
                )));
            }
            Ok(FilterClause::InSet {
                field: operator_field(field, key)?,
                values,
            })
        } else {
            Ok(FilterClause::Equals {
                field: key.to_string(),
                value: value.to_string(),
            })
        }
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterClause::Equals { field, value } => {
                write!(f, "{}={}", field, render_value(value))
            }
            FilterClause::Contains { field, needle } => {
                write!(f, "{}{}={}", field, SUFFIX_CONTAINS, render_value(needle))
            }
            FilterClause::InSet { field, values } => {
                write!(f, "{}{}={}", field, SUFFIX_IN, render_value(&values.join("|")))
            }
            FilterClause::DateAfter { field, date } => {
                write!(f, "{}{}={}", field, SUFFIX_AFTER_DATE, date.format(DATE_FORMAT))
            }
            FilterClause::DateBefore { field, date } => {
                write!(f, "{}{}={}", field, SUFFIX_BEFORE_DATE, date.format(DATE_FORMAT))
            }
        }
    }
}

/// Conjunction of filter clauses
///
/// # Examples
///
/// ```
/// use sheets_reader::filter::FilterExpression;
/// use sheets_reader::model::Row;
///
/// let filter = FilterExpression::parse("status_in=ACTIVE|PENDING").unwrap();
///
/// let mut row = Row::new();
/// row.insert("status".to_string(), "PENDING".to_string());
/// assert!(filter.matches(&row));
///
/// row.insert("status".to_string(), "DONE".to_string());
/// assert!(!filter.matches(&row));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpression {
    clauses: Vec<FilterClause>,
}

impl FilterExpression {
    /// Parse a filter expression
    ///
    /// Blank input yields an empty expression that matches every row.
    ///
    /// # Errors
    ///
    /// Returns `SheetsError::Config` for a clause without `=`, an empty key,
    /// an operator suffix without a field name, an unterminated quote, an
    /// empty `_in` set, or a malformed date bound.
    pub fn parse(input: &str) -> Result<Self> {
        let clauses = split_clauses(input)?
            .into_iter()
            .map(|(key, value)| FilterClause::from_pair(&key, &value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { clauses })
    }

    /// Build an expression from already-parsed clauses
    pub fn from_clauses(clauses: Vec<FilterClause>) -> Self {
        Self { clauses }
    }

    /// Clauses in the order they were given
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// True when the expression has no clauses
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// True when every clause holds for the row
    pub fn matches(&self, row: &Row) -> bool {
        self.clauses.iter().all(|clause| clause.matches(row))
    }

    /// Short description for logging
    pub fn summary(&self) -> String {
        if self.clauses.is_empty() {
            "No filters (all rows)".to_string()
        } else {
            let fields: Vec<&str> = self.clauses.iter().map(FilterClause::field).collect();
            format!("{} clause(s) on {}", self.clauses.len(), fields.join(", "))
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for FilterExpression {
    type Err = SheetsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn operator_field(field: &str, key: &str) -> Result<String> {
    if field.is_empty() {
        return Err(SheetsError::Config(format!(
            "Filter '{}' is missing a field name",
            key
        )));
    }
    Ok(field.to_string())
}

fn parse_bound_date(key: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        SheetsError::Config(format!(
            "Filter '{}' expects a YYYY-MM-DD date, got: {}",
            key, value
        ))
    })
}

fn parse_cell_date(cell: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(cell.trim(), DATE_FORMAT).ok()
}

/// Quote a value when it would not survive re-parsing bare
fn render_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.trim() != value
        || value.contains(|c: char| c == ',' || c == '"' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Key,
    ValueStart,
    Bare,
    Quoted,
    AfterQuote,
}

#[derive(Debug, Default)]
struct PendingClause {
    key: String,
    value: String,
    has_eq: bool,
    quoted: bool,
}

impl PendingClause {
    fn finish(self, out: &mut Vec<(String, String)>) -> Result<()> {
        let key = self.key.trim();
        if !self.has_eq {
            if key.is_empty() {
                return Ok(());
            }
            return Err(SheetsError::Config(format!(
                "Invalid filter clause '{}': expected key=value",
                key
            )));
        }
        if key.is_empty() {
            return Err(SheetsError::Config(
                "Invalid filter clause: empty key".to_string(),
            ));
        }

        let value = if self.quoted {
            self.value
        } else {
            self.value.trim().to_string()
        };
        out.push((key.to_string(), value));
        Ok(())
    }
}

/// Split into `(key, value)` pairs on commas outside quoted values
fn split_clauses(input: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut pending = PendingClause::default();
    let mut state = Lex::Key;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match state {
            Lex::Key => match c {
                ',' => {
                    std::mem::take(&mut pending).finish(&mut out)?;
                }
                '=' => {
                    pending.has_eq = true;
                    state = Lex::ValueStart;
                }
                _ => pending.key.push(c),
            },
            Lex::ValueStart => match c {
                ',' => {
                    std::mem::take(&mut pending).finish(&mut out)?;
                    state = Lex::Key;
                }
                '"' => {
                    pending.quoted = true;
                    state = Lex::Quoted;
                }
                c if c.is_whitespace() => {}
                _ => {
                    pending.value.push(c);
                    state = Lex::Bare;
                }
            },
            Lex::Bare => match c {
                ',' => {
                    std::mem::take(&mut pending).finish(&mut out)?;
                    state = Lex::Key;
                }
                _ => pending.value.push(c),
            },
            Lex::Quoted => match c {
                '\\' => match chars.next() {
                    Some(escaped @ ('"' | '\\')) => pending.value.push(escaped),
                    Some(other) => {
                        pending.value.push('\\');
                        pending.value.push(other);
                    }
                    None => break,
                },
                '"' => state = Lex::AfterQuote,
                _ => pending.value.push(c),
            },
            Lex::AfterQuote => match c {
                ',' => {
                    std::mem::take(&mut pending).finish(&mut out)?;
                    state = Lex::Key;
                }
                c if c.is_whitespace() => {}
                _ => {
                    return Err(SheetsError::Config(format!(
                        "Unexpected '{}' after quoted value in filter '{}'",
                        c,
                        pending.key.trim()
                    )));
                }
            },
        }
    }

    if state == Lex::Quoted {
        return Err(SheetsError::Config(format!(
            "Unterminated quote in filter '{}'",
            pending.key.trim()
        )));
    }
    pending.finish(&mut out)?;
    Ok(out)
}
