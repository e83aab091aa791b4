use regex::Regex;
use sea_orm::Value;
use serde::Deserialize;

use crate::error::{Result, SyncError};

/// Conditions on this field are skipped. Extension filtering is not supported.
pub const EXTENSION_FIELD: &str = "extension";

/// Field names are spliced into SQL, so they must be plain column identifiers.
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/* ---------- Stored filter document ---------- */

/// MediaMonkey's serialized autoplaylist query (`Playlists.QueryData`).
#[derive(Debug, Deserialize)]
pub struct FilterDocument {
    pub conditions: ConditionGroup,
}

#[derive(Debug, Deserialize)]
pub struct ConditionGroup {
    /// Whether the group's conditions are OR-combined.
    #[serde(rename = "isOR", alias = "or", default)]
    pub any: bool,

    pub data: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Condition(Condition),
    Group(ConditionGroup),
}

#[derive(Debug, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/* ---------- Translated predicate ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Contains,
    NotContains,
    NotEqual,
    AtLeast,
}

impl Comparison {
    fn parse(operator: &str) -> Option<Self> {
        match operator.trim().to_lowercase().as_str() {
            "contains" => Some(Self::Contains),
            "does not contain" => Some(Self::NotContains),
            "!=" => Some(Self::NotEqual),
            ">=" => Some(Self::AtLeast),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Operand {
    fn parse(token: &str) -> Self {
        if let Ok(i) = token.parse::<i64>() {
            Operand::Integer(i)
        } else if let Ok(f) = token.parse::<f64>() {
            Operand::Real(f)
        } else {
            let unquoted = token
                .strip_prefix('\'')
                .and_then(|t| t.strip_suffix('\''))
                .or_else(|| token.strip_prefix('"').and_then(|t| t.strip_suffix('"')))
                .unwrap_or(token);
            Operand::Text(unquoted.to_string())
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Operand::Integer(i) => Value::from(*i),
            Operand::Real(f) => Value::from(*f),
            Operand::Text(s) => Value::from(s.clone()),
        }
    }
}

/// One translated condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub column: String,
    pub comparison: Comparison,
    pub operand: Operand,
}

impl Clause {
    fn to_sql(&self) -> (String, Value) {
        match (&self.comparison, &self.operand) {
            (Comparison::Contains, operand) => (
                format!("{} LIKE ? ESCAPE '\\'", self.column),
                Value::from(like_pattern(operand)),
            ),
            (Comparison::NotContains, operand) => (
                format!("COALESCE({}, '') NOT LIKE ? ESCAPE '\\'", self.column),
                Value::from(like_pattern(operand)),
            ),
            (Comparison::NotEqual, operand) => {
                (format!("{} != ?", self.column), operand.to_value())
            }
            (Comparison::AtLeast, operand) => {
                (format!("{} >= ?", self.column), operand.to_value())
            }
        }
    }
}

/// AND-combined clauses over the `Songs` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render as a parameterized `WHERE` body plus its bound values.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let (fragments, values): (Vec<String>, Vec<Value>) =
            self.clauses().iter().map(Clause::to_sql).unzip();
        (fragments.join(" AND "), values)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn like_pattern(operand: &Operand) -> String {
    let text = match operand {
        Operand::Integer(i) => i.to_string(),
        Operand::Real(f) => f.to_string(),
        Operand::Text(s) => s.clone(),
    };
    format!("%{}%", escape_like(&text))
}

fn value_text(condition: &Condition) -> Result<String> {
    match &condition.value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(i64::from(*b).to_string()),
        other => Err(SyncError::invalid_filter(format!(
            "condition on `{}` has unusable value {}",
            condition.field, other
        ))),
    }
}

/// Only the first comma-delimited alternative is honored.
fn first_token(condition: &Condition, text: &str) -> Result<String> {
    let mut tokens = text.split(',').map(str::trim);
    let first = tokens.next().unwrap_or_default();
    let dropped: Vec<&str> = tokens.filter(|t| !t.is_empty()).collect();

    if first.is_empty() {
        return Err(SyncError::invalid_filter(format!(
            "condition `{} {}` has an empty operand",
            condition.field, condition.operator
        )));
    }
    if !dropped.is_empty() {
        log::warn!(
            "Condition `{} {} {}` lists several values; only `{}` is used, ignoring {:?}",
            condition.field,
            condition.operator,
            text,
            first,
            dropped
        );
    }
    Ok(first.to_string())
}

fn translate_condition(condition: &Condition, identifier: &Regex) -> Result<Clause> {
    let comparison =
        Comparison::parse(&condition.operator).ok_or_else(|| SyncError::Translation {
            field: condition.field.clone(),
            operator: condition.operator.clone(),
        })?;

    let column = condition.field.trim();
    if !identifier.is_match(column) {
        return Err(SyncError::invalid_filter(format!(
            "`{}` is not a valid field name",
            condition.field
        )));
    }

    let text = value_text(condition)?;
    let operand = match comparison {
        Comparison::Contains | Comparison::NotContains => Operand::Text(text),
        Comparison::NotEqual | Comparison::AtLeast => {
            Operand::parse(&first_token(condition, &text)?)
        }
    };

    Ok(Clause {
        column: column.to_string(),
        comparison,
        operand,
    })
}

/// Translate a parsed filter document into a predicate.
pub fn translate_document(document: &FilterDocument) -> Result<Predicate> {
    let group = &document.conditions;
    let identifier = Regex::new(IDENTIFIER_PATTERN)
        .map_err(|e| SyncError::invalid_filter(format!("field name pattern: {}", e)))?;
    let mut clauses = Vec::with_capacity(group.data.len());

    for entry in &group.data {
        match entry {
            Entry::Group(nested) => {
                return Err(SyncError::UnsupportedFilter {
                    reason: format!(
                        "nested {} group of size {}",
                        if nested.any { "OR" } else { "AND" },
                        nested.data.len()
                    ),
                });
            }
            Entry::Condition(condition)
                if condition.field.trim().eq_ignore_ascii_case(EXTENSION_FIELD) =>
            {
                log::debug!(
                    "Skipping unsupported extension condition `{} {}`",
                    condition.operator,
                    condition.value
                );
            }
            Entry::Condition(condition) => {
                clauses.push(translate_condition(condition, &identifier)?)
            }
        }
    }

    let predicate = Predicate { clauses };
    if predicate.is_empty() {
        return Err(SyncError::invalid_filter(
            "no usable conditions after skipping extension filters",
        ));
    }
    if group.any && predicate.len() > 1 {
        return Err(SyncError::UnsupportedFilter {
            reason: format!("{} conditions are OR-combined", predicate.len()),
        });
    }

    Ok(predicate)
}

/// Translate a serialized filter document into a predicate.
pub fn translate(document: &str) -> Result<Predicate> {
    let document: FilterDocument = serde_json::from_str(document)
        .map_err(|e| SyncError::invalid_filter(format!("malformed filter document: {}", e)))?;
    translate_document(&document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(conditions: &str) -> String {
        format!(r#"{{"conditions": {{"data": [{}]}}}}"#, conditions)
    }

    #[test]
    fn test_extension_condition_is_elided() {
        let predicate = translate(&doc(
            r#"{"field": "Genre", "operator": "contains", "value": "Rock"},
               {"field": "extension", "operator": "=", "value": "mp3"}"#,
        ))
        .unwrap();

        assert_eq!(predicate.len(), 1);
        let (sql, values) = predicate.to_sql();
        assert_eq!(sql, "Genre LIKE ? ESCAPE '\\'");
        assert_eq!(values, vec![Value::from("%Rock%".to_string())]);
    }

    #[test]
    fn test_all_supported_operators() {
        let predicate = translate(&doc(
            r#"{"field": "Genre", "operator": "contains", "value": "Rock"},
               {"field": "Custom1", "operator": "does not contain", "value": "Sad"},
               {"field": "Rating", "operator": "!=", "value": "0,20"},
               {"field": "Year", "operator": ">=", "value": "2006"},
               {"field": "EXTENSION", "operator": "contains", "value": "flac"}"#,
        ))
        .unwrap();

        assert_eq!(predicate.len(), 4);
        let (sql, values) = predicate.to_sql();
        assert_eq!(
            sql,
            "Genre LIKE ? ESCAPE '\\' AND COALESCE(Custom1, '') NOT LIKE ? ESCAPE '\\' \
             AND Rating != ? AND Year >= ?"
        );
        assert_eq!(
            values,
            vec![
                Value::from("%Rock%".to_string()),
                Value::from("%Sad%".to_string()),
                Value::from(0i64),
                Value::from(2006i64),
            ]
        );
    }

    #[test]
    fn test_unknown_operator_is_translation_error() {
        let err = translate(&doc(
            r#"{"field": "Genre", "operator": "contains", "value": "Rock"},
               {"field": "Artist", "operator": "starts with", "value": "The"}"#,
        ))
        .unwrap_err();

        match err {
            SyncError::Translation { field, operator } => {
                assert_eq!(field, "Artist");
                assert_eq!(operator, "starts with");
            }
            other => panic!("expected translation error, got {other:?}"),
        }
    }

    #[test]
    fn test_equals_is_not_silently_accepted() {
        let result = translate(&doc(r#"{"field": "Genre", "operator": "=", "value": "Rock"}"#));
        assert!(matches!(result, Err(SyncError::Translation { .. })));
    }

    #[test]
    fn test_empty_after_elision_is_invalid() {
        let only_extension =
            translate(&doc(r#"{"field": "extension", "operator": "=", "value": "mp3"}"#));
        assert!(matches!(only_extension, Err(SyncError::InvalidFilter { .. })));

        let empty = translate(&doc(""));
        assert!(matches!(empty, Err(SyncError::InvalidFilter { .. })));
    }

    #[test]
    fn test_malformed_document_is_invalid() {
        assert!(matches!(
            translate("not json"),
            Err(SyncError::InvalidFilter { .. })
        ));
        assert!(matches!(
            translate(r#"{"conditions": {}}"#),
            Err(SyncError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_first_token_only() {
        let predicate = translate(&doc(
            r#"{"field": "Custom2", "operator": "!=", "value": "Christmas, Halloween"}"#,
        ))
        .unwrap();

        assert_eq!(
            predicate.clauses()[0].operand,
            Operand::Text("Christmas".to_string())
        );
    }

    #[test]
    fn test_numeric_json_value() {
        let predicate =
            translate(&doc(r#"{"field": "Bitrate", "operator": ">=", "value": 256.5}"#)).unwrap();

        assert_eq!(predicate.clauses()[0].operand, Operand::Real(256.5));
    }

    #[test]
    fn test_quoted_operand_is_unquoted() {
        let predicate =
            translate(&doc(r#"{"field": "Genre", "operator": "!=", "value": "'Pop'"}"#)).unwrap();

        assert_eq!(predicate.clauses()[0].operand, Operand::Text("Pop".into()));
    }

    #[test]
    fn test_empty_operand_is_invalid() {
        let result = translate(&doc(r#"{"field": "Year", "operator": ">=", "value": " ,2010"}"#));
        assert!(matches!(result, Err(SyncError::InvalidFilter { .. })));
    }

    #[test]
    fn test_like_wildcards_are_escaped() {
        let predicate =
            translate(&doc(r#"{"field": "Comment", "operator": "contains", "value": "100%_"}"#))
                .unwrap();

        let (_, values) = predicate.to_sql();
        assert_eq!(values, vec![Value::from("%100\\%\\_%".to_string())]);
    }

    #[test]
    fn test_field_name_must_be_identifier() {
        let result = translate(&doc(
            r#"{"field": "Genre = 1 OR 1", "operator": "contains", "value": "x"}"#,
        ));
        assert!(matches!(result, Err(SyncError::InvalidFilter { .. })));
    }

    #[test]
    fn test_or_groups_are_unsupported() {
        let or_two = translate(
            r#"{"conditions": {"isOR": true, "data": [
                {"field": "Custom1", "operator": "contains", "value": "Angry"},
                {"field": "Genre", "operator": "contains", "value": "Metal"}]}}"#,
        );
        assert!(matches!(or_two, Err(SyncError::UnsupportedFilter { .. })));

        // A single condition means the same under OR and AND
        let or_one = translate(
            r#"{"conditions": {"isOR": true, "data": [
                {"field": "Custom1", "operator": "contains", "value": "Angry"},
                {"field": "extension", "operator": "=", "value": "mp3"}]}}"#,
        );
        assert_eq!(or_one.unwrap().len(), 1);
    }

    #[test]
    fn test_nested_group_is_unsupported() {
        let result = translate(
            r#"{"conditions": {"data": [
                {"field": "Genre", "operator": "contains", "value": "Rock"},
                {"isOR": true, "data": [
                    {"field": "Year", "operator": ">=", "value": "2000"}]}]}}"#,
        );
        match result {
            Err(SyncError::UnsupportedFilter { reason }) => {
                assert_eq!(reason, "nested OR group of size 1");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
