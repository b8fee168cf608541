//! # Query Documents
//!
//! Builds the filter documents the collection routes send to the store, and
//! evaluates filters and `$set` updates for the in-memory backend.
//!
//! The in-memory evaluator understands the subset of the query language this
//! tool emits or accepts from bulk updates:
//!
//! - implicit equality (with array element matching and `null` ≙ missing)
//! - `$or`, `$and`, `$nor`
//! - `$eq`, `$ne`, `$in`, `$nin`, `$exists`
//! - `$gt`, `$gte`, `$lt`, `$lte`
//! - `$regex` with `$options` (`i`, `m`, `s`, `x`)
//! - `$text` word matching via [`text_matches`], for collections that
//!   registered text fields
//!
//! Anything else is rejected the way the server would reject a bad query.

use crate::error::{DeckError, DeckResult};
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

/// Filter selecting a document by the `:id` path segment.
///
/// A valid 24-hex string selects an ObjectId `_id`; anything else selects a
/// string `_id`.
pub fn id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "_id": oid },
        Err(_) => doc! { "_id": id },
    }
}

/// Builds the naive search filter.
///
/// An empty term matches everything. A collection with a text index is
/// searched with `$text` alone, since the server refuses `$text` under an
/// `$or` whose other clauses are unindexed. Otherwise each field in `fields`
/// gets a literal, case-insensitive regex clause.
pub fn search_filter(term: &str, fields: &[String], has_text_index: bool) -> Document {
    if term.is_empty() {
        return Document::new();
    }

    if has_text_index {
        return doc! { "$text": { "$search": term } };
    }

    if fields.is_empty() {
        // Nothing to search in: an empty collection
        return doc! { "_id": { "$exists": false } };
    }

    let pattern = regex::escape(term);
    let clauses: Vec<Bson> = fields
        .iter()
        .map(|field| {
            let mut clause = Document::new();
            clause.insert(
                field.clone(),
                doc! { "$regex": pattern.as_str(), "$options": "i" },
            );
            Bson::Document(clause)
        })
        .collect();

    doc! { "$or": clauses }
}

/// Evaluates a filter document against a document
pub fn matches(doc: &Document, filter: &Document) -> DeckResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$or" => {
                let mut any = false;
                for clause in clause_list(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for clause in clause_list(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$nor" => {
                let mut none = true;
                for clause in clause_list(key, condition)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$text" => {
                return Err(DeckError::Database(
                    "text index required for $text query".to_string(),
                ))
            }
            op if op.starts_with('$') => {
                return Err(DeckError::Database(format!(
                    "unknown top level operator: {}",
                    op
                )))
            }
            path => field_matches(lookup(doc, path), condition)?,
        };

        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clause_list<'a>(op: &str, value: &'a Bson) -> DeckResult<Vec<&'a Document>> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(DeckError::Database(format!(
                "{} must be a nonempty array",
                op
            )))
        }
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(DeckError::Database(format!(
                "{} argument's entries must be objects",
                op
            ))),
        })
        .collect()
}

/// Word-level `$text` match over the indexed fields.
///
/// Terms are split on whitespace and compared case-insensitively against the
/// words of each indexed string. `-term` excludes a document. `$**` covers
/// every top-level string field. No stemming or phrase support.
pub fn text_matches(doc: &Document, fields: &[String], search: &str) -> bool {
    let mut words: Vec<String> = Vec::new();
    let mut collect = |value: &Bson| {
        let strings: Vec<&str> = match value {
            Bson::String(s) => vec![s.as_str()],
            Bson::Array(items) => items.iter().filter_map(Bson::as_str).collect(),
            _ => Vec::new(),
        };
        for s in strings {
            words.extend(
                s.split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .map(str::to_lowercase),
            );
        }
    };

    for field in fields {
        if field == "$**" {
            doc.values().for_each(&mut collect);
        } else if let Some(value) = lookup(doc, field) {
            collect(value);
        }
    }

    let mut any_positive = false;
    for term in search.split_whitespace() {
        let (negated, term) = match term.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, term),
        };
        let term = term.to_lowercase();
        let hit = words.iter().any(|w| *w == term);
        if negated && hit {
            return false;
        }
        if !negated && hit {
            any_positive = true;
        }
    }

    any_positive
}

/// Resolves a dotted path inside a document
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn is_operator_doc(condition: &Bson) -> bool {
    match condition {
        Bson::Document(d) => d.keys().next().is_some_and(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> DeckResult<bool> {
    if !is_operator_doc(condition) {
        return Ok(equals(value, condition));
    }

    let ops = match condition {
        Bson::Document(d) => d,
        _ => return Ok(false),
    };

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$in" => in_list(value, op, arg)?,
            "$nin" => !in_list(value, op, arg)?,
            "$exists" => value.is_some() == truthy(arg),
            "$gt" => compare_any(value, arg, |o| o == Ordering::Greater),
            "$gte" => compare_any(value, arg, |o| o != Ordering::Less),
            "$lt" => compare_any(value, arg, |o| o == Ordering::Less),
            "$lte" => compare_any(value, arg, |o| o != Ordering::Greater),
            "$regex" => {
                let options = ops.get_str("$options").unwrap_or("");
                let re = match arg {
                    Bson::String(pattern) => build_regex(pattern, options)?,
                    Bson::RegularExpression(r) => build_regex(&r.pattern, &r.options)?,
                    _ => return Err(DeckError::Database("$regex has to be a string".into())),
                };
                regex_any(value, &re)
            }
            "$options" => true,
            other => {
                return Err(DeckError::Database(format!("unknown operator: {}", other)))
            }
        };

        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

fn in_list(value: Option<&Bson>, op: &str, arg: &Bson) -> DeckResult<bool> {
    match arg {
        Bson::Array(candidates) => Ok(candidates.iter().any(|c| equals(value, c))),
        _ => Err(DeckError::Database(format!("{} needs an array", op))),
    }
}

/// Equality with array-element matching; `null` matches a missing field
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    let value = match value {
        None => return matches!(target, Bson::Null),
        Some(v) => v,
    };

    if let Bson::RegularExpression(r) = target {
        return build_regex(&r.pattern, &r.options)
            .map(|re| regex_any(Some(value), &re))
            .unwrap_or(false);
    }

    if bson_eq(value, target) {
        return true;
    }

    match value {
        Bson::Array(items) => items.iter().any(|item| bson_eq(item, target)),
        _ => false,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Value equality, treating all numeric types as one
pub fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_any(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare(item, target).is_some_and(&accept)),
        Some(v) => compare(v, target).is_some_and(accept),
    }
}

fn build_regex(pattern: &str, options: &str) -> DeckResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| DeckError::Database(format!("Regular expression is invalid: {}", e)))
}

fn regex_any(value: Option<&Bson>, re: &Regex) -> bool {
    match value {
        Some(Bson::String(s)) => re.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if re.is_match(s))),
        _ => false,
    }
}

/// Applies `$set` fields to a document, returning whether anything changed
pub fn apply_set(doc: &mut Document, set: &Document) -> DeckResult<bool> {
    let mut changed = false;

    for (path, value) in set {
        if path.is_empty() || path.split('.').any(|p| p.is_empty() || p.starts_with('$')) {
            return Err(DeckError::Database(format!(
                "The update path '{}' contains an empty or '$'-prefixed field name",
                path
            )));
        }

        if path == "_id" || path.starts_with("_id.") {
            if lookup(doc, path).is_some_and(|current| bson_eq(current, value)) {
                continue;
            }
            return Err(DeckError::Database(
                "Performing an update on the path '_id' would modify the immutable field '_id'"
                    .to_string(),
            ));
        }

        changed |= set_path(doc, path, value.clone())?;
    }

    Ok(changed)
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> DeckResult<bool> {
    match path.split_once('.') {
        None => {
            if doc.get(path) == Some(&value) {
                return Ok(false);
            }
            doc.insert(path, value);
            Ok(true)
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DeckError::Database(format!(
                    "Cannot create field '{}' in element {{{}}}",
                    rest, head
                ))),
            }
        }
    }
}
