//! Declarative markup extraction.
//!
//! Every value the relay reads out of portal HTML is described by a
//! [`FieldRule`]: a CSS selector plus the placeholder used when the selector
//! matches nothing. Repeated blocks are described by a [`RecordSchema`].

use std::collections::BTreeMap;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: &'static str,
    pub selector: &'static str,
    /// Placeholder for a missing node. `None` drops the enclosing record.
    pub default: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    pub container: &'static str,
    pub fields: &'static [FieldRule],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: BTreeMap<&'static str, String>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn take(&mut self, field: &str) -> Option<String> {
        self.values.remove(field)
    }
}

/// Extracts one record per `schema.container` match, in document order.
pub fn extract_records(html: &str, schema: &RecordSchema) -> Result<Vec<Record>, RelayError> {
    let document = Html::parse_document(html);
    let container = parse_selector(schema.container)?;
    let fields = schema
        .fields
        .iter()
        .map(|rule| Ok((rule, parse_selector(rule.selector)?)))
        .collect::<Result<Vec<_>, RelayError>>()?;

    let mut records = Vec::new();
    'blocks: for block in document.select(&container) {
        let mut record = Record::default();
        for (rule, selector) in &fields {
            match first_text(block, selector) {
                Some(text) => {
                    record.values.insert(rule.field, text);
                }
                None => match rule.default {
                    Some(placeholder) => {
                        debug!(field = rule.field, placeholder, "node missing, using placeholder");
                        record.values.insert(rule.field, placeholder.to_string());
                    }
                    None => {
                        debug!(field = rule.field, "required node missing, skipping block");
                        continue 'blocks;
                    }
                },
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// Extracts a single document-level value, falling back to the rule's default.
pub fn extract_field(html: &str, rule: &FieldRule) -> Result<Option<String>, RelayError> {
    let document = Html::parse_document(html);
    let selector = parse_selector(rule.selector)?;
    let text = first_text(document.root_element(), &selector);
    if text.is_none() && rule.default.is_some() {
        debug!(field = rule.field, "node missing, using placeholder");
    }
    Ok(text.or_else(|| rule.default.map(str::to_string)))
}

/// Returns the trimmed `attr` of the first element matching `selector`.
pub fn extract_attr(html: &str, selector: &str, attr: &str) -> Result<Option<String>, RelayError> {
    let document = Html::parse_document(html);
    let selector = parse_selector(selector)?;
    Ok(document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string()))
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
}

fn parse_selector(selector: &str) -> Result<Selector, RelayError> {
    Selector::parse(selector).map_err(|err| RelayError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{err:?}"),
    })
}
