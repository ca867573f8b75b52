//! Target collections and their row filters
//!
//! A `ResourceRef` names a row collection (or a storage bucket) together with
//! the filter, projection, ordering and limit that select rows from it. It is
//! immutable once built; resolving captured bindings yields a new value.

use crate::error::{ProbeError, Result};
use std::collections::HashMap;
use std::fmt;

/// Prefix marking a filter value as a reference to a captured binding.
pub const BINDING_PREFIX: char = '@';

/// Value side of an `eq.` filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Literal(String),
    /// Filled in from a value captured by an earlier probe.
    Binding(String),
}

impl FilterValue {
    /// `@name` becomes a binding reference, anything else is literal.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(BINDING_PREFIX) {
            Some(name) if !name.is_empty() => FilterValue::Binding(name.to_string()),
            _ => FilterValue::Literal(raw.to_string()),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{}", value),
            Self::Binding(name) => write!(f, "{}{}", BINDING_PREFIX, name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: SortDirection,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse `field.asc` / `field.desc`; a bare field sorts ascending.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.rsplit_once('.') {
            Some((field, "asc")) if !field.is_empty() => Ok(Self::asc(field)),
            Some((field, "desc")) if !field.is_empty() => Ok(Self::desc(field)),
            None if !raw.is_empty() => Ok(Self::asc(raw)),
            _ => Err(ProbeError::catalog(format!("Invalid order '{}'", raw))),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        write!(f, "{}.{}", self.field, direction)
    }
}

/// Reference to a collection plus row selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    collection: String,
    select: Option<Vec<String>>,
    filters: Vec<Filter>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl ResourceRef {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn select_fields(mut self, fields: Vec<String>) -> Self {
        self.select = Some(fields);
        self
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: FilterValue::Literal(value.into()),
        });
        self
    }

    pub fn eq_binding(mut self, field: impl Into<String>, binding: impl Into<String>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: FilterValue::Binding(binding.into()),
        });
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: FilterValue) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value,
        });
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.select.as_deref()
    }

    pub fn ordering(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Names of bindings this resource needs before it can be sent.
    pub fn required_bindings(&self) -> Vec<&str> {
        self.filters
            .iter()
            .filter_map(|f| match &f.value {
                FilterValue::Binding(name) => Some(name.as_str()),
                FilterValue::Literal(_) => None,
            })
            .collect()
    }

    /// Replace binding references with captured values.
    pub fn resolve(&self, bindings: &HashMap<String, String>) -> Result<ResourceRef> {
        let mut resolved = self.clone();
        for filter in &mut resolved.filters {
            if let FilterValue::Binding(name) = &filter.value {
                let value = bindings
                    .get(name)
                    .ok_or_else(|| ProbeError::MissingBinding {
                        binding: name.clone(),
                    })?;
                filter.value = FilterValue::Literal(value.clone());
            }
        }
        Ok(resolved)
    }

    /// Query parameters in `select`, filters, `order`, `limit` order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(fields) = &self.select {
            pairs.push(("select".to_string(), fields.join(",")));
        }
        for filter in &self.filters {
            pairs.push((filter.field.clone(), format!("eq.{}", filter.value)));
        }
        if let Some(order) = &self.order {
            pairs.push(("order".to_string(), order.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection)?;
        let pairs = self.query_pairs();
        if !pairs.is_empty() {
            let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, "?{}", query.join("&"))?;
        }
        Ok(())
    }
}
