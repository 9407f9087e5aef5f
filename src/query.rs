//! Query engine for list and show results.
//!
//! Applies, in order: filters, sort keys, pagination, field projection.

use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{PortFwError, ResourceKind, Result};
use crate::types::{PortForwarding, Protocol};

/// A projected rule, as returned by list and show.
pub type Record = Map<String, Value>;

/// Attribute of a forwarding rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    FloatingIpId,
    InternalPortId,
    InternalIpAddress,
    InternalPort,
    ExternalPort,
    Protocol,
    Description,
    RevisionNumber,
}

impl Field {
    pub const ALL: [Field; 9] = [
        Field::Id,
        Field::FloatingIpId,
        Field::InternalPortId,
        Field::InternalIpAddress,
        Field::InternalPort,
        Field::ExternalPort,
        Field::Protocol,
        Field::Description,
        Field::RevisionNumber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::FloatingIpId => "floating_ip_id",
            Field::InternalPortId => "internal_port_id",
            Field::InternalIpAddress => "internal_ip_address",
            Field::InternalPort => "internal_port",
            Field::ExternalPort => "external_port",
            Field::Protocol => "protocol",
            Field::Description => "description",
            Field::RevisionNumber => "revision_number",
        }
    }

    /// JSON value of this attribute on `rule`
    pub fn value(&self, rule: &PortForwarding) -> Value {
        match self {
            Field::Id => Value::String(rule.id.to_string()),
            Field::FloatingIpId => Value::String(rule.floating_ip_id.to_string()),
            Field::InternalPortId => Value::String(rule.internal_port_id.to_string()),
            Field::InternalIpAddress => Value::String(rule.internal_ip_address.to_string()),
            Field::InternalPort => Value::from(rule.internal_port.get()),
            Field::ExternalPort => Value::from(rule.external_port.get()),
            Field::Protocol => Value::String(rule.protocol.as_str().to_string()),
            Field::Description => Value::String(rule.description.clone()),
            Field::RevisionNumber => Value::from(rule.revision_number),
        }
    }

    /// Ascending order of two rules by this attribute
    pub fn compare(&self, a: &PortForwarding, b: &PortForwarding) -> Ordering {
        match self {
            Field::Id => a.id.cmp(&b.id),
            Field::FloatingIpId => a.floating_ip_id.cmp(&b.floating_ip_id),
            Field::InternalPortId => a.internal_port_id.cmp(&b.internal_port_id),
            Field::InternalIpAddress => a.internal_ip_address.cmp(&b.internal_ip_address),
            Field::InternalPort => a.internal_port.cmp(&b.internal_port),
            Field::ExternalPort => a.external_port.cmp(&b.external_port),
            Field::Protocol => a.protocol.cmp(&b.protocol),
            Field::Description => a.description.cmp(&b.description),
            Field::RevisionNumber => a.revision_number.cmp(&b.revision_number),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = PortFwError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| PortFwError::InvalidInput(format!("Unknown attribute: {}", s)))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDir {
    type Err = PortFwError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(PortFwError::InvalidInput(format!(
                "Invalid sort direction: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: Field,
    pub dir: SortDir,
}

impl SortKey {
    pub fn new(field: Field, dir: SortDir) -> Self {
        Self { field, dir }
    }

    fn compare(&self, a: &PortForwarding, b: &PortForwarding) -> Ordering {
        let ord = self.field.compare(a, b);
        match self.dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    }
}

/// Exact-match filters. Empty lists match everything; values in one list are
/// alternatives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub id: Vec<Uuid>,
    pub internal_port_id: Vec<Uuid>,
    pub external_port: Vec<u16>,
    pub protocol: Vec<Protocol>,
}

impl Filters {
    pub fn matches(&self, rule: &PortForwarding) -> bool {
        fn any_of<T: PartialEq>(wanted: &[T], value: &T) -> bool {
            wanted.is_empty() || wanted.contains(value)
        }

        any_of(&self.id, &rule.id)
            && any_of(&self.internal_port_id, &rule.internal_port_id)
            && any_of(&self.external_port, &rule.external_port.get())
            && any_of(&self.protocol, &rule.protocol)
    }
}

/// Attribute subset to return. Empty means all attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<Field>);

impl Fields {
    pub fn all() -> Self {
        Self(Vec::new())
    }

    /// Restrict output to `fields`; `id` is always included.
    pub fn only(fields: impl IntoIterator<Item = Field>) -> Self {
        let mut selected = vec![Field::Id];
        for field in fields {
            if !selected.contains(&field) {
                selected.push(field);
            }
        }
        Self(selected)
    }

    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    pub fn project(&self, rule: &PortForwarding) -> Record {
        let fields: &[Field] = if self.0.is_empty() {
            &Field::ALL
        } else {
            &self.0
        };
        fields
            .iter()
            .map(|f| (f.as_str().to_string(), f.value(rule)))
            .collect()
    }
}

/// Parsed list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filters: Filters,
    pub sort: Vec<SortKey>,
    pub limit: Option<NonZeroUsize>,
    pub marker: Option<Uuid>,
    pub fields: Fields,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(mut self, field: Field, dir: SortDir) -> Self {
        self.sort.push(SortKey::new(field, dir));
        self
    }

    pub fn with_limit(mut self, limit: NonZeroUsize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_marker(mut self, marker: Uuid) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Filter, sort and paginate `rules`, which are in store order.
    pub fn select(&self, mut rules: Vec<PortForwarding>) -> Result<Vec<PortForwarding>> {
        rules.retain(|r| self.filters.matches(r));

        if !self.sort.is_empty() {
            // sort_by is stable: ties keep store order
            rules.sort_by(|a, b| {
                self.sort
                    .iter()
                    .map(|k| k.compare(a, b))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        if let Some(marker) = self.marker {
            let pos = rules
                .iter()
                .position(|r| r.id == marker)
                .ok_or_else(|| PortFwError::not_found(ResourceKind::PortForwarding, marker))?;
            rules.drain(..=pos);
        }

        if let Some(limit) = self.limit {
            rules.truncate(limit.get());
        }

        Ok(rules)
    }
}

/// Lazily projected list result.
pub struct Listing {
    rules: std::vec::IntoIter<PortForwarding>,
    fields: Fields,
}

impl Listing {
    pub(crate) fn new(rules: Vec<PortForwarding>, fields: Fields) -> Self {
        Self {
            rules: rules.into_iter(),
            fields,
        }
    }
}

impl Iterator for Listing {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.rules.next().map(|r| self.fields.project(&r))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rules.size_hint()
    }
}

impl ExactSizeIterator for Listing {}
