use std::num::NonZeroUsize;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{PortFwError, Result};
use crate::query::{Field, Fields, ListQuery, SortDir, SortKey};
use crate::types::Protocol;

/// Parse list query parameters.
///
/// `params` are decoded `(name, value)` pairs in request order. Recognized
/// names: the filters `id`, `internal_port_id`, `external_port`, `protocol`
/// (repeatable, alternatives), `sort_key` / `sort_dir` (repeatable, paired by
/// position), `limit`, `marker` and `fields` (repeatable).
pub fn parse_list_query<K, V>(params: &[(K, V)]) -> Result<ListQuery>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut query = ListQuery::new();
    let mut sort_keys = Vec::new();
    let mut sort_dirs = Vec::new();
    let mut fields = Vec::new();

    for (name, value) in params {
        let name = name.as_ref();
        let value = value.as_ref().trim();
        match name {
            "id" => query.filters.id.push(parse_uuid(name, value)?),
            "internal_port_id" => query.filters.internal_port_id.push(parse_uuid(name, value)?),
            "external_port" => query.filters.external_port.push(parse_port(name, value)?),
            "protocol" => query.filters.protocol.push(Protocol::from_str(value)?),
            "sort_key" => sort_keys.push(Field::from_str(value)?),
            "sort_dir" => sort_dirs.push(SortDir::from_str(value)?),
            "fields" => fields.push(Field::from_str(value)?),
            "limit" => query.limit = Some(parse_limit(value)?),
            "marker" => query.marker = Some(parse_uuid(name, value)?),
            other => {
                return Err(PortFwError::InvalidInput(format!(
                    "Unknown query parameter: {}",
                    other
                )))
            }
        }
    }

    if sort_dirs.len() > sort_keys.len() {
        return Err(PortFwError::InvalidInput(format!(
            "{} sort_dir values given for {} sort_key values",
            sort_dirs.len(),
            sort_keys.len()
        )));
    }
    query.sort = sort_keys
        .into_iter()
        .enumerate()
        .map(|(i, field)| SortKey::new(field, sort_dirs.get(i).copied().unwrap_or_default()))
        .collect();

    if !fields.is_empty() {
        query.fields = Fields::only(fields);
    }

    Ok(query)
}

/// Parse show query parameters; only `fields` is accepted.
pub fn parse_fields<K, V>(params: &[(K, V)]) -> Result<Fields>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut fields = Vec::new();
    for (name, value) in params {
        match name.as_ref() {
            "fields" => fields.push(Field::from_str(value.as_ref().trim())?),
            other => {
                return Err(PortFwError::InvalidInput(format!(
                    "Unknown query parameter: {}",
                    other
                )))
            }
        }
    }
    if fields.is_empty() {
        Ok(Fields::all())
    } else {
        Ok(Fields::only(fields))
    }
}

fn parse_uuid(name: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| PortFwError::InvalidInput(format!("Invalid {}: {}", name, value)))
}

fn parse_port(name: &str, value: &str) -> Result<u16> {
    match value.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(PortFwError::InvalidInput(format!(
            "Invalid {}: {}",
            name, value
        ))),
    }
}

fn parse_limit(value: &str) -> Result<NonZeroUsize> {
    value
        .parse::<NonZeroUsize>()
        .map_err(|_| PortFwError::InvalidInput(format!("Invalid limit: {}", value)))
}
