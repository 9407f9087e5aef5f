//! API surface.
//!
//! Maps the floating-IP-scoped REST resources onto the [`Registry`]. The
//! transport is left to the embedding server: requests arrive here already
//! split into method, path, decoded query pairs and body text.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{PortFwError, ResourceKind, Result};
use crate::parser::{parse_fields, parse_list_query};
use crate::query::{Fields, Record};
use crate::registry::Registry;
use crate::types::{PortForwardingCreate, PortForwardingUpdate};

/// Request envelope: `{"port_forwarding": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortForwardingBody<T> {
    pub port_forwarding: T,
}

/// Status code and optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    fn error(status: u16, kind: &str, message: String) -> Self {
        Self::json(
            status,
            json!({ "error": { "type": kind, "message": message } }),
        )
    }

    fn from_error(err: &PortFwError) -> Self {
        Self::error(err.status_code(), err.type_name(), err.to_string())
    }

    fn from_result(status: u16, result: Result<Value>) -> Self {
        match result {
            Ok(body) => Self::json(status, body),
            Err(e) => Self::from_error(&e),
        }
    }
}

/// Request handler over a registry.
#[derive(Clone)]
pub struct Api {
    registry: Registry,
}

impl Api {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Route one request.
    ///
    /// Query parameters are only read by the two GET routes.
    pub fn handle<K, V>(
        &self,
        method: &str,
        path: &str,
        params: &[(K, V)],
        body: Option<&str>,
    ) -> ApiResponse
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        debug!(method, path, "handling port forwarding request");
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["floatingips", fip, "port_forwardings"] => {
                let fip = match parse_path_id(fip, ResourceKind::FloatingIp) {
                    Ok(id) => id,
                    Err(e) => return ApiResponse::from_error(&e),
                };
                match method {
                    "GET" => ApiResponse::from_result(200, self.list(fip, params)),
                    "POST" => ApiResponse::from_result(201, self.create(fip, body)),
                    _ => method_not_allowed(method, path),
                }
            }
            ["floatingips", fip, "port_forwardings", id] => {
                let ids = parse_path_id(fip, ResourceKind::FloatingIp).and_then(|fip| {
                    parse_path_id(id, ResourceKind::PortForwarding).map(|id| (fip, id))
                });
                let (fip, id) = match ids {
                    Ok(ids) => ids,
                    Err(e) => return ApiResponse::from_error(&e),
                };
                match method {
                    "GET" => ApiResponse::from_result(200, self.show(fip, id, params)),
                    "PUT" => ApiResponse::from_result(200, self.update(fip, id, body)),
                    "DELETE" => match self.registry.delete(fip, id) {
                        Ok(()) => ApiResponse::no_content(),
                        Err(e) => ApiResponse::from_error(&e),
                    },
                    _ => method_not_allowed(method, path),
                }
            }
            _ => ApiResponse::error(404, "NotFound", format!("No route for {}", path)),
        }
    }

    /// `GET /floatingips/{fip_id}/port_forwardings`
    pub fn list<K, V>(&self, fip: Uuid, params: &[(K, V)]) -> Result<Value>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let query = parse_list_query(params)?;
        let records: Vec<Value> = self.registry.list(fip, &query)?.map(Value::Object).collect();
        Ok(json!({ "port_forwardings": records }))
    }

    /// `POST /floatingips/{fip_id}/port_forwardings`
    pub fn create(&self, fip: Uuid, body: Option<&str>) -> Result<Value> {
        let input: PortForwardingBody<PortForwardingCreate> = parse_body(body)?;
        let rule = self.registry.create(fip, input.port_forwarding)?;
        Ok(singular(Fields::all().project(&rule)))
    }

    /// `GET /floatingips/{fip_id}/port_forwardings/{id}`
    pub fn show<K, V>(&self, fip: Uuid, id: Uuid, params: &[(K, V)]) -> Result<Value>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let fields = parse_fields(params)?;
        let record = self.registry.show(fip, id, &fields)?;
        Ok(singular(record))
    }

    /// `PUT /floatingips/{fip_id}/port_forwardings/{id}`
    pub fn update(&self, fip: Uuid, id: Uuid, body: Option<&str>) -> Result<Value> {
        let input: PortForwardingBody<PortForwardingUpdate> = parse_body(body)?;
        let rule = self.registry.update(fip, id, input.port_forwarding)?;
        Ok(singular(Fields::all().project(&rule)))
    }
}

fn method_not_allowed(method: &str, path: &str) -> ApiResponse {
    ApiResponse::error(
        405,
        "MethodNotAllowed",
        format!("{} is not allowed on {}", method, path),
    )
}

/// Unparseable ids cannot name an existing resource.
fn parse_path_id(segment: &str, kind: ResourceKind) -> Result<Uuid> {
    Uuid::parse_str(segment).map_err(|_| PortFwError::not_found(kind, segment))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: Option<&str>) -> Result<T> {
    let body = body
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| PortFwError::InvalidInput("Request body is required".to_string()))?;
    serde_json::from_str(body)
        .map_err(|e| PortFwError::InvalidInput(format!("Invalid request body: {}", e)))
}

fn singular(record: Record) -> Value {
    json!({ "port_forwarding": Value::Object(record) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body_requires_envelope() {
        let r: Result<PortForwardingBody<PortForwardingCreate>> =
            parse_body(Some(r#"{"internal_port": 80}"#));
        assert!(matches!(r, Err(PortFwError::InvalidInput(_))));

        let r: Result<PortForwardingBody<PortForwardingCreate>> =
            parse_body(Some(r#"{"port_forwarding": {"internal_port": 80}}"#));
        assert_eq!(r.unwrap().port_forwarding.internal_port, Some(80));
    }

    #[test]
    fn test_parse_body_missing() {
        let r: Result<PortForwardingBody<PortForwardingUpdate>> = parse_body(None);
        assert!(matches!(r, Err(PortFwError::InvalidInput(_))));
        let r: Result<PortForwardingBody<PortForwardingUpdate>> = parse_body(Some("  "));
        assert!(matches!(r, Err(PortFwError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_path_id_is_not_found() {
        assert!(matches!(
            parse_path_id("bogus", ResourceKind::PortForwarding),
            Err(PortFwError::NotFound {
                kind: ResourceKind::PortForwarding,
                ..
            })
        ));
    }

    #[test]
    fn test_error_body_shape() {
        let resp = ApiResponse::from_error(&PortFwError::InvalidInput("bad port".into()));
        assert_eq!(resp.status, 400);
        let body = resp.body.unwrap();
        assert_eq!(body["error"]["type"], "InvalidInput");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("bad port"));
    }
}
