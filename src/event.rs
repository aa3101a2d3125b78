//! Lambda Function URL event payloads.
//!
//! Every inbound field is optional on the wire; absent and `null` values both
//! decode to the field's default.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

/// Inbound Function URL request event.
///
/// `query_string_parameters` is carried for handlers that want it, but the
/// request query is always rebuilt from `raw_query_string`: the structured map
/// joins repeated keys with commas, which is indistinguishable from a single
/// comma-containing value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    #[serde(default, deserialize_with = "nullable")]
    pub version: String,
    #[serde(default, deserialize_with = "nullable")]
    pub raw_path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub raw_query_string: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cookies: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "nullable")]
    pub query_string_parameters: HashMap<String, String>,
    #[serde(default, deserialize_with = "nullable")]
    pub request_context: RequestContext,
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    #[serde(default, deserialize_with = "nullable")]
    pub is_base64_encoded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, deserialize_with = "nullable")]
    pub account_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub request_id: String,
    /// Authorizer block (IAM or custom); shape depends on the auth type.
    #[serde(default)]
    pub authorizer: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub api_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub domain_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub domain_prefix: String,
    #[serde(default, deserialize_with = "nullable")]
    pub time: String,
    #[serde(default, deserialize_with = "nullable")]
    pub time_epoch: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub http: HttpDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpDescription {
    #[serde(default, deserialize_with = "nullable")]
    pub method: String,
    #[serde(default, deserialize_with = "nullable")]
    pub path: String,
    #[serde(default, deserialize_with = "nullable")]
    pub protocol: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source_ip: String,
    #[serde(default, deserialize_with = "nullable")]
    pub user_agent: String,
}

/// Outbound Function URL response event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<String>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
