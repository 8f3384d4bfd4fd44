use serde::{Deserialize, Serialize};
pub use serde_json::Value;

mod acm_cert;
pub use acm_cert::*;
mod s3_bucket;
pub use s3_bucket::*;
mod lambda;
pub use lambda::*;
mod cloudfront;
pub use cloudfront::*;
mod route53;
pub use route53::*;
mod cloudwatch;
pub use cloudwatch::*;

/// every typed resource knows its cloudformation type string and
/// how to render itself as the `Properties` block of a template.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;
    /// structural checks that would otherwise only fail once cloudformation
    /// starts creating the resource.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
    /// resources that accept a `Tags` property return their tag list here
    /// so that the tagging pass can append to it.
    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        None
    }
}

/// serializes any typed resource by its serde representation.
/// resources that don't derive Serialize (custom resources) build their
/// own map instead. A value that fails to serialize renders as `Null`,
/// which `Stack::template` rejects.
pub fn to_properties<T: Serialize>(val: &T) -> Value {
    match serde_json::to_value(val) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize resource properties");
            Value::Null
        }
    }
}

/// a property that is either a literal string, or an intrinsic function
/// such as `{ "Ref": "SiteBucket" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrVal {
    String(String),
    Val(Value),
}

impl Default for StrVal {
    fn default() -> Self {
        StrVal::String(String::new())
    }
}

impl From<&str> for StrVal {
    fn from(value: &str) -> Self {
        StrVal::String(value.to_string())
    }
}

impl From<String> for StrVal {
    fn from(value: String) -> Self {
        StrVal::String(value)
    }
}

impl From<Value> for StrVal {
    fn from(value: Value) -> Self {
        StrVal::Val(value)
    }
}

pub fn get_ref(logical_id: &str) -> Value {
    serde_json::json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    serde_json::json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn sub(template: &str) -> Value {
    serde_json::json!({ "Fn::Sub": template })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    serde_json::json!({ "Fn::Join": [delimiter, parts] })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new<K: AsRef<str>, V: AsRef<str>>(key: K, value: V) -> Self {
        Self { key: key.as_ref().into(), value: value.as_ref().into() }
    }
}

/// what cloudformation should do with the physical resource when it is
/// removed from the template, or when the whole stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

pub struct Resource {
    pub name: String,
    pub properties: Box<dyn CfnResource>,
    pub deletion_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new<R: CfnResource + 'static>(name: &str, properties: R) -> Self {
        Self {
            name: name.to_string(),
            properties: Box::new(properties) as _,
            deletion_policy: None,
        }
    }

    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    pub fn type_string(&self) -> &'static str {
        self.properties.type_string()
    }
}

/// Logical IDs must be alphanumeric (A-Za-z0-9) and unique within the template.
/// max 255 characters.
pub fn verify_logical_id(name: &str) -> Option<String> {
    if name.is_empty() || name.len() > 255 {
        return Some(format!("Invalid logical id {:?}. Must be between 1 and 255 characters", name));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(format!("Invalid logical id {:?}. Must only contain alphanumeric characters", name));
    }
    None
}

/// collects every logical id referenced through `Ref`, `Fn::GetAtt` or `Fn::Sub`
/// anywhere inside a property value. pseudo parameters (`AWS::Region`, ...) are skipped.
pub fn referenced_ids(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("Ref") {
                push_reference(id, out);
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(id)) = parts.first() {
                    push_reference(id, out);
                }
            }
            match map.get("Fn::Sub") {
                Some(Value::String(template)) => sub_references(template, out),
                Some(Value::Array(parts)) => {
                    if let Some(Value::String(template)) = parts.first() {
                        sub_references(template, out);
                    }
                }
                _ => {}
            }
            for val in map.values() {
                referenced_ids(val, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                referenced_ids(item, out);
            }
        }
        _ => {}
    }
}

fn push_reference(id: &str, out: &mut Vec<String>) {
    if id.starts_with("AWS::") {
        return;
    }
    if !out.iter().any(|x| x == id) {
        out.push(id.to_string());
    }
}

fn sub_references(template: &str, out: &mut Vec<String>) {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        rest = &rest[start + 2..];
        let end = match rest.find('}') {
            Some(e) => e,
            None => return,
        };
        let var = &rest[..end];
        rest = &rest[end + 1..];
        // ${!Literal} is an escaped literal, not a reference
        if var.starts_with('!') {
            continue;
        }
        let id = var.split('.').next().unwrap_or(var);
        push_reference(id, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_refs_getatts_and_subs() {
        let val = json!({
            "A": { "Ref": "Bucket" },
            "B": [{ "Fn::GetAtt": ["Distribution", "DomainName"] }],
            "C": { "Fn::Sub": "arn:aws:s3:::${Bucket}/* in ${AWS::Region} for ${Function.Arn} ${!Literal}" },
            "D": { "Ref": "AWS::AccountId" },
        });
        let mut out = vec![];
        referenced_ids(&val, &mut out);
        out.sort();
        assert_eq!(out, vec!["Bucket".to_string(), "Distribution".into(), "Function".into()]);
    }

    #[test]
    fn logical_ids_must_be_alphanumeric() {
        assert!(verify_logical_id("SiteBucket").is_none());
        assert!(verify_logical_id("site_bucket").is_some());
        assert!(verify_logical_id("").is_some());
        assert!(verify_logical_id(&"a".repeat(256)).is_some());
    }

    #[test]
    fn strval_serializes_untagged() {
        let lit: StrVal = "index.html".into();
        let intrinsic: StrVal = get_ref("Cert").into();
        assert_eq!(serde_json::to_value(&lit).unwrap(), json!("index.html"));
        assert_eq!(serde_json::to_value(&intrinsic).unwrap(), json!({ "Ref": "Cert" }));
    }
}
