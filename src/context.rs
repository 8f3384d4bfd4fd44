use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, StackError};

/// every context key the site stack understands
pub const CONTEXT_KEYS: &[&str] = &[
    "namespace",
    "default_root_object",
    "domain_name_www",
    "domain_name_root",
    "domain_name_id",
    "sub_domain_name",
    "mon_email_address",
    "email_validation",
];

pub const DEFAULT_ROOT_OBJECT: &str = "index.html";

pub type ContextMap = serde_json::Map<String, Value>;

/// account and region the stack is meant for. Each one prefers the
/// deployment specific variable and falls back to the default environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployEnvironment {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub region: Option<String>,
}

impl DeployEnvironment {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let first_set = |keys: [&str; 2]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .find(|v| !v.is_empty())
        };
        Self {
            account: first_set(["CDK_DEPLOY_ACCOUNT", "CDK_DEFAULT_ACCOUNT"]),
            region: first_set(["CDK_DEPLOY_REGION", "CDK_DEFAULT_REGION"]),
        }
    }
}

/// reads a context file. Both `{ "context": { ... } }` (the cdk.json layout) and a
/// flat object of context keys are accepted.
pub fn load_context_file(path: &Path) -> Result<ContextMap> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        StackError::Configuration(format!("Failed to load context file {:?}: {e}", path))
    })?;
    let value: Value = serde_json::from_str(&contents)?;
    let mut map = match value {
        Value::Object(m) => m,
        _ => {
            return Err(StackError::Configuration(format!(
                "Context file {:?} must contain a JSON object", path
            )))
        }
    };
    match map.remove("context") {
        Some(Value::Object(ctx)) => Ok(ctx),
        Some(_) => Err(StackError::Configuration(format!(
            "'context' in {:?} must be an object", path
        ))),
        None => Ok(map),
    }
}

/// parses a `key=value` command line override
pub fn parse_override(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => Ok((key.trim().to_string(), val.to_string())),
        _ => Err(StackError::Configuration(format!(
            "Invalid context override {:?}. Expected key=value", s
        ))),
    }
}

/// command line overrides win over the file
pub fn resolve_context(mut file: ContextMap, overrides: &[(String, String)]) -> ContextMap {
    for (key, val) in overrides {
        file.insert(key.clone(), Value::String(val.clone()));
    }
    file
}

/// the context parameters, checked and typed
#[derive(Debug, Clone, PartialEq)]
pub struct SiteProps {
    pub namespace: String,
    pub default_root_object: String,
    pub domain_name_www: String,
    pub domain_name_root: String,
    /// id of the existing hosted zone for `domain_name_root`
    pub domain_name_id: String,
    /// accepted for compatibility with existing context files. nothing reads it.
    pub sub_domain_name: Option<String>,
    pub mon_email_address: String,
    /// when true the certificate is validated by email instead of DNS
    pub email_validation: bool,
}

fn get_str(ctx: &ContextMap, key: &str) -> Option<String> {
    match ctx.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn require_str(ctx: &ContextMap, key: &str) -> Result<String> {
    get_str(ctx, key).ok_or_else(|| {
        StackError::Configuration(format!("Missing context parameter '{key}'. Provide it in the context file or with -c {key}=..."))
    })
}

fn get_bool(ctx: &ContextMap, key: &str, default: bool) -> Result<bool> {
    match ctx.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            x => Err(StackError::Configuration(format!("Unexpected value '{x}' for {key}. Expected true or false"))),
        },
        Some(x) => Err(StackError::Configuration(format!("Unexpected value {x} for {key}. Expected true or false"))),
    }
}

/// just the namespace, for commands that only need the stack name
pub fn namespace_from_context(ctx: &ContextMap) -> Result<String> {
    require_str(ctx, "namespace")
}

impl SiteProps {
    pub fn from_context(ctx: &ContextMap) -> Result<Self> {
        for key in ctx.keys() {
            // cdk feature flags and similar namespaced keys are expected in context files
            if key.starts_with('@') || key.contains(':') {
                continue;
            }
            if !CONTEXT_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "ignoring unknown context parameter");
            }
        }
        let props = Self {
            namespace: require_str(ctx, "namespace")?,
            default_root_object: get_str(ctx, "default_root_object").unwrap_or_else(|| DEFAULT_ROOT_OBJECT.into()),
            domain_name_www: require_str(ctx, "domain_name_www")?,
            domain_name_root: require_str(ctx, "domain_name_root")?,
            domain_name_id: require_str(ctx, "domain_name_id")?,
            sub_domain_name: get_str(ctx, "sub_domain_name"),
            mon_email_address: require_str(ctx, "mon_email_address")?,
            email_validation: get_bool(ctx, "email_validation", false)?,
        };
        props.verify_www_under_root()?;
        tracing::debug!(?props, "resolved context");
        Ok(props)
    }

    /// the www record lives in the hosted zone of the root domain, so the www name must be a
    /// subdomain of it
    fn verify_www_under_root(&self) -> Result<()> {
        let www = self.domain_name_www.trim_end_matches('.').to_ascii_lowercase();
        let root = self.domain_name_root.trim_end_matches('.').to_ascii_lowercase();
        if www.len() > root.len() + 1 && www.ends_with(&format!(".{root}")) {
            return Ok(());
        }
        Err(StackError::Configuration(format!(
            "domain_name_www '{}' must be a subdomain of domain_name_root '{}'",
            self.domain_name_www, self.domain_name_root
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn full_context() -> ContextMap {
        match json!({
            "namespace": "example",
            "domain_name_www": "www.example.com",
            "domain_name_root": "example.com",
            "domain_name_id": "Z0123456789",
            "mon_email_address": "ops@example.com",
        }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn deploy_vars_win_over_defaults() {
        let vars: HashMap<&str, &str> = [
            ("CDK_DEPLOY_ACCOUNT", "111111111111"),
            ("CDK_DEFAULT_ACCOUNT", "222222222222"),
            ("CDK_DEFAULT_REGION", "us-east-1"),
        ].into_iter().collect();
        let env = DeployEnvironment::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(env.account.as_deref(), Some("111111111111"));
        assert_eq!(env.region.as_deref(), Some("us-east-1"));

        let env = DeployEnvironment::from_lookup(|_| None);
        assert_eq!(env, DeployEnvironment::default());
    }

    #[test]
    fn defaults_apply_when_optional_keys_missing() {
        let props = SiteProps::from_context(&full_context()).unwrap();
        assert_eq!(props.default_root_object, "index.html");
        assert!(!props.email_validation);
        assert_eq!(props.sub_domain_name, None);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let mut ctx = full_context();
        ctx.remove("domain_name_id");
        let err = SiteProps::from_context(&ctx).unwrap_err();
        assert!(err.to_string().contains("domain_name_id"));
    }

    #[test]
    fn www_name_must_be_under_the_root_domain() {
        let ctx = resolve_context(full_context(), &[("domain_name_www".into(), "WWW.Example.com".into())]);
        assert!(SiteProps::from_context(&ctx).is_ok());

        for www in ["www.other.com", "example.com", "wwwexample.com"] {
            let ctx = resolve_context(full_context(), &[("domain_name_www".into(), www.into())]);
            let err = SiteProps::from_context(&ctx).unwrap_err();
            assert!(matches!(err, StackError::Configuration(_)), "{www}");
            assert!(err.to_string().contains("subdomain"), "{www}");
        }
    }

    #[test]
    fn email_validation_accepts_bool_or_string() {
        let mut ctx = full_context();
        ctx.insert("email_validation".into(), json!(true));
        assert!(SiteProps::from_context(&ctx).unwrap().email_validation);
        let ctx = resolve_context(ctx, &[("email_validation".into(), "False".into())]);
        assert!(!SiteProps::from_context(&ctx).unwrap().email_validation);
        let ctx = resolve_context(ctx, &[("email_validation".into(), "maybe".into())]);
        assert!(SiteProps::from_context(&ctx).is_err());
    }

    #[test]
    fn overrides_must_be_key_value() {
        assert_eq!(parse_override("namespace=site").unwrap(), ("namespace".into(), "site".into()));
        assert_eq!(parse_override("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert!(parse_override("namespace").is_err());
        assert!(parse_override("=x").is_err());
    }

    #[test]
    fn loads_cdk_json_layout_and_flat_layout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "app": "static-site", "context": {{ "namespace": "nested" }} }}"#).unwrap();
        let ctx = load_context_file(file.path()).unwrap();
        assert_eq!(ctx["namespace"], "nested");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "namespace": "flat" }}"#).unwrap();
        let ctx = load_context_file(file.path()).unwrap();
        assert_eq!(ctx["namespace"], "flat");
    }
}
