use std::path::PathBuf;
use std::time::Duration;

use super::*;
use crate::errors::{Result, StackError};
use crate::stack::Stack;

/// managed "CachingOptimized" cache policy.
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// the hosted zone id used by every alias record that targets a cloudfront distribution.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

pub const HSTS_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// cloudfront functions are limited to 10KB of code
pub const MAX_FUNCTION_CODE_BYTES: usize = 10 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OriginAccessIdentityConfig {
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnOriginAccessIdentity {
    pub cloud_front_origin_access_identity_config: OriginAccessIdentityConfig,
}

impl CfnResource for CfnOriginAccessIdentity {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CloudFrontOriginAccessIdentity"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionRuntimeVersion {
    #[serde(rename = "cloudfront-js-1.0")]
    Js1,
    #[serde(rename = "cloudfront-js-2.0")]
    Js2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionConfig {
    pub comment: String,
    pub runtime: FunctionRuntimeVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnEdgeFunction {
    pub name: String,
    pub auto_publish: bool,
    pub function_code: String,
    pub function_config: FunctionConfig,
}

/// 1-64 characters: letters, numbers, hyphens and underscores
pub fn verify_edge_function_name(name: &str) -> Option<String> {
    if name.is_empty() || name.len() > 64 {
        return Some(format!("Invalid function name {:?}. Must be between 1 and 64 characters", name));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Some(format!("Invalid function name {:?}. Must only contain letters, numbers, hyphens and underscores", name));
    }
    None
}

impl CfnResource for CfnEdgeFunction {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Function"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(err) = verify_edge_function_name(&self.name) {
            return Err(err);
        }
        if self.function_code.trim().is_empty() {
            return Err("Function code cannot be empty".into());
        }
        if self.function_code.len() > MAX_FUNCTION_CODE_BYTES {
            return Err(format!(
                "Function code is {} bytes. CloudFront functions are limited to {MAX_FUNCTION_CODE_BYTES} bytes",
                self.function_code.len()
            ));
        }
        if self.function_config.comment.len() > 128 {
            return Err("Function comment cannot be longer than 128 characters".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameOption {
    #[serde(rename = "DENY")]
    Deny,
    #[serde(rename = "SAMEORIGIN")]
    SameOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferrerPolicy {
    #[serde(rename = "no-referrer")]
    NoReferrer,
    #[serde(rename = "same-origin")]
    SameOrigin,
    #[serde(rename = "strict-origin-when-cross-origin")]
    StrictOriginWhenCrossOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentTypeOptions {
    pub r#override: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrameOptions {
    pub frame_option: FrameOption,
    pub r#override: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReferrerPolicyConfig {
    pub referrer_policy: ReferrerPolicy,
    pub r#override: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StrictTransportSecurity {
    pub access_control_max_age_sec: u64,
    pub include_subdomains: bool,
    pub r#override: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityHeadersConfig {
    pub content_type_options: ContentTypeOptions,
    pub frame_options: FrameOptions,
    pub referrer_policy: ReferrerPolicyConfig,
    pub strict_transport_security: StrictTransportSecurity,
}

impl SecurityHeadersConfig {
    /// the only header posture we deploy: no framing, no referrer,
    /// nosniff, and HSTS for 30 days including subdomains.
    /// every header overrides whatever the origin sent.
    pub fn strict() -> Self {
        Self {
            content_type_options: ContentTypeOptions { r#override: true },
            frame_options: FrameOptions { frame_option: FrameOption::Deny, r#override: true },
            referrer_policy: ReferrerPolicyConfig {
                referrer_policy: ReferrerPolicy::NoReferrer,
                r#override: true,
            },
            strict_transport_security: StrictTransportSecurity {
                access_control_max_age_sec: HSTS_MAX_AGE.as_secs(),
                include_subdomains: true,
                r#override: true,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseHeadersPolicyConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comment: Option<String>,
    pub security_headers_config: SecurityHeadersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnResponseHeadersPolicy {
    pub response_headers_policy_config: ResponseHeadersPolicyConfig,
}

impl CfnResource for CfnResponseHeadersPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::ResponseHeadersPolicy"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        let name = &self.response_headers_policy_config.name;
        if name.is_empty() || name.len() > 128 {
            return Err(format!("Invalid response headers policy name {:?}. Must be between 1 and 128 characters", name));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(format!("Invalid response headers policy name {:?}. Must only contain letters, numbers, hyphens and underscores", name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceClass {
    #[serde(rename = "PriceClass_100")]
    PriceClass100,
    #[serde(rename = "PriceClass_200")]
    PriceClass200,
    #[serde(rename = "PriceClass_All")]
    PriceClassAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewerProtocolPolicy {
    #[serde(rename = "allow-all")]
    AllowAll,
    #[serde(rename = "https-only")]
    HttpsOnly,
    #[serde(rename = "redirect-to-https")]
    RedirectToHttps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionEventType {
    #[serde(rename = "viewer-request")]
    ViewerRequest,
    #[serde(rename = "viewer-response")]
    ViewerResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAssociation {
    #[serde(rename = "EventType")]
    pub event_type: FunctionEventType,
    #[serde(rename = "FunctionARN")]
    pub function_arn: StrVal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultCacheBehavior {
    pub target_origin_id: String,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub cache_policy_id: String,
    pub compress: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub function_associations: Vec<FunctionAssociation>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub response_headers_policy_id: Option<StrVal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3OriginConfig {
    pub origin_access_identity: StrVal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    pub domain_name: StrVal,
    pub id: String,
    pub s3_origin_config: S3OriginConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewerCertificate {
    pub acm_certificate_arn: StrVal,
    pub ssl_support_method: String,
    pub minimum_protocol_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionConfig {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_root_object: Option<String>,
    pub default_cache_behavior: DefaultCacheBehavior,
    pub enabled: bool,
    pub http_version: String,
    #[serde(rename = "IPV6Enabled")]
    pub ipv6_enabled: bool,
    pub origins: Vec<Origin>,
    pub price_class: PriceClass,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub viewer_certificate: Option<ViewerCertificate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnDistribution {
    pub distribution_config: DistributionConfig,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
}

impl CfnResource for CfnDistribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        let config = &self.distribution_config;
        if config.origins.is_empty() {
            return Err("Must provide at least one origin to cloudfront distribution".into());
        }
        let target = &config.default_cache_behavior.target_origin_id;
        if !config.origins.iter().any(|o| &o.id == target) {
            return Err(format!("Default behavior targets unknown origin '{target}'"));
        }
        if !config.aliases.is_empty() && config.viewer_certificate.is_none() {
            return Err("A distribution with aliases must have a viewer certificate".into());
        }
        if let Some(root) = &config.default_root_object {
            if root.starts_with('/') {
                return Err(format!("Default root object '{root}' must not start with '/'"));
            }
        }
        let associations = &config.default_cache_behavior.function_associations;
        for (i, assoc) in associations.iter().enumerate() {
            if associations[..i].iter().any(|x| x.event_type == assoc.event_type) {
                return Err(format!("Only one function can be associated with {:?}", assoc.event_type));
            }
        }
        Ok(())
    }
    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        Some(&mut self.tags)
    }
}

pub struct EdgeFunctionProps {
    pub function_name: String,
    pub comment: String,
    /// local path of the javascript file. its contents are inlined into the template.
    pub code_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeFunctionHandle {
    logical_id: String,
}

impl EdgeFunctionHandle {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn function_arn(&self) -> Value {
        get_att(&self.logical_id, "FunctionARN")
    }
}

pub fn add_edge_function(stack: &mut Stack, logical_id: &str, props: EdgeFunctionProps) -> Result<EdgeFunctionHandle> {
    let EdgeFunctionProps { function_name, comment, code_path } = props;
    let function_code = std::fs::read_to_string(&code_path).map_err(|e| {
        StackError::Configuration(format!("Failed to read edge function code {:?}\n{e}", code_path))
    })?;
    tracing::info!(logical_id, function_name = %function_name, code_path = ?code_path, "declaring edge function");
    let function = CfnEdgeFunction {
        name: function_name,
        auto_publish: true,
        function_code,
        function_config: FunctionConfig { comment, runtime: FunctionRuntimeVersion::Js1 },
    };
    stack.add_resource(Resource::new(logical_id, function))?;
    Ok(EdgeFunctionHandle { logical_id: logical_id.to_string() })
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadersPolicyHandle {
    logical_id: String,
}

impl HeadersPolicyHandle {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn policy_id(&self) -> Value {
        get_ref(&self.logical_id)
    }
}

/// declares the response headers policy. The header values are not configurable,
/// only the policy name is.
pub fn add_security_headers_policy(stack: &mut Stack, logical_id: &str, name: &str) -> Result<HeadersPolicyHandle> {
    tracing::info!(logical_id, name, hsts_max_age_secs = HSTS_MAX_AGE.as_secs(), "declaring security headers policy");
    let policy = CfnResponseHeadersPolicy {
        response_headers_policy_config: ResponseHeadersPolicyConfig {
            name: name.to_string(),
            comment: Some("security headers for every response".into()),
            security_headers_config: SecurityHeadersConfig::strict(),
        },
    };
    stack.add_resource(Resource::new(logical_id, policy))?;
    Ok(HeadersPolicyHandle { logical_id: logical_id.to_string() })
}

pub struct DistributionProps<'a> {
    pub certificate: &'a CertificateHandle,
    pub bucket: &'a BucketHandle,
    pub edge_function: &'a EdgeFunctionHandle,
    pub headers_policy: &'a HeadersPolicyHandle,
    pub domain_names: Vec<String>,
    pub default_root_object: String,
    pub price_class: PriceClass,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionHandle {
    logical_id: String,
}

impl DistributionHandle {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn distribution_id(&self) -> Value {
        get_ref(&self.logical_id)
    }

    /// the generated `dxxxxxxxx.cloudfront.net` name
    pub fn domain_name(&self) -> Value {
        get_att(&self.logical_id, "DomainName")
    }
}

/// declares the distribution along with what it needs to read from a private bucket:
/// - an origin access identity
/// - the bucket policy granting that identity read access (and denying non TLS
///   requests when the bucket enforces SSL)
///
/// the default behavior always redirects http viewers to https.
pub fn add_distribution(stack: &mut Stack, logical_id: &str, props: DistributionProps) -> Result<DistributionHandle> {
    let DistributionProps {
        certificate, bucket, edge_function, headers_policy,
        domain_names, default_root_object, price_class, comment,
    } = props;

    let logical_oai_name = format!("{logical_id}OriginAccessIdentity");
    let oai = CfnOriginAccessIdentity {
        cloud_front_origin_access_identity_config: OriginAccessIdentityConfig {
            comment: format!("Identity for {}", bucket.logical_id()),
        },
    };
    stack.add_resource(Resource::new(&logical_oai_name, oai))?;

    let mut statements = vec![];
    if bucket.enforce_ssl() {
        statements.push(bucket.ssl_only_statement());
    }
    statements.push(PolicyStatement {
        effect: Effect::Allow,
        principal: Some(serde_json::json!({ "CanonicalUser": get_att(&logical_oai_name, "S3CanonicalUserId") })),
        action: vec!["s3:GetObject".into()],
        resource: vec![bucket.objects_arn()],
        condition: None,
    });
    add_bucket_policy(stack, &format!("{}Policy", bucket.logical_id()), bucket, statements)?;

    let origin_id = "origin1";
    let origin = Origin {
        domain_name: bucket.regional_domain_name().into(),
        id: origin_id.into(),
        s3_origin_config: S3OriginConfig {
            origin_access_identity: join("", vec![
                Value::String("origin-access-identity/cloudfront/".into()),
                get_ref(&logical_oai_name),
            ]).into(),
        },
    };
    tracing::info!(logical_id, aliases = ?domain_names, price_class = ?price_class, "declaring distribution");
    let distribution = CfnDistribution {
        distribution_config: DistributionConfig {
            aliases: domain_names,
            comment: Some(comment),
            default_root_object: Some(default_root_object),
            default_cache_behavior: DefaultCacheBehavior {
                target_origin_id: origin_id.into(),
                viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
                cache_policy_id: CACHING_OPTIMIZED_POLICY_ID.into(),
                compress: true,
                function_associations: vec![FunctionAssociation {
                    event_type: FunctionEventType::ViewerRequest,
                    function_arn: edge_function.function_arn().into(),
                }],
                response_headers_policy_id: Some(headers_policy.policy_id().into()),
            },
            enabled: true,
            http_version: "http2".into(),
            ipv6_enabled: true,
            origins: vec![origin],
            price_class,
            viewer_certificate: Some(ViewerCertificate {
                acm_certificate_arn: certificate.certificate_arn().into(),
                ssl_support_method: "sni-only".into(),
                minimum_protocol_version: "TLSv1.2_2021".into(),
            }),
        },
        tags: vec![],
    };
    stack.add_resource(Resource::new(logical_id, distribution))?;
    Ok(DistributionHandle { logical_id: logical_id.to_string() })
}
