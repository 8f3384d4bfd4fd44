use super::*;
use crate::errors::Result;
use crate::stack::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SseAlgorithm {
    /// S3 managed keys (SSE-S3)
    #[serde(rename = "AES256")]
    Aes256,
    #[serde(rename = "aws:kms")]
    Kms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSideEncryptionByDefault {
    #[serde(rename = "SSEAlgorithm")]
    pub sse_algorithm: SseAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerSideEncryptionRule {
    pub server_side_encryption_by_default: ServerSideEncryptionByDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketEncryption {
    pub server_side_encryption_configuration: Vec<ServerSideEncryptionRule>,
}

impl BucketEncryption {
    pub fn s3_managed() -> Self {
        Self {
            server_side_encryption_configuration: vec![ServerSideEncryptionRule {
                server_side_encryption_by_default: ServerSideEncryptionByDefault {
                    sse_algorithm: SseAlgorithm::Aes256,
                },
            }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlockConfiguration {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockConfiguration {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }

    pub fn is_fully_blocked(&self) -> bool {
        *self == Self::block_all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    Enabled,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersioningConfiguration {
    pub status: VersioningStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnBucket {
    pub bucket_name: String,
    pub bucket_encryption: BucketEncryption,
    pub public_access_block_configuration: PublicAccessBlockConfiguration,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub versioning_configuration: Option<VersioningConfiguration>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
}

impl CfnResource for CfnBucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(err) = verify_bucket_name(&self.bucket_name) {
            return Err(err);
        }
        if !self.public_access_block_configuration.is_fully_blocked() {
            return Err("Site buckets must block all public access".into());
        }
        Ok(())
    }
    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        Some(&mut self.tags)
    }
}

/// bucket names are global, and follow these rules:
/// https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html
pub fn verify_bucket_name(name: &str) -> Option<String> {
    let restriction = "Must be between 3 and 63 characters, only contain lowercase letters, numbers, dots and hyphens, and begin and end with a letter or number.";
    if name.len() < 3 || name.len() > 63 {
        return Some(format!("Invalid bucket name {:?}. Must be between 3 and 63 characters", name));
    }
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !name.chars().all(|c| valid_char(c) || c == '.' || c == '-') {
        return Some(format!("Invalid bucket name {:?}. {}", name, restriction));
    }
    let first_last_ok = name.chars().next().map(valid_char).unwrap_or(false)
        && name.chars().last().map(valid_char).unwrap_or(false);
    if !first_last_ok {
        return Some(format!("Invalid bucket name {:?}. {}", name, restriction));
    }
    if name.contains("..") {
        return Some(format!("Invalid bucket name {:?}. May not contain two consecutive dots", name));
    }
    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Some(format!("Invalid bucket name {:?}. Must not be formatted as an IP address", name));
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub principal: Option<Value>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub resource: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub condition: Option<Value>,
}

impl PolicyStatement {
    pub fn allow<S: AsRef<str>>(actions: &[S], resource: Vec<Value>) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resource,
            condition: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self { version: "2012-10-17".into(), statement }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnBucketPolicy {
    pub bucket: StrVal,
    pub policy_document: PolicyDocument,
}

impl CfnResource for CfnBucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if self.policy_document.statement.is_empty() {
            return Err("Bucket policy must contain at least one statement".into());
        }
        Ok(())
    }
}

/// custom resource that empties the bucket (every object version and delete marker)
/// when the stack gets deleted. without it cloudformation refuses to delete a bucket
/// that still has objects in it.
pub struct CleanupResource {
    pub lambda_logical_id: String,
    pub bucket_logical_id: String,
}

impl CfnResource for CleanupResource {
    fn type_string(&self) -> &'static str {
        "Custom::cleanupbucket"
    }
    fn properties(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("ServiceToken".to_string(), get_att(&self.lambda_logical_id, "Arn"));
        map.insert("BucketName".to_string(), get_ref(&self.bucket_logical_id));
        Value::Object(map)
    }
}

const CLEANUP_FUNCTION_CODE: &str = r#"const { S3Client, ListObjectVersionsCommand, DeleteObjectsCommand } = require('@aws-sdk/client-s3');
const response = require('cfn-response');
const s3 = new S3Client({});
async function emptyBucket(bucket) {
    let keyMarker;
    let versionIdMarker;
    let truncated = true;
    while (truncated) {
        const page = await s3.send(new ListObjectVersionsCommand({ Bucket: bucket, KeyMarker: keyMarker, VersionIdMarker: versionIdMarker }));
        const objects = [...(page.Versions || []), ...(page.DeleteMarkers || [])]
            .map((o) => ({ Key: o.Key, VersionId: o.VersionId }));
        if (objects.length > 0) {
            await s3.send(new DeleteObjectsCommand({ Bucket: bucket, Delete: { Objects: objects, Quiet: true } }));
        }
        truncated = page.IsTruncated;
        keyMarker = page.NextKeyMarker;
        versionIdMarker = page.NextVersionIdMarker;
    }
}
exports.handler = async function (event, context) {
    let responseType = response.SUCCESS;
    if (event.RequestType === 'Delete') {
        try {
            await emptyBucket(event.ResourceProperties.BucketName);
        } catch (err) {
            console.log(`Error emptying bucket: ${err}`);
            responseType = response.FAILED;
        }
    }
    await response.send(event, context, responseType);
};
"#;

pub struct BucketProps {
    /// physical bucket name. must be globally unique.
    pub bucket_name: String,
    /// adds a bucket policy statement denying every request that is not made over TLS.
    /// the statement is written together with the other bucket policy statements when
    /// the bucket gets an origin access identity.
    pub enforce_ssl: bool,
    pub versioned: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketHandle {
    logical_id: String,
    enforce_ssl: bool,
}

impl BucketHandle {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn enforce_ssl(&self) -> bool {
        self.enforce_ssl
    }

    pub fn bucket_name(&self) -> Value {
        get_ref(&self.logical_id)
    }

    pub fn arn(&self) -> Value {
        get_att(&self.logical_id, "Arn")
    }

    /// arn that matches every object inside the bucket
    pub fn objects_arn(&self) -> Value {
        sub(&format!("${{{}.Arn}}/*", self.logical_id))
    }

    pub fn regional_domain_name(&self) -> Value {
        get_att(&self.logical_id, "RegionalDomainName")
    }

    /// deny statement for any request where aws:SecureTransport is false
    pub fn ssl_only_statement(&self) -> PolicyStatement {
        PolicyStatement {
            effect: Effect::Deny,
            principal: Some(serde_json::json!({ "AWS": "*" })),
            action: vec!["s3:*".into()],
            resource: vec![self.arn(), self.objects_arn()],
            condition: Some(serde_json::json!({ "Bool": { "aws:SecureTransport": "false" } })),
        }
    }
}

/// declares a private, encrypted bucket that is deleted (contents included) when the
/// stack is deleted. Along with the bucket, we declare the cleanup resources:
/// - an IAM role allowed to list and delete every object version in the bucket
/// - an inline lambda function that empties the bucket
/// - a custom resource that invokes the lambda on stack deletion
pub fn add_bucket(stack: &mut Stack, logical_id: &str, props: BucketProps) -> Result<BucketHandle> {
    let BucketProps { bucket_name, enforce_ssl, versioned } = props;
    tracing::info!(logical_id, bucket_name = %bucket_name, enforce_ssl, versioned, "declaring bucket");
    let bucket = CfnBucket {
        bucket_name,
        bucket_encryption: BucketEncryption::s3_managed(),
        public_access_block_configuration: PublicAccessBlockConfiguration::block_all(),
        versioning_configuration: versioned.then_some(VersioningConfiguration {
            status: VersioningStatus::Enabled,
        }),
        tags: vec![],
    };
    stack.add_resource(Resource::new(logical_id, bucket).with_deletion_policy(DeletionPolicy::Delete))?;
    let handle = BucketHandle { logical_id: logical_id.to_string(), enforce_ssl };

    let logical_role_name = format!("{logical_id}CleanupRole");
    let role = CfnRole {
        description: Some(format!("empties {logical_id} before the stack deletes it")),
        assume_role_policy_document: PolicyDocument::new(vec![PolicyStatement {
            effect: Effect::Allow,
            principal: Some(serde_json::json!({ "Service": "lambda.amazonaws.com" })),
            action: vec!["sts:AssumeRole".into()],
            resource: vec![],
            condition: None,
        }]),
        managed_policy_arns: vec![basic_execution_policy_arn()],
        policies: vec![RolePolicy {
            policy_name: "empty-bucket".into(),
            policy_document: PolicyDocument::new(vec![
                PolicyStatement::allow(&["s3:ListBucket", "s3:ListBucketVersions"], vec![handle.arn()]),
                PolicyStatement::allow(&["s3:DeleteObject", "s3:DeleteObjectVersion"], vec![handle.objects_arn()]),
            ]),
        }],
        tags: vec![],
    };
    stack.add_resource(Resource::new(&logical_role_name, role))?;

    let logical_fn_name = format!("{logical_id}CleanupFunction");
    let cleanup_function = CfnFunction {
        description: Some(format!("empties {logical_id} on stack deletion")),
        runtime: FunctionRuntime::Nodejs20x,
        handler: "index.handler".into(),
        role: get_att(&logical_role_name, "Arn").into(),
        code: FunctionCode::inline(CLEANUP_FUNCTION_CODE),
        timeout: Some(900),
        memory_size: None,
        tags: vec![],
    };
    stack.add_resource(Resource::new(&logical_fn_name, cleanup_function))?;

    let cleanup = CleanupResource {
        lambda_logical_id: logical_fn_name,
        bucket_logical_id: logical_id.to_string(),
    };
    stack.add_resource(Resource::new(&format!("{logical_id}Cleanup"), cleanup))?;
    Ok(handle)
}

/// a bucket can only have one policy, so every statement for it is written at once.
pub fn add_bucket_policy(
    stack: &mut Stack,
    logical_id: &str,
    bucket: &BucketHandle,
    statements: Vec<PolicyStatement>,
) -> Result<()> {
    let policy = CfnBucketPolicy {
        bucket: bucket.bucket_name().into(),
        policy_document: PolicyDocument::new(statements),
    };
    stack.add_resource(Resource::new(logical_id, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DeployEnvironment;

    #[test]
    fn compile_error_on_invalid_name() {
        assert!(verify_bucket_name("www.example.com").is_none());
        assert!(verify_bucket_name("my-site-bucket").is_none());
        assert!(verify_bucket_name("something..exact").unwrap().contains("May not contain two consecutive dots"));
        assert!(verify_bucket_name("ab").unwrap().contains("Must be between 3 and 63 characters"));
        assert!(verify_bucket_name(&"a".repeat(64)).unwrap().contains("Must be between 3 and 63 characters"));
        assert!(verify_bucket_name("Uppercase").is_some());
        assert!(verify_bucket_name("-leading").is_some());
        assert!(verify_bucket_name("trailing.").is_some());
        assert!(verify_bucket_name("192.168.1.1").is_some());
    }

    #[test]
    fn bucket_is_private_encrypted_and_deleted_with_stack() {
        let mut stack = Stack::new("test-stack", "", DeployEnvironment::default()).unwrap();
        let handle = add_bucket(&mut stack, "SiteBucket", BucketProps {
            bucket_name: "www.example.com".into(),
            enforce_ssl: true,
            versioned: true,
        }).unwrap();
        assert!(handle.enforce_ssl());
        let bucket = &stack.resources()[0];
        assert_eq!(bucket.type_string(), "AWS::S3::Bucket");
        assert_eq!(bucket.deletion_policy, Some(DeletionPolicy::Delete));
        let props = bucket.properties.properties();
        assert_eq!(props["BucketName"], "www.example.com");
        assert_eq!(props["VersioningConfiguration"]["Status"], "Enabled");
        assert_eq!(
            props["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"]["SSEAlgorithm"],
            "AES256"
        );
        for key in ["BlockPublicAcls", "BlockPublicPolicy", "IgnorePublicAcls", "RestrictPublicBuckets"] {
            assert_eq!(props["PublicAccessBlockConfiguration"][key], true);
        }
        let types: Vec<&str> = stack.resources().iter().map(|r| r.type_string()).collect();
        assert_eq!(types, vec!["AWS::S3::Bucket", "AWS::IAM::Role", "AWS::Lambda::Function", "Custom::cleanupbucket"]);
    }

    #[test]
    fn unversioned_bucket_omits_versioning() {
        let mut stack = Stack::new("test-stack", "", DeployEnvironment::default()).unwrap();
        add_bucket(&mut stack, "SiteBucket", BucketProps {
            bucket_name: "www.example.com".into(),
            enforce_ssl: false,
            versioned: false,
        }).unwrap();
        let props = stack.resources()[0].properties.properties();
        assert!(props.get("VersioningConfiguration").is_none());
    }

    #[test]
    fn ssl_statement_denies_insecure_transport() {
        let handle = BucketHandle { logical_id: "SiteBucket".into(), enforce_ssl: true };
        let statement = serde_json::to_value(handle.ssl_only_statement()).unwrap();
        assert_eq!(statement["Effect"], "Deny");
        assert_eq!(statement["Condition"]["Bool"]["aws:SecureTransport"], "false");
        assert_eq!(statement["Resource"][1]["Fn::Sub"], "${SiteBucket.Arn}/*");
    }
}
