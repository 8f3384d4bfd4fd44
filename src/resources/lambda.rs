use super::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RolePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnRole {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    pub assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub managed_policy_arns: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub policies: Vec<RolePolicy>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
}

impl CfnResource for CfnRole {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        Some(&mut self.tags)
    }
}

pub fn basic_execution_policy_arn() -> Value {
    sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionRuntime {
    #[serde(rename = "nodejs18.x")]
    Nodejs18x,
    #[serde(rename = "nodejs20.x")]
    Nodejs20x,
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionCode {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub zip_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub s3_bucket: Option<StrVal>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub s3_key: Option<StrVal>,
}

impl FunctionCode {
    pub fn inline(code: &str) -> Self {
        Self { zip_file: Some(code.to_string()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnFunction {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    pub runtime: FunctionRuntime,
    pub handler: String,
    pub role: StrVal,
    pub code: FunctionCode,
    /// seconds. lambda defaults to 3 when unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memory_size: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
}

impl CfnFunction {
    pub const DEFAULT_TIMEOUT_SECS: u32 = 3;

    pub fn timeout_secs(&self) -> u32 {
        self.timeout.unwrap_or(Self::DEFAULT_TIMEOUT_SECS)
    }
}

impl CfnResource for CfnFunction {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(timeout) = self.timeout {
            if !(1..=900).contains(&timeout) {
                return Err(format!("Invalid timeout {timeout}. Valid values: 1 - 900"));
            }
        }
        if let Some(memory) = self.memory_size {
            if !(128..=10240).contains(&memory) {
                return Err(format!("Invalid memory size {memory}. Valid values: 128 - 10240"));
            }
        }
        match (&self.code.zip_file, &self.code.s3_bucket) {
            (Some(code), None) if code.len() > 4096 => {
                Err("Inline function code is limited to 4096 characters".into())
            }
            (None, None) => Err("Must provide either inline code or an S3 location".into()),
            _ => Ok(()),
        }
    }
    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        Some(&mut self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(timeout: Option<u32>) -> CfnFunction {
        CfnFunction {
            description: None,
            runtime: FunctionRuntime::Nodejs20x,
            handler: "index.handler".into(),
            role: get_att("Role", "Arn").into(),
            code: FunctionCode::inline("exports.handler = async () => {}"),
            timeout,
            memory_size: None,
            tags: vec![],
        }
    }

    #[test]
    fn timeout_defaults_to_lambda_default() {
        assert_eq!(function(None).timeout_secs(), 3);
        assert_eq!(function(Some(60)).timeout_secs(), 60);
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        assert!(function(Some(0)).validate().is_err());
        assert!(function(Some(901)).validate().is_err());
        assert!(function(Some(900)).validate().is_ok());
    }

    #[test]
    fn runtime_serializes_with_dot() {
        let props = function(None).properties();
        assert_eq!(props["Runtime"], "nodejs20.x");
        assert_eq!(props["Role"]["Fn::GetAtt"][0], "Role");
        assert!(props.get("Timeout").is_none());
    }
}
