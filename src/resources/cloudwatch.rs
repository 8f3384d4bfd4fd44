use super::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnTopic {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
}

impl CfnResource for CfnTopic {
    fn type_string(&self) -> &'static str {
        "AWS::SNS::Topic"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        Some(&mut self.tags)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnSubscription {
    pub protocol: String,
    pub endpoint: String,
    pub topic_arn: StrVal,
}

impl CfnResource for CfnSubscription {
    fn type_string(&self) -> &'static str {
        "AWS::SNS::Subscription"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if self.protocol == "email" {
            let valid = match self.endpoint.split_once('@') {
                Some((user, domain)) => !user.is_empty() && domain.contains('.'),
                None => false,
            };
            if !valid {
                return Err(format!("Invalid alarm email address {:?}", self.endpoint));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDimension {
    pub name: String,
    pub value: StrVal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
    LessThanThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnAlarm {
    pub alarm_description: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<MetricDimension>,
    /// Sum, Average, Maximum...
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub statistic: Option<String>,
    /// percentiles such as p99
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extended_statistic: Option<String>,
    pub period: u32,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparison_operator: ComparisonOperator,
    pub alarm_actions: Vec<Value>,
    pub treat_missing_data: String,
}

impl CfnResource for CfnAlarm {
    fn type_string(&self) -> &'static str {
        "AWS::CloudWatch::Alarm"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        match (&self.statistic, &self.extended_statistic) {
            (Some(_), Some(_)) => Err("Alarm can only use one of Statistic or ExtendedStatistic".into()),
            (None, None) => Err("Alarm must use Statistic or ExtendedStatistic".into()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnDashboard {
    pub dashboard_name: String,
    /// a json document. since widgets reference resources declared in the same stack,
    /// this is usually an `Fn::Sub` over the serialized body.
    pub dashboard_body: StrVal,
}

impl CfnResource for CfnDashboard {
    fn type_string(&self) -> &'static str {
        "AWS::CloudWatch::Dashboard"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        let name = &self.dashboard_name;
        if name.is_empty() || name.len() > 255 {
            return Err(format!("Invalid dashboard name {:?}. Must be between 1 and 255 characters", name));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(format!("Invalid dashboard name {:?}. Must only contain letters, numbers, hyphens and underscores", name));
        }
        Ok(())
    }
}
