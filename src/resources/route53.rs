use super::*;
use crate::errors::Result;
use crate::stack::Stack;

/// an existing hosted zone. we only ever reference it, it is never declared in the template.
#[derive(Debug, Clone, PartialEq)]
pub struct HostedZoneHandle {
    zone_name: String,
    hosted_zone_id: String,
}

impl HostedZoneHandle {
    pub fn from_attributes<N: AsRef<str>, I: AsRef<str>>(zone_name: N, hosted_zone_id: I) -> Self {
        let zone_name = zone_name.as_ref().trim_end_matches('.').to_string();
        // accept both "Z123" and "/hostedzone/Z123"
        let hosted_zone_id = hosted_zone_id.as_ref().trim_start_matches("/hostedzone/").to_string();
        Self { zone_name, hosted_zone_id }
    }

    pub fn zone_name(&self) -> &str {
        &self.zone_name
    }

    pub fn hosted_zone_id(&self) -> &str {
        &self.hosted_zone_id
    }

    /// fully qualified record name (ending in a dot) for a record inside this zone.
    /// `None` is the zone apex.
    pub fn record_name(&self, record_name: Option<&str>) -> String {
        match record_name {
            None | Some("") => format!("{}.", self.zone_name),
            Some(name) => {
                let name = name.trim_end_matches('.');
                if name == self.zone_name || name.ends_with(&format!(".{}", self.zone_name)) {
                    format!("{name}.")
                } else {
                    format!("{name}.{}.", self.zone_name)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "CNAME")]
    Cname,
    #[serde(rename = "MX")]
    Mx,
    #[serde(rename = "TXT")]
    Txt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasTarget {
    #[serde(rename = "DNSName")]
    pub dns_name: StrVal,
    #[serde(rename = "HostedZoneId")]
    pub hosted_zone_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnRecordSet {
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: RecordType,
    pub hosted_zone_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias_target: Option<AliasTarget>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub comment: Option<String>,
}

impl CfnResource for CfnRecordSet {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if !self.name.ends_with('.') {
            return Err(format!("Record name {} must be fully qualified (end in a dot)", self.name));
        }
        if self.hosted_zone_id.is_empty() {
            return Err("Record must reference a hosted zone id".into());
        }
        if self.alias_target.is_none() {
            return Err("Only alias records are supported".into());
        }
        Ok(())
    }
}

/// declares an `A` alias record in an existing zone pointing at a cloudfront distribution.
/// `record_name` of `None` targets the zone apex.
pub fn add_distribution_alias_record(
    stack: &mut Stack,
    logical_id: &str,
    zone: &HostedZoneHandle,
    record_name: Option<&str>,
    distribution: &DistributionHandle,
) -> Result<String> {
    let name = zone.record_name(record_name);
    tracing::info!(logical_id, name = %name, zone = zone.zone_name(), "declaring alias record");
    let record = CfnRecordSet {
        name: name.clone(),
        record_type: RecordType::A,
        hosted_zone_id: zone.hosted_zone_id().to_string(),
        alias_target: Some(AliasTarget {
            dns_name: distribution.domain_name().into(),
            hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.into(),
        }),
        comment: None,
    };
    stack.add_resource(Resource::new(logical_id, record))?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_names_are_fully_qualified() {
        let zone = HostedZoneHandle::from_attributes("example.com", "/hostedzone/Z123");
        assert_eq!(zone.hosted_zone_id(), "Z123");
        assert_eq!(zone.record_name(None), "example.com.");
        assert_eq!(zone.record_name(Some("www")), "www.example.com.");
        assert_eq!(zone.record_name(Some("www.example.com")), "www.example.com.");
        assert_eq!(zone.record_name(Some("example.com.")), "example.com.");
    }

    #[test]
    fn zone_name_trailing_dot_is_normalized() {
        let zone = HostedZoneHandle::from_attributes("example.com.", "Z123");
        assert_eq!(zone.zone_name(), "example.com");
        assert_eq!(zone.record_name(Some("www")), "www.example.com.");
    }
}
