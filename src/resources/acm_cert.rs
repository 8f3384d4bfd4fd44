use super::*;
use crate::errors::Result;
use crate::stack::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateValidationMethod {
    #[serde(rename = "DNS")]
    Dns,
    #[serde(rename = "EMAIL")]
    Email,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DomainValidationOption {
    pub domain_name: String,
    pub hosted_zone_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnCertificate {
    pub domain_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subject_alternative_names: Vec<String>,
    pub validation_method: CertificateValidationMethod,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub domain_validation_options: Vec<DomainValidationOption>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<Tag>,
}

/// the domain must be fully qualified. Can have 1 optional wildcard,
/// which must be the first label.
/// Examples of valid values:
/// - www.mysite.com
/// - mysite.com
/// - *.mysite.com
/// Examples of invalid values:
/// - *.something.*.mysite.com
/// - cannotendwithdot.com.
pub fn verify_certificate_domain(domain_name: &str) -> Option<String> {
    if domain_name.is_empty() {
        return Some("Must provide a domain name".into());
    }
    if domain_name.ends_with('.') {
        return Some(format!("Domain name {} cannot end with a dot", domain_name));
    }
    if !domain_name.contains('.') {
        return Some(format!("Domain name {} must be fully qualified", domain_name));
    }
    if domain_name.contains('*') {
        if domain_name.matches('*').count() > 1 {
            return Some(format!("Must only provide 1 wildcard. {} is invalid.", domain_name));
        }
        if !domain_name.starts_with("*.") {
            return Some(format!(
                "If using a wildcard, it must be the first component of your domain, eg: \"*.something.com\". {} is invalid.",
                domain_name
            ));
        }
    }
    None
}

impl CfnResource for CfnCertificate {
    fn type_string(&self) -> &'static str {
        "AWS::CertificateManager::Certificate"
    }
    fn properties(&self) -> Value {
        to_properties(self)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(err) = verify_certificate_domain(&self.domain_name) {
            return Err(err);
        }
        for name in self.subject_alternative_names.iter() {
            if let Some(err) = verify_certificate_domain(name) {
                return Err(err);
            }
        }
        match self.validation_method {
            CertificateValidationMethod::Dns if self.domain_validation_options.is_empty() => {
                Err("DNS validation requires a hosted zone for at least one domain".into())
            }
            CertificateValidationMethod::Email if !self.domain_validation_options.is_empty() => {
                Err("Email validation cannot insert validation records into a hosted zone".into())
            }
            _ => Ok(()),
        }
    }
    fn tags_mut(&mut self) -> Option<&mut Vec<Tag>> {
        Some(&mut self.tags)
    }
}

/// how ACM should confirm that we own the domain.
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateValidation {
    /// ACM emails the domain's registered contacts. Nothing is written to DNS.
    Email,
    /// ACM validation records are inserted into this existing hosted zone.
    /// requires write access to the zone.
    Dns { hosted_zone: HostedZoneHandle },
}

impl CertificateValidation {
    pub fn from_email() -> Self {
        CertificateValidation::Email
    }

    pub fn from_dns(hosted_zone: &HostedZoneHandle) -> Self {
        CertificateValidation::Dns { hosted_zone: hosted_zone.clone() }
    }
}

pub struct CertificateProps {
    pub domain_name: String,
    pub subject_alternative_names: Vec<String>,
    pub validation: CertificateValidation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateHandle {
    logical_id: String,
}

impl CertificateHandle {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// `Ref` on a certificate returns its ARN
    pub fn certificate_arn(&self) -> Value {
        get_ref(&self.logical_id)
    }
}

pub fn add_certificate(stack: &mut Stack, logical_id: &str, props: CertificateProps) -> Result<CertificateHandle> {
    let CertificateProps { domain_name, subject_alternative_names, validation } = props;
    let (validation_method, domain_validation_options) = match &validation {
        CertificateValidation::Email => (CertificateValidationMethod::Email, vec![]),
        CertificateValidation::Dns { hosted_zone } => {
            let mut all_names = vec![domain_name.clone()];
            all_names.extend(subject_alternative_names.iter().cloned());
            // *.example.com and example.com share the same validation record
            let options = all_names.iter()
                .filter(|name| match name.strip_prefix("*.") {
                    Some(base) => !all_names.iter().any(|x| x == base),
                    None => true,
                })
                .map(|name| DomainValidationOption {
                    domain_name: name.clone(),
                    hosted_zone_id: hosted_zone.hosted_zone_id().to_string(),
                })
                .collect();
            (CertificateValidationMethod::Dns, options)
        }
    };
    tracing::info!(
        logical_id,
        domain_name = %domain_name,
        validation = ?validation_method,
        "declaring certificate"
    );
    let cert = CfnCertificate {
        domain_name,
        subject_alternative_names,
        validation_method,
        domain_validation_options,
        tags: vec![],
    };
    stack.add_resource(Resource::new(logical_id, cert))?;
    Ok(CertificateHandle { logical_id: logical_id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DeployEnvironment;

    fn test_stack() -> Stack {
        Stack::new("test-stack", "", DeployEnvironment::default()).unwrap()
    }

    #[test]
    fn wildcard_must_be_first_label() {
        assert!(verify_certificate_domain("*.example.com").is_none());
        assert!(verify_certificate_domain("www.*.example.com").is_some());
        assert!(verify_certificate_domain("*.*.example.com").is_some());
        assert!(verify_certificate_domain("example.com.").is_some());
        assert!(verify_certificate_domain("localhost").is_some());
    }

    #[test]
    fn dns_validation_skips_wildcard_of_apex() {
        let mut stack = test_stack();
        let zone = HostedZoneHandle::from_attributes("example.com", "Z123");
        add_certificate(&mut stack, "Cert", CertificateProps {
            domain_name: "example.com".into(),
            subject_alternative_names: vec!["www.example.com".into(), "*.example.com".into()],
            validation: CertificateValidation::from_dns(&zone),
        }).unwrap();
        let props = stack.resources()[0].properties.properties();
        assert_eq!(props["ValidationMethod"], "DNS");
        let options = props["DomainValidationOptions"].as_array().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0]["DomainName"], "example.com");
        assert_eq!(options[1]["DomainName"], "www.example.com");
        assert!(options.iter().all(|o| o["HostedZoneId"] == "Z123"));
    }

    #[test]
    fn email_validation_writes_no_records() {
        let mut stack = test_stack();
        add_certificate(&mut stack, "Cert", CertificateProps {
            domain_name: "example.com".into(),
            subject_alternative_names: vec![],
            validation: CertificateValidation::from_email(),
        }).unwrap();
        let props = stack.resources()[0].properties.properties();
        assert_eq!(props["ValidationMethod"], "EMAIL");
        assert!(props.get("DomainValidationOptions").is_none());
    }
}
