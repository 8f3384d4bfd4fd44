use std::path::PathBuf;

use crate::context::{DeployEnvironment, SiteProps};
use crate::deployment::add_content_deployment;
use crate::errors::Result;
use crate::monitoring::{watch_scope, MonitoringConfig, MonitoringHandle};
use crate::resources::*;
use crate::stack::{apply_tags, SavedStack, Stack};

/// cloudfront only accepts certificates issued in this region
pub const CERTIFICATE_REGION: &str = "us-east-1";

/// local files that end up in the stack
#[derive(Debug, Clone)]
pub struct SitePaths {
    pub assets_dir: PathBuf,
    pub edge_function: PathBuf,
}

impl Default for SitePaths {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("static"),
            edge_function: PathBuf::from("cf-functions/redirect.js"),
        }
    }
}

pub fn stack_name(namespace: &str) -> String {
    format!("{namespace}-stack")
}

/// `www.example.com` -> `wwwexamplecom_dashboard`
pub fn dashboard_name(domain_name_www: &str) -> String {
    format!("{}_dashboard", domain_name_www.replace('.', ""))
}

/// the declared site along with the handles of every step
pub struct StaticSiteStack {
    pub stack: Stack,
    pub hosted_zone: HostedZoneHandle,
    pub certificate: CertificateHandle,
    pub bucket: BucketHandle,
    pub edge_function: EdgeFunctionHandle,
    pub headers_policy: HeadersPolicyHandle,
    pub distribution: DistributionHandle,
    pub record_names: Vec<String>,
    pub monitoring: MonitoringHandle,
}

impl StaticSiteStack {
    /// runs every step in order. Each step only gets the handles of the steps before it.
    pub fn build(props: &SiteProps, environment: DeployEnvironment, paths: &SitePaths) -> Result<Self> {
        match environment.region.as_deref() {
            Some(region) if region != CERTIFICATE_REGION => tracing::warn!(
                region,
                "cloudfront requires its certificate in {CERTIFICATE_REGION}. deploying this stack elsewhere will fail"
            ),
            None => tracing::warn!("no region configured, the default region of the aws profile will be used"),
            _ => {}
        }
        let ns = &props.namespace;
        let root = &props.domain_name_root;
        let www = &props.domain_name_www;
        let mut stack = Stack::new(
            stack_name(ns),
            format!("{root} - Static Site using S3, CloudFront and Route53"),
            environment,
        )?;

        let hosted_zone = HostedZoneHandle::from_attributes(root, &props.domain_name_id);

        let validation = if props.email_validation {
            CertificateValidation::from_email()
        } else {
            CertificateValidation::from_dns(&hosted_zone)
        };
        let certificate = add_certificate(&mut stack, "SiteCertificate", CertificateProps {
            domain_name: root.clone(),
            subject_alternative_names: vec![www.clone(), format!("*.{root}")],
            validation,
        })?;

        let bucket = add_bucket(&mut stack, "SiteBucket", BucketProps {
            bucket_name: www.clone(),
            enforce_ssl: true,
            versioned: true,
        })?;

        let edge_function = add_edge_function(&mut stack, "RedirectFunction", EdgeFunctionProps {
            function_name: format!("redirect_uri_{ns}"),
            comment: format!("Redirect and rewrite index.html for {ns}"),
            code_path: paths.edge_function.clone(),
        })?;

        let headers_policy = add_security_headers_policy(
            &mut stack,
            "SecurityHeadersPolicy",
            &format!("{ns}-security-headers"),
        )?;

        let distribution = add_distribution(&mut stack, "SiteDistribution", DistributionProps {
            certificate: &certificate,
            bucket: &bucket,
            edge_function: &edge_function,
            headers_policy: &headers_policy,
            domain_names: vec![root.clone(), www.clone()],
            default_root_object: props.default_root_object.clone(),
            price_class: PriceClass::PriceClass100,
            comment: ns.clone(),
        })?;

        add_content_deployment(&mut stack, &bucket, &distribution, &paths.assets_dir)?;

        let record_names = vec![
            add_distribution_alias_record(&mut stack, "SiteAliasRecord", &hosted_zone, None, &distribution)?,
            add_distribution_alias_record(&mut stack, "SiteWwwAliasRecord", &hosted_zone, Some(www.as_str()), &distribution)?,
        ];

        let monitoring = watch_scope(&mut stack, &MonitoringConfig {
            alarm_email: props.mon_email_address.clone(),
            dashboard_name: dashboard_name(www),
        })?;

        stack.add_output("SiteBucketName", "name of the bucket holding the site", bucket.bucket_name())?;
        stack.add_output("DistributionId", "id of the cloudfront distribution", distribution.distribution_id())?;
        stack.add_output("DistributionDomainName", "cloudfront domain name of the site", distribution.domain_name())?;
        stack.add_output("CertificateArn", "arn of the site certificate", certificate.certificate_arn())?;

        let tagged = apply_tags(stack.resources_mut(), &[
            Tag::new("project", ns),
            Tag::new("website", format!("{ns}.me")),
        ]);
        tracing::info!(stack = stack.name(), tagged, "declared static site");

        Ok(Self {
            stack,
            hosted_zone,
            certificate,
            bucket,
            edge_function,
            headers_policy,
            distribution,
            record_names,
            monitoring,
        })
    }

    pub fn synth(&self) -> Result<SavedStack> {
        self.stack.synth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_derive_from_context() {
        assert_eq!(stack_name("example"), "example-stack");
        assert_eq!(dashboard_name("www.example.com"), "wwwexamplecom_dashboard");
    }

    #[test]
    fn default_paths() {
        let paths = SitePaths::default();
        assert_eq!(paths.assets_dir, PathBuf::from("static"));
        assert_eq!(paths.edge_function, PathBuf::from("cf-functions/redirect.js"));
    }
}
