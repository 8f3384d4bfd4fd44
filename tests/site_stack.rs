use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use static_site_stack::context::{resolve_context, ContextMap, DeployEnvironment, SiteProps};
use static_site_stack::resources::{get_att, get_ref};
use static_site_stack::site_stack::{SitePaths, StaticSiteStack};
use static_site_stack::stack::{SavedStack, SavedTemplate};
use static_site_stack::StackError;

const REDIRECT_JS: &str = include_str!("../cf-functions/redirect.js");

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("static/css")).unwrap();
        std::fs::write(dir.path().join("static/index.html"), "<h1>hello</h1>").unwrap();
        std::fs::write(dir.path().join("static/css/site.css"), "body {}").unwrap();
        std::fs::write(dir.path().join("redirect.js"), REDIRECT_JS).unwrap();
        Self { dir }
    }

    fn paths(&self) -> SitePaths {
        SitePaths {
            assets_dir: self.dir.path().join("static"),
            edge_function: self.dir.path().join("redirect.js"),
        }
    }
}

fn example_context() -> ContextMap {
    match json!({
        "namespace": "example",
        "domain_name_www": "www.example.com",
        "domain_name_root": "example.com",
        "domain_name_id": "Z0123456789",
        "mon_email_address": "ops@example.com",
        "email_validation": false,
    }) {
        Value::Object(m) => m,
        _ => unreachable!(),
    }
}

fn us_east_1() -> DeployEnvironment {
    DeployEnvironment { account: Some("123456789012".into()), region: Some("us-east-1".into()) }
}

fn synth(ctx: &ContextMap, paths: &SitePaths) -> SavedStack {
    let props = SiteProps::from_context(ctx).unwrap();
    StaticSiteStack::build(&props, us_east_1(), paths).unwrap().synth().unwrap()
}

fn only_of_type<'a>(template: &'a SavedTemplate, ty: &'a str) -> &'a Value {
    let mut found = template.resources_of_type(ty);
    let (_, resource) = found.next().unwrap_or_else(|| panic!("no {ty} in template"));
    assert!(found.next().is_none(), "more than one {ty} in template");
    &resource.properties
}

#[test]
fn declares_each_site_resource_once() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    let t = &saved.template;
    let counts: Vec<(&str, usize)> = [
        "AWS::CertificateManager::Certificate",
        "AWS::S3::Bucket",
        "AWS::CloudFront::Distribution",
        "AWS::CloudFront::Function",
        "AWS::CloudFront::ResponseHeadersPolicy",
        "AWS::Route53::RecordSet",
        "AWS::CloudWatch::Dashboard",
    ].into_iter().map(|ty| (ty, t.count_of_type(ty))).collect();
    assert_eq!(counts, vec![
        ("AWS::CertificateManager::Certificate", 1),
        ("AWS::S3::Bucket", 1),
        ("AWS::CloudFront::Distribution", 1),
        ("AWS::CloudFront::Function", 1),
        ("AWS::CloudFront::ResponseHeadersPolicy", 1),
        ("AWS::Route53::RecordSet", 2),
        ("AWS::CloudWatch::Dashboard", 1),
    ]);
    // the zone is imported, never declared
    assert_eq!(t.count_of_type("AWS::Route53::HostedZone"), 0);
    assert_eq!(saved.stack_name, "example-stack");
    assert_eq!(t.description, "example.com - Static Site using S3, CloudFront and Route53");
}

#[test]
fn bucket_is_private_and_removed_with_the_stack() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    let t = &saved.template;
    let bucket = &t.resources["SiteBucket"];
    assert_eq!(bucket.properties["PublicAccessBlockConfiguration"], json!({
        "BlockPublicAcls": true,
        "BlockPublicPolicy": true,
        "IgnorePublicAcls": true,
        "RestrictPublicBuckets": true,
    }));
    assert_eq!(bucket.properties["BucketName"], "www.example.com");
    assert_eq!(
        bucket.properties["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]["ServerSideEncryptionByDefault"]["SSEAlgorithm"],
        "AES256"
    );
    let json = serde_json::to_value(t).unwrap();
    assert_eq!(json["Resources"]["SiteBucket"]["DeletionPolicy"], "Delete");

    // contents are emptied before the bucket is deleted
    let cleanup = only_of_type(t, "Custom::cleanupbucket");
    assert_eq!(cleanup["BucketName"], get_ref("SiteBucket"));

    let policy = only_of_type(t, "AWS::S3::BucketPolicy");
    let statements = policy["PolicyDocument"]["Statement"].as_array().unwrap();
    assert_eq!(statements[0]["Effect"], "Deny");
    assert_eq!(statements[0]["Condition"]["Bool"]["aws:SecureTransport"], "false");
    assert_eq!(statements[1]["Action"], json!(["s3:GetObject"]));
}

#[test]
fn certificate_validation_is_email_or_dns() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    let cert = only_of_type(&saved.template, "AWS::CertificateManager::Certificate");
    assert_eq!(cert["ValidationMethod"], "DNS");
    assert!(cert["DomainValidationOptions"].as_array().unwrap().iter().all(|o| o["HostedZoneId"] == "Z0123456789"));

    let ctx = resolve_context(example_context(), &[("email_validation".into(), "true".into())]);
    let saved = synth(&ctx, &fixture.paths());
    let cert = only_of_type(&saved.template, "AWS::CertificateManager::Certificate");
    assert_eq!(cert["ValidationMethod"], "EMAIL");
    assert!(cert.get("DomainValidationOptions").is_none());
}

#[test]
fn viewers_are_redirected_to_https() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    let dist = only_of_type(&saved.template, "AWS::CloudFront::Distribution");
    let config = &dist["DistributionConfig"];
    let behavior = &config["DefaultCacheBehavior"];
    assert_eq!(behavior["ViewerProtocolPolicy"], "redirect-to-https");
    assert_eq!(behavior["CachePolicyId"], "658327ea-f89d-4fab-a63d-7e88639e58f6");
    assert_eq!(behavior["FunctionAssociations"], json!([{
        "EventType": "viewer-request",
        "FunctionARN": get_att("RedirectFunction", "FunctionARN"),
    }]));
    assert_eq!(behavior["ResponseHeadersPolicyId"], get_ref("SecurityHeadersPolicy"));
    assert_eq!(config["Aliases"], json!(["example.com", "www.example.com"]));
    assert_eq!(config["DefaultRootObject"], "index.html");
    assert_eq!(config["PriceClass"], "PriceClass_100");
    assert_eq!(config["Comment"], "example");
    assert_eq!(config["ViewerCertificate"]["AcmCertificateArn"], get_ref("SiteCertificate"));
}

#[test]
fn hsts_is_fixed_regardless_of_context() {
    let fixture = Fixture::new();
    let ctx = resolve_context(example_context(), &[("email_validation".into(), "true".into())]);
    for ctx in [example_context(), ctx] {
        let saved = synth(&ctx, &fixture.paths());
        let policy = only_of_type(&saved.template, "AWS::CloudFront::ResponseHeadersPolicy");
        let hsts = &policy["ResponseHeadersPolicyConfig"]["SecurityHeadersConfig"]["StrictTransportSecurity"];
        assert_eq!(hsts, &json!({
            "AccessControlMaxAgeSec": 2592000,
            "IncludeSubdomains": true,
            "Override": true,
        }));
    }
}

#[test]
fn example_com_end_to_end() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    let t = &saved.template;

    let cert = only_of_type(t, "AWS::CertificateManager::Certificate");
    assert_eq!(cert["DomainName"], "example.com");
    assert_eq!(cert["SubjectAlternativeNames"], json!(["www.example.com", "*.example.com"]));
    assert_eq!(cert["ValidationMethod"], "DNS");

    let records: Vec<(&str, &Value)> = t.resources_of_type("AWS::Route53::RecordSet")
        .map(|(_, r)| (r.properties["Name"].as_str().unwrap(), &r.properties["AliasTarget"]))
        .collect();
    let target = json!({
        "DNSName": get_att("SiteDistribution", "DomainName"),
        "HostedZoneId": "Z2FDTNDATAQYW2",
    });
    assert_eq!(records, vec![("example.com.", &target), ("www.example.com.", &target)]);

    let function = only_of_type(t, "AWS::CloudFront::Function");
    assert_eq!(function["Name"], "redirect_uri_example");
    assert_eq!(function["FunctionConfig"]["Comment"], "Redirect and rewrite index.html for example");
    assert_eq!(function["FunctionCode"], REDIRECT_JS);

    let dashboard = only_of_type(t, "AWS::CloudWatch::Dashboard");
    assert_eq!(dashboard["DashboardName"], "wwwexamplecom_dashboard");

    let outputs: Vec<&String> = t.outputs.keys().collect();
    assert_eq!(outputs, vec!["SiteBucketName", "DistributionId", "DistributionDomainName", "CertificateArn"]);
}

#[test]
fn every_taggable_resource_gets_project_tags() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    for id in ["SiteCertificate", "SiteBucket", "SiteDistribution", "MonitoringAlarmTopic"] {
        let tags = &saved.template.resources[id].properties["Tags"];
        assert_eq!(tags, &json!([
            { "Key": "project", "Value": "example" },
            { "Key": "website", "Value": "example.me" },
        ]), "{id}");
    }
}

#[test]
fn content_deployment_targets_bucket_and_distribution() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    assert_eq!(saved.content_deployments.len(), 1);
    let deployment = &saved.content_deployments[0];
    assert_eq!(deployment.bucket_logical_id, "SiteBucket");
    assert_eq!(deployment.distribution_logical_id, "SiteDistribution");
    assert_eq!(deployment.distribution_paths, vec!["/*".to_string()]);
    assert!(deployment.prune);
    assert_eq!(deployment.source_dir, fixture.dir.path().join("static").canonicalize().unwrap());
}

#[test]
fn synth_writes_template_and_manifest() {
    let fixture = Fixture::new();
    let saved = synth(&example_context(), &fixture.paths());
    let out = fixture.dir.path().join("cdk.out");
    let template_path = saved.write_to_dir(&out).unwrap();
    assert_eq!(template_path, out.join("example-stack.template.json"));

    let template: SavedTemplate = serde_json::from_str(&std::fs::read_to_string(&template_path).unwrap()).unwrap();
    assert_eq!(template, saved.template);
    let manifest: SavedStack = serde_json::from_str(&std::fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest.environment, us_east_1());
    assert_eq!(manifest.content_deployments, saved.content_deployments);
}

#[test]
fn missing_inputs_fail_synthesis() {
    let fixture = Fixture::new();
    let props = SiteProps::from_context(&example_context()).unwrap();

    let paths = SitePaths { assets_dir: PathBuf::from("/does/not/exist"), ..fixture.paths() };
    let err = StaticSiteStack::build(&props, us_east_1(), &paths).err().unwrap();
    assert!(matches!(err, StackError::Configuration(_)), "{err}");

    let paths = SitePaths { edge_function: Path::new("/does/not/exist.js").to_path_buf(), ..fixture.paths() };
    let err = StaticSiteStack::build(&props, us_east_1(), &paths).err().unwrap();
    assert!(matches!(err, StackError::Configuration(_)), "{err}");
}

#[test]
fn invalid_bucket_name_is_rejected() {
    let fixture = Fixture::new();
    let ctx = resolve_context(example_context(), &[("domain_name_www".into(), "WWW..Example.com".into())]);
    let props = SiteProps::from_context(&ctx).unwrap();
    let err = StaticSiteStack::build(&props, us_east_1(), &fixture.paths()).err().unwrap();
    assert!(matches!(err, StackError::Validation { .. }), "{err}");
}

#[test]
fn www_outside_the_hosted_zone_is_rejected() {
    let ctx = resolve_context(example_context(), &[("domain_name_www".into(), "www.other.com".into())]);
    let err = SiteProps::from_context(&ctx).unwrap_err();
    assert!(matches!(err, StackError::Configuration(_)), "{err}");
}
