//! default alarms and a dashboard for everything in a stack.
//!
//! `watch_scope` is a pass over the resources declared so far. Each resource type
//! we know how to watch gets dashboard widgets, and lambda functions also get alarms
//! that notify an email subscription. Resources added after the pass are not watched,
//! so it should run once every other step is done.

use serde_json::{json, Value};

use crate::errors::Result;
use crate::resources::*;
use crate::stack::Stack;

/// lambda duration alarms fire at this percentage of the configured timeout
pub const DURATION_ALARM_PERCENT: u64 = 80;

const ALARM_PERIOD_SECS: u32 = 300;
const WIDGET_WIDTH: u32 = 12;
const WIDGET_HEIGHT: u32 = 6;

pub struct MonitoringConfig {
    pub alarm_email: String,
    pub dashboard_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringHandle {
    dashboard_logical_id: String,
    alarm_logical_ids: Vec<String>,
}

impl MonitoringHandle {
    pub fn dashboard_logical_id(&self) -> &str {
        &self.dashboard_logical_id
    }

    pub fn alarm_logical_ids(&self) -> &[String] {
        &self.alarm_logical_ids
    }
}

/// a dashboard widget before it gets a position on the grid
struct Widget {
    title: String,
    metrics: Vec<Value>,
    stat: &'static str,
    period: u32,
    region: &'static str,
}

/// a resource as seen by the pass: logical id, type, rendered properties
struct Watched {
    logical_id: String,
    ty: &'static str,
    properties: Value,
}

fn lambda_alarms(watched: &Watched, topic_id: &str) -> Vec<(String, CfnAlarm)> {
    let timeout_secs = watched.properties.get("Timeout")
        .and_then(Value::as_u64)
        .unwrap_or(CfnFunction::DEFAULT_TIMEOUT_SECS as u64);
    let id = &watched.logical_id;
    let alarm = |metric: &str, description: String, statistic: Option<&str>, extended: Option<&str>, threshold: f64| CfnAlarm {
        alarm_description: description,
        namespace: "AWS/Lambda".into(),
        metric_name: metric.into(),
        dimensions: vec![MetricDimension { name: "FunctionName".into(), value: get_ref(id).into() }],
        statistic: statistic.map(|s| s.to_string()),
        extended_statistic: extended.map(|s| s.to_string()),
        period: ALARM_PERIOD_SECS,
        evaluation_periods: 1,
        threshold,
        comparison_operator: ComparisonOperator::GreaterThanThreshold,
        alarm_actions: vec![get_ref(topic_id)],
        treat_missing_data: "notBreaching".into(),
    };
    vec![
        (format!("{id}ErrorsAlarm"), alarm("Errors", format!("{id} invocations failed"), Some("Sum"), None, 0.0)),
        (format!("{id}ThrottlesAlarm"), alarm("Throttles", format!("{id} invocations were throttled"), Some("Sum"), None, 0.0)),
        (
            format!("{id}DurationAlarm"),
            alarm(
                "Duration",
                format!("{id} p99 duration is above {DURATION_ALARM_PERCENT}% of its {timeout_secs}s timeout"),
                None,
                Some("p99"),
                (timeout_secs * 1000 * DURATION_ALARM_PERCENT / 100) as f64,
            ),
        ),
    ]
}

fn widgets_for(watched: &Watched) -> Vec<Widget> {
    let id = &watched.logical_id;
    // dashboards take plain names, Fn::Sub resolves them when the body is rendered
    let name = format!("${{{id}}}");
    match watched.ty {
        "AWS::Lambda::Function" => vec![
            Widget {
                title: format!("{id} invocations"),
                metrics: ["Invocations", "Errors", "Throttles"].iter()
                    .map(|m| json!(["AWS/Lambda", m, "FunctionName", name]))
                    .collect(),
                stat: "Sum",
                period: ALARM_PERIOD_SECS,
                region: "${AWS::Region}",
            },
            Widget {
                title: format!("{id} duration"),
                metrics: vec![json!(["AWS/Lambda", "Duration", "FunctionName", name])],
                stat: "p99",
                period: ALARM_PERIOD_SECS,
                region: "${AWS::Region}",
            },
        ],
        // cloudfront publishes its metrics to us-east-1 under the Global region dimension
        "AWS::CloudFront::Distribution" => vec![
            Widget {
                title: format!("{id} requests"),
                metrics: vec![json!(["AWS/CloudFront", "Requests", "DistributionId", name, "Region", "Global"])],
                stat: "Sum",
                period: ALARM_PERIOD_SECS,
                region: "us-east-1",
            },
            Widget {
                title: format!("{id} error rates"),
                metrics: ["4xxErrorRate", "5xxErrorRate"].iter()
                    .map(|m| json!(["AWS/CloudFront", m, "DistributionId", name, "Region", "Global"]))
                    .collect(),
                stat: "Average",
                period: ALARM_PERIOD_SECS,
                region: "us-east-1",
            },
        ],
        // storage metrics are only reported once a day
        "AWS::S3::Bucket" => vec![Widget {
            title: format!("{id} storage"),
            metrics: vec![
                json!(["AWS/S3", "BucketSizeBytes", "BucketName", name, "StorageType", "StandardStorage"]),
                json!(["AWS/S3", "NumberOfObjects", "BucketName", name, "StorageType", "AllStorageTypes"]),
            ],
            stat: "Average",
            period: 86400,
            region: "${AWS::Region}",
        }],
        _ => vec![],
    }
}

fn dashboard_body(widgets: &[Widget]) -> Value {
    let widgets: Vec<Value> = widgets.iter().enumerate().map(|(i, w)| {
        let i = i as u32;
        json!({
            "type": "metric",
            "x": (i % 2) * WIDGET_WIDTH,
            "y": (i / 2) * WIDGET_HEIGHT,
            "width": WIDGET_WIDTH,
            "height": WIDGET_HEIGHT,
            "properties": {
                "title": w.title,
                "view": "timeSeries",
                "metrics": w.metrics,
                "stat": w.stat,
                "period": w.period,
                "region": w.region,
            },
        })
    }).collect();
    json!({ "widgets": widgets })
}

/// declares the alarm topic, its email subscription, default alarms and the dashboard
/// for every resource currently in the stack.
pub fn watch_scope(stack: &mut Stack, config: &MonitoringConfig) -> Result<MonitoringHandle> {
    let watched: Vec<Watched> = stack.resources().iter()
        .map(|r| Watched {
            logical_id: r.name.clone(),
            ty: r.type_string(),
            properties: r.properties.properties(),
        })
        .collect();

    let topic_logical_id = "MonitoringAlarmTopic".to_string();
    stack.add_resource(Resource::new(&topic_logical_id, CfnTopic {
        display_name: Some(format!("{} alarms", config.dashboard_name)),
        tags: vec![],
    }))?;
    stack.add_resource(Resource::new("MonitoringAlarmEmail", CfnSubscription {
        protocol: "email".into(),
        endpoint: config.alarm_email.clone(),
        topic_arn: get_ref(&topic_logical_id).into(),
    }))?;

    let mut alarm_logical_ids = vec![];
    let mut widgets = vec![];
    for resource in watched.iter() {
        if resource.ty == "AWS::Lambda::Function" {
            for (alarm_id, alarm) in lambda_alarms(resource, &topic_logical_id) {
                stack.add_resource(Resource::new(&alarm_id, alarm))?;
                alarm_logical_ids.push(alarm_id);
            }
        }
        let resource_widgets = widgets_for(resource);
        if resource_widgets.is_empty() {
            tracing::debug!(logical_id = %resource.logical_id, ty = resource.ty, "nothing to watch");
        }
        widgets.extend(resource_widgets);
    }

    let body = serde_json::to_string(&dashboard_body(&widgets))?;
    let dashboard_logical_id = "MonitoringDashboard".to_string();
    stack.add_resource(Resource::new(&dashboard_logical_id, CfnDashboard {
        dashboard_name: config.dashboard_name.clone(),
        dashboard_body: sub(&body).into(),
    }))?;
    tracing::info!(
        dashboard = %config.dashboard_name,
        alarms = alarm_logical_ids.len(),
        widgets = widgets.len(),
        "declared monitoring"
    );
    Ok(MonitoringHandle { dashboard_logical_id, alarm_logical_ids })
}
