use std::collections::BTreeMap;

use aws_config::BehaviorVersion;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Stack};

use crate::context::DeployEnvironment;
use crate::errors::{Result, StackError};
use crate::stack::SavedStack;

const POLL_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_millis(700);

/// where a stack is in its lifecycle, as far as waiting on it is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    Complete,
    Deleted,
    /// failed, or rolled back to a previous state
    Failed,
}

pub fn classify_status(status: &str) -> StackPhase {
    match status {
        "DELETE_COMPLETE" => StackPhase::Deleted,
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" => StackPhase::Complete,
        s if s.ends_with("_IN_PROGRESS") => StackPhase::InProgress,
        // ROLLBACK_COMPLETE, UPDATE_ROLLBACK_COMPLETE, *_FAILED, and anything new
        _ => StackPhase::Failed,
    }
}

fn stack_outputs(stack: &Stack) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for output in stack.outputs() {
        if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
            out.insert(key.to_string(), val.to_string());
        }
    }
    out
}

pub async fn does_stack_exist(client: &aws_sdk_cloudformation::Client, name: &str) -> Result<bool> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(_) => Ok(true),
        Err(e) => {
            let e_str = DisplayErrorContext(&e).to_string();
            if e_str.contains("does not exist") {
                return Ok(false);
            }
            Err(StackError::Deploy(e_str))
        }
    }
}

/// `None` if the stack does not exist
pub async fn describe_stack(client: &aws_sdk_cloudformation::Client, name: &str) -> Result<Option<Stack>> {
    match client.describe_stacks().stack_name(name).send().await {
        Ok(d) => Ok(d.stacks().first().cloned()),
        Err(e) => {
            let e_str = DisplayErrorContext(&e).to_string();
            if e_str.contains("does not exist") {
                return Ok(None);
            }
            Err(StackError::Deploy(e_str))
        }
    }
}

/// events come newest first. Returns the oldest `*_FAILED` event, the later ones are usually
/// cancellations it caused.
pub fn first_failure<'a>(events: &[(&'a str, &'a str, Option<&'a str>)]) -> Option<String> {
    events
        .iter()
        .rev()
        .find(|(status, _, _)| status.ends_with("_FAILED"))
        .map(|(status, logical_id, reason)| {
            format!("{logical_id} {status}: {}", reason.unwrap_or("no reason given"))
        })
}

pub async fn first_failure_reason(client: &aws_sdk_cloudformation::Client, stack_id: &str) -> Result<Option<String>> {
    let out = client
        .describe_stack_events()
        .stack_name(stack_id)
        .send()
        .await
        .map_err(|e| StackError::Deploy(DisplayErrorContext(&e).to_string()))?;
    let events: Vec<_> = out
        .stack_events()
        .iter()
        .map(|e| (
            e.resource_status().map(|s| s.as_str()).unwrap_or_default(),
            e.logical_resource_id().unwrap_or_default(),
            e.resource_status_reason(),
        ))
        .collect();
    Ok(first_failure(&events))
}

async fn failure_message(client: &aws_sdk_cloudformation::Client, stack: &Stack, stack_id: &str) -> String {
    let status_reason = stack.stack_status_reason().unwrap_or("Failed to get stack failure reason");
    match first_failure_reason(client, stack_id).await {
        Ok(Some(event)) => format!("{status_reason}\n{event}"),
        Ok(None) => status_reason.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "could not read stack events");
            status_reason.to_string()
        }
    }
}

/// polls until the stack reaches a terminal state and returns its outputs.
/// `stack_id` should be the id returned by create/update, since a stack deleted after a failed
/// create can no longer be described by name.
pub async fn wait_for_output(client: &aws_sdk_cloudformation::Client, stack_id: &str) -> Result<BTreeMap<String, String>> {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let stack = describe_stack(client, stack_id).await?
            .ok_or_else(|| StackError::Deploy(format!("Stack {stack_id} not found")))?;
        let name = stack.stack_name().unwrap_or(stack_id);
        let status = stack.stack_status().map(|s| s.as_str()).unwrap_or_default();
        match classify_status(status) {
            StackPhase::InProgress => {
                tracing::debug!(stack = name, status, "waiting");
            }
            StackPhase::Complete => {
                tracing::info!(stack = name, status, "stack is ready");
                return Ok(stack_outputs(&stack));
            }
            StackPhase::Deleted | StackPhase::Failed => {
                let reason = failure_message(client, &stack, stack_id).await;
                return Err(StackError::Deploy(format!("Stack {name} ended in {status}\n{reason}")));
            }
        }
    }
}

/// returns the id of the stack being created or updated, or `None` when the deployed template
/// is already up to date
pub async fn create_or_update_stack(client: &aws_sdk_cloudformation::Client, name: &str, body: &str) -> Result<Option<String>> {
    let stack_id = if does_stack_exist(client, name).await? {
        tracing::info!(stack = name, "updating stack");
        let res = client
            .update_stack()
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await;
        match res {
            Ok(out) => out.stack_id().map(|id| id.to_string()),
            Err(e) => {
                let e_str = DisplayErrorContext(&e).to_string();
                if e_str.contains("No updates are to be performed") {
                    tracing::info!(stack = name, "no changes to deploy");
                    return Ok(None);
                }
                return Err(StackError::Deploy(e_str));
            }
        }
    } else {
        tracing::info!(stack = name, "creating stack");
        client
            .create_stack()
            .on_failure(OnFailure::Delete)
            .capabilities(Capability::CapabilityNamedIam)
            .capabilities(Capability::CapabilityIam)
            .stack_name(name)
            .template_body(body)
            .send()
            .await
            .map_err(|e| StackError::Deploy(DisplayErrorContext(&e).to_string()))?
            .stack_id()
            .map(|id| id.to_string())
    };
    Ok(Some(stack_id.unwrap_or_else(|| name.to_string())))
}

/// the credentials must belong to the configured account, when one is configured
pub fn verify_account(expected: Option<&str>, actual: Option<&str>) -> Result<()> {
    match (expected, actual) {
        (None, _) => Ok(()),
        (Some(expected), Some(actual)) if expected == actual => Ok(()),
        (Some(expected), Some(actual)) => Err(StackError::Deploy(format!(
            "Credentials belong to account {actual}, but the stack targets account {expected}"
        ))),
        (Some(expected), None) => Err(StackError::Deploy(format!(
            "Could not determine the account of the current credentials, the stack targets account {expected}"
        ))),
    }
}

pub async fn physical_resource_id(
    client: &aws_sdk_cloudformation::Client,
    stack_name: &str,
    logical_id: &str,
) -> Result<String> {
    let out = client
        .describe_stack_resource()
        .stack_name(stack_name)
        .logical_resource_id(logical_id)
        .send()
        .await
        .map_err(|e| StackError::Deploy(DisplayErrorContext(&e).to_string()))?;
    out.stack_resource_detail()
        .and_then(|d| d.physical_resource_id())
        .map(|id| id.to_string())
        .ok_or_else(|| StackError::Deploy(format!("{logical_id} has no physical id in {stack_name}")))
}

/// clients for every service the deploy runtime talks to
pub struct Deployer {
    cloudformation: aws_sdk_cloudformation::Client,
    s3: aws_sdk_s3::Client,
    cloudfront: aws_sdk_cloudfront::Client,
}

impl Deployer {
    /// uses the region of the environment when set, otherwise the aws profile's default.
    /// Fails when the environment names an account other than the one the credentials belong to.
    pub async fn from_environment(environment: &DeployEnvironment) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &environment.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let shared_config = loader.load().await;

        if let Some(account) = &environment.account {
            let identity = aws_sdk_sts::Client::new(&shared_config)
                .get_caller_identity()
                .send()
                .await
                .map_err(|e| StackError::Deploy(aws_sdk_sts::error::DisplayErrorContext(&e).to_string()))?;
            verify_account(Some(account.as_str()), identity.account())?;
            tracing::debug!(account = %account, "credentials match the target account");
        }

        Ok(Self {
            cloudformation: aws_sdk_cloudformation::Client::new(&shared_config),
            s3: aws_sdk_s3::Client::new(&shared_config),
            cloudfront: aws_sdk_cloudfront::Client::new(&shared_config),
        })
    }

    /// deploys the template, then pushes the site contents. Returns the stack outputs.
    pub async fn deploy(&self, saved: &SavedStack) -> Result<BTreeMap<String, String>> {
        let stack_name = &saved.stack_name;
        let template_body = saved.template_body()?;
        let outputs = match create_or_update_stack(&self.cloudformation, stack_name, &template_body).await? {
            Some(stack_id) => wait_for_output(&self.cloudformation, &stack_id).await?,
            None => describe_stack(&self.cloudformation, stack_name).await?
                .map(|s| stack_outputs(&s))
                .unwrap_or_default(),
        };

        for deployment in saved.content_deployments.iter() {
            let bucket_name = physical_resource_id(&self.cloudformation, stack_name, &deployment.bucket_logical_id).await?;
            let distribution_id = physical_resource_id(&self.cloudformation, stack_name, &deployment.distribution_logical_id).await?;
            deployment.run(&self.s3, &self.cloudfront, &bucket_name, &distribution_id).await?;
        }
        Ok(outputs)
    }

    /// deletes the stack and waits until it is gone
    pub async fn destroy(&self, stack_name: &str) -> Result<()> {
        let stack_id = match describe_stack(&self.cloudformation, stack_name).await? {
            Some(stack) => stack.stack_id().unwrap_or(stack_name).to_string(),
            None => {
                tracing::info!(stack = stack_name, "stack does not exist, nothing to destroy");
                return Ok(());
            }
        };
        tracing::info!(stack = stack_name, "deleting stack");
        self.cloudformation
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| StackError::Deploy(DisplayErrorContext(&e).to_string()))?;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let stack = match describe_stack(&self.cloudformation, &stack_id).await? {
                Some(s) => s,
                None => break,
            };
            let status = stack.stack_status().map(|s| s.as_str()).unwrap_or_default();
            match classify_status(status) {
                StackPhase::Deleted => break,
                StackPhase::InProgress => tracing::debug!(stack = stack_name, status, "waiting"),
                StackPhase::Complete | StackPhase::Failed => {
                    let reason = failure_message(&self.cloudformation, &stack, &stack_id).await;
                    return Err(StackError::Deploy(format!("Failed to delete {stack_name}: {status}\n{reason}")));
                }
            }
        }
        tracing::info!(stack = stack_name, "stack deleted");
        Ok(())
    }
}
