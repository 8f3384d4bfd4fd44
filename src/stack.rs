use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::DeployEnvironment;
use crate::deployment::ContentDeployment;
use crate::errors::{Result, StackError};
use crate::resources::{referenced_ids, verify_logical_id, DeletionPolicy, Resource, Tag};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none", default)]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none", default)]
    pub update_replace_policy: Option<DeletionPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description", skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, SavedResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "IndexMap::is_empty", default)]
    pub outputs: IndexMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: "2010-09-09".to_string(),
            description: Default::default(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }

    pub fn count_of_type(&self, ty: &str) -> usize {
        self.resources_of_type(ty).count()
    }
}

/// everything the deploy runtime needs: where to deploy, what to deploy,
/// and which local files to push once the stack exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedStack {
    pub stack_name: String,
    pub environment: DeployEnvironment,
    pub template: SavedTemplate,
    #[serde(default)]
    pub content_deployments: Vec<ContentDeployment>,
}

impl SavedStack {
    /// writes `<stack>.template.json` and `manifest.json` into `out_dir`.
    /// returns the path of the template.
    pub fn write_to_dir(&self, out_dir: &Path) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(out_dir)?;
        let template_path = out_dir.join(format!("{}.template.json", self.stack_name));
        // we make it pretty so if a user needs to look at the stack in Cfn console, it looks nice
        std::fs::write(&template_path, serde_json::to_string_pretty(&self.template)?)?;
        std::fs::write(out_dir.join("manifest.json"), serde_json::to_string_pretty(self)?)?;
        Ok(template_path)
    }

    pub fn template_body(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.template)?)
    }
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> Result<()> {
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || StackError::Configuration(format!("Invalid stack name {}\n{}", stack_name, restriction));
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if stack_name.chars().any(|c| !c.is_ascii_alphanumeric() && c != '-') {
        return Err(invalid());
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    Ok(())
}

/// the set of declared resources, in declaration order. Resources may only
/// reference resources declared before them, which keeps the graph a DAG
/// in the order the steps ran.
pub struct Stack {
    name: String,
    description: String,
    environment: DeployEnvironment,
    resources: Vec<Resource>,
    outputs: IndexMap<String, ResourceOutput>,
    content_deployments: Vec<ContentDeployment>,
}

impl Stack {
    pub fn new<N: AsRef<str>, D: AsRef<str>>(name: N, description: D, environment: DeployEnvironment) -> Result<Self> {
        validate_stack_name(name.as_ref())?;
        Ok(Self {
            name: name.as_ref().to_string(),
            description: description.as_ref().to_string(),
            environment,
            resources: vec![],
            outputs: IndexMap::new(),
            content_deployments: vec![],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &DeployEnvironment {
        &self.environment
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut [Resource] {
        &mut self.resources
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.resources.iter().any(|r| r.name == logical_id)
    }

    pub fn content_deployments(&self) -> &[ContentDeployment] {
        &self.content_deployments
    }

    /// validates the resource and checks that everything it references was declared already.
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        if let Some(err) = verify_logical_id(&resource.name) {
            return Err(StackError::validation(&resource.name, err));
        }
        if self.contains(&resource.name) {
            return Err(StackError::DuplicateResource(resource.name));
        }
        resource.properties.validate().map_err(|e| StackError::validation(&resource.name, e))?;
        self.check_references(&resource.name, &resource.properties.properties())?;
        tracing::debug!(logical_id = %resource.name, ty = resource.type_string(), "added resource");
        self.resources.push(resource);
        Ok(())
    }

    pub fn add_output<K: AsRef<str>, D: AsRef<str>>(&mut self, key: K, description: D, value: Value) -> Result<()> {
        let key = key.as_ref();
        if let Some(err) = verify_logical_id(key) {
            return Err(StackError::validation(key, err));
        }
        if self.outputs.contains_key(key) {
            return Err(StackError::DuplicateResource(key.to_string()));
        }
        self.check_references(key, &value)?;
        self.outputs.insert(key.to_string(), ResourceOutput {
            description: description.as_ref().to_string(),
            value,
        });
        Ok(())
    }

    pub fn add_content_deployment(&mut self, deployment: ContentDeployment) -> Result<()> {
        for id in [&deployment.bucket_logical_id, &deployment.distribution_logical_id] {
            if !self.contains(id) {
                return Err(StackError::UnresolvedReference {
                    from: "content deployment".into(),
                    to: id.clone(),
                });
            }
        }
        self.content_deployments.push(deployment);
        Ok(())
    }

    fn check_references(&self, from: &str, value: &Value) -> Result<()> {
        let mut ids = vec![];
        referenced_ids(value, &mut ids);
        for id in ids {
            if !self.contains(&id) {
                return Err(StackError::UnresolvedReference { from: from.to_string(), to: id });
            }
        }
        Ok(())
    }

    /// renders the template. resources are re-validated since the tagging
    /// pass may have modified them after they were added.
    pub fn template(&self) -> Result<SavedTemplate> {
        let mut out_template = SavedTemplate {
            description: self.description.clone(),
            ..Default::default()
        };
        for resource in self.resources.iter() {
            resource.properties.validate().map_err(|e| StackError::validation(&resource.name, e))?;
            let properties = resource.properties.properties();
            if !properties.is_object() {
                return Err(StackError::validation(
                    &resource.name,
                    format!("Properties must render as an object, got {properties}"),
                ));
            }
            let saved_resource = SavedResource {
                ty: resource.type_string().to_string(),
                properties,
                deletion_policy: resource.deletion_policy,
                update_replace_policy: resource.deletion_policy,
            };
            out_template.resources.insert(resource.name.clone(), saved_resource);
        }
        out_template.outputs = self.outputs.clone();
        Ok(out_template)
    }

    pub fn synth(&self) -> Result<SavedStack> {
        let template = self.template()?;
        tracing::info!(
            stack = %self.name,
            resources = template.resources.len(),
            outputs = template.outputs.len(),
            "synthesized template"
        );
        Ok(SavedStack {
            stack_name: self.name.clone(),
            environment: self.environment.clone(),
            template,
            content_deployments: self.content_deployments.clone(),
        })
    }
}

/// appends the tags to every taggable resource. Existing tags with the same key are replaced.
/// returns how many resources were tagged.
pub fn apply_tags(resources: &mut [Resource], tags: &[Tag]) -> usize {
    let mut tagged = 0;
    for resource in resources.iter_mut() {
        if let Some(existing) = resource.properties.tags_mut() {
            for tag in tags {
                existing.retain(|t| t.key != tag.key);
                existing.push(tag.clone());
            }
            tagged += 1;
        }
    }
    tagged
}
