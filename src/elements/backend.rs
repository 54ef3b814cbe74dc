use serde::Serialize;
use serde_json::{json, Map, Value};

/// Backend selection for a stack's Terraform state.
///
/// Every variant knows its fragment shape and how to produce the matching
/// `terraform_remote_state` data source for cross-stack reads.
pub enum BackendConfig {
    Local(LocalBackendProps),
    S3(S3BackendProps),
    Gcs(GcsBackendProps),
    AzureRm(AzureRmBackendProps),
    Remote(RemoteBackendProps),
    Cloud(CloudBackendProps),
}

#[derive(Serialize, Default, Clone)]
pub struct LocalBackendProps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<String>,
}

#[derive(Serialize, Default, Clone)]
pub struct S3BackendProps {
    pub bucket: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamodb_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}

#[derive(Serialize, Default, Clone)]
pub struct GcsBackendProps {
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

#[derive(Serialize, Default, Clone)]
pub struct AzureRmBackendProps {
    pub storage_account_name: String,
    pub container_name: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Serialize, Default, Clone)]
pub struct RemoteBackendProps {
    pub organization: String,
    pub workspaces: RemoteWorkspace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Serialize, Default, Clone)]
pub struct RemoteWorkspace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Clone)]
pub struct CloudBackendProps {
    pub organization: String,
    pub workspaces: CloudWorkspaces,
    pub hostname: Option<String>,
    pub token: Option<String>,
}

/// Workspace selection of a cloud backend. Tagged selection addresses a
/// fleet of workspaces, so it cannot serve as a cross-stack state source.
#[derive(Clone)]
pub enum CloudWorkspaces {
    Named { name: String },
    Tagged { tags: Vec<String> },
}

impl CloudWorkspaces {
    fn to_value(&self) -> Value {
        match self {
            CloudWorkspaces::Named { name } => json!({ "name": name }),
            CloudWorkspaces::Tagged { tags } => json!({ "tags": tags }),
        }
    }
}

impl BackendConfig {
    /// The name recorded in stack metadata and used as the backend block key.
    pub fn backend_type(&self) -> &'static str {
        match self {
            BackendConfig::Local(_) => "local",
            BackendConfig::S3(_) => "s3",
            BackendConfig::Gcs(_) => "gcs",
            BackendConfig::AzureRm(_) => "azurerm",
            BackendConfig::Remote(_) => "remote",
            BackendConfig::Cloud(_) => "cloud",
        }
    }

    /// The `{ terraform: … }` fragment this backend contributes.
    pub fn to_fragment(&self) -> Value {
        match self {
            BackendConfig::Local(p) => json!({ "terraform": { "backend": { "local": p } } }),
            BackendConfig::S3(p) => json!({ "terraform": { "backend": { "s3": p } } }),
            BackendConfig::Gcs(p) => json!({ "terraform": { "backend": { "gcs": p } } }),
            BackendConfig::AzureRm(p) => json!({ "terraform": { "backend": { "azurerm": p } } }),
            BackendConfig::Remote(p) => json!({ "terraform": { "backend": { "remote": p } } }),
            BackendConfig::Cloud(p) => {
                let mut cloud = Map::new();
                cloud.insert("organization".to_string(), json!(p.organization));
                if let Some(hostname) = &p.hostname {
                    cloud.insert("hostname".to_string(), json!(hostname));
                }
                if let Some(token) = &p.token {
                    cloud.insert("token".to_string(), json!(token));
                }
                cloud.insert("workspaces".to_string(), p.workspaces.to_value());
                json!({ "terraform": { "cloud": cloud } })
            }
        }
    }

    /// Attributes of the `terraform_remote_state` data source that reads this
    /// backend's state from another stack.
    ///
    /// `Err(())` marks the one refusal: cloud backends with tagged workspaces.
    pub fn remote_state_attributes(
        &self,
        source_stack_name: &str,
    ) -> std::result::Result<Map<String, Value>, ()> {
        let (backend, config) = match self {
            BackendConfig::Local(p) => {
                let path = p
                    .path
                    .clone()
                    .unwrap_or_else(|| format!("terraform.{}.tfstate", source_stack_name));
                ("local", json!({ "path": path }))
            }
            BackendConfig::S3(p) => ("s3", json!(p)),
            BackendConfig::Gcs(p) => ("gcs", json!(p)),
            BackendConfig::AzureRm(p) => ("azurerm", json!(p)),
            BackendConfig::Remote(p) => ("remote", json!(p)),
            BackendConfig::Cloud(p) => match &p.workspaces {
                CloudWorkspaces::Named { name } => {
                    let mut config = Map::new();
                    config.insert("organization".to_string(), json!(p.organization));
                    if let Some(hostname) = &p.hostname {
                        config.insert("hostname".to_string(), json!(hostname));
                    }
                    config.insert("workspaces".to_string(), json!({ "name": name }));
                    ("remote", Value::Object(config))
                }
                CloudWorkspaces::Tagged { .. } => return Err(()),
            },
        };

        let mut attrs = Map::new();
        attrs.insert("backend".to_string(), json!(backend));
        attrs.insert("config".to_string(), config);
        Ok(attrs)
    }
}
