use crate::models::ImageRef;
use anyhow::{Context, Result, bail};
use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{
    ResourceExt,
    api::{Api, Patch, PatchParams},
    client::Client,
};
use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, info};

/// Namespaces the kubelet owns; their Deployments are never touched.
pub const SYSTEM_NAMESPACES: [&str; 3] = ["kube-system", "kube-node-lease", "kube-public"];

const TOKEN_ACCOUNT: &str = "default";
const TOKEN_NAMESPACE: &str = "kube-system";

/// One tick's worth of authenticated cluster access: the inferred client for
/// reads, plus a second client pinned to the discovered API-server URL with a
/// service-account bearer token for the mutating calls.
pub struct ClusterSession {
    client: Client,
    privileged: Client,
    pub apiserver_url: String,
}

impl ClusterSession {
    /// `client` comes from `Client::try_default()`: in-cluster configuration
    /// first, local kubeconfig as the development fallback.
    pub async fn connect(client: Client) -> Result<Self> {
        let apiserver_url = discover_apiserver_url(&client).await?;
        let token = bearer_token(&client, TOKEN_ACCOUNT, TOKEN_NAMESPACE).await?;

        let mut config = kube::Config::new(
            apiserver_url
                .parse()
                .context("discovered API-server URL is not a valid URI")?,
        );
        // The discovered endpoint serves the serving cert for its in-cluster
        // name, which this direct connection cannot verify.
        config.accept_invalid_certs = true;
        config.auth_info.token = Some(SecretString::from(token));

        let privileged =
            Client::try_from(config).context("failed to build the authenticated API client")?;

        debug!(apiserver = %apiserver_url, "cluster session established");

        Ok(Self {
            client,
            privileged,
            apiserver_url,
        })
    }

    /// Every namespace except the three kubelet-native ones.
    pub async fn non_system_namespaces(&self) -> Result<Vec<String>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces
            .list(&Default::default())
            .await
            .context("failed to list namespaces")?;

        Ok(list
            .items
            .iter()
            .map(|ns| ns.name_any())
            .filter(|name| !SYSTEM_NAMESPACES.contains(&name.as_str()))
            .collect())
    }

    pub async fn deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = deployments
            .list(&Default::default())
            .await
            .with_context(|| format!("failed to list deployments in {}", namespace))?;
        Ok(list.items)
    }

    /// Strategic-merge patch of one container's image. `imagePullPolicy:
    /// Always` is assumed; the kubelet pulls the new tag on the rollout.
    pub async fn patch_image_tag(
        &self,
        namespace: &str,
        deployment: &str,
        container: &str,
        new_ref: &ImageRef,
    ) -> Result<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.privileged.clone(), namespace);

        let patch = json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{
                            "name": container,
                            "image": new_ref.to_string()
                        }]
                    }
                }
            }
        });

        info!(
            "Updating deployment {}/{} container {} to image {}",
            namespace, deployment, container, new_ref
        );

        deployments
            .patch(deployment, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .with_context(|| format!("failed to patch deployment {}/{}", namespace, deployment))?;

        Ok(())
    }

    /// Rollout-restart by stamping the pod template, the same mechanism
    /// `kubectl rollout restart` uses. Needed when the tag itself does not
    /// change (`latest`).
    pub async fn restart_rollout(&self, namespace: &str, deployment: &str) -> Result<()> {
        let deployments: Api<Deployment> = Api::namespaced(self.privileged.clone(), namespace);

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            "kubectl.kubernetes.io/restartedAt": now
                        }
                    }
                }
            }
        });

        info!("Restarting deployment {}/{}", namespace, deployment);

        deployments
            .patch(deployment, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .with_context(|| {
                format!("failed to restart deployment {}/{}", namespace, deployment)
            })?;

        Ok(())
    }
}

/// Find the kube-apiserver pod and read its liveness probe's HTTP host and
/// port; that is the address the mutating client talks to.
async fn discover_apiserver_url(client: &Client) -> Result<String> {
    let pods: Api<Pod> = Api::all(client.clone());
    let list = pods
        .list(&Default::default())
        .await
        .context("failed to list pods while locating the API server")?;

    for pod in list.items {
        if !pod.name_any().contains("kube-apiserver") {
            continue;
        }
        let Some(spec) = pod.spec else { continue };
        for container in spec.containers {
            let image = container.image.as_deref().unwrap_or_default();
            if !image.contains("kube-apiserver") {
                continue;
            }
            if let Some(probe) = container.liveness_probe
                && let Some(http_get) = probe.http_get
            {
                let host = http_get.host.unwrap_or_default();
                let port = match http_get.port {
                    IntOrString::Int(port) => port.to_string(),
                    IntOrString::String(port) => port,
                };
                return Ok(format!("https://{}:{}", host, port));
            }
        }
    }

    bail!("no kube-apiserver pod with an HTTP liveness probe found")
}

/// Bearer token of the given service-account: follow its token secret and
/// read the `token` key (delivered already base64-decoded).
async fn bearer_token(client: &Client, name: &str, namespace: &str) -> Result<String> {
    let accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), namespace);
    let account = accounts
        .get(name)
        .await
        .with_context(|| format!("failed to read service account {}/{}", namespace, name))?;

    let secret_name = account
        .secrets
        .unwrap_or_default()
        .into_iter()
        .filter_map(|reference| reference.name)
        .find(|secret| secret.contains("token"))
        .with_context(|| format!("service account {}/{} has no token secret", namespace, name))?;

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get(&secret_name)
        .await
        .with_context(|| format!("failed to read secret {}/{}", namespace, secret_name))?;

    let token_bytes = secret
        .data
        .unwrap_or_default()
        .remove("token")
        .with_context(|| format!("secret {}/{} carries no token key", namespace, secret_name))?;

    String::from_utf8(token_bytes.0).context("service-account token is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_namespaces_are_excluded() {
        for name in ["kube-system", "kube-node-lease", "kube-public"] {
            assert!(SYSTEM_NAMESPACES.contains(&name));
        }
        assert!(!SYSTEM_NAMESPACES.contains(&"default"));
        assert!(!SYSTEM_NAMESPACES.contains(&"production"));
    }

    #[test]
    fn test_restart_timestamp_shape() {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        assert!(now.ends_with('Z'));
        assert!(now.contains('T'));
    }
}
