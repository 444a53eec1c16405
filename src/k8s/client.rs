use super::error::K8sError;
use kube::{config::KubeConfigOptions, Client, Config};
use tracing::debug;

/// Constructs a new Kubernetes client.
///
/// If loading the in-cluster config fails we fall back to kube-config.
/// This will respect the `$KUBECONFIG` envvar, but otherwise default to
/// `~/.kube/config`.
pub async fn try_client() -> Result<Client, K8sError> {
    debug!("trying inClusterConfig for k8s client");

    let config = match Config::incluster() {
        Ok(c) => c,
        Err(e) => {
            debug!("inClusterConfig {}, trying kubeconfig for k8s client", e);
            let options = KubeConfigOptions::default();
            Config::from_kubeconfig(&options).await?
        }
    };

    let client = Client::try_from(config)?;
    debug!("k8s client initialization succeeded");
    Ok(client)
}
