use kube::config::{InClusterError, KubeconfigError};

#[derive(thiserror::Error, Debug)]
pub enum K8sError {
    #[error("the kube client returned an error: `{0}`")]
    Generic(#[from] kube::Error),

    #[error("it is not possible to read kubeconfig: `{0}`")]
    UnableToSetupClientKubeconfig(#[from] KubeconfigError),

    #[error("it is not possible to load the in-cluster config: `{0}`")]
    UnableToSetupClientInCluster(#[from] InClusterError),

    #[error("cannot start a k8s reader `{0}`")]
    ReflectorWriterDropped(#[from] kube::runtime::reflector::store::WriterDropped),

    #[error("cannot post object `{0}`")]
    CommitError(#[from] kube::api::entry::CommitError),

    #[error("error serializing object: `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("the lease is held by another instance")]
    LeaseHeldByAnotherInstance,
}
