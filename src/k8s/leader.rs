use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::entry::{CommitError, Entry};
use kube::api::PostParams;
use kube::{Api, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::K8sError;

/// Lease-based leader election.
///
/// Only the lease holder may run the controller, so that a single process
/// writes under the card field manager at any time. The lease is taken over
/// when it has no holder or its renew time plus lease duration has elapsed.
/// Commits rely on optimistic concurrency, a conflicting write means another
/// instance won the race.
pub struct LeaderElector {
    api: Api<Lease>,
    lease_name: String,
    identity: String,
    lease_duration: Duration,
    retry_interval: Duration,
}

impl LeaderElector {
    pub fn new(
        client: Client,
        namespace: &str,
        lease_name: String,
        identity: String,
        lease_duration: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            lease_name,
            identity,
            lease_duration,
            retry_interval,
        }
    }

    /// Blocks until this instance holds the lease. Transient API errors are
    /// logged and retried.
    pub async fn acquire(&self) {
        info!(
            lease = %self.lease_name,
            identity = %self.identity,
            "waiting to acquire leadership"
        );
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(lease = %self.lease_name, "leadership acquired");
                    return;
                }
                Ok(false) => debug!("lease held by another instance"),
                Err(err) => warn!(error = %err, "acquiring leader lease"),
            }
            sleep(self.retry_interval).await;
        }
    }

    /// Keeps the held lease renewed. Returns once leadership is lost to
    /// another instance.
    pub async fn run_renewal(self) -> K8sError {
        loop {
            sleep(self.retry_interval).await;
            match self.try_acquire().await {
                Ok(true) => debug!("leader lease renewed"),
                Ok(false) => {
                    warn!(lease = %self.lease_name, "leadership lost");
                    return K8sError::LeaseHeldByAnotherInstance;
                }
                // Renewal failures are retried, the lease protects itself: once
                // it expires another instance takes it and the next attempt
                // reports the loss.
                Err(err) => warn!(error = %err, "renewing leader lease"),
            }
        }
    }

    async fn try_acquire(&self) -> Result<bool, K8sError> {
        let now = Utc::now();
        let entry = self.api.entry(&self.lease_name).await?;

        if let Entry::Occupied(occupied) = &entry {
            if !takeable(
                occupied.get().spec.as_ref(),
                &self.identity,
                self.lease_duration,
                now,
            ) {
                return Ok(false);
            }
        }

        let commit = entry
            .or_insert(Lease::default)
            .and_modify(|lease| self.renew_spec(lease, now))
            .commit(&PostParams::default())
            .await;

        match commit {
            Ok(()) => Ok(true),
            Err(CommitError::Save(kube::Error::Api(response))) if response.code == 409 => {
                debug!("lost the leader election race");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn renew_spec(&self, lease: &mut Lease, now: DateTime<Utc>) {
        let spec = lease.spec.get_or_insert_with(LeaseSpec::default);
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            spec.lease_transitions = Some(spec.lease_transitions.unwrap_or_default() + 1);
            spec.acquire_time = Some(MicroTime(now));
        }
        spec.holder_identity = Some(self.identity.clone());
        spec.lease_duration_seconds = Some(self.lease_duration.as_secs() as i32);
        spec.renew_time = Some(MicroTime(now));
    }
}

/// Identity under which this process competes for the lease.
pub fn default_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| format!("cardinal-{}", std::process::id()))
}

/// The lease can be taken when it has no holder, we already hold it, or the
/// current holder let it expire.
fn takeable(
    spec: Option<&LeaseSpec>,
    identity: &str,
    lease_duration: Duration,
    now: DateTime<Utc>,
) -> bool {
    let Some(spec) = spec else {
        return true;
    };
    match spec.holder_identity.as_deref() {
        None => true,
        Some(holder) if holder == identity => true,
        Some(_) => {
            let Some(renew_time) = &spec.renew_time else {
                return true;
            };
            let duration = spec
                .lease_duration_seconds
                .map(i64::from)
                .unwrap_or(lease_duration.as_secs() as i64);
            renew_time.0 + chrono::Duration::seconds(duration) < now
        }
    }
}
