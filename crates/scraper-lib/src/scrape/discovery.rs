//! Replica discovery and selection
//!
//! Lists the replicas of a workload by `app`/`version` label equality and
//! picks the one replica whose proxy gets scraped.

use super::ReplicaLister;
use crate::error::ScrapeError;
use crate::models::{labels, ContainerSpec, Replica, ReplicaPhase, WorkloadMetric};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const MAX_LABEL_LENGTH: usize = 63;

/// Conjunction of `key=value` label requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality requirement, validating key and value syntax
    pub fn equals(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ScrapeError> {
        let key = key.into();
        let value = value.into();

        let invalid = |reason| ScrapeError::InvalidSelector {
            key: key.clone(),
            value: value.clone(),
            reason,
        };

        if key.is_empty() {
            return Err(invalid("key must not be empty"));
        }
        check_label_token(&key).map_err(invalid)?;
        if !value.is_empty() {
            check_label_token(&value).map_err(invalid)?;
        }

        self.requirements.push((key, value));
        Ok(self)
    }

    /// Selector `app=<app>,version=<version>` for a workload
    pub fn for_workload(metric: &WorkloadMetric) -> Result<Self, ScrapeError> {
        Self::new()
            .equals(labels::APP, metric.label(labels::APP))?
            .equals(labels::VERSION, metric.label(labels::VERSION))
    }

    pub fn requirements(&self) -> &[(String, String)] {
        &self.requirements
    }

    /// Whether a label set satisfies every requirement
    ///
    /// As with the Kubernetes API, a requirement only matches a label that
    /// is present, even when the required value is empty.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| labels.get(key).map_or(false, |v| v == value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.requirements {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Kubernetes label syntax: at most 63 characters, alphanumerics plus
/// `-`, `_` and `.`, starting and ending with an alphanumeric
fn check_label_token(token: &str) -> std::result::Result<(), &'static str> {
    if token.len() > MAX_LABEL_LENGTH {
        return Err("must be at most 63 characters");
    }
    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("may only contain alphanumerics, '-', '_' or '.'");
    }
    let alnum_edge = |c: Option<char>| c.map(|c| c.is_ascii_alphanumeric()).unwrap_or(false);
    if !alnum_edge(token.chars().next()) || !alnum_edge(token.chars().last()) {
        return Err("must begin and end with an alphanumeric character");
    }
    Ok(())
}

/// Running-replica count plus the replica chosen to be scraped
#[derive(Debug, Clone, Copy)]
pub struct ReplicaSelection<'a> {
    pub running: usize,
    pub representative: &'a Replica,
}

/// Pick one running replica to stand in for all of them.
///
/// Any running replica will do since replicas of one workload version are
/// assumed to serve load alike. Replicas with an IP are preferred, then the
/// smallest name, so the choice is stable while the replica set is.
/// Returns `None` when nothing is running.
pub fn select_replica(replicas: &[Replica]) -> Option<ReplicaSelection<'_>> {
    let running: Vec<&Replica> = replicas.iter().filter(|r| r.is_running()).collect();
    let representative = running
        .iter()
        .copied()
        .min_by(|a, b| (a.ip.is_none(), &a.name).cmp(&(b.ip.is_none(), &b.name)))?;

    Some(ReplicaSelection {
        running: running.len(),
        representative,
    })
}

/// Lists workload replicas as pods through the Kubernetes API
#[derive(Clone)]
pub struct KubeReplicaLister {
    client: Client,
}

impl KubeReplicaLister {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ReplicaLister for KubeReplicaLister {
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<Replica>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector.to_string());

        let list = pods
            .list(&params)
            .await
            .with_context(|| format!("Failed to list pods matching {}", selector))?;

        debug!(
            namespace = %namespace,
            selector = %selector,
            count = list.items.len(),
            "Listed pods"
        );

        Ok(list.items.iter().map(replica_from_pod).collect())
    }
}

/// Convert a pod into the replica view used by the scraper
pub fn replica_from_pod(pod: &Pod) -> Replica {
    let status = pod.status.as_ref();

    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(ReplicaPhase::from_phase)
        .unwrap_or(ReplicaPhase::Unknown);

    let ip = status
        .and_then(|s| s.pod_ip.clone())
        .filter(|ip| !ip.is_empty());

    let containers = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|c| ContainerSpec {
                    name: c.name.clone(),
                    ports: c
                        .ports
                        .as_ref()
                        .map(|ports| ports.iter().map(|p| p.container_port).collect())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Replica {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase,
        ip,
        labels: pod
            .metadata
            .labels
            .clone()
            .map(|l| l.into_iter().collect())
            .unwrap_or_default(),
        containers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn replica(name: &str, phase: ReplicaPhase) -> Replica {
        Replica {
            name: name.to_string(),
            phase,
            ip: Some("10.0.0.1".to_string()),
            labels: HashMap::new(),
            containers: vec![],
        }
    }

    #[test]
    fn test_selector_for_workload() {
        let metric = WorkloadMetric::new("default", "svc")
            .with_label("app", "svc")
            .with_label("version", "v1");

        let selector = LabelSelector::for_workload(&metric).unwrap();
        assert_eq!(selector.to_string(), "app=svc,version=v1");
    }

    #[test]
    fn test_selector_allows_missing_version() {
        let metric = WorkloadMetric::new("default", "svc").with_label("app", "svc");

        let selector = LabelSelector::for_workload(&metric).unwrap();
        assert_eq!(selector.to_string(), "app=svc,version=");
    }

    #[test]
    fn test_selector_rejects_invalid_value() {
        let metric = WorkloadMetric::new("default", "svc")
            .with_label("app", "svc,other=1")
            .with_label("version", "v1");

        let err = LabelSelector::for_workload(&metric).unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidSelector { ref key, .. } if key == "app"));
    }

    #[test]
    fn test_selector_rejects_long_and_unanchored_values() {
        assert!(LabelSelector::new().equals("app", "a".repeat(64)).is_err());
        assert!(LabelSelector::new().equals("app", "-svc").is_err());
        assert!(LabelSelector::new().equals("app", "svc.").is_err());
        assert!(LabelSelector::new().equals("app", "my_svc-1.2").is_ok());
    }

    #[test]
    fn test_selector_matches() {
        let selector = LabelSelector::new()
            .equals("app", "svc")
            .unwrap()
            .equals("version", "v1")
            .unwrap();

        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "svc".to_string());
        assert!(!selector.matches(&labels));

        labels.insert("version".to_string(), "v1".to_string());
        labels.insert("team".to_string(), "core".to_string());
        assert!(selector.matches(&labels));
    }

    #[test]
    fn test_select_replica_counts_only_running() {
        let replicas = vec![
            replica("svc-c", ReplicaPhase::Running),
            replica("svc-a", ReplicaPhase::Pending),
            replica("svc-b", ReplicaPhase::Running),
            replica("svc-d", ReplicaPhase::Failed),
        ];

        let selection = select_replica(&replicas).unwrap();
        assert_eq!(selection.running, 2);
        assert_eq!(selection.representative.name, "svc-b");
    }

    #[test]
    fn test_selector_on_empty_value_requires_label() {
        let selector = LabelSelector::new()
            .equals("app", "svc")
            .unwrap()
            .equals("version", "")
            .unwrap();

        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "svc".to_string());
        assert!(!selector.matches(&labels));

        labels.insert("version".to_string(), String::new());
        assert!(selector.matches(&labels));
    }

    #[test]
    fn test_select_replica_prefers_replicas_with_ip() {
        let mut no_ip = replica("svc-a", ReplicaPhase::Running);
        no_ip.ip = None;
        let replicas = vec![no_ip, replica("svc-b", ReplicaPhase::Running)];

        let selection = select_replica(&replicas).unwrap();
        assert_eq!(selection.running, 2);
        assert_eq!(selection.representative.name, "svc-b");
    }

    #[test]
    fn test_select_replica_none_running() {
        let replicas = vec![
            replica("svc-a", ReplicaPhase::Pending),
            replica("svc-b", ReplicaPhase::Succeeded),
        ];

        assert!(select_replica(&replicas).is_none());
        assert!(select_replica(&[]).is_none());
    }

    #[test]
    fn test_select_replica_is_order_independent() {
        let forward = vec![
            replica("svc-a", ReplicaPhase::Running),
            replica("svc-b", ReplicaPhase::Running),
        ];
        let reversed: Vec<Replica> = forward.iter().rev().cloned().collect();

        assert_eq!(
            select_replica(&forward).unwrap().representative.name,
            select_replica(&reversed).unwrap().representative.name
        );
    }

    #[test]
    fn test_replica_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("svc-7d9f".to_string()),
                labels: Some(
                    [("app".to_string(), "svc".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "svc".to_string(),
                        ports: Some(vec![
                            ContainerPort {
                                container_port: 8080,
                                ..Default::default()
                            },
                            ContainerPort {
                                container_port: 9090,
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    },
                    Container {
                        name: "istio-proxy".to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                pod_ip: Some("10.0.0.5".to_string()),
                ..Default::default()
            }),
        };

        let replica = replica_from_pod(&pod);
        assert_eq!(replica.name, "svc-7d9f");
        assert!(replica.is_running());
        assert_eq!(replica.ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(replica.labels.get("app").map(String::as_str), Some("svc"));
        assert_eq!(replica.containers.len(), 2);
        assert_eq!(replica.containers[0].ports, vec![8080, 9090]);
        assert!(replica.containers[1].ports.is_empty());
    }

    #[test]
    fn test_replica_from_unscheduled_pod() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                pod_ip: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let replica = replica_from_pod(&pod);
        assert_eq!(replica.phase, ReplicaPhase::Pending);
        assert_eq!(replica.ip, None);
        assert!(replica.containers.is_empty());
    }
}
