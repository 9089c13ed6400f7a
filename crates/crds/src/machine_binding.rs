//! MachineBinding CRD
//!
//! A pre-registered node identity reserved for machines of one
//! (cluster, template) pool. Bindings are created out of band; the provider
//! only flips `allocated` and attaches the owning machine.
//!
//! Pools are listed by label, so every binding carries the cluster name and
//! template name labels alongside its spec (see [`MachineBinding::pool_entry`]).

use crate::metadata::{self, CLUSTER_NAME_LABEL, TEMPLATE_NAME_LABEL};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.edge.microscaler.io",
    version = "v1alpha1",
    kind = "MachineBinding",
    namespaced,
    status = "MachineBindingStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineBindingSpec {
    /// Node identity handed to the machine
    #[serde(rename = "nodeGUID")]
    pub node_guid: String,

    /// Cluster the node is reserved for
    pub cluster_name: String,

    /// Origin template name of the pool
    pub template_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineBindingStatus {
    /// Set once the binding has been handed to a machine
    #[serde(default)]
    pub allocated: bool,
}

/// Pool key shared by all bindings of a (cluster, template) pair
pub fn pool_key(cluster_name: &str, template_name: &str) -> String {
    format!("{}/{}", cluster_name, template_name)
}

/// Label selector matching the bindings of a pool
pub fn pool_selector(cluster_name: &str, template_name: &str) -> String {
    format!(
        "{}={},{}={}",
        CLUSTER_NAME_LABEL, cluster_name, TEMPLATE_NAME_LABEL, template_name
    )
}

impl MachineBinding {
    /// A binding with its pool labels set from the spec
    pub fn pool_entry(name: &str, spec: MachineBindingSpec) -> Self {
        let mut binding = Self::new(name, spec);
        binding.set_pool_labels();
        binding
    }

    /// Mirror cluster and template names into the pool labels
    pub fn set_pool_labels(&mut self) {
        metadata::set_label(&mut self.metadata, CLUSTER_NAME_LABEL, &self.spec.cluster_name);
        metadata::set_label(&mut self.metadata, TEMPLATE_NAME_LABEL, &self.spec.template_name);
    }

    /// Whether the pool labels select this binding for the given pool
    pub fn labelled_for(&self, cluster_name: &str, template_name: &str) -> bool {
        metadata::label(&self.metadata, CLUSTER_NAME_LABEL) == Some(cluster_name)
            && metadata::label(&self.metadata, TEMPLATE_NAME_LABEL) == Some(template_name)
    }

    /// Pool key of this binding
    pub fn pool_key(&self) -> String {
        pool_key(&self.spec.cluster_name, &self.spec.template_name)
    }

    /// Whether the binding has been allocated
    pub fn is_allocated(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.allocated)
    }

    /// Whether the binding is owned by the given object
    ///
    /// Matches on uid when both sides have one, otherwise on kind and name.
    pub fn is_owned_by(&self, owner: &OwnerReference) -> bool {
        self.metadata.owner_references.as_ref().is_some_and(|refs| {
            refs.iter().any(|r| {
                if !r.uid.is_empty() && !owner.uid.is_empty() {
                    r.uid == owner.uid
                } else {
                    r.kind == owner.kind && r.name == owner.name
                }
            })
        })
    }

    /// Mark allocated and attach the owner
    pub fn allocate_to(&mut self, owner: OwnerReference) {
        self.status.get_or_insert_with(MachineBindingStatus::default).allocated = true;
        let refs = self.metadata.owner_references.get_or_insert_with(Vec::new);
        if !refs.iter().any(|r| r.uid == owner.uid && r.name == owner.name) {
            refs.push(owner);
        }
    }
}
