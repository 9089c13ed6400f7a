//! EdgeMachineTemplate CRD
//!
//! Template machines are stamped from. Templates cloned per cluster keep the
//! origin name in the cloned-from annotation, which is what binding pools are
//! keyed by.

use crate::edge_machine::EdgeMachineSpec;
use crate::metadata::{self, CLONED_FROM_NAME_ANNOTATION};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.edge.microscaler.io",
    version = "v1alpha1",
    kind = "EdgeMachineTemplate",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMachineTemplateSpec {
    /// Template for the machines
    #[serde(default)]
    pub template: EdgeMachineTemplateResource,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMachineTemplateResource {
    /// Spec copied into each machine
    #[serde(default)]
    pub spec: EdgeMachineSpec,
}

impl EdgeMachineTemplate {
    /// Name of the template this one was cloned from
    pub fn cloned_from(&self) -> Option<&str> {
        metadata::annotation(&self.metadata, CLONED_FROM_NAME_ANNOTATION)
    }
}
