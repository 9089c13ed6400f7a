//! Well-known labels, annotations and finalizers, plus small helpers for
//! editing them on `ObjectMeta`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// API group of the provider CRDs
pub const API_GROUP: &str = "infrastructure.edge.microscaler.io";

/// API version of the provider CRDs
pub const API_VERSION: &str = "infrastructure.edge.microscaler.io/v1alpha1";

/// Label mirroring `spec.nodeGUID` on machines, used for indexed lookup
pub const NODE_GUID_LABEL: &str = "edge.microscaler.io/node-guid";

/// Label carrying the owning cluster name
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label mirroring `spec.templateName` on bindings, used with the cluster
/// name label to select a pool
pub const TEMPLATE_NAME_LABEL: &str = "edge.microscaler.io/template-name";

/// Label marking a control plane machine
pub const CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";

/// Annotation naming the template a resource was cloned from
pub const CLONED_FROM_NAME_ANNOTATION: &str = "cluster.x-k8s.io/cloned-from-name";

/// Finalizer guarding removal of the instance from the cluster workload
pub const FREE_INSTANCE_FINALIZER: &str = "edge.microscaler.io/free-instance";

/// Finalizer guarding host deauthorization
pub const DEAUTH_HOST_FINALIZER: &str = "edge.microscaler.io/deauth-host";

/// Finalizer managed by the southbound handler while the node agent installs
pub const HOST_CLEANUP_FINALIZER: &str = "edge.microscaler.io/host-cleanup";

/// Obsolete single finalizer used before the cleanup steps were split
pub const LEGACY_MACHINE_FINALIZER: &str = "edge.microscaler.io/machine";

/// Finalizer guarding cluster teardown
pub const CLUSTER_FINALIZER: &str = "edge.microscaler.io/cluster";

/// Whether the object carries the finalizer
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Add a finalizer; returns true if it was not present
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    if has_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    true
}

/// Remove a finalizer; returns true if it was present
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    finalizers.len() != before
}

/// Value of a label, if set
pub fn label<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.labels.as_ref()?.get(key).map(String::as_str)
}

/// Set a label
pub fn set_label(meta: &mut ObjectMeta, key: &str, value: &str) {
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), value.to_string());
}

/// Value of an annotation, if set and non-empty
pub fn annotation<'a>(meta: &'a ObjectMeta, key: &str) -> Option<&'a str> {
    meta.annotations
        .as_ref()?
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// First owner reference of the given kind
pub fn owner_of_kind<'a>(meta: &'a ObjectMeta, kind: &str) -> Option<&'a OwnerReference> {
    meta.owner_references.as_ref()?.iter().find(|o| o.kind == kind)
}
