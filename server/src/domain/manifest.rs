//! Kubernetes manifest plumbing
//!
//! Manifests are handled as plain YAML documents so that resources of
//! different kinds can travel through the pipeline in one list. Typed
//! `k8s-openapi` resources are converted into documents with an explicit
//! `apiVersion`/`kind` header, since the typed structs do not serialize those
//! fields themselves.

use k8s_openapi::Resource;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// A single Kubernetes-manifest-shaped document.
pub type Manifest = Value;

/// Serialize a typed resource into a manifest document.
///
/// `apiVersion` and `kind` come first so the emitted YAML reads like a
/// hand-written manifest.
pub fn to_manifest<K>(resource: &K) -> Result<Manifest, serde_yaml::Error>
where
    K: Resource + Serialize,
{
    let mut doc = Mapping::new();
    doc.insert(Value::from("apiVersion"), Value::from(K::API_VERSION));
    doc.insert(Value::from("kind"), Value::from(K::KIND));

    if let Value::Mapping(fields) = serde_yaml::to_value(resource)? {
        for (key, value) in fields {
            doc.insert(key, value);
        }
    }

    Ok(Value::Mapping(doc))
}

/// Render manifests as a multi-document YAML stream.
///
/// Every document is prefixed with a `---` separator; an empty manifest list
/// renders as an empty string.
pub fn to_yaml_stream(manifests: &[Manifest]) -> Result<String, serde_yaml::Error> {
    let mut stream = String::new();
    for manifest in manifests {
        stream.push_str("---\n");
        stream.push_str(&serde_yaml::to_string(manifest)?);
    }
    Ok(stream)
}
