//! Anonymisation services: published descriptors and local processors

use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use trustee_types::{Result, ServiceDescriptor, TrusteeError};

/// Id of the built-in title masking service
pub const MASK_TITLE_ID: &str = "mask-title";

/// Transforms an asset payload
pub trait AssetProcessor: Send + Sync {
    fn apply(&self, input: Bytes) -> Result<Bytes>;
}

/// Replaces every textual `title` field with `"xxx"`, at any depth
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskTitleProcessor;

impl MaskTitleProcessor {
    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(
            MASK_TITLE_ID,
            "Replace every JSON field \"title\" with \"xxx\"",
        )
    }

    fn mask(node: &mut Value) {
        match node {
            Value::Object(map) => {
                if let Some(title) = map.get_mut("title") {
                    if title.is_string() {
                        *title = Value::String("xxx".into());
                    }
                }
                map.values_mut().for_each(Self::mask);
            }
            Value::Array(items) => items.iter_mut().for_each(Self::mask),
            _ => {}
        }
    }
}

impl AssetProcessor for MaskTitleProcessor {
    fn apply(&self, input: Bytes) -> Result<Bytes> {
        let mut root: Value = serde_json::from_slice(&input)
            .map_err(|e| TrusteeError::Processing(format!("{MASK_TITLE_ID}: payload is not JSON: {e}")))?;
        Self::mask(&mut root);
        Ok(Bytes::from(serde_json::to_vec(&root)?))
    }
}

/// Known services and the processors that can run locally
pub struct ServiceRegistry {
    descriptors: RwLock<Vec<ServiceDescriptor>>,
    processors: RwLock<HashMap<String, Arc<dyn AssetProcessor>>>,
}

impl ServiceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(Vec::new()),
            processors: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in processors
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_processor(MaskTitleProcessor::descriptor(), MaskTitleProcessor);
        registry
    }

    /// Publish a descriptor backed by a local processor
    pub fn register_processor(
        &self,
        descriptor: ServiceDescriptor,
        processor: impl AssetProcessor + 'static,
    ) {
        self.processors
            .write()
            .insert(descriptor.id.clone(), Arc::new(processor));
        self.add(descriptor);
    }

    /// Insert or replace a descriptor by id
    pub fn add(&self, descriptor: ServiceDescriptor) {
        let mut descriptors = self.descriptors.write();
        match descriptors.iter_mut().find(|d| d.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => descriptors.push(descriptor),
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut descriptors = self.descriptors.write();
        let before = descriptors.len();
        descriptors.retain(|d| d.id != id);
        descriptors.len() != before
    }

    pub fn list(&self) -> Vec<ServiceDescriptor> {
        self.descriptors.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<ServiceDescriptor> {
        self.descriptors.read().iter().find(|d| d.id == id).cloned()
    }

    pub fn processor(&self, id: &str) -> Option<Arc<dyn AssetProcessor>> {
        self.processors.read().get(id).cloned()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("descriptors", &self.descriptors.read().len())
            .field("processors", &self.processors.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
