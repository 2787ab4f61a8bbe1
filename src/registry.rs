use crate::model::Control;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("control id `{0}` registered twice")]
    Duplicate(String),
    #[error("unknown control id `{0}`")]
    Unknown(String),
}

/// Typed mapping from control id to control instance. Iteration order is
/// lexical by id, which is what makes repeated runs emit identically ordered
/// reports. Registering never invokes any control logic.
pub struct ControlRegistry {
    controls: BTreeMap<String, Box<dyn Control>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self { controls: BTreeMap::new() }
    }

    /// Registry populated with the full benchmark control set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for control in crate::controls::defaults() {
            // The default set is statically unique; a duplicate here is a bug.
            registry
                .register(control)
                .unwrap_or_else(|e| panic!("default control set: {e}"));
        }
        registry
    }

    /// Duplicate ids are a data-integrity fault in whoever populates the
    /// registry; they abort registration instead of silently preferring one
    /// definition.
    pub fn register(&mut self, control: Box<dyn Control>) -> Result<(), RegistryError> {
        let id = control.id().to_string();
        if self.controls.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        self.controls.insert(id, control);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&dyn Control, RegistryError> {
        self.controls
            .get(id)
            .map(|c| c.as_ref())
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))
    }

    /// Keep only the listed ids. Unknown ids are rejected so a typo in a
    /// `--controls` filter surfaces instead of silently shrinking the run.
    pub fn retain(&mut self, ids: &[String]) -> Result<(), RegistryError> {
        for id in ids {
            if !self.controls.contains_key(id) {
                return Err(RegistryError::Unknown(id.clone()));
            }
        }
        self.controls.retain(|id, _| ids.iter().any(|wanted| wanted == id));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Control> {
        self.controls.values().map(|c| c.as_ref())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.controls.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize { self.controls.len() }
    pub fn is_empty(&self) -> bool { self.controls.is_empty() }
}

impl Default for ControlRegistry {
    fn default() -> Self { Self::new() }
}
