//! Named component constructors.
//!
//! `@include:Name:{key:"value"}` instantiates a component by name. The
//! registry is owned by the application and passed to the renderer; it is
//! not a process-wide global.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{ComponentRef, HtmlComponent};
use crate::error::{Error, Result};
use crate::value::ValueMap;

/// Builds a component from inline props.
pub type Constructor = Arc<dyn Fn(ValueMap) -> Result<ComponentRef> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ComponentRegistry {
    constructors: Arc<DashMap<String, Constructor>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. Registering a name twice is an error.
    pub fn register<F>(&self, name: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn(ValueMap) -> Result<ComponentRef> + Send + Sync + 'static,
    {
        match self.constructors.entry(name.into()) {
            Entry::Occupied(entry) => Err(Error::DuplicateComponent { name: entry.key().clone() }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(constructor));
                Ok(())
            }
        }
    }

    /// Register a component built from a fixed template.
    pub fn register_template(&self, name: impl Into<String>, template: impl Into<String>) -> Result<()> {
        let name = name.into();
        let template = template.into();
        let component_name = name.clone();
        self.register(name, move |props| {
            Ok(HtmlComponent::new(component_name.clone(), template.clone(), props)?.into_ref())
        })
    }

    /// Instantiate the component registered under `name`.
    pub fn load(&self, name: &str, props: ValueMap) -> Result<ComponentRef> {
        // Clone the constructor out so the map shard is not locked while it runs.
        let constructor = self
            .constructors
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::UnknownComponent { name: name.to_string() })?;
        constructor(props)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("constructors", &self.constructors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn duplicate_registration_is_an_error() {
        let registry = ComponentRegistry::new();
        registry.register_template("Card", "<root>@prop:title</root>").unwrap();
        let err = registry.register_template("Card", "<p></p>").unwrap_err();
        assert!(matches!(err, Error::DuplicateComponent { name } if name == "Card"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn load_builds_with_props() {
        let registry = ComponentRegistry::new();
        registry.register_template("Card", "<root>@prop:title</root>").unwrap();
        let mut props = ValueMap::new();
        props.insert("title".into(), Value::from("Hi"));
        let card = registry.load("Card", props.clone()).unwrap();
        assert_eq!(card.name(), "Card");
        assert_eq!(card.props(), props);

        assert!(matches!(registry.load("Missing", ValueMap::new()), Err(Error::UnknownComponent { .. })));
    }
}
