//! At most one [`Model`] per [`ModelKey`].

use std::{collections::HashMap, sync::Arc};

use tracing::info;

use super::{Model, ModelKey};

/// Read/extend-only store of built models.
#[derive(Debug, Default)]
pub struct ModelCache {
    models: HashMap<ModelKey, Arc<Model>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared model for `key`, building it on first use.
    pub fn get_or_build(&mut self, key: ModelKey) -> Arc<Model> {
        if let Some(model) = self.models.get(&key) {
            info!(query_size = key.query_size, "reusing cached model");
            return Arc::clone(model);
        }
        info!(
            mdp = %key.mdp_kind,
            query_size = key.query_size,
            no_planning = key.no_planning,
            optimize = key.optimize,
            discrete = key.discrete,
            "building model"
        );
        let model = Arc::new(Model::new(key));
        self.models.insert(key, Arc::clone(&model));
        model
    }

    pub fn get(&self, key: &ModelKey) -> Option<Arc<Model>> {
        self.models.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{config::IrdConfig, mdp::BanditsMdp, model::ModelSpec};

    #[test]
    fn same_key_same_instance() {
        let config = IrdConfig::builder().feature_dim(2).build().unwrap();
        let mdp = BanditsMdp::new(array![[1.0, 0.0], [0.0, 1.0]], 0).unwrap().into();
        let mut cache = ModelCache::new();
        let a = cache.get_or_build(ModelKey::new(&config, &mdp, ModelSpec::new(2)));
        let b = cache.get_or_build(ModelKey::new(&config, &mdp, ModelSpec::new(2)));
        let c = cache.get_or_build(ModelKey::new(&config, &mdp, ModelSpec::new(3)));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }
}
