//! Service container for dependency injection
//!
//! Wires settings and an object source into ready-to-use services.

use std::sync::Arc;

use crate::application::{Reconciler, TreeBuilder};
use crate::config::Settings;
use crate::infrastructure::traits::ObjectSource;

/// Container holding settings and the shared object source.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Remote object source
    pub source: Arc<dyn ObjectSource>,
}

impl ServiceContainer {
    pub fn new(settings: Settings, source: Arc<dyn ObjectSource>) -> Self {
        Self {
            settings: Arc::new(settings),
            source,
        }
    }

    /// A builder configured from the settings.
    pub fn tree_builder(&self) -> TreeBuilder {
        TreeBuilder::new(Arc::clone(&self.source)).with_options(self.settings.build)
    }

    /// A reconciler for the configured root.
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.tree_builder(), self.settings.root_id)
    }
}
