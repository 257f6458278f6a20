use super::logged;
use crate::adapter::Persister;
use crate::error::Result;
use crate::resource::Resource;
use std::sync::Arc;
use tracing::debug;

/// Pipes every write through a chain of persisters. Each stage receives the
/// previous stage's output, so later stages see the id and timestamps assigned
/// by earlier ones.
#[derive(Clone)]
pub struct CompositePersister {
    stages: Vec<Arc<dyn Persister>>,
}

impl CompositePersister {
    pub fn new(stages: Vec<Arc<dyn Persister>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Persister for CompositePersister {
    #[tracing::instrument(skip_all, fields(stages = self.stages.len()))]
    fn save(&self, resource: &Resource) -> Result<Resource> {
        let mut current = resource.clone();
        for (stage, persister) in self.stages.iter().enumerate() {
            current = logged("composite", persister.save(&current))?;
            debug!(stage, id = ?current.id(), "Stage saved");
        }
        Ok(current)
    }

    #[tracing::instrument(skip_all, fields(stages = self.stages.len(), count = resources.len()))]
    fn save_all(&self, resources: &[Resource]) -> Result<Vec<Resource>> {
        let mut current = resources.to_vec();
        for persister in &self.stages {
            current = logged("composite", persister.save_all(&current))?;
        }
        Ok(current)
    }

    #[tracing::instrument(skip_all, fields(id = ?resource.id()))]
    fn delete(&self, resource: &Resource) -> Result<Resource> {
        for persister in &self.stages {
            logged("composite", persister.delete(resource))?;
        }
        Ok(resource.clone())
    }

    fn wipe(&self) -> Result<()> {
        for persister in &self.stages {
            logged("composite", persister.wipe())?;
        }
        Ok(())
    }
}
