//! Pipeline - ordered processing blocks over one tree
//!
//! `run_map` converts the host map once, runs every stage on the same tree and
//! applies the top-level key diff once at the end. Keys added by an earlier
//! stage are therefore visible to later stages, while keys the caller already
//! had are left untouched.

use std::rc::Rc;
use tdv_core::{merge_new_keys, Bridge, Context, ContextRef, Map, ProcessingBlock, Result};
use tracing::{debug, info};

use crate::service::TARGET;

#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<ProcessingBlock>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn push(&mut self, block: ProcessingBlock) {
        self.stages.push(block);
    }

    /// Builder form of [`push`](Self::push)
    pub fn with_stage(mut self, block: ProcessingBlock) -> Self {
        self.push(block);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Unit types in execution order
    pub fn unit_types(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(ProcessingBlock::unit_type)
    }

    /// Run every stage on the tree, stopping at the first failure
    pub fn run(&self, ctx: &ContextRef) -> Result<()> {
        for (index, stage) in self.stages.iter().enumerate() {
            debug!(target: TARGET, index, unit_type = stage.unit_type(), "run stage");
            stage.process(ctx)?;
        }
        Ok(())
    }

    /// Run every stage on a host map; returns the number of keys added
    ///
    /// On failure the map is left as it was.
    pub fn run_map(&self, target: &mut Map) -> Result<usize> {
        let Some(first) = self.stages.first() else {
            return Ok(0);
        };
        let bridge: Rc<dyn Bridge> = Rc::clone(first.bridge());
        let tree = Context::from_map(bridge, target)?;
        self.run(&tree)?;
        let added = merge_new_keys(&tree, target)?;
        info!(target: TARGET, stages = self.len(), added, "pipeline finished");
        Ok(added)
    }
}
