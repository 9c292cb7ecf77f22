use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::{debug, info};
use uuid::Uuid;

use crate::canvas::Canvas;
use crate::error::PanelError;
use crate::features::Feature;
use crate::geometry::{Coord, Point};
use crate::layer::LayerFunction;
use crate::merge::Merger;

use super::{Batch, BatchInstance};

/// Places batches on a panel and merges them, one layer function at a time.
#[derive(Debug)]
pub struct BatchMerger {
    name: String,
    batches: Vec<(Uuid, Rc<Batch>)>,
    instances: Vec<BatchInstance>,
    features: Vec<Feature>,
    mergers: BTreeMap<LayerFunction, Merger>,
}

impl BatchMerger {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            batches: Vec::new(),
            instances: Vec::new(),
            features: Vec::new(),
            mergers: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a batch for placement.
    pub fn add_batch(&mut self, batch: Batch) -> Uuid {
        let id = Uuid::new_v4();
        info!("Registered batch {} as {id}", batch.name());
        self.batches.push((id, Rc::new(batch)));
        id
    }

    pub fn batch(&self, id: Uuid) -> Option<&Batch> {
        self.batch_rc(id).map(|b| b.as_ref())
    }

    fn batch_rc(&self, id: Uuid) -> Option<&Rc<Batch>> {
        self.batches.iter().find(|(b, _)| *b == id).map(|(_, b)| b)
    }

    pub fn batch_name(&self, id: Uuid) -> Option<&str> {
        self.batch(id).map(Batch::name)
    }

    pub fn batch_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.batches.iter().map(|(id, _)| *id)
    }

    /// The batch with an outline, for placement.
    fn placeable(&self, batch_id: Uuid) -> Result<Rc<Batch>, PanelError> {
        let batch = self
            .batch_rc(batch_id)
            .ok_or_else(|| PanelError::Merge(format!("unknown batch {batch_id}")))?;
        if batch.outline().is_none() {
            return Err(PanelError::Merge(format!(
                "{}: no outline layer",
                batch.name()
            )));
        }
        Ok(Rc::clone(batch))
    }

    /// Place a batch with the given raw offset.
    pub fn add_batch_instance(
        &mut self,
        id: Uuid,
        batch_id: Uuid,
        offset: Point,
    ) -> Result<(), PanelError> {
        let batch = self.placeable(batch_id)?;
        debug!("Placing {} as {id} at offset {offset}", batch.name());
        self.instances
            .push(BatchInstance::new(id, batch, offset));
        Ok(())
    }

    /// Place a batch so that the minimum corner of its outline lands on (x, y).
    pub fn place_batch_instance(
        &mut self,
        batch_id: Uuid,
        x: Coord,
        y: Coord,
    ) -> Result<Uuid, PanelError> {
        let batch = self.placeable(batch_id)?;
        let corner = batch.top_left();
        let id = Uuid::new_v4();
        self.add_batch_instance(id, batch_id, Point::new(x - corner.x, y - corner.y))?;
        Ok(id)
    }

    pub fn batch_instances(&self) -> &[BatchInstance] {
        &self.instances
    }

    pub fn batch_instance_mut(&mut self, id: Uuid) -> Option<&mut BatchInstance> {
        self.instances.iter_mut().find(|i| i.id() == id)
    }

    pub fn remove_batch_instance(&mut self, id: Uuid) -> Option<BatchInstance> {
        let index = self.instances.iter().position(|i| i.id() == id)?;
        Some(self.instances.remove(index))
    }

    pub fn add_feature(&mut self, feature: impl Into<Feature>) -> Uuid {
        let feature = feature.into();
        let id = feature.id();
        self.features.push(feature);
        id
    }

    pub fn feature_mut(&mut self, id: Uuid) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.id() == id)
    }

    pub fn remove_feature(&mut self, id: Uuid) -> Option<Feature> {
        let index = self.features.iter().position(|f| f.id() == id)?;
        Some(self.features.remove(index))
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Forget every batch, instance, feature and merged layer.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.instances.clear();
        self.features.clear();
        self.mergers.clear();
    }

    /// Rebuild the merged layer of `function` from every placed instance, then apply
    /// the features that affect it.
    ///
    /// Features computed against this layer are recalculated from the fresh result,
    /// so the outline must be merged before layers whose edits depend on it. The new
    /// layer is built aside and only stored once every step succeeded; on error the
    /// previous merged layer and feature state are kept.
    pub fn merge_layer(&mut self, function: LayerFunction) -> Result<(), PanelError> {
        let mut merger = match self.mergers.get(&function) {
            Some(existing) => existing.clone(),
            None => Merger::new(&self.name, function),
        };
        merger.clean();

        for instance in &self.instances {
            let batch = instance.batch();
            if batch.outline().is_none() {
                return Err(PanelError::Merge(format!(
                    "{}: no outline layer",
                    batch.name()
                )));
            }
            if let Some(layer) = batch.layer(function) {
                let offset = instance.offset();
                merger.add(layer, offset.x, offset.y)?;
            }
        }

        let mut canvas = Canvas::new();
        let mut features = self.features.clone();
        merger.draw(&mut canvas);
        canvas.recalculate(function, &mut features);
        if features
            .iter()
            .any(|f| f.is_valid() && f.affects(function))
        {
            merger.apply_features(&canvas, &features)?;
        }

        self.mergers.insert(function, merger);
        self.features = features;
        info!("Merged {function} from {} instances", self.instances.len());
        Ok(())
    }

    /// Merge every function present in a placed batch or touched by a feature, in
    /// function order. Merged layers no longer needed are dropped.
    ///
    /// If any function fails, every merged layer is restored to its state before
    /// the call.
    pub fn merge(&mut self) -> Result<(), PanelError> {
        let mut functions: BTreeSet<LayerFunction> = self
            .instances
            .iter()
            .flat_map(|i| i.batch().functions())
            .collect();
        for feature in &self.features {
            functions.extend(LayerFunction::ALL.into_iter().filter(|f| feature.affects(*f)));
        }

        let mergers = self.mergers.clone();
        let features = self.features.clone();
        for function in &functions {
            if let Err(e) = self.merge_layer(*function) {
                self.mergers = mergers;
                self.features = features;
                return Err(e);
            }
        }
        self.mergers.retain(|f, _| functions.contains(f));
        Ok(())
    }

    /// The current merged layers as one batch named after the panel.
    pub fn merged_batch(&self) -> Batch {
        let mut batch = Batch::new(&self.name);
        for (function, merger) in &self.mergers {
            batch.insert_layer(*function, merger.layer());
        }
        batch
    }
}
