pub mod archive;
pub mod merger;
pub mod settings;

use std::collections::BTreeMap;
use std::io::Read;
use std::rc::Rc;

use log::{info, warn};
use uuid::Uuid;

use crate::error::PanelError;
use crate::excellon;
use crate::geometry::{Coord, Point};
use crate::gerber;
use crate::layer::{BBox, GerberLayer, Layer, LayerFunction};

pub use archive::{read_batch, write_batch};
pub use merger::BatchMerger;
pub use settings::BatchSettings;

/// One board design: at most one layer per function.
#[derive(Debug, Clone)]
pub struct Batch {
    name: String,
    layers: BTreeMap<LayerFunction, Layer>,
}

impl Batch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            layers: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read a drawing and file it under its function.
    pub fn add_drawing<R: Read>(
        &mut self,
        name: &str,
        reader: R,
    ) -> Result<LayerFunction, PanelError> {
        let layer = gerber::read(name, reader)?;
        self.add_layer(Layer::Gerber(layer))
    }

    /// Read a drill file and file it under its function.
    pub fn add_drill<R: Read>(&mut self, name: &str, reader: R) -> Result<LayerFunction, PanelError> {
        let layer = excellon::read(name, reader)?;
        self.add_layer(Layer::Excellon(layer))
    }

    /// File a layer under its function, replacing any previous one.
    pub fn add_layer(&mut self, layer: Layer) -> Result<LayerFunction, PanelError> {
        let function = layer.function().ok_or_else(|| {
            PanelError::Format(format!("{}: cannot tell what the layer is for", layer.name()))
        })?;
        self.insert_layer(function, layer);
        Ok(function)
    }

    pub(crate) fn insert_layer(&mut self, function: LayerFunction, layer: Layer) {
        if let Some(old) = self.layers.insert(function, layer) {
            warn!(
                "{}: {} replaces {} as {function}",
                self.name,
                self.layers[&function].name(),
                old.name()
            );
        } else {
            info!("{}: added {function}", self.name);
        }
    }

    pub fn layer(&self, function: LayerFunction) -> Option<&Layer> {
        self.layers.get(&function)
    }

    /// Layers in function order.
    pub fn layers(&self) -> impl Iterator<Item = (LayerFunction, &Layer)> {
        self.layers.iter().map(|(f, l)| (*f, l))
    }

    pub fn functions(&self) -> impl Iterator<Item = LayerFunction> + '_ {
        self.layers.keys().copied()
    }

    pub fn outline(&self) -> Option<&GerberLayer> {
        match self.layers.get(&LayerFunction::EdgeCuts) {
            Some(Layer::Gerber(g)) => Some(g),
            _ => None,
        }
    }

    fn outline_bbox(&self) -> Option<BBox> {
        self.outline().map(GerberLayer::bbox).filter(|b| !b.is_empty())
    }

    pub fn width(&self) -> Coord {
        self.outline_bbox().map_or(Coord::ZERO, |b| b.width())
    }

    pub fn height(&self) -> Coord {
        self.outline_bbox().map_or(Coord::ZERO, |b| b.height())
    }

    /// Minimum corner of the outline bounds, the origin when there is no outline.
    pub fn top_left(&self) -> Point {
        self.outline_bbox()
            .map_or(Point::default(), |b| Point::new(b.minx, b.miny))
    }

    pub fn bottom_right(&self) -> Point {
        self.outline_bbox()
            .map_or(Point::default(), |b| Point::new(b.maxx, b.maxy))
    }
}

/// A batch placed on the panel.
#[derive(Debug, Clone)]
pub struct BatchInstance {
    id: Uuid,
    batch: Rc<Batch>,
    offset: Point,
}

impl BatchInstance {
    pub fn new(id: Uuid, batch: Rc<Batch>, offset: Point) -> Self {
        Self {
            id,
            batch,
            offset,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn move_offset(&mut self, dx: Coord, dy: Coord) {
        self.offset = self.offset.offset(dx, dy);
    }

    pub fn top_left(&self) -> Point {
        self.batch.top_left().offset(self.offset.x, self.offset.y)
    }

    pub fn bottom_right(&self) -> Point {
        self.batch.bottom_right().offset(self.offset.x, self.offset.y)
    }

    pub fn width(&self) -> Coord {
        self.batch.width()
    }

    pub fn height(&self) -> Coord {
        self.batch.height()
    }
}
