//! Replay — fold an ordered event sequence into the live canvas.
//!
//! DESIGN
//! ======
//! Pure and total. Shapes are keyed by id; `object_added` and
//! `object_modified` shallow-merge their payload over whatever is already
//! there, `object_removed` drops the id, `canvas_clear` drops everything.
//! Events with no usable id and unknown event types are skipped, never
//! rejected.
//!
//! Output order follows first insertion of each id so results are
//! deterministic; callers must not rely on it for correctness.

use std::collections::HashMap;

use serde_json::Value;

use crate::event::{Event, EventKind, Shape};

/// Fold `events` into the list of live shapes.
#[must_use]
pub fn reconstruct<'a>(events: impl IntoIterator<Item = &'a Event>) -> Vec<Shape> {
    let mut canvas = Canvas::new();
    for event in events {
        canvas.apply(event);
    }
    canvas.into_shapes()
}

/// Live shapes keyed by id, with the insertion rank used for output order.
#[derive(Debug, Default)]
pub struct Canvas {
    shapes: HashMap<String, (u64, Shape)>,
    next_rank: u64,
}

impl Canvas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &Event) {
        match event.kind() {
            EventKind::CanvasClear => self.shapes.clear(),
            EventKind::ObjectRemoved => {
                if let Some(id) = event.shape_id() {
                    self.shapes.remove(&id);
                }
            }
            EventKind::ObjectAdded | EventKind::ObjectModified => {
                let Some(Value::Object(payload)) = event.payload() else {
                    return;
                };
                let Some(id) = event.shape_id() else {
                    return;
                };
                let next_rank = &mut self.next_rank;
                let (_, shape) = self.shapes.entry(id).or_insert_with(|| {
                    let rank = *next_rank;
                    *next_rank += 1;
                    (rank, Shape::new())
                });
                for (key, value) in payload {
                    shape.insert(key.clone(), value.clone());
                }
            }
            EventKind::Unknown => {}
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Shape> {
        self.shapes.get(id).map(|(_, shape)| shape)
    }

    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    #[must_use]
    pub fn into_shapes(self) -> Vec<Shape> {
        let mut ranked: Vec<(u64, Shape)> = self.shapes.into_values().collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, shape)| shape).collect()
    }
}

#[cfg(test)]
#[path = "replay_test.rs"]
mod tests;
