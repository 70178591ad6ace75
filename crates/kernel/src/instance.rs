use realm_common::{InstanceId, Position};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Errors building or querying the instance table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstanceError {
    #[error("instance {id} has a zero dimension ({x_size}x{y_size})")]
    ZeroSize { id: InstanceId, x_size: u32, y_size: u32 },
    #[error("cell ({x}, {y}) is outside instance {id}")]
    OutOfBounds { id: InstanceId, x: u32, y: u32 },
    #[error("instance {0} is already loaded")]
    Duplicate(InstanceId),
    #[error("unknown instance {0}")]
    Unknown(InstanceId),
}

/// Dense row-major grid addressed by `(x, y)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: u32,
    height: u32,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            cells: vec![value; width as usize * height as usize],
        }
    }
}

impl<T> Grid<T> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        self.index(x, y).map(|i| &self.cells[i])
    }

    /// Overwrite one cell. Returns `false` if `(x, y)` is out of range.
    pub fn set(&mut self, x: u32, y: u32, value: T) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.cells[i] = value;
                true
            }
            None => false,
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }
}

/// One world partition: its grid, terrain heights, blocked cells and tags.
///
/// Grid cells are one world unit square; a position maps to the cell it
/// falls in by flooring each coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    height_map: Grid<f32>,
    collision_map: Grid<bool>,
    tags: BTreeSet<String>,
}

impl Instance {
    pub fn new(
        id: InstanceId,
        name: impl Into<String>,
        x_size: u32,
        y_size: u32,
    ) -> Result<Self, InstanceError> {
        if x_size == 0 || y_size == 0 {
            return Err(InstanceError::ZeroSize { id, x_size, y_size });
        }
        Ok(Self {
            id,
            name: name.into(),
            height_map: Grid::filled(x_size, y_size, 0.0),
            collision_map: Grid::filled(x_size, y_size, false),
            tags: BTreeSet::new(),
        })
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn x_size(&self) -> u32 {
        self.collision_map.width()
    }

    pub fn y_size(&self) -> u32 {
        self.collision_map.height()
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Mark a cell as impassable.
    pub fn block(&mut self, x: u32, y: u32) -> Result<(), InstanceError> {
        if self.collision_map.set(x, y, true) {
            Ok(())
        } else {
            Err(InstanceError::OutOfBounds { id: self.id, x, y })
        }
    }

    pub fn set_height(&mut self, x: u32, y: u32, height: f32) -> Result<(), InstanceError> {
        if self.height_map.set(x, y, height) {
            Ok(())
        } else {
            Err(InstanceError::OutOfBounds { id: self.id, x, y })
        }
    }

    /// Cell containing `pos`, or `None` if it lies outside the grid.
    pub fn cell_of(&self, pos: Position) -> Option<(u32, u32)> {
        if !pos.is_finite() || pos.x < 0.0 || pos.y < 0.0 {
            return None;
        }
        let (x, y) = (pos.x.floor(), pos.y.floor());
        if x >= f64::from(self.x_size()) || y >= f64::from(self.y_size()) {
            return None;
        }
        Some((x as u32, y as u32))
    }

    pub fn height_at(&self, pos: Position) -> Option<f32> {
        let (x, y) = self.cell_of(pos)?;
        self.height_map.get(x, y).copied()
    }

    /// Whether an entity may not stand at `pos`: off the grid, or on a
    /// blocked cell.
    pub fn is_blocked(&self, pos: Position) -> bool {
        match self.cell_of(pos) {
            Some((x, y)) => self.collision_map.get(x, y).copied().unwrap_or(true),
            None => true,
        }
    }
}

/// All loaded instances. Built during world load, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct InstanceTable {
    instances: BTreeMap<InstanceId, Instance>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instance: Instance) -> Result<(), InstanceError> {
        if self.instances.contains_key(&instance.id) {
            return Err(InstanceError::Duplicate(instance.id));
        }
        tracing::debug!(
            id = %instance.id,
            name = %instance.name,
            x_size = instance.x_size(),
            y_size = instance.y_size(),
            "instance loaded"
        );
        self.instances.insert(instance.id, instance);
        Ok(())
    }

    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(&id)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    /// Collision check for a candidate position inside `instance`.
    pub fn detect_collision(&self, instance: InstanceId, pos: Position) -> Result<bool, InstanceError> {
        self.get(instance)
            .map(|i| i.is_blocked(pos))
            .ok_or(InstanceError::Unknown(instance))
    }
}
