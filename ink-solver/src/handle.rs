use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{
    error::SolverError,
    id::{HandleId, VarId},
    variable::Variables,
};

/// A position in the sketch plane.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Either X or Y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    /// Horizontal.
    X,
    /// Vertical.
    Y,
}

/// A draggable point, made of two coordinate variables.
#[derive(Clone, Debug)]
pub struct Handle {
    id: HandleId,
    x: VarId,
    y: VarId,
    absorbed: IndexSet<HandleId>,
    absorbed_into: Option<HandleId>,
}

impl Handle {
    /// This handle's ID.
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The variable holding this handle's X coordinate.
    pub fn x(&self) -> VarId {
        self.x
    }

    /// The variable holding this handle's Y coordinate.
    pub fn y(&self) -> VarId {
        self.y
    }

    /// The variable holding the given coordinate.
    pub fn var(&self, component: Component) -> VarId {
        match component {
            Component::X => self.x,
            Component::Y => self.y,
        }
    }

    /// Handles that were dragged onto this one.
    pub fn absorbed_handles(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.absorbed.iter().copied()
    }

    /// The handle this one was dragged onto, if any.
    pub fn absorbed_into(&self) -> Option<HandleId> {
        self.absorbed_into
    }

    fn forget_absorbed_handles(&mut self) {
        self.absorbed.clear();
        self.absorbed_into = None;
    }
}

/// Every live handle, in creation order.
#[derive(Default, Clone, Debug)]
pub(crate) struct Handles {
    map: IndexMap<HandleId, Handle>,
}

impl Handles {
    pub fn insert(&mut self, id: HandleId, x: VarId, y: VarId) {
        self.map.insert(
            id,
            Handle {
                id,
                x,
                y,
                absorbed: IndexSet::new(),
                absorbed_into: None,
            },
        );
    }

    pub fn get(&self, id: HandleId) -> Result<&Handle, SolverError> {
        self.map.get(&id).ok_or(SolverError::HandleNotFound(id))
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.map.values()
    }

    pub fn remove(&mut self, id: HandleId) -> Option<Handle> {
        let removed = self.map.shift_remove(&id)?;
        for h in self.map.values_mut() {
            h.absorbed.shift_remove(&id);
            if h.absorbed_into == Some(id) {
                h.absorbed_into = None;
            }
        }
        Some(removed)
    }

    /// The handle, if any, that owns this coordinate variable.
    pub fn owner_of(&self, var: VarId) -> Option<HandleId> {
        self.map
            .values()
            .find(|h| h.x == var || h.y == var)
            .map(|h| h.id)
    }

    /// The coordinate variables of a handle, as `(x, y)`.
    pub fn coords(&self, id: HandleId) -> Result<(VarId, VarId), SolverError> {
        let h = self.get(id)?;
        Ok((h.x, h.y))
    }

    /// Do two handles denote the same point, i.e. are both coordinates unified?
    pub fn equals(&self, vars: &Variables, a: HandleId, b: HandleId) -> Result<bool, SolverError> {
        let a = self.get(a)?;
        let b = self.get(b)?;
        Ok(vars.equals(a.x, b.x) && vars.equals(a.y, b.y))
    }

    /// Reset absorption bookkeeping on every handle.
    pub fn forget_absorbed_handles(&mut self) {
        for h in self.map.values_mut() {
            h.forget_absorbed_handles();
        }
    }

    /// Record that `child` was dragged onto `parent`.
    /// Bookkeeping is flattened like variable unification: `child`, and
    /// everything it had absorbed, ends up absorbed by `parent`'s root.
    pub fn absorb(&mut self, parent: HandleId, child: HandleId) -> Result<(), SolverError> {
        self.get(child)?;
        let mut root = parent;
        while let Some(next) = self.get(root)?.absorbed_into {
            root = next;
        }
        if root == child {
            return Ok(());
        }
        let child_root = {
            let mut r = child;
            while let Some(next) = self.get(r)?.absorbed_into {
                r = next;
            }
            r
        };
        if child_root == root {
            return Ok(());
        }
        let adopted: Vec<HandleId> = {
            let h = self
                .map
                .get_mut(&child_root)
                .ok_or(SolverError::HandleNotFound(child_root))?;
            h.absorbed_into = Some(root);
            h.absorbed.drain(..).collect()
        };
        for member in &adopted {
            if let Some(h) = self.map.get_mut(member) {
                h.absorbed_into = Some(root);
            }
        }
        let h = self
            .map
            .get_mut(&root)
            .ok_or(SolverError::HandleNotFound(root))?;
        h.absorbed.insert(child_root);
        h.absorbed.extend(adopted);
        Ok(())
    }
}
