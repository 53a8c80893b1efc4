use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// The ID of a scalar variable which could be constrained.
    VarId
);
id_type!(
    /// The ID of a handle, i.e. a draggable 2D point.
    HandleId
);
id_type!(
    /// The ID of a high-level constraint.
    ConstraintId
);

/// Generates an incrementing sequence of IDs starting from 0.
/// IDs are never reused, so a stale ID is always detectable.
#[derive(Default, Debug, Clone)]
pub struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    /// Generates an incrementing sequence of IDs starting from 0.
    pub fn next_id(&mut self) -> u32 {
        let out = self.next;
        self.next += 1;
        out
    }

    /// Make sure no future ID collides with `seen`.
    /// Used when restoring IDs from persisted state.
    pub(crate) fn observe(&mut self, seen: u32) {
        self.next = self.next.max(seen + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_skips_past_restored_ids() {
        let mut ids = IdGenerator::default();
        assert_eq!(ids.next_id(), 0);
        ids.observe(7);
        assert_eq!(ids.next_id(), 8);
        // Observing an older ID never rewinds.
        ids.observe(2);
        assert_eq!(ids.next_id(), 9);
    }
}
