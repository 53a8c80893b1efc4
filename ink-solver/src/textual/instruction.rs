use super::{Label, VarRef};
use crate::handle::Point;

/// One line of a textual sketch.
#[derive(Debug, PartialEq)]
pub enum Instruction {
    /// Declares a handle.
    DeclareHandle(DeclareHandle),
    /// Declares a free-standing variable.
    DeclareVariable(DeclareVariable),
    /// Holds a handle in place.
    Pin(Pin),
    /// Drags a handle.
    Finger(Finger),
    /// Merges one handle into another.
    Absorb(Absorb),
    /// Owns the distance and angle between two handles.
    PolarVector(PolarVector),
    /// Owns the distance between two handles.
    Distance(Distance),
    /// Owns the angle between two handles.
    Angle(Angle),
    /// Unifies two variables.
    Linear(Linear),
    /// Owns a variable computed from three others.
    Formula(Formula),
    /// Locks a variable.
    Lock(Lock),
}

/// `handle a (x, y)`
#[derive(Debug, PartialEq)]
pub struct DeclareHandle {
    pub(crate) label: Label,
    pub(crate) position: Point,
}

/// `var w 5`
#[derive(Debug, PartialEq)]
pub struct DeclareVariable {
    pub(crate) label: Label,
    pub(crate) value: f64,
}

/// `pin a` or `pin a (x, y)`. Without a position, pins where the handle is.
#[derive(Debug, PartialEq)]
pub struct Pin {
    pub(crate) handle: Label,
    pub(crate) position: Option<Point>,
}

/// `finger a (x, y)`
#[derive(Debug, PartialEq)]
pub struct Finger {
    pub(crate) handle: Label,
    pub(crate) position: Point,
}

/// `absorb parent child`
#[derive(Debug, PartialEq)]
pub struct Absorb {
    pub(crate) parent: Label,
    pub(crate) child: Label,
}

/// `polar ab = a b`
#[derive(Debug, PartialEq)]
pub struct PolarVector {
    pub(crate) label: Label,
    pub(crate) a: Label,
    pub(crate) b: Label,
}

/// `distance d = a b`
#[derive(Debug, PartialEq)]
pub struct Distance {
    pub(crate) label: Label,
    pub(crate) a: Label,
    pub(crate) b: Label,
}

/// `angle t = a b`
#[derive(Debug, PartialEq)]
pub struct Angle {
    pub(crate) label: Label,
    pub(crate) a: Label,
    pub(crate) b: Label,
}

/// `linear y = m * x + b`, where `m` and `b` are numbers.
#[derive(Debug, PartialEq)]
pub struct Linear {
    pub(crate) y: VarRef,
    pub(crate) m: f64,
    pub(crate) x: VarRef,
    pub(crate) b: f64,
}

/// `formula r = m * x + b`, where `m`, `x` and `b` are variables.
#[derive(Debug, PartialEq)]
pub struct Formula {
    pub(crate) label: Label,
    pub(crate) m: VarRef,
    pub(crate) x: VarRef,
    pub(crate) b: VarRef,
}

/// `lock v` or `lock v 20`
#[derive(Debug, PartialEq)]
pub struct Lock {
    pub(crate) variable: VarRef,
    pub(crate) value: Option<f64>,
}
