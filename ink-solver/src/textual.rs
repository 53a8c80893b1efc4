//! A line-based text format for sketches, handy for tests, benchmarks and the CLI.
//!
//! ```text
//! # Comments start with '#'.
//! handle a (0, 0)
//! handle b (10, 0)
//! polar ab = a b
//! lock ab.distance 20
//! pin a
//! ```
//!
//! Variables are referred to as `a.x` / `a.y` for handle coordinates,
//! `ab.distance` / `ab.angle` for a polar vector's quantities, or just by
//! name for declared variables and for `distance`, `angle` and `formula` outputs.

mod executor;
mod instruction;
mod parser;

use std::str::FromStr;

pub use executor::Labels;
pub use instruction::{
    Absorb, Angle, DeclareHandle, DeclareVariable, Distance, Finger, Formula, Instruction, Linear,
    Lock, Pin, PolarVector,
};
use winnow::Parser;

use crate::error::TextualError;

/// Name of a handle, variable or constraint.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct Label(String);

impl Label {
    /// The label as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl PartialEq<&str> for Label {
    fn eq(&self, other: &&str) -> bool {
        &self.0 == other
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named quantity belonging to a label.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum Property {
    /// Handle X coordinate.
    X,
    /// Handle Y coordinate.
    Y,
    /// Polar vector length.
    Distance,
    /// Polar vector angle.
    Angle,
}

impl Property {
    fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Distance => "distance",
            Self::Angle => "angle",
        }
    }
}

/// Reference to a scalar variable, like `a.x` or `w`.
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct VarRef {
    /// What it belongs to, or its own name.
    pub label: Label,
    /// Which quantity of `label`, if it has several.
    pub property: Option<Property>,
}

impl std::fmt::Display for VarRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.property {
            Some(p) => write!(f, "{}.{}", self.label, p.as_str()),
            None => write!(f, "{}", self.label),
        }
    }
}

/// A parsed textual sketch.
#[derive(Debug)]
pub struct Problem {
    /// Every instruction, in file order.
    pub instructions: Vec<Instruction>,
}

impl FromStr for Problem {
    type Err = TextualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Problem {
    /// Parse a whole file. Blank lines and comments are skipped.
    pub fn parse(text: &str) -> Result<Self, TextualError> {
        let mut instructions = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = match raw.split_once('#') {
                Some((before, _comment)) => before,
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let instruction = Instruction::parse.parse(line).map_err(|_| TextualError::Parse {
                line: i + 1,
                text: line.to_owned(),
            })?;
            instructions.push(instruction);
        }
        Ok(Self { instructions })
    }

    /// Labels of every declared handle, in order.
    pub fn handles(&self) -> Vec<&Label> {
        self.instructions
            .iter()
            .filter_map(|instr| match instr {
                Instruction::DeclareHandle(h) => Some(&h.label),
                _ => None,
            })
            .collect()
    }
}
