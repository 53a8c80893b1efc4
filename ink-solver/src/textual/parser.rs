use super::{
    Label, Property, VarRef,
    instruction::{
        Absorb, Angle, DeclareHandle, DeclareVariable, Distance, Finger, Formula, Instruction,
        Linear, Lock, Pin, PolarVector,
    },
};
use crate::handle::Point;
use winnow::{
    Result as WResult,
    ascii::{digit1, space0, space1},
    combinator::{alt, delimited, opt, preceded},
    prelude::*,
    token::take_while,
};

impl Instruction {
    pub(crate) fn parse(i: &mut &str) -> WResult<Self> {
        alt((
            DeclareHandle::parse.map(Instruction::DeclareHandle),
            DeclareVariable::parse.map(Instruction::DeclareVariable),
            Pin::parse.map(Instruction::Pin),
            Finger::parse.map(Instruction::Finger),
            Absorb::parse.map(Instruction::Absorb),
            PolarVector::parse.map(Instruction::PolarVector),
            Distance::parse.map(Instruction::Distance),
            Angle::parse.map(Instruction::Angle),
            Linear::parse.map(Instruction::Linear),
            Formula::parse.map(Instruction::Formula),
            Lock::parse.map(Instruction::Lock),
        ))
        .parse_next(i)
    }
}

impl DeclareHandle {
    // handle a (0, 0)
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("handle").parse_next(i)?;
        let label = Label::parse(i)?;
        space1.parse_next(i)?;
        let position = Point::parse(i)?;
        Ok(Self { label, position })
    }
}

impl DeclareVariable {
    // var w 5
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("var").parse_next(i)?;
        let label = Label::parse(i)?;
        space1.parse_next(i)?;
        let value = parse_number(i)?;
        Ok(Self { label, value })
    }
}

impl Pin {
    // pin a
    // pin a (1, 2)
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("pin").parse_next(i)?;
        let handle = Label::parse(i)?;
        let position = opt(preceded(space1, Point::parse)).parse_next(i)?;
        Ok(Self { handle, position })
    }
}

impl Finger {
    // finger a (1, 2)
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("finger").parse_next(i)?;
        let handle = Label::parse(i)?;
        space1.parse_next(i)?;
        let position = Point::parse(i)?;
        Ok(Self { handle, position })
    }
}

impl Absorb {
    // absorb a b
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("absorb").parse_next(i)?;
        let parent = Label::parse(i)?;
        space1.parse_next(i)?;
        let child = Label::parse(i)?;
        Ok(Self { parent, child })
    }
}

impl PolarVector {
    // polar ab = a b
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("polar").parse_next(i)?;
        let (label, a, b) = between_two_handles(i)?;
        Ok(Self { label, a, b })
    }
}

impl Distance {
    // distance d = a b
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("distance").parse_next(i)?;
        let (label, a, b) = between_two_handles(i)?;
        Ok(Self { label, a, b })
    }
}

impl Angle {
    // angle t = a b
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("angle").parse_next(i)?;
        let (label, a, b) = between_two_handles(i)?;
        Ok(Self { label, a, b })
    }
}

impl Linear {
    // linear w = 2 * v + 3
    // linear w = -1 * v - 0.5
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("linear").parse_next(i)?;
        let y = VarRef::parse(i)?;
        (ws, '=', ws).parse_next(i)?;
        let m = parse_number(i)?;
        (ws, '*', ws).parse_next(i)?;
        let x = VarRef::parse(i)?;
        ws.parse_next(i)?;
        let sign = alt(('+'.value(1.0), '-'.value(-1.0))).parse_next(i)?;
        ws.parse_next(i)?;
        let b = sign * parse_number(i)?;
        Ok(Self { y, m, x, b })
    }
}

impl Formula {
    // formula r = w * v + u
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("formula").parse_next(i)?;
        let label = Label::parse(i)?;
        (ws, '=', ws).parse_next(i)?;
        let m = VarRef::parse(i)?;
        (ws, '*', ws).parse_next(i)?;
        let x = VarRef::parse(i)?;
        (ws, '+', ws).parse_next(i)?;
        let b = VarRef::parse(i)?;
        Ok(Self { label, m, x, b })
    }
}

impl Lock {
    // lock ab.distance
    // lock ab.distance 20
    fn parse(i: &mut &str) -> WResult<Self> {
        keyword("lock").parse_next(i)?;
        let variable = VarRef::parse(i)?;
        let value = opt(preceded(space1, parse_number)).parse_next(i)?;
        Ok(Self { variable, value })
    }
}

/// `<label> = <handle> <handle>`
fn between_two_handles(i: &mut &str) -> WResult<(Label, Label, Label)> {
    let label = Label::parse(i)?;
    (ws, '=', ws).parse_next(i)?;
    let a = Label::parse(i)?;
    space1.parse_next(i)?;
    let b = Label::parse(i)?;
    Ok((label, a, b))
}

/// An instruction's leading word, followed by at least one space.
fn keyword<'i>(word: &'static str) -> impl Parser<&'i str, (), winnow::error::ContextError> {
    (word, space1).void()
}

fn ws(i: &mut &str) -> WResult<()> {
    space0.parse_next(i).map(|_| ())
}

impl Label {
    fn parse(i: &mut &str) -> WResult<Self> {
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_')
            .map(Label::from)
            .parse_next(i)
    }
}

impl Property {
    fn parse(i: &mut &str) -> WResult<Self> {
        alt((
            "distance".value(Self::Distance),
            "angle".value(Self::Angle),
            'x'.value(Self::X),
            'y'.value(Self::Y),
        ))
        .parse_next(i)
    }
}

impl VarRef {
    fn parse(i: &mut &str) -> WResult<Self> {
        let label = Label::parse(i)?;
        let property = opt(preceded('.', Property::parse)).parse_next(i)?;
        Ok(Self { label, property })
    }
}

impl Point {
    // (1, -2.5)
    fn parse(i: &mut &str) -> WResult<Self> {
        delimited(
            ('(', ws),
            (parse_number, ws, ',', ws, parse_number),
            (ws, ')'),
        )
        .map(|(x, _, _, _, y)| Self { x, y })
        .parse_next(i)
    }
}

fn parse_number(i: &mut &str) -> WResult<f64> {
    fn myint(input: &mut &str) -> WResult<f64> {
        digit1
            .verify_map(|s: &str| s.parse::<f64>().ok())
            .parse_next(input)
    }

    fn myfloat(i: &mut &str) -> WResult<f64> {
        winnow::ascii::float.parse_next(i)
    }
    alt((myfloat, myint)).parse_next(i)
}
