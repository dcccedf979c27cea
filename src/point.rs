//! Elliptic-curve point group over a prime field
//!
//! Points live on y^2 = x^3 + ax + b. The identity element carries no
//! coordinates; two points only combine when they share (a, b).

use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};

use crate::error::{Result, ValidationError};
use crate::field::FieldElement;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Point {
    x: Option<FieldElement>,
    y: Option<FieldElement>,
    a: FieldElement,
    b: FieldElement,
}

impl Point {
    /// Creates a point, rejecting coordinates that do not satisfy the
    /// curve equation.
    pub fn new(x: FieldElement, y: FieldElement, a: FieldElement, b: FieldElement) -> Result<Self> {
        let lhs = y.mul(&y)?;
        let rhs = x.mul(&x)?.mul(&x)?.add(&a.mul(&x)?)?.add(&b)?;
        if lhs != rhs {
            return Err(ValidationError::Curve(format!(
                "point ({}, {}) is not on the curve",
                x.number(),
                y.number()
            )));
        }
        Ok(Point { x: Some(x), y: Some(y), a, b })
    }

    /// The identity element of the given curve.
    pub fn infinity(a: FieldElement, b: FieldElement) -> Self {
        Point { x: None, y: None, a, b }
    }

    pub fn is_infinity(&self) -> bool {
        self.x.is_none()
    }

    pub fn x(&self) -> Option<&FieldElement> {
        self.x.as_ref()
    }

    pub fn y(&self) -> Option<&FieldElement> {
        self.y.as_ref()
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        if self.a != other.a || self.b != other.b {
            return Err(ValidationError::Curve(
                "points are not on the same curve".to_string(),
            ));
        }

        let (x1, y1) = match (&self.x, &self.y) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok(other.clone()),
        };
        let (x2, y2) = match (&other.x, &other.y) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ok(self.clone()),
        };

        // Additive inverses: vertical line through the two points.
        if x1 == x2 && y1 != y2 {
            return Ok(Point::infinity(self.a.clone(), self.b.clone()));
        }

        let slope = if x1 == x2 {
            // Doubling; a vertical tangent yields the identity.
            if y1.number().is_zero() {
                return Ok(Point::infinity(self.a.clone(), self.b.clone()));
            }
            x1.mul(x1)?.scale(3).add(&self.a)?.div(&y1.scale(2))?
        } else {
            y2.sub(y1)?.div(&x2.sub(x1)?)?
        };

        let x3 = slope.mul(&slope)?.sub(x1)?.sub(x2)?;
        let y3 = slope.mul(&x1.sub(&x3)?)?.sub(y1)?;

        Ok(Point {
            x: Some(x3),
            y: Some(y3),
            a: self.a.clone(),
            b: self.b.clone(),
        })
    }

    /// Double-and-add scalar multiplication, O(log k) point additions.
    pub fn scalar_mul(&self, coefficient: &BigInt) -> Result<Self> {
        if coefficient.is_negative() {
            return Err(ValidationError::Curve("negative scalar".to_string()));
        }
        let mut coefficient = coefficient.clone();
        let mut current = self.clone();
        let mut result = Point::infinity(self.a.clone(), self.b.clone());
        while !coefficient.is_zero() {
            if coefficient.is_odd() {
                result = result.add(&current)?;
            }
            current = current.add(&current)?;
            coefficient >>= 1;
        }
        Ok(result)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.x, &self.y) {
            (Some(x), Some(y)) => write!(f, "Point({}, {})", x.number(), y.number()),
            _ => write!(f, "Point(infinity)"),
        }
    }
}
