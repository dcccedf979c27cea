//! Prime-field arithmetic

use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

use crate::error::{Result, ValidationError};

/// An element of a prime field, held as its canonical representative in
/// [0, prime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldElement {
    number: BigInt,
    prime: BigInt,
}

impl FieldElement {
    pub fn new(number: BigInt, prime: BigInt) -> Result<Self> {
        if number.is_negative() || number >= prime {
            return Err(ValidationError::Curve(format!(
                "number {number} not in field range 0..{prime}"
            )));
        }
        Ok(FieldElement { number, prime })
    }

    pub fn number(&self) -> &BigInt {
        &self.number
    }

    pub fn prime(&self) -> &BigInt {
        &self.prime
    }

    fn require_same_field(&self, other: &Self, operation: &str) -> Result<()> {
        if self.prime != other.prime {
            return Err(ValidationError::Curve(format!(
                "cannot {operation} two numbers in different fields"
            )));
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.require_same_field(other, "add")?;
        let number = (&self.number + &other.number).mod_floor(&self.prime);
        Ok(FieldElement { number, prime: self.prime.clone() })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.require_same_field(other, "subtract")?;
        let number = (&self.number - &other.number).mod_floor(&self.prime);
        Ok(FieldElement { number, prime: self.prime.clone() })
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.require_same_field(other, "multiply")?;
        let number = (&self.number * &other.number).mod_floor(&self.prime);
        Ok(FieldElement { number, prime: self.prime.clone() })
    }

    /// Multiplies by a small integer coefficient.
    pub fn scale(&self, coefficient: i64) -> Self {
        let number = (&self.number * BigInt::from(coefficient)).mod_floor(&self.prime);
        FieldElement { number, prime: self.prime.clone() }
    }

    /// Raises to an arbitrary integer power. The exponent is reduced mod
    /// prime-1, so negative exponents resolve through Fermat's little
    /// theorem: x^-k = x^(p-1-k).
    pub fn pow(&self, exponent: &BigInt) -> Self {
        let modulus = &self.prime - BigInt::one();
        let reduced = exponent.mod_floor(&modulus);
        let number = self.number.modpow(&reduced, &self.prime);
        FieldElement { number, prime: self.prime.clone() }
    }

    /// Field division: a / b = a * b^(p-2) mod p.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.require_same_field(other, "divide")?;
        if other.number.is_zero() {
            return Err(ValidationError::Curve("division by zero".to_string()));
        }
        let exponent = &self.prime - BigInt::from(2);
        let inverse = other.number.modpow(&exponent, &self.prime);
        let number = (&self.number * inverse).mod_floor(&self.prime);
        Ok(FieldElement { number, prime: self.prime.clone() })
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement_{}({})", self.prime, self.number)
    }
}
