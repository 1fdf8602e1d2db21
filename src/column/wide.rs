//! 256-bit integers for Int256/UInt256 and Decimal256 columns.
//!
//! Values are four little-endian u64 limbs; `I256` is two's complement.
//! Only the arithmetic the codecs need is provided: conversion to and from
//! decimal text, multiplication and division by small factors.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256(pub [u64; 4]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct I256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *limb = u64::from_le_bytes(raw);
        }
        U256(limbs)
    }

    pub fn to_le_bytes(self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (chunk, limb) in bytes.chunks_exact_mut(8).zip(self.0) {
            chunk.copy_from_slice(&limb.to_le_bytes());
        }
        bytes
    }

    pub fn is_zero(self) -> bool {
        self.0 == [0; 4]
    }

    pub fn to_u128(self) -> Option<u128> {
        if self.0[2] != 0 || self.0[3] != 0 {
            return None;
        }
        Some(((self.0[1] as u128) << 64) | self.0[0] as u128)
    }

    pub fn checked_mul_small(self, factor: u64) -> Option<Self> {
        let mut out = [0u64; 4];
        let mut carry = 0u128;
        for (i, limb) in self.0.iter().enumerate() {
            let product = *limb as u128 * factor as u128 + carry;
            out[i] = product as u64;
            carry = product >> 64;
        }
        (carry == 0).then_some(U256(out))
    }

    pub fn checked_add_small(self, addend: u64) -> Option<Self> {
        let mut out = self.0;
        let mut carry = addend;
        for limb in out.iter_mut() {
            if carry == 0 {
                break;
            }
            let (sum, overflow) = limb.overflowing_add(carry);
            *limb = sum;
            carry = overflow as u64;
        }
        (carry == 0).then_some(U256(out))
    }

    /// Divide by a non-zero `divisor`, returning quotient and remainder.
    pub fn div_rem_small(self, divisor: u64) -> (Self, u64) {
        let mut out = [0u64; 4];
        let mut rem = 0u128;
        for i in (0..4).rev() {
            let current = (rem << 64) | self.0[i] as u128;
            out[i] = (current / divisor as u128) as u64;
            rem = current % divisor as u128;
        }
        (U256(out), rem as u64)
    }

    fn wrapping_neg(self) -> Self {
        let inverted = U256(self.0.map(|limb| !limb));
        inverted.checked_add_small(1).unwrap_or(U256::ZERO)
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        U256([value as u64, (value >> 64) as u64, 0, 0])
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const CHUNK: u64 = 10_000_000_000_000_000_000;

        if self.is_zero() {
            return f.pad("0");
        }
        let mut chunks = Vec::new();
        let mut rest = *self;
        while !rest.is_zero() {
            let (quotient, rem) = rest.div_rem_small(CHUNK);
            chunks.push(rem);
            rest = quotient;
        }
        let mut text = String::new();
        for (i, chunk) in chunks.iter().rev().enumerate() {
            if i == 0 {
                text.push_str(&chunk.to_string());
            } else {
                text.push_str(&format!("{:019}", chunk));
            }
        }
        f.pad(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWideError;

impl fmt::Display for ParseWideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid or out of range 256-bit integer")
    }
}

impl std::error::Error for ParseWideError {}

impl FromStr for U256 {
    type Err = ParseWideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('+').unwrap_or(s);
        if digits.is_empty() {
            return Err(ParseWideError);
        }
        digits.bytes().try_fold(U256::ZERO, |acc, b| {
            if !b.is_ascii_digit() {
                return Err(ParseWideError);
            }
            acc.checked_mul_small(10)
                .and_then(|v| v.checked_add_small((b - b'0') as u64))
                .ok_or(ParseWideError)
        })
    }
}

impl I256 {
    pub const ZERO: I256 = I256([0; 4]);

    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        I256(U256::from_le_bytes(bytes).0)
    }

    pub fn to_le_bytes(self) -> [u8; 32] {
        U256(self.0).to_le_bytes()
    }

    pub fn is_negative(self) -> bool {
        self.0[3] >> 63 == 1
    }

    /// Absolute value as an unsigned integer; `I256::MIN` maps to 2^255.
    pub fn unsigned_abs(self) -> U256 {
        if self.is_negative() {
            U256(self.0).wrapping_neg()
        } else {
            U256(self.0)
        }
    }

    /// Build from a sign and magnitude, failing when out of range.
    pub fn from_sign_magnitude(negative: bool, magnitude: U256) -> Option<Self> {
        let top_bit = magnitude.0[3] >> 63 == 1;
        if !negative {
            return (!top_bit).then_some(I256(magnitude.0));
        }
        let min_magnitude = U256([0, 0, 0, 1 << 63]);
        if top_bit && magnitude != min_magnitude {
            return None;
        }
        Some(I256(magnitude.wrapping_neg().0))
    }

    pub fn to_i128(self) -> Option<i128> {
        let fill = if self.is_negative() { u64::MAX } else { 0 };
        if self.0[2] != fill || self.0[3] != fill {
            return None;
        }
        let low = ((self.0[1] as u128) << 64) | self.0[0] as u128;
        let value = low as i128;
        // The sign of the low half must agree with the extension.
        (value.is_negative() == self.is_negative()).then_some(value)
    }

    /// Multiply by 10^`exp`, failing on overflow.
    pub fn checked_scale_up(self, exp: u32) -> Option<Self> {
        let mut magnitude = self.unsigned_abs();
        for _ in 0..exp {
            magnitude = magnitude.checked_mul_small(10)?;
        }
        I256::from_sign_magnitude(self.is_negative(), magnitude)
    }

    /// Divide by 10^`exp`, truncating toward zero.
    pub fn scale_down(self, exp: u32) -> Self {
        let mut magnitude = self.unsigned_abs();
        for _ in 0..exp {
            magnitude = magnitude.div_rem_small(10).0;
        }
        I256::from_sign_magnitude(self.is_negative(), magnitude)
            .unwrap_or(I256::ZERO)
    }

    /// Remainder of the magnitude divided by 10.
    pub fn last_digit(self) -> u64 {
        self.unsigned_abs().div_rem_small(10).1
    }

    /// Number of decimal digits of the magnitude (0 has one digit).
    pub fn digits(self) -> u32 {
        self.unsigned_abs().to_string().len() as u32
    }
}

impl From<i128> for I256 {
    fn from(value: i128) -> Self {
        let fill = if value < 0 { u64::MAX } else { 0 };
        I256([value as u64, (value >> 64) as u64, fill, fill])
    }
}

impl From<i64> for I256 {
    fn from(value: i64) -> Self {
        I256::from(value as i128)
    }
}

impl fmt::Display for I256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.unsigned_abs().to_string();
        if self.is_negative() {
            f.pad(&format!("-{}", magnitude))
        } else {
            f.pad(&magnitude)
        }
    }
}

impl FromStr for I256 {
    type Err = ParseWideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let magnitude = U256::from_str(digits)?;
        I256::from_sign_magnitude(negative, magnitude).ok_or(ParseWideError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_text_roundtrip() {
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(U256::from_str(max).unwrap(), U256::MAX);
        assert_eq!(U256::MAX.to_string(), max);
        assert_eq!(U256::from(0u64).to_string(), "0");
        assert_eq!(
            U256::from(u128::MAX).to_string(),
            u128::MAX.to_string()
        );
        assert!(U256::from_str(&format!("{}0", max)).is_err());
        assert!(U256::from_str("12a").is_err());
    }

    #[test]
    fn test_i256_text_roundtrip() {
        for text in [
            "0",
            "-1",
            "170141183460469231731687303715884105728",
            "-57896044618658097711785492504343953926634992332820282019728792003956564819968",
            "57896044618658097711785492504343953926634992332820282019728792003956564819967",
        ] {
            assert_eq!(I256::from_str(text).unwrap().to_string(), text);
        }
        assert!(I256::from_str(
            "57896044618658097711785492504343953926634992332820282019728792003956564819968"
        )
        .is_err());
    }

    #[test]
    fn test_i128_conversions() {
        for value in [0i128, 1, -1, i128::MAX, i128::MIN, -42] {
            let wide = I256::from(value);
            assert_eq!(wide.to_i128(), Some(value));
            assert_eq!(wide.to_string(), value.to_string());
        }
        let big = I256::from(i128::MAX).checked_scale_up(1).unwrap();
        assert_eq!(big.to_i128(), None);
    }

    #[test]
    fn test_bytes_are_little_endian() {
        let bytes = I256::from(-2i128).to_le_bytes();
        assert_eq!(bytes[0], 0xFE);
        assert!(bytes[1..].iter().all(|b| *b == 0xFF));
        assert_eq!(I256::from_le_bytes(bytes), I256::from(-2i128));
    }

    #[test]
    fn test_scaling() {
        let v = I256::from(-30042i128);
        assert_eq!(v.checked_scale_up(2).unwrap(), I256::from(-3004200i128));
        assert_eq!(v.scale_down(3), I256::from(-30i128));
        assert_eq!(v.last_digit(), 2);
        assert_eq!(v.digits(), 5);
    }
}
