//! GF(2^8) arithmetic
//!
//! Field of 256 elements reduced by the polynomial x^8 + x^4 + x^3 + x^2 + 1
//! (0x11D), the usual Reed-Solomon field. Multiplication and division go
//! through log/antilog tables built at compile time with generator 2, so every
//! operation is a couple of table lookups.
//!
//! Addition and subtraction are both XOR.

use crate::error::ArithmeticError;

/// Reduction polynomial
pub const POLYNOMIAL: u16 = 0x11D;

/// Number of non-zero field elements (order of the multiplicative group)
const GROUP_ORDER: usize = 255;

struct Tables {
    log: [u8; 256],
    /// Antilog table, doubled so `exp[log a + log b]` never needs a modulo
    exp: [u8; GROUP_ORDER * 2],
}

impl Tables {
    const fn generate() -> Self {
        let mut log = [0u8; 256];
        let mut exp = [0u8; GROUP_ORDER * 2];
        let mut x: u16 = 1;
        let mut i = 0;
        while i < GROUP_ORDER {
            exp[i] = x as u8;
            exp[i + GROUP_ORDER] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= POLYNOMIAL;
            }
            i += 1;
        }
        Self { log, exp }
    }
}

static TABLES: Tables = Tables::generate();

/// Field addition (XOR)
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Field subtraction, identical to addition in characteristic 2
#[inline]
pub fn sub(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Field multiplication
#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    TABLES.exp[TABLES.log[a as usize] as usize + TABLES.log[b as usize] as usize]
}

/// Field division; dividing by zero is an error
#[inline]
pub fn div(a: u8, b: u8) -> Result<u8, ArithmeticError> {
    if b == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    if a == 0 {
        return Ok(0);
    }
    let idx = TABLES.log[a as usize] as usize + GROUP_ORDER - TABLES.log[b as usize] as usize;
    Ok(TABLES.exp[idx])
}

/// Raise `a` to the power `e`. `pow(0, 0)` is 1.
pub fn pow(a: u8, e: usize) -> u8 {
    if e == 0 {
        return 1;
    }
    if a == 0 {
        return 0;
    }
    let log_a = TABLES.log[a as usize] as usize;
    TABLES.exp[(log_a * (e % GROUP_ORDER)) % GROUP_ORDER]
}

/// Multiplicative inverse; zero has none
#[inline]
pub fn inverse(a: u8) -> Result<u8, ArithmeticError> {
    if a == 0 {
        return Err(ArithmeticError::ZeroHasNoInverse);
    }
    Ok(TABLES.exp[GROUP_ORDER - TABLES.log[a as usize] as usize])
}

/// Products of `c` with every byte value, for slice kernels
fn product_row(c: u8) -> [u8; 256] {
    let mut row = [0u8; 256];
    for (x, out) in row.iter_mut().enumerate() {
        *out = mul(c, x as u8);
    }
    row
}

/// `output[i] = c * input[i]`
pub fn mul_slice(c: u8, input: &[u8], output: &mut [u8]) {
    debug_assert_eq!(input.len(), output.len());
    match c {
        0 => output.fill(0),
        1 => output.copy_from_slice(input),
        _ => {
            let row = product_row(c);
            for (o, &i) in output.iter_mut().zip(input) {
                *o = row[i as usize];
            }
        }
    }
}

/// `output[i] ^= c * input[i]`
pub fn mul_slice_xor(c: u8, input: &[u8], output: &mut [u8]) {
    debug_assert_eq!(input.len(), output.len());
    match c {
        0 => {}
        1 => {
            for (o, &i) in output.iter_mut().zip(input) {
                *o ^= i;
            }
        }
        _ => {
            let row = product_row(c);
            for (o, &i) in output.iter_mut().zip(input) {
                *o ^= row[i as usize];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Carry-less multiply with reduction, no tables
    fn slow_mul(mut a: u8, mut b: u8) -> u8 {
        let mut acc = 0u8;
        while b != 0 {
            if b & 1 != 0 {
                acc ^= a;
            }
            let carry = a & 0x80 != 0;
            a <<= 1;
            if carry {
                a ^= (POLYNOMIAL & 0xFF) as u8;
            }
            b >>= 1;
        }
        acc
    }

    #[test]
    fn test_tables_are_consistent() {
        for i in 0..GROUP_ORDER {
            let x = TABLES.exp[i];
            assert_ne!(x, 0);
            assert_eq!(TABLES.log[x as usize] as usize, i);
        }
        // 2 generates the whole multiplicative group
        let mut seen = [false; 256];
        for i in 0..GROUP_ORDER {
            seen[TABLES.exp[i] as usize] = true;
        }
        assert!(seen[1..].iter().all(|&s| s));
    }

    #[test]
    fn test_mul_matches_polynomial_multiply() {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                assert_eq!(mul(a, b), slow_mul(a, b), "{a} * {b}");
            }
        }
    }

    #[test]
    fn test_known_products() {
        assert_eq!(mul(2, 0x80), 0x1D);
        assert_eq!(mul(3, 7), 9);
        assert_eq!(mul(0, 0xAB), 0);
        assert_eq!(mul(1, 0xAB), 0xAB);
    }

    #[test]
    fn test_div_inverts_mul() {
        for a in 0..=255u8 {
            for b in 1..=255u8 {
                assert_eq!(div(mul(a, b), b).unwrap(), a);
            }
        }
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(div(7, 0), Err(ArithmeticError::DivisionByZero));
        assert_eq!(div(0, 0), Err(ArithmeticError::DivisionByZero));
        assert_eq!(inverse(0), Err(ArithmeticError::ZeroHasNoInverse));
    }

    #[test]
    fn test_every_nonzero_element_has_inverse() {
        for a in 1..=255u8 {
            let inv = inverse(a).unwrap();
            assert_eq!(mul(a, inv), 1);
        }
    }

    #[test]
    fn test_pow() {
        assert_eq!(pow(0, 0), 1);
        assert_eq!(pow(0, 5), 0);
        assert_eq!(pow(2, 8), 0x1D);
        assert_eq!(pow(2, 255), 1);
        for a in 1..=255u8 {
            let mut expected = 1u8;
            for e in 0..10 {
                assert_eq!(pow(a, e), expected);
                expected = mul(expected, a);
            }
        }
    }

    #[test]
    fn test_slice_kernels() {
        let input: Vec<u8> = (0..=255u8).collect();
        let mut out = vec![0u8; 256];
        mul_slice(0x53, &input, &mut out);
        for (i, &o) in out.iter().enumerate() {
            assert_eq!(o, mul(0x53, i as u8));
        }

        let mut acc = out.clone();
        mul_slice_xor(0x53, &input, &mut acc);
        assert!(acc.iter().all(|&b| b == 0));

        mul_slice(1, &input, &mut out);
        assert_eq!(out, input);
        mul_slice(0, &input, &mut out);
        assert!(out.iter().all(|&b| b == 0));
    }
}
