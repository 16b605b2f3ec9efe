/*
 * 17.14 Fixed-Point Arithmetic
 *
 * The MLFQS scheduler needs real numbers (load average, recent CPU usage)
 * but the kernel never touches the FPU. Values are stored as a 32-bit signed
 * integer scaled by 2^14: 17 integer bits, 14 fraction bits, one sign bit.
 *
 * Operations against a plain integer treat it as `n * F` where needed.
 * Fixed * Fixed and Fixed / Fixed widen to 64 bits for the intermediate
 * product so the scaling step cannot overflow.
 */

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};

/// Number of fraction bits
pub const FRACTION_BITS: u32 = 14;

/// Scaling factor (1.0 in fixed-point)
pub const F: i32 = 1 << FRACTION_BITS;

/// A 17.14 signed fixed-point number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(F);

    /// Convert an integer to fixed-point
    pub const fn from_int(n: i32) -> Self {
        Fixed(n * F)
    }

    /// Wrap an already scaled value
    pub const fn from_raw(raw: i32) -> Self {
        Fixed(raw)
    }

    /// The underlying scaled representation
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Convert to integer, rounding toward zero
    pub const fn to_int_trunc(self) -> i32 {
        self.0 / F
    }

    /// Convert to integer, rounding to nearest (halves away from zero)
    pub const fn to_int_round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + F / 2) / F
        } else {
            (self.0 - F / 2) / F
        }
    }

    pub const fn add_int(self, n: i32) -> Self {
        Fixed(self.0 + n * F)
    }

    pub const fn sub_int(self, n: i32) -> Self {
        Fixed(self.0 - n * F)
    }

    /// Multiply by an integer (scale unaffected)
    pub const fn mul_int(self, n: i32) -> Self {
        Fixed(self.0 * n)
    }

    /// Divide by an integer
    ///
    /// # Panics
    /// A zero divisor is a kernel bug and halts the system.
    pub fn div_int(self, n: i32) -> Self {
        kassert!(n != 0, "fixed-point division by zero");
        Fixed(self.0 / n)
    }

    /// Multiply two fixed-point values through a 64-bit intermediate
    pub const fn mul_fixed(self, other: Fixed) -> Self {
        Fixed(((self.0 as i64 * other.0 as i64) / F as i64) as i32)
    }

    /// Divide two fixed-point values through a 64-bit intermediate
    ///
    /// # Panics
    /// A zero divisor is a kernel bug and halts the system.
    pub fn div_fixed(self, other: Fixed) -> Self {
        kassert!(other.0 != 0, "fixed-point division by zero");
        Fixed(((self.0 as i64 * F as i64) / other.0 as i64) as i32)
    }
}

impl Add for Fixed {
    type Output = Fixed;

    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 + rhs.0)
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 - rhs.0)
    }
}

impl Mul for Fixed {
    type Output = Fixed;

    fn mul(self, rhs: Fixed) -> Fixed {
        self.mul_fixed(rhs)
    }
}

impl Div for Fixed {
    type Output = Fixed;

    fn div(self, rhs: Fixed) -> Fixed {
        self.div_fixed(rhs)
    }
}

impl Add<i32> for Fixed {
    type Output = Fixed;

    fn add(self, rhs: i32) -> Fixed {
        self.add_int(rhs)
    }
}

impl Sub<i32> for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: i32) -> Fixed {
        self.sub_int(rhs)
    }
}

impl Mul<i32> for Fixed {
    type Output = Fixed;

    fn mul(self, rhs: i32) -> Fixed {
        self.mul_int(rhs)
    }
}

impl Div<i32> for Fixed {
    type Output = Fixed;

    fn div(self, rhs: i32) -> Fixed {
        self.div_int(rhs)
    }
}

impl Neg for Fixed {
    type Output = Fixed;

    fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

impl fmt::Display for Fixed {
    /// Two decimal places, e.g. `1.50`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundredths = self.mul_int(100).to_int_round();
        let sign = if hundredths < 0 { "-" } else { "" };
        let abs = hundredths.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn int_conversion_truncates_back() {
        for n in [-131071, -100, -1, 0, 1, 59, 60, 131071] {
            assert_eq!(Fixed::from_int(n).to_int_trunc(), n);
            assert_eq!(Fixed::from_int(n).to_int_round(), n);
        }
    }

    #[test]
    fn rounding_at_the_half_boundary() {
        // Just below one half rounds down, exactly one half rounds away from zero
        assert_eq!(Fixed::from_raw(F / 2 - 1).to_int_round(), 0);
        assert_eq!(Fixed::from_raw(F / 2).to_int_round(), 1);
        assert_eq!(Fixed::from_int(3).add_int(0).to_int_round(), 3);
        assert_eq!(Fixed::from_raw(Fixed::from_int(3).raw() + F / 2 - 1).to_int_round(), 3);
        assert_eq!(Fixed::from_raw(-F / 2).to_int_round(), -1);
        assert_eq!(Fixed::from_raw(-F / 2 + 1).to_int_round(), 0);
    }

    #[test]
    fn truncation_goes_toward_zero() {
        assert_eq!(Fixed::from_raw(F + F / 2).to_int_trunc(), 1);
        assert_eq!(Fixed::from_raw(-(F + F / 2)).to_int_trunc(), -1);
    }

    #[test]
    fn add_and_sub() {
        assert_eq!(Fixed::from_int(1) + Fixed::from_int(2), Fixed::from_int(3));
        assert_eq!(Fixed::from_raw(100) + 1, Fixed::from_raw(100 + F));
        assert_eq!(Fixed::from_int(1) - Fixed::from_int(2), Fixed::from_int(-1));
        assert_eq!(Fixed::from_raw(100) - 1, Fixed::from_raw(100 - F));
    }

    #[test]
    fn multiply() {
        // Documented reference value: 16111 * 16111 descaled
        assert_eq!(Fixed::from_raw(16111) * Fixed::from_raw(16111), Fixed::from_raw(15842));
        assert_eq!(Fixed::ONE * 10, Fixed::from_int(10));
        // Intermediate product exceeds 32 bits
        assert_eq!(Fixed::from_int(1000) * Fixed::from_int(100), Fixed::from_int(100_000));
    }

    #[test]
    fn divide() {
        assert_eq!(Fixed::from_int(100) / Fixed::ONE, Fixed::from_int(100));
        assert_eq!(Fixed::from_int(100) / 1, Fixed::from_int(100));
        assert_eq!((Fixed::from_raw(2) / Fixed::from_raw(3)).to_int_round(), 1);
        assert_eq!((Fixed::from_int(2) / Fixed::from_int(3)).to_int_round(), 1);
        assert_eq!((Fixed::from_int(1) / Fixed::from_int(3)).to_int_trunc(), 0);
    }

    #[test]
    fn multiply_divide_stay_within_one_unit() {
        let x = Fixed::from_int(59) / 60;
        let back = x * 60;
        assert!((back.raw() - Fixed::from_int(59).raw()).abs() <= 60);
        let y = Fixed::from_int(7) / Fixed::from_int(3);
        let z = y * Fixed::from_int(3);
        assert!((z.raw() - Fixed::from_int(7).raw()).abs() <= 1);
    }

    #[test]
    fn display_two_decimals() {
        assert_eq!(Fixed::from_int(3).to_string(), "3.00");
        assert_eq!((Fixed::from_int(3) / 2).to_string(), "1.50");
        assert_eq!((Fixed::from_int(-1) / 4).to_string(), "-0.25");
    }

    #[test]
    #[should_panic(expected = "kernel fatal")]
    fn zero_divisor_is_fatal() {
        let _ = Fixed::from_int(1) / Fixed::ZERO;
    }

    #[test]
    #[should_panic(expected = "kernel fatal")]
    fn zero_int_divisor_is_fatal() {
        let _ = Fixed::from_int(1) / 0;
    }
}
