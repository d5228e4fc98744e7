use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DECIMALS: u32 = 2;
const SCALE: i64 = 10i64.pow(DECIMALS);

/// Fixed point amount with two fractional digits, stored as minor units.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(i64);

impl Decimal {
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn inner(&self) -> i64 {
        self.0
    }
}

impl Debug for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:02}",
            sign,
            abs / SCALE as u64,
            abs % SCALE as u64
        )
    }
}

impl TryFrom<&str> for Decimal {
    type Error = ParseDecimalError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim();
        let (negative, digits) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (digits, ""),
        };

        let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() || !is_digits(int_part) || !is_digits(frac_part) {
            return Err(ParseDecimalError);
        }
        if frac_part.len() > DECIMALS as usize || (digits.contains('.') && frac_part.is_empty()) {
            return Err(ParseDecimalError);
        }

        let int = int_part.parse::<i64>().map_err(|_| ParseDecimalError)?;
        let mut frac = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse::<i64>().map_err(|_| ParseDecimalError)?
        };
        if frac_part.len() == 1 {
            frac *= 10;
        }

        let minor = int
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac))
            .ok_or(ParseDecimalError)?;
        Ok(Decimal(if negative { -minor } else { minor }))
    }
}

impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::try_from(s)
    }
}

#[derive(Debug)]
pub struct ParseDecimalError;

impl std::fmt::Display for ParseDecimalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse decimal value")
    }
}

impl std::error::Error for ParseDecimalError {}

impl Serialize for Decimal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(Decimal(value))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!("123456.00", format!("{}", dec("123456")));
        assert_eq!("-15.00", format!("{}", dec("-15")));
        assert_eq!("-0.05", format!("{}", dec("-0.05")));
        assert_eq!("0.00", format!("{}", Decimal::default()));
    }

    #[test]
    fn test_from_str_display() {
        let decimal = Decimal::try_from("25.00").unwrap();
        assert_eq!("25.00", format!("{}", decimal));

        let decimal = Decimal::try_from("25").unwrap();
        assert_eq!("25.00", format!("{}", decimal));

        let decimal = Decimal::try_from("19.5").unwrap();
        assert_eq!("19.50", format!("{}", decimal));

        let decimal = Decimal::try_from("0.07").unwrap();
        assert_eq!("0.07", format!("{}", decimal));
        assert_eq!(7, decimal.inner());

        let decimal = Decimal::try_from("-12.34").unwrap();
        assert_eq!("-12.34", format!("{}", decimal));
        assert!(decimal.is_negative());
    }

    #[test]
    fn test_rejects_malformed() {
        for value in ["", ".", "12.", ".50", "1.234", "abc", "1,50", "1.5x", "--1"] {
            assert!(Decimal::try_from(value).is_err(), "{value} must not parse");
        }
    }

    #[test]
    fn test_serde_keeps_minor_units() {
        let price = dec("18.40");
        let bson = bson::to_bson(&price).unwrap();
        assert_eq!(bson, bson::Bson::Int64(1840));
        assert_eq!(bson::from_bson::<Decimal>(bson).unwrap(), price);
    }

    #[test]
    fn test_ordering() {
        let cheap = dec("9.99");
        let pricey = dec("10");
        assert!(cheap < pricey);
        assert!(Decimal::default() < cheap);
        assert!(dec("-1") < Decimal::default());
    }
}
