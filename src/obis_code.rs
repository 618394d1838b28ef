use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt::{self, Debug, Display};
use core::str::FromStr;

use nom::{IResult, Parser, number::streaming::u8};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

use crate::Error;

/// A six-group OBIS code identifying a COSEM object instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

impl ObisCode {
    pub fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (a, b, c, d, e, f)) = (u8, u8, u8, u8, u8, u8).parse(input)?;
        Ok((input, Self::new(a, b, c, d, e, f)))
    }

    pub fn to_bytes(self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    pub fn encode_into(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bytes());
    }
}

/// Parses dotted-decimal text such as `"1.0.1.8.0.255"`.
impl FromStr for ObisCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut groups = [0u8; 6];
        let mut parts = s.split('.');
        for group in &mut groups {
            let part = parts.next().ok_or(Error::MalformedValue)?;
            *group = part.parse().map_err(|_| Error::MalformedValue)?;
        }
        if parts.next().is_some() {
            return Err(Error::MalformedValue);
        }
        let [a, b, c, d, e, f] = groups;
        Ok(Self::new(a, b, c, d, e, f))
    }
}

impl Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}*{}", self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Debug for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObisCode({})", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for ObisCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let input = [1, 0, 1, 8, 0, 255, 0xaa];
        let (remaining, code) = ObisCode::parse(&input).unwrap();

        assert_eq!(remaining, &[0xaa]);
        assert_eq!(code, ObisCode::new(1, 0, 1, 8, 0, 255));
        assert_eq!(code.to_bytes(), [1, 0, 1, 8, 0, 255]);
    }

    #[test]
    fn test_parse_insufficient_input() {
        assert!(matches!(ObisCode::parse(&[1, 2, 3, 4, 5]), Err(nom::Err::Incomplete(_))));
    }

    #[test]
    fn test_from_str() {
        let code: ObisCode = "1.0.1.8.0.255".parse().unwrap();
        assert_eq!(code, ObisCode::new(1, 0, 1, 8, 0, 255));

        assert!("1.0.1.8.0".parse::<ObisCode>().is_err());
        assert!("1.0.1.8.0.255.7".parse::<ObisCode>().is_err());
        assert!("1.0.1.8.0.300".parse::<ObisCode>().is_err());
        assert!("1.0.x.8.0.255".parse::<ObisCode>().is_err());
    }

    #[test]
    fn test_display_format() {
        // reduction form: A-B:C.D.E*F
        let code = ObisCode::new(1, 0, 1, 8, 0, 255);
        assert_eq!(format!("{}", code), "1-0:1.8.0*255");
        assert_eq!(format!("{:?}", code), "ObisCode(1-0:1.8.0*255)");
    }

    #[test]
    fn test_ordering() {
        assert!(ObisCode::new(1, 0, 1, 8, 0, 255) < ObisCode::new(1, 0, 1, 8, 1, 255));
        assert!(ObisCode::new(1, 0, 1, 8, 1, 255) < ObisCode::new(1, 0, 2, 8, 0, 255));
    }
}
