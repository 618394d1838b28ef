//! COSEM date/time wire formats.
//!
//! A `date-time` is 12 bytes, a `date` 5 bytes and a `time` 4 bytes. Every
//! field has an "unknown" sentinel (0xFF, or 0xFFFF for the year and 0x8000
//! for the deviation), the month additionally carries daylight-saving
//! transition markers, and the day-of-week byte is always written as 0xFF.
//! A [`SkipFields`] mask can force fields to their sentinel on encode
//! regardless of the stored value, which is how callers request wildcard
//! timestamps for selective access ranges.

use alloc::vec::Vec;
use core::fmt;

use nom::{
    IResult,
    error::{Error as NomError, ErrorKind},
    number::streaming::{be_i16, be_u16, u8 as nom_u8},
};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

/// Month field of a [`Date`], including the daylight-saving markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Month {
    /// Calendar month 1..=12.
    Of(u8),
    /// 0xFE: the day daylight saving begins.
    DaylightSavingsBegin,
    /// 0xFD: the day daylight saving ends.
    DaylightSavingsEnd,
}

impl Month {
    fn to_byte(self) -> u8 {
        match self {
            Month::Of(m) => m,
            Month::DaylightSavingsBegin => 0xfe,
            Month::DaylightSavingsEnd => 0xfd,
        }
    }

    fn from_byte(byte: u8) -> Result<Option<Self>, ()> {
        match byte {
            0xff => Ok(None),
            0xfe => Ok(Some(Month::DaylightSavingsBegin)),
            0xfd => Ok(Some(Month::DaylightSavingsEnd)),
            1..=12 => Ok(Some(Month::Of(byte))),
            _ => Err(()),
        }
    }
}

/// Fields forced to their "unknown" sentinel when encoding.
///
/// Bit layout follows the original field order; combining masks with `|`
/// builds wildcard timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipFields(u16);

impl SkipFields {
    pub const NONE: Self = Self(0);
    pub const YEAR: Self = Self(0x01);
    pub const MONTH: Self = Self(0x02);
    pub const DAY: Self = Self(0x04);
    pub const HOUR: Self = Self(0x08);
    pub const MINUTE: Self = Self(0x10);
    pub const SECOND: Self = Self(0x20);
    pub const HUNDREDTHS: Self = Self(0x40);
    pub const DEVIATION: Self = Self(0x80);
    pub const STATUS: Self = Self(0x100);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for SkipFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Clock status bitmask carried in the last byte of a `date-time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockStatus(pub u8);

impl ClockStatus {
    const INVALID_VALUE_BIT: u8 = 0b0000_0001;
    const DOUBTFUL_VALUE_BIT: u8 = 0b0000_0010;
    const DIFFERENT_BASE_BIT: u8 = 0b0000_0100;
    const DAYLIGHT_SAVING_BIT: u8 = 0b1000_0000;

    pub fn invalid_value(&self) -> bool {
        (self.0 & Self::INVALID_VALUE_BIT) != 0
    }

    pub fn doubtful_value(&self) -> bool {
        (self.0 & Self::DOUBTFUL_VALUE_BIT) != 0
    }

    pub fn different_base(&self) -> bool {
        (self.0 & Self::DIFFERENT_BASE_BIT) != 0
    }

    pub fn daylight_saving(&self) -> bool {
        (self.0 & Self::DAYLIGHT_SAVING_BIT) != 0
    }
}

/// A COSEM `date`: 5 bytes on the wire, day-of-week always 0xFF.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Date {
    pub year: Option<u16>,
    pub month: Option<Month>,
    pub day: Option<u8>,
    pub skip: SkipFields,
}

impl Date {
    pub fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year: Some(year), month: Some(Month::Of(month)), day: Some(day), skip: SkipFields::NONE }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        let year = if self.skip.contains(SkipFields::YEAR) { None } else { self.year };
        buf.extend_from_slice(&year.unwrap_or(0xffff).to_be_bytes());
        let month = if self.skip.contains(SkipFields::MONTH) { None } else { self.month };
        buf.push(month.map_or(0xff, Month::to_byte));
        let day = if self.skip.contains(SkipFields::DAY) { None } else { self.day };
        buf.push(day.unwrap_or(0xff));
        // day-of-week is never produced by this engine
        buf.push(0xff);
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, year) = be_u16(input)?;
        let year = Some(year).filter(|&y| y != 0xffff);
        let (input, month) = nom_u8(input)?;
        let month = Month::from_byte(month)
            .map_err(|()| nom::Err::Failure(NomError::new(input, ErrorKind::Verify)))?;
        let (input, day) = nom_u8(input)?;
        let day = Some(day).filter(|&d| d != 0xff);
        // day-of-week, ignored
        let (input, _) = nom_u8(input)?;

        Ok((input, Self { year, month, day, skip: SkipFields::NONE }))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.month, self.day) {
            (Some(y), Some(Month::Of(m)), Some(d)) => write!(f, "{:04}-{:02}-{:02}", y, m, d),
            _ => write!(f, "date(*)"),
        }
    }
}

impl fmt::Debug for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Date(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A COSEM `time`: 4 bytes on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Time {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub hundredths: Option<u8>,
    pub skip: SkipFields,
}

impl Time {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour: Some(hour),
            minute: Some(minute),
            second: Some(second),
            hundredths: None,
            skip: SkipFields::NONE,
        }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        let hour = if self.skip.contains(SkipFields::HOUR) { None } else { self.hour };
        buf.push(hour.unwrap_or(0xff));
        let minute = if self.skip.contains(SkipFields::MINUTE) { None } else { self.minute };
        buf.push(minute.unwrap_or(0xff));
        let second = if self.skip.contains(SkipFields::SECOND) { None } else { self.second };
        buf.push(second.unwrap_or(0xff));
        let hundredths =
            if self.skip.contains(SkipFields::HUNDREDTHS) { None } else { self.hundredths };
        buf.push(hundredths.unwrap_or(0xff));
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, hour) = nom_u8(input)?;
        let hour = match hour {
            0xff => None,
            0..=23 => Some(hour),
            _ => return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify))),
        };
        let (input, minute) = nom_u8(input)?;
        let minute = match minute {
            0xff => None,
            0..=59 => Some(minute),
            _ => return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify))),
        };
        let (input, second) = nom_u8(input)?;
        let second = match second {
            0xff => None,
            0..=59 => Some(second),
            _ => return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify))),
        };
        let (input, hundredths) = nom_u8(input)?;
        let hundredths = match hundredths {
            0xff => None,
            0..=99 => Some(hundredths),
            _ => return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify))),
        };

        Ok((input, Self { hour, minute, second, hundredths, skip: SkipFields::NONE }))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02}",
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.hundredths.unwrap_or(0),
        )
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A COSEM `date-time`: 12 bytes on the wire.
///
/// The deviation is the offset from UTC in minutes, 0x8000 when
/// unspecified. The skip masks of the embedded [`Date`] and [`Time`] apply
/// to their own fields; [`SkipFields::DEVIATION`] and [`SkipFields::STATUS`]
/// are read from the date part's mask.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
    pub deviation: Option<i16>,
    pub clock_status: Option<ClockStatus>,
}

impl DateTime {
    pub fn new(date: Date, time: Time) -> Self {
        Self { date, time, deviation: None, clock_status: None }
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        self.date.encode_into(buf);
        self.time.encode_into(buf);
        let deviation =
            if self.date.skip.contains(SkipFields::DEVIATION) { None } else { self.deviation };
        buf.extend_from_slice(&deviation.unwrap_or(0x8000u16 as i16).to_be_bytes());
        let status =
            if self.date.skip.contains(SkipFields::STATUS) { None } else { self.clock_status };
        buf.push(status.map_or(0xff, |s| s.0));
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, date) = Date::parse(input)?;
        let (input, time) = Time::parse(input)?;
        let (input, deviation) = be_i16(input)?;
        let deviation = Some(deviation).filter(|&d| d != 0x8000u16 as i16);
        let (input, clock_status) = nom_u8(input)?;
        let clock_status = Some(clock_status).filter(|&b| b != 0xff).map(ClockStatus);

        Ok((input, Self { date, time, deviation, clock_status }))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)?;

        if let Some(deviation) = self.deviation {
            if deviation >= 0 {
                '-'.fmt(f)?;
            } else {
                '+'.fmt(f)?;
            }
            let deviation = deviation.abs();
            write!(f, "{:02}:{:02}", deviation / 60, deviation % 60)?;
        }

        Ok(())
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DateTime(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
