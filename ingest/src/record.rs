//! Flat measurement records: `range, azimuth, elevation, timestamp, auxiliary`.
//!
//! Two layouts are understood. Datagrams carry the five fields first and may
//! append a Cartesian `x, y, z` triple, which is ignored because the tracker
//! recomputes it. Tabular exports carry the same fields in the `MR, MA, ME,
//! MT, MD` columns (10..14) behind a header row.
//!
//! Records are split by the `csv` reader as raw bytes; only the columns a
//! layout names are decoded, so a bad byte fails that one record.

use crate::error::RecordError;
use csv::{ByteRecord, ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracker_core::Measurement;

const FIELD_NAMES: [&str; 5] = ["range", "azimuth", "elevation", "timestamp", "auxiliary"];

/// One parsed but not yet validated record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub range: f64,
    pub azimuth: f64,
    pub elevation: f64,
    pub timestamp: f64,
    pub auxiliary: Option<f64>,
}

/// Column positions of the five fields within a comma-separated line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordLayout {
    /// Column index of range, azimuth, elevation, timestamp, auxiliary
    pub columns: [usize; 5],
    /// Whether the first line of a file is a header
    pub has_header: bool,
}

impl RecordLayout {
    pub const DATAGRAM: Self = Self {
        columns: [0, 1, 2, 3, 4],
        has_header: false,
    };

    pub const TABULAR: Self = Self {
        columns: [10, 11, 12, 13, 14],
        has_header: true,
    };

    /// Fields up to the timestamp are mandatory; the auxiliary column may be
    /// absent or blank.
    fn required_len(&self) -> usize {
        self.columns[..4].iter().max().map_or(0, |&c| c + 1)
    }
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self::DATAGRAM
    }
}

/// Reader settings shared by the file and datagram sources: rows may have
/// any number of columns and fields are whitespace-trimmed.
pub fn reader_builder(has_header: bool) -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(has_header).flexible(true).trim(Trim::All);
    builder
}

/// A line holding nothing but whitespace.
pub fn is_blank(record: &ByteRecord) -> bool {
    record.len() <= 1 && record.iter().all(|f| f.iter().all(u8::is_ascii_whitespace))
}

fn text<'r>(record: &'r ByteRecord, index: usize) -> Result<&'r str, RecordError> {
    let bytes = record.get(index).unwrap_or_default();
    std::str::from_utf8(bytes)
        .map(str::trim)
        .map_err(|_| RecordError::Encoding)
}

fn number(record: &ByteRecord, index: usize, name: &'static str) -> Result<f64, RecordError> {
    let raw = text(record, index)?;
    raw.parse::<f64>().map_err(|_| RecordError::NotANumber {
        index,
        name,
        value: raw.to_string(),
    })
}

impl RawRecord {
    /// Pick the five fields out of one split record according to `layout`.
    pub fn from_byte_record(record: &ByteRecord, layout: &RecordLayout) -> Result<Self, RecordError> {
        let needed = layout.required_len();
        if record.len() < needed {
            return Err(RecordError::MissingField {
                needed,
                found: record.len(),
            });
        }
        let [r, a, e, t, d] = layout.columns;

        let auxiliary = match record.get(d) {
            None => None,
            Some(f) if f.iter().all(u8::is_ascii_whitespace) => None,
            Some(_) => Some(number(record, d, FIELD_NAMES[4])?),
        };

        Ok(Self {
            range: number(record, r, FIELD_NAMES[0])?,
            azimuth: number(record, a, FIELD_NAMES[1])?,
            elevation: number(record, e, FIELD_NAMES[2])?,
            timestamp: number(record, t, FIELD_NAMES[3])?,
            auxiliary,
        })
    }

    /// Parse one comma-separated line according to `layout`.
    pub fn parse(line: &str, layout: &RecordLayout) -> Result<Self, RecordError> {
        Self::read_one(line.as_bytes(), layout)
    }

    /// Parse a datagram payload.
    pub fn from_datagram(payload: &[u8]) -> Result<Self, RecordError> {
        Self::read_one(payload, &RecordLayout::DATAGRAM)
    }

    fn read_one(bytes: &[u8], layout: &RecordLayout) -> Result<Self, RecordError> {
        let mut reader = reader_builder(false).from_reader(bytes);
        let mut record = ByteRecord::new();
        match reader.read_byte_record(&mut record) {
            Ok(true) => Self::from_byte_record(&record, layout),
            Ok(false) => Err(RecordError::MissingField {
                needed: layout.required_len(),
                found: 0,
            }),
            Err(e) => Err(RecordError::Unreadable(e.to_string())),
        }
    }
}

impl TryFrom<RawRecord> for Measurement {
    type Error = RecordError;

    fn try_from(rec: RawRecord) -> Result<Self, Self::Error> {
        let values = [rec.range, rec.azimuth, rec.elevation, rec.timestamp];
        for (value, name) in values.into_iter().zip(FIELD_NAMES) {
            if !value.is_finite() {
                return Err(RecordError::NonFinite { name, value });
            }
        }
        if let Some(aux) = rec.auxiliary {
            if !aux.is_finite() {
                return Err(RecordError::NonFinite {
                    name: FIELD_NAMES[4],
                    value: aux,
                });
            }
        }
        if rec.range < 0.0 {
            return Err(RecordError::NegativeRange(rec.range));
        }
        Ok(Measurement::new(
            rec.range,
            rec.azimuth,
            rec.elevation,
            rec.timestamp,
            rec.auxiliary,
        ))
    }
}

/// Parse and convert in one step.
pub fn parse_measurement(line: &str, layout: &RecordLayout) -> Result<Measurement, RecordError> {
    Measurement::try_from(RawRecord::parse(line, layout)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn datagram_with_trailing_cartesian() {
        let rec = RawRecord::from_datagram(b"12000.5,45,2.5,17.25,-3.5,8481.2,8481.2,523.5").unwrap();
        assert_eq!(rec.range, 12000.5);
        assert_eq!(rec.azimuth, 45.0);
        assert_eq!(rec.timestamp, 17.25);
        assert_eq!(rec.auxiliary, Some(-3.5));

        let m = Measurement::try_from(rec).unwrap();
        let c = m.cartesian();
        let horiz = 12000.5 * 2.5f64.to_radians().cos();
        assert_abs_diff_eq!(c.x, horiz * 45f64.to_radians().sin(), epsilon = 1e-6);
        assert_abs_diff_eq!(c.z, 12000.5 * 2.5f64.to_radians().sin(), epsilon = 1e-6);
    }

    #[test]
    fn missing_or_blank_auxiliary_is_none() {
        let a = RawRecord::parse("100,10,1,0.5", &RecordLayout::DATAGRAM).unwrap();
        let b = RawRecord::parse("100,10,1,0.5,  ", &RecordLayout::DATAGRAM).unwrap();
        assert_eq!(a.auxiliary, None);
        assert_eq!(a, b);
    }

    #[test]
    fn tabular_columns() {
        let mut line = vec!["x"; 10];
        line.extend(["5000", "90", "0", "3", "7"]);
        let rec = RawRecord::parse(&line.join(","), &RecordLayout::TABULAR).unwrap();
        assert_eq!(rec.range, 5000.0);
        assert_eq!(rec.azimuth, 90.0);
        assert_eq!(rec.timestamp, 3.0);
        assert_eq!(rec.auxiliary, Some(7.0));
    }

    #[test]
    fn malformed_records() {
        let layout = RecordLayout::DATAGRAM;
        assert_eq!(
            RawRecord::parse("100,10", &layout),
            Err(RecordError::MissingField { needed: 4, found: 2 })
        );
        assert!(matches!(
            RawRecord::parse("100,abc,1,2", &layout),
            Err(RecordError::NotANumber { index: 1, name: "azimuth", .. })
        ));
        assert!(matches!(
            RawRecord::parse("100,1,1,2,zz", &layout),
            Err(RecordError::NotANumber { name: "auxiliary", .. })
        ));
        assert_eq!(
            parse_measurement("-5,1,1,2", &layout),
            Err(RecordError::NegativeRange(-5.0))
        );
        assert!(matches!(
            parse_measurement("NaN,1,1,2", &layout),
            Err(RecordError::NonFinite { name: "range", .. })
        ));
        assert_eq!(
            RawRecord::from_datagram(b"\xff\xfe,1,1,2"),
            Err(RecordError::Encoding)
        );
        // Undecodable bytes in a column the layout ignores are harmless.
        let mut tabular = b"\xff\xfe".to_vec();
        tabular.extend_from_slice(b",x,x,x,x,x,x,x,x,x,5000,90,0,3,7");
        assert!(RawRecord::from_datagram(&tabular).is_err());
        let mut reader = reader_builder(false).from_reader(tabular.as_slice());
        let mut record = ByteRecord::new();
        assert!(reader.read_byte_record(&mut record).unwrap());
        let rec = RawRecord::from_byte_record(&record, &RecordLayout::TABULAR).unwrap();
        assert_eq!(rec.range, 5000.0);
    }

    #[test]
    fn azimuth_is_normalized() {
        let m = parse_measurement("1000,370,5,1", &RecordLayout::DATAGRAM).unwrap();
        assert_abs_diff_eq!(m.azimuth(), 10.0, epsilon = 1e-9);
    }
}
