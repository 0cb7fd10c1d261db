//! Timestamp support.
//!
//! `DateTime<Utc>` fields encode as RFC 3339 strings, or as epoch seconds
//! under the `unixtime` modifier. [`UnixTime`] always uses epoch seconds,
//! which keeps it usable as a numeric key attribute without annotations.

use chrono::{DateTime, Utc};

use crate::attribute::AttributeValue;
use crate::errors::{Error, Result};
use crate::unmarshal::{mismatch, Unmarshaler};
use crate::value::Marshaler;

/// A timestamp stored as a DynamoDB number of seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UnixTime(pub DateTime<Utc>);

impl UnixTime {
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for UnixTime {
    fn from(t: DateTime<Utc>) -> Self {
        UnixTime(t)
    }
}

impl Marshaler for UnixTime {
    fn marshal_dynamo(&self) -> Result<AttributeValue> {
        Ok(AttributeValue::N(self.0.timestamp().to_string()))
    }
}

impl Unmarshaler for UnixTime {
    fn unmarshal_dynamo(&mut self, av: &AttributeValue) -> Result<()> {
        self.0 = match av {
            AttributeValue::Null => DateTime::default(),
            other => decode(other)?,
        };
        Ok(())
    }
}

crate::marshaler!(UnixTime);

/// Read a timestamp from an RFC 3339 `S` or an epoch seconds `N`.
pub(crate) fn decode(av: &AttributeValue) -> Result<DateTime<Utc>> {
    match av {
        AttributeValue::S(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|source| Error::InvalidTime {
                value: text.clone(),
                source,
            }),
        AttributeValue::N(text) => {
            let invalid = || Error::InvalidNumber {
                value: text.clone(),
                target: "time",
            };
            let secs: i64 = text.parse().map_err(|_| invalid())?;
            DateTime::from_timestamp(secs, 0).ok_or_else(invalid)
        }
        other => Err(mismatch(other, "time")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{marshal, unmarshal};

    #[test]
    fn unix_time_is_a_number() {
        let t = UnixTime(DateTime::from_timestamp(1_447_781_270, 0).unwrap());
        assert_eq!(
            marshal::marshal(&t, "").unwrap(),
            Some(AttributeValue::N("1447781270".into()))
        );

        let mut back = UnixTime::default();
        unmarshal::unmarshal(&AttributeValue::N("1447781270".into()), &mut back).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn decode_accepts_offsets() {
        let t = decode(&AttributeValue::S("2015-03-02T08:50:50+02:00".into())).unwrap();
        assert_eq!(t.timestamp(), 1_425_279_050);
    }

    #[test]
    fn decode_rejects_other_shapes() {
        assert!(matches!(
            decode(&AttributeValue::Bool(true)),
            Err(Error::Mismatch { target: "time", .. })
        ));
        assert!(matches!(
            decode(&AttributeValue::N("1.5".into())),
            Err(Error::InvalidNumber { .. })
        ));
    }
}
