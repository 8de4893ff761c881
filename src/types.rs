//! Value types shared across the parcel model, the store and the facade
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// Lifecycle of a parcel. Ordering follows the state machine.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum ParcelStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Loaded,
    #[n(2)]
    InTransit,
    // produced outside this crate, only ever read back from the store
    #[n(3)]
    Delivered,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Pending => "PENDING",
            ParcelStatus::Loaded => "LOADED",
            ParcelStatus::InTransit => "IN_TRANSIT",
            ParcelStatus::Delivered => "DELIVERED",
        }
    }

    /// A write may keep the status or move exactly one step forward.
    pub fn can_advance_to(&self, next: ParcelStatus) -> bool {
        *self == next
            || matches!(
                (self, next),
                (ParcelStatus::Pending, ParcelStatus::Loaded)
                    | (ParcelStatus::Loaded, ParcelStatus::InTransit)
                    | (ParcelStatus::InTransit, ParcelStatus::Delivered)
            )
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// `None` when the fields do not name a valid UTC instant.
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// One entry of a parcel's tracking history.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEvent {
    #[n(0)]
    pub at: TimeStamp,
    #[n(1)]
    pub text: String,
}

impl HistoryEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            at: TimeStamp::new(),
            text: text.into(),
        }
    }
}

impl fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.at, self.text)
    }
}
