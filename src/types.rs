//! Shared ledger vocabulary: timestamps, roles and identifiers
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

pub type BatchId = u64;
pub type ReportId = u64;
pub type SeqNo = u64;

/// Principal identities are opaque strings (bech32 ids, public keys, account ids).
pub type Principal = String;

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// Builds a UTC timestamp from calendar fields. `None` when the fields don't
    /// name a real instant, or name one outside the nanosecond range the ledger
    /// encodes (roughly 1677 to 2262).
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .filter(|at| at.timestamp_nanos_opt().is_some())
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// False for instants built through `From<DateTime>` that the CBOR codec cannot hold.
    pub fn is_encodable(&self) -> bool {
        self.0.timestamp_nanos_opt().is_some()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
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

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Roles are not exclusive; a principal may hold any combination.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Role {
    #[n(0)]
    Grower,
    #[n(1)]
    Processor,
    #[n(2)]
    Laboratory,
    #[n(3)]
    Regulator,
    #[n(4)]
    Administrator,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Grower,
        Role::Processor,
        Role::Laboratory,
        Role::Regulator,
        Role::Administrator,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Grower => "Grower",
            Role::Processor => "Processor",
            Role::Laboratory => "Laboratory",
            Role::Regulator => "Regulator",
            Role::Administrator => "Administrator",
        };
        f.write_str(name)
    }
}
