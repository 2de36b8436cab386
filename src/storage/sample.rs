//! The `Sample` / `PendingRecord` data model and its CSV wire format.

use std::fmt;
use std::str::FromStr;

/// One of the three physical measurements this node samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    Caudal,
    Temperatura,
    Voltaje,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Caudal => "caudal",
            Self::Temperatura => "temperatura",
            Self::Voltaje => "voltaje",
        })
    }
}

impl FromStr for Measurement {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "caudal" => Ok(Self::Caudal),
            "temperatura" => Ok(Self::Temperatura),
            "voltaje" => Ok(Self::Voltaje),
            _ => Err(()),
        }
    }
}

/// Origin of a sample: sent live, or replayed out of the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleSource {
    Wifi,
    Backup,
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wifi => "wifi",
            Self::Backup => "backup",
        })
    }
}

impl FromStr for SampleSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wifi" => Ok(Self::Wifi),
            "backup" => Ok(Self::Backup),
            _ => Err(()),
        }
    }
}

/// Delivery status of a [`PendingRecord`] as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    Pending,
    Sent,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
        })
    }
}

impl FromStr for RecordStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            _ => Err(()),
        }
    }
}

/// An immutable measurement with a timestamp. `ts_us == 0` means invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub ts_us: u64,
    pub measurement: Measurement,
    pub sensor: String,
    pub value: f32,
    pub source: SampleSource,
}

/// A [`Sample`] plus its on-disk delivery status.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub sample: Sample,
    pub status: RecordStatus,
    pub ts_ack_us: u64,
}

impl PendingRecord {
    #[must_use]
    pub const fn new_pending(sample: Sample) -> Self {
        Self {
            sample,
            status: RecordStatus::Pending,
            ts_ack_us: 0,
        }
    }

    /// Format as one journal CSV line (without trailing newline), per
    /// spec.md §3/§4.2: two-decimal value, decimal microsecond timestamps.
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{:.2},{},{},{}",
            self.sample.ts_us,
            self.sample.measurement,
            self.sample.sensor,
            self.sample.value,
            self.sample.source,
            self.status,
            self.ts_ack_us
        )
    }

    /// Parse one journal CSV line. Returns `None` for lines that cannot be
    /// interpreted at all (empty, too-short, or unparseable fields) — the
    /// drain protocol treats those as *skipped*, not as an error.
    #[must_use]
    pub fn parse_csv_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return None;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 7 {
            return None;
        }
        let ts_us: u64 = fields[0].parse().ok()?;
        let measurement: Measurement = fields[1].parse().ok()?;
        let sensor = fields[2].to_string();
        let value: f32 = fields[3].parse().ok()?;
        let source: SampleSource = fields[4].parse().ok()?;
        let status: RecordStatus = fields[5].parse().ok()?;
        let ts_ack_us: u64 = fields[6].parse().ok()?;

        Some(Self {
            sample: Sample {
                ts_us,
                measurement,
                sensor,
                value,
                source,
            },
            status,
            ts_ack_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Sample {
        Sample {
            ts_us: 1_700_000_000_000_000,
            measurement: Measurement::Caudal,
            sensor: "YF-S201".to_string(),
            value: 12.5,
            source: SampleSource::Wifi,
        }
    }

    #[test]
    fn round_trips_through_csv() {
        let record = PendingRecord::new_pending(sample());
        let line = record.to_csv_line();
        let parsed = PendingRecord::parse_csv_line(&line).expect("parses");
        assert_eq!(parsed, record);
    }

    #[test]
    fn value_is_formatted_with_two_decimals() {
        let record = PendingRecord::new_pending(sample());
        assert!(record.to_csv_line().contains(",12.50,"));
    }

    #[test]
    fn empty_line_is_skipped() {
        assert!(PendingRecord::parse_csv_line("").is_none());
    }

    #[test]
    fn short_line_is_skipped() {
        assert!(PendingRecord::parse_csv_line("1,2,3").is_none());
    }

    #[test]
    fn garbage_measurement_is_skipped() {
        assert!(PendingRecord::parse_csv_line("1,bogus,S,1.0,wifi,PENDING,0").is_none());
    }

    #[test]
    fn sent_status_parses() {
        let line = "1700000000000000,voltaje,ACS712,230.00,backup,SENT,1700000001000000";
        let parsed = PendingRecord::parse_csv_line(line).expect("parses");
        assert_eq!(parsed.status, RecordStatus::Sent);
        assert_eq!(parsed.ts_ack_us, 1_700_000_001_000_000);
    }
}
