use std::time::SystemTime;

use crate::changes::Timestamp;

pub trait SystemTimeExt {
    fn to_timestamp(&self) -> Timestamp;
}

impl SystemTimeExt for SystemTime {
    // Times before the epoch clamp to zero
    fn to_timestamp(&self) -> Timestamp {
        self.duration_since(SystemTime::UNIX_EPOCH)
            .ok()
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .map(Timestamp::from)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timestamp_counts_milliseconds_since_the_epoch() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(time.to_timestamp().millis(), 1_500);
    }

    #[test]
    fn times_before_the_epoch_clamp_to_zero() {
        let time = SystemTime::UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(time.to_timestamp(), Timestamp::default());
    }
}
