use rendezvous_network::config::{ByteValue, HumanDuration};
use std::time::Duration;

/// Tuning of the relay.
///
/// All fields have defaults, so an empty `[relay]` table is valid.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct RelayConfig {
    /// Maximum number of bytes read from a sender per chunk.
    pub chunk_size: ByteValue,

    /// Maximum number of chunks queued, summed over all sessions.
    ///
    /// Once reached, every sender stops reading until a receiver
    /// drains a chunk. The budget is global: one busy session can
    /// stall the others.
    pub buffer_length_limit: usize,

    /// Delay between two pairing checks; also the receiver's idle
    /// and write-error backoff.
    pub poll_interval: HumanDuration,

    /// Delay before a sender checks again whether the queue is still
    /// saturated.
    pub saturation_backoff: HumanDuration,

    /// Number of consecutive empty polls after which a receiver
    /// considers the transfer finished.
    pub idle_polls: u32,

    /// Number of consecutive write errors after which a receiver
    /// gives up.
    pub write_error_limit: u32,

    /// How long a client may wait for its peer. Unbounded if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_timeout: Option<HumanDuration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_size: ByteValue(64 * 1024),
            buffer_length_limit: 1024,
            poll_interval: HumanDuration::from_millis(500),
            saturation_backoff: HumanDuration::from_secs(1),
            idle_polls: 3,
            write_error_limit: 3,
            pairing_timeout: None,
        }
    }
}

impl RelayConfig {
    pub fn chunk_size(&self) -> usize {
        usize::try_from(self.chunk_size.0).unwrap_or(usize::MAX).max(1)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.into()
    }

    pub fn saturation_backoff(&self) -> Duration {
        self.saturation_backoff.into()
    }

    pub fn pairing_timeout(&self) -> Option<Duration> {
        self.pairing_timeout.map(Duration::from)
    }
}
