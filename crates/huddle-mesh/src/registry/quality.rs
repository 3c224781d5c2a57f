use serde::{Deserialize, Serialize};

/// Transport statistics reported by the engine for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Fraction in `0.0..=1.0`.
    pub packet_loss: f64,
    pub rtt_ms: f64,
    pub jitter_ms: f64,
    pub bitrate: u64,
}

/// Score a link from 0 (unusable) to 100 (perfect).
pub fn connection_quality(stats: &NetworkStats) -> u8 {
    let mut score = 100.0_f64;

    score -= stats.packet_loss.clamp(0.0, 1.0) * 50.0;

    if stats.rtt_ms > 100.0 {
        score -= ((stats.rtt_ms - 100.0) / 10.0).min(30.0);
    }
    if stats.jitter_ms > 30.0 {
        score -= ((stats.jitter_ms - 30.0) / 5.0).min(20.0);
    }

    score.clamp(0.0, 100.0) as u8
}
