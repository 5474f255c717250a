//! The probabilistic impairment pipeline.
//!
//! Every eligible datagram runs through loss, truncation-or-corruption, and
//! delay scheduling, in that order. All randomness comes from one shared
//! seeded stream, and a draw is only taken when the corresponding rate is
//! non-zero; the draw order is observable, so two runs with the same seed
//! and the same arrival sequence reproduce every decision, corrupted byte
//! index and applied delay bit-for-bit.

use rand::rngs::StdRng;
use rand::Rng;

use crate::packet::{seq, DeferredPacket, Direction, DirectionMask, MIN_PKT_LEN, TRUNCATED_BIT};
use crate::stats::RelayStats;

/// Applied delays wrap below this cap (ms).
const DELAY_CAP_MS: u64 = 10_000;

/// Link impairment parameters, immutable after startup.
///
/// Percentages are in `[0, 100]` and compared against a fresh draw from
/// `[0, 100]` via `r < pct`: 0 disables the effect, 100 makes it certain.
#[derive(Debug, Clone)]
pub struct LinkProfile {
    /// Base delay applied to each impaired packet (ms). 0 disables delaying.
    pub delay_ms: u32,
    /// When non-zero, the applied delay is drawn from
    /// `[delay_ms - jitter_ms, delay_ms + jitter_ms]`, clamped at zero.
    pub jitter_ms: u32,
    pub loss_pct: u32,
    pub corrupt_pct: u32,
    pub truncate_pct: u32,
    /// Directions the pipeline applies to; others pass through verbatim.
    pub mask: DirectionMask,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            jitter_ms: 0,
            loss_pct: 0,
            corrupt_pct: 0,
            truncate_pct: 0,
            mask: DirectionMask::Forward,
        }
    }
}

/// What the pipeline decided to do with a packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The link ate the packet.
    Discard,
    /// Deliver right away (possibly truncated or corrupted).
    Relay(Vec<u8>),
    /// Hold until the embedded deadline expires.
    Defer(DeferredPacket),
}

/// A fresh draw from the shared stream, in `[0, 100]`.
///
/// 101 buckets, matching the `rate mod 101` reduction on the configuration
/// side; the seed-replay property depends on this exact mapping.
fn percent(rng: &mut StdRng) -> u32 {
    rng.gen_range(0..=100)
}

/// Run one packet through the lossy-link model.
///
/// `now_us` is the scheduler's cached clock; deferred deadlines are computed
/// from it so that a batch processed in one iteration shares a time base.
pub fn apply_link(
    mut payload: Vec<u8>,
    direction: Direction,
    now_us: u64,
    profile: &LinkProfile,
    rng: &mut StdRng,
    stats: &mut RelayStats,
) -> Verdict {
    // Loss comes first; a lost packet consumes no further draws.
    if profile.loss_pct > 0 && percent(rng) < profile.loss_pct {
        tracing::info!("[SEQ {:3}] Dropping packet", seq(&payload));
        stats.lost += 1;
        return Verdict::Discard;
    }

    // Truncation and corruption are mutually exclusive. The truncation draw
    // is consumed whenever the rate is non-zero, even for packets too short
    // to cut; eligibility is checked after the draw.
    if profile.truncate_pct > 0
        && percent(rng) < profile.truncate_pct
        && payload.len() > MIN_PKT_LEN
    {
        tracing::info!("[SEQ {:3}] Truncating packet", seq(&payload));
        payload.truncate(MIN_PKT_LEN);
        payload[0] |= TRUNCATED_BIT;
        stats.truncated += 1;
    } else if profile.corrupt_pct > 0 && percent(rng) < profile.corrupt_pct {
        let idx = rng.gen_range(0..payload.len());
        tracing::info!(
            "[SEQ {:3}] Corrupting packet: inverted byte #{}",
            seq(&payload),
            idx
        );
        payload[idx] = !payload[idx];
        stats.corrupted += 1;
    }

    if profile.delay_ms == 0 {
        return Verdict::Relay(payload);
    }

    let applied = if profile.jitter_ms == 0 {
        u64::from(profile.delay_ms)
    } else {
        // One draw picks the sign, a second the magnitude. The minus branch
        // clamps at zero rather than wrapping.
        let add = percent(rng) > 49;
        let magnitude = rng.gen_range(0..profile.jitter_ms);
        if add {
            u64::from(profile.delay_ms) + u64::from(magnitude)
        } else {
            u64::from(profile.delay_ms.saturating_sub(magnitude))
        }
    } % DELAY_CAP_MS;

    tracing::info!("[SEQ {:3}] Delayed packet by {} ms", seq(&payload), applied);
    stats.delayed += 1;
    Verdict::Defer(DeferredPacket {
        deadline_us: now_us + applied * 1_000,
        direction,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const NOW_US: u64 = 1_000_000;

    fn run(payload: &[u8], profile: &LinkProfile, rng: &mut StdRng) -> Verdict {
        let mut stats = RelayStats::default();
        apply_link(
            payload.to_vec(),
            Direction::Forward,
            NOW_US,
            profile,
            rng,
            &mut stats,
        )
    }

    #[test]
    fn clean_link_relays_untouched() {
        let mut rng = StdRng::seed_from_u64(1);
        let payload = vec![0xAA; 16];
        match run(&payload, &LinkProfile::default(), &mut rng) {
            Verdict::Relay(out) => assert_eq!(out, payload),
            other => panic!("expected Relay, got {other:?}"),
        }
    }

    #[test]
    fn certain_loss_discards_everything() {
        let mut rng = StdRng::seed_from_u64(7);
        let profile = LinkProfile {
            loss_pct: 100,
            ..LinkProfile::default()
        };
        for _ in 0..100 {
            assert_eq!(run(&[0u8; 16], &profile, &mut rng), Verdict::Discard);
        }
    }

    #[test]
    fn loss_rate_converges_on_101_buckets() {
        let mut rng = StdRng::seed_from_u64(42);
        let profile = LinkProfile {
            loss_pct: 50,
            ..LinkProfile::default()
        };
        let n = 10_000;
        let delivered = (0..n)
            .filter(|_| matches!(run(&[0u8; 16], &profile, &mut rng), Verdict::Relay(_)))
            .count() as f64;
        // Expected survival rate is 1 - 50/101, not 1 - 50/100.
        let expected = (1.0 - 50.0 / 101.0) * n as f64;
        assert!((delivered - expected).abs() < 300.0, "delivered {delivered}");
    }

    #[test]
    fn truncation_cuts_to_minimum_and_sets_marker() {
        let mut rng = StdRng::seed_from_u64(3);
        let profile = LinkProfile {
            truncate_pct: 100,
            ..LinkProfile::default()
        };
        let mut payload = vec![0u8; 40];
        payload[1] = 9;
        match run(&payload, &profile, &mut rng) {
            Verdict::Relay(out) => {
                assert_eq!(out.len(), MIN_PKT_LEN);
                assert_eq!(out[0], TRUNCATED_BIT);
                assert_eq!(out[1..], payload[1..MIN_PKT_LEN]);
            }
            other => panic!("expected Relay, got {other:?}"),
        }
    }

    #[test]
    fn truncation_never_fires_without_the_rate() {
        let mut rng = StdRng::seed_from_u64(3);
        match run(&[0u8; 40], &LinkProfile::default(), &mut rng) {
            Verdict::Relay(out) => assert_eq!(out[0] & TRUNCATED_BIT, 0),
            other => panic!("expected Relay, got {other:?}"),
        }
    }

    #[test]
    fn truncation_and_corruption_are_exclusive() {
        let mut rng = StdRng::seed_from_u64(11);
        let profile = LinkProfile {
            truncate_pct: 100,
            corrupt_pct: 100,
            ..LinkProfile::default()
        };
        // Long enough to cut: always truncated, never also corrupted.
        let payload = vec![0u8; 40];
        for _ in 0..50 {
            let mut stats = RelayStats::default();
            let verdict = apply_link(
                payload.clone(),
                Direction::Forward,
                NOW_US,
                &profile,
                &mut rng,
                &mut stats,
            );
            assert_eq!(stats.truncated, 1);
            assert_eq!(stats.corrupted, 0);
            match verdict {
                Verdict::Relay(out) => assert_eq!(out[1..], payload[1..MIN_PKT_LEN]),
                other => panic!("expected Relay, got {other:?}"),
            }
        }
    }

    #[test]
    fn minimum_length_packets_corrupt_instead_of_truncating() {
        let mut rng = StdRng::seed_from_u64(11);
        let profile = LinkProfile {
            truncate_pct: 100,
            corrupt_pct: 100,
            ..LinkProfile::default()
        };
        let mut stats = RelayStats::default();
        let verdict = apply_link(
            vec![0u8; MIN_PKT_LEN],
            Direction::Forward,
            NOW_US,
            &profile,
            &mut rng,
            &mut stats,
        );
        assert_eq!(stats.truncated, 0);
        assert_eq!(stats.corrupted, 1);
        match verdict {
            Verdict::Relay(out) => {
                assert_eq!(out.len(), MIN_PKT_LEN);
                assert_eq!(out.iter().filter(|b| **b == 0xFF).count(), 1);
            }
            other => panic!("expected Relay, got {other:?}"),
        }
    }

    #[test]
    fn corruption_inverts_exactly_one_byte() {
        let mut rng = StdRng::seed_from_u64(5);
        let profile = LinkProfile {
            corrupt_pct: 100,
            ..LinkProfile::default()
        };
        let payload: Vec<u8> = (0..32u8).collect();
        match run(&payload, &profile, &mut rng) {
            Verdict::Relay(out) => {
                let flipped: Vec<usize> = (0..payload.len())
                    .filter(|i| out[*i] != payload[*i])
                    .collect();
                assert_eq!(flipped.len(), 1);
                let i = flipped[0];
                assert_eq!(out[i], !payload[i]);
            }
            other => panic!("expected Relay, got {other:?}"),
        }
    }

    #[test]
    fn fixed_delay_defers_to_the_exact_deadline() {
        let mut rng = StdRng::seed_from_u64(1);
        let profile = LinkProfile {
            delay_ms: 50,
            ..LinkProfile::default()
        };
        match run(&[0u8; 16], &profile, &mut rng) {
            Verdict::Defer(pkt) => assert_eq!(pkt.deadline_us, NOW_US + 50_000),
            other => panic!("expected Defer, got {other:?}"),
        }
    }

    #[test]
    fn delay_wraps_at_the_ten_second_cap() {
        let mut rng = StdRng::seed_from_u64(1);
        let profile = LinkProfile {
            delay_ms: 12_000,
            ..LinkProfile::default()
        };
        match run(&[0u8; 16], &profile, &mut rng) {
            Verdict::Defer(pkt) => assert_eq!(pkt.deadline_us, NOW_US + 2_000_000),
            other => panic!("expected Defer, got {other:?}"),
        }
    }

    #[test]
    fn jitter_stays_within_the_configured_band() {
        let mut rng = StdRng::seed_from_u64(9);
        let profile = LinkProfile {
            delay_ms: 50,
            jitter_ms: 20,
            ..LinkProfile::default()
        };
        for _ in 0..500 {
            match run(&[0u8; 16], &profile, &mut rng) {
                Verdict::Defer(pkt) => {
                    let applied_ms = (pkt.deadline_us - NOW_US) / 1_000;
                    assert!((30..70).contains(&applied_ms), "applied {applied_ms}");
                }
                other => panic!("expected Defer, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_jitter_clamps_at_zero() {
        let mut rng = StdRng::seed_from_u64(13);
        let profile = LinkProfile {
            delay_ms: 10,
            jitter_ms: 50,
            ..LinkProfile::default()
        };
        for _ in 0..500 {
            match run(&[0u8; 16], &profile, &mut rng) {
                Verdict::Defer(pkt) => {
                    let applied_ms = (pkt.deadline_us - NOW_US) / 1_000;
                    assert!(applied_ms < 60, "applied {applied_ms}");
                }
                other => panic!("expected Defer, got {other:?}"),
            }
        }
    }

    // Two runs with the same seed over the same arrival sequence must agree
    // on every decision, byte index and applied delay.
    #[test]
    fn identical_seeds_replay_identically() {
        let profile = LinkProfile {
            delay_ms: 30,
            jitter_ms: 15,
            loss_pct: 25,
            corrupt_pct: 25,
            truncate_pct: 25,
            mask: DirectionMask::Both,
        };
        let arrivals: Vec<Vec<u8>> = (0..200)
            .map(|i| vec![i as u8; 16 + (i % 40)])
            .collect();

        let replay = |seed: u64| -> Vec<Verdict> {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut stats = RelayStats::default();
            arrivals
                .iter()
                .map(|p| {
                    apply_link(
                        p.clone(),
                        Direction::Forward,
                        NOW_US,
                        &profile,
                        &mut rng,
                        &mut stats,
                    )
                })
                .collect()
        };

        assert_eq!(replay(0xC0FFEE), replay(0xC0FFEE));
    }
}
