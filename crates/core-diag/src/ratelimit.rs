use std::time::{Duration, Instant};

/// The three independent rate-limited log channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    ProduceErrors,
    BusErrors,
    DeliveryErrors,
}

const CHANNEL_COUNT: usize = 3;

fn index(channel: Channel) -> usize {
    match channel {
        Channel::ProduceErrors => 0,
        Channel::BusErrors => 1,
        Channel::DeliveryErrors => 2,
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    period_start: Instant,
    total: u64,
    suppressed: u64,
}

impl ChannelState {
    fn new(now: Instant) -> Self {
        Self {
            period_start: now,
            total: 0,
            suppressed: 0,
        }
    }
}

/// What the caller should do with this event: log it, or it was
/// folded into the suppressed count. [`PeriodSummary`] is returned
/// alongside whenever a period boundary is crossed so the caller can
/// emit one rate-limit summary line before logging (or not logging)
/// the current event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Log,
    Suppressed,
}

#[derive(Debug, Clone, Copy)]
pub struct PeriodSummary {
    pub total: u64,
    pub suppressed: u64,
}

pub struct RateLimiter {
    max_per_period: u64,
    period: Duration,
    channels: [ChannelState; CHANNEL_COUNT],
}

impl RateLimiter {
    pub fn new(max_per_period: u64, period: Duration) -> Self {
        let now = Instant::now();
        Self {
            max_per_period,
            period,
            channels: [
                ChannelState::new(now),
                ChannelState::new(now),
                ChannelState::new(now),
            ],
        }
    }

    /// Records one event on `channel` at `now`. Returns the decision
    /// for *this* event, plus a summary of the just-closed period when
    /// `now` has crossed a period boundary and that period suppressed
    /// at least one event.
    pub fn record(&mut self, channel: Channel, now: Instant) -> (Decision, Option<PeriodSummary>) {
        let state = &mut self.channels[index(channel)];
        let mut summary = None;

        if now.duration_since(state.period_start) >= self.period {
            if state.suppressed > 0 {
                summary = Some(PeriodSummary {
                    total: state.total,
                    suppressed: state.suppressed,
                });
            }
            *state = ChannelState::new(now);
        }

        state.total += 1;
        if state.total <= self.max_per_period {
            (Decision::Log, summary)
        } else {
            state.suppressed += 1;
            (Decision::Suppressed, summary)
        }
    }
}
