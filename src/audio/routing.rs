// Audio Routing - Channel gain resolution for the mixer
//
// Mute and solo never remove triggers. A silenced channel keeps playing into
// a gain of negative infinity dB so it can come back without rescheduling.

use crate::sequencer::pattern::{Channel, ChannelId};
use std::collections::HashMap;

/// Whether a channel is heard given the solo state of the whole mixer
///
/// With any channel soloed only soloed channels are audible, muted or not.
/// Otherwise muted channels are silent.
pub fn is_audible(channel: &Channel, any_soloed: bool) -> bool {
    if any_soloed {
        channel.is_soloed
    } else {
        !channel.is_muted
    }
}

/// Effective gain of a channel in dB
pub fn effective_gain_db(channel: &Channel, any_soloed: bool) -> f32 {
    if is_audible(channel, any_soloed) {
        channel.volume
    } else {
        f32::NEG_INFINITY
    }
}

/// Effective gain of every channel, in input order
pub fn resolve_gains<'a>(channels: impl IntoIterator<Item = &'a Channel>) -> Vec<(ChannelId, f32)> {
    let channels: Vec<&Channel> = channels.into_iter().collect();
    let any_soloed = channels.iter().any(|c| c.is_soloed);
    channels
        .into_iter()
        .map(|c| (c.id.clone(), effective_gain_db(c, any_soloed)))
        .collect()
}

pub fn db_to_linear(db: f32) -> f32 {
    if db == f32::NEG_INFINITY {
        0.0
    } else {
        10f32.powf(db / 20.0)
    }
}

/// Last gains sent to the engine, so only changes are re-sent
#[derive(Debug, Clone, Default)]
pub struct MixerGains {
    current: HashMap<ChannelId, f32>,
}

impl MixerGains {
    /// Resolve gains for `channels` and return those that differ from the last update
    pub fn update<'a>(&mut self, channels: impl IntoIterator<Item = &'a Channel>) -> Vec<(ChannelId, f32)> {
        let resolved = resolve_gains(channels);
        let mut changed = Vec::new();
        let mut next = HashMap::with_capacity(resolved.len());
        for (id, gain) in resolved {
            if self.current.get(&id) != Some(&gain) {
                changed.push((id.clone(), gain));
            }
            next.insert(id, gain);
        }
        self.current = next;
        changed
    }

    pub fn gain_db(&self, channel_id: &str) -> Option<f32> {
        self.current.get(channel_id).copied()
    }
}
