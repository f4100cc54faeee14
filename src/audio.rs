//! synthesized alarm sound
//!
//! the output device is opened lazily on the first alert and then shared by every alert, each
//! alert gets its own voice so overlapping alerts don't cut each other off

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rodio::{
    source::{SineWave, Source},
    OutputStream, OutputStreamHandle, Sink,
};

use crate::{error::AudioError, trigger::TriggerId};

/// most cycles queued for one alert, about an hour at the default period
pub const MAX_CYCLES: u32 = 900;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pulse {
    Tone { frequency: f32, duration: Duration },
    Rest(Duration),
}

impl Pulse {
    #[must_use]
    pub const fn duration(&self) -> Duration {
        match self {
            Self::Tone { duration, .. } | Self::Rest(duration) => *duration,
        }
    }
}

/// a fast burst of short high pulses, a gap, a slower burst of longer lower pulses, then quiet
/// until the period is over
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmPattern {
    pub fast_frequency: f32,
    pub fast_pulses: u32,
    pub fast_tone: Duration,
    pub fast_spacing: Duration,
    pub burst_gap: Duration,
    pub slow_frequency: f32,
    pub slow_pulses: u32,
    pub slow_tone: Duration,
    pub slow_spacing: Duration,
    pub period: Duration,
    pub gain: f32,
}

impl Default for AlarmPattern {
    fn default() -> Self {
        Self {
            fast_frequency: 880.0,
            fast_pulses: 3,
            fast_tone: Duration::from_millis(100),
            fast_spacing: Duration::from_millis(200),
            burst_gap: Duration::from_millis(400),
            slow_frequency: 660.0,
            slow_pulses: 2,
            slow_tone: Duration::from_millis(400),
            slow_spacing: Duration::from_millis(700),
            period: Duration::from_secs(4),
            gain: 0.3,
        }
    }
}

impl AlarmPattern {
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// one repetition of the pattern, always exactly `period` long unless the bursts
    /// themselves are longer
    #[must_use]
    pub fn cycle(&self) -> Vec<Pulse> {
        let mut pulses = Vec::new();
        burst(
            &mut pulses,
            self.fast_frequency,
            self.fast_pulses,
            self.fast_tone,
            self.fast_spacing,
        );
        pulses.push(Pulse::Rest(self.burst_gap));
        burst(
            &mut pulses,
            self.slow_frequency,
            self.slow_pulses,
            self.slow_tone,
            self.slow_spacing,
        );
        let used: Duration = pulses.iter().map(Pulse::duration).sum();
        let rest = self.period.saturating_sub(used);
        if !rest.is_zero() {
            pulses.push(Pulse::Rest(rest));
        }
        pulses
    }

    /// how many cycles fit in `ceiling`, at least one and never more than [`MAX_CYCLES`]
    #[must_use]
    pub fn cycles_within(&self, ceiling: Duration) -> u32 {
        let period = self.cycle().iter().map(Pulse::duration).sum::<Duration>();
        if period.is_zero() {
            return 1;
        }
        let cycles = ceiling.as_millis().div_ceil(period.as_millis());
        u32::try_from(cycles).unwrap_or(MAX_CYCLES).clamp(1, MAX_CYCLES)
    }
}

fn burst(pulses: &mut Vec<Pulse>, frequency: f32, count: u32, tone: Duration, spacing: Duration) {
    for _ in 0..count {
        pulses.push(Pulse::Tone {
            frequency,
            duration: tone,
        });
        let gap = spacing.saturating_sub(tone);
        if !gap.is_zero() {
            pulses.push(Pulse::Rest(gap));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

/// the platform audio output
pub trait AudioBackend {
    /// create the shared output, only called until it succeeds once
    ///
    /// # Errors
    /// if there is no usable output device
    fn open(&mut self) -> Result<(), AudioError>;

    /// wake the output up again if the platform suspended it
    fn resume(&mut self) {}

    /// start a new voice playing `cycles` repetitions of `pattern`
    ///
    /// # Errors
    /// if the voice can't be created
    fn start(
        &mut self,
        pattern: &AlarmPattern,
        cycles: u32,
        volume: f32,
    ) -> Result<VoiceId, AudioError>;

    /// stop and release a voice, unknown voices are ignored
    fn stop(&mut self, voice: VoiceId);
}

struct Playing {
    voice: VoiceId,
    started_at: DateTime<Utc>,
}

/// plays the alarm pattern for firing triggers
pub struct AlarmSound {
    backend: Box<dyn AudioBackend>,
    pattern: AlarmPattern,
    ceiling: Duration,
    volume: f32,
    output_open: bool,
    playing: HashMap<TriggerId, Playing>,
}

impl AlarmSound {
    #[must_use]
    pub fn new(backend: Box<dyn AudioBackend>, pattern: AlarmPattern, ceiling: Duration, volume: f32) -> Self {
        Self {
            backend,
            pattern,
            ceiling,
            volume: volume.clamp(0.0, 1.0),
            output_open: false,
            playing: HashMap::new(),
        }
    }

    /// starts the alarm for `trigger`, returns false if no sound could be played
    ///
    /// never fails, a missing sound must not keep the rest of the alert from happening
    pub fn play(&mut self, trigger: TriggerId, now: DateTime<Utc>) -> bool {
        if !self.output_open {
            if let Err(e) = self.backend.open() {
                warn!("alarm sound unavailable: {e}");
                return false;
            }
            self.output_open = true;
        }
        self.backend.resume();
        // the same trigger ringing again replaces its old voice
        if let Some(old) = self.playing.remove(&trigger) {
            self.backend.stop(old.voice);
        }
        let cycles = self.pattern.cycles_within(self.ceiling);
        match self.backend.start(&self.pattern, cycles, self.volume) {
            Ok(voice) => {
                debug!("alarm sound started for {trigger}");
                self.playing.insert(
                    trigger,
                    Playing {
                        voice,
                        started_at: now,
                    },
                );
                true
            }
            Err(e) => {
                warn!("couldn't play alarm sound for {trigger}: {e}");
                false
            }
        }
    }

    /// safe to call when nothing is playing
    pub fn stop(&mut self, trigger: TriggerId) -> bool {
        match self.playing.remove(&trigger) {
            Some(playing) => {
                self.backend.stop(playing.voice);
                debug!("alarm sound stopped for {trigger}");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, playing) in self.playing.drain() {
            self.backend.stop(playing.voice);
        }
    }

    /// stops every alarm that has been sounding for longer than the ceiling
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<TriggerId> {
        let Ok(ceiling) = chrono::Duration::from_std(self.ceiling) else {
            return Vec::new();
        };
        let expired = self
            .playing
            .iter()
            .filter(|(_, playing)| now - playing.started_at >= ceiling)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for id in &expired {
            debug!("alarm for {id} reached its ceiling");
            self.stop(*id);
        }
        expired
    }

    #[must_use]
    pub fn is_playing(&self, trigger: TriggerId) -> bool {
        self.playing.contains_key(&trigger)
    }

    #[must_use]
    pub fn is_any_playing(&self) -> bool {
        !self.playing.is_empty()
    }
}

/// a voice owns its sink, dropping it stops the sound
struct Voice {
    sink: Sink,
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.sink.stop();
    }
}

/// plays through the default output device with rodio
#[derive(Default)]
pub struct RodioBackend {
    output: Option<(OutputStream, OutputStreamHandle)>,
    voices: HashMap<VoiceId, Voice>,
    next_voice: u64,
}

impl RodioBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for RodioBackend {
    fn open(&mut self) -> Result<(), AudioError> {
        if self.output.is_none() {
            let output =
                OutputStream::try_default().map_err(|e| AudioError::Unavailable(e.to_string()))?;
            self.output = Some(output);
        }
        Ok(())
    }

    fn resume(&mut self) {
        // finished voices are dropped here so the map doesn't grow forever
        self.voices.retain(|_, voice| !voice.sink.empty());
        for voice in self.voices.values() {
            if voice.sink.is_paused() {
                voice.sink.play();
            }
        }
    }

    fn start(
        &mut self,
        pattern: &AlarmPattern,
        cycles: u32,
        volume: f32,
    ) -> Result<VoiceId, AudioError> {
        let (_, handle) = self
            .output
            .as_ref()
            .ok_or_else(|| AudioError::Unavailable("output was never opened".to_string()))?;
        let sink = Sink::try_new(handle).map_err(|e| AudioError::Playback(e.to_string()))?;
        sink.set_volume(volume);
        let cycle = pattern.cycle();
        for _ in 0..cycles {
            for pulse in &cycle {
                match *pulse {
                    Pulse::Tone {
                        frequency,
                        duration,
                    } => sink.append(
                        SineWave::new(frequency)
                            .take_duration(duration)
                            .amplify(pattern.gain),
                    ),
                    Pulse::Rest(duration) => {
                        sink.append(SineWave::new(0.0).take_duration(duration).amplify(0.0));
                    }
                }
            }
        }
        sink.play();
        self.next_voice += 1;
        let voice = VoiceId(self.next_voice);
        self.voices.insert(voice, Voice { sink });
        Ok(voice)
    }

    fn stop(&mut self, voice: VoiceId) {
        self.voices.remove(&voice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tones(pulses: &[Pulse]) -> Vec<(f32, Duration)> {
        pulses
            .iter()
            .filter_map(|pulse| match *pulse {
                Pulse::Tone {
                    frequency,
                    duration,
                } => Some((frequency, duration)),
                Pulse::Rest(_) => None,
            })
            .collect()
    }

    #[test]
    fn cycle_fills_the_period() {
        let pattern = AlarmPattern::default();
        let total: Duration = pattern.cycle().iter().map(Pulse::duration).sum();
        assert_eq!(total, Duration::from_secs(4));
    }

    #[test]
    fn fast_burst_then_slow_burst() {
        let pattern = AlarmPattern::default();
        let tones = tones(&pattern.cycle());
        assert_eq!(tones.len(), 5);
        assert!(tones[..3]
            .iter()
            .all(|&(f, d)| f == 880.0 && d == Duration::from_millis(100)));
        assert!(tones[3..]
            .iter()
            .all(|&(f, d)| f == 660.0 && d == Duration::from_millis(400)));
    }

    #[test]
    fn cycles_cover_the_ceiling() {
        let pattern = AlarmPattern::default();
        assert_eq!(pattern.cycles_within(Duration::from_secs(60)), 15);
        assert_eq!(pattern.cycles_within(Duration::from_secs(61)), 16);
        assert_eq!(pattern.cycles_within(Duration::ZERO), 1);
    }

    #[test]
    fn huge_ceilings_are_capped() {
        let pattern = AlarmPattern::default();
        assert_eq!(pattern.cycles_within(Duration::from_secs(u64::MAX)), MAX_CYCLES);
        assert_eq!(pattern.cycles_within(Duration::from_secs(3600)), MAX_CYCLES);
    }

    #[test]
    fn long_bursts_are_not_truncated() {
        let pattern = AlarmPattern::default().with_period(Duration::from_secs(1));
        let total: Duration = pattern.cycle().iter().map(Pulse::duration).sum();
        assert_eq!(total, Duration::from_millis(2400));
    }
}
