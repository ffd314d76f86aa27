use parking_lot::Mutex;
use pianola_ports::clock::ClockPort;
use pianola_ports::tone::{ToneEvent, TonePort};

const RELEASE_SECS: f64 = 0.1;
const MASTER_GAIN: f32 = 0.3;
/// Gain remaining at the nominal end of a tone; the release tail fades the
/// rest to silence.
const DECAY_FLOOR: f32 = 0.01;

pub struct TriangleSynth {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    sample_rate_hz: f32,
    max_voices: usize,
    /// Audio-driven time in seconds, advanced by `render`.
    now_secs: f64,
    voices: Vec<Voice>,
    voice_counter: u64,
}

#[derive(Clone, Debug)]
struct Voice {
    freq: f32,
    peak_gain: f32,
    starts_at: f64,
    /// Nominal end; the release tail extends past it.
    sounds_until: f64,
    dies_at: f64,
    phase: f32,
    age: u64,
}

impl TriangleSynth {
    pub fn new(sample_rate_hz: u32, max_voices: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sample_rate_hz: sample_rate_hz.max(1) as f32,
                max_voices: max_voices.max(8),
                now_secs: 0.0,
                voices: Vec::new(),
                voice_counter: 0,
            }),
        }
    }

    pub fn set_sample_rate(&self, sample_rate_hz: u32) {
        let mut inner = self.inner.lock();
        inner.sample_rate_hz = sample_rate_hz.max(1) as f32;
    }

    pub fn active_voices(&self) -> usize {
        self.inner.lock().voices.len()
    }

    /// Mix every live voice into `out` (mono) and advance the audio clock
    /// by the buffer length.
    pub fn render(&self, out: &mut [f32]) {
        let mut inner = self.inner.lock();
        inner.render(out);
    }
}

impl Default for TriangleSynth {
    fn default() -> Self {
        Self::new(48_000, 64)
    }
}

fn pitch_to_freq(pitch: u8) -> f32 {
    440.0 * 2.0_f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// Triangle wave over phase 0..1, peaking mid-cycle.
fn triangle(phase: f32) -> f32 {
    1.0 - 4.0 * (phase - 0.5).abs()
}

impl Inner {
    fn start_voice(&mut self, tone: &ToneEvent) {
        self.voice_counter = self.voice_counter.wrapping_add(1);

        if self.voices.len() >= self.max_voices {
            if let Some((idx, _)) = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, voice)| voice.age)
            {
                self.voices.swap_remove(idx);
            }
        }

        let starts_at = tone.at_secs.max(self.now_secs);
        let sounds_until = starts_at + tone.duration_secs.max(0.0);
        self.voices.push(Voice {
            freq: pitch_to_freq(tone.pitch),
            peak_gain: (tone.velocity as f32 / 127.0).clamp(0.05, 1.0) * MASTER_GAIN,
            starts_at,
            sounds_until,
            dies_at: sounds_until + RELEASE_SECS,
            phase: 0.0,
            age: self.voice_counter,
        });
    }

    fn render(&mut self, out: &mut [f32]) {
        for value in out.iter_mut() {
            *value = 0.0;
        }

        let step_secs = 1.0 / self.sample_rate_hz as f64;
        for voice in &mut self.voices {
            let phase_step = voice.freq / self.sample_rate_hz;
            let span = (voice.sounds_until - voice.starts_at).max(step_secs);
            for (i, value) in out.iter_mut().enumerate() {
                let t = self.now_secs + i as f64 * step_secs;
                if t < voice.starts_at || t >= voice.dies_at {
                    continue;
                }
                let gain = if t < voice.sounds_until {
                    let progress = ((t - voice.starts_at) / span) as f32;
                    voice.peak_gain * DECAY_FLOOR.powf(progress)
                } else {
                    let fade = 1.0 - ((t - voice.sounds_until) / RELEASE_SECS) as f32;
                    voice.peak_gain * DECAY_FLOOR * fade.max(0.0)
                };
                *value += triangle(voice.phase) * gain;
                voice.phase += phase_step;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
            }
        }

        self.now_secs += out.len() as f64 * step_secs;
        let now = self.now_secs;
        self.voices.retain(|voice| voice.dies_at > now);
    }
}

impl TonePort for TriangleSynth {
    fn start_tone(&self, tone: &ToneEvent) {
        let mut inner = self.inner.lock();
        inner.start_voice(tone);
    }

    fn all_off(&self) {
        let mut inner = self.inner.lock();
        inner.voices.clear();
    }
}

impl ClockPort for TriangleSynth {
    fn now_secs(&self) -> f64 {
        self.inner.lock().now_secs
    }
}
