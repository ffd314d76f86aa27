/// A sound-producing side effect, anchored to an absolute timestamp on the
/// same clock `ClockPort` reports. Fire-and-forget: the adapter owns the
/// voice for its lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct ToneEvent {
    pub note_id: String,
    pub pitch: u8,
    pub velocity: u8,
    pub at_secs: f64,
    pub duration_secs: f64,
}

pub trait TonePort: Send + Sync {
    fn start_tone(&self, tone: &ToneEvent);

    /// Kill every sounding and pending voice. Must be safe to call twice.
    fn all_off(&self);
}
