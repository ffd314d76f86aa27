/// Monotonic clock in seconds. Playback anchors wall-clock math on this so
/// tests can drive time by hand.
pub trait ClockPort: Send + Sync {
    fn now_secs(&self) -> f64;
}
