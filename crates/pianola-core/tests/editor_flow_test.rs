use parking_lot::Mutex;
use pianola_core::{
    AppError, AudioConvertOptions, Command, EditAction, EditorCore, Event, NewNote, Zoom,
};
use pianola_domain_song::{export_midi_path, import_midi_bytes, Note, Song};
use pianola_ports::{
    AudioDecodeError, AudioDecodePort, Capability, ClockPort, DecodedAudio, InferProgress,
    NoteExtractOptions, PitchActivations, PitchInferError, PitchInferencePort, RawNoteEvent,
    SettingsDto, SheetRenderError, SheetRenderPort, StorageError, StoragePort, ToneEvent,
    TonePort,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn temp_path(name: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("pianola-{name}-{nanos}.{ext}"))
}

struct ManualClock(Mutex<f64>);

impl ManualClock {
    fn set(&self, secs: f64) {
        *self.0.lock() = secs;
    }
}

impl ClockPort for ManualClock {
    fn now_secs(&self) -> f64 {
        *self.0.lock()
    }
}

#[derive(Default)]
struct RecordingTone {
    started: Mutex<Vec<ToneEvent>>,
    all_off_calls: AtomicUsize,
}

impl TonePort for RecordingTone {
    fn start_tone(&self, tone: &ToneEvent) {
        self.started.lock().push(tone.clone());
    }

    fn all_off(&self) {
        self.all_off_calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct StubDecoder;

impl AudioDecodePort for StubDecoder {
    fn decode(&self, _bytes: &[u8]) -> Result<DecodedAudio, AudioDecodeError> {
        Ok(DecodedAudio {
            samples: vec![0.0; 22_050],
            sample_rate_hz: 22_050,
        })
    }

    fn resample(&self, audio: &DecodedAudio, target_rate_hz: u32) -> DecodedAudio {
        DecodedAudio {
            samples: audio.samples.clone(),
            sample_rate_hz: target_rate_hz,
        }
    }
}

/// Reports one A4 note; an optional per-step delay keeps the job alive
/// long enough for cancellation tests to land.
struct StubInference {
    step_delay: Option<Duration>,
}

impl PitchInferencePort for StubInference {
    fn capability(&self) -> Capability {
        Capability::ok()
    }

    fn infer(
        &self,
        _samples: &[f32],
        _sample_rate_hz: u32,
        on_progress: InferProgress,
    ) -> Result<PitchActivations, PitchInferError> {
        let steps = if self.step_delay.is_some() { 400 } else { 4 };
        for step in 0..steps {
            if let Some(delay) = self.step_delay {
                std::thread::sleep(delay);
            }
            if !on_progress(step as f32 / steps as f32) {
                return Err(PitchInferError::Cancelled);
            }
        }
        Ok(PitchActivations {
            frames: vec![vec![1.0; 88]; 4],
            onsets: vec![vec![1.0; 88]; 4],
            contours: vec![vec![1.0; 88]; 4],
            frames_per_second: 43.0,
            first_pitch: 21,
        })
    }

    fn extract_notes(
        &self,
        _activations: &PitchActivations,
        _options: &NoteExtractOptions,
    ) -> Vec<RawNoteEvent> {
        vec![RawNoteEvent {
            pitch_midi: 69.0,
            start_secs: 0.5,
            duration_secs: 1.0,
            amplitude: 0.8,
        }]
    }
}

#[derive(Default)]
struct MemoryStorage {
    saved: Mutex<Option<SettingsDto>>,
}

impl StoragePort for MemoryStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        Ok(self.saved.lock().clone().unwrap_or_default())
    }

    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        *self.saved.lock() = Some(s.clone());
        Ok(())
    }
}

struct StubSheetRenderer;

impl SheetRenderPort for StubSheetRenderer {
    fn render_pdf(&self, musicxml: &str) -> Result<Vec<u8>, SheetRenderError> {
        Ok(format!("%PDF-stub {} bytes", musicxml.len()).into_bytes())
    }
}

struct Fixture {
    clock: Arc<ManualClock>,
    tone: Arc<RecordingTone>,
    storage: Arc<MemoryStorage>,
    core: EditorCore,
}

fn fixture_with_inference(step_delay: Option<Duration>) -> Fixture {
    let clock = Arc::new(ManualClock(Mutex::new(0.0)));
    let tone = Arc::new(RecordingTone::default());
    let storage = Arc::new(MemoryStorage::default());
    let core = EditorCore::new(
        clock.clone(),
        tone.clone(),
        Arc::new(StubDecoder),
        Arc::new(StubInference { step_delay }),
        Some(Box::new(StubSheetRenderer)),
        Some(Box::new(SharedStorage(storage.clone()))),
    );
    Fixture {
        clock,
        tone,
        storage,
        core,
    }
}

fn fixture() -> Fixture {
    fixture_with_inference(None)
}

/// Lets a test keep a handle on storage the core owns.
struct SharedStorage(Arc<MemoryStorage>);

impl StoragePort for SharedStorage {
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        self.0.load_settings()
    }

    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        self.0.save_settings(s)
    }
}

fn add_note_cmd(pitch: u8, start: i64, duration: i64) -> Command {
    Command::Edit {
        action: EditAction::AddNote {
            track_id: "track-0".into(),
            note: NewNote {
                pitch,
                start,
                duration,
                velocity: 100,
            },
        },
    }
}

fn pump_until_conversion_done(fx: &mut Fixture) -> Vec<Event> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    loop {
        fx.core.tick();
        events.extend(fx.core.drain_events());
        if !fx.core.conversion_running() {
            return events;
        }
        assert!(Instant::now() < deadline, "conversion never finished");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn new_song_emits_document_selection_and_transport() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong {
            name: "Fresh".into(),
        })
        .unwrap();
    let events = fx.core.drain_events();
    assert!(matches!(
        &events[0],
        Event::DocumentChanged { song: Some(song), can_undo: false, can_redo: false }
            if song.name == "Fresh"
    ));
    assert!(matches!(&events[1], Event::SelectionChanged { selected } if selected.is_empty()));
    assert!(matches!(
        &events[2],
        Event::TransportUpdated {
            position,
            playing: false
        } if *position == 0.0
    ));
}

#[test]
fn edits_flow_through_reducer_and_report_undo_depth() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong { name: "Doc".into() })
        .unwrap();
    fx.core.drain_events();
    fx.core.handle_command(add_note_cmd(60, 0, 480)).unwrap();
    let events = fx.core.drain_events();
    assert!(matches!(
        &events[0],
        Event::DocumentChanged { can_undo: true, .. }
    ));
    fx.core
        .handle_command(Command::Edit {
            action: EditAction::Undo,
        })
        .unwrap();
    let song = fx.core.state().song.clone().unwrap();
    assert_eq!(song.tracks[0].notes.len(), 0);
}

#[test]
fn load_file_dispatches_on_extension() {
    let mut fx = fixture();

    let mut song = Song::empty("OnDisk");
    song.tracks[0].notes.push(Note {
        id: "note-0-0".into(),
        pitch: 64,
        start: 0,
        duration: 480,
        velocity: 90,
        track: 0,
    });
    let path = temp_path("flow-load", "mid");
    export_midi_path(&song, &path).unwrap();

    fx.core
        .handle_command(Command::LoadFile {
            path: path.to_string_lossy().into_owned(),
        })
        .unwrap();
    let loaded = fx.core.state().song.clone().unwrap();
    assert_eq!(loaded.tracks[0].notes.len(), 1);
    assert_eq!(loaded.tracks[0].notes[0].pitch, 64);

    // The containing directory is remembered for the next open dialog.
    let saved = fx.storage.saved.lock().clone().unwrap();
    assert_eq!(
        saved.last_open_dir.as_deref(),
        path.parent().and_then(|p| p.to_str())
    );

    let err = fx
        .core
        .handle_command(Command::LoadFile {
            path: "song.pdf".into(),
        })
        .unwrap_err();
    assert!(matches!(err, AppError::FileLoad(_)));

    std::fs::remove_file(&path).ok();
}

#[test]
fn playback_run_ends_stopped_at_zero_with_tones_killed() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong { name: "Run".into() })
        .unwrap();
    // Single note ending at tick 1920 = 2.0 s at the default tempo.
    fx.core.handle_command(add_note_cmd(60, 1440, 480)).unwrap();
    fx.core
        .handle_command(Command::Play { from_tick: None })
        .unwrap();
    assert!(fx.core.state().is_playing);

    fx.clock.set(0.5);
    fx.core.tick();
    assert!(fx.core.state().is_playing);
    assert!(fx.core.state().position > 0.0);

    fx.clock.set(2.1);
    fx.core.tick();
    assert!(!fx.core.state().is_playing);
    assert_eq!(fx.core.state().position, 0.0);
    assert!(fx.tone.all_off_calls.load(Ordering::SeqCst) >= 1);
}

#[test]
fn pause_then_stop_controls_transport_state() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong { name: "T".into() })
        .unwrap();
    fx.core.handle_command(add_note_cmd(60, 0, 4000)).unwrap();
    fx.core
        .handle_command(Command::Play { from_tick: None })
        .unwrap();
    fx.clock.set(1.0);
    fx.core.tick();
    fx.core.handle_command(Command::Pause).unwrap();
    let frozen = fx.core.state().position;
    assert!(frozen > 0.0);
    assert!(!fx.core.state().is_playing);
    // Pause leaves voices alone; stop kills them and rewinds.
    assert_eq!(fx.tone.all_off_calls.load(Ordering::SeqCst), 0);
    fx.core.handle_command(Command::Stop).unwrap();
    assert_eq!(fx.core.state().position, 0.0);
    assert!(fx.tone.all_off_calls.load(Ordering::SeqCst) >= 1);
}

#[test]
fn play_without_a_song_is_rejected() {
    let mut fx = fixture();
    let err = fx
        .core
        .handle_command(Command::Play { from_tick: None })
        .unwrap_err();
    assert!(matches!(err, AppError::NoSong));
}

#[test]
fn preview_reaches_the_tone_port_untouched_by_document_state() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::PreviewPitch { pitch: 72 })
        .unwrap();
    let started = fx.tone.started.lock();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].pitch, 72);
    assert!(fx.core.state().song.is_none());
}

#[test]
fn quantization_and_zoom_persist_clamped() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::Edit {
            action: EditAction::SetQuantization(8),
        })
        .unwrap();
    fx.core
        .handle_command(Command::Edit {
            action: EditAction::SetZoom(Zoom { x: 9.0, y: 0.1 }),
        })
        .unwrap();
    assert_eq!(fx.core.state().zoom, Zoom { x: 3.0, y: 0.5 });
    let saved = fx.storage.saved.lock().clone().unwrap();
    assert_eq!(saved.quantization, 8);
    assert_eq!(saved.zoom_x, 3.0);
    assert_eq!(saved.zoom_y, 0.5);
    let settings_events = fx
        .core
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::SettingsUpdated { .. }))
        .count();
    assert_eq!(settings_events, 2);
}

#[test]
fn tempo_edits_clamp_to_the_ui_range() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong { name: "T".into() })
        .unwrap();
    fx.core
        .handle_command(Command::Edit {
            action: EditAction::SetTempo(999.0),
        })
        .unwrap();
    assert_eq!(fx.core.state().song.as_ref().unwrap().tempo, 240.0);
    fx.core
        .handle_command(Command::Edit {
            action: EditAction::SetTempo(1.0),
        })
        .unwrap();
    assert_eq!(fx.core.state().song.as_ref().unwrap().tempo, 40.0);
}

#[test]
fn export_midi_round_trips_through_disk() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong { name: "Out".into() })
        .unwrap();
    fx.core.handle_command(add_note_cmd(67, 480, 240)).unwrap();
    let path = temp_path("flow-export", "mid");
    fx.core
        .handle_command(Command::ExportMidi {
            path: path.to_string_lossy().into_owned(),
        })
        .unwrap();
    let events = fx.core.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Exported { kind, .. } if kind == "midi")));
    let bytes = std::fs::read(&path).unwrap();
    let back = import_midi_bytes(&bytes).unwrap();
    assert_eq!(back.tracks[0].notes.len(), 1);
    assert_eq!(back.tracks[0].notes[0].pitch, 67);
    std::fs::remove_file(&path).ok();
}

#[test]
fn export_pdf_goes_through_the_sheet_renderer() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong { name: "Pdf".into() })
        .unwrap();
    let path = temp_path("flow-pdf", "pdf");
    fx.core
        .handle_command(Command::ExportPdf {
            path: path.to_string_lossy().into_owned(),
        })
        .unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF-stub"));
    std::fs::remove_file(&path).ok();
}

#[test]
fn conversion_job_loads_the_transcribed_song() {
    let mut fx = fixture();
    let path = temp_path("flow-conv", "wav");
    std::fs::write(&path, b"stub wav bytes").unwrap();
    fx.core
        .handle_command(Command::ConvertAudioFile {
            path: path.to_string_lossy().into_owned(),
        })
        .unwrap();

    let events = pump_until_conversion_done(&mut fx);

    let percents: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            Event::ConversionProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*percents.last().unwrap(), 100.0);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ConversionFinished { ok: true, .. })));

    let song = fx.core.state().song.clone().unwrap();
    assert_eq!(song.name, "Converted from Audio");
    assert_eq!(song.tracks[0].notes.len(), 1);
    assert_eq!(song.tracks[0].notes[0].pitch, 69);

    std::fs::remove_file(&path).ok();
}

#[test]
fn conversion_is_single_flight_and_cancellable() {
    let mut fx = fixture_with_inference(Some(Duration::from_millis(5)));
    let path = temp_path("flow-cancel", "wav");
    std::fs::write(&path, b"stub wav bytes").unwrap();
    let path_str = path.to_string_lossy().into_owned();

    fx.core
        .handle_command(Command::ConvertAudioFile {
            path: path_str.clone(),
        })
        .unwrap();
    let second = fx
        .core
        .handle_command(Command::ConvertAudioFile { path: path_str })
        .unwrap_err();
    assert!(matches!(second, AppError::ConversionBusy));

    fx.core.handle_command(Command::CancelConversion).unwrap();
    let events = pump_until_conversion_done(&mut fx);
    let finished = events
        .iter()
        .find_map(|e| match e {
            Event::ConversionFinished { ok, message } => Some((*ok, message.clone())),
            _ => None,
        })
        .expect("conversion finished event");
    assert!(!finished.0);
    assert!(finished.1.contains("cancelled"));
    // The document never changed.
    assert!(fx.core.state().song.is_none());

    std::fs::remove_file(&path).ok();
}

#[test]
fn audio_options_round_trip_through_settings() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::SetAudioOptions {
            options: AudioConvertOptions {
                onset_threshold: 0.5,
                frame_threshold: 0.4,
                min_note_frames: 7,
                // Out of range; the stored value clamps to the ceiling.
                velocity_sensitivity: 1.2,
            },
        })
        .unwrap();
    let saved = fx.storage.saved.lock().clone().unwrap();
    assert_eq!(saved.onset_threshold, 0.5);
    assert_eq!(saved.frame_threshold, 0.4);
    assert_eq!(saved.min_note_frames, 7);
    assert_eq!(saved.velocity_sensitivity, 1.0);
}

#[test]
fn oversized_audio_upload_is_rejected_before_reading() {
    let mut fx = fixture();
    let err = fx
        .core
        .handle_command(Command::ConvertAudioFile {
            path: "missing.wav".into(),
        })
        .unwrap_err();
    // Metadata lookup fails before any decode work starts.
    assert!(matches!(err, AppError::FileLoad(_)));
    assert!(!fx.core.conversion_running());
}

#[test]
fn diagnostics_snapshot_command_writes_files() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong {
            name: "Diag".into(),
        })
        .unwrap();
    let dir = std::env::temp_dir().join(format!(
        "pianola-flow-diag-{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));
    fx.core
        .handle_command(Command::ExportDiagnostics {
            dir: dir.to_string_lossy().into_owned(),
        })
        .unwrap();
    assert!(dir.join("session.json").is_file());
    assert!(dir.join("settings.json").is_file());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn transport_events_throttle_while_playing() {
    let mut fx = fixture();
    fx.core
        .handle_command(Command::NewSong { name: "T".into() })
        .unwrap();
    fx.core.handle_command(add_note_cmd(60, 0, 4000)).unwrap();
    fx.core
        .handle_command(Command::Play { from_tick: None })
        .unwrap();
    fx.core.drain_events();

    // Two ticks inside one throttle window emit a single readout.
    fx.clock.set(1.0);
    fx.core.tick();
    fx.clock.set(1.001);
    fx.core.tick();
    let count = fx
        .core
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, Event::TransportUpdated { .. }))
        .count();
    assert_eq!(count, 1);
}
