use crate::convert::{
    convert_audio_to_song, validate_audio_upload, AudioConvertOptions, ConvertError,
};
use crate::diagnostics::write_snapshot;
use crate::editor::{EditAction, EditorState, Zoom};
use crate::ipc::{Command, Event};
use crate::playback::PlaybackEngine;
use crate::scheduler::PlaybackPhase;
use crate::transport::{clamp_tempo, is_quantization_choice, ZOOM_MAX, ZOOM_MIN};
use parking_lot::Mutex;
use pianola_domain_song::midi_export::export_midi_path;
use pianola_domain_song::midi_import::import_midi_path;
use pianola_domain_song::model::Song;
use pianola_domain_song::musicxml_export::export_musicxml;
use pianola_domain_song::musicxml_import::import_musicxml_path;
use pianola_ports::audio::AudioDecodePort;
use pianola_ports::clock::ClockPort;
use pianola_ports::pitch::PitchInferencePort;
use pianola_ports::render::{SheetRenderError, SheetRenderPort};
use pianola_ports::storage::{SettingsDto, StorageError, StoragePort};
use pianola_ports::tone::TonePort;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;

const TRANSPORT_EMIT_INTERVAL_SECS: f64 = 0.033;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("sheet render error: {0}")]
    Render(#[from] SheetRenderError),
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),
    #[error("file load failed: {0}")]
    FileLoad(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("no song loaded")]
    NoSong,
    #[error("a conversion is already running")]
    ConversionBusy,
}

/// Shared handle the embedder's threads serialize through.
pub type SharedCore = Arc<Mutex<EditorCore>>;

enum ConvertMessage {
    Progress { percent: f32, stage: String },
    Finished(Result<Song, ConvertError>),
}

struct ConversionJob {
    cancel_tx: mpsc::Sender<()>,
    updates_rx: mpsc::Receiver<ConvertMessage>,
    worker: Option<thread::JoinHandle<()>>,
}

/// The application core: owns the editor state, the playback engine and
/// every collaborator port. Commands come in, typed events go out.
pub struct EditorCore {
    clock: Arc<dyn ClockPort>,
    decoder: Arc<dyn AudioDecodePort>,
    inference: Arc<dyn PitchInferencePort>,
    sheet: Option<Box<dyn SheetRenderPort>>,
    storage: Option<Box<dyn StoragePort>>,
    settings: SettingsDto,
    state: EditorState,
    playback: PlaybackEngine,
    conversion: Option<ConversionJob>,
    events: VecDeque<Event>,
    last_transport_emit: f64,
}

impl EditorCore {
    pub fn new(
        clock: Arc<dyn ClockPort>,
        tone: Arc<dyn TonePort>,
        decoder: Arc<dyn AudioDecodePort>,
        inference: Arc<dyn PitchInferencePort>,
        sheet: Option<Box<dyn SheetRenderPort>>,
        storage: Option<Box<dyn StoragePort>>,
    ) -> Self {
        let settings = if let Some(storage) = storage.as_ref() {
            storage.load_settings().unwrap_or_default()
        } else {
            SettingsDto::default()
        };

        let mut state = EditorState::new();
        // Seed editor defaults from the saved settings, sanitized: stale
        // files must not wedge the grid or the view.
        if is_quantization_choice(settings.quantization) {
            state.reduce(EditAction::SetQuantization(settings.quantization));
        }
        state.reduce(EditAction::SetZoom(Zoom {
            x: settings.zoom_x.clamp(ZOOM_MIN, ZOOM_MAX),
            y: settings.zoom_y.clamp(ZOOM_MIN, ZOOM_MAX),
        }));

        let playback = PlaybackEngine::new(clock.clone(), tone);
        let last_transport_emit = clock.now_secs();

        Self {
            clock,
            decoder,
            inference,
            sheet,
            storage,
            settings,
            state,
            playback,
            conversion: None,
            events: VecDeque::new(),
            last_transport_emit,
        }
    }

    pub fn into_shared(self) -> SharedCore {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn settings(&self) -> &SettingsDto {
        &self.settings
    }

    pub fn playback_phase(&self) -> PlaybackPhase {
        self.playback.phase()
    }

    pub fn conversion_running(&self) -> bool {
        self.conversion.is_some()
    }

    pub fn handle_command(&mut self, cmd: Command) -> Result<(), AppError> {
        match cmd {
            Command::NewSong { name } => {
                self.load_song(Song::empty(name));
            }
            Command::LoadFile { path } => {
                self.load_file(Path::new(&path))?;
            }
            Command::Edit { action } => {
                self.apply_edit(action);
            }
            Command::Play { from_tick } => {
                if self.state.song.is_none() {
                    return Err(AppError::NoSong);
                }
                let from = from_tick.unwrap_or(self.state.position).max(0.0);
                self.playback.play_from(from);
                self.state.reduce(EditAction::SetPosition(from));
                self.state.reduce(EditAction::SetPlaying(true));
                self.emit_transport(true);
            }
            Command::Pause => {
                self.playback.pause();
                self.state.reduce(EditAction::SetPlaying(false));
                self.emit_transport(true);
            }
            Command::Stop => {
                self.playback.stop();
                self.state.reduce(EditAction::SetPlaying(false));
                self.state.reduce(EditAction::SetPosition(0.0));
                self.emit_transport(true);
            }
            Command::Seek { tick } => {
                self.playback.seek(tick.max(0.0));
                self.state
                    .reduce(EditAction::SetPosition(self.playback.position()));
                self.state
                    .reduce(EditAction::SetPlaying(self.playback.is_playing()));
                self.emit_transport(true);
            }
            Command::PreviewPitch { pitch } => {
                self.playback.preview(pitch);
            }
            Command::ExportMidi { path } => {
                let song = self.require_song()?;
                export_midi_path(song, Path::new(&path))
                    .map_err(|e| AppError::Export(e.to_string()))?;
                self.emit_exported("midi", &path);
            }
            Command::ExportMusicXml { path } => {
                let song = self.require_song()?;
                let xml = export_musicxml(song);
                std::fs::write(Path::new(&path), xml)
                    .map_err(|e| AppError::Export(e.to_string()))?;
                self.emit_exported("musicxml", &path);
            }
            Command::ExportPdf { path } => {
                let song = self.require_song()?;
                let xml = export_musicxml(song);
                let Some(sheet) = self.sheet.as_ref() else {
                    return Err(AppError::Export("no sheet renderer configured".into()));
                };
                let pdf = sheet.render_pdf(&xml)?;
                std::fs::write(Path::new(&path), pdf)
                    .map_err(|e| AppError::Export(e.to_string()))?;
                self.emit_exported("pdf", &path);
            }
            Command::ConvertAudioFile { path } => {
                self.start_conversion(Path::new(&path))?;
            }
            Command::CancelConversion => {
                if let Some(job) = self.conversion.as_ref() {
                    let _ = job.cancel_tx.send(());
                }
            }
            Command::SetAudioOptions { options } => {
                options.clamped().store(&mut self.settings);
                self.emit_settings();
                self.save_settings();
            }
            Command::ExportDiagnostics { dir } => {
                write_snapshot(
                    Path::new(&dir),
                    &self.state,
                    self.playback.phase(),
                    &self.settings,
                )?;
            }
        }
        Ok(())
    }

    /// One cooperative poll: advances playback, pumps the conversion
    /// worker, and emits the throttled transport readout.
    pub fn tick(&mut self) {
        self.advance_playback();
        self.pump_conversion();
        self.emit_transport(false);
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    fn require_song(&self) -> Result<&Song, AppError> {
        self.state.song.as_ref().ok_or(AppError::NoSong)
    }

    fn apply_edit(&mut self, action: EditAction) {
        // Boundary clamps: the reducer stays literal, the command surface
        // enforces the UI ranges.
        let action = match action {
            EditAction::Load(song) => {
                self.load_song(song);
                return;
            }
            EditAction::SetTempo(bpm) => EditAction::SetTempo(clamp_tempo(bpm)),
            EditAction::SetZoom(zoom) => EditAction::SetZoom(Zoom {
                x: zoom.x.clamp(ZOOM_MIN, ZOOM_MAX),
                y: zoom.y.clamp(ZOOM_MIN, ZOOM_MAX),
            }),
            other => other,
        };

        let touches_document = matches!(
            action,
            EditAction::AddNote { .. }
                | EditAction::UpdateNote { .. }
                | EditAction::DeleteNotes(_)
                | EditAction::SetTempo(_)
                | EditAction::ToggleTrackMute(_)
                | EditAction::ToggleTrackSolo(_)
                | EditAction::Undo
                | EditAction::Redo
                | EditAction::Reset
        );
        let touches_selection = matches!(
            action,
            EditAction::SelectNotes(_) | EditAction::ClearSelection | EditAction::DeleteNotes(_)
        );

        let mut persist = false;
        match &action {
            EditAction::SetQuantization(q) if is_quantization_choice(*q) => {
                self.settings.quantization = *q;
                persist = true;
            }
            EditAction::SetZoom(zoom) => {
                self.settings.zoom_x = zoom.x;
                self.settings.zoom_y = zoom.y;
                persist = true;
            }
            _ => {}
        }

        self.state.reduce(action);

        if touches_document {
            self.emit_document();
        }
        if touches_selection {
            self.emit_selection();
        }
        if persist {
            self.emit_settings();
            self.save_settings();
        }
    }

    fn load_song(&mut self, song: Song) {
        self.playback.stop();
        self.state.reduce(EditAction::Load(song));
        self.emit_document();
        self.emit_selection();
        self.emit_transport(true);
    }

    fn load_file(&mut self, path: &Path) -> Result<(), AppError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let song = match extension.as_str() {
            "mid" | "midi" => {
                import_midi_path(path).map_err(|e| AppError::FileLoad(e.to_string()))?
            }
            "xml" | "musicxml" | "mxl" => {
                import_musicxml_path(path).map_err(|e| AppError::FileLoad(e.to_string()))?
            }
            other => {
                return Err(AppError::FileLoad(format!(
                    "unsupported file type '{other}'; use .mid, .midi, .xml, .musicxml or .mxl"
                )))
            }
        };
        self.remember_open_dir(path);
        self.load_song(song);
        Ok(())
    }

    fn start_conversion(&mut self, path: &Path) -> Result<(), AppError> {
        if self.conversion.is_some() {
            return Err(AppError::ConversionBusy);
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_owned();
        let size = std::fs::metadata(path)
            .map_err(|e| AppError::FileLoad(e.to_string()))?
            .len();
        if let Some(warning) = validate_audio_upload(&file_name, size)? {
            self.events.push_back(Event::Diagnostics {
                severity: "warning".into(),
                message: warning,
            });
        }
        let bytes = std::fs::read(path).map_err(|e| AppError::FileLoad(e.to_string()))?;
        self.remember_open_dir(path);

        let options = AudioConvertOptions::from_settings(&self.settings).clamped();
        let decoder = self.decoder.clone();
        let inference = self.inference.clone();
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let (updates_tx, updates_rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            let progress_tx = updates_tx.clone();
            let result = convert_audio_to_song(
                decoder.as_ref(),
                inference.as_ref(),
                &bytes,
                &options,
                &cancel_rx,
                |percent, stage| {
                    let _ = progress_tx.send(ConvertMessage::Progress {
                        percent,
                        stage: stage.to_owned(),
                    });
                },
            );
            let _ = updates_tx.send(ConvertMessage::Finished(result));
        });

        self.conversion = Some(ConversionJob {
            cancel_tx,
            updates_rx,
            worker: Some(worker),
        });
        Ok(())
    }

    fn advance_playback(&mut self) {
        if !self.playback.is_playing() {
            return;
        }
        let Some(song) = self.state.song.as_ref() else {
            return;
        };
        let snapshot = self.playback.tick(song);
        self.state.reduce(EditAction::SetPosition(snapshot.position));
        if snapshot.finished {
            self.state.reduce(EditAction::SetPlaying(false));
            self.emit_transport(true);
        }
    }

    fn pump_conversion(&mut self) {
        let Some(job) = self.conversion.as_mut() else {
            return;
        };
        let mut finished = None;
        loop {
            match job.updates_rx.try_recv() {
                Ok(ConvertMessage::Progress { percent, stage }) => {
                    self.events
                        .push_back(Event::ConversionProgress { percent, stage });
                }
                Ok(ConvertMessage::Finished(result)) => {
                    finished = Some(result);
                    break;
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    finished = Some(Err(ConvertError::Inference(
                        "conversion worker stopped unexpectedly".into(),
                    )));
                    break;
                }
            }
        }
        let Some(result) = finished else {
            return;
        };
        if let Some(job) = self.conversion.take() {
            if let Some(worker) = job.worker {
                let _ = worker.join();
            }
        }
        match result {
            Ok(song) => {
                self.load_song(song);
                self.events.push_back(Event::ConversionFinished {
                    ok: true,
                    message: "conversion complete".into(),
                });
            }
            Err(e) => {
                self.events.push_back(Event::ConversionFinished {
                    ok: false,
                    message: e.to_string(),
                });
            }
        }
    }

    fn remember_open_dir(&mut self, path: &Path) {
        if let Some(dir) = path.parent().and_then(|p| p.to_str()) {
            self.settings.last_open_dir = Some(dir.to_owned());
            self.save_settings();
        }
    }

    fn emit_document(&mut self) {
        self.events.push_back(Event::DocumentChanged {
            song: self.state.song.clone(),
            can_undo: self.state.can_undo(),
            can_redo: self.state.can_redo(),
        });
    }

    fn emit_selection(&mut self) {
        self.events.push_back(Event::SelectionChanged {
            selected: self.state.selected.clone(),
        });
    }

    fn emit_settings(&mut self) {
        self.events.push_back(Event::SettingsUpdated {
            settings: self.settings.clone(),
        });
    }

    fn emit_transport(&mut self, force: bool) {
        let now = self.clock.now_secs();
        if !force && now - self.last_transport_emit < TRANSPORT_EMIT_INTERVAL_SECS {
            return;
        }
        self.events.push_back(Event::TransportUpdated {
            position: self.state.position,
            playing: self.state.is_playing,
        });
        self.last_transport_emit = now;
    }

    fn emit_exported(&mut self, kind: &str, path: &str) {
        self.events.push_back(Event::Exported {
            kind: kind.to_owned(),
            path: path.to_owned(),
        });
    }

    fn save_settings(&self) {
        if let Some(storage) = self.storage.as_ref() {
            let _ = storage.save_settings(&self.settings);
        }
    }
}
