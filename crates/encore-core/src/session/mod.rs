//! Practice session wiring
//!
//! A [`PracticeSession`] owns the playback engine, A-B loop, pitch analysis,
//! metronome and scheduler for one track at a time. The caller drives it by
//! calling [`advance`](PracticeSession::advance) with a monotonic clock; due
//! ticks are routed to the engines and their outputs go out as
//! [`SessionEvent`]s on a bounded channel.

mod song;

pub use song::SongMetadata;

use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::ab_loop::{ABLoopController, LoopAction, LoopMode, LoopRegion};
use crate::config::EngineConfig;
use crate::error::{SessionError, SessionResult};
use crate::lyrics::{resolve, LyricHighlight, LyricsData};
use crate::metronome::{Beat, MetronomeEngine, MetronomeState};
use crate::pitch::{Microphone, PitchAnalysisEngine, PitchAnalysisResult};
use crate::playback::{BackendFactory, BackendKind, PlaybackEngine, PlaybackSession, PlaybackStatus};
use crate::scheduler::{Scheduler, TimerId};
use crate::sections::{KeyValueStore, SavedSection, SavedSectionRepository};

/// Pending events before new ones are dropped
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Output of a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PlaybackStatus(PlaybackStatus),
    /// Active lyric changed; `None` between groups
    LyricHighlight(Option<LyricHighlight>),
    AnalysisResult(PitchAnalysisResult),
    AnalysisStateChanged(bool),
    SavedSectionsChanged(Vec<SavedSection>),
    Beat(Beat),
    /// Playback jumped from B back to A
    LoopSeek { from: f64, to: f64 },
    /// Playback reached the end of the track
    TrackEnded,
}

fn publish(events: &Sender<SessionEvent>, event: SessionEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            log::debug!("Session event channel full, dropping {:?}", event);
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Identity of the highlight state, compared to suppress repeats
type HighlightKey = (usize, Option<usize>, Option<usize>);

pub struct PracticeSession {
    config: EngineConfig,
    factory: Box<dyn BackendFactory>,
    playback: PlaybackEngine,
    ab_loop: ABLoopController,
    analysis: PitchAnalysisEngine,
    metronome: MetronomeEngine,
    scheduler: Scheduler,
    sections: SavedSectionRepository,
    song: Option<SongMetadata>,
    lyrics: LyricsData,
    events: Sender<SessionEvent>,
    pitch: f64,
    duration_known: bool,
    last_wraps: u64,
    last_highlight: Option<HighlightKey>,
    play_requested: bool,
}

impl PracticeSession {
    /// Create an idle session and the receiving end of its event channel
    pub fn new(
        config: EngineConfig,
        factory: Box<dyn BackendFactory>,
        microphone: Box<dyn Microphone>,
        store: Box<dyn KeyValueStore>,
    ) -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let session = Self {
            ab_loop: ABLoopController::new(
                config.playback.loop_cooldown(),
                config.playback.auto_loop_full_track,
            ),
            analysis: PitchAnalysisEngine::new(&config.analysis, microphone),
            metronome: MetronomeEngine::new(
                config.metronome.default_bpm,
                config.metronome.time_signature,
            ),
            sections: SavedSectionRepository::with_key(store, config.storage.sections_key.clone()),
            playback: PlaybackEngine::new(),
            scheduler: Scheduler::new(),
            song: None,
            lyrics: LyricsData::default(),
            events: tx,
            pitch: 0.0,
            duration_known: false,
            last_wraps: 0,
            last_highlight: None,
            play_requested: false,
            factory,
            config,
        };
        (session, rx)
    }

    /// Switch to a new track
    ///
    /// Clears timers, loop and analysis state, then loads `song` on a fresh
    /// playback engine.
    pub fn load_track(
        &mut self,
        song: SongMetadata,
        lyrics: LyricsData,
        now: Duration,
    ) -> SessionResult<BackendKind> {
        self.reset_for_track();

        let mut playback =
            PlaybackEngine::new().with_prefer_native(self.config.playback.prefer_native);
        playback.initialize(self.factory.as_ref())?;
        playback.set_pitch(self.pitch)?;
        self.playback = playback;

        self.metronome
            .set_bpm(self.config.metronome.initial_bpm(song.estimated_bpm));
        self.lyrics = lyrics;
        let url = song.mr_url.clone();
        self.song = Some(song);

        let kind = self.playback.load(&url)?;
        self.on_loaded(kind, now);
        Ok(kind)
    }

    /// Retry a failed [`load_track`](Self::load_track)
    pub fn retry_load(&mut self, now: Duration) -> SessionResult<BackendKind> {
        let kind = self.playback.retry()?;
        self.on_loaded(kind, now);
        Ok(kind)
    }

    fn reset_for_track(&mut self) {
        self.scheduler.cancel_all();
        self.stop_analysis();
        self.ab_loop.reset_track();
        self.ab_loop.set_mode(LoopMode::Software);
        self.metronome.stop();
        self.metronome.reset();
        // Drop the old engine (and its device streams) before creating the next
        self.playback = PlaybackEngine::new();
        self.song = None;
        self.lyrics = LyricsData::default();
        self.duration_known = false;
        self.last_wraps = 0;
        self.last_highlight = None;
        self.play_requested = false;
    }

    fn on_loaded(&mut self, kind: BackendKind, now: Duration) {
        let mode = if kind.supports_native_loop() {
            LoopMode::Native
        } else {
            LoopMode::Software
        };
        self.ab_loop.set_mode(mode);
        if let Some(duration) = self.playback.duration() {
            self.ab_loop.set_duration(duration);
        }
        self.last_wraps = self.playback.loop_wrap_count();
        self.scheduler.start(
            TimerId::PositionPoll,
            self.config.playback.poll_interval(),
            now,
        );
        if self.config.metronome.enabled {
            self.set_metronome_enabled(true, now);
        }
        publish(&self.events, SessionEvent::PlaybackStatus(self.playback.status()));
    }

    /// Route every tick due at `now`
    pub fn advance(&mut self, now: Duration) -> SessionResult<()> {
        for tick in self.scheduler.due(now) {
            match tick.timer {
                TimerId::PositionPoll => self.on_position_tick(now)?,
                TimerId::PitchSample => self.on_pitch_tick(now),
                TimerId::MetronomeBeat => self.on_beat_tick(),
            }
        }
        Ok(())
    }

    /// Earliest time [`advance`](Self::advance) has work to do
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    fn on_position_tick(&mut self, now: Duration) -> SessionResult<()> {
        if let Some(duration) = self.playback.duration() {
            if !self.duration_known {
                self.duration_known = true;
                if self.ab_loop.on_duration_known(duration) {
                    self.sync_loop_bounds()?;
                }
            }

            let wraps = self.playback.loop_wrap_count();
            if wraps > self.last_wraps {
                self.last_wraps = wraps;
                if let Some((a, b)) = self.ab_loop.region().bounds() {
                    publish(&self.events, SessionEvent::LoopSeek { from: b, to: a });
                }
                self.restart_metronome(now);
            }

            let position = self.playback.position();
            let action = self
                .ab_loop
                .tick(now, position, duration, self.playback.is_playing());
            if let Some(LoopAction::SeekTo(target)) = action {
                let result = self.playback.seek(target);
                self.ab_loop.seek_completed(now);
                let applied = result?;
                publish(
                    &self.events,
                    SessionEvent::LoopSeek {
                        from: position,
                        to: applied,
                    },
                );
                self.restart_metronome(now);
            }
        }

        publish(&self.events, SessionEvent::PlaybackStatus(self.playback.status()));
        self.publish_highlight();

        if self.play_requested && !self.playback.is_playing() {
            self.play_requested = false;
            log::info!("Track ended at {:.2}s", self.playback.position());
            publish(&self.events, SessionEvent::TrackEnded);
        }
        Ok(())
    }

    fn publish_highlight(&mut self) {
        let highlight = resolve(self.playback.position(), &self.lyrics.syllable_groups);
        let key = highlight
            .as_ref()
            .map(|h| (h.group_index, h.syllable_index, h.active_char_index));
        if key != self.last_highlight {
            self.last_highlight = key;
            publish(&self.events, SessionEvent::LyricHighlight(highlight));
        }
    }

    fn on_pitch_tick(&mut self, now: Duration) {
        let position = self.playback.position();
        if let Err(e) = self.analysis.sample(position, now) {
            log::warn!("Stopping pitch analysis: {}", e);
            self.scheduler.cancel(TimerId::PitchSample);
            publish(&self.events, SessionEvent::AnalysisStateChanged(false));
        }
    }

    fn on_beat_tick(&mut self) {
        if let Some(beat) = self.metronome.on_beat() {
            publish(&self.events, SessionEvent::Beat(beat));
        }
    }

    /// Realign the metronome to the loop's downbeat
    fn restart_metronome(&mut self, now: Duration) {
        self.metronome.reset();
        if self.metronome.is_running() {
            self.scheduler
                .start(TimerId::MetronomeBeat, self.metronome.interval(), now);
        }
    }

    pub fn play(&mut self) -> SessionResult<()> {
        self.playback.play()?;
        self.play_requested = true;
        publish(&self.events, SessionEvent::PlaybackStatus(self.playback.status()));
        Ok(())
    }

    pub fn pause(&mut self) -> SessionResult<()> {
        self.playback.pause()?;
        self.play_requested = false;
        publish(&self.events, SessionEvent::PlaybackStatus(self.playback.status()));
        Ok(())
    }

    /// Seek (clamped to the track); returns the applied position
    pub fn seek(&mut self, position: f64) -> SessionResult<f64> {
        let applied = self.playback.seek(position)?;
        publish(&self.events, SessionEvent::PlaybackStatus(self.playback.status()));
        Ok(applied)
    }

    /// Transpose; returns the clamped value
    ///
    /// Kept across track switches. Has no audible effect on the fallback
    /// backend, see [`supports_pitch_shift`](Self::supports_pitch_shift).
    pub fn set_pitch(&mut self, semitones: f64) -> SessionResult<f64> {
        self.pitch = self.playback.set_pitch(semitones)?;
        Ok(self.pitch)
    }

    pub fn supports_pitch_shift(&self) -> bool {
        self.playback.supports_pitch_shift()
    }

    pub fn set_point_a(&mut self, t: f64) -> SessionResult<()> {
        self.ab_loop.set_point_a(t)?;
        self.sync_loop_bounds()
    }

    pub fn set_point_b(&mut self, t: f64) -> SessionResult<()> {
        self.ab_loop.set_point_b(t)?;
        self.sync_loop_bounds()
    }

    pub fn clear_loop(&mut self) -> SessionResult<()> {
        self.ab_loop.clear_loop();
        self.sync_loop_bounds()
    }

    pub fn region(&self) -> LoopRegion {
        self.ab_loop.region()
    }

    /// Hand the loop region to a native backend
    ///
    /// Falls back to software looping if the backend declines.
    fn sync_loop_bounds(&mut self) -> SessionResult<()> {
        if self.ab_loop.mode() != LoopMode::Native || self.playback.backend_kind().is_none() {
            return Ok(());
        }
        let bounds = self.ab_loop.native_bounds();
        if !self.playback.set_loop_bounds(bounds)? {
            log::info!("Backend declined loop bounds, using software loop");
            self.ab_loop.set_mode(LoopMode::Software);
        }
        Ok(())
    }

    pub fn saved_sections(&self) -> SessionResult<Vec<SavedSection>> {
        Ok(self.sections.list()?)
    }

    /// Save the current region under `name`
    pub fn save_section(&mut self, name: &str) -> SessionResult<SavedSection> {
        let (a, b) = self
            .ab_loop
            .region()
            .bounds()
            .ok_or(SessionError::NoLoopRegion)?;
        let section = SavedSection::new(name, a, b)?;
        let sections = self.sections.save(section.clone())?;
        publish(&self.events, SessionEvent::SavedSectionsChanged(sections));
        Ok(section)
    }

    pub fn remove_section(&mut self, id: &str) -> SessionResult<()> {
        let sections = self.sections.remove(id)?;
        publish(&self.events, SessionEvent::SavedSectionsChanged(sections));
        Ok(())
    }

    /// Restore a saved section as the loop region
    pub fn apply_section(&mut self, id: &str) -> SessionResult<()> {
        let section = self
            .sections
            .find(id)?
            .ok_or_else(|| SessionError::SectionNotFound(id.to_string()))?;
        self.ab_loop.set_region(section.point_a, section.point_b)?;
        log::info!(
            "Applied section '{}' ({:.2}s - {:.2}s)",
            section.name,
            section.point_a,
            section.point_b
        );
        self.sync_loop_bounds()
    }

    /// Start or stop the metronome; a start begins on the downbeat
    pub fn set_metronome_enabled(&mut self, enabled: bool, now: Duration) {
        if enabled == self.metronome.is_running() {
            return;
        }
        if enabled {
            self.metronome.start();
            self.scheduler
                .start(TimerId::MetronomeBeat, self.metronome.interval(), now);
        } else {
            self.metronome.stop();
            self.scheduler.cancel(TimerId::MetronomeBeat);
        }
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.metronome.set_bpm(bpm);
        self.scheduler
            .set_period(TimerId::MetronomeBeat, self.metronome.interval());
    }

    pub fn metronome_state(&self) -> MetronomeState {
        self.metronome.state()
    }

    /// Begin scoring the microphone against the current lyrics
    pub fn start_analysis(&mut self, now: Duration) -> SessionResult<()> {
        if self.song.is_none() {
            return Err(SessionError::NoTrack);
        }
        let events = self.events.clone();
        self.analysis.start_analysis(&self.lyrics, move |result| {
            publish(&events, SessionEvent::AnalysisResult(result));
        })?;
        self.scheduler.start(
            TimerId::PitchSample,
            self.config.analysis.sample_interval(),
            now,
        );
        publish(&self.events, SessionEvent::AnalysisStateChanged(true));
        Ok(())
    }

    /// Stop scoring and release the microphone; no-op when not running
    pub fn stop_analysis(&mut self) {
        self.scheduler.cancel(TimerId::PitchSample);
        if self.analysis.is_active() {
            self.analysis.stop_analysis();
            publish(&self.events, SessionEvent::AnalysisStateChanged(false));
        }
    }

    pub fn is_analyzing(&self) -> bool {
        self.analysis.is_active()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.playback.status()
    }

    pub fn playback_session(&self) -> Option<PlaybackSession> {
        self.playback.session(self.ab_loop.is_jumping())
    }

    pub fn song(&self) -> Option<&SongMetadata> {
        self.song.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::lyrics::{Syllable, SyllableGroup};
    use crate::music::{NotePitch, Step};
    use crate::pitch::fake::{FakeMicState, FakeMicrophone};
    use crate::pitch::AnalysisError;
    use crate::playback::mock::{MockFactory, MockState};
    use crate::sections::MemoryStore;

    struct Harness {
        session: PracticeSession,
        events: Receiver<SessionEvent>,
        native: Rc<RefCell<MockState>>,
        fallback: Rc<RefCell<MockState>>,
        mic: Rc<RefCell<FakeMicState>>,
    }

    impl Harness {
        fn drain(&self) -> Vec<SessionEvent> {
            self.events.try_iter().collect()
        }

        fn loop_seeks(&self) -> Vec<(f64, f64)> {
            self.drain()
                .into_iter()
                .filter_map(|e| match e {
                    SessionEvent::LoopSeek { from, to } => Some((from, to)),
                    _ => None,
                })
                .collect()
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn song(id: &str) -> SongMetadata {
        SongMetadata {
            id: id.to_string(),
            mr_url: format!("file:///songs/{id}.wav"),
            title: format!("Song {id}"),
            estimated_bpm: Some(120.0),
        }
    }

    fn lyrics() -> LyricsData {
        LyricsData {
            title: "Song".to_string(),
            lyrics: vec!["la".to_string()],
            syllable_groups: vec![SyllableGroup {
                start_time: 1.0,
                end_time: 2.0,
                full_text: "la".to_string(),
                syllables: vec![Syllable {
                    text: "la".to_string(),
                    start_time: 1.0,
                    end_time: 2.0,
                    pitch: Some(NotePitch::new(Step::A, 0, 4)),
                }],
            }],
        }
    }

    fn harness_with(factory: MockFactory, granted: bool) -> Harness {
        let native = factory.native.clone();
        let fallback = factory.fallback.clone();
        let (mic, mic_state) = FakeMicrophone::new(granted);
        let (session, events) = PracticeSession::new(
            EngineConfig::default(),
            Box::new(factory),
            Box::new(mic),
            Box::new(MemoryStore::new()),
        );
        Harness {
            session,
            events,
            native,
            fallback,
            mic: mic_state,
        }
    }

    fn fallback_only() -> Harness {
        let mut factory = MockFactory::new();
        factory.native_available = false;
        harness_with(factory, true)
    }

    #[test]
    fn test_software_loop_seeks_once_per_pass() {
        let mut h = fallback_only();
        assert_eq!(h.session.load_track(song("a"), lyrics(), ms(0)).unwrap(), BackendKind::Fallback);
        h.session.advance(ms(0)).unwrap();
        h.session.set_point_a(10.0).unwrap();
        h.session.set_point_b(20.0).unwrap();
        h.session.play().unwrap();
        h.drain();

        let mut now = 100;
        for position in [9.0, 10.0, 15.0, 19.9, 20.0, 20.1] {
            h.fallback.borrow_mut().position = position;
            h.session.advance(ms(now)).unwrap();
            now += 100;
        }

        assert_eq!(h.fallback.borrow().seeks, vec![10.0]);
        assert_eq!(h.loop_seeks(), vec![(20.0, 10.0)]);
    }

    #[test]
    fn test_loop_cooldown_blocks_retrigger() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.set_point_a(10.0).unwrap();
        h.session.set_point_b(20.0).unwrap();
        h.session.play().unwrap();

        h.fallback.borrow_mut().position = 20.05;
        h.session.advance(ms(0)).unwrap();
        assert!(h.session.playback_session().unwrap().is_jumping);

        // Still past B inside the cooldown window
        h.fallback.borrow_mut().position = 20.2;
        h.session.advance(ms(100)).unwrap();
        assert_eq!(h.fallback.borrow().seeks.len(), 1);

        h.session.advance(ms(600)).unwrap();
        assert_eq!(h.fallback.borrow().seeks.len(), 2);
    }

    #[test]
    fn test_native_backend_wraps_internally() {
        let mut h = harness_with(MockFactory::new(), true);
        assert_eq!(h.session.load_track(song("a"), lyrics(), ms(0)).unwrap(), BackendKind::Native);
        h.session.set_point_a(10.0).unwrap();
        h.session.set_point_b(20.0).unwrap();
        assert_eq!(h.native.borrow().loop_bounds, Some((10.0, 20.0)));

        h.session.play().unwrap();
        h.session.set_metronome_enabled(true, ms(0));
        h.session.advance(ms(0)).unwrap();
        h.session.advance(ms(500)).unwrap();
        assert_eq!(h.session.metronome_state().current_beat, 2);

        // Past B: the backend handles it, no seek is issued
        h.native.borrow_mut().position = 20.1;
        h.session.advance(ms(600)).unwrap();
        assert!(h.native.borrow().seeks.is_empty());

        h.native.borrow_mut().wraps = 1;
        h.native.borrow_mut().position = 10.05;
        h.drain();
        h.session.advance(ms(700)).unwrap();
        assert_eq!(h.loop_seeks(), vec![(20.0, 10.0)]);
        assert_eq!(h.session.metronome_state().current_beat, 0);

        // Metronome timer restarted on the wrap: downbeat on the next advance
        h.session.advance(ms(701)).unwrap();
        assert_eq!(h.session.metronome_state().current_beat, 1);
    }

    #[test]
    fn test_software_loop_resets_metronome() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.set_point_a(10.0).unwrap();
        h.session.set_point_b(20.0).unwrap();
        h.session.play().unwrap();
        h.session.set_metronome_enabled(true, ms(0));
        h.session.advance(ms(0)).unwrap();
        h.session.advance(ms(500)).unwrap();
        h.session.advance(ms(1000)).unwrap();
        assert_eq!(h.session.metronome_state().current_beat, 3);

        h.fallback.borrow_mut().position = 20.0;
        h.session.advance(ms(1100)).unwrap();
        assert_eq!(h.session.metronome_state().current_beat, 0);
        h.session.advance(ms(1100)).unwrap();
        assert_eq!(h.session.metronome_state().current_beat, 1);
    }

    #[test]
    fn test_auto_point_b_on_first_poll() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.set_point_a(5.0).unwrap();
        assert!(!h.session.region().enabled);

        h.session.advance(ms(0)).unwrap();
        let region = h.session.region();
        assert_eq!(region.point_b, Some(30.0));
        assert!(region.has_auto_set_b);
        assert!(region.enabled);
    }

    #[test]
    fn test_invalid_point_keeps_region() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.set_point_a(5.0).unwrap();
        let before = h.session.region();
        assert!(matches!(
            h.session.set_point_b(3.0),
            Err(SessionError::Loop(_))
        ));
        assert_eq!(h.session.region(), before);
    }

    #[test]
    fn test_points_past_track_end_rejected() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        // Before the first poll the loaded duration already bounds the points
        assert!(matches!(
            h.session.set_point_b(1e6),
            Err(SessionError::Loop(_))
        ));

        h.session.advance(ms(0)).unwrap();
        h.session.set_point_a(10.0).unwrap();
        h.session.clear_loop().unwrap();
        assert!(matches!(
            h.session.set_point_b(1e6),
            Err(SessionError::Loop(_))
        ));
        assert_eq!(h.session.region().point_b, None);
        h.session.set_point_b(25.0).unwrap();
    }

    #[test]
    fn test_track_switch_clears_loop_and_analysis() {
        let mut h = harness_with(MockFactory::new(), true);
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.set_point_a(10.0).unwrap();
        h.session.set_point_b(20.0).unwrap();
        h.session.start_analysis(ms(0)).unwrap();
        assert!(h.session.region().enabled);

        h.session.load_track(song("b"), lyrics(), ms(1000)).unwrap();
        let region = h.session.region();
        assert_eq!(region.point_a, None);
        assert_eq!(region.point_b, None);
        assert!(!region.enabled);
        assert!(!h.session.is_analyzing());
        assert_eq!(h.mic.borrow().releases, 1);
        assert!(h.native.borrow().unloads >= 1);
        assert_eq!(h.native.borrow().loads, vec!["file:///songs/a.wav", "file:///songs/b.wav"]);
        assert!(h
            .drain()
            .contains(&SessionEvent::AnalysisStateChanged(false)));
    }

    #[test]
    fn test_save_and_apply_section() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        assert!(matches!(
            h.session.save_section("none"),
            Err(SessionError::NoLoopRegion)
        ));

        h.session.set_point_a(10.0).unwrap();
        h.session.set_point_b(20.0).unwrap();
        let saved = h.session.save_section("Chorus").unwrap();
        assert!(h.drain().iter().any(|e| matches!(
            e,
            SessionEvent::SavedSectionsChanged(list) if list.len() == 1
        )));

        h.session.clear_loop().unwrap();
        assert!(!h.session.region().enabled);
        h.session.apply_section(&saved.id).unwrap();
        assert_eq!(h.session.region().bounds(), Some((10.0, 20.0)));

        assert!(matches!(
            h.session.apply_section("missing"),
            Err(SessionError::SectionNotFound(_))
        ));
        h.session.remove_section(&saved.id).unwrap();
        assert!(h.session.saved_sections().unwrap().is_empty());
    }

    #[test]
    fn test_analysis_results_follow_position() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.play().unwrap();
        h.session.start_analysis(ms(0)).unwrap();
        h.fallback.borrow_mut().position = 1.5;
        h.mic.borrow_mut().script.push_back(Ok(Some((440.0, 0.9))));

        h.session.advance(ms(0)).unwrap();

        let events = h.drain();
        assert!(events.contains(&SessionEvent::AnalysisStateChanged(true)));
        let result = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::AnalysisResult(r) => Some(r.clone()),
                _ => None,
            })
            .unwrap();
        assert!(result.is_on_pitch);
        assert_eq!(result.lyric_text, "la");
    }

    #[test]
    fn test_capture_error_stops_analysis() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.start_analysis(ms(0)).unwrap();
        h.mic.borrow_mut().script.push_back(Err("unplugged".to_string()));
        h.drain();

        h.session.advance(ms(0)).unwrap();
        assert!(!h.session.is_analyzing());
        let events = h.drain();
        assert!(events.contains(&SessionEvent::AnalysisStateChanged(false)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::AnalysisResult(_))));

        h.session.stop_analysis();
        assert_eq!(h.mic.borrow().releases, 1);
    }

    #[test]
    fn test_permission_denied_surfaces() {
        let mut factory = MockFactory::new();
        factory.native_available = false;
        let mut h = harness_with(factory, false);
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        assert!(matches!(
            h.session.start_analysis(ms(0)),
            Err(SessionError::Analysis(AnalysisError::PermissionDenied))
        ));
        assert!(!h.session.is_analyzing());
    }

    #[test]
    fn test_pitch_only_applies_on_native() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        assert!(!h.session.supports_pitch_shift());
        assert_eq!(h.session.set_pitch(20.0).unwrap(), 12.0);
        assert_eq!(h.fallback.borrow().pitch, 0.0);

        let mut n = harness_with(MockFactory::new(), true);
        n.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        assert!(n.session.supports_pitch_shift());
        n.session.set_pitch(-3.0).unwrap();
        assert_eq!(n.native.borrow().pitch, -3.0);

        // Kept across a track switch
        n.native.borrow_mut().pitch = 0.0;
        n.session.load_track(song("b"), lyrics(), ms(0)).unwrap();
        assert_eq!(n.native.borrow().pitch, -3.0);
    }

    #[test]
    fn test_lyric_highlight_emitted_on_change() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.drain();

        h.session.advance(ms(0)).unwrap();
        // Position 0 is before the first group; no change from the initial state
        assert!(!h
            .drain()
            .iter()
            .any(|e| matches!(e, SessionEvent::LyricHighlight(_))));

        h.fallback.borrow_mut().position = 1.2;
        h.session.advance(ms(100)).unwrap();
        let highlights: Vec<_> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::LyricHighlight(hl) => Some(hl),
                _ => None,
            })
            .collect();
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].as_ref().map(|hl| hl.group_index), Some(0));

        h.session.advance(ms(200)).unwrap();
        assert!(!h
            .drain()
            .iter()
            .any(|e| matches!(e, SessionEvent::LyricHighlight(_))));
    }

    #[test]
    fn test_track_end_reported_once() {
        let mut h = fallback_only();
        h.session.load_track(song("a"), lyrics(), ms(0)).unwrap();
        h.session.play().unwrap();
        h.fallback.borrow_mut().playing = false;

        h.session.advance(ms(0)).unwrap();
        h.session.advance(ms(100)).unwrap();
        let ended = h
            .drain()
            .into_iter()
            .filter(|e| *e == SessionEvent::TrackEnded)
            .count();
        assert_eq!(ended, 1);
    }

    #[test]
    fn test_load_failure_can_be_retried() {
        let mut factory = MockFactory::new();
        factory.fail_native_load("file:///songs/a.wav");
        factory.fail_fallback_load("file:///songs/a.wav");
        let mut h = harness_with(factory, true);

        assert!(matches!(
            h.session.load_track(song("a"), lyrics(), ms(0)),
            Err(SessionError::Playback(_))
        ));
        assert!(h.session.status() == PlaybackStatus::default());

        assert!(h.session.retry_load(ms(0)).is_err());
        assert!(h.session.play().is_err());
    }

    #[test]
    fn test_metronome_uses_song_bpm() {
        let mut h = fallback_only();
        let mut slow = song("a");
        slow.estimated_bpm = Some(60.0);
        h.session.load_track(slow, lyrics(), ms(0)).unwrap();
        h.session.set_metronome_enabled(true, ms(0));
        h.session.advance(ms(0)).unwrap();
        h.session.advance(ms(500)).unwrap();
        h.session.advance(ms(1000)).unwrap();

        let beats: Vec<Beat> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Beat(b) => Some(b),
                _ => None,
            })
            .collect();
        assert_eq!(beats.len(), 2);
        assert!(beats[0].is_downbeat);
        assert_eq!(beats[1].beat_in_bar, 2);
    }
}
