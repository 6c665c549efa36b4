//! Live pitch analysis against the lyric timeline

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AnalysisError;
use super::microphone::{Microphone, MicrophoneLease, PitchSample};
use super::scoring::{score, FeedbackTier, PitchDirection, ScoringRules};
use crate::config::AnalysisConfig;
use crate::lyrics::{active_group, active_syllable, LyricsData, SyllableGroup};
use crate::music::{nearest_note_name, note_name, A4_FREQUENCY};

/// One scored microphone sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchAnalysisResult {
    /// Detected frequency in Hz
    pub current_pitch: f64,
    /// Target frequency in Hz, `None` for unpitched syllables
    pub target_pitch: Option<f64>,
    pub cents_difference: f64,
    pub accuracy: f64,
    pub is_on_pitch: bool,
    pub lyric_text: String,
    pub tier: Option<FeedbackTier>,
    pub direction: Option<PitchDirection>,
    pub detected_note: Option<String>,
    pub target_note: Option<String>,
    pub confidence: f64,
}

type ResultCallback = Box<dyn FnMut(PitchAnalysisResult)>;

/// Samples the microphone and scores it against the active syllable
///
/// The engine does not own a timer: the session calls [`sample`] on each
/// pitch-sample tick while analysis is active.
///
/// [`sample`]: Self::sample
pub struct PitchAnalysisEngine {
    min_confidence: f64,
    reference_a4: f64,
    rules: ScoringRules,
    /// Microphone while no lease is held
    idle: Option<Box<dyn Microphone>>,
    lease: Option<MicrophoneLease>,
    groups: Vec<SyllableGroup>,
    on_result: Option<ResultCallback>,
}

impl PitchAnalysisEngine {
    pub fn new(config: &AnalysisConfig, microphone: Box<dyn Microphone>) -> Self {
        Self {
            min_confidence: config.min_confidence,
            reference_a4: config.reference_a4,
            rules: config.scoring_rules(),
            idle: Some(microphone),
            lease: None,
            groups: Vec::new(),
            on_result: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lease.is_some()
    }

    /// Acquire the microphone and begin scoring against `lyrics`
    pub fn start_analysis(
        &mut self,
        lyrics: &LyricsData,
        on_result: impl FnMut(PitchAnalysisResult) + 'static,
    ) -> Result<(), AnalysisError> {
        if self.lease.is_some() {
            return Err(AnalysisError::AlreadyRunning);
        }
        let Some(microphone) = self.idle.take() else {
            return Err(AnalysisError::AnalysisInterrupted(
                "microphone unavailable".to_string(),
            ));
        };

        match MicrophoneLease::acquire(microphone) {
            Ok(lease) => {
                self.lease = Some(lease);
                self.groups = lyrics.syllable_groups.clone();
                self.on_result = Some(Box::new(on_result));
                log::info!("Pitch analysis started ({} groups)", self.groups.len());
                Ok(())
            }
            Err((microphone, e)) => {
                self.idle = Some(microphone);
                log::warn!("Pitch analysis not started: {}", e);
                Err(e)
            }
        }
    }

    /// Release the microphone; no-op when not running
    pub fn stop_analysis(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        self.idle = lease.release();
        self.on_result = None;
        self.groups.clear();
        log::info!("Pitch analysis stopped");
    }

    /// Capture and score one sample at playback `position`
    ///
    /// A capture error stops analysis and returns `AnalysisInterrupted`.
    pub fn sample(&mut self, position: f64, now: Duration) -> Result<(), AnalysisError> {
        let Some(lease) = self.lease.as_mut() else {
            return Ok(());
        };

        let sample = match lease.capture(now) {
            Ok(Some(sample)) => sample,
            Ok(None) => return Ok(()),
            Err(e) => {
                log::warn!("Pitch analysis interrupted: {}", e);
                self.stop_analysis();
                let reason = match e {
                    AnalysisError::AnalysisInterrupted(reason) => reason,
                    other => other.to_string(),
                };
                return Err(AnalysisError::AnalysisInterrupted(reason));
            }
        };

        if sample.confidence < self.min_confidence {
            log::debug!(
                "Discarding pitch sample {:.1} Hz (confidence {:.2})",
                sample.frequency,
                sample.confidence
            );
            return Ok(());
        }

        if let Some(result) = self.evaluate(&sample, position) {
            if let Some(on_result) = self.on_result.as_mut() {
                on_result(result);
            }
        }
        Ok(())
    }

    /// Score `sample` against the syllable active at `position`
    fn evaluate(&self, sample: &PitchSample, position: f64) -> Option<PitchAnalysisResult> {
        let group = &self.groups[active_group(position, &self.groups)?];
        let syllable = &group.syllables[active_syllable(position, group)?];
        let detected_note = nearest_note_name(sample.frequency * A4_FREQUENCY / self.reference_a4);

        let Some(pitch) = syllable.pitch else {
            return Some(PitchAnalysisResult {
                current_pitch: sample.frequency,
                target_pitch: None,
                cents_difference: 0.0,
                accuracy: 0.0,
                is_on_pitch: false,
                lyric_text: syllable.text.clone(),
                tier: None,
                direction: None,
                detected_note,
                target_note: None,
                confidence: sample.confidence,
            });
        };

        let target = pitch.frequency_at(self.reference_a4);
        let scored = score(sample.frequency, target, sample.confidence, &self.rules);
        Some(PitchAnalysisResult {
            current_pitch: sample.frequency,
            target_pitch: Some(target),
            cents_difference: scored.cents,
            accuracy: scored.accuracy,
            is_on_pitch: scored.is_on_pitch,
            lyric_text: syllable.text.clone(),
            tier: Some(scored.tier),
            direction: Some(scored.direction),
            detected_note,
            target_note: Some(note_name(pitch.midi())),
            confidence: sample.confidence,
        })
    }
}

impl Drop for PitchAnalysisEngine {
    fn drop(&mut self) {
        self.stop_analysis();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::super::microphone::fake::{FakeMicState, FakeMicrophone};
    use super::*;
    use crate::lyrics::Syllable;
    use crate::music::{NotePitch, Step};

    fn lyrics() -> LyricsData {
        LyricsData {
            title: "Test".to_string(),
            lyrics: vec!["la la".to_string()],
            syllable_groups: vec![SyllableGroup {
                start_time: 1.0,
                end_time: 3.0,
                full_text: "la la".to_string(),
                syllables: vec![
                    Syllable {
                        text: "la".to_string(),
                        start_time: 1.0,
                        end_time: 2.0,
                        pitch: Some(NotePitch::new(Step::A, 0, 4)),
                    },
                    Syllable {
                        text: "ha".to_string(),
                        start_time: 2.5,
                        end_time: 3.0,
                        pitch: None,
                    },
                ],
            }],
        }
    }

    fn engine(granted: bool) -> (PitchAnalysisEngine, Rc<RefCell<FakeMicState>>) {
        let (mic, state) = FakeMicrophone::new(granted);
        (
            PitchAnalysisEngine::new(&AnalysisConfig::default(), Box::new(mic)),
            state,
        )
    }

    fn collect(
        engine: &mut PitchAnalysisEngine,
    ) -> Rc<RefCell<Vec<PitchAnalysisResult>>> {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        engine
            .start_analysis(&lyrics(), move |r| sink.borrow_mut().push(r))
            .unwrap();
        results
    }

    #[test]
    fn test_permission_denied() {
        let (mut engine, state) = engine(false);
        let err = engine.start_analysis(&lyrics(), |_| {}).unwrap_err();
        assert!(matches!(err, AnalysisError::PermissionDenied));
        assert!(!engine.is_active());
        assert_eq!(state.borrow().opens, 0);
    }

    #[test]
    fn test_on_pitch_sample_scores_against_syllable() {
        let (mut engine, state) = engine(true);
        let results = collect(&mut engine);
        state.borrow_mut().script.push_back(Ok(Some((440.0, 0.9))));

        engine.sample(1.5, Duration::from_millis(100)).unwrap();

        let results = results.borrow();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.target_pitch, Some(440.0));
        assert!(r.cents_difference.abs() < 1e-9);
        assert!(r.is_on_pitch);
        assert!((r.accuracy - 0.9).abs() < 1e-9);
        assert_eq!(r.lyric_text, "la");
        assert_eq!(r.tier, Some(FeedbackTier::Perfect));
        assert_eq!(r.target_note.as_deref(), Some("A4"));
        assert_eq!(r.detected_note.as_deref(), Some("A4"));
    }

    #[test]
    fn test_low_confidence_discarded() {
        let (mut engine, state) = engine(true);
        let results = collect(&mut engine);
        state.borrow_mut().script.push_back(Ok(Some((440.0, 0.39))));

        engine.sample(1.5, Duration::ZERO).unwrap();
        assert!(results.borrow().is_empty());
    }

    #[test]
    fn test_no_active_syllable_produces_nothing() {
        let (mut engine, state) = engine(true);
        let results = collect(&mut engine);
        // Inside the group, between syllables
        state.borrow_mut().script.push_back(Ok(Some((440.0, 0.9))));
        engine.sample(2.2, Duration::ZERO).unwrap();
        // Outside every group
        state.borrow_mut().script.push_back(Ok(Some((440.0, 0.9))));
        engine.sample(10.0, Duration::ZERO).unwrap();
        assert!(results.borrow().is_empty());
    }

    #[test]
    fn test_unpitched_syllable_has_no_target() {
        let (mut engine, state) = engine(true);
        let results = collect(&mut engine);
        state.borrow_mut().script.push_back(Ok(Some((300.0, 0.8))));

        engine.sample(2.7, Duration::ZERO).unwrap();

        let results = results.borrow();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].target_pitch, None);
        assert_eq!(results[0].accuracy, 0.0);
        assert!(!results[0].is_on_pitch);
        assert_eq!(results[0].lyric_text, "ha");
    }

    #[test]
    fn test_stop_twice_releases_once() {
        let (mut engine, state) = engine(true);
        engine.start_analysis(&lyrics(), |_| {}).unwrap();
        engine.stop_analysis();
        engine.stop_analysis();
        assert_eq!(state.borrow().releases, 1);
        assert!(!engine.is_active());
    }

    #[test]
    fn test_restart_after_stop_reuses_microphone() {
        let (mut engine, state) = engine(true);
        engine.start_analysis(&lyrics(), |_| {}).unwrap();
        engine.stop_analysis();
        engine.start_analysis(&lyrics(), |_| {}).unwrap();
        assert_eq!(state.borrow().opens, 2);
        assert!(matches!(
            engine.start_analysis(&lyrics(), |_| {}),
            Err(AnalysisError::AlreadyRunning)
        ));
    }

    #[test]
    fn test_capture_error_interrupts_and_releases() {
        let (mut engine, state) = engine(true);
        let results = collect(&mut engine);
        state
            .borrow_mut()
            .script
            .push_back(Err("device unplugged".to_string()));

        let err = engine.sample(1.5, Duration::ZERO).unwrap_err();
        assert!(matches!(err, AnalysisError::AnalysisInterrupted(_)));
        assert!(!engine.is_active());
        assert!(results.borrow().is_empty());
        assert_eq!(state.borrow().releases, 1);

        engine.stop_analysis();
        assert_eq!(state.borrow().releases, 1);
    }

    #[test]
    fn test_drop_releases_active_lease() {
        let (mut engine, state) = engine(true);
        engine.start_analysis(&lyrics(), |_| {}).unwrap();
        drop(engine);
        assert_eq!(state.borrow().releases, 1);
    }
}
