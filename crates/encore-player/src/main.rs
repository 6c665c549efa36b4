//! Encore Player - command line karaoke practice
//!
//! ```text
//! encore-player <song.json> <lyrics.json> [--pitch N] [--loop A B] [--bpm N]
//!               [--metronome] [--no-mic] [--save NAME] [--highlight #RRGGBB]
//! encore-player --list-devices
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use encore_core::audio::{list_devices, Direction};
use encore_core::config::{default_config_path, default_data_path, load_config, EngineConfig};
use encore_core::lyrics::{HighlightPalette, LyricHighlight, LyricsData, Rgb, SyllableGroup};
use encore_core::pitch::CpalMicrophone;
use encore_core::playback::CpalBackendFactory;
use encore_core::sections::JsonFileStore;
use encore_core::{PracticeSession, SessionEvent, SongMetadata};

/// Longest sleep between control-loop iterations
const MAX_IDLE: Duration = Duration::from_millis(20);

#[derive(Debug, Default, PartialEq)]
struct Options {
    song: PathBuf,
    lyrics: PathBuf,
    pitch: Option<f64>,
    loop_region: Option<(f64, f64)>,
    bpm: Option<f64>,
    metronome: bool,
    microphone: bool,
    save_as: Option<String>,
    highlight: Option<Rgb>,
    list_devices: bool,
}

fn parse_number(flag: &str, value: Option<String>) -> Result<f64> {
    let value = value.with_context(|| format!("{} needs a value", flag))?;
    value
        .parse()
        .with_context(|| format!("{} expects a number, got '{}'", flag, value))
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options> {
    let mut args = args.into_iter();
    let mut positional = Vec::new();
    let mut options = Options {
        microphone: true,
        ..Options::default()
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pitch" => options.pitch = Some(parse_number("--pitch", args.next())?),
            "--bpm" => options.bpm = Some(parse_number("--bpm", args.next())?),
            "--loop" => {
                let a = parse_number("--loop", args.next())?;
                let b = parse_number("--loop", args.next())?;
                options.loop_region = Some((a, b));
            }
            "--metronome" => options.metronome = true,
            "--no-mic" => options.microphone = false,
            "--save" => {
                options.save_as = Some(args.next().context("--save needs a name")?);
            }
            "--highlight" => {
                let value = args.next().context("--highlight needs a color")?;
                let color = Rgb::from_hex(&value)
                    .with_context(|| format!("--highlight expects #RRGGBB, got '{}'", value))?;
                options.highlight = Some(color);
            }
            "--list-devices" => options.list_devices = true,
            flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    if options.list_devices {
        return Ok(options);
    }
    let [song, lyrics]: [PathBuf; 2] = positional
        .try_into()
        .map_err(|_| anyhow::anyhow!("Usage: encore-player <song.json> <lyrics.json> [options]"))?;
    options.song = song;
    options.lyrics = lyrics;
    Ok(options)
}

/// Group text with one 24-bit ANSI color per character
fn render_lyric(text: &str, colors: &[Rgb]) -> String {
    let mut line = String::new();
    for (c, color) in text.chars().zip(colors) {
        line.push_str(&format!("\x1b[38;2;{};{};{}m{}", color.r, color.g, color.b, c));
    }
    line.push_str("\x1b[0m");
    line
}

fn print_devices() {
    for (direction, label) in [(Direction::Output, "Output"), (Direction::Input, "Input")] {
        match list_devices(direction) {
            Ok(devices) => {
                println!("{} devices:", label);
                for device in devices {
                    let marker = if device.is_default { " (default)" } else { "" };
                    println!("  {}{}", device, marker);
                }
            }
            Err(e) => println!("{} devices: {}", label, e),
        }
    }
}

fn log_highlight(highlight: &LyricHighlight, groups: &[SyllableGroup], palette: &HighlightPalette) {
    if let Some(group) = groups.get(highlight.group_index) {
        log::info!("{}", render_lyric(&group.full_text, &highlight.colors(palette)));
    }
}

fn log_event(event: &SessionEvent, groups: &[SyllableGroup], palette: &HighlightPalette) {
    match event {
        SessionEvent::PlaybackStatus(status) => log::debug!(
            "Position {:.1}s / {:.1}s{}",
            status.position_millis as f64 / 1000.0,
            status.duration_millis as f64 / 1000.0,
            if status.is_playing { "" } else { " (paused)" }
        ),
        SessionEvent::LyricHighlight(Some(highlight)) => log_highlight(highlight, groups, palette),
        SessionEvent::LyricHighlight(None) => {}
        SessionEvent::AnalysisResult(result) => log::info!(
            "{} {} {:+.0}c accuracy {:.0}% ({})",
            result.tier.map(|t| t.emoji()).unwrap_or(" "),
            result.lyric_text,
            result.cents_difference,
            result.accuracy * 100.0,
            result.tier.map(|t| t.message()).unwrap_or("no target"),
        ),
        SessionEvent::AnalysisStateChanged(active) => {
            log::info!("Pitch analysis {}", if *active { "on" } else { "off" })
        }
        SessionEvent::SavedSectionsChanged(sections) => {
            log::info!("{} saved section(s)", sections.len())
        }
        SessionEvent::Beat(beat) => {
            log::debug!("{}", if beat.is_downbeat { "TICK" } else { "tock" })
        }
        SessionEvent::LoopSeek { from, to } => log::info!("Loop {:.2}s -> {:.2}s", from, to),
        SessionEvent::TrackEnded => log::info!("Track finished"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let options = parse_args(std::env::args().skip(1))?;
    if options.list_devices {
        print_devices();
        return Ok(());
    }
    log::info!("encore-player starting up");

    let config: EngineConfig = load_config(&default_config_path());

    let song_json = std::fs::read_to_string(&options.song)
        .with_context(|| format!("Failed to read song metadata {:?}", options.song))?;
    let mut song = SongMetadata::from_json(&song_json)
        .with_context(|| format!("Invalid song metadata {:?}", options.song))?;
    song.resolve_relative_to(&options.song);
    let lyrics = LyricsData::load(&options.lyrics)?;
    let groups = lyrics.syllable_groups.clone();
    let mut palette = HighlightPalette::default();
    if let Some(color) = options.highlight {
        palette.highlight = color;
    }

    let store_path = default_data_path(&config.storage.store_file);
    let store = JsonFileStore::open(&store_path)
        .with_context(|| format!("Failed to open section store {:?}", store_path))?;

    let mut analysis_config = config.analysis.clone();
    analysis_config.microphone_enabled &= options.microphone;
    let microphone = CpalMicrophone::new(config.audio.clone(), &analysis_config);
    let factory = CpalBackendFactory::new(config.audio.clone());

    let (mut session, events) =
        PracticeSession::new(config, Box::new(factory), Box::new(microphone), Box::new(store));

    let clock = Instant::now();
    log::info!("Loading '{}' from {}", song.title, song.mr_url);
    let backend = session
        .load_track(song, lyrics, clock.elapsed())
        .context("Failed to load backing track")?;
    log::info!("Playing on {} backend", backend);

    if let Some(semitones) = options.pitch {
        let applied = session.set_pitch(semitones)?;
        if !session.supports_pitch_shift() {
            log::warn!("Pitch shift unavailable on {} backend, ignoring {:+}", backend, applied);
        }
    }
    if let Some((a, b)) = options.loop_region {
        session.set_point_a(a).context("Invalid loop start")?;
        session.set_point_b(b).context("Invalid loop end")?;
        session.seek(a)?;
        if let Some(name) = &options.save_as {
            let section = session.save_section(name)?;
            log::info!("Saved section '{}' as {}", section.name, section.id);
        }
    } else if options.save_as.is_some() {
        log::warn!("--save ignored without --loop");
    }
    if let Some(bpm) = options.bpm {
        session.set_bpm(bpm);
    }
    if options.metronome {
        session.set_metronome_enabled(true, clock.elapsed());
    }

    session.play()?;
    if let Err(e) = session.start_analysis(clock.elapsed()) {
        log::warn!("Practicing without pitch feedback: {}", e);
    }

    loop {
        session.advance(clock.elapsed())?;

        let mut ended = false;
        for event in events.try_iter() {
            log_event(&event, &groups, &palette);
            ended |= event == SessionEvent::TrackEnded;
        }
        if ended {
            break;
        }

        let now = clock.elapsed();
        let sleep = session
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(now))
            .unwrap_or(MAX_IDLE)
            .min(MAX_IDLE);
        std::thread::sleep(sleep);
    }

    session.stop_analysis();
    log::info!("encore-player shutting down");
    Ok(())
}
