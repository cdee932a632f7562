//! `tickmix` — mix audio files on a cooperative tick loop and play or
//! render the result.
//!
//! ## Pipeline
//! 1. **Probe**: every input is sniffed and opened as WAV or handed to
//!    Symphonia (FLAC, Ogg/Vorbis, MP3).
//! 2. **Mix**: each tick, every playing track submits one period into a
//!    shared staging buffer with a saturating add.
//! 3. **Output**: the mixed period goes out once per tick, to a CPAL
//!    device (`play`) or a WAV file (`render`).
//!
//! All inputs must share one PCM spec; there is no resampling.

mod cli;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tickmix::backend::{self, Backend, CpalBackend, WavSinkBackend};
use tickmix::codec::{self, Codec};
use tickmix::config::LiveOutputConfig;
use tickmix::player::Player;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,tickmix=info")
        }))
        .init();

    match args.cmd {
        cli::Command::Play {
            files,
            device,
            loops,
            gain,
            period_frames,
        } => play(files, device, loops, gain, period_frames),
        cli::Command::Render {
            files,
            output,
            loops,
            gain,
            period_frames,
        } => render(files, output, loops, gain, period_frames),
        cli::Command::Devices => {
            for name in backend::output_device_names()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn play(
    files: Vec<PathBuf>,
    device: Option<String>,
    loops: i32,
    gain: f32,
    period_frames: u32,
) -> Result<()> {
    let sources = open_all(&files)?;
    let spec = sources.first().context("no input files")?.1.spec();

    let config = LiveOutputConfig {
        device,
        period_frames,
        ..LiveOutputConfig::default()
    };
    let mut player =
        Player::open(CpalBackend::new(config), spec).context("open output device")?;
    start_all(&mut player, sources, loops, gain)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let _ = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    });

    while running.load(Ordering::SeqCst) && player.playing_count() > 0 {
        // A refused flush means the output has a full buffer queue;
        // back off instead of spinning on it.
        if !player.tick().context("mix tick")? {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
    if !running.load(Ordering::SeqCst) {
        tracing::info!("interrupted, stopping");
    }
    player.close();
    Ok(())
}

fn render(
    files: Vec<PathBuf>,
    output: PathBuf,
    loops: i32,
    gain: f32,
    period_frames: u32,
) -> Result<()> {
    if loops < 1 {
        bail!("render needs a positive loop count, got {loops}");
    }
    let sources = open_all(&files)?;
    let spec = sources.first().context("no input files")?.1.spec();

    let backend = WavSinkBackend::create(&output, period_frames as usize);
    let mut player = Player::open(backend, spec)
        .with_context(|| format!("create {}", output.display()))?;
    start_all(&mut player, sources, loops, gain)?;

    let mut ticks: u64 = 0;
    while player.playing_count() > 0 {
        player.tick().context("mix tick")?;
        ticks += 1;
    }
    player.close();
    tracing::info!(ticks, path = %output.display(), "render complete");
    Ok(())
}

fn open_all(files: &[PathBuf]) -> Result<Vec<(String, Box<dyn Codec>)>> {
    let mut sources: Vec<(String, Box<dyn Codec>)> = Vec::new();
    for path in files {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let codec = codec::open_source(BufReader::new(file))
            .with_context(|| format!("probe {}", path.display()))?;
        tracing::info!(path = %path.display(), spec = %codec.spec(), "source ready");
        let id = track_id(path, &sources);
        sources.push((id, codec));
    }
    Ok(sources)
}

fn start_all(
    player: &mut Player<impl Backend>,
    sources: Vec<(String, Box<dyn Codec>)>,
    loops: i32,
    gain: f32,
) -> Result<()> {
    for (id, codec) in sources {
        player
            .load(&id, codec)
            .with_context(|| format!("load {id}"))?;
        if !player.play(&id, loops, gain) {
            tracing::warn!(id = %id, "track refused to start");
        }
    }
    Ok(())
}

/// Track id from the file stem, suffixed when the same stem repeats.
fn track_id(path: &Path, taken: &[(String, Box<dyn Codec>)]) -> String {
    let base = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("track")
        .to_string();
    if !taken.iter().any(|(id, _)| *id == base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken.iter().any(|(id, _)| *id == candidate) {
            return candidate;
        }
        n += 1;
    }
}
