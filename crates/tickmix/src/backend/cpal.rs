//! Live output backend built on CPAL.
//!
//! One mixed period per `write` lands in a bounded [`ByteRing`]; the
//! stream callback drains it, converts the device depth to the stream
//! sample type, and fills any shortfall with silence. `write` reports
//! "busy" when the ring is full, which is the backpressure signal the
//! tick loop is built around.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::backend::Backend;
use crate::config::LiveOutputConfig;
use crate::error::{Error, Result};
use crate::ring::ByteRing;
use crate::sample::{PcmSpec, SampleDepth, sample_to_f32};

/// Plays mixed periods on a CPAL output device.
pub struct CpalBackend {
    config: LiveOutputConfig,
    state: Option<LiveState>,
}

struct LiveState {
    stream: cpal::Stream,
    ring: Arc<ByteRing>,
    counters: StreamCounters,
}

#[derive(Clone, Default)]
struct StreamCounters {
    played_frames: Arc<AtomicU64>,
    underrun_frames: Arc<AtomicU64>,
    underrun_events: Arc<AtomicU64>,
}

impl CpalBackend {
    pub fn new(config: LiveOutputConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new(LiveOutputConfig::default())
    }
}

impl Backend for CpalBackend {
    fn open(&mut self, spec: &PcmSpec) -> Result<usize> {
        if self.state.is_some() {
            return Err(Error::Backend("backend already open".into()));
        }

        let host = cpal::default_host();
        let device = pick_device(&host, self.config.device.as_deref())?;
        let supported = pick_output_config(&device, spec)?;
        let sample_format = supported.sample_format();

        let stream_config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: spec.rate_hz,
            buffer_size: pick_buffer_size(&supported, self.config.period_frames)
                .unwrap_or(cpal::BufferSize::Default),
        };

        let period_bytes = spec.bytes_for_frames(self.config.period_frames as usize);
        if period_bytes == 0 {
            return Err(Error::Backend("zero-sized period".into()));
        }
        let ring = Arc::new(ByteRing::new(
            period_bytes * self.config.ring_periods.max(1),
        ));
        let counters = StreamCounters::default();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, spec.depth, ring.clone(), counters.clone())
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, spec.depth, ring.clone(), counters.clone())
            }
            cpal::SampleFormat::I32 => {
                build_stream::<i32>(&device, &stream_config, spec.depth, ring.clone(), counters.clone())
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, spec.depth, ring.clone(), counters.clone())
            }
            other => Err(Error::Backend(format!("unsupported sample format: {other:?}"))),
        }?;
        stream
            .play()
            .map_err(|e| Error::Backend(format!("start stream: {e}")))?;

        let name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".into());
        tracing::info!(
            device = %name,
            %spec,
            format = ?sample_format,
            period_frames = self.config.period_frames,
            "live output open"
        );

        self.state = Some(LiveState {
            stream,
            ring,
            counters,
        });
        Ok(period_bytes)
    }

    fn write(&mut self, frames: &[u8]) -> Result<bool> {
        let state = self.state.as_ref().ok_or(Error::Closed)?;
        Ok(state.ring.push(frames))
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        let state = self.state.as_ref().ok_or(Error::Closed)?;
        if paused {
            state
                .stream
                .pause()
                .map_err(|e| Error::Backend(format!("pause stream: {e}")))
        } else {
            state
                .stream
                .play()
                .map_err(|e| Error::Backend(format!("resume stream: {e}")))
        }
    }

    fn drain(&mut self) -> Result<()> {
        if let Some(state) = &self.state {
            if !state.ring.wait_empty(self.config.drain_timeout) {
                tracing::warn!("drain timed out with audio still queued");
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(state) = self.state.take() {
            state.ring.close();
            drop(state.stream);
            tracing::info!(
                played_frames = state.counters.played_frames.load(Ordering::Relaxed),
                underrun_events = state.counters.underrun_events.load(Ordering::Relaxed),
                underrun_frames = state.counters.underrun_frames.load(Ordering::Relaxed),
                "live output closed"
            );
        }
    }
}

/// Names of every output device on the default host, for CLI listing.
pub fn output_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Backend(format!("no output devices: {e}")))?;
    let mut names = Vec::new();
    for device in devices {
        match device.description() {
            Ok(d) => names.push(d.to_string()),
            Err(e) => tracing::debug!("skipping device without description: {e}"),
        }
    }
    Ok(names)
}

/// Pick the first output device matching `needle` (case-insensitive), or
/// the host default when no needle is given.
fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .map_err(|e| Error::Backend(format!("no output devices: {e}")))?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(Error::Backend(format!("no output device matched: {needle}")));
    }

    host.default_output_device()
        .ok_or_else(|| Error::Backend("no default output device".into()))
}

/// Find a supported config at exactly the requested rate and channels.
///
/// Rate conversion is out of scope, so a device that cannot run at
/// `spec.rate_hz` fails with [`Error::RateMismatch`] carrying the
/// nearest rate it does support.
fn pick_output_config(
    device: &cpal::Device,
    spec: &PcmSpec,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| Error::Backend(format!("query output configs: {e}")))?
        .collect();
    if ranges.is_empty() {
        return Err(Error::Backend("no supported output configs".into()));
    }

    let mut best: Option<(u8, cpal::SupportedStreamConfig)> = None;
    let mut nearest: Option<u32> = None;

    for range in ranges {
        if range.channels() != spec.channels {
            continue;
        }
        let clamped = spec
            .rate_hz
            .clamp(range.min_sample_rate(), range.max_sample_rate());
        nearest = Some(nearer_rate(nearest, clamped, spec.rate_hz));
        if clamped != spec.rate_hz {
            continue;
        }
        let rank = sample_format_rank(range.sample_format());
        let replace = best.as_ref().map(|(r, _)| rank < *r).unwrap_or(true);
        if replace {
            best = Some((rank, range.with_sample_rate(spec.rate_hz)));
        }
    }

    if let Some((_, cfg)) = best {
        return Ok(cfg);
    }
    match nearest {
        Some(negotiated) => Err(Error::RateMismatch {
            requested: spec.rate_hz,
            negotiated,
        }),
        None => Err(Error::Backend(format!(
            "no output config with {} channels",
            spec.channels
        ))),
    }
}

/// Ask for a fixed buffer close to the requested period when the device
/// advertises a range; fall back to the device default otherwise.
fn pick_buffer_size(
    supported: &cpal::SupportedStreamConfig,
    requested_frames: u32,
) -> Option<cpal::BufferSize> {
    match supported.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(requested_frames.clamp(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Type-specialized stream builder.
///
/// The callback pops raw bytes, converts them through `f32` to the
/// stream's sample type, and never blocks or waits on a condition
/// variable. Shortfalls become silence and are counted as underruns.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    depth: SampleDepth,
    ring: Arc<ByteRing>,
    counters: StreamCounters,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let sample_bytes = depth.bytes();
    let mut scratch: Vec<u8> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let want = data.len() * sample_bytes;
                scratch.resize(want, 0);
                let got = ring.pop_into(&mut scratch[..want]);
                let got_samples = got / sample_bytes;

                for (out, sample) in data
                    .iter_mut()
                    .zip(scratch[..got_samples * sample_bytes].chunks_exact(sample_bytes))
                {
                    *out = <T as cpal::Sample>::from_sample::<f32>(sample_to_f32(depth, sample));
                }
                for out in data[got_samples..].iter_mut() {
                    *out = <T as cpal::Sample>::from_sample::<f32>(0.0);
                }

                if got_samples < data.len() {
                    counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                    counters.underrun_frames.fetch_add(
                        ((data.len() - got_samples) / channels) as u64,
                        Ordering::Relaxed,
                    );
                }
                if got_samples > 0 {
                    counters
                        .played_frames
                        .fetch_add((got_samples / channels) as u64, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Backend(format!("build output stream: {e}")))?;

    Ok(stream)
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn nearer_rate(current: Option<u32>, candidate: u32, target: u32) -> u32 {
    match current {
        None => candidate,
        Some(cur) => {
            if candidate.abs_diff(target) < cur.abs_diff(target) {
                candidate
            } else {
                cur
            }
        }
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("Speakers (Realtek HD)", "realtek"));
        assert!(matches_device_name("speakers (realtek hd)", "Realtek"));
        assert!(!matches_device_name("Speakers (Realtek HD)", "hdmi"));
        assert!(!matches_device_name("Speakers (Realtek HD)", "  "));
    }

    #[test]
    fn nearer_rate_tracks_the_closest_candidate() {
        assert_eq!(nearer_rate(None, 48_000, 44_100), 48_000);
        assert_eq!(nearer_rate(Some(48_000), 44_100, 44_100), 44_100);
        assert_eq!(nearer_rate(Some(44_100), 96_000, 44_100), 44_100);
    }

    #[test]
    fn sample_format_rank_prefers_f32() {
        assert!(sample_format_rank(cpal::SampleFormat::F32) < sample_format_rank(cpal::SampleFormat::I32));
        assert!(sample_format_rank(cpal::SampleFormat::I32) < sample_format_rank(cpal::SampleFormat::I16));
        assert!(sample_format_rank(cpal::SampleFormat::I16) < sample_format_rank(cpal::SampleFormat::U16));
    }
}
