//! Multi-track mixer driven by a tick loop.
//!
//! The player owns one [`PcmDevice`] and a set of named [`Track`]s.
//! Each [`tick`](Player::tick) walks the tracks in insertion order,
//! letting every active one submit its staged period, then flushes the
//! device exactly once. The first submitter of a tick overwrites the
//! staging buffer instead of mixing, which skips the read-modify-write
//! of mixing into silence; every later submitter mixes on top.
//!
//! A track that fails mid-playback is stopped and logged, never letting
//! one bad source take down the rest of the mix.

use crate::backend::Backend;
use crate::codec::Codec;
use crate::device::PcmDevice;
use crate::error::{Error, Result};
use crate::sample::PcmSpec;
use crate::track::Track;

pub struct Player<B: Backend> {
    device: PcmDevice<B>,
    tracks: Vec<(String, Track)>,
}

impl<B: Backend> Player<B> {
    /// Open `backend` for `spec` and wrap it in an empty player.
    pub fn open(backend: B, spec: PcmSpec) -> Result<Self> {
        Ok(Self {
            device: PcmDevice::open(backend, spec)?,
            tracks: Vec::new(),
        })
    }

    pub fn spec(&self) -> PcmSpec {
        self.device.spec()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tracks.iter().any(|(tid, _)| tid == id)
    }

    /// Register `codec` under `id`.
    ///
    /// The codec spec must match the device exactly; there is no
    /// resampling. Loading over an existing id stops and returns the
    /// previous track, keeping its position in the mix order.
    pub fn load(&mut self, id: &str, codec: Box<dyn Codec>) -> Result<Option<Track>> {
        let spec = codec.spec();
        if spec != self.device.spec() {
            return Err(Error::SpecMismatch {
                track: spec,
                device: self.device.spec(),
            });
        }
        let mut track = Track::new(codec);
        track.size_frame(self.device.buffer_capacity());

        if let Some(slot) = self.tracks.iter_mut().find(|(tid, _)| tid == id) {
            let mut old = std::mem::replace(&mut slot.1, track);
            old.stop(true);
            tracing::debug!(id, "replaced already loaded track");
            return Ok(Some(old));
        }
        self.tracks.push((id.to_string(), track));
        tracing::debug!(id, "track loaded");
        Ok(None)
    }

    /// Remove and return the track under `id`, stopped.
    pub fn eject(&mut self, id: &str) -> Option<Track> {
        let pos = self.tracks.iter().position(|(tid, _)| tid == id)?;
        let (_, mut track) = self.tracks.remove(pos);
        track.stop(true);
        Some(track)
    }

    /// Start the track under `id` from the top.
    ///
    /// Returns `false` for an unknown id, for a track that is already
    /// playing, and for `iterations` of `0` (which stops instead).
    pub fn play(&mut self, id: &str, iterations: i32, gain: f32) -> bool {
        let Some(track) = self.track_mut(id) else {
            tracing::debug!(id, "play requested for unknown track");
            return false;
        };
        if iterations != 0 && track.is_active() {
            return false;
        }
        track.play(iterations, gain)
    }

    /// Stop the track under `id`; see [`Track::stop`] for `force`.
    pub fn stop(&mut self, id: &str, force: bool) -> bool {
        match self.track_mut(id) {
            Some(track) => {
                track.stop(force);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self, force: bool) {
        for (_, track) in &mut self.tracks {
            track.stop(force);
        }
    }

    /// Restart the current pass of `id` from the top of its source.
    /// A failing source is stopped rather than surfaced.
    pub fn rewind(&mut self, id: &str) -> bool {
        let Some(track) = self.track_mut(id) else {
            return false;
        };
        match track.rewind() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id, "rewind failed, stopping track: {e}");
                track.stop(true);
                false
            }
        }
    }

    pub fn set_gain(&mut self, id: &str, gain: f32) -> bool {
        match self.track_mut(id) {
            Some(track) => {
                track.set_gain(gain);
                true
            }
            None => false,
        }
    }

    pub fn is_playing(&self, id: &str) -> bool {
        self.tracks
            .iter()
            .any(|(tid, track)| tid == id && track.is_active())
    }

    pub fn playing_count(&self) -> usize {
        self.tracks.iter().filter(|(_, t)| t.is_active()).count()
    }

    pub fn pause(&mut self, paused: bool) -> Result<()> {
        self.device.pause(paused)
    }

    /// Run one tick: every active track submits, then one flush.
    ///
    /// Returns the flush outcome, `false` meaning the backend was busy
    /// and the period is held for the next tick. Track errors stop the
    /// failing track and are not propagated.
    pub fn tick(&mut self) -> Result<bool> {
        for (id, track) in &mut self.tracks {
            if !track.is_active() {
                continue;
            }
            // A track may overwrite only while nothing is staged yet;
            // anything submitted after that mixes on top, even when the
            // submitter failed right afterwards.
            let exclusive = self.device.fill() == 0;
            if let Err(e) = track.update(&mut self.device, exclusive) {
                tracing::warn!(id = %id, "track failed, stopping: {e}");
                track.stop(true);
            }
        }
        self.device.flush()
    }

    /// Stop everything and release the device. Safe to call twice.
    pub fn close(&mut self) {
        self.stop_all(true);
        self.device.close();
    }

    fn track_mut(&mut self, id: &str) -> Option<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|(tid, _)| tid == id)
            .map(|(_, track)| track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleDepth;
    use crate::track::LOOP_FOREVER;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct MemCodec {
        spec: PcmSpec,
        data: Vec<u8>,
        pos: usize,
    }

    impl MemCodec {
        fn new(samples: &[i16]) -> Box<Self> {
            Box::new(Self {
                spec: PcmSpec::new(8_000, SampleDepth::S16, 1),
                data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
                pos: 0,
            })
        }
    }

    impl Codec for MemCodec {
        fn spec(&self) -> PcmSpec {
            self.spec
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let frame = self.spec.frame_bytes();
            let want = buf.len().min(self.data.len() - self.pos) / frame * frame;
            buf[..want].copy_from_slice(&self.data[self.pos..self.pos + want]);
            self.pos += want;
            Ok(want)
        }

        fn reset(&mut self) -> Result<()> {
            self.pos = 0;
            Ok(())
        }
    }

    /// Fails every read after the first `good_reads`.
    struct FailingCodec {
        inner: Box<MemCodec>,
        good_reads: usize,
    }

    impl Codec for FailingCodec {
        fn spec(&self) -> PcmSpec {
            self.inner.spec()
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.good_reads == 0 {
                return Err(Error::Decode("synthetic decode failure".into()));
            }
            self.good_reads -= 1;
            self.inner.read(buf)
        }

        fn reset(&mut self) -> Result<()> {
            self.inner.reset()
        }
    }

    struct CaptureBackend {
        period_frames: usize,
        busy: Arc<AtomicBool>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl Backend for CaptureBackend {
        fn open(&mut self, spec: &PcmSpec) -> Result<usize> {
            Ok(spec.bytes_for_frames(self.period_frames))
        }

        fn write(&mut self, frames: &[u8]) -> Result<bool> {
            if self.busy.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.writes.lock().unwrap().push(frames.to_vec());
            Ok(true)
        }
    }

    struct Rig {
        player: Player<CaptureBackend>,
        busy: Arc<AtomicBool>,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    fn rig_for(period_frames: usize, spec: PcmSpec) -> Rig {
        let busy = Arc::new(AtomicBool::new(false));
        let writes = Arc::new(Mutex::new(Vec::new()));
        let backend = CaptureBackend {
            period_frames,
            busy: busy.clone(),
            writes: writes.clone(),
        };
        let player = Player::open(backend, spec).unwrap();
        Rig {
            player,
            busy,
            writes,
        }
    }

    fn rig(period_frames: usize) -> Rig {
        rig_for(period_frames, PcmSpec::new(8_000, SampleDepth::S16, 1))
    }

    fn written(rig: &Rig) -> Vec<Vec<i16>> {
        rig.writes
            .lock()
            .unwrap()
            .iter()
            .map(|w| {
                w.chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn two_tracks_mix_into_one_write_per_tick() {
        let mut rig = rig(2);
        rig.player
            .load("bgm", MemCodec::new(&[100, 100, 100, 100]))
            .unwrap();
        rig.player.load("sfx", MemCodec::new(&[25, 25])).unwrap();

        assert!(rig.player.play("bgm", 1, 1.0));
        assert!(rig.player.play("sfx", 1, 1.0));

        rig.player.tick().unwrap();
        assert_eq!(written(&rig), vec![vec![125, 125]]);

        rig.player.tick().unwrap();
        assert_eq!(written(&rig), vec![vec![125, 125], vec![100, 100]]);

        rig.player.tick().unwrap();
        assert_eq!(written(&rig).len(), 2);
        assert_eq!(rig.player.playing_count(), 0);
    }

    #[test]
    fn mixing_saturates_at_the_rails() {
        let mut rig = rig(2);
        rig.player
            .load("a", MemCodec::new(&[30_000, 30_000]))
            .unwrap();
        rig.player
            .load("b", MemCodec::new(&[30_000, -30_000]))
            .unwrap();
        assert!(rig.player.play("a", 1, 1.0));
        assert!(rig.player.play("b", 1, 1.0));

        rig.player.tick().unwrap();
        assert_eq!(written(&rig), vec![vec![i16::MAX, 0]]);
    }

    #[test]
    fn load_over_an_existing_id_replaces_it() {
        let mut rig = rig(2);
        assert!(rig.player.load("a", MemCodec::new(&[1, 2])).unwrap().is_none());
        assert!(rig.player.play("a", LOOP_FOREVER, 1.0));

        let old = rig.player.load("a", MemCodec::new(&[3, 4])).unwrap();
        assert!(old.is_some());
        assert!(!old.unwrap().is_active());
        assert_eq!(rig.player.len(), 1);

        assert!(rig.player.play("a", 1, 1.0));
        rig.player.tick().unwrap();
        assert_eq!(written(&rig), vec![vec![3, 4]]);
    }

    #[test]
    fn unknown_and_busy_ids_refuse_to_play() {
        let mut rig = rig(2);
        assert!(!rig.player.play("missing", 1, 1.0));

        rig.player
            .load("a", MemCodec::new(&[1, 2, 3, 4]))
            .unwrap();
        assert!(rig.player.play("a", 1, 1.0));
        assert!(!rig.player.play("a", 1, 1.0));

        while rig.player.playing_count() > 0 {
            rig.player.tick().unwrap();
        }
        assert!(rig.player.play("a", 1, 1.0));
    }

    #[test]
    fn play_zero_iterations_stops_the_track() {
        let mut rig = rig(2);
        rig.player.load("a", MemCodec::new(&[1, 2])).unwrap();
        assert!(rig.player.play("a", 1, 1.0));
        assert!(!rig.player.play("a", 0, 1.0));
        assert!(!rig.player.is_playing("a"));

        rig.player.tick().unwrap();
        assert!(written(&rig).is_empty());
    }

    #[test]
    fn spec_mismatch_is_rejected_at_load() {
        let mut rig = rig(2);
        let mut codec = MemCodec::new(&[1, 2]);
        codec.spec = PcmSpec::new(44_100, SampleDepth::S16, 1);
        match rig.player.load("a", codec) {
            Err(Error::SpecMismatch { track, device }) => {
                assert_eq!(track.rate_hz, 44_100);
                assert_eq!(device.rate_hz, 8_000);
            }
            other => panic!("expected spec mismatch, got {other:?}"),
        }
        assert!(!rig.player.contains("a"));
    }

    #[test]
    fn busy_backend_holds_audio_without_losing_it() {
        let mut rig = rig(2);
        rig.player
            .load("a", MemCodec::new(&[1, 2, 3, 4]))
            .unwrap();
        assert!(rig.player.play("a", 1, 1.0));

        rig.busy.store(true, Ordering::SeqCst);
        assert!(!rig.player.tick().unwrap());
        assert!(!rig.player.tick().unwrap());
        assert!(written(&rig).is_empty());

        rig.busy.store(false, Ordering::SeqCst);
        while rig.player.playing_count() > 0 {
            rig.player.tick().unwrap();
        }
        assert_eq!(written(&rig), vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn eject_removes_the_track() {
        let mut rig = rig(2);
        rig.player.load("a", MemCodec::new(&[1, 2])).unwrap();
        assert!(rig.player.play("a", 1, 1.0));

        let track = rig.player.eject("a");
        assert!(track.is_some());
        assert!(!track.unwrap().is_active());
        assert!(!rig.player.contains("a"));
        assert!(rig.player.eject("a").is_none());
    }

    #[test]
    fn stop_all_silences_every_track() {
        let mut rig = rig(2);
        rig.player.load("a", MemCodec::new(&[1, 2, 3, 4])).unwrap();
        rig.player.load("b", MemCodec::new(&[5, 6, 7, 8])).unwrap();
        assert!(rig.player.play("a", LOOP_FOREVER, 1.0));
        assert!(rig.player.play("b", LOOP_FOREVER, 1.0));
        assert_eq!(rig.player.playing_count(), 2);

        rig.player.stop_all(true);
        assert_eq!(rig.player.playing_count(), 0);
        rig.player.tick().unwrap();
        assert!(written(&rig).is_empty());
    }

    #[test]
    fn failing_track_is_stopped_and_the_rest_keep_playing() {
        let mut rig = rig(2);
        let failing = Box::new(FailingCodec {
            inner: MemCodec::new(&[9, 9, 9, 9]),
            good_reads: 1,
        });
        rig.player.load("bad", failing).unwrap();
        rig.player
            .load("good", MemCodec::new(&[10, 10, 10, 10]))
            .unwrap();
        assert!(rig.player.play("bad", 1, 1.0));
        assert!(rig.player.play("good", 1, 1.0));

        // First tick mixes both staged periods; the bad track dies on
        // its follow-up decode.
        rig.player.tick().unwrap();
        assert_eq!(written(&rig), vec![vec![19, 19]]);
        assert!(!rig.player.is_playing("bad"));
        assert!(rig.player.is_playing("good"));

        rig.player.tick().unwrap();
        assert_eq!(written(&rig), vec![vec![19, 19], vec![10, 10]]);
    }

    #[test]
    fn rewind_and_gain_target_loaded_tracks() {
        let mut rig = rig(2);
        rig.player.load("a", MemCodec::new(&[8, 8, 2, 2])).unwrap();
        assert!(!rig.player.rewind("missing"));
        assert!(!rig.player.set_gain("missing", 0.5));

        assert!(rig.player.play("a", 1, 1.0));
        rig.player.tick().unwrap();
        assert!(rig.player.rewind("a"));
        rig.player.tick().unwrap();
        assert_eq!(written(&rig), vec![vec![8, 8], vec![8, 8]]);
        assert!(rig.player.set_gain("a", 0.5));
    }

    fn wav_fixture(rate: u32, samples: &[i16]) -> std::io::Cursor<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn wav_source_plays_end_to_end() {
        let mut rig = rig(4);
        let codec =
            crate::codec::open_source(wav_fixture(8_000, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]))
                .unwrap();
        rig.player.load("wav", codec).unwrap();
        assert!(rig.player.play("wav", 1, 1.0));

        while rig.player.playing_count() > 0 {
            rig.player.tick().unwrap();
        }
        assert_eq!(
            written(&rig),
            vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10]]
        );
    }

    #[test]
    fn looped_wav_splices_seamlessly() {
        let mut rig = rig(2);
        let codec = crate::codec::open_source(wav_fixture(8_000, &[1, 2, 3])).unwrap();
        rig.player.load("loop", codec).unwrap();
        assert!(rig.player.play("loop", 2, 1.0));

        while rig.player.playing_count() > 0 {
            rig.player.tick().unwrap();
        }
        assert_eq!(written(&rig), vec![vec![1, 2], vec![3, 1], vec![2, 3]]);
    }

    #[test]
    fn stereo_source_takes_one_tick_per_period() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in 1i16..=10 {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.set_position(0);

        // Five stereo frames over two-frame periods: three ticks, the
        // last one a partial period.
        let mut rig = rig_for(2, PcmSpec::new(8_000, SampleDepth::S16, 2));
        let codec = crate::codec::open_source(cursor).unwrap();
        rig.player.load("st", codec).unwrap();
        assert!(rig.player.play("st", 1, 1.0));

        let mut ticks = 0;
        while rig.player.is_playing("st") {
            rig.player.tick().unwrap();
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert_eq!(
            written(&rig),
            vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10]]
        );
    }

    #[test]
    fn wav_with_a_different_rate_is_rejected() {
        let mut rig = rig(2);
        let codec = crate::codec::open_source(wav_fixture(44_100, &[1, 2])).unwrap();
        assert!(matches!(
            rig.player.load("hi", codec),
            Err(Error::SpecMismatch { .. })
        ));
    }

    #[test]
    fn eight_bit_mix_saturates_at_the_top_rail() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..2 {
            writer.write_sample(100i8).unwrap();
        }
        writer.finalize().unwrap();
        cursor.set_position(0);
        let bytes = cursor.into_inner();

        let mut rig = rig_for(2, PcmSpec::new(8_000, SampleDepth::U8, 1));
        for id in ["a", "b"] {
            let codec =
                crate::codec::open_source(std::io::Cursor::new(bytes.clone())).unwrap();
            rig.player.load(id, codec).unwrap();
            assert!(rig.player.play(id, 1, 1.0));
        }

        rig.player.tick().unwrap();
        // 100 + 100 in offset binary clips to the +127 rail, 0xFF.
        assert_eq!(*rig.writes.lock().unwrap(), vec![vec![0xFF, 0xFF]]);
    }
}
