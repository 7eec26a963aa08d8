//! Owns the rendering device, the buffer/source maps, and the scene
//! defaults. Grounded on `OASAudioHandler.h`: `createSource` algorithm,
//! lazy deletion queue, most-recently-modified tracking, scene defaults.

use std::collections::{BTreeMap, VecDeque};

use log::{debug, warn};

use crate::buffer::BufferMap;
use crate::file_handler::FileHandler;
use crate::listener::AudioListener;
use crate::message::{GlobalParam, SourceParam};
use crate::render::{AudioBackend, RenderResult, SampleData};
use crate::source::{AudioSource, SourceState};
use crate::time::Time;

/// Wire-visible state codes for STAT, per spec.md §4.1 (0 = unknown).
pub fn state_code(state: Option<SourceState>) -> i32 {
    match state {
        None => 0,
        Some(SourceState::Initial) => 1,
        Some(SourceState::Playing) => 2,
        Some(SourceState::Paused) => 3,
        Some(SourceState::Stopped) => 4,
        Some(SourceState::Deleted) => 5,
    }
}

/// What was most recently mutated, for the observer interface (spec.md
/// §4.3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecentUnit {
    Source(i32),
    Listener,
}

/// Waveform shapes recognized by WAVE's `waveShape` parameter (spec.md
/// §4.1, grounded on `OASAudioHandler.h`'s doc comment for `createSource`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveShape {
    Sine,
    Square,
    Sawtooth,
    Whitenoise,
    Impulse,
}

impl WaveShape {
    fn from_id(id: i32) -> Option<WaveShape> {
        match id {
            1 => Some(WaveShape::Sine),
            2 => Some(WaveShape::Square),
            3 => Some(WaveShape::Sawtooth),
            4 => Some(WaveShape::Whitenoise),
            5 => Some(WaveShape::Impulse),
            _ => None,
        }
    }
}

/// Sample rate assumed for both synthesized waveforms and cached sample
/// files. The wire protocol and cache format never carry an explicit rate,
/// so the handler standardizes on CD-quality audio throughout, the same
/// assumption the synthesized-waveform path has to make regardless.
const SAMPLE_RATE_HZ: i32 = 44100;

pub struct AudioHandler {
    buffers: BufferMap,
    sources: BTreeMap<i32, AudioSource>,
    next_handle: i32,

    recently_modified: Option<RecentUnit>,
    lazy_deletion_queue: VecDeque<i32>,

    default_rolloff: f32,
    default_reference_distance: f32,

    pub listener: AudioListener,
}

impl AudioHandler {
    pub fn new() -> AudioHandler {
        AudioHandler {
            buffers: BufferMap::new(),
            sources: BTreeMap::new(),
            next_handle: 1,
            recently_modified: None,
            lazy_deletion_queue: VecDeque::new(),
            default_rolloff: 1.0,
            default_reference_distance: 1.0,
            listener: AudioListener::default(),
        }
    }

    fn allocate_handle(&mut self) -> i32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn mark_recent(&mut self, unit: RecentUnit) {
        self.recently_modified = Some(unit);
    }

    /// Reads and clears the most-recently-modified pointer, as the main
    /// loop does after each dispatch (spec.md §4.3, §4.6).
    pub fn take_recently_modified(&mut self) -> Option<RecentUnit> {
        self.recently_modified.take()
    }

    pub fn source(&self, handle: i32) -> Option<&AudioSource> {
        self.sources.get(&handle)
    }

    /// `GHDL filename`: reuse a cached buffer, or load one from the cache
    /// directory on disk. Returns `None` (wire `-1`) if the file has never
    /// been uploaded, per spec.md §4.3 step 3 — the protocol layer must
    /// PTFI the file in before retrying.
    pub fn create_source_from_filename(
        &mut self,
        backend: &mut dyn AudioBackend,
        files: &FileHandler,
        filename: &str,
    ) -> RenderResult<Option<i32>> {
        let buffer = if let Some(id) = self.buffers.get(filename) {
            id
        } else {
            let data = match files.read(filename) {
                Some(bytes) => bytes,
                None => return Ok(None),
            };
            let samples = SampleData::Mono16(bytes_to_i16_samples(&data));
            self.buffers.get_or_create(backend, filename, &samples, SAMPLE_RATE_HZ)?
        };

        let backend_source = backend.create_source(buffer)?;
        let handle = self.allocate_handle();
        let source = AudioSource::new(
            handle,
            backend_source,
            buffer,
            self.default_rolloff,
            self.default_reference_distance,
        );
        self.sources.insert(handle, source);
        self.mark_recent(RecentUnit::Source(handle));

        debug!("created source {} from file '{}'", handle, filename);
        Ok(Some(handle))
    }

    /// `WAVE waveShape freq phase dur`: synthesizes a waveform buffer with
    /// no BufferMap entry (spec.md §4.3).
    pub fn create_source_from_waveform(
        &mut self,
        backend: &mut dyn AudioBackend,
        wave_shape: i32,
        frequency: f32,
        phase_degrees: f32,
        duration: f32,
    ) -> RenderResult<Option<i32>> {
        let shape = match WaveShape::from_id(wave_shape) {
            Some(shape) => shape,
            None => return Ok(None),
        };

        let samples = synthesize_waveform(shape, frequency, phase_degrees, duration);
        let buffer = backend.create_buffer(&SampleData::Mono16(samples), SAMPLE_RATE_HZ)?;
        let backend_source = backend.create_source(buffer)?;

        let handle = self.allocate_handle();
        let source = AudioSource::new(
            handle,
            backend_source,
            buffer,
            self.default_rolloff,
            self.default_reference_distance,
        );
        self.sources.insert(handle, source);
        self.mark_recent(RecentUnit::Source(handle));

        Ok(Some(handle))
    }

    /// `RHDL handle`: moves the source into the lazy-deletion queue rather
    /// than dropping it immediately, so a renderer object that's mid-
    /// operation on another call path is never destroyed out from under
    /// it (spec.md §4.3).
    pub fn delete_source(&mut self, handle: i32) {
        if let Some(source) = self.sources.get_mut(&handle) {
            source.mark_deleted();
            self.lazy_deletion_queue.push_back(handle);
            self.mark_recent(RecentUnit::Source(handle));
        }
    }

    fn process_lazy_deletion_queue(&mut self, backend: &mut dyn AudioBackend) {
        while let Some(handle) = self.lazy_deletion_queue.pop_front() {
            if let Some(source) = self.sources.remove(&handle) {
                if let Err(e) = backend.delete_source(source.backend_id()) {
                    warn!("failed to delete renderer source for handle {}: {}", handle, e);
                }
            }
        }
    }

    pub fn play_source(&mut self, backend: &mut dyn AudioBackend, handle: i32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.play(backend))
    }

    pub fn stop_source(&mut self, backend: &mut dyn AudioBackend, handle: i32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.stop(backend))
    }

    pub fn pause_source(&mut self, backend: &mut dyn AudioBackend, handle: i32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.pause(backend))
    }

    pub fn set_source_playback_position(&mut self, backend: &mut dyn AudioBackend, handle: i32, seconds: f32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.set_playback_position(backend, seconds))
    }

    pub fn set_source_position(&mut self, backend: &mut dyn AudioBackend, handle: i32, x: f32, y: f32, z: f32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.set_position(backend, x, y, z))
    }

    pub fn set_source_gain(&mut self, backend: &mut dyn AudioBackend, handle: i32, gain: f32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.set_gain(backend, gain))
    }

    pub fn set_source_velocity(&mut self, backend: &mut dyn AudioBackend, handle: i32, x: f32, y: f32, z: f32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.set_velocity(backend, x, y, z))
    }

    /// 1-arg deprecated form: speed along the source's current facing
    /// direction (spec.md §4.1 SSVE). `direction` defaults to facing -Z
    /// when the source is omnidirectional, matching OpenAL's own default
    /// orientation.
    pub fn set_source_speed(&mut self, backend: &mut dyn AudioBackend, handle: i32, speed: f32) -> RenderResult<()> {
        let direction = match self.sources.get(&handle).map(|s| s.direction) {
            Some(crate::source::SourceDirection::Cartesian(x, y, z)) => (x, y, z),
            _ => (0.0, 0.0, -1.0),
        };
        let (dx, dy, dz) = direction;
        self.with_source(backend, handle, |source, backend| {
            source.set_velocity(backend, dx * speed, dy * speed, dz * speed)
        })
    }

    pub fn set_source_direction_cartesian(&mut self, backend: &mut dyn AudioBackend, handle: i32, x: f32, y: f32, z: f32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.set_direction_cartesian(backend, x, y, z))
    }

    pub fn set_source_direction_angle(&mut self, backend: &mut dyn AudioBackend, handle: i32, angle: f32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.set_direction_angle(backend, angle))
    }

    pub fn set_source_loop(&mut self, backend: &mut dyn AudioBackend, handle: i32, looping: bool) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| source.set_loop(backend, looping))
    }

    pub fn set_source_pitch(&mut self, backend: &mut dyn AudioBackend, handle: i32, pitch: f32) -> RenderResult<()> {
        if let Some(source) = self.sources.get_mut(&handle) {
            if source.state() == SourceState::Deleted {
                return Ok(());
            }
            if source.set_pitch(backend, pitch)? {
                self.recently_modified = Some(RecentUnit::Source(handle));
            }
        }
        Ok(())
    }

    pub fn set_source_fade(
        &mut self,
        backend: &mut dyn AudioBackend,
        handle: i32,
        now: Time,
        final_gain: f32,
        duration_secs: f32,
    ) -> RenderResult<()> {
        if duration_secs <= 0.0 {
            // A zero/negative-duration fade resolves to final_gain immediately,
            // per the fade law's end <= start case.
            return self.with_source(backend, handle, |source, backend| source.set_gain(backend, final_gain));
        }
        if let Some(source) = self.sources.get_mut(&handle) {
            if source.state() == SourceState::Deleted {
                return Ok(());
            }
            source.set_fade(now, final_gain, std::time::Duration::from_secs_f32(duration_secs));
            self.recently_modified = Some(RecentUnit::Source(handle));
        }
        Ok(())
    }

    pub fn set_source_param(&mut self, backend: &mut dyn AudioBackend, handle: i32, param: SourceParam, value: f32) -> RenderResult<()> {
        self.with_source(backend, handle, |source, backend| match param {
            SourceParam::Rolloff => source.set_rolloff(backend, value),
            SourceParam::ReferenceDistance => source.set_reference_distance(backend, value),
            SourceParam::ConeInnerAngle => source.set_cone_inner_angle(backend, value),
            SourceParam::ConeOuterAngle => source.set_cone_outer_angle(backend, value),
            SourceParam::ConeOuterGain => source.set_cone_outer_gain(backend, value),
        })
    }

    pub fn source_state_code(&self, handle: i32) -> i32 {
        state_code(self.sources.get(&handle).map(|s| s.state()))
    }

    pub fn set_default_rolloff_factor(&mut self, rolloff: f32) {
        self.default_rolloff = rolloff;
    }

    pub fn set_default_reference_distance(&mut self, distance: f32) {
        self.default_reference_distance = distance;
    }

    pub fn set_listener_gain(&mut self, backend: &mut dyn AudioBackend, gain: f32) -> RenderResult<()> {
        self.listener.set_gain(backend, gain)?;
        self.recently_modified = Some(RecentUnit::Listener);
        Ok(())
    }

    pub fn set_listener_position(&mut self, backend: &mut dyn AudioBackend, x: f32, y: f32, z: f32) -> RenderResult<()> {
        self.listener.set_position(backend, x, y, z)?;
        self.recently_modified = Some(RecentUnit::Listener);
        Ok(())
    }

    pub fn set_listener_velocity(&mut self, backend: &mut dyn AudioBackend, x: f32, y: f32, z: f32) -> RenderResult<()> {
        self.listener.set_velocity(backend, x, y, z)?;
        self.recently_modified = Some(RecentUnit::Listener);
        Ok(())
    }

    pub fn set_listener_orientation(&mut self, backend: &mut dyn AudioBackend, at: [f32; 3], up: [f32; 3]) -> RenderResult<()> {
        self.listener.set_orientation(backend, at, up)?;
        self.recently_modified = Some(RecentUnit::Listener);
        Ok(())
    }

    pub fn set_global_rendering_parameter(&mut self, backend: &mut dyn AudioBackend, param: GlobalParam, value: f32) -> RenderResult<()> {
        match param {
            GlobalParam::SpeedOfSound => self.listener.set_speed_of_sound(backend, value)?,
            GlobalParam::DopplerFactor => self.listener.set_doppler_factor(backend, value)?,
            GlobalParam::DefaultRolloff => self.set_default_rolloff_factor(value),
            GlobalParam::DefaultReferenceDistance => self.set_default_reference_distance(value),
        }
        self.recently_modified = Some(RecentUnit::Listener);
        Ok(())
    }

    /// Applies `f` to the source for `handle`, unless the handle is unknown
    /// or already DELETED — deletion is terminal, so any operation on a
    /// deleted handle is a silent no-op (spec.md §3, §4.2), even while the
    /// source is still sitting in the lazy deletion queue.
    fn with_source<F>(&mut self, backend: &mut dyn AudioBackend, handle: i32, f: F) -> RenderResult<()>
    where
        F: FnOnce(&mut AudioSource, &mut dyn AudioBackend) -> RenderResult<()>,
    {
        if let Some(source) = self.sources.get_mut(&handle) {
            if source.state() == SourceState::Deleted {
                return Ok(());
            }
            f(source, backend)?;
            self.recently_modified = Some(RecentUnit::Source(handle));
        }
        Ok(())
    }

    /// Advances every source's fade/playback-completion state and drains
    /// the lazy deletion queue (spec.md §4.4, §4.6's `updateSources`).
    pub fn update_sources(&mut self, backend: &mut dyn AudioBackend, now: Time) {
        for source in self.sources.values_mut() {
            if let Err(e) = source.update(backend, now, false) {
                warn!("failed to update source {}: {}", source.handle, e);
            }
        }
        self.process_lazy_deletion_queue(backend);
    }

    /// Deletes all sources and buffers; used on QUIT before reinitializing
    /// and on shutdown (spec.md §4.3 "Release").
    pub fn release(&mut self, backend: &mut dyn AudioBackend) {
        for (_, source) in std::mem::take(&mut self.sources) {
            if let Err(e) = backend.delete_source(source.backend_id()) {
                warn!("failed to delete source during release: {}", e);
            }
        }
        self.lazy_deletion_queue.clear();
        self.buffers = BufferMap::new();
        self.recently_modified = None;
    }
}

impl Default for AudioHandler {
    fn default() -> AudioHandler {
        AudioHandler::new()
    }
}

fn bytes_to_i16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn synthesize_waveform(shape: WaveShape, frequency: f32, phase_degrees: f32, duration: f32) -> Vec<i16> {
    let sample_count = ((duration.max(0.0)) * SAMPLE_RATE_HZ as f32) as usize;
    let phase = phase_degrees.to_radians();

    (0..sample_count)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE_HZ as f32;
            let angle = 2.0 * std::f32::consts::PI * frequency * t + phase;
            let amplitude = match shape {
                WaveShape::Sine => angle.sin(),
                WaveShape::Square => {
                    if angle.sin() >= 0.0 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                WaveShape::Sawtooth => {
                    let cycle = (t * frequency + phase_degrees / 360.0).fract();
                    2.0 * cycle - 1.0
                }
                WaveShape::Whitenoise => pseudo_random(i),
                WaveShape::Impulse => {
                    if i == 0 {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            (amplitude * i16::MAX as f32) as i16
        })
        .collect()
}

/// Deterministic placeholder noise source; avoids pulling in a `rand`
/// dependency for a single waveform shape.
fn pseudo_random(seed: usize) -> f32 {
    let x = (seed as u32).wrapping_mul(2654435761);
    let x = x ^ (x >> 15);
    (x % 2000) as f32 / 1000.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_handler::FileHandler;
    use crate::render::MockAudioBackend;
    use tempfile::tempdir;

    #[test]
    fn handle_allocation_is_monotonic() {
        let mut backend = MockAudioBackend::new();
        backend.expect_create_buffer().returning(|_, _| Ok(crate::render::BackendBufferId(1)));
        backend.expect_create_source().returning(|_| Ok(crate::render::BackendSourceId(1)));

        let mut handler = AudioHandler::new();
        let h1 = handler
            .create_source_from_waveform(&mut backend, 1, 440.0, 0.0, 0.1)
            .unwrap()
            .unwrap();
        let h2 = handler
            .create_source_from_waveform(&mut backend, 1, 440.0, 0.0, 0.1)
            .unwrap()
            .unwrap();
        assert!(h2 > h1);
    }

    #[test]
    fn missing_file_returns_none_not_error() {
        let dir = tempdir().unwrap();
        let files = FileHandler::new(dir.path()).unwrap();
        let mut backend = MockAudioBackend::new();
        let mut handler = AudioHandler::new();

        let result = handler
            .create_source_from_filename(&mut backend, &files, "nope.wav")
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn buffer_is_interned_across_sources() {
        std::fs::write(tempdir().unwrap().path().join("x"), b"").ok();
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ding.wav"), vec![0u8; 8]).unwrap();
        let files = FileHandler::new(dir.path()).unwrap();

        let mut backend = MockAudioBackend::new();
        backend.expect_create_buffer().times(1).returning(|_, _| Ok(crate::render::BackendBufferId(9)));
        backend.expect_create_source().returning(|_| Ok(crate::render::BackendSourceId(1)));

        let mut handler = AudioHandler::new();
        let h1 = handler.create_source_from_filename(&mut backend, &files, "ding.wav").unwrap().unwrap();
        let h2 = handler.create_source_from_filename(&mut backend, &files, "ding.wav").unwrap().unwrap();
        assert_ne!(h1, h2);
        assert_eq!(handler.source(h1).unwrap().buffer, handler.source(h2).unwrap().buffer);
    }

    #[test]
    fn deleted_source_state_code_is_five() {
        let mut backend = MockAudioBackend::new();
        backend.expect_create_buffer().returning(|_, _| Ok(crate::render::BackendBufferId(1)));
        backend.expect_create_source().returning(|_| Ok(crate::render::BackendSourceId(1)));
        backend.expect_delete_source().returning(|_| Ok(()));

        let mut handler = AudioHandler::new();
        let handle = handler.create_source_from_waveform(&mut backend, 1, 440.0, 0.0, 0.1).unwrap().unwrap();
        handler.delete_source(handle);
        assert_eq!(handler.source_state_code(handle), 5);

        handler.update_sources(&mut backend, Time::now());
        assert!(handler.source(handle).is_none());
    }

    #[test]
    fn play_after_rhdl_in_the_same_batch_does_not_resurrect_the_source() {
        // The source is only actually removed when update_sources() drains
        // the lazy deletion queue, which does not happen for a batch of
        // messages dispatched back-to-back (e.g. client pipelines RHDL then
        // PLAY). Operations in that window must still be silent no-ops.
        let mut backend = MockAudioBackend::new();
        backend.expect_create_buffer().returning(|_, _| Ok(crate::render::BackendBufferId(1)));
        backend.expect_create_source().returning(|_| Ok(crate::render::BackendSourceId(1)));

        let mut handler = AudioHandler::new();
        let handle = handler.create_source_from_waveform(&mut backend, 1, 440.0, 0.0, 0.1).unwrap().unwrap();
        handler.delete_source(handle);

        handler.play_source(&mut backend, handle).unwrap();
        assert_eq!(handler.source_state_code(handle), 5);
        assert_eq!(handler.take_recently_modified(), None);

        handler.set_source_gain(&mut backend, handle, 0.5).unwrap();
        assert_eq!(handler.source(handle).unwrap().gain, crate::source::DEFAULT_GAIN);

        handler.set_source_fade(&mut backend, handle, Time::now(), 0.0, 1.0).unwrap();
        assert!(handler.source(handle).unwrap().fade.is_none());
    }

    #[test]
    fn unknown_handle_operations_are_silent_no_ops() {
        let mut backend = MockAudioBackend::new();
        let mut handler = AudioHandler::new();
        handler.set_source_gain(&mut backend, 999, 0.5).unwrap();
        assert_eq!(handler.take_recently_modified(), None);
    }
}
