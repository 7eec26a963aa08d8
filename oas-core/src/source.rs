//! Per-source state machine, parameters, and fade plan (spec.md §4.2, §4.4).
//! Grounded on `OASAudioSource.h`'s `SourceState` enum and property set.

use crate::render::{AudioBackend, BackendBufferId, BackendSourceId, PlaybackState, RenderResult};
use crate::time::Time;

use std::time::Duration;

pub const DEFAULT_CONE_INNER_ANGLE: f32 = 45.0;
pub const DEFAULT_CONE_OUTER_ANGLE: f32 = 180.0;
pub const DEFAULT_CONE_OUTER_GAIN: f32 = 0.0;
pub const DEFAULT_PITCH: f32 = 1.0;
pub const DEFAULT_GAIN: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
    Deleted,
}

impl From<PlaybackState> for SourceState {
    fn from(state: PlaybackState) -> SourceState {
        match state {
            PlaybackState::Initial => SourceState::Initial,
            PlaybackState::Playing => SourceState::Playing,
            PlaybackState::Paused => SourceState::Paused,
            PlaybackState::Stopped => SourceState::Stopped,
        }
    }
}

/// A linear gain interpolation in progress. `gain_at` and `is_active` are
/// the two operations the fade scheduler (spec.md §4.4) and `getGain()`
/// both rely on; the interpolation always happens in Rust rather than being
/// delegated to the renderer, so queries mid-fade are always correct (see
/// spec.md's "Fade implementation in two variants" note).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadePlan {
    pub initial_gain: f32,
    pub final_gain: f32,
    pub start: Time,
    pub end: Time,
}

impl FadePlan {
    pub fn new(initial_gain: f32, final_gain: f32, now: Time, duration: Duration) -> FadePlan {
        FadePlan { initial_gain, final_gain, start: now, end: now + duration }
    }

    pub fn is_active(&self, now: Time) -> bool {
        self.end > self.start && now <= self.end
    }

    /// Interpolated gain at `now`. Callers must check `is_active` first if
    /// they care about distinguishing "still fading" from "fade is over";
    /// this simply clamps to `final_gain` once `now` passes `end`.
    pub fn gain_at(&self, now: Time) -> f32 {
        if now >= self.end {
            return self.final_gain;
        }

        let elapsed = now.duration_since(self.start).as_secs_f64();
        let total = self.end.duration_since(self.start).as_secs_f64();
        if total <= 0.0 {
            return self.final_gain;
        }

        let fraction = (elapsed / total).clamp(0.0, 1.0) as f32;
        self.initial_gain + fraction * (self.final_gain - self.initial_gain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceDirection {
    Omnidirectional,
    Cartesian(f32, f32, f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub handle: i32,
    backend_id: BackendSourceId,
    pub buffer: BackendBufferId,
    state: SourceState,

    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub direction: SourceDirection,

    pub gain: f32,
    pub pitch: f32,
    pub looping: bool,
    pub rolloff: f32,
    pub reference_distance: f32,
    pub cone_inner_angle: f32,
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,

    pub fade: Option<FadePlan>,
}

impl AudioSource {
    pub fn new(
        handle: i32,
        backend_id: BackendSourceId,
        buffer: BackendBufferId,
        default_rolloff: f32,
        default_reference_distance: f32,
    ) -> AudioSource {
        AudioSource {
            handle,
            backend_id,
            buffer,
            state: SourceState::Initial,
            position: [0.0, 0.0, 0.0],
            velocity: [0.0, 0.0, 0.0],
            direction: SourceDirection::Omnidirectional,
            gain: DEFAULT_GAIN,
            pitch: DEFAULT_PITCH,
            looping: false,
            rolloff: default_rolloff,
            reference_distance: default_reference_distance,
            cone_inner_angle: DEFAULT_CONE_INNER_ANGLE,
            cone_outer_angle: DEFAULT_CONE_OUTER_ANGLE,
            cone_outer_gain: DEFAULT_CONE_OUTER_GAIN,
            fade: None,
        }
    }

    pub fn backend_id(&self) -> BackendSourceId {
        self.backend_id
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Current effective gain, accounting for an in-flight fade. This is
    /// what `STAT`/`GAIN`-style queries must read, not the raw `self.gain`
    /// field mutated by backend round trips.
    pub fn current_gain(&self, now: Time) -> f32 {
        match self.fade {
            Some(plan) if plan.is_active(now) => plan.gain_at(now),
            _ => self.gain,
        }
    }

    pub fn play(&mut self, backend: &mut dyn AudioBackend) -> RenderResult<()> {
        backend.play(self.backend_id)?;
        self.state = SourceState::Playing;
        Ok(())
    }

    pub fn stop(&mut self, backend: &mut dyn AudioBackend) -> RenderResult<()> {
        backend.stop(self.backend_id)?;
        self.state = SourceState::Stopped;
        Ok(())
    }

    pub fn pause(&mut self, backend: &mut dyn AudioBackend) -> RenderResult<()> {
        backend.pause(self.backend_id)?;
        self.state = SourceState::Paused;
        Ok(())
    }

    pub fn set_playback_position(&mut self, backend: &mut dyn AudioBackend, seconds: f32) -> RenderResult<()> {
        // Out-of-bounds seek is a silent no-op per spec.md §4.2; the
        // renderer is the source of truth on what's in-bounds, so we just
        // forward and swallow an invalid-value style failure upstream at
        // the handler layer instead of here.
        backend.set_playback_position(self.backend_id, seconds)
    }

    pub fn set_gain(&mut self, backend: &mut dyn AudioBackend, gain: f32) -> RenderResult<()> {
        backend.set_gain(self.backend_id, gain)?;
        self.gain = gain;
        self.fade = None;
        Ok(())
    }

    pub fn set_position(&mut self, backend: &mut dyn AudioBackend, x: f32, y: f32, z: f32) -> RenderResult<()> {
        backend.set_position(self.backend_id, x, y, z)?;
        self.position = [x, y, z];
        Ok(())
    }

    pub fn set_velocity(&mut self, backend: &mut dyn AudioBackend, x: f32, y: f32, z: f32) -> RenderResult<()> {
        backend.set_velocity(self.backend_id, x, y, z)?;
        self.velocity = [x, y, z];
        Ok(())
    }

    /// `(0,0,0)` means omnidirectional; any other vector makes the source
    /// directional (spec.md §4.2).
    pub fn set_direction_cartesian(&mut self, backend: &mut dyn AudioBackend, x: f32, y: f32, z: f32) -> RenderResult<()> {
        backend.set_direction(self.backend_id, x, y, z)?;
        self.direction = if (x, y, z) == (0.0, 0.0, 0.0) {
            SourceDirection::Omnidirectional
        } else {
            SourceDirection::Cartesian(x, y, z)
        };
        Ok(())
    }

    /// Legacy single-angle form, radians in the X-Z plane (spec.md §4.1,
    /// §5 inconsistency note).
    pub fn set_direction_angle(&mut self, backend: &mut dyn AudioBackend, angle_radians: f32) -> RenderResult<()> {
        let x = angle_radians.sin();
        let z = angle_radians.cos();
        self.set_direction_cartesian(backend, x, 0.0, z)
    }

    pub fn set_loop(&mut self, backend: &mut dyn AudioBackend, looping: bool) -> RenderResult<()> {
        backend.set_looping(self.backend_id, looping)?;
        self.looping = looping;
        Ok(())
    }

    /// Rejects `pitch <= 0` per spec.md §4.2 edge cases, without touching
    /// the backend or cached state.
    pub fn set_pitch(&mut self, backend: &mut dyn AudioBackend, pitch: f32) -> RenderResult<bool> {
        if pitch <= 0.0 {
            return Ok(false);
        }
        backend.set_pitch(self.backend_id, pitch)?;
        self.pitch = pitch;
        Ok(true)
    }

    pub fn set_rolloff(&mut self, backend: &mut dyn AudioBackend, rolloff: f32) -> RenderResult<()> {
        backend.set_rolloff(self.backend_id, rolloff)?;
        self.rolloff = rolloff;
        Ok(())
    }

    pub fn set_reference_distance(&mut self, backend: &mut dyn AudioBackend, distance: f32) -> RenderResult<()> {
        backend.set_reference_distance(self.backend_id, distance)?;
        self.reference_distance = distance;
        Ok(())
    }

    pub fn set_cone_inner_angle(&mut self, backend: &mut dyn AudioBackend, degrees: f32) -> RenderResult<()> {
        backend.set_cone_inner_angle(self.backend_id, degrees)?;
        self.cone_inner_angle = degrees;
        Ok(())
    }

    pub fn set_cone_outer_angle(&mut self, backend: &mut dyn AudioBackend, degrees: f32) -> RenderResult<()> {
        backend.set_cone_outer_angle(self.backend_id, degrees)?;
        self.cone_outer_angle = degrees;
        Ok(())
    }

    pub fn set_cone_outer_gain(&mut self, backend: &mut dyn AudioBackend, gain: f32) -> RenderResult<()> {
        backend.set_cone_outer_gain(self.backend_id, gain)?;
        self.cone_outer_gain = gain;
        Ok(())
    }

    /// Records a new fade plan, continuous with whatever fade (if any) was
    /// already in flight: the new plan's `initial_gain` is the *current
    /// interpolated* gain at `now`, per spec.md §4.4 point 5.
    pub fn set_fade(&mut self, now: Time, final_gain: f32, duration: Duration) {
        let initial_gain = self.current_gain(now);
        self.fade = Some(FadePlan::new(initial_gain, final_gain, now, duration));
    }

    /// Advances the fade plan and, if `force_update` or the source is
    /// playing, refreshes cached state from the renderer's own playback
    /// state (spec.md §4.2's `update(forceUpdate)`). Returns true iff
    /// something observable changed.
    pub fn update(&mut self, backend: &mut dyn AudioBackend, now: Time, force_update: bool) -> RenderResult<bool> {
        let mut changed = false;

        if let Some(plan) = self.fade {
            if plan.is_active(now) {
                let gain = plan.gain_at(now);
                backend.set_gain(self.backend_id, gain)?;
                self.gain = gain;
                changed = true;
            } else {
                backend.set_gain(self.backend_id, plan.final_gain)?;
                self.gain = plan.final_gain;
                self.fade = None;
                changed = true;
            }
        }

        if force_update || self.state == SourceState::Playing {
            let backend_state = SourceState::from(backend.state(self.backend_id)?);
            if backend_state != self.state {
                self.state = backend_state;
                changed = true;
            }
        }

        Ok(changed)
    }

    pub fn mark_deleted(&mut self) {
        self.state = SourceState::Deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MockAudioBackend;

    fn source() -> AudioSource {
        AudioSource::new(1, BackendSourceId(1), BackendBufferId(1), 1.0, 1.0)
    }

    #[test]
    fn pitch_at_or_below_zero_is_rejected() {
        let mut backend = MockAudioBackend::new();
        let mut src = source();
        assert_eq!(src.set_pitch(&mut backend, 0.0).unwrap(), false);
        assert_eq!(src.set_pitch(&mut backend, -1.0).unwrap(), false);
        assert_eq!(src.pitch, DEFAULT_PITCH);
    }

    #[test]
    fn positive_pitch_is_forwarded_and_cached() {
        let mut backend = MockAudioBackend::new();
        backend.expect_set_pitch().returning(|_, _| Ok(()));
        let mut src = source();
        assert!(src.set_pitch(&mut backend, 2.0).unwrap());
        assert_eq!(src.pitch, 2.0);
    }

    #[test]
    fn zero_vector_direction_is_omnidirectional() {
        let mut backend = MockAudioBackend::new();
        backend.expect_set_direction().returning(|_, _, _, _| Ok(()));
        let mut src = source();
        src.set_direction_cartesian(&mut backend, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(src.direction, SourceDirection::Cartesian(1.0, 0.0, 0.0));
        src.set_direction_cartesian(&mut backend, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(src.direction, SourceDirection::Omnidirectional);
    }

    #[test]
    fn fade_interpolates_linearly() {
        let t0 = Time::from_secs_f64(0.0);
        let plan = FadePlan::new(1.0, 0.0, t0, Duration::from_secs(2));
        let mid = t0 + Duration::from_secs(1);
        assert!((plan.gain_at(mid) - 0.5).abs() < 1e-3);
        assert!(plan.is_active(mid));

        let done = t0 + Duration::from_secs(3);
        assert_eq!(plan.gain_at(done), 0.0);
        assert!(!plan.is_active(done));
    }

    #[test]
    fn rescheduling_a_fade_is_continuous() {
        let t0 = Time::from_secs_f64(0.0);
        let mut src = source();
        src.set_fade(t0, 0.0, Duration::from_secs(2));

        let mid = t0 + Duration::from_secs(1);
        let gain_before_reschedule = src.current_gain(mid);
        assert!((gain_before_reschedule - 0.5).abs() < 1e-3);

        src.set_fade(mid, 1.0, Duration::from_secs(1));
        assert!((src.current_gain(mid) - gain_before_reschedule).abs() < 1e-6);
    }

    #[test]
    fn update_advances_fade_and_clears_when_done() {
        let mut backend = MockAudioBackend::new();
        backend.expect_set_gain().returning(|_, _| Ok(()));

        let t0 = Time::from_secs_f64(0.0);
        let mut src = source();
        src.set_fade(t0, 0.0, Duration::from_secs(1));

        let after = t0 + Duration::from_secs(2);
        let changed = src.update(&mut backend, after, false).unwrap();
        assert!(changed);
        assert!(src.fade.is_none());
        assert_eq!(src.gain, 0.0);
    }
}
