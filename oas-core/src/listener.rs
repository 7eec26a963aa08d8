//! The single audio listener (the "ears" in the scene). Grounded on
//! `OASAudioListener.h`: one instance per server, gain/position/velocity
//! plus an orientation pair (look-at and up vectors) and the two
//! doppler-related globals.

use crate::render::AudioBackend;

/// Speed of sound through air in meters/second, matching the original
/// server's documented default.
pub const DEFAULT_SPEED_OF_SOUND: f32 = 343.3;
pub const DEFAULT_DOPPLER_FACTOR: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioListener {
    pub gain: f32,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub orientation_at: [f32; 3],
    pub orientation_up: [f32; 3],
    pub speed_of_sound: f32,
    pub doppler_factor: f32,
}

impl Default for AudioListener {
    fn default() -> AudioListener {
        AudioListener {
            gain: 1.0,
            position: [0.0, 0.0, 0.0],
            velocity: [0.0, 0.0, 0.0],
            orientation_at: [0.0, 0.0, -1.0],
            orientation_up: [0.0, 1.0, 0.0],
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
            doppler_factor: DEFAULT_DOPPLER_FACTOR,
        }
    }
}

impl AudioListener {
    pub fn set_gain(&mut self, backend: &mut dyn AudioBackend, gain: f32) -> crate::render::RenderResult<()> {
        backend.set_listener_gain(gain)?;
        self.gain = gain;
        Ok(())
    }

    pub fn set_position(
        &mut self,
        backend: &mut dyn AudioBackend,
        x: f32,
        y: f32,
        z: f32,
    ) -> crate::render::RenderResult<()> {
        backend.set_listener_position(x, y, z)?;
        self.position = [x, y, z];
        Ok(())
    }

    pub fn set_velocity(
        &mut self,
        backend: &mut dyn AudioBackend,
        x: f32,
        y: f32,
        z: f32,
    ) -> crate::render::RenderResult<()> {
        backend.set_listener_velocity(x, y, z)?;
        self.velocity = [x, y, z];
        Ok(())
    }

    pub fn set_orientation(
        &mut self,
        backend: &mut dyn AudioBackend,
        at: [f32; 3],
        up: [f32; 3],
    ) -> crate::render::RenderResult<()> {
        backend.set_listener_orientation(at, up)?;
        self.orientation_at = at;
        self.orientation_up = up;
        Ok(())
    }

    pub fn set_speed_of_sound(&mut self, backend: &mut dyn AudioBackend, speed: f32) -> crate::render::RenderResult<()> {
        backend.set_speed_of_sound(speed)?;
        self.speed_of_sound = speed;
        Ok(())
    }

    pub fn set_doppler_factor(&mut self, backend: &mut dyn AudioBackend, factor: f32) -> crate::render::RenderResult<()> {
        backend.set_doppler_factor(factor)?;
        self.doppler_factor = factor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MockAudioBackend;

    #[test]
    fn defaults_match_original_server() {
        let listener = AudioListener::default();
        assert_eq!(listener.gain, 1.0);
        assert_eq!(listener.speed_of_sound, 343.3);
        assert_eq!(listener.doppler_factor, 1.0);
    }

    #[test]
    fn set_position_updates_state_and_backend() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_set_listener_position()
            .withf(|x, y, z| (*x, *y, *z) == (1.0, 2.0, 3.0))
            .returning(|_, _, _| Ok(()));

        let mut listener = AudioListener::default();
        listener.set_position(&mut backend, 1.0, 2.0, 3.0).unwrap();
        assert_eq!(listener.position, [1.0, 2.0, 3.0]);
    }
}
