//! Abstraction over the audio rendering library.
//!
//! The spec treats the actual 3D audio renderer as an opaque external
//! collaborator (Non-goal: "implementing a software audio renderer").
//! [`AudioBackend`] is the seam: [`AudioHandler`](crate::audio_handler::AudioHandler)
//! drives playback state purely in terms of this trait, and [`OpenAlBackend`]
//! is the one real implementation, wrapping `openal-sys` the way the
//! teacher's `AudioManager`/`OalSource` wrap it for streaming playback. Tests
//! substitute `MockAudioBackend` instead of touching a real OpenAL device.

use log::{debug, error};
use openal_sys as oal;
use thiserror::Error;

use std::ptr::NonNull;

#[derive(Error, Debug, Eq, PartialEq, Clone, Copy)]
pub enum RenderError {
    #[error("invalid name")]
    InvalidName,
    #[error("invalid enum")]
    InvalidEnum,
    #[error("invalid value")]
    InvalidValue,
    #[error("invalid operation")]
    InvalidOperation,
    #[error("out of memory")]
    OutOfMemory,
    #[error("unknown renderer error")]
    Unknown,
    #[error("failed to open audio device")]
    DeviceOpenFailed,
    #[error("failed to create audio context")]
    ContextCreateFailed,
    #[error("renderer already constructed")]
    AlreadyConstructed,
}

impl From<u32> for RenderError {
    fn from(err: u32) -> RenderError {
        match err {
            oal::AL_INVALID_NAME => RenderError::InvalidName,
            oal::AL_INVALID_ENUM => RenderError::InvalidEnum,
            oal::AL_INVALID_VALUE => RenderError::InvalidValue,
            oal::AL_INVALID_OPERATION => RenderError::InvalidOperation,
            oal::AL_OUT_OF_MEMORY => RenderError::OutOfMemory,
            _ => RenderError::Unknown,
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Backend-assigned identifier for a playable source, opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendSourceId(pub u32);

/// Backend-assigned identifier for a decoded sample buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendBufferId(pub u32);

/// Raw PCM data to hand the renderer, already decoded by the caller.
#[derive(Debug, Clone)]
pub enum SampleData {
    Mono8(Vec<i8>),
    Mono16(Vec<i16>),
    Stereo8(Vec<i8>),
    Stereo16(Vec<i16>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Everything `AudioHandler` needs from the rendering library. Mirrors the
/// subset of OpenAL source/listener/context state the original C++ server
/// exposes over the wire (spec.md §4.2, §4.4).
#[cfg_attr(test, mockall::automock)]
pub trait AudioBackend {
    fn create_buffer(&mut self, data: &SampleData, sample_rate: i32) -> RenderResult<BackendBufferId>;
    fn delete_buffer(&mut self, buffer: BackendBufferId) -> RenderResult<()>;

    fn create_source(&mut self, buffer: BackendBufferId) -> RenderResult<BackendSourceId>;
    fn delete_source(&mut self, source: BackendSourceId) -> RenderResult<()>;

    fn play(&mut self, source: BackendSourceId) -> RenderResult<()>;
    fn stop(&mut self, source: BackendSourceId) -> RenderResult<()>;
    fn pause(&mut self, source: BackendSourceId) -> RenderResult<()>;
    fn state(&mut self, source: BackendSourceId) -> RenderResult<PlaybackState>;

    fn set_playback_position(&mut self, source: BackendSourceId, seconds: f32) -> RenderResult<()>;
    fn set_gain(&mut self, source: BackendSourceId, gain: f32) -> RenderResult<()>;
    fn set_position(&mut self, source: BackendSourceId, x: f32, y: f32, z: f32) -> RenderResult<()>;
    fn set_velocity(&mut self, source: BackendSourceId, x: f32, y: f32, z: f32) -> RenderResult<()>;
    fn set_direction(&mut self, source: BackendSourceId, x: f32, y: f32, z: f32) -> RenderResult<()>;
    fn set_looping(&mut self, source: BackendSourceId, looping: bool) -> RenderResult<()>;
    fn set_pitch(&mut self, source: BackendSourceId, pitch: f32) -> RenderResult<()>;
    fn set_rolloff(&mut self, source: BackendSourceId, rolloff: f32) -> RenderResult<()>;
    fn set_reference_distance(&mut self, source: BackendSourceId, distance: f32) -> RenderResult<()>;
    fn set_cone_inner_angle(&mut self, source: BackendSourceId, degrees: f32) -> RenderResult<()>;
    fn set_cone_outer_angle(&mut self, source: BackendSourceId, degrees: f32) -> RenderResult<()>;
    fn set_cone_outer_gain(&mut self, source: BackendSourceId, gain: f32) -> RenderResult<()>;

    fn set_listener_gain(&mut self, gain: f32) -> RenderResult<()>;
    fn set_listener_position(&mut self, x: f32, y: f32, z: f32) -> RenderResult<()>;
    fn set_listener_velocity(&mut self, x: f32, y: f32, z: f32) -> RenderResult<()>;
    fn set_listener_orientation(&mut self, at: [f32; 3], up: [f32; 3]) -> RenderResult<()>;

    fn set_speed_of_sound(&mut self, speed: f32) -> RenderResult<()>;
    fn set_doppler_factor(&mut self, factor: f32) -> RenderResult<()>;
}

/// Discards any pending error so the next `check()` reflects only the call
/// that follows, per the clear-before-each-call discipline in
/// `OASAudioSource::_clearError()`.
fn clear_error() {
    unsafe {
        oal::alGetError();
    }
}

fn check() -> RenderResult<()> {
    unsafe {
        let err = oal::alGetError() as u32;
        if err == oal::AL_NO_ERROR {
            Ok(())
        } else {
            Err(RenderError::from(err))
        }
    }
}

/// Real OpenAL-backed renderer. One source == one OpenAL source with a
/// single attached buffer, matching spec.md's "play this whole file"
/// model rather than the teacher's chunked-streaming model.
pub struct OpenAlBackend {
    device_handle: NonNull<oal::ALCdevice>,
    alc_context: NonNull<oal::ALCcontext>,
}

impl OpenAlBackend {
    pub fn new(device_name: Option<&str>) -> RenderResult<OpenAlBackend> {
        unsafe {
            clear_error();

            let device_ptr = match device_name {
                Some(name) => {
                    let cname = std::ffi::CString::new(name).map_err(|_| RenderError::InvalidValue)?;
                    oal::alcOpenDevice(cname.as_ptr())
                }
                None => oal::alcOpenDevice(std::ptr::null()),
            };

            let device_handle = NonNull::new(device_ptr).ok_or(RenderError::DeviceOpenFailed)?;

            let alc_context = oal::alcCreateContext(device_handle.as_ptr(), std::ptr::null());
            oal::alcMakeContextCurrent(alc_context);
            check()?;

            let alc_context = NonNull::new(alc_context).ok_or(RenderError::ContextCreateFailed)?;

            debug!("opened OpenAL device and context");

            Ok(OpenAlBackend { device_handle, alc_context })
        }
    }

    fn sample_format(data: &SampleData) -> i32 {
        (match data {
            SampleData::Mono8(_) => oal::AL_FORMAT_MONO8,
            SampleData::Mono16(_) => oal::AL_FORMAT_MONO16,
            SampleData::Stereo8(_) => oal::AL_FORMAT_STEREO8,
            SampleData::Stereo16(_) => oal::AL_FORMAT_STEREO16,
        }) as i32
    }
}

impl AudioBackend for OpenAlBackend {
    fn create_buffer(&mut self, data: &SampleData, sample_rate: i32) -> RenderResult<BackendBufferId> {
        unsafe {
            clear_error();
            let mut buffer = 0u32;
            oal::alGenBuffers(1, &mut buffer);
            check()?;

            let (ptr, len) = match data {
                SampleData::Mono8(v) => (v.as_ptr() as *const std::ffi::c_void, v.len()),
                SampleData::Mono16(v) => (v.as_ptr() as *const std::ffi::c_void, v.len() * 2),
                SampleData::Stereo8(v) => (v.as_ptr() as *const std::ffi::c_void, v.len()),
                SampleData::Stereo16(v) => (v.as_ptr() as *const std::ffi::c_void, v.len() * 2),
            };

            oal::alBufferData(buffer, Self::sample_format(data), ptr, len as i32, sample_rate);
            check()?;

            Ok(BackendBufferId(buffer))
        }
    }

    fn delete_buffer(&mut self, buffer: BackendBufferId) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alDeleteBuffers(1, &buffer.0);
            check()
        }
    }

    fn create_source(&mut self, buffer: BackendBufferId) -> RenderResult<BackendSourceId> {
        unsafe {
            clear_error();
            let mut source = 0u32;
            oal::alGenSources(1, &mut source);
            check()?;
            oal::alSourcei(source, oal::AL_BUFFER as i32, buffer.0 as i32);
            check()?;
            Ok(BackendSourceId(source))
        }
    }

    fn delete_source(&mut self, source: BackendSourceId) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alDeleteSources(1, &source.0);
            check()
        }
    }

    fn play(&mut self, source: BackendSourceId) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcePlay(source.0);
            check()
        }
    }

    fn stop(&mut self, source: BackendSourceId) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourceStop(source.0);
            check()
        }
    }

    fn pause(&mut self, source: BackendSourceId) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcePause(source.0);
            check()
        }
    }

    fn state(&mut self, source: BackendSourceId) -> RenderResult<PlaybackState> {
        unsafe {
            clear_error();
            let mut state = oal::AL_INITIAL as i32;
            oal::alGetSourcei(source.0, oal::AL_SOURCE_STATE as i32, &mut state);
            check()?;

            let state = state as u32;
            Ok(if state == oal::AL_PLAYING {
                PlaybackState::Playing
            } else if state == oal::AL_PAUSED {
                PlaybackState::Paused
            } else if state == oal::AL_STOPPED {
                PlaybackState::Stopped
            } else {
                PlaybackState::Initial
            })
        }
    }

    fn set_playback_position(&mut self, source: BackendSourceId, seconds: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_SEC_OFFSET as i32, seconds);
            check()
        }
    }

    fn set_gain(&mut self, source: BackendSourceId, gain: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_GAIN as i32, gain);
            check()
        }
    }

    fn set_position(&mut self, source: BackendSourceId, x: f32, y: f32, z: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSource3f(source.0, oal::AL_POSITION as i32, x, y, z);
            check()
        }
    }

    fn set_velocity(&mut self, source: BackendSourceId, x: f32, y: f32, z: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSource3f(source.0, oal::AL_VELOCITY as i32, x, y, z);
            check()
        }
    }

    fn set_direction(&mut self, source: BackendSourceId, x: f32, y: f32, z: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSource3f(source.0, oal::AL_DIRECTION as i32, x, y, z);
            check()
        }
    }

    fn set_looping(&mut self, source: BackendSourceId, looping: bool) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcei(source.0, oal::AL_LOOPING as i32, looping as i32);
            check()
        }
    }

    fn set_pitch(&mut self, source: BackendSourceId, pitch: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_PITCH as i32, pitch);
            check()
        }
    }

    fn set_rolloff(&mut self, source: BackendSourceId, rolloff: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_ROLLOFF_FACTOR as i32, rolloff);
            check()
        }
    }

    fn set_reference_distance(&mut self, source: BackendSourceId, distance: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_REFERENCE_DISTANCE as i32, distance);
            check()
        }
    }

    fn set_cone_inner_angle(&mut self, source: BackendSourceId, degrees: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_CONE_INNER_ANGLE as i32, degrees);
            check()
        }
    }

    fn set_cone_outer_angle(&mut self, source: BackendSourceId, degrees: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_CONE_OUTER_ANGLE as i32, degrees);
            check()
        }
    }

    fn set_cone_outer_gain(&mut self, source: BackendSourceId, gain: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSourcef(source.0, oal::AL_CONE_OUTER_GAIN as i32, gain);
            check()
        }
    }

    fn set_listener_gain(&mut self, gain: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alListenerf(oal::AL_GAIN as i32, gain);
            check()
        }
    }

    fn set_listener_position(&mut self, x: f32, y: f32, z: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alListener3f(oal::AL_POSITION as i32, x, y, z);
            check()
        }
    }

    fn set_listener_velocity(&mut self, x: f32, y: f32, z: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alListener3f(oal::AL_VELOCITY as i32, x, y, z);
            check()
        }
    }

    fn set_listener_orientation(&mut self, at: [f32; 3], up: [f32; 3]) -> RenderResult<()> {
        unsafe {
            clear_error();
            let orientation = [at[0], at[1], at[2], up[0], up[1], up[2]];
            oal::alListenerfv(oal::AL_ORIENTATION as i32, orientation.as_ptr());
            check()
        }
    }

    fn set_speed_of_sound(&mut self, speed: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alSpeedOfSound(speed);
            check()
        }
    }

    fn set_doppler_factor(&mut self, factor: f32) -> RenderResult<()> {
        unsafe {
            clear_error();
            oal::alDopplerFactor(factor);
            check()
        }
    }
}

impl Drop for OpenAlBackend {
    fn drop(&mut self) {
        unsafe {
            oal::alcMakeContextCurrent(std::ptr::null_mut());
            oal::alcDestroyContext(self.alc_context.as_ptr());
            if oal::alcCloseDevice(self.device_handle.as_ptr()) == 0 {
                error!("failed to close OpenAL device cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oal_error_conversion_maps_known_codes() {
        assert_eq!(RenderError::from(oal::AL_INVALID_NAME), RenderError::InvalidName);
        assert_eq!(RenderError::from(oal::AL_OUT_OF_MEMORY), RenderError::OutOfMemory);
        assert_eq!(RenderError::from(0xdeadu32), RenderError::Unknown);
    }

    #[test]
    fn mock_backend_tracks_play_calls() {
        let mut mock = MockAudioBackend::new();
        mock.expect_create_buffer()
            .returning(|_, _| Ok(BackendBufferId(1)));
        mock.expect_create_source()
            .returning(|_| Ok(BackendSourceId(1)));
        mock.expect_play().returning(|_| Ok(()));

        let buffer = mock
            .create_buffer(&SampleData::Mono16(vec![0i16; 4]), 44100)
            .unwrap();
        let source = mock.create_source(buffer).unwrap();
        mock.play(source).unwrap();
    }
}
