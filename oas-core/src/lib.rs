pub mod audio_handler;
pub mod buffer;
pub mod config;
pub mod error;
pub mod file_handler;
pub mod listener;
pub mod message;
pub mod observer;
pub mod render;
pub mod socket_handler;
pub mod source;
pub mod time;

pub use crate::{
    audio_handler::AudioHandler,
    config::ServerInfo,
    error::{Error, Result},
    file_handler::FileHandler,
    message::Command,
    observer::{LoggingObserver, Observer, ObserverEvent},
    render::{AudioBackend, OpenAlBackend},
    socket_handler::SocketHandler,
};

use log::{debug, error, info, warn};

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use crate::message::{Direction, ParseError, Velocity};
use crate::observer::drain_observer_event;
use crate::time::Time;

/// Client connected: fade updates must tick at >= 2 kHz (spec.md §5).
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_micros(500);
/// No client: no reason to spin, but still need to notice a new connection
/// and keep advancing any lingering fades promptly.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Backoff step added to the QUIT-triggered reinitialization retry delay.
const QUIT_REINIT_BACKOFF_STEP: Duration = Duration::from_secs(5);

/// Top-level orchestrator: owns the socket, the audio scene, and the
/// observer, and runs the dispatch loop described in spec.md §4.6.
/// Grounded on the teacher's `Tocks` struct/`run` loop, generalized from a
/// UI-event/tocks-event select loop to a socket-drain/dispatch/observer
/// loop with no concurrent event source besides the socket itself.
pub struct Server {
    socket: SocketHandler,
    files: FileHandler,
    audio: AudioHandler,
    backend: Box<dyn AudioBackend + Send>,
    observer: Box<dyn Observer>,
    audio_device: Option<String>,
}

impl Server {
    pub async fn new(config: ServerInfo, observer: Box<dyn Observer>) -> Result<Server> {
        let backend = OpenAlBackend::new(config.audio_device.as_deref())
            .map_err(Error::Render)?;
        Server::with_backend(config, Box::new(backend), observer).await
    }

    /// Constructs with an explicit backend, bypassing the real OpenAL
    /// device. Used by integration tests that drive the dispatch loop
    /// against a `MockAudioBackend`.
    pub async fn with_backend(
        config: ServerInfo,
        backend: Box<dyn AudioBackend + Send>,
        observer: Box<dyn Observer>,
    ) -> Result<Server> {
        let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
        let socket = SocketHandler::bind(addr).await?;
        let files = FileHandler::new(&config.cache_directory)?;

        Ok(Server {
            socket,
            files,
            audio: AudioHandler::new(),
            backend,
            observer,
            audio_device: config.audio_device,
        })
    }

    /// Runs until a fatal error occurs. Under normal operation this never
    /// returns: QUIT resets the scene and keeps serving.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let poll_interval = if self.socket.has_client() {
                ACTIVE_POLL_INTERVAL
            } else {
                IDLE_POLL_INTERVAL
            };
            let deadline = Time::now() + poll_interval;

            let mut queue = VecDeque::new();
            self.socket.populate_queue_with_incoming_messages(&mut queue, &self.files, deadline).await;

            if queue.is_empty() {
                self.audio.update_sources(&mut *self.backend, Time::now());
                self.publish_observer_event().await;
                continue;
            }

            for message in queue {
                self.dispatch(message).await;
                self.publish_observer_event().await;
            }
        }
    }

    async fn publish_observer_event(&mut self) {
        if let Some(event) = drain_observer_event(&mut self.audio) {
            self.observer.notify(event);
        }
    }

    async fn dispatch(&mut self, message: std::result::Result<Command, ParseError>) {
        let command = match message {
            Ok(command) => command,
            Err(parse_error) => {
                if let Some(response) = response_for_parse_error(&parse_error) {
                    self.socket.send_response(&response).await;
                }
                return;
            }
        };

        match command {
            Command::Ghdl { filename } => {
                let handle = self
                    .audio
                    .create_source_from_filename(&mut *self.backend, &self.files, &filename)
                    .unwrap_or_else(|e| {
                        warn!("GHDL failed for '{}': {}", filename, e);
                        None
                    });
                self.socket.send_response(&handle.unwrap_or(-1).to_string()).await;
            }
            Command::Ptfi { .. } => {
                // Diverted and consumed entirely at the framing layer
                // (socket_handler); never reaches dispatch.
                debug_assert!(false, "PTFI should never reach dispatch");
            }
            Command::Wave { wave_shape, freq, phase, duration } => {
                let handle = self
                    .audio
                    .create_source_from_waveform(&mut *self.backend, wave_shape, freq, phase, duration)
                    .unwrap_or_else(|e| {
                        warn!("WAVE failed: {}", e);
                        None
                    });
                self.socket.send_response(&handle.unwrap_or(-1).to_string()).await;
            }
            Command::Rhdl { handle } => self.audio.delete_source(handle),
            Command::Play(handle) => self.log_if_err(self.audio.play_source(&mut *self.backend, handle)),
            Command::Stop(handle) => self.log_if_err(self.audio.stop_source(&mut *self.backend, handle)),
            Command::Paus(handle) => self.log_if_err(self.audio.pause_source(&mut *self.backend, handle)),
            Command::Ssec { handle, seconds } => {
                self.log_if_err(self.audio.set_source_playback_position(&mut *self.backend, handle, seconds))
            }
            Command::Sspo { handle, x, y, z } => {
                self.log_if_err(self.audio.set_source_position(&mut *self.backend, handle, x, y, z))
            }
            Command::Ssve { handle, velocity } => match velocity {
                Velocity::Deprecated1Speed(speed) => {
                    self.log_if_err(self.audio.set_source_speed(&mut *self.backend, handle, speed))
                }
                Velocity::Cartesian(x, y, z) => {
                    self.log_if_err(self.audio.set_source_velocity(&mut *self.backend, handle, x, y, z))
                }
            },
            Command::Ssdi { handle, direction } => match direction {
                Direction::AngleRadians(angle) => {
                    self.log_if_err(self.audio.set_source_direction_angle(&mut *self.backend, handle, angle))
                }
                Direction::Cartesian(x, y, z) => {
                    self.log_if_err(self.audio.set_source_direction_cartesian(&mut *self.backend, handle, x, y, z))
                }
            },
            Command::Ssdv { handle, angle, gain } => {
                self.log_if_err(self.audio.set_source_direction_angle(&mut *self.backend, handle, angle));
                self.log_if_err(self.audio.set_source_gain(&mut *self.backend, handle, gain));
            }
            Command::Ssvo { handle, gain } => {
                self.log_if_err(self.audio.set_source_gain(&mut *self.backend, handle, gain))
            }
            Command::Sslp { handle, looping } => {
                self.log_if_err(self.audio.set_source_loop(&mut *self.backend, handle, looping))
            }
            Command::Spit { handle, pitch } => {
                self.log_if_err(self.audio.set_source_pitch(&mut *self.backend, handle, pitch))
            }
            Command::Fade { handle, final_gain, duration } => self.log_if_err(self.audio.set_source_fade(
                &mut *self.backend,
                handle,
                Time::now(),
                final_gain,
                duration,
            )),
            Command::Spar { handle, param, value } => {
                self.log_if_err(self.audio.set_source_param(&mut *self.backend, handle, param, value))
            }
            Command::Stat(handle) => {
                let code = self.audio.source_state_code(handle);
                self.socket.send_response(&code.to_string()).await;
            }
            Command::Slpo { x, y, z } => {
                self.log_if_err(self.audio.set_listener_position(&mut *self.backend, x, y, z))
            }
            Command::Slve { x, y, z } => {
                self.log_if_err(self.audio.set_listener_velocity(&mut *self.backend, x, y, z))
            }
            Command::Slor { at, up } => {
                self.log_if_err(self.audio.set_listener_orientation(&mut *self.backend, at, up))
            }
            Command::Gain(gain) => self.log_if_err(self.audio.set_listener_gain(&mut *self.backend, gain)),
            Command::Para { param, value } => {
                self.log_if_err(self.audio.set_global_rendering_parameter(&mut *self.backend, param, value))
            }
            Command::Sync => self.socket.send_response("SYNC").await,
            Command::Test => {}
            Command::Quit => self.reset_audio_scene().await,
            Command::Ssdr => warn!("SSDR is unsupported, ignoring"),
            Command::Ssrv => warn!("SSRV is unsupported, ignoring"),
        }
    }

    fn log_if_err(&self, result: crate::render::RenderResult<()>) {
        if let Err(e) = result {
            warn!("renderer operation failed: {}", e);
        }
    }

    /// QUIT: release all audio resources, then reinitialize with
    /// indefinite retry and a growing backoff (spec.md §4.6, §7).
    async fn reset_audio_scene(&mut self) {
        info!("QUIT received, resetting audio scene");
        self.audio.release(&mut *self.backend);

        let mut backoff = Duration::from_secs(0);
        loop {
            match OpenAlBackend::new(self.audio_device.as_deref()) {
                Ok(backend) => {
                    self.backend = Box::new(backend);
                    self.audio = AudioHandler::new();
                    debug!("audio scene reinitialized after QUIT");
                    return;
                }
                Err(e) => {
                    error!("failed to reinitialize audio after QUIT: {}", e);
                    backoff += QUIT_REINIT_BACKOFF_STEP;
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn response_for_parse_error(err: &ParseError) -> Option<String> {
    let tag = match err {
        ParseError::UnknownTag(tag) | ParseError::BadArity(tag) => tag.as_str(),
        ParseError::TooLarge | ParseError::NotAscii => return None,
    };

    if !crate::message::tag_expects_response(tag) {
        return None;
    }

    Some(if tag == "STAT" { "0".to_string() } else { "-1".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MockAudioBackend;
    use tempfile::tempdir;

    fn test_config(port: u16, cache_dir: &std::path::Path) -> ServerInfo {
        ServerInfo {
            cache_directory: cache_dir.to_path_buf(),
            port,
            audio_device: None,
            gui_enabled: false,
        }
    }

    #[tokio::test]
    async fn ghdl_for_missing_file_responds_with_minus_one() {
        let dir = tempdir().unwrap();
        let config = test_config(0, dir.path());
        let backend = MockAudioBackend::new();
        let mut server = Server::with_backend(config, Box::new(backend), Box::new(LoggingObserver)).await.unwrap();

        let response = server
            .audio
            .create_source_from_filename(&mut *server.backend, &server.files, "missing.wav")
            .unwrap();
        assert_eq!(response, None);
    }

    #[test]
    fn parse_error_response_matches_sentinel_rules() {
        assert_eq!(
            response_for_parse_error(&ParseError::UnknownTag("GHDL".into())),
            Some("-1".into())
        );
        assert_eq!(
            response_for_parse_error(&ParseError::BadArity("STAT".into())),
            Some("0".into())
        );
        assert_eq!(response_for_parse_error(&ParseError::UnknownTag("PLAY".into())), None);
        assert_eq!(response_for_parse_error(&ParseError::TooLarge), None);
    }
}
