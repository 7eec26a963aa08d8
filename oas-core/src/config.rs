//! Server configuration (spec.md §6). The real wire format used by the
//! original implementation was XML, but XML parsing is explicitly an
//! external collaborator (spec.md Non-goals / §1); the core only needs a
//! small key/value loader for the handful of settings it owns directly.
//! Grounded on `OASServerInfo.h`/`.cpp` for the value object shape and on
//! `OASServer.cpp`'s `_readConfigFile` for the required/optional-key and
//! GUI-default-enabled semantics.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub cache_directory: PathBuf,
    pub port: u16,
    pub audio_device: Option<String>,
    pub gui_enabled: bool,
}

const GUI_DISABLE_VALUES: &[&str] = &["off", "false", "no", "disable", "disabled"];

impl ServerInfo {
    /// Parses an already-read key/value body. Lines are `key=value`,
    /// blank lines and lines starting with `#` are ignored.
    pub fn parse(contents: &str) -> Result<ServerInfo> {
        let mut cache_directory: Option<String> = None;
        let mut port: Option<String> = None;
        let mut audio_device: Option<String> = None;
        let mut gui: Option<String> = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some(pair) => pair,
                None => continue,
            };

            match key.trim() {
                "cache_directory" => cache_directory = Some(value.trim().to_string()),
                "port" => port = Some(value.trim().to_string()),
                "audio_device" => audio_device = Some(value.trim().to_string()),
                "gui" => gui = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let cache_directory = cache_directory.ok_or(Error::MissingConfigKey("cache_directory"))?;
        let port_str = port.ok_or(Error::MissingConfigKey("port"))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| Error::InvalidConfigValue { key: "port", value: port_str })?;

        let audio_device = audio_device.filter(|s| !s.is_empty());

        // GUI is enabled by default; disabled only by an explicit
        // recognized "off" value (spec.md §6, OASServer.cpp's
        // _readConfigFile).
        let gui_enabled = match gui {
            Some(value) if GUI_DISABLE_VALUES.contains(&value.as_str()) => false,
            _ => true,
        };

        Ok(ServerInfo {
            cache_directory: PathBuf::from(cache_directory),
            port,
            audio_device,
            gui_enabled,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerInfo> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_keys_are_parsed() {
        let info = ServerInfo::parse("cache_directory=/tmp/oas\nport=4444\n").unwrap();
        assert_eq!(info.cache_directory, PathBuf::from("/tmp/oas"));
        assert_eq!(info.port, 4444);
        assert!(info.gui_enabled);
        assert_eq!(info.audio_device, None);
    }

    #[test]
    fn missing_cache_directory_is_fatal() {
        let err = ServerInfo::parse("port=4444\n").unwrap_err();
        assert!(matches!(err, Error::MissingConfigKey("cache_directory")));
    }

    #[test]
    fn missing_port_is_fatal() {
        let err = ServerInfo::parse("cache_directory=/tmp/oas\n").unwrap_err();
        assert!(matches!(err, Error::MissingConfigKey("port")));
    }

    #[test]
    fn gui_disabled_by_recognized_values_only() {
        for value in ["off", "false", "no", "disable", "disabled"] {
            let contents = format!("cache_directory=/tmp/oas\nport=1\ngui={}\n", value);
            assert!(!ServerInfo::parse(&contents).unwrap().gui_enabled, "{} should disable gui", value);
        }

        let contents = "cache_directory=/tmp/oas\nport=1\ngui=nonsense\n";
        assert!(ServerInfo::parse(contents).unwrap().gui_enabled);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let contents = "# a comment\n\ncache_directory=/tmp/oas\nport=1\n";
        let info = ServerInfo::parse(contents).unwrap();
        assert_eq!(info.port, 1);
    }

    #[test]
    fn empty_audio_device_means_default() {
        let contents = "cache_directory=/tmp/oas\nport=1\naudio_device=\n";
        assert_eq!(ServerInfo::parse(contents).unwrap().audio_device, None);
    }
}
