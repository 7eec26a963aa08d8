//! Wire protocol: parsing of null-terminated ASCII command packets into
//! [`Command`] values.
//!
//! See spec.md §4.1. A packet is a four-character uppercase tag followed by
//! whitespace-separated parameters, e.g. `b"GHDL ding.wav"` or
//! `b"SSPO 3 1.0 2.0 3.0"`. The caller is responsible for NUL-delimited
//! framing (that lives in [`crate::socket_handler`]); this module only
//! turns one already-delimited packet's bytes into a typed command.

use thiserror::Error;

/// The handle sentinel meaning "no source" / "operation failed", per
/// spec.md §3.
pub const INVALID_HANDLE: i32 = -1;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ParseError {
    #[error("packet exceeds the 1024 byte limit (including terminator)")]
    TooLarge,
    #[error("packet is not valid ASCII")]
    NotAscii,
    #[error("unknown command tag '{0}'")]
    UnknownTag(String),
    #[error("wrong number or type of parameters for '{0}'")]
    BadArity(String),
}

/// Per spec.md §4.1, a handful of tags produce a response even on parse
/// failure (an error sentinel rather than silence). The socket/server layer
/// consults this when a packet fails to parse but its tag is still
/// recognizable.
pub fn tag_expects_response(tag: &str) -> bool {
    matches!(tag, "GHDL" | "WAVE" | "STAT" | "SYNC")
}

/// One-float-arg "speed in facing direction" vs three-float-arg velocity.
/// The 1-arg form is deprecated (spec.md Open Questions) and kept only for
/// wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Velocity {
    Deprecated1Speed(f32),
    Cartesian(f32, f32, f32),
}

/// `SSDI`'s two wire forms: a full direction vector, or a single angle in
/// the X-Z plane (radians). A zero vector means omnidirectional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Cartesian(f32, f32, f32),
    AngleRadians(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalParam {
    SpeedOfSound,
    DopplerFactor,
    DefaultRolloff,
    DefaultReferenceDistance,
}

impl GlobalParam {
    fn from_id(id: i32) -> Option<GlobalParam> {
        match id {
            1 => Some(GlobalParam::SpeedOfSound),
            2 => Some(GlobalParam::DopplerFactor),
            3 => Some(GlobalParam::DefaultRolloff),
            4 => Some(GlobalParam::DefaultReferenceDistance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceParam {
    Rolloff,
    ReferenceDistance,
    ConeInnerAngle,
    ConeOuterAngle,
    ConeOuterGain,
}

impl SourceParam {
    fn from_id(id: i32) -> Option<SourceParam> {
        match id {
            1 => Some(SourceParam::Rolloff),
            2 => Some(SourceParam::ReferenceDistance),
            3 => Some(SourceParam::ConeInnerAngle),
            4 => Some(SourceParam::ConeOuterAngle),
            5 => Some(SourceParam::ConeOuterGain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ghdl { filename: String },
    Ptfi { filename: String, size: u64 },
    Wave { wave_shape: i32, freq: f32, phase: f32, duration: f32 },
    Rhdl { handle: i32 },
    Play(i32),
    Stop(i32),
    Paus(i32),
    Ssec { handle: i32, seconds: f32 },
    Sspo { handle: i32, x: f32, y: f32, z: f32 },
    Ssve { handle: i32, velocity: Velocity },
    Ssdi { handle: i32, direction: Direction },
    Ssdv { handle: i32, angle: f32, gain: f32 },
    Ssvo { handle: i32, gain: f32 },
    Sslp { handle: i32, looping: bool },
    Spit { handle: i32, pitch: f32 },
    Fade { handle: i32, final_gain: f32, duration: f32 },
    Spar { handle: i32, param: SourceParam, value: f32 },
    Stat(i32),
    Slpo { x: f32, y: f32, z: f32 },
    Slve { x: f32, y: f32, z: f32 },
    Slor { at: [f32; 3], up: [f32; 3] },
    Gain(f32),
    Para { param: GlobalParam, value: f32 },
    Sync,
    Test,
    Quit,
    /// `SSDR` — explicitly unsupported, preserved for wire compatibility
    /// (spec.md Open Questions). Dispatch warns and ignores.
    Ssdr,
    /// `SSRV` — explicitly unsupported, both the 1-float and 3-float+1-float
    /// wire forms collapse to this. Dispatch warns and ignores.
    Ssrv,
}

/// Parse one already-NUL-stripped packet.
pub fn parse_packet(packet: &[u8]) -> Result<Command, ParseError> {
    // +1 accounts for the NUL terminator the framer already stripped.
    if packet.len() + 1 > 1024 {
        return Err(ParseError::TooLarge);
    }

    let text = std::str::from_utf8(packet).map_err(|_| ParseError::NotAscii)?;
    if !text.is_ascii() {
        return Err(ParseError::NotAscii);
    }

    let mut tokens = text.split_ascii_whitespace();
    let tag = tokens.next().unwrap_or("");

    if tag.len() != 4 || !tag.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ParseError::UnknownTag(tag.to_string()));
    }

    let rest: Vec<&str> = tokens.collect();

    match tag {
        "GHDL" => {
            let filename = one_token(&rest, tag)?;
            Ok(Command::Ghdl { filename: filename.to_string() })
        }
        "PTFI" => {
            let (filename, size) = two_tokens(&rest, tag)?;
            let size: u64 = size.parse().map_err(|_| ParseError::BadArity(tag.into()))?;
            Ok(Command::Ptfi { filename: filename.to_string(), size })
        }
        "WAVE" => {
            // WAVE wave,freq,phase,dur is 1 int + 3 floats
            if rest.len() != 4 {
                return Err(ParseError::BadArity(tag.into()));
            }
            let wave_shape = parse_int(rest[0], tag)?;
            let freq = parse_float(rest[1], tag)?;
            let phase = parse_float(rest[2], tag)?;
            let duration = parse_float(rest[3], tag)?;
            Ok(Command::Wave { wave_shape, freq, phase, duration })
        }
        "RHDL" => Ok(Command::Rhdl { handle: one_handle(&rest, tag)? }),
        "PLAY" => Ok(Command::Play(one_handle(&rest, tag)?)),
        "STOP" => Ok(Command::Stop(one_handle(&rest, tag)?)),
        "PAUS" => Ok(Command::Paus(one_handle(&rest, tag)?)),
        "SSEC" => {
            let (h, s) = handle_and_floats::<1>(&rest, tag)?;
            Ok(Command::Ssec { handle: h, seconds: s[0] })
        }
        "SSPO" => {
            let (h, f) = handle_and_floats::<3>(&rest, tag)?;
            Ok(Command::Sspo { handle: h, x: f[0], y: f[1], z: f[2] })
        }
        "SSVE" => {
            if rest.len() == 2 {
                let h = parse_int(rest[0], tag)?;
                let speed = parse_float(rest[1], tag)?;
                Ok(Command::Ssve { handle: h, velocity: Velocity::Deprecated1Speed(speed) })
            } else if rest.len() == 4 {
                let h = parse_int(rest[0], tag)?;
                let x = parse_float(rest[1], tag)?;
                let y = parse_float(rest[2], tag)?;
                let z = parse_float(rest[3], tag)?;
                Ok(Command::Ssve { handle: h, velocity: Velocity::Cartesian(x, y, z) })
            } else {
                Err(ParseError::BadArity(tag.into()))
            }
        }
        "SSDI" => {
            if rest.len() == 2 {
                let h = parse_int(rest[0], tag)?;
                let angle = parse_float(rest[1], tag)?;
                Ok(Command::Ssdi { handle: h, direction: Direction::AngleRadians(angle) })
            } else if rest.len() == 4 {
                let h = parse_int(rest[0], tag)?;
                let x = parse_float(rest[1], tag)?;
                let y = parse_float(rest[2], tag)?;
                let z = parse_float(rest[3], tag)?;
                Ok(Command::Ssdi { handle: h, direction: Direction::Cartesian(x, y, z) })
            } else {
                Err(ParseError::BadArity(tag.into()))
            }
        }
        "SSDV" => {
            let (h, f) = handle_and_floats::<2>(&rest, tag)?;
            Ok(Command::Ssdv { handle: h, angle: f[0], gain: f[1] })
        }
        "SSVO" => {
            let (h, f) = handle_and_floats::<1>(&rest, tag)?;
            Ok(Command::Ssvo { handle: h, gain: f[0] })
        }
        "SSLP" => {
            let h = parse_int(*rest.first().ok_or_else(|| ParseError::BadArity(tag.into()))?, tag)?;
            let flag = rest.get(1).ok_or_else(|| ParseError::BadArity(tag.into()))?;
            let flag: i32 = flag.parse().map_err(|_| ParseError::BadArity(tag.into()))?;
            if rest.len() != 2 {
                return Err(ParseError::BadArity(tag.into()));
            }
            Ok(Command::Sslp { handle: h, looping: flag != 0 })
        }
        "SPIT" => {
            let (h, f) = handle_and_floats::<1>(&rest, tag)?;
            Ok(Command::Spit { handle: h, pitch: f[0] })
        }
        "FADE" => {
            let (h, f) = handle_and_floats::<2>(&rest, tag)?;
            Ok(Command::Fade { handle: h, final_gain: f[0], duration: f[1] })
        }
        "SPAR" => {
            if rest.len() != 3 {
                return Err(ParseError::BadArity(tag.into()));
            }
            let h = parse_int(rest[0], tag)?;
            let id = parse_int(rest[1], tag)?;
            let value = parse_float(rest[2], tag)?;
            let param = SourceParam::from_id(id).ok_or_else(|| ParseError::BadArity(tag.into()))?;
            Ok(Command::Spar { handle: h, param, value })
        }
        "STAT" => Ok(Command::Stat(one_handle(&rest, tag)?)),
        "SLPO" => {
            let f = floats::<3>(&rest, tag)?;
            Ok(Command::Slpo { x: f[0], y: f[1], z: f[2] })
        }
        "SLVE" => {
            let f = floats::<3>(&rest, tag)?;
            Ok(Command::Slve { x: f[0], y: f[1], z: f[2] })
        }
        "SLOR" => {
            let f = floats::<6>(&rest, tag)?;
            Ok(Command::Slor { at: [f[0], f[1], f[2]], up: [f[3], f[4], f[5]] })
        }
        "GAIN" => {
            let f = floats::<1>(&rest, tag)?;
            Ok(Command::Gain(f[0]))
        }
        "PARA" => {
            if rest.len() != 2 {
                return Err(ParseError::BadArity(tag.into()));
            }
            let id = parse_int(rest[0], tag)?;
            let value = parse_float(rest[1], tag)?;
            let param = GlobalParam::from_id(id).ok_or_else(|| ParseError::BadArity(tag.into()))?;
            Ok(Command::Para { param, value })
        }
        "SYNC" => {
            zero_tokens(&rest, tag)?;
            Ok(Command::Sync)
        }
        "TEST" => {
            zero_tokens(&rest, tag)?;
            Ok(Command::Test)
        }
        "QUIT" => {
            zero_tokens(&rest, tag)?;
            Ok(Command::Quit)
        }
        "SSDR" => Ok(Command::Ssdr),
        "SSRV" => Ok(Command::Ssrv),
        _ => Err(ParseError::UnknownTag(tag.to_string())),
    }
}

fn zero_tokens(rest: &[&str], tag: &str) -> Result<(), ParseError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(ParseError::BadArity(tag.into()))
    }
}

fn one_token<'a>(rest: &'a [&'a str], tag: &str) -> Result<&'a str, ParseError> {
    if rest.len() == 1 {
        Ok(rest[0])
    } else {
        Err(ParseError::BadArity(tag.into()))
    }
}

fn two_tokens<'a>(rest: &'a [&'a str], tag: &str) -> Result<(&'a str, &'a str), ParseError> {
    if rest.len() == 2 {
        Ok((rest[0], rest[1]))
    } else {
        Err(ParseError::BadArity(tag.into()))
    }
}

fn one_handle(rest: &[&str], tag: &str) -> Result<i32, ParseError> {
    let token = one_token(rest, tag)?;
    parse_int(token, tag)
}

fn parse_int(token: &str, tag: &str) -> Result<i32, ParseError> {
    token.parse().map_err(|_| ParseError::BadArity(tag.into()))
}

fn parse_float(token: &str, tag: &str) -> Result<f32, ParseError> {
    token.parse().map_err(|_| ParseError::BadArity(tag.into()))
}

fn floats<const N: usize>(rest: &[&str], tag: &str) -> Result<[f32; N], ParseError> {
    if rest.len() != N {
        return Err(ParseError::BadArity(tag.into()));
    }
    let mut out = [0f32; N];
    for (i, token) in rest.iter().enumerate() {
        out[i] = parse_float(token, tag)?;
    }
    Ok(out)
}

fn handle_and_floats<const N: usize>(rest: &[&str], tag: &str) -> Result<(i32, [f32; N]), ParseError> {
    if rest.len() != N + 1 {
        return Err(ParseError::BadArity(tag.into()));
    }
    let handle = parse_int(rest[0], tag)?;
    let mut out = [0f32; N];
    for i in 0..N {
        out[i] = parse_float(rest[i + 1], tag)?;
    }
    Ok((handle, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghdl_parses_filename() {
        let cmd = parse_packet(b"GHDL ding.wav").unwrap();
        assert_eq!(cmd, Command::Ghdl { filename: "ding.wav".into() });
    }

    #[test]
    fn wave_parses_four_params() {
        let cmd = parse_packet(b"WAVE 1 261.63 0 2").unwrap();
        assert_eq!(
            cmd,
            Command::Wave { wave_shape: 1, freq: 261.63, phase: 0.0, duration: 2.0 }
        );
    }

    #[test]
    fn ssve_accepts_both_legacy_and_modern_arity() {
        assert_eq!(
            parse_packet(b"SSVE 3 1.5").unwrap(),
            Command::Ssve { handle: 3, velocity: Velocity::Deprecated1Speed(1.5) }
        );
        assert_eq!(
            parse_packet(b"SSVE 3 1.0 2.0 3.0").unwrap(),
            Command::Ssve { handle: 3, velocity: Velocity::Cartesian(1.0, 2.0, 3.0) }
        );
    }

    #[test]
    fn ssdi_accepts_angle_or_cartesian() {
        assert_eq!(
            parse_packet(b"SSDI 3 1.57").unwrap(),
            Command::Ssdi { handle: 3, direction: Direction::AngleRadians(1.57) }
        );
        assert_eq!(
            parse_packet(b"SSDI 3 0 0 1").unwrap(),
            Command::Ssdi { handle: 3, direction: Direction::Cartesian(0.0, 0.0, 1.0) }
        );
    }

    #[test]
    fn sslp_parses_boolean_flag() {
        assert_eq!(parse_packet(b"SSLP 3 1").unwrap(), Command::Sslp { handle: 3, looping: true });
        assert_eq!(parse_packet(b"SSLP 3 0").unwrap(), Command::Sslp { handle: 3, looping: false });
    }

    #[test]
    fn fade_parses_two_floats() {
        assert_eq!(
            parse_packet(b"FADE 3 0.0 1.0").unwrap(),
            Command::Fade { handle: 3, final_gain: 0.0, duration: 1.0 }
        );
    }

    #[test]
    fn spar_resolves_param_id() {
        assert_eq!(
            parse_packet(b"SPAR 3 1 0.5").unwrap(),
            Command::Spar { handle: 3, param: SourceParam::Rolloff, value: 0.5 }
        );
        assert!(parse_packet(b"SPAR 3 99 0.5").is_err());
    }

    #[test]
    fn para_resolves_param_id() {
        assert_eq!(
            parse_packet(b"PARA 2 0.2").unwrap(),
            Command::Para { param: GlobalParam::DopplerFactor, value: 0.2 }
        );
    }

    #[test]
    fn sync_test_quit_take_no_params() {
        assert_eq!(parse_packet(b"SYNC").unwrap(), Command::Sync);
        assert_eq!(parse_packet(b"TEST").unwrap(), Command::Test);
        assert_eq!(parse_packet(b"QUIT").unwrap(), Command::Quit);
        assert!(parse_packet(b"SYNC extra").is_err());
    }

    #[test]
    fn unsupported_tags_still_parse() {
        assert_eq!(parse_packet(b"SSDR 3 1.0").unwrap(), Command::Ssdr);
        assert_eq!(parse_packet(b"SSRV 3 1.0 2.0 3.0 4.0").unwrap(), Command::Ssrv);
    }

    #[test]
    fn unknown_tag_is_bad_format() {
        let err = parse_packet(b"BOGUS 1 2 3").unwrap_err();
        assert_eq!(err, ParseError::UnknownTag("BOGUS".into()));
    }

    #[test]
    fn wrong_arity_is_bad_format() {
        let err = parse_packet(b"SSPO 3 1.0 2.0").unwrap_err();
        assert_eq!(err, ParseError::BadArity("SSPO".into()));
    }

    #[test]
    fn response_producing_tags_are_tracked() {
        assert!(tag_expects_response("GHDL"));
        assert!(tag_expects_response("WAVE"));
        assert!(tag_expects_response("STAT"));
        assert!(tag_expects_response("SYNC"));
        assert!(!tag_expects_response("PLAY"));
    }

    #[test]
    fn oversized_packet_is_rejected() {
        let huge = vec![b'A'; 1200];
        assert_eq!(parse_packet(&huge).unwrap_err(), ParseError::TooLarge);
    }
}
