//! Message framing and parsing
//!
//! Implements the SI extended protocol message format. A command message is
//! rendered as `STX, command, param count, params..., CRC16, ETX`; the
//! single-byte WAKEUP/ACK/NAK modes travel unframed.
//!
//! Parsing is resynchronizing: on a structural violation only the bytes
//! proven invalid are dropped (as little as one), so a caller can recover a
//! valid message embedded in a corrupted stream instead of losing the whole
//! buffer.

use std::fmt;

use super::consts;
use super::crc::crc16;
use super::ProtocolError;

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiMessage {
    /// An unframed single-byte mode message (WAKEUP, ACK or NAK)
    Mode(u8),
    /// A framed command message
    Command {
        /// Command opcode
        command: u8,
        /// Ordered parameter bytes
        parameters: Vec<u8>,
    },
}

impl SiMessage {
    /// Shorthand for building a command message
    pub fn command(command: u8, parameters: Vec<u8>) -> Self {
        SiMessage::Command {
            command,
            parameters,
        }
    }
}

impl fmt::Display for SiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiMessage::Mode(mode) => write!(f, "Mode: 0x{:02x} ({})", mode, mode),
            SiMessage::Command {
                command,
                parameters,
            } => {
                let name = consts::cmd::name(*command).unwrap_or("UNKNOWN");
                write!(f, "Command: {} 0x{:02x}, Parameters:", name, command)?;
                for byte in parameters {
                    write!(f, " {:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Parse at most one message from the front of `input`.
///
/// Returns the parsed message (if any) and the remaining bytes. When the
/// input is too short to decide, the input is returned unchanged so the
/// caller can wait for more data.
pub fn parse(input: &[u8]) -> (Option<SiMessage>, &[u8]) {
    let Some(&first) = input.first() else {
        return (None, input);
    };
    match first {
        consts::WAKEUP | consts::ACK | consts::NAK => {
            return (Some(SiMessage::Mode(first)), &input[1..]);
        }
        consts::STX => {}
        other => {
            tracing::warn!(byte = format_args!("0x{:02x}", other), "invalid start byte");
            return (None, &input[1..]);
        }
    }
    // Framed command: STX, command, count, params..., CRC hi, CRC lo, ETX
    if input.len() <= 2 {
        return (None, input);
    }
    let command = input[1];
    let num_parameters = input[2] as usize;
    if input.len() <= 5 + num_parameters {
        return (None, input);
    }
    if input[5 + num_parameters] != consts::ETX {
        tracing::warn!(
            byte = format_args!("0x{:02x}", input[5 + num_parameters]),
            "invalid ETX byte"
        );
        return (None, &input[1..]);
    }
    let expected_crc = crc16(&input[1..3 + num_parameters]);
    let actual_crc = &input[3 + num_parameters..5 + num_parameters];
    if actual_crc != &expected_crc[..] {
        tracing::warn!(
            actual = format_args!("{:02x?}", actual_crc),
            expected = format_args!("{:02x?}", expected_crc),
            "invalid CRC"
        );
        return (None, &input[6 + num_parameters..]);
    }
    let parameters = input[3..3 + num_parameters].to_vec();
    (
        Some(SiMessage::Command {
            command,
            parameters,
        }),
        &input[6 + num_parameters..],
    )
}

/// Parse as many messages as possible from `input`.
///
/// Stops once a parse iteration no longer shrinks the remainder, which
/// guards against spinning on an unparseable (or incomplete) prefix.
pub fn parse_all(input: &[u8]) -> (Vec<SiMessage>, &[u8]) {
    let mut messages = Vec::new();
    let mut remainder = input;
    loop {
        let (message, new_remainder) = parse(remainder);
        let shrank = new_remainder.len() < remainder.len();
        if let Some(message) = message {
            messages.push(message);
        }
        remainder = new_remainder;
        if !shrank {
            break;
        }
    }
    (messages, remainder)
}

/// Render a message to its wire form.
///
/// Fails for mode messages other than WAKEUP, ACK and NAK.
pub fn render(message: &SiMessage) -> Result<Vec<u8>, ProtocolError> {
    match message {
        SiMessage::Command {
            command,
            parameters,
        } => {
            let mut body = Vec::with_capacity(2 + parameters.len());
            body.push(*command);
            body.push(parameters.len() as u8);
            body.extend_from_slice(parameters);
            let crc = crc16(&body);
            let mut out = Vec::with_capacity(body.len() + 4);
            out.push(consts::STX);
            out.extend_from_slice(&body);
            out.extend_from_slice(&crc);
            out.push(consts::ETX);
            Ok(out)
        }
        SiMessage::Mode(mode) => match *mode {
            consts::WAKEUP | consts::ACK | consts::NAK => Ok(vec![*mode]),
            other => Err(ProtocolError::UnrenderableMode { mode: other }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{Rng, SeedableRng};

    fn random_command(rng: &mut impl Rng) -> SiMessage {
        let num_parameters = rng.gen_range(0..32);
        SiMessage::Command {
            command: rng.gen(),
            parameters: (0..num_parameters).map(|_| rng.gen()).collect(),
        }
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let message = SiMessage::command(consts::cmd::SET_MS, vec![consts::P_MS_DIRECT]);
        let rendered = render(&message).unwrap();
        let (parsed, remainder) = parse(&rendered);
        assert_eq!(parsed, Some(message));
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_render_parse_roundtrip_randomized() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5105);
        for _ in 0..200 {
            let message = random_command(&mut rng);
            let rendered = render(&message).unwrap();
            let (parsed, remainder) = parse(&rendered);
            assert_eq!(parsed, Some(message));
            assert!(remainder.is_empty());
        }
    }

    #[test]
    fn test_mode_messages() {
        for mode in [consts::WAKEUP, consts::ACK, consts::NAK] {
            let rendered = render(&SiMessage::Mode(mode)).unwrap();
            assert_eq!(rendered, vec![mode]);
            let (parsed, remainder) = parse(&rendered);
            assert_eq!(parsed, Some(SiMessage::Mode(mode)));
            assert!(remainder.is_empty());
        }
    }

    #[test]
    fn test_render_unknown_mode_fails() {
        assert_eq!(
            render(&SiMessage::Mode(0x42)),
            Err(ProtocolError::UnrenderableMode { mode: 0x42 })
        );
    }

    #[test]
    fn test_truncated_prefix_loses_nothing() {
        let message = SiMessage::command(consts::cmd::GET_SYS_VAL, vec![0x00, 0x80]);
        let rendered = render(&message).unwrap();
        for cut in 0..rendered.len() {
            let prefix = &rendered[..cut];
            let (parsed, remainder) = parse(prefix);
            assert_eq!(parsed, None, "prefix of {} bytes", cut);
            assert_eq!(remainder, prefix, "prefix of {} bytes", cut);
        }
    }

    #[test]
    fn test_invalid_start_byte_drops_one_byte() {
        let message = SiMessage::command(consts::cmd::SIGNAL, vec![0x02]);
        let mut stream = vec![0x99];
        stream.extend(render(&message).unwrap());
        let (messages, remainder) = parse_all(&stream);
        assert_eq!(messages, vec![message]);
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_crc_mismatch_drops_the_frame() {
        let message = SiMessage::command(consts::cmd::SIGNAL, vec![0x02]);
        let mut corrupted = render(&message).unwrap();
        let crc_index = corrupted.len() - 2;
        corrupted[crc_index] ^= 0xff;
        let follower = SiMessage::Mode(consts::ACK);
        corrupted.extend(render(&follower).unwrap());
        let (messages, remainder) = parse_all(&corrupted);
        assert_eq!(messages, vec![follower]);
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_bad_etx_resynchronizes_byte_by_byte() {
        let message = SiMessage::command(consts::cmd::SIGNAL, vec![0x02]);
        let rendered = render(&message).unwrap();
        // A stray STX in front makes the parser misframe; it must recover by
        // dropping single bytes until the real message aligns.
        let mut stream = vec![consts::STX, 0x01];
        stream.extend_from_slice(&rendered);
        let (messages, remainder) = parse_all(&stream);
        assert_eq!(messages, vec![message]);
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_parse_all_concatenation() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xcafe);
        let originals: Vec<SiMessage> = (0..10).map(|_| random_command(&mut rng)).collect();
        let mut stream = Vec::new();
        for message in &originals {
            stream.extend(render(message).unwrap());
        }
        let (messages, remainder) = parse_all(&stream);
        assert_eq!(messages, originals);
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_parse_all_keeps_incomplete_tail() {
        let complete = SiMessage::command(consts::cmd::GET_TIME, vec![]);
        let partial = render(&SiMessage::command(consts::cmd::GET_BACKUP, vec![0, 1, 0, 8])).unwrap();
        let mut stream = render(&complete).unwrap();
        stream.extend_from_slice(&partial[..4]);
        let (messages, remainder) = parse_all(&stream);
        assert_eq!(messages, vec![complete]);
        assert_eq!(remainder, &partial[..4]);
    }

    #[test]
    fn test_display_names_known_commands() {
        let message = SiMessage::command(consts::cmd::GET_BACKUP, vec![0x01, 0x02]);
        let pretty = message.to_string();
        assert!(pretty.contains("GET_BACKUP"));
        assert!(pretty.contains("01 02"));
    }
}
