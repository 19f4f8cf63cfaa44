//! SI wire format constants
//!
//! Framing bytes, extended-protocol command opcodes, and the fixed
//! parameters of the SportIdent serial protocol.

/// Start of a framed command message
pub const STX: u8 = 0x02;
/// End of a framed command message
pub const ETX: u8 = 0x03;
/// Acknowledgment; when sent to a BSx3..6 station, beeps until the card is removed
pub const ACK: u8 = 0x06;
/// Negative acknowledgment
pub const NAK: u8 = 0x15;
/// Data link escape (unused by the extended protocol)
pub const DLE: u8 = 0x10;
/// Wakeup byte, sent ahead of commands to rouse a sleeping station
pub const WAKEUP: u8 = 0xff;

/// Sentinel raw time value meaning "no time punched" (e.g. a missing start punch)
pub const NO_TIME: u16 = 0xeeee;

/// SET_MS parameter selecting the directly attached station ("M"aster)
pub const P_MS_DIRECT: u8 = 0x4d;
/// SET_MS parameter selecting the remote/coupled station ("S"lave)
pub const P_MS_REMOTE: u8 = 0x53;

/// Backup memory record length in the extended protocol (6 in the basic protocol)
pub const REC_LEN: usize = 8;

/// Extended protocol command opcodes
pub mod cmd {
    /// Read backup memory block
    pub const GET_BACKUP: u8 = 0x81;
    /// Write system values
    pub const SET_SYS_VAL: u8 = 0x82;
    /// Read system values
    pub const GET_SYS_VAL: u8 = 0x83;
    /// ShortRangeRadio - SysData write
    pub const SRR_WRITE: u8 = 0xa2;
    /// ShortRangeRadio - SysData read
    pub const SRR_READ: u8 = 0xa3;
    /// ShortRangeRadio - network device query
    pub const SRR_QUERY: u8 = 0xa6;
    /// ShortRangeRadio - heartbeat from linked devices, every 50 seconds
    pub const SRR_PING: u8 = 0xa7;
    /// ShortRangeRadio - ad-hoc message, e.g. from an SI-ActiveCard
    pub const SRR_ADHOC: u8 = 0xa8;
    /// Read out SI card 5 data
    pub const GET_SI5: u8 = 0xb1;
    /// Autosend timestamp (online control)
    pub const TRANS_REC: u8 = 0xd3;
    /// Clear card
    pub const CLEAR_CARD: u8 = 0xe0;
    /// Read out SI card 6 data block
    pub const GET_SI6: u8 = 0xe1;
    /// Write SI card 6 line (16 bytes)
    pub const SET_SI6: u8 = 0xe2;
    /// SI card 5 inserted
    pub const SI5_DET: u8 = 0xe5;
    /// SI card 6 inserted
    pub const SI6_DET: u8 = 0xe6;
    /// SI card removed
    pub const SI_REM: u8 = 0xe7;
    /// SI card 8/9/10/11/p/t inserted
    pub const SI8_DET: u8 = 0xe8;
    /// Write SI card 8/9/10/11/p/t data word
    pub const SET_SI8: u8 = 0xea;
    /// Read out SI card 8/9/10/11/p/t data block
    pub const GET_SI8: u8 = 0xef;
    /// Select master (direct) or slave (remote) target
    pub const SET_MS: u8 = 0xf0;
    /// Query the currently selected target
    pub const GET_MS: u8 = 0xf1;
    /// Erase backup memory
    pub const ERASE_BDATA: u8 = 0xf5;
    /// Set station clock
    pub const SET_TIME: u8 = 0xf6;
    /// Read station clock
    pub const GET_TIME: u8 = 0xf7;
    /// Power the station off
    pub const OFF: u8 = 0xf8;
    /// Beep/flash the station a given number of times
    pub const SIGNAL: u8 = 0xf9;
    /// Set baud rate (0x00 = 4800, 0x01 = 38400)
    pub const SET_BAUD: u8 = 0xfe;

    /// Human-readable opcode name, for log/pretty output
    pub fn name(command: u8) -> Option<&'static str> {
        Some(match command {
            GET_BACKUP => "GET_BACKUP",
            SET_SYS_VAL => "SET_SYS_VAL",
            GET_SYS_VAL => "GET_SYS_VAL",
            SRR_WRITE => "SRR_WRITE",
            SRR_READ => "SRR_READ",
            SRR_QUERY => "SRR_QUERY",
            SRR_PING => "SRR_PING",
            SRR_ADHOC => "SRR_ADHOC",
            GET_SI5 => "GET_SI5",
            TRANS_REC => "TRANS_REC",
            CLEAR_CARD => "CLEAR_CARD",
            GET_SI6 => "GET_SI6",
            SET_SI6 => "SET_SI6",
            SI5_DET => "SI5_DET",
            SI6_DET => "SI6_DET",
            SI_REM => "SI_REM",
            SI8_DET => "SI8_DET",
            SET_SI8 => "SET_SI8",
            GET_SI8 => "GET_SI8",
            SET_MS => "SET_MS",
            GET_MS => "GET_MS",
            ERASE_BDATA => "ERASE_BDATA",
            SET_TIME => "SET_TIME",
            GET_TIME => "GET_TIME",
            OFF => "OFF",
            SIGNAL => "SIGNAL",
            SET_BAUD => "SET_BAUD",
            _ => return None,
        })
    }
}
