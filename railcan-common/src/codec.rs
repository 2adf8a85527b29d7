//! Frame encoding and decoding
//!
//! Maps logical commands onto the protocol's 29-bit identifier layout and fixed payload
//! templates. All functions here are pure; identifier address bits are supplied by the
//! caller (see [`crate::hash`]).
//!
//! Identifier layout, MSB to LSB of the 29-bit field:
//!
//! | bits  | field                             |
//! |-------|-----------------------------------|
//! | 28-25 | priority (values 0..=3)           |
//! | 24-17 | command code                      |
//! | 16    | status (0 = request, 1 = response)|
//! | 15-0  | node hash / counter-mixed address |

use snafu::{ensure, Snafu};

use crate::messages::{CanFrame, FrameStatus};

/// System command group (stop/go/hold sub-commands)
pub const CMD_SYSTEM: u8 = 0x00;
/// MFX decoder discovery
pub const CMD_MFX_DISCOVERY: u8 = 0x01;
/// MFX decoder bind
pub const CMD_MFX_BIND: u8 = 0x02;
/// MFX decoder verify
pub const CMD_MFX_VERIFY: u8 = 0x03;
/// Loco speed control
pub const CMD_LOCO_SPEED: u8 = 0x04;
/// Loco direction control
pub const CMD_LOCO_DIR: u8 = 0x05;
/// Loco function control
pub const CMD_LOCO_FUNC: u8 = 0x06;
/// Member ping
pub const CMD_PING: u8 = 0x18;
/// CAN bootloader start
pub const CMD_BOOTLOADER: u8 = 0x1B;

/// System sub-command: stop track power
pub const SUB_STOP: u8 = 0x00;
/// System sub-command: track power on
pub const SUB_GO: u8 = 0x01;
/// System sub-command: hold (emergency shutdown of the track)
pub const SUB_HOLD: u8 = 0x02;

/// System priority; every frame this node originates uses it
pub const PRIO_SYSTEM: u8 = 0x0;

/// The broadcast device address ("this request addresses all devices")
pub const BROADCAST_ADDR: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// MFX address-space marker carried in payload byte 2 of loco control frames
pub const MFX_ADDR_SPACE: u8 = 0x40;

/// The protocol operations this node issues or handles, independent of wire encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalCommand {
    /// Start the CAN bootloader on all members
    BootloaderStart,
    /// Ping all bus members for their identity
    Ping,
    /// Track power on
    SystemGo,
    /// Track hold
    SystemHold,
    /// Track stop
    SystemStop,
    /// Start a full MFX discovery round
    MfxDiscovery,
    /// Bind a discovered decoder to a local address
    MfxBind,
    /// Verify a bound decoder
    MfxVerify,
    /// Set loco speed
    LocoSpeed,
    /// Set loco direction
    LocoDir,
    /// Set a loco function
    LocoFunc,
}

impl LogicalCommand {
    /// The command code carried in the identifier
    pub fn wire_code(self) -> u8 {
        use LogicalCommand::*;
        match self {
            BootloaderStart => CMD_BOOTLOADER,
            Ping => CMD_PING,
            SystemGo | SystemHold | SystemStop => CMD_SYSTEM,
            MfxDiscovery => CMD_MFX_DISCOVERY,
            MfxBind => CMD_MFX_BIND,
            MfxVerify => CMD_MFX_VERIFY,
            LocoSpeed => CMD_LOCO_SPEED,
            LocoDir => CMD_LOCO_DIR,
            LocoFunc => CMD_LOCO_FUNC,
        }
    }

    /// Whether [`build`] fills payload bytes 0..4 with the broadcast address
    ///
    /// Broadcast is the default; only ping, discovery, and the loco control commands
    /// address a single device.
    pub fn is_broadcast(self) -> bool {
        use LogicalCommand::*;
        !matches!(self, Ping | MfxDiscovery | LocoSpeed | LocoDir | LocoFunc)
    }

    fn is_loco(self) -> bool {
        use LogicalCommand::*;
        matches!(self, LocoSpeed | LocoDir | LocoFunc)
    }
}

/// The logical fields packed into a 29-bit identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame priority (0..=3)
    pub priority: u8,
    /// Protocol command code
    pub command: u8,
    /// Request/response marker
    pub status: FrameStatus,
    /// Node hash / counter-mixed address bits
    pub address: u16,
}

impl FrameHeader {
    /// Pack the fields into a 29-bit identifier
    pub fn to_id(self) -> u32 {
        ((self.priority as u32 & 0x03) << 25)
            | ((self.command as u32) << 17)
            | (self.status.bit() << 16)
            | self.address as u32
    }
}

/// Parse a 29-bit identifier into its header fields
///
/// Pure bit-field extraction with no validation against the command table: any value
/// decodes to a structurally valid header, and unknown command codes are passed through
/// for the caller to dispatch on.
pub fn parse(id: u32) -> FrameHeader {
    FrameHeader {
        priority: ((id >> 25) & 0x03) as u8,
        command: ((id >> 17) & 0xFF) as u8,
        status: FrameStatus::from_bit(id & (1 << 16) != 0),
        address: (id & 0xFFFF) as u16,
    }
}

/// An outbound frame before its identifier address bits are known
///
/// Produced by [`build`]; the sender turns it into a [`CanFrame`] once it has mixed its
/// node hash and rolling counter into the address (see [`FrameTemplate::into_frame`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTemplate {
    /// Frame priority (0..=3)
    pub priority: u8,
    /// Protocol command code
    pub command: u8,
    /// Request/response marker
    pub status: FrameStatus,
    /// Number of valid payload bytes (0..=8)
    pub dlc: u8,
    /// Payload storage
    pub data: [u8; 8],
}

impl FrameTemplate {
    /// An empty system-priority request for the given command code
    pub fn request(command: u8) -> Self {
        Self {
            priority: PRIO_SYSTEM,
            command,
            status: FrameStatus::Request,
            dlc: 0,
            data: [0; 8],
        }
    }

    /// An empty system-priority response for the given command code
    pub fn response(command: u8) -> Self {
        Self { status: FrameStatus::Response, ..Self::request(command) }
    }

    /// Compose the 29-bit identifier from the header fields and the given address bits
    pub fn into_frame(self, address: u16) -> CanFrame {
        let header = FrameHeader {
            priority: self.priority,
            command: self.command,
            status: self.status,
            address,
        };
        CanFrame { id: header.to_id(), dlc: self.dlc, data: self.data }
    }
}

/// Errors from [`build`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum EncodeError {
    /// The logical command has no entry in the template table
    #[snafu(display("no frame template for {command:?}"))]
    UnknownCommand {
        /// The command that was requested
        command: LogicalCommand,
    },
    /// The variable payload does not fit in the 8-byte frame
    #[snafu(display("payload of {len} bytes exceeds frame capacity"))]
    PayloadTooLong {
        /// Length of the rejected payload
        len: usize,
    },
    /// The command's template has a fixed payload and accepts no extra bytes
    #[snafu(display("{command:?} does not accept extra payload"))]
    PayloadNotAllowed {
        /// The command that was requested
        command: LogicalCommand,
    },
}

/// Build an outbound frame template for a logical command
///
/// Template commands carry their fixed payload; the loco control commands additionally
/// append `extra` after the 4 address bytes (which the caller fills in later), giving
/// `dlc = 4 + extra.len()`. Broadcast commands get payload bytes 0..4 overwritten with
/// [`BROADCAST_ADDR`].
///
/// `MfxBind` and `MfxVerify` have no template -- their payload is dynamic and is built
/// by the binder directly -- so they fail with [`EncodeError::UnknownCommand`].
pub fn build(command: LogicalCommand, extra: &[u8]) -> Result<FrameTemplate, EncodeError> {
    use LogicalCommand::*;

    if !command.is_loco() && !extra.is_empty() {
        return PayloadNotAllowedSnafu { command }.fail();
    }

    let mut tpl = FrameTemplate::request(command.wire_code());

    match command {
        BootloaderStart => {
            // Start request to all members
            tpl.data[4] = 0x11;
            tpl.dlc = 5;
        }
        Ping => {
            // Ping carries no data in the request
        }
        SystemGo => {
            tpl.data[4] = SUB_GO;
            tpl.dlc = 5;
        }
        SystemHold => {
            tpl.data[4] = SUB_HOLD;
            tpl.dlc = 5;
        }
        SystemStop => {
            tpl.data[4] = SUB_STOP;
            tpl.dlc = 5;
        }
        MfxDiscovery => {
            // Full discovery round
            tpl.data[0] = 0x20;
            tpl.dlc = 1;
        }
        LocoSpeed | LocoDir | LocoFunc => {
            ensure!(extra.len() <= 4, PayloadTooLongSnafu { len: extra.len() });
            tpl.data[4..4 + extra.len()].copy_from_slice(extra);
            tpl.dlc = 4 + extra.len() as u8;
        }
        MfxBind | MfxVerify => return UnknownCommandSnafu { command }.fail(),
    }

    if command.is_broadcast() {
        tpl.data[0..4].copy_from_slice(&BROADCAST_ADDR);
    }

    Ok(tpl)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_BUILDABLE: &[LogicalCommand] = &[
        LogicalCommand::BootloaderStart,
        LogicalCommand::Ping,
        LogicalCommand::SystemGo,
        LogicalCommand::SystemHold,
        LogicalCommand::SystemStop,
        LogicalCommand::MfxDiscovery,
        LogicalCommand::LocoSpeed,
        LogicalCommand::LocoDir,
        LogicalCommand::LocoFunc,
    ];

    #[test]
    fn test_parse_bit_positions() {
        let id = (0b10u32 << 25) | (0x18 << 17) | (1 << 16) | 0x1234;
        let header = parse(id);
        assert_eq!(header.priority, 0b10);
        assert_eq!(header.command, 0x18);
        assert_eq!(header.status, FrameStatus::Response);
        assert_eq!(header.address, 0x1234);
    }

    #[test]
    fn test_parse_never_fails_on_unknown_command() {
        // Arbitrary 29-bit value with a command code the station does not know
        let header = parse((0xEE << 17) | 0xBEEF);
        assert_eq!(header.command, 0xEE);
        assert_eq!(header.status, FrameStatus::Request);
        assert_eq!(header.address, 0xBEEF);
    }

    #[test]
    fn test_header_round_trip() {
        for &command in ALL_BUILDABLE {
            let tpl = build(command, &[]).unwrap_or_else(|_| {
                // Loco commands also build with empty extra
                panic!("{command:?} should build")
            });
            let frame = tpl.into_frame(0xAB61);
            let header = parse(frame.id);
            assert_eq!(header.priority, PRIO_SYSTEM, "{command:?}");
            assert_eq!(header.command, command.wire_code(), "{command:?}");
            assert_eq!(header.status, FrameStatus::Request, "{command:?}");
            assert_eq!(header.address, 0xAB61, "{command:?}");
        }
    }

    #[test]
    fn test_broadcast_defaults() {
        // Broadcast is the default; only ping, discovery, and loco control are unicast
        for &command in ALL_BUILDABLE {
            use LogicalCommand::*;
            let expect_broadcast =
                !matches!(command, Ping | MfxDiscovery | LocoSpeed | LocoDir | LocoFunc);
            assert_eq!(command.is_broadcast(), expect_broadcast, "{command:?}");
        }

        let go = build(LogicalCommand::SystemGo, &[]).unwrap();
        assert_eq!(go.data[0..4], BROADCAST_ADDR);
        assert_eq!(go.data[4], SUB_GO);
        assert_eq!(go.dlc, 5);
    }

    #[test]
    fn test_ping_template_is_empty() {
        let ping = build(LogicalCommand::Ping, &[]).unwrap();
        assert_eq!(ping.dlc, 0);
        assert!(!LogicalCommand::Ping.is_broadcast());
    }

    #[test]
    fn test_discovery_template() {
        let tpl = build(LogicalCommand::MfxDiscovery, &[]).unwrap();
        assert_eq!(tpl.dlc, 1);
        assert_eq!(tpl.data[0], 0x20);
    }

    #[test]
    fn test_bootloader_template() {
        let tpl = build(LogicalCommand::BootloaderStart, &[]).unwrap();
        assert_eq!(tpl.dlc, 5);
        assert_eq!(tpl.data[0..4], BROADCAST_ADDR);
        assert_eq!(tpl.data[4], 0x11);
    }

    #[test]
    fn test_loco_commands_append_extra() {
        let tpl = build(LogicalCommand::LocoSpeed, &[0x12, 0x34]).unwrap();
        assert_eq!(tpl.dlc, 6);
        assert_eq!(tpl.data[4], 0x12);
        assert_eq!(tpl.data[5], 0x34);

        assert_eq!(
            build(LogicalCommand::LocoSpeed, &[0; 5]),
            Err(EncodeError::PayloadTooLong { len: 5 })
        );
    }

    #[test]
    fn test_bind_and_verify_have_no_template() {
        assert_eq!(
            build(LogicalCommand::MfxBind, &[]),
            Err(EncodeError::UnknownCommand { command: LogicalCommand::MfxBind })
        );
        assert_eq!(
            build(LogicalCommand::MfxVerify, &[]),
            Err(EncodeError::UnknownCommand { command: LogicalCommand::MfxVerify })
        );
    }

    #[test]
    fn test_extra_payload_rejected_for_fixed_templates() {
        assert_eq!(
            build(LogicalCommand::SystemGo, &[0x01]),
            Err(EncodeError::PayloadNotAllowed { command: LogicalCommand::SystemGo })
        );
    }
}
