//! The command station state machine

use defmt_or_log::{debug, trace, warn};
use heapless::Vec;
use snafu::{ResultExt, Snafu};

use railcan_common::{
    codec::{self, EncodeError, FrameTemplate, LogicalCommand},
    devices::{Device, EnrolledLoco},
    hash::{mix_counter, node_hash},
    messages::{CanFrame, FrameStatus},
    traits::{CanReceiver, CanSendError, CanSender, LocoStore},
};

use crate::binder::{BindError, DiscoveryBinder};

/// How long an issued command waits for its response, in milliseconds
pub const DEFAULT_TIMEOUT_MS: i32 = 500;

/// Capacity of the devices-seen-since-boot set
pub const MAX_DEVICES: usize = 8;

/// Identity and behavior settings for a command station
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StationConfig {
    /// The 32-bit CAN UID this node presents on the bus
    pub node_uid: u32,
    /// Device type reported in ping responses
    pub device_type: u16,
    /// Software version reported in ping responses
    pub software_version: u16,
    /// Use the fixed legacy hash marker instead of the rolling counter slot
    pub legacy_hash: bool,
}

impl StationConfig {
    /// Config for the given UID, with legacy hashing enabled for compatibility with
    /// older bus participants
    pub fn new(node_uid: u32) -> Self {
        Self {
            node_uid,
            device_type: 0x0000,
            software_version: 0x0100,
            legacy_hash: true,
        }
    }
}

/// Errors from issuing a command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum SendError {
    /// The logical command could not be encoded
    #[snafu(display("failed to build frame: {source}"))]
    BuildFailed {
        /// The underlying codec error
        source: EncodeError,
    },
    /// The transport collaborator rejected the frame
    #[snafu(display("transport failed to send frame"))]
    TransmitFailed,
}

/// The single in-flight request awaiting a correlated response or timeout
#[derive(Clone, Copy, Debug)]
pub struct PendingCommand {
    /// The logical command that was issued
    pub issued: LogicalCommand,
    /// The frame actually sent
    pub tx: CanFrame,
    /// Remaining wait time; 0 or negative means no longer waiting
    pub remaining_ms: i32,
    /// The matching response, once observed
    pub rx: Option<CanFrame>,
}

/// Emitted by [`CommandStation::tick`] when the pending command's wait expires
///
/// Not an error: the caller decides whether to reissue. The station does not auto-retry.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutEvent {
    /// The command that went unanswered
    pub command: LogicalCommand,
    /// The frame that went unanswered
    pub frame: CanFrame,
}

/// What [`CommandStation::on_frame_received`] did with an inbound frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RxOutcome {
    /// The (command, status) pair is not recognized; no state change. Unknown traffic
    /// from other bus participants is expected and never an error.
    Ignored,
    /// The frame was handled with no further action required
    Acknowledged,
    /// A ping response added or refreshed an entry in the device set
    DeviceSeen(Device),
    /// A discovery response completed the bind handshake
    LocoBound(EnrolledLoco),
    /// A discovery response was received but the bind request could not be sent
    BindFailed(BindError),
    /// A ping request was received but our response could not be sent
    ReplyFailed,
}

/// A command station node
///
/// Owns the single in-flight command slot, the rolling identifier counter, and the set of
/// devices seen since boot. Single-threaded by design: [`CommandStation::tick`] and
/// [`CommandStation::on_frame_received`] are driven from one polling loop, so no locking
/// is needed, and exactly one request is outstanding at a time. Issuing a new command
/// silently overwrites the previous wait state; there is no queue and no explicit cancel.
pub struct CommandStation<S, R> {
    config: StationConfig,
    /// Rolling 3-bit counter mixed into outgoing identifiers; advanced per sent frame
    counter: u8,
    sender: S,
    binder: DiscoveryBinder<R>,
    pending: Option<PendingCommand>,
    devices: Vec<Device, MAX_DEVICES>,
}

impl<S: CanSender, R: LocoStore> CommandStation<S, R> {
    /// Create a station sending through `sender` and enrolling locos into `registry`
    pub fn new(config: StationConfig, sender: S, registry: R) -> Self {
        Self {
            config,
            counter: 0,
            sender,
            binder: DiscoveryBinder::new(registry),
            pending: None,
            devices: Vec::new(),
        }
    }

    /// Issue a template command and start waiting for its response
    ///
    /// Any previously pending command is overwritten unconditionally (last issue wins).
    pub fn issue(&mut self, command: LogicalCommand) -> Result<(), SendError> {
        let tpl = codec::build(command, &[]).context(BuildFailedSnafu)?;
        self.transmit(command, tpl)
    }

    /// Issue a loco control command addressed to an enrolled loco
    ///
    /// `data` supplies the command's variable payload bytes (speed value, direction,
    /// function state); the frame carries `4 + data.len()` payload bytes.
    pub fn issue_loco(
        &mut self,
        command: LogicalCommand,
        loco: &EnrolledLoco,
        data: &[u8],
    ) -> Result<(), SendError> {
        let mut tpl = codec::build(command, data).context(BuildFailedSnafu)?;

        // MFX address space, then the loco's local address
        tpl.data[0] = 0x00;
        tpl.data[1] = 0x00;
        tpl.data[2] = codec::MFX_ADDR_SPACE;
        tpl.data[3] = loco.local_address;

        self.transmit(command, tpl)
    }

    /// Advance the pending command's timeout by `elapsed_ms`
    ///
    /// Returns a [`TimeoutEvent`] carrying the unanswered frame when the wait expires;
    /// the pending slot is cleared. A no-op when nothing is outstanding.
    pub fn tick(&mut self, elapsed_ms: u32) -> Option<TimeoutEvent> {
        let pending = self.pending.as_mut()?;
        if pending.remaining_ms <= 0 {
            return None;
        }

        pending.remaining_ms -= elapsed_ms.min(i32::MAX as u32) as i32;
        if pending.remaining_ms > 0 {
            return None;
        }

        let expired = self.pending.take()?;
        warn!(
            "command timed out, id={:08x} dlc={}",
            expired.tx.id, expired.tx.dlc
        );
        Some(TimeoutEvent { command: expired.issued, frame: expired.tx })
    }

    /// Dispatch one inbound frame and correlate it with the pending command
    ///
    /// Correlation is by command code only -- the protocol carries no transaction ID, so
    /// a stray response sharing a command code with an unrelated pending request will
    /// resolve it. This is an inherited protocol limitation, preserved deliberately.
    pub fn on_frame_received(&mut self, frame: CanFrame) -> RxOutcome {
        let header = codec::parse(frame.id);

        let outcome = match (header.command, header.status) {
            (codec::CMD_PING, FrameStatus::Request) => match self.send_ping_response() {
                Ok(()) => RxOutcome::Acknowledged,
                Err(_) => {
                    warn!("failed to send ping response");
                    RxOutcome::ReplyFailed
                }
            },
            (codec::CMD_PING, FrameStatus::Response) => {
                if frame.dlc == 8 {
                    self.record_device(&frame)
                } else {
                    // Anything but a full identity report is dropped without error
                    RxOutcome::Ignored
                }
            }
            (codec::CMD_MFX_DISCOVERY, FrameStatus::Request) => RxOutcome::Acknowledged,
            (codec::CMD_MFX_DISCOVERY, FrameStatus::Response) => self.handle_discovery(&frame),
            (codec::CMD_MFX_BIND, _) => RxOutcome::Acknowledged,
            _ => {
                trace!("unrecognized frame, command={:02x}", header.command);
                RxOutcome::Ignored
            }
        };

        if header.status == FrameStatus::Response {
            if let Some(pending) = self.pending.as_mut() {
                if pending.remaining_ms > 0 && pending.issued.wire_code() == header.command {
                    pending.remaining_ms = 0;
                    pending.rx = Some(frame);
                }
            }
        }

        outcome
    }

    /// Drain the receiver, then advance the timeout
    ///
    /// The single entry point for a cooperative polling loop; outcomes of individual
    /// frames are logged and dropped. Call [`CommandStation::on_frame_received`] directly
    /// to act on them.
    pub fn poll<RX: CanReceiver>(
        &mut self,
        receiver: &mut RX,
        elapsed_ms: u32,
    ) -> Option<TimeoutEvent> {
        while let Some(frame) = receiver.try_recv() {
            self.on_frame_received(frame);
        }
        self.tick(elapsed_ms)
    }

    /// The in-flight command slot, if one was issued and has not timed out
    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Take the correlated response of the pending command, if one has arrived
    pub fn take_response(&mut self) -> Option<CanFrame> {
        self.pending.as_mut().and_then(|p| p.rx.take())
    }

    /// Devices seen since boot
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// The loco registry collaborator
    pub fn registry(&self) -> &R {
        self.binder.registry()
    }

    /// Mutable access to the loco registry collaborator
    pub fn registry_mut(&mut self) -> &mut R {
        self.binder.registry_mut()
    }

    /// The low 16 identifier bits for the next outgoing frame
    fn tx_address(&self) -> u16 {
        mix_counter(
            node_hash(self.config.node_uid),
            self.counter,
            self.config.legacy_hash,
        )
    }

    fn advance_counter(&mut self) {
        self.counter = (self.counter + 1) & 0x07;
    }

    fn transmit(&mut self, command: LogicalCommand, tpl: FrameTemplate) -> Result<(), SendError> {
        let frame = tpl.into_frame(self.tx_address());
        if self.sender.send(frame).is_err() {
            return TransmitFailedSnafu.fail();
        }
        self.advance_counter();

        // Last issue wins: a still-pending command is overwritten without notice
        self.pending = Some(PendingCommand {
            issued: command,
            tx: frame,
            remaining_ms: DEFAULT_TIMEOUT_MS,
            rx: None,
        });
        Ok(())
    }

    fn send_ping_response(&mut self) -> Result<(), CanSendError> {
        let mut tpl = FrameTemplate::response(codec::CMD_PING);
        tpl.data[0..4].copy_from_slice(&self.config.node_uid.to_be_bytes());
        tpl.data[4..6].copy_from_slice(&self.config.software_version.to_be_bytes());
        tpl.data[6..8].copy_from_slice(&self.config.device_type.to_be_bytes());
        tpl.dlc = 8;

        let frame = tpl.into_frame(self.tx_address());
        self.sender.send(frame)?;
        self.advance_counter();
        Ok(())
    }

    /// Insert or refresh a device from an 8-byte ping response, keyed by identity
    fn record_device(&mut self, frame: &CanFrame) -> RxOutcome {
        let identity =
            u32::from_be_bytes([frame.data[0], frame.data[1], frame.data[2], frame.data[3]]);
        let device_type = u16::from_be_bytes([frame.data[6], frame.data[7]]);
        let device = Device { identity, device_type };

        if let Some(existing) = self.devices.iter_mut().find(|d| d.identity == identity) {
            *existing = device;
        } else if self.devices.push(device).is_err() {
            warn!("device set full, dropping {:08x}", identity);
            return RxOutcome::Ignored;
        }

        debug!("device {:08x} type {:04x}", identity, device_type);
        RxOutcome::DeviceSeen(device)
    }

    fn handle_discovery(&mut self, frame: &CanFrame) -> RxOutcome {
        match frame.dlc {
            // Discovery ran but found nothing
            0 => RxOutcome::Ignored,
            // Diagnostic variant carrying an ask byte
            n if n > 6 => RxOutcome::Ignored,
            5 => {
                // A decoder answered; enroll it
                let address = self.tx_address();
                match self.binder.bind(frame, address, &mut self.sender) {
                    Ok(loco) => {
                        self.advance_counter();
                        RxOutcome::LocoBound(loco)
                    }
                    Err(e) => RxOutcome::BindFailed(e),
                }
            }
            _ => RxOutcome::Ignored,
        }
    }
}
