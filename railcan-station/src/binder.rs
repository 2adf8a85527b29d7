//! The discovery -> bind handshake

use defmt_or_log::{debug, warn};
use snafu::Snafu;

use railcan_common::{
    codec::{self, FrameTemplate},
    devices::EnrolledLoco,
    messages::CanFrame,
    traits::{CanSender, LocoStore},
};

/// Errors from [`DiscoveryBinder::bind`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum BindError {
    /// The transport collaborator rejected the bind request
    #[snafu(display("failed to transmit bind request"))]
    TransmitFailed,
}

/// Enrolls discovered decoders by assigning them local addresses
///
/// On a successful discovery response the binder issues a bind request carrying the
/// discovered identity and a freshly allocated local address. The returned
/// [`EnrolledLoco`] is not persisted; saving it through the registry is the caller's
/// responsibility.
pub struct DiscoveryBinder<R> {
    registry: R,
}

impl<R: LocoStore> DiscoveryBinder<R> {
    /// Create a binder allocating addresses from the given registry
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// The registry collaborator
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Mutable access to the registry collaborator
    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    /// Issue a bind request for the decoder reported in `discovery`
    ///
    /// `address` supplies the identifier's low 16 bits (the sender's counter-mixed node
    /// hash). The bind frame is built directly rather than through the command template
    /// table, since its payload is dynamic: the identity copied verbatim from the
    /// discovery response, a reserved zero byte, and the new local address.
    ///
    /// On send failure no partial state is retained.
    pub fn bind<S: CanSender>(
        &mut self,
        discovery: &CanFrame,
        address: u16,
        sender: &mut S,
    ) -> Result<EnrolledLoco, BindError> {
        let mut tpl = FrameTemplate::request(codec::CMD_MFX_BIND);
        tpl.data[0..4].copy_from_slice(&discovery.data[0..4]);

        let local_address = self.registry.allocate_next_address();
        tpl.data[4] = 0x00;
        tpl.data[5] = local_address;
        tpl.dlc = 6;

        if sender.send(tpl.into_frame(address)).is_err() {
            warn!("failed to bind loco at address {}", local_address);
            return TransmitFailedSnafu.fail();
        }

        let identity = u32::from_be_bytes([
            discovery.data[0],
            discovery.data[1],
            discovery.data[2],
            discovery.data[3],
        ]);
        debug!("bound loco {:08x} at address {}", identity, local_address);

        Ok(EnrolledLoco::new(identity, local_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railcan_common::messages::FrameStatus;
    use railcan_common::traits::CanSendError;

    struct VecSender {
        frames: Vec<CanFrame>,
        fail: bool,
    }

    impl CanSender for VecSender {
        fn send(&mut self, frame: CanFrame) -> Result<(), CanSendError> {
            if self.fail {
                return Err(CanSendError(frame));
            }
            self.frames.push(frame);
            Ok(())
        }
    }

    struct FixedCountStore(u8);

    impl LocoStore for FixedCountStore {
        fn count(&self) -> u8 {
            self.0
        }

        fn load(&self, _index: u8) -> Option<EnrolledLoco> {
            None
        }

        fn save(&mut self, loco: EnrolledLoco) -> EnrolledLoco {
            loco
        }
    }

    fn discovery_response(identity: [u8; 4]) -> CanFrame {
        let mut tpl = FrameTemplate::response(codec::CMD_MFX_DISCOVERY);
        tpl.data[0..4].copy_from_slice(&identity);
        tpl.data[4] = 0x20;
        tpl.dlc = 5;
        tpl.into_frame(0x1234)
    }

    #[test]
    fn test_bind_request_layout() {
        let mut sender = VecSender { frames: Vec::new(), fail: false };
        let mut binder = DiscoveryBinder::new(FixedCountStore(0));

        let loco = binder
            .bind(&discovery_response([0x01, 0x02, 0x03, 0x04]), 0xAB61, &mut sender)
            .unwrap();

        assert_eq!(loco, EnrolledLoco::new(0x01020304, 1));

        let frame = sender.frames[0];
        let header = codec::parse(frame.id);
        assert_eq!(header.command, codec::CMD_MFX_BIND);
        assert_eq!(header.status, FrameStatus::Request);
        assert_eq!(header.priority, codec::PRIO_SYSTEM);
        assert_eq!(header.address, 0xAB61);
        assert_eq!(frame.dlc, 6);
        assert_eq!(frame.data[0..4], [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(frame.data[4], 0x00);
        assert_eq!(frame.data[5], 1);
    }

    #[test]
    fn test_bind_allocates_next_address() {
        let mut sender = VecSender { frames: Vec::new(), fail: false };
        let mut binder = DiscoveryBinder::new(FixedCountStore(3));

        let loco = binder
            .bind(&discovery_response([0xAA, 0xBB, 0xCC, 0xDD]), 0, &mut sender)
            .unwrap();

        assert_eq!(loco.local_address, 4);
        assert_eq!(sender.frames[0].data[5], 4);
    }

    #[test]
    fn test_bind_transmit_failure() {
        let mut sender = VecSender { frames: Vec::new(), fail: true };
        let mut binder = DiscoveryBinder::new(FixedCountStore(0));

        let result = binder.bind(&discovery_response([0, 0, 0, 1]), 0, &mut sender);
        assert_eq!(result, Err(BindError::TransmitFailed));
        assert!(sender.frames.is_empty());
    }
}
