//! Records of devices learned from the bus

/// Identity of a bus participant, as reported in a ping response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Device {
    /// The device's globally unique 32-bit identity
    pub identity: u32,
    /// The 16-bit device type tag
    pub device_type: u16,
}

/// A decoder that has completed the bind handshake and carries a locally assigned address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnrolledLoco {
    /// The decoder's globally unique 32-bit identity (same namespace as [`Device::identity`])
    pub identity: u32,
    /// Local address assigned by this node; unique among enrolled locos, always > 0
    pub local_address: u8,
    /// 1-based index into the registry, assigned on first save
    pub storage_index: Option<u8>,
}

impl EnrolledLoco {
    /// A freshly bound loco that has not been persisted yet
    pub fn new(identity: u32, local_address: u8) -> Self {
        Self { identity, local_address, storage_index: None }
    }
}
