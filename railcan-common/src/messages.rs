//! Wire-level frame types

const MAX_DATA_LENGTH: usize = 8;

/// One CAN bus message: a 29-bit extended identifier plus 0-8 payload bytes.
///
/// Bytes beyond `dlc` are undefined and must not be transmitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanFrame {
    /// The 29-bit extended identifier
    pub id: u32,
    /// Number of valid payload bytes (0..=8)
    pub dlc: u8,
    /// Payload storage; only the first `dlc` bytes are meaningful
    pub data: [u8; MAX_DATA_LENGTH],
}

impl Default for CanFrame {
    fn default() -> Self {
        Self { id: 0, dlc: 0, data: [0; MAX_DATA_LENGTH] }
    }
}

impl CanFrame {
    /// Create a frame from an identifier and payload slice
    ///
    /// Panics if `data` is longer than 8 bytes.
    pub fn new(id: u32, data: &[u8]) -> Self {
        let dlc = data.len() as u8;
        if dlc > MAX_DATA_LENGTH as u8 {
            panic!("Data length exceeds maximum size of {} bytes", MAX_DATA_LENGTH);
        }
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[0..dlc as usize].copy_from_slice(data);

        Self { id, dlc, data: buf }
    }

    /// The valid payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[0..self.dlc as usize]
    }
}

/// Distinguishes a request from its response within the same command code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Request frame (status bit clear)
    Request,
    /// Response frame (status bit set)
    Response,
}

impl FrameStatus {
    /// The value of the identifier's status bit
    pub fn bit(self) -> u32 {
        match self {
            FrameStatus::Request => 0,
            FrameStatus::Response => 1,
        }
    }

    /// Decode from the identifier's status bit
    pub fn from_bit(set: bool) -> Self {
        if set {
            FrameStatus::Response
        } else {
            FrameStatus::Request
        }
    }
}
