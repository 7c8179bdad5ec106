use std::fmt;

use crate::error::FrameError;

/// What a frame carries.
///
/// `Control` frames hold handshake JSON. After the handshake a persistent
/// session exchanges only `Message` frames; a single-shot session exchanges
/// one `Request` and one `Reply` or `Fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Control = 0,
    Message = 1,
    Request = 2,
    Reply = 3,
    Fault = 4,
}

impl FrameKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            FrameKind::Control => "control",
            FrameKind::Message => "message",
            FrameKind::Request => "request",
            FrameKind::Reply => "reply",
            FrameKind::Fault => "fault",
        }
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(FrameKind::Control),
            1 => Ok(FrameKind::Message),
            2 => Ok(FrameKind::Request),
            3 => Ok(FrameKind::Reply),
            4 => Ok(FrameKind::Fault),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
