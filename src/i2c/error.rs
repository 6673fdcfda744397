use std::io;

use failure::Fail;

#[derive(Debug, Fail)]
pub enum BusError {
	#[fail(display = "I2C bus {} unavailable: {}", index, cause)]
	Unavailable {
		index: usize,
		#[fail(cause)]
		cause: io::Error,
	},
	#[fail(display = "I2C bus {} already closed", index)]
	Closed {
		index: usize,
	},
}

impl BusError {
	pub fn index(&self) -> usize {
		match *self {
			BusError::Unavailable { index, .. } => index,
			BusError::Closed { index } => index,
		}
	}
}

/// Transport level failure of a single transfer (no ACK, bus busy, ...)
///
/// Usually transient; callers recover by waiting and retrying.
#[derive(Debug, Fail)]
#[fail(display = "I2C transfer to 0x{:02x} failed: {}", address, cause)]
pub struct TransferError {
	pub address: u8,
	#[fail(cause)]
	pub cause: io::Error,
}

impl TransferError {
	/// errno 121 (EREMOTEIO): chip didn't ACK, typically still busy with an
	/// internal write cycle
	pub fn is_remote_io(&self) -> bool {
		self.cause.raw_os_error() == Some(libc::EREMOTEIO)
	}
}
