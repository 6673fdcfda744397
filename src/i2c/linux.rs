//! `/dev/i2c-N` character devices (needs the `i2c-dev` kernel module)

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::io::{
	AsRawFd,
	FromRawFd,
};

use libc::{
	EINTR,
	LOCK_EX,
	LOCK_UN,
	O_CLOEXEC,
	O_RDWR,
	c_int,
	c_ulong,
	flock,
	ioctl,
	open,
};

use super::{
	Message,
	OpenTransport,
	Transport,
};

// from <linux/i2c-dev.h> and <linux/i2c.h>
const I2C_FUNCS: c_ulong = 0x0705;
const I2C_RDWR: c_ulong = 0x0707;
const I2C_RDWR_IOCTL_MAX_MSGS: usize = 42;
const I2C_FUNC_I2C: c_ulong = 0x0000_0001;
const I2C_M_RD: u16 = 0x0001;

#[repr(C)]
struct I2cMsg {
	addr: u16,
	flags: u16,
	len: u16,
	buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
	msgs: *mut I2cMsg,
	nmsgs: u32,
}

fn check(res: c_int) -> io::Result<c_int> {
	if -1 == res {
		Err(io::Error::last_os_error())
	} else {
		Ok(res)
	}
}

fn retry_flock(fd: c_int, operation: c_int) -> io::Result<()> {
	loop {
		match check(unsafe { flock(fd, operation) }) {
			Err(ref e) if e.raw_os_error() == Some(EINTR) => continue,
			Err(e) => return Err(e),
			Ok(_) => return Ok(()),
		}
	}
}

#[derive(Debug)]
pub struct LinuxI2c {
	file: fs::File,
	index: usize,
}

impl LinuxI2c {
	pub fn open(index: usize) -> io::Result<Self> {
		let path = CString::new(format!("/dev/i2c-{}", index))?;

		let fd = unsafe { open(path.as_ptr(), O_RDWR | O_CLOEXEC) };
		check(fd)?;
		// now get fd managed to prevent resource leak
		let file = unsafe { fs::File::from_raw_fd(fd) };

		let i2c = LinuxI2c {
			file,
			index,
		};

		let funcs = i2c.functionality()?;
		if 0 == funcs & I2C_FUNC_I2C {
			return Err(io::Error::new(
				io::ErrorKind::Other,
				format!("adapter /dev/i2c-{} doesn't support plain I2C transfers (functionality 0x{:08x})", index, funcs),
			));
		}

		Ok(i2c)
	}

	pub fn index(&self) -> usize {
		self.index
	}

	pub fn functionality(&self) -> io::Result<c_ulong> {
		let mut funcs: c_ulong = 0;
		check(unsafe { ioctl(self.file.as_raw_fd(), I2C_FUNCS as _, &mut funcs as *mut c_ulong) })?;
		Ok(funcs)
	}
}

impl OpenTransport for LinuxI2c {
	fn open_index(index: usize) -> io::Result<Self> {
		LinuxI2c::open(index)
	}
}

impl Transport for LinuxI2c {
	fn transfer(&mut self, address: u8, messages: &mut [Message]) -> io::Result<()> {
		if messages.is_empty() {
			return Ok(());
		}
		if messages.len() > I2C_RDWR_IOCTL_MAX_MSGS {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "too many messages for a single transfer"));
		}

		let mut msgs = Vec::with_capacity(messages.len());
		for m in messages.iter_mut() {
			if m.len() > u16::max_value() as usize {
				return Err(io::Error::new(io::ErrorKind::InvalidInput, "message too long"));
			}
			let (flags, len, buf) = match m {
				// the kernel doesn't write through the pointer without I2C_M_RD
				Message::Write(data) => (0, data.len(), data.as_ptr() as *mut u8),
				Message::Read(buf) => (I2C_M_RD, buf.len(), buf.as_mut_ptr()),
			};
			msgs.push(I2cMsg {
				addr: address as u16,
				flags,
				len: len as u16,
				buf,
			});
		}

		let mut data = I2cRdwrIoctlData {
			msgs: msgs.as_mut_ptr(),
			nmsgs: msgs.len() as u32,
		};
		check(unsafe { ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &mut data as *mut I2cRdwrIoctlData) })?;
		Ok(())
	}

	fn acquire(&mut self) -> io::Result<()> {
		retry_flock(self.file.as_raw_fd(), LOCK_EX)
	}

	fn release(&mut self) -> io::Result<()> {
		retry_flock(self.file.as_raw_fd(), LOCK_UN)
	}
}
