//! In-memory bus for tests

use std::cell::Cell;
use std::collections::{
	BTreeSet,
	HashMap,
};
use std::io;

use super::{
	Message,
	OpenTransport,
	Transport,
};

thread_local! {
	// tests run in parallel threads; keep the switch per thread
	static OPEN_FAILS: Cell<bool> = Cell::new(false);
}

/// make `SimBus::open_index` fail (with ENOENT) on the current thread
pub fn fail_open(fail: bool) {
	OPEN_FAILS.with(|f| f.set(fail));
}

fn nack() -> io::Error {
	io::Error::from_raw_os_error(libc::EREMOTEIO)
}

// 24LCxx: two address bytes set the pointer, further written bytes are stored,
// reads continue at the pointer
struct SimEeprom {
	memory: Vec<u8>,
	pointer: usize,
}

impl SimEeprom {
	fn write(&mut self, data: &[u8], corrupt: bool) {
		if data.len() < 2 {
			return;
		}
		self.pointer = ((data[0] as usize) << 8 | data[1] as usize) % self.memory.len();
		for &b in &data[2..] {
			self.memory[self.pointer] = if corrupt { !b } else { b };
			self.pointer = (self.pointer + 1) % self.memory.len();
		}
	}

	fn read(&mut self, buf: &mut [u8]) {
		for b in buf.iter_mut() {
			*b = self.memory[self.pointer];
			self.pointer = (self.pointer + 1) % self.memory.len();
		}
	}
}

pub struct SimBus {
	acked: BTreeSet<u8>,
	eeproms: HashMap<u8, SimEeprom>,
	fail_all: bool,
	fail_reads: bool,
	corrupt_writes: bool,
	transfers: usize,
	locks: usize,
	unlocks: usize,
}

impl SimBus {
	pub fn new(acked: &[u8]) -> Self {
		SimBus {
			acked: acked.iter().cloned().collect(),
			eeproms: HashMap::new(),
			fail_all: false,
			fail_reads: false,
			corrupt_writes: false,
			transfers: 0,
			locks: 0,
			unlocks: 0,
		}
	}

	/// bus with a single EEPROM of `bytes` size at `address`
	pub fn with_eeprom(address: u8, bytes: usize) -> Self {
		let mut sim = SimBus::new(&[]);
		sim.add_eeprom(address, bytes);
		sim
	}

	pub fn add_eeprom(&mut self, address: u8, bytes: usize) {
		self.acked.insert(address);
		self.eeproms.insert(address, SimEeprom {
			memory: vec![0xff; bytes],
			pointer: 0,
		});
	}

	pub fn fail_all(&mut self, fail: bool) {
		self.fail_all = fail;
	}

	pub fn fail_reads(&mut self, fail: bool) {
		self.fail_reads = fail;
	}

	pub fn corrupt_writes(&mut self, corrupt: bool) {
		self.corrupt_writes = corrupt;
	}

	pub fn memory(&self, address: u8) -> &[u8] {
		&self.eeproms[&address].memory
	}

	pub fn transfers(&self) -> usize {
		self.transfers
	}

	pub fn locks(&self) -> usize {
		self.locks
	}

	pub fn unlocks(&self) -> usize {
		self.unlocks
	}
}

impl Transport for SimBus {
	fn transfer(&mut self, address: u8, messages: &mut [Message]) -> io::Result<()> {
		self.transfers += 1;
		assert_eq!(self.locks, self.unlocks + 1, "transfer without holding the bus");

		if self.fail_all || !self.acked.contains(&address) {
			return Err(nack());
		}
		if self.fail_reads && messages.iter().any(|m| m.is_read()) {
			return Err(nack());
		}

		let corrupt = self.corrupt_writes;
		match self.eeproms.get_mut(&address) {
			None => {
				for m in messages.iter_mut() {
					if let Message::Read(buf) = m {
						for b in buf.iter_mut() {
							*b = 0;
						}
					}
				}
			},
			Some(ee) => {
				for m in messages.iter_mut() {
					match m {
						Message::Write(data) => ee.write(&data[..], corrupt),
						Message::Read(buf) => ee.read(&mut buf[..]),
					}
				}
			},
		}
		Ok(())
	}

	fn acquire(&mut self) -> io::Result<()> {
		assert_eq!(self.locks, self.unlocks, "bus locked twice");
		self.locks += 1;
		Ok(())
	}

	fn release(&mut self) -> io::Result<()> {
		self.unlocks += 1;
		Ok(())
	}
}

// every opened bus has a 32 Kbit EEPROM at 0x50
impl OpenTransport for SimBus {
	fn open_index(_index: usize) -> io::Result<Self> {
		if OPEN_FAILS.with(|f| f.get()) {
			return Err(io::Error::from_raw_os_error(libc::ENOENT));
		}
		Ok(SimBus::with_eeprom(0x50, 4096))
	}
}
