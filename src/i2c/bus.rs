use std::fmt;
use std::io;
use std::ops::RangeInclusive;
use std::time::Instant;

use super::{
	BusError,
	MAX_ADDRESS,
	Message,
	OpenTransport,
	TransferError,
	Transport,
};

/// address block used by 24LCxx style EEPROMs (0b1010xxx)
pub const EEPROM_ADDRESS_RANGE: RangeInclusive<u8> = 0x50..=0x57;

struct HexList<'a>(&'a [u8]);

impl<'a> fmt::Display for HexList<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "[")?;
		for (i, address) in self.0.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			write!(f, "0x{:02x}", address)?;
		}
		write!(f, "]")
	}
}

/// Exclusive owner of a single I2C bus
///
/// Closing (or dropping) the handle releases the transport; after `close`
/// every operation fails with `BusError::Closed`.
pub struct BusHandle<T: Transport> {
	index: usize,
	transport: Option<T>,
}

impl<T: OpenTransport> BusHandle<T> {
	pub fn open(index: usize) -> Result<Self, BusError> {
		let mut bus = BusHandle {
			index,
			transport: None,
		};
		bus.reopen()?;
		Ok(bus)
	}

	/// drop the current transport (if any) and try acquiring it again
	pub fn reopen(&mut self) -> Result<(), BusError> {
		self.transport = None;
		match T::open_index(self.index) {
			Ok(transport) => {
				info!("I2C bus {}: opened", self.index);
				self.transport = Some(transport);
				Ok(())
			},
			Err(cause) => {
				error!("I2C bus {}: failed to open (check bus is enabled, the index and permissions): {}", self.index, cause);
				Err(BusError::Unavailable {
					index: self.index,
					cause,
				})
			},
		}
	}
}

impl<T: Transport> BusHandle<T> {
	/// wrap an already acquired transport
	pub fn with_transport(index: usize, transport: T) -> Self {
		BusHandle {
			index,
			transport: Some(transport),
		}
	}

	pub fn index(&self) -> usize {
		self.index
	}

	pub fn is_open(&self) -> bool {
		self.transport.is_some()
	}

	pub fn transport(&self) -> Option<&T> {
		self.transport.as_ref()
	}

	pub fn transport_mut(&mut self) -> Option<&mut T> {
		self.transport.as_mut()
	}

	pub fn close(&mut self) {
		if self.transport.take().is_some() {
			info!("I2C bus {}: closed", self.index);
		}
	}

	/// Acquire exclusive access for one or more transfers; released when the
	/// guard is dropped.
	pub fn lock(&mut self) -> Result<BusGuard<T>, BusError> {
		let index = self.index;
		let transport = match self.transport.as_mut() {
			None => return Err(BusError::Closed { index }),
			Some(t) => t,
		};
		transport.acquire().map_err(|cause| BusError::Unavailable { index, cause })?;
		Ok(BusGuard {
			index,
			transport,
		})
	}

	/// Probe every 7-bit address; holds the bus until the returned iterator
	/// is dropped.
	pub fn scan(&mut self) -> Result<Scan<T>, BusError> {
		self.scan_range(0..=MAX_ADDRESS)
	}

	pub fn scan_range(&mut self, range: RangeInclusive<u8>) -> Result<Scan<T>, BusError> {
		let (start, end) = range.into_inner();
		let remaining = start..=end.min(MAX_ADDRESS);
		Ok(Scan {
			guard: Some(self.lock()?),
			remaining,
		})
	}

	/// ascending list of all responding addresses
	pub fn scan_addresses(&mut self) -> Result<Vec<u8>, BusError> {
		let index = self.index;
		let found: Vec<u8> = self.scan()?.collect();
		info!("I2C bus {}: found device addresses {}", index, HexList(&found));
		Ok(found)
	}

	/// first responding address in the EEPROM address block
	pub fn find_eeprom(&mut self) -> Result<Option<u8>, BusError> {
		let found = self.scan_range(EEPROM_ADDRESS_RANGE)?.next();
		match found {
			Some(address) => debug!("I2C bus {}: EEPROM candidate at 0x{:02x}", self.index, address),
			None => debug!("I2C bus {}: no device in EEPROM address block", self.index),
		}
		Ok(found)
	}
}

pub struct BusGuard<'a, T: Transport + 'a> {
	index: usize,
	transport: &'a mut T,
}

impl<'a, T: Transport> BusGuard<'a, T> {
	pub fn index(&self) -> usize {
		self.index
	}

	fn raw_transfer(&mut self, address: u8, messages: &mut [Message]) -> Result<(), TransferError> {
		if address > MAX_ADDRESS {
			return Err(TransferError {
				address,
				cause: io::Error::new(io::ErrorKind::InvalidInput, "not a 7-bit address"),
			});
		}
		self.transport.transfer(address, messages).map_err(|cause| TransferError {
			address,
			cause,
		})
	}

	pub fn transfer(&mut self, address: u8, messages: &mut [Message]) -> Result<(), TransferError> {
		let start = Instant::now();
		let result = self.raw_transfer(address, messages);
		let elapsed = start.elapsed();
		match &result {
			Ok(()) => {
				debug!("I2C bus {}: transfer to 0x{:02x} took {:?}", self.index, address, elapsed);
			},
			Err(e) if e.is_remote_io() => {
				warn!("I2C bus {}: {} (chip possibly busy from prior request, add a delay)", self.index, e);
			},
			Err(e) => {
				warn!("I2C bus {}: {}", self.index, e);
			},
		}
		result
	}

	// minimal read: write a single zero byte, read one byte back
	fn probe(&mut self, address: u8) -> bool {
		let mut buf = [0u8];
		let mut messages = [Message::Write(&[0x00]), Message::Read(&mut buf)];
		match self.raw_transfer(address, &mut messages) {
			Ok(()) => true,
			Err(e) => {
				trace!("I2C bus {}: no response: {}", self.index, e);
				false
			},
		}
	}
}

impl<'a, T: Transport> Drop for BusGuard<'a, T> {
	fn drop(&mut self) {
		if let Err(e) = self.transport.release() {
			error!("I2C bus {}: failed to release bus lock: {}", self.index, e);
		}
	}
}

/// Addresses responding to a probe, in ascending order
///
/// The bus stays locked until the last address was probed (or the scan is
/// dropped).
pub struct Scan<'a, T: Transport + 'a> {
	guard: Option<BusGuard<'a, T>>,
	remaining: RangeInclusive<u8>,
}

impl<'a, T: Transport> Scan<'a, T> {
	/// whether the bus is still locked by this scan
	pub fn is_locked(&self) -> bool {
		self.guard.is_some()
	}
}

impl<'a, T: Transport> Iterator for Scan<'a, T> {
	type Item = u8;

	fn next(&mut self) -> Option<Self::Item> {
		let guard = self.guard.as_mut()?;
		while let Some(address) = self.remaining.next() {
			if guard.probe(address) {
				return Some(address);
			}
		}
		// exhausted: release the bus now
		self.guard = None;
		None
	}
}

#[cfg(test)]
mod test {
	use crate::i2c::sim::{
		SimBus,
		fail_open,
	};
	use crate::i2c::{
		BusError,
		BusHandle,
		Message,
	};

	#[test]
	fn scan_finds_acked_addresses_in_order() {
		let mut sim = SimBus::new(&[0x53, 0x50]);
		let mut bus = BusHandle::with_transport(1, &mut sim);
		assert_eq!(bus.scan_addresses().unwrap(), vec![0x50, 0x53]);
		drop(bus);
		assert_eq!(sim.transfers(), 128);
		assert_eq!(sim.locks(), 1);
		assert_eq!(sim.unlocks(), 1);
	}

	#[test]
	fn scan_empty_bus() {
		let mut sim = SimBus::new(&[]);
		let mut bus = BusHandle::with_transport(1, &mut sim);
		assert!(bus.scan_addresses().unwrap().is_empty());
	}

	#[test]
	fn scan_releases_lock_when_abandoned() {
		let mut sim = SimBus::new(&[0x10, 0x50, 0x70]);
		{
			let mut bus = BusHandle::with_transport(1, &mut sim);
			let mut scan = bus.scan().unwrap();
			assert_eq!(scan.next(), Some(0x10));
		}
		assert_eq!(sim.transfers(), 0x11);
		assert_eq!(sim.locks(), 1);
		assert_eq!(sim.unlocks(), 1);
	}

	#[test]
	fn scan_range_and_find_eeprom() {
		let mut sim = SimBus::new(&[0x3c, 0x52, 0x56]);
		let mut bus = BusHandle::with_transport(1, &mut sim);
		let found: Vec<u8> = bus.scan_range(0x40..=0xff).unwrap().collect();
		assert_eq!(found, vec![0x52, 0x56]);
		assert_eq!(bus.find_eeprom().unwrap(), Some(0x52));
	}

	#[test]
	fn find_eeprom_none() {
		let mut sim = SimBus::new(&[0x3c]);
		let mut bus = BusHandle::with_transport(1, &mut sim);
		assert_eq!(bus.find_eeprom().unwrap(), None);
	}

	#[test]
	fn closed_bus_rejects_operations() {
		let mut sim = SimBus::new(&[0x50]);
		let mut bus = BusHandle::with_transport(3, &mut sim);
		assert!(bus.is_open());
		bus.close();
		assert!(!bus.is_open());
		match bus.scan_addresses() {
			Err(BusError::Closed { index: 3 }) => (),
			r => panic!("expected closed error, got {:?}", r),
		}
		assert!(bus.lock().is_err());
		drop(bus);
		assert_eq!(sim.transfers(), 0);
	}

	#[test]
	fn transfer_error_carries_address() {
		let mut sim = SimBus::new(&[]);
		let mut bus = BusHandle::with_transport(1, &mut sim);
		let mut guard = bus.lock().unwrap();
		let err = guard.transfer(0x50, &mut [Message::Write(&[0, 0])]).unwrap_err();
		assert_eq!(err.address, 0x50);
		assert!(err.is_remote_io());
	}

	#[test]
	fn rejects_non_7bit_address() {
		let mut sim = SimBus::new(&[]);
		let mut bus = BusHandle::with_transport(1, &mut sim);
		{
			let mut guard = bus.lock().unwrap();
			assert!(guard.transfer(0x80, &mut [Message::Write(&[0])]).is_err());
		}
		drop(bus);
		assert_eq!(sim.transfers(), 0);
	}

	#[test]
	fn scan_releases_lock_when_exhausted() {
		let mut sim = SimBus::new(&[0x50]);
		{
			let mut bus = BusHandle::with_transport(1, &mut sim);
			let mut scan = bus.scan().unwrap();
			assert_eq!(scan.next(), Some(0x50));
			assert!(scan.is_locked());
			assert_eq!(scan.next(), None);
			assert!(!scan.is_locked());
			assert_eq!(scan.next(), None);
		}
		assert_eq!(sim.transfers(), 128);
		assert_eq!(sim.locks(), 1);
		assert_eq!(sim.unlocks(), 1);
	}

	#[test]
	fn open_failure_carries_index_and_cause() {
		fail_open(true);
		match BusHandle::<SimBus>::open(7) {
			Err(BusError::Unavailable { index: 7, ref cause }) => {
				assert_eq!(cause.raw_os_error(), Some(libc::ENOENT));
			},
			Err(e) => panic!("expected unavailable error, got {}", e),
			Ok(_) => panic!("opening must fail"),
		}
		fail_open(false);
	}

	#[test]
	fn failed_reopen_leaves_bus_closed() {
		fail_open(false);
		let mut bus = BusHandle::<SimBus>::open(2).unwrap();
		assert!(bus.is_open());

		fail_open(true);
		match bus.reopen() {
			Err(BusError::Unavailable { index: 2, .. }) => (),
			r => panic!("expected unavailable error, got {:?}", r),
		}
		assert!(!bus.is_open());
		match bus.lock() {
			Err(BusError::Closed { index: 2 }) => (),
			Err(e) => panic!("expected closed error, got {}", e),
			Ok(_) => panic!("locking a closed bus must fail"),
		}

		fail_open(false);
		bus.reopen().unwrap();
		assert!(bus.is_open());
	}

	#[test]
	fn reopen_after_close() {
		fail_open(false);
		let mut bus = BusHandle::<SimBus>::open(1).unwrap();
		bus.close();
		assert!(!bus.is_open());

		bus.reopen().unwrap();
		assert!(bus.is_open());
		assert_eq!(bus.index(), 1);
		assert_eq!(bus.scan_addresses().unwrap(), vec![0x50]);
	}
}
