use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValidationReason {
	RegisterOutOfRange {
		register: u32,
		max_register: u32,
	},
	DataOutOfRange {
		data: u32,
	},
}

impl fmt::Display for ValidationReason {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			ValidationReason::RegisterOutOfRange { register, max_register } => write!(
				f,
				"register {} > {} (check the declared device capacity)",
				register, max_register,
			),
			ValidationReason::DataOutOfRange { data } => write!(f, "data {} > 0xff", data),
		}
	}
}

/// Rejected register/data combination; no transfer was attempted
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ValidationError {
	pub reasons: Vec<ValidationReason>,
}

impl ValidationError {
	pub fn register_out_of_range(&self) -> bool {
		self.reasons.iter().any(|r| match r {
			ValidationReason::RegisterOutOfRange { .. } => true,
			_ => false,
		})
	}

	pub fn data_out_of_range(&self) -> bool {
		self.reasons.iter().any(|r| match r {
			ValidationReason::DataOutOfRange { .. } => true,
			_ => false,
		})
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "invalid EEPROM access: ")?;
		for (i, reason) in self.reasons.iter().enumerate() {
			if i > 0 {
				write!(f, "; ")?;
			}
			write!(f, "{}", reason)?;
		}
		Ok(())
	}
}

impl failure::Fail for ValidationError {}

pub fn validate(max_register: u32, register: u32, data: u32) -> Result<(), ValidationError> {
	let mut reasons = Vec::new();
	if register > max_register {
		reasons.push(ValidationReason::RegisterOutOfRange { register, max_register });
	}
	if data > 0xff {
		reasons.push(ValidationReason::DataOutOfRange { data });
	}
	if reasons.is_empty() {
		Ok(())
	} else {
		Err(ValidationError { reasons })
	}
}

/// register address as sent on the wire: high byte first
pub fn split_register(register: u32) -> [u8; 2] {
	[(register >> 8) as u8, register as u8]
}

#[cfg(test)]
mod test {
	use super::{
		ValidationReason,
		split_register,
		validate,
	};

	#[test]
	fn split() {
		assert_eq!(split_register(0x000), [0x00, 0x00]);
		assert_eq!(split_register(0x002), [0x00, 0x02]);
		assert_eq!(split_register(0x100), [0x01, 0x00]);
		assert_eq!(split_register(0xfff), [0x0f, 0xff]);
		assert_eq!(split_register(0xabcd), [0xab, 0xcd]);
	}

	#[test]
	fn bounds() {
		assert!(validate(4095, 0, 0).is_ok());
		assert!(validate(4095, 4095, 255).is_ok());

		let e = validate(4095, 4096, 0).unwrap_err();
		assert_eq!(e.reasons, vec![ValidationReason::RegisterOutOfRange { register: 4096, max_register: 4095 }]);
		assert!(e.register_out_of_range());
		assert!(!e.data_out_of_range());

		let e = validate(4095, 0, 256).unwrap_err();
		assert_eq!(e.reasons, vec![ValidationReason::DataOutOfRange { data: 256 }]);

		let e = validate(4095, 5000, 1000).unwrap_err();
		assert!(e.register_out_of_range());
		assert!(e.data_out_of_range());
		assert_eq!(e.reasons.len(), 2);
	}
}
