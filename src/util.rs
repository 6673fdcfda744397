use std::fmt;
use std::str;
use std::thread;
use std::time::{
	Duration,
	Instant,
};

// thread::sleep may return early; keep sleeping until the full duration passed
pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Unsigned integer parameter, either decimal or hexadecimal with a `0x` prefix
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Int(pub u32);

impl fmt::Display for Int {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:x}", self.0)
	}
}

impl str::FromStr for Int {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		ensure!(!s.is_empty(), "empty integer");

		let (digits, radix) = if s.starts_with("0x") || s.starts_with("0X") {
			(&s[2..], 16)
		} else {
			(s, 10)
		};

		let value = with_context!(("invalid integer: {:?}", s),
			Ok(u32::from_str_radix(digits, radix)?)
		)?;
		Ok(Int(value))
	}
}
