//! Wrapper for secret values.
//!
//! The wrapped value is zeroized on drop and hidden from `Debug`. The only way in is
//! [`Protected::expose`], which keeps every access to key material easy to audit.
//!
//! ```rust
//! use hv_crypto::Protected;
//!
//! let pin = Protected::new("1234".to_string());
//!
//! assert_eq!(format!("{pin:?}"), "[REDACTED]");
//! assert_eq!(pin.expose(), "1234");
//! ```

use std::{fmt, mem};

use zeroize::Zeroize;

#[derive(Clone)]
pub struct Protected<T: Zeroize> {
	data: T,
}

impl<T: Zeroize> Protected<T> {
	pub const fn new(value: T) -> Self {
		Self { data: value }
	}

	pub const fn expose(&self) -> &T {
		&self.data
	}
}

impl<T: Zeroize + Default> Protected<T> {
	/// Takes the secret out, leaving a zeroized default behind.
	pub fn into_inner(mut self) -> T {
		mem::take(&mut self.data)
	}
}

impl<T: Zeroize> Drop for Protected<T> {
	fn drop(&mut self) {
		self.data.zeroize();
	}
}

impl<T: Zeroize> fmt::Debug for Protected<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl<T: Zeroize> From<T> for Protected<T> {
	fn from(value: T) -> Self {
		Self::new(value)
	}
}
