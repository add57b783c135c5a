//! Interned, cheaply-cloneable string type used throughout the gateway for
//! backend names, namespaces, model ids and header values that are read far
//! more often than they are constructed.

pub type Strng = arcstr::ArcStr;

/// Build a [`Strng`] from a `format!`-style invocation without an extra
/// intermediate `String` allocation when the result is short-lived.
#[macro_export]
macro_rules! strng {
	($($arg:tt)*) => {
		$crate::strng::Strng::from(format!($($arg)*))
	};
}

/// An `&'static str` promoted to [`Strng`] at zero cost.
#[macro_export]
macro_rules! literal {
	($s:expr) => {
		$crate::strng::Strng::from_static($s)
	};
}
