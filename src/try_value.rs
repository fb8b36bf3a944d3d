//! [`Try<T>`], the sum type every result crosses a component boundary as.
//!
//! Three states: empty, a value, or a captured error. A three-variant
//! tagged union with an opaque, cheaply-cloneable error handle (an
//! `Arc<dyn Error + Send + Sync>`, the Rust analogue of "a copyable
//! reference to a captured error").

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// An opaque, cheaply-cloneable handle to a captured error.
///
/// Wraps any `Send + Sync` error behind an `Arc` so that `Try<T>::clone()`
/// never needs to clone the underlying error payload itself.
#[derive(Clone)]
pub struct TryError(Arc<dyn StdError + Send + Sync + 'static>);

impl TryError {
    /// Captures `error` into an opaque handle.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Returns the underlying error as a trait object reference.
    #[must_use]
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for TryError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, formatter)
    }
}

impl fmt::Display for TryError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}

impl PartialEq for TryError {
    /// Errors compare by message only; trait objects carry no general
    /// equality, so full payload equality is not expressible.
    fn eq(&self, other: &Self) -> bool {
        self.0.to_string() == other.0.to_string()
    }
}

impl<E> From<E> for TryError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

/// Reading [`Try::value`] when the state is [`Try::Empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyTry;

impl fmt::Display for EmptyTry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Try::value() called on an Empty Try")
    }
}

impl StdError for EmptyTry {}

/// A sum type carrying either a value, an error, or nothing.
///
/// Every result that crosses a [`crate::Promise`]/[`crate::Future`] or
/// [`crate::Lazy`] boundary is wrapped in a `Try<T>`.
#[derive(Clone)]
pub enum Try<T> {
    /// No result has been produced yet.
    Empty,
    /// A successfully produced value.
    Value(T),
    /// A captured error.
    Error(TryError),
}

impl<T> Try<T> {
    /// Returns `true` if this holds neither a value nor an error.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` if this holds a value.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns `true` if this holds an error.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Consumes the value, propagating the error or failing with
    /// [`EmptyTry`] if no result was ever produced.
    ///
    /// # Errors
    ///
    /// Returns the captured [`TryError`] if this is `Error`, or `EmptyTry`
    /// boxed as a `TryError` if this is `Empty`.
    pub fn value(self) -> Result<T, TryError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(error) => Err(error),
            Self::Empty => Err(TryError::new(EmptyTry)),
        }
    }

    /// Replaces the current state with `Value(value)`.
    pub fn emplace(&mut self, value: T) {
        *self = Self::Value(value);
    }

    /// Replaces the current state with an error, wrapping it into a
    /// [`TryError`] if it isn't one already.
    pub fn set_error<E>(&mut self, error: E)
    where
        E: Into<TryError>,
    {
        *self = Self::Error(error.into());
    }

    /// Maps the value, leaving `Empty`/`Error` untouched.
    pub fn map<U, F>(self, function: F) -> Try<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Value(value) => Try::Value(function(value)),
            Self::Error(error) => Try::Error(error),
            Self::Empty => Try::Empty,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Try<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(formatter, "Empty"),
            Self::Value(value) => formatter.debug_tuple("Value").field(value).finish(),
            Self::Error(error) => formatter.debug_tuple("Error").field(error).finish(),
        }
    }
}

impl<T: PartialEq> PartialEq for Try<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Value(left), Self::Value(right)) => left == right,
            (Self::Error(left), Self::Error(right)) => left == right,
            _ => false,
        }
    }
}

impl<T, E> From<Result<T, E>> for Try<T>
where
    E: Into<TryError>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::Error(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn empty_try_reports_empty() {
        let value: Try<i32> = Try::Empty;
        assert!(value.is_empty());
        assert!(value.value().is_err());
    }

    #[rstest]
    fn value_try_roundtrips() {
        let value: Try<i32> = Try::Value(42);
        assert!(value.is_value());
        assert_eq!(value.value().unwrap(), 42);
    }

    #[rstest]
    fn error_try_propagates() {
        let value: Try<i32> = Try::from(Result::<i32, EmptyTry>::Err(EmptyTry));
        assert!(value.has_error());
        assert!(value.value().is_err());
    }

    #[rstest]
    fn map_preserves_error() {
        let value: Try<i32> = Try::from(Result::<i32, EmptyTry>::Err(EmptyTry));
        let mapped = value.map(|n| n * 2);
        assert!(mapped.has_error());
    }

    #[rstest]
    fn emplace_overwrites_any_state() {
        let mut value: Try<i32> = Try::Empty;
        value.emplace(7);
        assert_eq!(value, Try::Value(7));
        value.set_error(EmptyTry);
        assert!(value.has_error());
    }
}
