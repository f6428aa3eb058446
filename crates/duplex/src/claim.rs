//! Single-ownership wrappers for reference-counted payloads.
//!
//! Every body in this crate stores its payload inside a [`Claimable`]. The payload can be taken
//! out exactly once; whatever is never taken is released when the wrapper is released or dropped.
//! A claim may also leave a successor behind ([`Claimable::next`]), so that releasing the
//! original value releases the stage that was derived from it.

use std::collections::VecDeque;
use std::fmt;
use std::mem;

use bytes::Bytes;

use crate::protocol::BodyError;

/// A value holding resources that must be given back exactly once.
///
/// Implementations must be idempotent: a second `release` is a no-op.
pub trait Release {
    fn release(&mut self);
}

impl Release for Bytes {
    #[inline]
    fn release(&mut self) {
        drop(mem::take(self));
    }
}

impl<T: Release> Release for Option<T> {
    fn release(&mut self) {
        if let Some(mut value) = self.take() {
            value.release();
        }
    }
}

impl<T: Release> Release for Vec<T> {
    fn release(&mut self) {
        for mut value in self.drain(..) {
            value.release();
        }
    }
}

impl<T: Release> Release for VecDeque<T> {
    fn release(&mut self) {
        for mut value in self.drain(..) {
            value.release();
        }
    }
}

impl<T: Release + ?Sized> Release for Box<T> {
    #[inline]
    fn release(&mut self) {
        (**self).release();
    }
}

enum State<T> {
    Unclaimed(T),
    Claimed,
    Forwarded(Box<dyn Release + Send>),
    Released,
}

/// A value that can be claimed once.
///
/// | operation        | unclaimed                    | claimed / released |
/// |------------------|------------------------------|--------------------|
/// | `value`          | `Ok(&T)`                     | `AlreadyClaimed`   |
/// | `prepare_claim`  | `Ok(&mut T)`, stays unclaimed| `AlreadyClaimed`   |
/// | `claim`          | `Ok(T)`                      | `AlreadyClaimed`   |
/// | `next(s)`        | `Ok(T)`, `s` becomes successor | `AlreadyClaimed` |
/// | `release`        | releases `T`                 | releases successor, if any |
pub struct Claimable<T: Release> {
    state: State<T>,
}

impl<T: Release> Claimable<T> {
    pub fn new(value: T) -> Self {
        Self { state: State::Unclaimed(value) }
    }

    /// Peeks at the value without claiming it.
    pub fn value(&self) -> Result<&T, BodyError> {
        match &self.state {
            State::Unclaimed(value) => Ok(value),
            _ => Err(BodyError::AlreadyClaimed),
        }
    }

    /// Mutable access to the value, used to build the next stage before committing the claim.
    pub fn prepare_claim(&mut self) -> Result<&mut T, BodyError> {
        match &mut self.state {
            State::Unclaimed(value) => Ok(value),
            _ => Err(BodyError::AlreadyClaimed),
        }
    }

    /// Takes the value, leaving the wrapper claimed.
    pub fn claim(&mut self) -> Result<T, BodyError> {
        self.take_with(State::Claimed)
    }

    /// Takes the value and records `successor` as the stage derived from it.
    ///
    /// A later [`release`](Self::release) of this wrapper releases `successor` instead.
    pub fn next<N>(&mut self, successor: N) -> Result<T, BodyError>
    where
        N: Release + Send + 'static,
    {
        self.take_with(State::Forwarded(Box::new(successor)))
    }

    pub fn is_claimed(&self) -> bool {
        !matches!(self.state, State::Unclaimed(_))
    }

    fn take_with(&mut self, next: State<T>) -> Result<T, BodyError> {
        match mem::replace(&mut self.state, next) {
            State::Unclaimed(value) => Ok(value),
            previous => {
                self.state = previous;
                Err(BodyError::AlreadyClaimed)
            }
        }
    }
}

impl<T: Release> Release for Claimable<T> {
    fn release(&mut self) {
        match mem::replace(&mut self.state, State::Released) {
            State::Unclaimed(mut value) => value.release(),
            State::Forwarded(mut successor) => successor.release(),
            State::Claimed | State::Released => {}
        }
    }
}

impl<T: Release> Drop for Claimable<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Release> fmt::Debug for Claimable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Unclaimed(_) => "unclaimed",
            State::Claimed => "claimed",
            State::Forwarded(_) => "forwarded",
            State::Released => "released",
        };
        f.debug_struct("Claimable").field("state", &state).finish()
    }
}
