//! Delegate abstraction used to wire components together.
//!
//! The source XRoar implementation represents callbacks as a named function
//! pointer plus an opaque `void *` context. §9 says the target-language
//! restructuring should prefer a trait per capability where the set of
//! operations is stable (cartridges, event callbacks) and a small
//! boxed-closure/fn-pointer struct for fire-and-forget hooks with a varying
//! shape (PIA pre-read/post-write). Both shapes live here.

/// A single-argument, no-return hook, e.g. a PIA post-write or an event
/// callback's context-carrying closure. Boxed so components can hold a
/// heterogeneous set of them without a generic parameter leaking out.
pub struct Hook<T> {
    f: Option<Box<dyn FnMut(T) + Send>>,
}

impl<T> Hook<T> {
    /// An unset hook; calling it is a no-op.
    pub fn none() -> Self {
        Self { f: None }
    }

    /// Install a callback.
    pub fn set<F: FnMut(T) + Send + 'static>(&mut self, f: F) {
        self.f = Some(Box::new(f));
    }

    /// Remove the callback.
    pub fn clear(&mut self) {
        self.f = None;
    }

    /// `true` if a callback is installed.
    pub fn is_set(&self) -> bool {
        self.f.is_some()
    }

    /// Invoke the callback if one is installed.
    pub fn call(&mut self, arg: T) {
        if let Some(f) = self.f.as_mut() {
            f(arg);
        }
    }
}

impl<T> Default for Hook<T> {
    fn default() -> Self {
        Self::none()
    }
}

/// A hook that additionally returns a value, used by pre-read callbacks
/// that sample external state (keyboard matrix, joystick comparator).
pub struct ValueHook<T, R> {
    f: Option<Box<dyn FnMut(T) -> R + Send>>,
}

impl<T, R> ValueHook<T, R> {
    pub fn none() -> Self {
        Self { f: None }
    }

    pub fn set<F: FnMut(T) -> R + Send + 'static>(&mut self, f: F) {
        self.f = Some(Box::new(f));
    }

    pub fn clear(&mut self) {
        self.f = None;
    }

    pub fn is_set(&self) -> bool {
        self.f.is_some()
    }

    /// Invoke the callback, returning `None` if nothing is installed.
    pub fn call(&mut self, arg: T) -> Option<R> {
        self.f.as_mut().map(|f| f(arg))
    }
}

impl<T, R> Default for ValueHook<T, R> {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn hook_fires_when_set() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut hook: Hook<u32> = Hook::none();
        let c = counter.clone();
        hook.set(move |v| {
            c.fetch_add(v, Ordering::SeqCst);
        });
        hook.call(5);
        hook.call(2);
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn hook_is_noop_when_unset() {
        let mut hook: Hook<u32> = Hook::none();
        assert!(!hook.is_set());
        hook.call(1); // must not panic
    }

    #[test]
    fn value_hook_returns_none_when_unset() {
        let mut hook: ValueHook<(), u8> = ValueHook::none();
        assert_eq!(hook.call(()), None);
    }

    #[test]
    fn value_hook_returns_value_when_set() {
        let mut hook: ValueHook<(), u8> = ValueHook::none();
        hook.set(|_| 0x42);
        assert_eq!(hook.call(()), Some(0x42));
    }
}
