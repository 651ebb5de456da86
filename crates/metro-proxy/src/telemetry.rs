//! One-time installation of the global tracing subscriber.

use tracing_subscriber::EnvFilter;

/// Where a [`TracingRegistration`] is in its lifecycle.
///
/// ```text
/// Uninitialized ──(ensure_registered)──→ Registered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No subscriber has been installed through this holder.
    Uninitialized,
    /// A global subscriber is in place. Further calls are no-ops.
    Registered,
}

/// Owns the "install logging once" step for the process.
///
/// The binary creates one of these in `main`; tests and embedders can
/// call [`ensure_registered`](Self::ensure_registered) as often as they
/// like.
#[derive(Debug)]
pub struct TracingRegistration {
    state: RegistrationState,
}

impl TracingRegistration {
    /// Creates a holder in the `Uninitialized` state.
    pub fn new() -> Self {
        Self {
            state: RegistrationState::Uninitialized,
        }
    }

    /// Current state.
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Installs a `fmt` subscriber on stderr filtered by `RUST_LOG`
    /// (default `info`). Returns `true` only on the call that actually installed it.
    ///
    /// If some other subscriber is already global, the holder still moves
    /// to `Registered`.
    pub fn ensure_registered(&mut self) -> bool {
        if self.state == RegistrationState::Registered {
            return false;
        }
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();
        self.state = RegistrationState::Registered;
        installed
    }
}

impl Default for TracingRegistration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_registered_is_idempotent() {
        let mut reg = TracingRegistration::new();
        assert_eq!(reg.state(), RegistrationState::Uninitialized);

        reg.ensure_registered();
        assert_eq!(reg.state(), RegistrationState::Registered);

        assert!(!reg.ensure_registered());
        assert_eq!(reg.state(), RegistrationState::Registered);
    }

    #[test]
    fn test_second_holder_does_not_reinstall() {
        let mut first = TracingRegistration::new();
        first.ensure_registered();
        let mut second = TracingRegistration::new();
        assert!(!second.ensure_registered());
        assert_eq!(second.state(), RegistrationState::Registered);
    }
}
