use nix::{
    libc,
    sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction},
};
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative termination request, checked once per scheduler loop pass.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static INTERRUPT: OnceLock<StopFlag> = OnceLock::new();

extern "C" fn on_interrupt(_signal: libc::c_int) {
    if let Some(flag) = INTERRUPT.get() {
        flag.raise();
    }
}

/// Route SIGINT to `flag`. Only the first flag installed is ever raised.
pub fn install_interrupt_handler(flag: &StopFlag) -> nix::Result<()> {
    let _ = INTERRUPT.set(flag.clone());
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler only performs an atomic store.
    unsafe { sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = StopFlag::new();
        let seen = flag.clone();
        assert!(!seen.is_raised());
        flag.raise();
        assert!(seen.is_raised());
    }
}
