//! Termination signal handling.
//!
//! Handlers only set a flag; the event loop checks it between reads and
//! performs the teardown itself. The console waits for input in
//! tick-bounded `poll(2)` calls, so a raised flag is seen within one tick.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Set once SIGINT or SIGTERM has been delivered
#[derive(Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Install handlers for SIGINT and SIGTERM.
pub fn install() -> io::Result<ShutdownFlag> {
    install_for(&[SIGINT, SIGTERM])
}

fn install_for(signals: &[libc::c_int]) -> io::Result<ShutdownFlag> {
    let raised = Arc::new(AtomicBool::new(false));
    for &signal in signals {
        flag::register(signal, Arc::clone(&raised))?;
    }
    Ok(ShutdownFlag(raised))
}
