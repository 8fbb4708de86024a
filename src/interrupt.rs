// Ctrl-C handling for long waits.
//
// The first Ctrl-C cancels the shared token, which makes any running wait
// return early so cleanup (probe pods, port-forwards) still happens. A second
// Ctrl-C exits immediately.

use simplelog::*;
use std::process::exit;
use std::thread;

use crate::readiness::CancelToken;

/// Exit code for a run killed by a second Ctrl-C.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Start listening for Ctrl-C on a helper thread and return the token it
/// cancels.
pub fn install_handler() -> CancelToken {
    let token = CancelToken::new();
    let listener = token.clone();

    let spawned = thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || listen(listener));
    if let Err(e) = spawned {
        warn!("could not install Ctrl-C handler: {e}");
    }

    token
}

#[tokio::main(flavor = "current_thread")] // make this a sync function
async fn listen(token: CancelToken) {
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("stopped listening for Ctrl-C: {e}");
            return;
        }

        if token.is_cancelled() {
            error!("interrupted again, exiting");
            exit(INTERRUPTED_EXIT_CODE);
        }

        warn!("<yellow>interrupted, cleaning up (Ctrl-C again to exit now)</>");
        token.cancel();
    }
}
