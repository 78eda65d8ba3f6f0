use std::sync::atomic::{AtomicBool, Ordering};

use gesconnect_core::Navigator;

/// "Route" the CLI reports as current. Never equal to the login route, so
/// a failed guard always produces a visible hint.
const CLI_ROUTE: &str = "cli";

/// Terminal stand-in for page navigation: a redirect to login prints a
/// hint and marks the command as failed.
pub struct CliNavigator {
    redirected: AtomicBool,
    announce: bool,
}

impl Default for CliNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl CliNavigator {
    pub fn new() -> Self {
        Self {
            redirected: AtomicBool::new(false),
            announce: true,
        }
    }

    /// Records redirects without printing the sign-in hint.
    pub fn silent() -> Self {
        Self {
            redirected: AtomicBool::new(false),
            announce: false,
        }
    }

    pub fn redirected(&self) -> bool {
        self.redirected.load(Ordering::SeqCst)
    }
}

impl Navigator for CliNavigator {
    fn current_route(&self) -> String {
        CLI_ROUTE.to_string()
    }

    fn redirect(&self, _route: &str) {
        self.redirected.store(true, Ordering::SeqCst);
        if self.announce {
            eprintln!("Not signed in. Run `gesconnect login` to sign in.");
        }
    }
}
