//! The blue-unhealthy half of the blue-green fixture pair (see
//! `healthy_collector.rs`): stays alive as a real child process but never
//! binds its health port, so `HealthChecker::wait_for_healthy` always times
//! out and the Reload Engine (4.G) must abort the reload and leave the
//! green process untouched (§8 "Rollback on reload failure").

use std::time::Duration;

fn main() {
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
