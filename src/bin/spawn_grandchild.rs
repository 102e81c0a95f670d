//! Spawns `sleep <millis_ms>` as a grandchild and waits for it.
//!
//! Used to verify that process-group termination reaches processes the
//! pipeline never directly spawned.

fn main() {
    let millis = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5000);
    let secs = (millis as f64 / 1000.0).max(0.001).to_string();
    let mut child = std::process::Command::new("sleep")
        .arg(secs)
        .spawn()
        .expect("failed to spawn grandchild");
    let _ = child.wait();
}
