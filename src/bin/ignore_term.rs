//! Ignores SIGTERM and sleeps, so a caller can observe escalation to SIGKILL.
//!
//! Usage: `ignore_term <millis>`

fn main() {
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
    }
    let millis = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5000);
    std::thread::sleep(std::time::Duration::from_millis(millis));
}
