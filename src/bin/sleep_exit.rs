//! Sleeps for the given number of milliseconds, then exits with the given code.
//!
//! Usage: `sleep_exit <millis> <code>`

fn main() {
    let mut args = std::env::args().skip(1);
    let millis: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let code: i32 = args.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    std::thread::sleep(std::time::Duration::from_millis(millis));
    std::process::exit(code);
}
