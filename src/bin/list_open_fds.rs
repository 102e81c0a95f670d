//! Prints the process's open file descriptor numbers above stderr, one per
//! line, sorted. Used to verify fd hygiene across `exec`.

fn main() {
    let mut fds: Vec<i32> = std::fs::read_dir("/proc/self/fd")
        .expect("read /proc/self/fd")
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
        .filter(|&fd| fd > 2)
        .collect();
    // the directory iterator itself holds an fd that closes before we get here
    fds.sort_unstable();
    for fd in fds {
        println!("{fd}");
    }
}
