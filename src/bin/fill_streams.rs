//! Writes a deterministic byte pattern to stdout and stderr.
//!
//! Usage: `fill_streams <stdout_len> <stdout_byte> <stderr_len> <stderr_byte>`

use std::io::Write;

fn arg(n: usize) -> String {
    std::env::args().nth(n).unwrap_or_else(|| "0".to_string())
}

fn main() {
    let stdout_len: usize = arg(1).parse().unwrap_or(0);
    let stdout_byte: u8 = arg(2).parse().unwrap_or(b'a' as u8);
    let stderr_len: usize = arg(3).parse().unwrap_or(0);
    let stderr_byte: u8 = arg(4).parse().unwrap_or(b'b' as u8);

    if stdout_len > 0 {
        let buf = vec![stdout_byte; stdout_len];
        std::io::stdout().write_all(&buf).unwrap();
    }
    if stderr_len > 0 {
        let buf = vec![stderr_byte; stderr_len];
        std::io::stderr().write_all(&buf).unwrap();
    }
}
