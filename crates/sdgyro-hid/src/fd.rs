//! 带截止时间的文件描述符读取

use crate::HidError;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

/// 等待可读，超时返回 `Ok(false)`
pub(crate) fn wait_readable(file: &File, timeout: Duration) -> Result<bool, HidError> {
    // poll 精度为毫秒，向上取整，最大 65535ms
    let timeout_ms = timeout.as_micros().div_ceil(1000).clamp(1, 65535) as u16;
    let pollfd = PollFd::new(file.as_fd(), PollFlags::POLLIN);
    match poll(&mut [pollfd], PollTimeout::from(timeout_ms)) {
        Ok(0) => Ok(false),
        Ok(_) => Ok(true),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(HidError::Io(std::io::Error::other(format!(
            "poll failed: {}",
            e
        )))),
    }
}

/// 在截止时间内尽量读满 `buf`
///
/// - 首次等待超时：`Ok(0)`
/// - 中途超时：返回已读字节数（记录不完整）
/// - 首个字节前遇到 EOF：`Err(Disconnected)`
pub(crate) fn read_full_until(
    file: &mut File,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, HidError> {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;

    while filled < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !wait_readable(file, remaining)? {
            return Ok(filled);
        }

        match file.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Err(HidError::Disconnected),
            Ok(0) => return Ok(filled),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted || e.kind() == ErrorKind::WouldBlock => {
                continue;
            },
            Err(e) => return Err(HidError::Io(e)),
        }
    }

    Ok(filled)
}
