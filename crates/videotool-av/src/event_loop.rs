//! Single-threaded readiness loop over process output streams.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, OwnedFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{trace, warn};

use crate::lines::LineReader;
use crate::Result;

/// Receives the events of registered streams.
///
/// Handlers run on the loop thread, one at a time, and must not block for
/// long: the next stream is not read until they return.
pub trait StreamHandler {
    /// A complete line, delimiter included.
    fn on_line(&mut self, id: usize, line: &[u8]);

    /// The writer side of the stream closed. The stream is already
    /// deregistered when this runs.
    fn on_close(&mut self, id: usize);
}

/// Tuning for [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLoopConfig {
    /// Upper bound on a single wait for readiness.
    pub poll_interval: Duration,
    /// Upper bound on a single read.
    pub max_read_size: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_read_size: 4096,
        }
    }
}

#[derive(Debug)]
struct Source {
    id: usize,
    file: Option<File>,
    reader: LineReader,
}

/// Polls registered streams and drives their line readers.
#[derive(Debug)]
pub struct EventLoop {
    config: EventLoopConfig,
    sources: Vec<Source>,
    buf: Vec<u8>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new(EventLoopConfig::default())
    }
}

impl EventLoop {
    pub fn new(config: EventLoopConfig) -> Self {
        Self {
            buf: vec![0; config.max_read_size.max(1)],
            config,
            sources: Vec::new(),
        }
    }

    /// Start watching `fd`, reporting its events under `id`.
    pub fn register(&mut self, id: usize, fd: OwnedFd) {
        self.sources.push(Source {
            id,
            file: Some(File::from(fd)),
            reader: LineReader::new(),
        });
    }

    /// Number of streams still open.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Run until every registered stream has closed.
    pub fn run<H: StreamHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        while !self.sources.is_empty() {
            self.turn(handler)?;
        }
        Ok(())
    }

    /// One iteration: wait up to the poll interval, then do one read on
    /// every ready stream. Returns how many streams were ready.
    pub fn turn<H: StreamHandler + ?Sized>(&mut self, handler: &mut H) -> Result<usize> {
        if self.sources.is_empty() {
            return Ok(0);
        }

        let ready = self.wait_ready()?;
        for &index in &ready {
            self.service(index, handler);
        }
        self.sources.retain(|s| s.file.is_some());
        Ok(ready.len())
    }

    fn wait_ready(&self) -> Result<Vec<usize>> {
        let mut fds: Vec<PollFd<'_>> = self
            .sources
            .iter()
            .filter_map(|s| s.file.as_ref())
            .map(|f| PollFd::new(f.as_fd(), PollFlags::POLLIN))
            .collect();

        let millis = self.config.poll_interval.as_millis().min(u128::from(u16::MAX)) as u16;
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(Errno::EINTR) => return Ok(Vec::new()),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }

        Ok(fds
            .iter()
            .enumerate()
            .filter(|(_, fd)| fd.revents().is_some_and(|r| !r.is_empty()))
            .map(|(i, _)| i)
            .collect())
    }

    fn service<H: StreamHandler + ?Sized>(&mut self, index: usize, handler: &mut H) {
        let source = &mut self.sources[index];
        let Some(file) = source.file.as_mut() else {
            return;
        };

        let n = match file.read(&mut self.buf) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {
                return;
            }
            Err(e) => {
                warn!(stream = source.id, error = %e, "read failed, closing stream");
                0
            }
        };

        if n == 0 {
            source.file = None;
            if !source.reader.pending().is_empty() {
                trace!(
                    stream = source.id,
                    bytes = source.reader.pending().len(),
                    "dropping unterminated output"
                );
            }
            handler.on_close(source.id);
            return;
        }

        for line in source.reader.feed(&self.buf[..n]) {
            handler.on_line(source.id, &line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Default)]
    struct Collect {
        events: Vec<(usize, Option<String>)>,
    }

    impl StreamHandler for Collect {
        fn on_line(&mut self, id: usize, line: &[u8]) {
            self.events
                .push((id, Some(String::from_utf8_lossy(line).to_string())));
        }

        fn on_close(&mut self, id: usize) {
            self.events.push((id, None));
        }
    }

    fn pipe() -> (OwnedFd, File) {
        let (read, write) = nix::unistd::pipe().unwrap();
        (read, File::from(write))
    }

    fn fast() -> EventLoop {
        EventLoop::new(EventLoopConfig {
            poll_interval: Duration::from_millis(10),
            max_read_size: 4096,
        })
    }

    #[test]
    fn run_delivers_lines_then_close() {
        let (read, mut write) = pipe();
        write.write_all(b"frame=1\rframe=2\npartial").unwrap();
        drop(write);

        let mut ev = fast();
        ev.register(7, read);
        let mut handler = Collect::default();
        ev.run(&mut handler).unwrap();

        assert_eq!(
            handler.events,
            vec![
                (7, Some("frame=1\r".to_string())),
                (7, Some("frame=2\n".to_string())),
                (7, None),
            ]
        );
        assert!(ev.is_empty());
    }

    #[test]
    fn idle_turn_times_out() {
        let (read, _write) = pipe();
        let mut ev = fast();
        ev.register(0, read);

        let mut handler = Collect::default();
        assert_eq!(ev.turn(&mut handler).unwrap(), 0);
        assert!(handler.events.is_empty());
        assert_eq!(ev.len(), 1);
    }

    #[test]
    fn reads_are_bounded() {
        let (read, mut write) = pipe();
        write.write_all(b"abcdef\n").unwrap();

        let mut ev = EventLoop::new(EventLoopConfig {
            poll_interval: Duration::from_millis(10),
            max_read_size: 4,
        });
        ev.register(0, read);
        let mut handler = Collect::default();

        ev.turn(&mut handler).unwrap();
        assert!(handler.events.is_empty());
        ev.turn(&mut handler).unwrap();
        assert_eq!(handler.events, vec![(0, Some("abcdef\n".to_string()))]);
    }

    #[test]
    fn streams_close_independently() {
        let (read_a, write_a) = pipe();
        let (read_b, mut write_b) = pipe();
        drop(write_a);

        let mut ev = fast();
        ev.register(0, read_a);
        ev.register(1, read_b);
        let mut handler = Collect::default();

        ev.turn(&mut handler).unwrap();
        assert_eq!(handler.events, vec![(0, None)]);
        assert_eq!(ev.len(), 1);

        write_b.write_all(b"late\n").unwrap();
        drop(write_b);
        ev.run(&mut handler).unwrap();
        assert_eq!(
            handler.events[1..],
            [(1, Some("late\n".to_string())), (1, None)]
        );
    }

    #[test]
    fn empty_loop_returns_immediately() {
        let mut ev = EventLoop::default();
        ev.run(&mut Collect::default()).unwrap();
    }
}
