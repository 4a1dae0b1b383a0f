//! Line input shared by the conflict prompt and the pause monitor.
//!
//! One reader thread owns the underlying stream. Each line goes to a caller
//! blocked in [`InputLines::next_line`] if there is one, otherwise to the
//! listener, otherwise it is queued for the next `next_line` call. The
//! reader starts on first use, so a run that never asks for input never
//! touches stdin.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

type LineSource = Box<dyn Iterator<Item = io::Result<String>> + Send>;
type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Routing {
    pending: VecDeque<String>,
    /// Blocked `next_line` callers that no line has been routed to yet.
    waiting: usize,
    listener: Option<Listener>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    routing: Mutex<Routing>,
    arrived: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Routing> {
        self.routing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn route(&self, line: String) {
        let listener = {
            let mut routing = self.lock();
            if routing.waiting > 0 {
                routing.waiting -= 1;
                routing.pending.push_back(line);
                self.arrived.notify_all();
                return;
            }
            match routing.listener.clone() {
                Some(listener) => listener,
                None => {
                    routing.pending.push_back(line);
                    return;
                }
            }
        };
        listener();
    }

    fn close(&self) {
        self.lock().closed = true;
        self.arrived.notify_all();
    }
}

pub struct InputLines {
    source: Mutex<Option<LineSource>>,
    shared: Arc<Shared>,
}

impl InputLines {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self::from_lines(reader.lines())
    }

    pub fn from_lines<I>(lines: I) -> Self
    where
        I: Iterator<Item = io::Result<String>> + Send + 'static,
    {
        Self {
            source: Mutex::new(Some(Box::new(lines))),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Blocks for the next line. `None` once the stream is exhausted.
    pub fn next_line(&self) -> Option<String> {
        self.start_reader();
        let mut routing = self.shared.lock();
        if let Some(line) = routing.pending.pop_front() {
            return Some(line);
        }
        routing.waiting += 1;
        loop {
            if let Some(line) = routing.pending.pop_front() {
                return Some(line);
            }
            if routing.closed {
                routing.waiting -= 1;
                return None;
            }
            routing = self
                .shared
                .arrived
                .wait(routing)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Calls `listener` for every line nobody is waiting for.
    pub fn set_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        let listener: Listener = Arc::new(listener);
        self.shared.lock().listener = Some(listener);
        self.start_reader();
    }

    fn start_reader(&self) {
        let Some(lines) = self
            .source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        else {
            return;
        };
        let shared = self.shared.clone();
        let spawned = std::thread::Builder::new()
            .name("input-lines".to_string())
            .spawn(move || {
                for line in lines {
                    match line {
                        Ok(line) => shared.route(line),
                        Err(err) => {
                            tracing::debug!("input closed: {err}");
                            break;
                        }
                    }
                }
                shared.close();
            });
        if let Err(err) = spawned {
            tracing::warn!("input unavailable: {err}");
            self.shared.close();
        }
    }

    #[cfg(test)]
    fn waiting(&self) -> usize {
        self.shared.lock().waiting
    }
}
