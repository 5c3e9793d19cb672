#![allow(dead_code)]

use rsync_prom::metrics::{Grouping, PublishError, Reading};
use rsync_prom::orchestrator::{Launcher, Publisher, TransferOrchestrator, WrapParams};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

pub const JOB: &str = "rsync";
pub const INSTANCE: &str = "rsync@test-host";

pub const FULL_OUTPUT: &str = "sending incremental file list\n\
                               docs/\n\
                               docs/readme.txt\n\
                               \n\
                               sent 1,590 bytes  received 18 bytes  3,216.00 bytes/sec\n\
                               total size is 1,188,046  speedup is 738.83\n";

/// Everything the fakes observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Published {
        grouping: Grouping,
        readings: Vec<Reading>,
    },
    Started(Vec<String>),
    Waited,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn params() -> WrapParams {
    WrapParams {
        pushgateway: "http://pushgateway.invalid:9091".to_string(),
        instance: INSTANCE.to_string(),
        job: JOB.to_string(),
    }
}

pub fn orchestrator(publisher: RecordingPublisher) -> TransferOrchestrator<RecordingPublisher> {
    TransferOrchestrator::new(params(), Arc::new(publisher))
}

pub fn args() -> Vec<String> {
    ["rsync", "-av", "--stats", "src/", "dst/"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Publisher that records every batch, optionally failing each push.
#[derive(Debug, Clone)]
pub struct RecordingPublisher {
    log: EventLog,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new(log: EventLog) -> Self {
        Self { log, fail: false }
    }

    pub fn failing(log: EventLog) -> Self {
        Self { log, fail: true }
    }
}

impl Publisher for RecordingPublisher {
    async fn publish(&self, grouping: &Grouping, readings: &[Reading]) -> Result<(), PublishError> {
        self.log.lock().unwrap().push(Event::Published {
            grouping: grouping.clone(),
            readings: readings.to_vec(),
        });
        if self.fail {
            return Err(PublishError::Push(prometheus::Error::Msg(
                "push gateway unavailable".to_string(),
            )));
        }
        Ok(())
    }
}

/// What the fake tool prints.
#[derive(Debug, Clone)]
pub enum Output {
    Text(&'static str),
    /// Serves the text, then fails the next read.
    BrokenPipe(&'static str),
}

/// Launcher that "runs" a canned output and exit code.
#[derive(Debug)]
pub struct FakeLauncher {
    log: EventLog,
    output: Option<Output>,
    exit_code: Option<i32>,
    interrupted: bool,
}

impl FakeLauncher {
    pub fn new(log: EventLog, output: Output, exit_code: i32) -> Self {
        Self {
            log,
            output: Some(output),
            exit_code: Some(exit_code),
            interrupted: false,
        }
    }

    /// Reports having been stopped by a signal.
    pub fn stopped_by_signal(mut self) -> Self {
        self.interrupted = true;
        self
    }

    /// Fails to start.
    pub fn unstartable(log: EventLog) -> Self {
        Self {
            log,
            output: None,
            exit_code: None,
            interrupted: false,
        }
    }

    /// Starts fine but never exits.
    pub fn hanging(log: EventLog, output: Output) -> Self {
        Self {
            log,
            output: Some(output),
            exit_code: None,
            interrupted: false,
        }
    }
}

impl Launcher for FakeLauncher {
    type Output = Box<dyn AsyncRead + Unpin + Send>;
    type Error = io::Error;

    async fn start(&mut self, args: &[String]) -> Result<Self::Output, Self::Error> {
        self.log.lock().unwrap().push(Event::Started(args.to_vec()));
        match self.output.take() {
            Some(Output::Text(text)) => Ok(Box::new(text.as_bytes())),
            Some(Output::BrokenPipe(text)) => Ok(Box::new(BrokenAfter {
                data: text.as_bytes(),
                served: false,
            })),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "rsync: command not found",
            )),
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupted
    }

    async fn wait(&mut self) -> i32 {
        self.log.lock().unwrap().push(Event::Waited);
        match self.exit_code {
            Some(code) => code,
            None => std::future::pending().await,
        }
    }
}

struct BrokenAfter {
    data: &'static [u8],
    served: bool,
}

impl AsyncRead for BrokenAfter {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.served {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection reset",
            )));
        }
        buf.put_slice(self.data);
        self.served = true;
        Poll::Ready(Ok(()))
    }
}

/// Every published reading, flattened, as (name, value).
pub fn published(log: &EventLog) -> Vec<(String, f64)> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            Event::Published { readings, .. } => Some(readings.clone()),
            _ => None,
        })
        .flatten()
        .map(|r| (r.name, r.value))
        .collect()
}

/// Values published under `name`, in order.
pub fn values_of(log: &EventLog, name: &str) -> Vec<f64> {
    published(log)
        .into_iter()
        .filter(|(n, _)| n == name)
        .map(|(_, v)| v)
        .collect()
}

pub fn publish_batches(log: &EventLog) -> Vec<Vec<Reading>> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            Event::Published { readings, .. } => Some(readings.clone()),
            _ => None,
        })
        .collect()
}
