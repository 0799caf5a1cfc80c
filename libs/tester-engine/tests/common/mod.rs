#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use tester_api::{Error, InitContext, Message, ProcessContext, Processor};

type BoxFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

/// Re-emits every record it receives to `target` under the same key,
/// optionally building a storage for `target` during init.
#[derive(Default)]
pub struct Forward {
    target: String,
    copies: usize,
    materialize: bool,
    tolerate_emit_errors: bool,
    seen: Mutex<Vec<Message>>,
    emit_errors: Mutex<Vec<Error>>,
}

impl Forward {
    pub fn to(target: &str) -> Self {
        Self {
            target: target.to_string(),
            copies: 1,
            ..Self::default()
        }
    }

    /// Build one storage for the target topic in `init`.
    pub fn materialized(mut self) -> Self {
        self.materialize = true;
        self
    }

    /// Emit `n` records per input, keyed `<key>-1` .. `<key>-n`.
    pub fn fan_out(mut self, n: usize) -> Self {
        self.copies = n;
        self
    }

    /// Record failed emits instead of failing the delivery.
    pub fn tolerant(mut self) -> Self {
        self.tolerate_emit_errors = true;
        self
    }

    pub fn seen_keys(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|m| m.key.clone()).collect()
    }

    pub fn seen(&self) -> Vec<Message> {
        self.seen.lock().unwrap().clone()
    }

    pub fn emit_errors(&self) -> Vec<Error> {
        self.emit_errors.lock().unwrap().clone()
    }
}

impl Processor for Forward {
    fn init<'a>(&'a self, ctx: &'a InitContext) -> BoxFuture<'a> {
        Box::pin(async move {
            if self.materialize {
                ctx.topic_manager.ensure_table_exists(&self.target, 1)?;
                ctx.storage_builder.build(&self.target, 0)?;
            }
            Ok(())
        })
    }

    fn process<'a>(&'a self, ctx: &'a ProcessContext<'a>, message: &'a Message) -> BoxFuture<'a> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(message.clone());
            for n in 1..=self.copies {
                let key = if self.copies == 1 {
                    message.key.clone()
                } else {
                    format!("{}-{n}", message.key)
                };
                let result = ctx.emit(&self.target, &key, message.raw.clone()).wait().await;
                match result {
                    Ok(()) => {}
                    Err(e) if self.tolerate_emit_errors => self.emit_errors.lock().unwrap().push(e),
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
    }
}

/// Counts deliveries and does nothing else.
#[derive(Default)]
pub struct Count {
    delivered: AtomicUsize,
}

impl Count {
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

impl Processor for Count {
    fn process<'a>(&'a self, _ctx: &'a ProcessContext<'a>, _message: &'a Message) -> BoxFuture<'a> {
        Box::pin(async move {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Builds one storage per listed table topic and processes nothing.
pub struct Tables(pub Vec<&'static str>);

impl Processor for Tables {
    fn init<'a>(&'a self, ctx: &'a InitContext) -> BoxFuture<'a> {
        Box::pin(async move {
            for topic in &self.0 {
                ctx.storage_builder.build(topic, 0)?;
            }
            Ok(())
        })
    }

    fn process<'a>(&'a self, _ctx: &'a ProcessContext<'a>, _message: &'a Message) -> BoxFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Fails every delivery.
pub struct Reject;

impl Processor for Reject {
    fn process<'a>(&'a self, _ctx: &'a ProcessContext<'a>, message: &'a Message) -> BoxFuture<'a> {
        Box::pin(async move { Err(Error::processor(format!("rejected key '{}'", message.key))) })
    }
}

/// Fails its one-time setup.
pub struct BrokenInit;

impl Processor for BrokenInit {
    fn init<'a>(&'a self, _ctx: &'a InitContext) -> BoxFuture<'a> {
        Box::pin(async { Err(Error::config("no such table")) })
    }

    fn process<'a>(&'a self, _ctx: &'a ProcessContext<'a>, _message: &'a Message) -> BoxFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Shared, ordered record of `"<stage>:<key>"` entries.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Records every delivery in a journal shared with other stages and emits
/// `copies` records keyed `<key>.1` .. `<key>.n` to `target`, if any.
pub struct Stage {
    name: &'static str,
    target: Option<&'static str>,
    copies: usize,
    journal: Journal,
}

impl Stage {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            target: None,
            copies: 0,
            journal: journal.clone(),
        }
    }

    pub fn emits(mut self, target: &'static str, copies: usize) -> Self {
        self.target = Some(target);
        self.copies = copies;
        self
    }
}

impl Processor for Stage {
    fn process<'a>(&'a self, ctx: &'a ProcessContext<'a>, message: &'a Message) -> BoxFuture<'a> {
        Box::pin(async move {
            self.journal.lock().unwrap().push(format!("{}:{}", self.name, message.key));
            if let Some(target) = self.target {
                for n in 1..=self.copies {
                    let key = format!("{}.{n}", message.key);
                    ctx.emit(target, &key, message.raw.clone()).wait().await?;
                }
            }
            Ok(())
        })
    }
}

/// Setup that announces it started and then blocks until released.
pub struct Gated {
    started: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Gated {
    /// The processor, a receiver that fires once `init` runs, and the
    /// sender that lets `init` finish.
    pub fn new() -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let gated = Self {
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        (gated, started_rx, release_tx)
    }
}

impl Processor for Gated {
    fn init<'a>(&'a self, _ctx: &'a InitContext) -> BoxFuture<'a> {
        Box::pin(async move {
            if let Some(started) = self.started.lock().unwrap().take() {
                let _ = started.send(());
            }
            let release = self.release.lock().unwrap().take();
            if let Some(release) = release {
                let _ = release.await;
            }
            Ok(())
        })
    }

    fn process<'a>(&'a self, _ctx: &'a ProcessContext<'a>, _message: &'a Message) -> BoxFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
