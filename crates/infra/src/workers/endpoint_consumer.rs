use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use evented_events::TransportMessage;

use crate::config::ConsumerConfig;
use crate::processing::MessageProcessor;
use crate::transport::{Endpoint, PipelineTransport};

/// Running totals of a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches: u64,
    pub messages: u64,
    pub successes: u64,
    pub failures: u64,
    pub faults: u64,
}

/// Handle to control and join a background consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl ConsumerHandle {
    pub fn stats(&self) -> ConsumerStats {
        *self.stats.lock()
    }

    /// Request graceful shutdown and wait for the consumer to stop.
    ///
    /// A batch already taken off the endpoint is processed before the thread
    /// exits.
    pub fn shutdown(mut self) -> ConsumerStats {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("endpoint consumer thread panicked");
            }
        }
        *self.stats.lock()
    }
}

/// Endpoint consumer loop.
///
/// - Blocks on the endpoint for the first message of a batch
/// - Drains more with `dequeue_no_wait` up to the batch size
/// - Hands the batch to a [`MessageProcessor`]
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct EndpointConsumer;

impl EndpointConsumer {
    pub fn spawn<T>(
        config: ConsumerConfig,
        transport: T,
        endpoint: Endpoint,
        processor: MessageProcessor,
    ) -> io::Result<ConsumerHandle>
    where
        T: PipelineTransport + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));
        let loop_stats = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || consumer_loop(&config, &transport, &endpoint, &processor, &shutdown_rx, &loop_stats))?;

        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn consumer_loop<T: PipelineTransport>(
    config: &ConsumerConfig,
    transport: &T,
    endpoint: &Endpoint,
    processor: &MessageProcessor,
    shutdown_rx: &mpsc::Receiver<()>,
    stats: &Mutex<ConsumerStats>,
) {
    info!(consumer = %config.name, endpoint = endpoint.name(), "endpoint consumer started");
    let batch_size = config.batch_size.max(1);

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        let first = match transport.block_dequeue(endpoint, config.poll_timeout()) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(err) => {
                error!(consumer = %config.name, error = %err, "endpoint unavailable; stopping consumer");
                break;
            }
        };

        let mut batch = vec![TransportMessage::new(endpoint.name(), first)];
        while batch.len() < batch_size {
            match transport.dequeue_no_wait(endpoint) {
                Ok(Some(message)) => batch.push(TransportMessage::new(endpoint.name(), message)),
                Ok(None) | Err(_) => break,
            }
        }

        let size = batch.len();
        let result = processor.process(batch);

        for failed in result.failed() {
            warn!(
                consumer = %config.name,
                message_id = %failed.message.id(),
                message_type = failed.message.message_type(),
                error = %failed.error,
                "message failed"
            );
        }
        for fault in result.batch_faults() {
            error!(
                consumer = %config.name,
                unprocessed = fault.unprocessed.len(),
                batch_size = fault.batch_size,
                error = %fault.error,
                "batch faulted"
            );
        }

        let mut s = stats.lock();
        s.batches += 1;
        s.messages += size as u64;
        s.successes += result.successful().len() as u64;
        s.failures += result.failed().len() as u64;
        s.faults += result.batch_faults().len() as u64;
        drop(s);

        debug!(consumer = %config.name, size, "batch done");
    }

    info!(consumer = %config.name, "endpoint consumer stopped");
}
