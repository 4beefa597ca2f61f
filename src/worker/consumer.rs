use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Error, Result};
use futures_util::StreamExt;
use lapin::{Consumer, message::Delivery};
use tokio::{sync::watch, task::JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    clients::rbmq::RabbitMqClient,
    worker::{disposition::Disposition, processor::JobProcessor},
};

/// Runs `slots` consumers on the push queue until `shutdown` resolves.
pub struct ConsumerPool {
    broker: Arc<RabbitMqClient>,
    processor: Arc<JobProcessor>,
    slots: usize,
    grace: Duration,
}

impl ConsumerPool {
    pub fn new(
        broker: Arc<RabbitMqClient>,
        processor: Arc<JobProcessor>,
        slots: usize,
        grace: Duration,
    ) -> Self {
        Self {
            broker,
            processor,
            slots: slots.max(1),
            grace,
        }
    }

    pub async fn run<S>(self, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut slots = JoinSet::new();

        for slot in 0..self.slots {
            let tag = format!("push_worker-{}-{}", slot, Uuid::new_v4());
            let consumer = self.broker.create_consumer(&tag).await?;

            slots.spawn(run_slot(
                slot,
                consumer,
                Arc::clone(&self.broker),
                Arc::clone(&self.processor),
                stop_rx.clone(),
            ));
        }

        info!(slots = self.slots, "Push worker consuming");

        tokio::select! {
            _ = shutdown => info!("Shutdown signal received, stopping consumers"),
            _ = wait_all(&mut slots) => warn!("All consumer slots stopped"),
        }

        let _ = stop_tx.send(true);

        if tokio::time::timeout(self.grace, wait_all(&mut slots))
            .await
            .is_err()
        {
            warn!(
                grace_seconds = self.grace.as_secs(),
                "In-flight jobs did not finish within the grace period, abandoning them"
            );
            slots.abort_all();
        }

        info!("Consumers stopped");
        Ok(())
    }
}

async fn wait_all(set: &mut JoinSet<()>) {
    while let Some(joined) = set.join_next().await {
        match joined {
            Err(e) if e.is_panic() => error!(error = %e, "Consumer task panicked"),
            _ => {}
        }
    }
}

async fn run_slot(
    slot: usize,
    mut consumer: Consumer,
    broker: Arc<RabbitMqClient>,
    processor: Arc<JobProcessor>,
    mut stop: watch::Receiver<bool>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Err(e) if e.is_panic() => error!(slot, error = %e, "Job task panicked"),
                    _ => {}
                }
            }

            next = consumer.next() => match next {
                Some(Ok(delivery)) => {
                    in_flight.spawn(handle_delivery(
                        delivery,
                        Arc::clone(&broker),
                        Arc::clone(&processor),
                    ));
                }
                Some(Err(e)) => {
                    error!(slot, error = %e, "Consumer stream failed");
                    break;
                }
                None => {
                    warn!(slot, "Consumer stream closed");
                    break;
                }
            },
        }
    }

    debug!(slot, in_flight = in_flight.len(), "Draining in-flight jobs");
    wait_all(&mut in_flight).await;
}

async fn handle_delivery(
    delivery: Delivery,
    broker: Arc<RabbitMqClient>,
    processor: Arc<JobProcessor>,
) {
    let delivery_tag = delivery.delivery_tag;
    let span = info_span!("delivery", delivery_tag);

    async move {
        let disposition = processor.process(&delivery.data).await;

        let applied = match disposition {
            Disposition::Ack(_) => broker.acknowledge(delivery_tag).await,
            Disposition::Reject(_) => broker.reject(delivery_tag).await,
        };

        match applied {
            Ok(()) => debug!(%disposition, "Disposition applied"),
            Err(e) => error!(%disposition, error = %e, "Failed to apply disposition"),
        }
    }
    .instrument(span)
    .await
}
