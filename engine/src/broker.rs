//! In-process stand-in for the out-of-scope message-broker transport.
//!
//! The spec treats the broker as an external system; inside this crate it
//! is modeled as a pair of traits — `OutboundProducer` (dispatcher →
//! worker) and `InboundConsumer` (worker → response ingestor) — backed by
//! bounded `tokio::sync::mpsc` channels, the same channel-pair shape the
//! teacher's `TaskScheduler` uses internally for `result_sender`/
//! `result_receiver`.

use async_trait::async_trait;
use cadence_shared::wire::{CommandResponse, OutboundCommand};
use cadence_shared::{SchedulerError, SchedulerResult};
use tokio::sync::mpsc;

/// Sends dispatched commands toward workers.
#[async_trait]
pub trait OutboundProducer: Send + Sync {
    async fn send(&self, command: OutboundCommand) -> SchedulerResult<()>;
}

/// Receives worker responses for the ingestor to consume.
#[async_trait]
pub trait InboundConsumer: Send + Sync {
    async fn recv(&self) -> Option<CommandResponse>;
}

pub struct ChannelProducer {
    tx: mpsc::Sender<OutboundCommand>,
}

pub struct ChannelConsumer {
    rx: tokio::sync::Mutex<mpsc::Receiver<CommandResponse>>,
}

/// Builds a connected outbound/inbound channel pair with the given buffer
/// size, along with the raw ends a worker-facing adapter would use to drain
/// commands and push responses back.
pub fn in_process_channel(
    buffer_size: usize,
) -> (
    ChannelProducer,
    mpsc::Receiver<OutboundCommand>,
    mpsc::Sender<CommandResponse>,
    ChannelConsumer,
) {
    let (out_tx, out_rx) = mpsc::channel(buffer_size);
    let (in_tx, in_rx) = mpsc::channel(buffer_size);
    (
        ChannelProducer { tx: out_tx },
        out_rx,
        in_tx,
        ChannelConsumer {
            rx: tokio::sync::Mutex::new(in_rx),
        },
    )
}

#[async_trait]
impl OutboundProducer for ChannelProducer {
    async fn send(&self, command: OutboundCommand) -> SchedulerResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|e| SchedulerError::BrokerTransient(e.to_string()))
    }
}

#[async_trait]
impl InboundConsumer for ChannelConsumer {
    async fn recv(&self) -> Option<CommandResponse> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_shared::wire::TaskRunSnapshot;
    use cadence_shared::{Priority, TaskRunStatus, TaskType};
    use chrono::Utc;

    fn snapshot() -> TaskRunSnapshot {
        TaskRunSnapshot {
            id: 1,
            task_id: 1,
            group_name: "g".into(),
            priority: Priority::Medium,
            task_type: TaskType::TimeInterval,
            payload: None,
            execution_bounds: None,
            execution_arguments: None,
            status: TaskRunStatus::Queued,
            status_updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_command_through_the_outbound_channel() {
        let (producer, mut out_rx, _in_tx, _consumer) = in_process_channel(8);
        producer
            .send(OutboundCommand {
                command_type: cadence_shared::wire::CommandType::Execute,
                task_run: snapshot(),
            })
            .await
            .unwrap();
        let received = out_rx.recv().await.unwrap();
        assert_eq!(received.task_run.id, 1);
    }
}
