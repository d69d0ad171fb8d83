//! Message-passing front end for an [`EditPacketSender`].
//!
//! A single task owns the sender, its buffers and its pending FIFO. Producers
//! hold cloneable [`EditHandle`]s and send commands over an unbounded
//! channel, so submitting an edit never waits on the dispatch task.

use super::sender::{EditPacketSender, SenderStats};
use crate::codec::{EditRecord, PacketType};
use crate::jurisdiction::{EditTransport, PartitionDirectory};
use crate::shutdown::ShutdownState;
use crate::types::OctalCode;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Edit dispatcher has stopped")]
    Stopped,
}

/// Work sent from producers to the dispatch task.
#[derive(Debug)]
pub enum EditCommand {
    Submit {
        packet_type: PacketType,
        record: EditRecord,
    },
    Single {
        packet_type: PacketType,
        address: OctalCode,
        body: Bytes,
    },
    Release,
    SetShouldSend(bool),
    Stats(oneshot::Sender<SenderStats>),
}

/// Cloneable producer side of an [`EditDispatcher`].
#[derive(Debug, Clone)]
pub struct EditHandle {
    commands: mpsc::UnboundedSender<EditCommand>,
}

impl EditHandle {
    fn send(&self, command: EditCommand) -> Result<(), DispatchError> {
        self.commands.send(command).map_err(|_| DispatchError::Stopped)
    }

    pub fn submit_edit(&self, packet_type: PacketType, record: EditRecord) -> Result<(), DispatchError> {
        self.send(EditCommand::Submit {
            packet_type,
            record,
        })
    }

    pub fn queue_single_message(
        &self,
        packet_type: PacketType,
        address: OctalCode,
        body: Bytes,
    ) -> Result<(), DispatchError> {
        self.send(EditCommand::Single {
            packet_type,
            address,
            body,
        })
    }

    pub fn release_queued_messages(&self) -> Result<(), DispatchError> {
        self.send(EditCommand::Release)
    }

    pub fn set_should_send(&self, should_send: bool) -> Result<(), DispatchError> {
        self.send(EditCommand::SetShouldSend(should_send))
    }

    /// Statistics as of the moment the dispatch task handles this request.
    pub async fn stats(&self) -> Result<SenderStats, DispatchError> {
        let (reply, response) = oneshot::channel();
        self.send(EditCommand::Stats(reply))?;
        response.await.map_err(|_| DispatchError::Stopped)
    }
}

/// Runs an [`EditPacketSender`] on its own task.
pub struct EditDispatcher;

impl EditDispatcher {
    /// Spawns the dispatch task.
    ///
    /// The task processes commands as they arrive and calls
    /// [`EditPacketSender::process`] every `process_interval_ms`. It stops
    /// when every handle is dropped or `shutdown` is initiated, releasing
    /// whatever is still buffered, and resolves to the final statistics.
    pub fn spawn<D, T>(
        sender: EditPacketSender<D, T>,
        shutdown: ShutdownState,
    ) -> (EditHandle, JoinHandle<SenderStats>)
    where
        D: PartitionDirectory + 'static,
        T: EditTransport + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(sender, receiver, shutdown));
        (EditHandle { commands }, task)
    }
}

async fn run<D, T>(
    mut sender: EditPacketSender<D, T>,
    mut commands: mpsc::UnboundedReceiver<EditCommand>,
    shutdown: ShutdownState,
) -> SenderStats
where
    D: PartitionDirectory,
    T: EditTransport,
{
    let mut ticker = tokio::time::interval(sender.config().process_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_ms = sender.config().process_interval_ms, "✉️ Edit dispatcher started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut sender, command),
                None => {
                    debug!("All edit handles dropped");
                    break;
                }
            },
            _ = ticker.tick() => sender.process(),
            _ = shutdown.wait_for_shutdown() => break,
        }
    }

    while let Ok(command) = commands.try_recv() {
        apply(&mut sender, command);
    }
    sender.process();
    sender.release_queued_messages();

    let stats = sender.stats();
    info!(
        packets_sent = stats.packets_sent,
        bytes_sent = stats.bytes_sent,
        pending = sender.pending_len(),
        "✉️ Edit dispatcher stopped"
    );
    stats
}

fn apply<D, T>(sender: &mut EditPacketSender<D, T>, command: EditCommand)
where
    D: PartitionDirectory,
    T: EditTransport,
{
    match command {
        EditCommand::Submit {
            packet_type,
            record,
        } => sender.submit_edit(packet_type, record),
        EditCommand::Single {
            packet_type,
            address,
            body,
        } => sender.queue_single_message(packet_type, address, &body),
        EditCommand::Release => sender.release_queued_messages(),
        EditCommand::SetShouldSend(should_send) => sender.set_should_send(should_send),
        EditCommand::Stats(reply) => {
            let _ = reply.send(sender.stats());
        }
    }
}
