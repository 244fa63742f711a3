//! Background engine handle
//!
//! [`FlowEngine`] owns one named worker thread running a [`Scheduler`].
//! Control messages go in over an unbounded channel and are fire-and-forget;
//! every outcome, rejections included, comes back as an [`EngineEvent`].
//! The worker checks its queue between batches, so a message takes effect
//! within one batch of being sent.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, info};

use crate::events::types::{ControlMessage, EngineEvent};
use crate::models::graph::GraphDefinition;
use crate::orchestrator::config::SimulationConfig;
use crate::runtime::scheduler::{ProtocolError, Scheduler};

const WORKER_THREAD_NAME: &str = "flow-sim-engine";

/// Handle to a background simulation engine
///
/// Dropping the handle closes the control channel and joins the worker.
pub struct FlowEngine {
    control_tx: Option<Sender<ControlMessage>>,
    events_rx: Receiver<EngineEvent>,
    worker: Option<JoinHandle<()>>,
}

impl FlowEngine {
    /// Spawn the worker thread in the `Idle` state
    pub fn spawn() -> Result<Self, ProtocolError> {
        let (control_tx, control_rx) = unbounded::<ControlMessage>();
        let (events_tx, events_rx) = unbounded::<EngineEvent>();

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(control_rx, events_tx))
            .map_err(|e| ProtocolError::Spawn(e.to_string()))?;

        info!(thread = WORKER_THREAD_NAME, "engine worker spawned");

        Ok(Self {
            control_tx: Some(control_tx),
            events_rx,
            worker: Some(worker),
        })
    }

    /// Queue a control message
    ///
    /// Only fails if the worker has exited.
    pub fn send(&self, message: ControlMessage) -> Result<(), ProtocolError> {
        let tx = self.control_tx.as_ref().ok_or(ProtocolError::EngineDisconnected)?;
        tx.send(message).map_err(|_| ProtocolError::EngineDisconnected)
    }

    pub fn start(&self, config: SimulationConfig, initial_graph: GraphDefinition) -> Result<(), ProtocolError> {
        self.send(ControlMessage::StartSimulation { config, initial_graph })
    }

    pub fn pause(&self) -> Result<(), ProtocolError> {
        self.send(ControlMessage::PauseSimulation)
    }

    pub fn resume(&self) -> Result<(), ProtocolError> {
        self.send(ControlMessage::ResumeSimulation)
    }

    pub fn step(&self, steps: u64) -> Result<(), ProtocolError> {
        self.send(ControlMessage::StepSimulation { steps })
    }

    pub fn stop(&self) -> Result<(), ProtocolError> {
        self.send(ControlMessage::StopSimulation)
    }

    /// The event stream, for callers that want to `select!` over it
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events_rx
    }

    /// Next event if one is already queued
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    ///
    /// `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<EngineEvent>, ProtocolError> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ProtocolError::EngineDisconnected),
        }
    }
}

impl Drop for FlowEngine {
    fn drop(&mut self) {
        // Closing the control channel is the shutdown signal
        drop(self.control_tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(control_rx: Receiver<ControlMessage>, events_tx: Sender<EngineEvent>) {
    let mut scheduler = Scheduler::new();

    loop {
        if scheduler.is_running() {
            // Yield point: apply everything queued since the last batch
            loop {
                match control_rx.try_recv() {
                    Ok(message) => {
                        if !publish(&events_tx, scheduler.handle(message)) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("control channel closed; worker exiting");
                        return;
                    }
                }
            }

            if scheduler.is_running() && !publish(&events_tx, scheduler.run_batch()) {
                return;
            }
        } else {
            match control_rx.recv() {
                Ok(message) => {
                    if !publish(&events_tx, scheduler.handle(message)) {
                        return;
                    }
                }
                Err(_) => {
                    debug!("control channel closed; worker exiting");
                    return;
                }
            }
        }
    }
}

/// Forward events to the host; false once nobody is listening
fn publish(events_tx: &Sender<EngineEvent>, events: Vec<EngineEvent>) -> bool {
    for event in events {
        debug!(event = event.tag(), "event emitted");
        if events_tx.send(event).is_err() {
            debug!("event channel closed; worker exiting");
            return false;
        }
    }
    true
}
